//! yangkit-core: YANG schema compiler library
//!
//! This crate compiles YANG modules in their YIN (XML) serialization into a
//! queryable in-memory schema model. It is IO-free: file access happens
//! behind the [`context::ModuleLocator`] seam (see `yangkit-std` for the
//! filesystem implementation).
//!
//! # Pipeline
//!
//! ```text
//! YIN bytes → XML tree → YIN reader → Schema model → Context
//!             ^^^^^^^^   ^^^^^^^^^^   ^^^^^^^^^^^^
//!             xml        (internal)   schema
//! ```
//!
//! - **XML tree** (`xml`): arena-backed element tree with namespace
//!   resolution, the parsing substrate for YIN documents
//! - **Schema model** (`schema`): compiled modules, nodes, types,
//!   typedefs, identities
//! - **Context** (`context`): registry of loaded modules, owner of the
//!   string dictionary and the diagnostics sink

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod context;
pub mod diag;
pub mod dict;
pub mod error;
pub mod ids;
pub mod schema;
pub mod xml;

mod yin;
