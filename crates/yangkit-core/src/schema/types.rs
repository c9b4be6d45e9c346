//! Type system of the compiled schema.

use crate::dict::Dict;
use crate::ids::{ModuleId, NodeId, StrId, SubmoduleId};
use alloc::vec::Vec;

/// Handle to a module or submodule registered in (or being compiled for) a
/// context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModuleHandle {
    /// A module.
    Module(ModuleId),
    /// A submodule.
    Submodule(SubmoduleId),
}

/// YANG built-in type kinds (RFC 6020 §4.2.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeBase {
    /// Any binary data.
    Binary,
    /// A set of named bits.
    Bits,
    /// true / false.
    Boolean,
    /// 64-bit signed decimal number.
    Decimal64,
    /// A leaf that does not carry a value.
    Empty,
    /// One of an enumerated set of strings.
    Enumeration,
    /// A reference to an abstract identity.
    Identityref,
    /// A reference to a data tree node instance.
    InstanceIdentifier,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// A reference to a leaf instance.
    Leafref,
    /// A character string.
    String,
    /// 8-bit unsigned integer.
    Uint8,
    /// 16-bit unsigned integer.
    Uint16,
    /// 32-bit unsigned integer.
    Uint32,
    /// 64-bit unsigned integer.
    Uint64,
    /// Choice of member types.
    Union,
}

/// Canonical names of the built-in types, in lookup order.
pub const BUILTIN_TYPES: [TypeBase; 19] = [
    TypeBase::Binary,
    TypeBase::Bits,
    TypeBase::Boolean,
    TypeBase::Decimal64,
    TypeBase::Empty,
    TypeBase::Enumeration,
    TypeBase::Identityref,
    TypeBase::InstanceIdentifier,
    TypeBase::Int8,
    TypeBase::Int16,
    TypeBase::Int32,
    TypeBase::Int64,
    TypeBase::Leafref,
    TypeBase::String,
    TypeBase::Uint8,
    TypeBase::Uint16,
    TypeBase::Uint32,
    TypeBase::Uint64,
    TypeBase::Union,
];

impl TypeBase {
    /// The canonical YANG name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Bits => "bits",
            Self::Boolean => "boolean",
            Self::Decimal64 => "decimal64",
            Self::Empty => "empty",
            Self::Enumeration => "enumeration",
            Self::Identityref => "identityref",
            Self::InstanceIdentifier => "instance-identifier",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Leafref => "leafref",
            Self::String => "string",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Union => "union",
        }
    }

    /// Match a canonical name against the built-in table.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        BUILTIN_TYPES.iter().copied().find(|t| t.name() == name)
    }

    /// True for the signed/unsigned integer kinds.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Uint8
                | Self::Uint16
                | Self::Uint32
                | Self::Uint64
        )
    }
}

/// Definition status (RFC 6020 §7.19.2).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// Currently in use.
    #[default]
    Current,
    /// Being phased out.
    Deprecated,
    /// No longer in use.
    Obsolete,
}

impl Status {
    /// Get a string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Deprecated => "deprecated",
            Self::Obsolete => "obsolete",
        }
    }
}

/// Config flag of a schema node: read-write configuration or read-only
/// state. Inherited from the parent when unspecified; the top-level default
/// is [`Config::Write`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Config {
    /// Read-write configuration data.
    #[default]
    Write,
    /// Read-only state data.
    Read,
}

/// Reference to a typedef by its owning table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TpdfRef {
    /// Top-level typedef of a module or submodule.
    Top(ModuleHandle, u32),
    /// Typedef table of a container, list, or grouping node.
    Node(ModuleHandle, NodeId, u32),
}

/// Reference to an identity in a module's or submodule's identity table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdentRef {
    /// Owning table.
    pub owner: ModuleHandle,
    /// Index into the table.
    pub index: u32,
}

/// Type derivation: either directly one of the built-ins, or a typedef.
///
/// Every derivation chain terminates at a built-in; the chain is walked
/// through [`TpdfRef`] handles, never owned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeDer {
    /// Derived from the built-in type table.
    Builtin,
    /// Derived from a typedef.
    Tpdf(TpdfRef),
}

/// One `enum` of an enumeration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnumSpec {
    /// Assigned name; no leading or trailing whitespace.
    pub name: StrId,
    /// Description.
    pub dsc: Option<StrId>,
    /// Reference.
    pub reference: Option<StrId>,
    /// Status.
    pub status: Status,
    /// Assigned or auto-assigned value.
    pub value: i32,
}

/// One named bit of a `bits` type.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitSpec {
    /// Bit name.
    pub name: StrId,
    /// Declared position, when present.
    pub position: Option<u32>,
}

/// Kind-specific type payload, discriminated by the base kind.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeInfo {
    /// No payload (boolean, empty, instance-identifier, or a derived type
    /// adding no constraints).
    #[default]
    None,
    /// Enumeration members.
    Enums(Vec<EnumSpec>),
    /// Named bits.
    Bits(Vec<BitSpec>),
    /// Resolved identityref base.
    Identityref(IdentRef),
    /// Union member types.
    Union(Vec<Type>),
    /// Decimal64 fraction digits (1..=18).
    Dec64 {
        /// Declared fraction-digits value.
        fraction_digits: u8,
    },
    /// Raw numeric range expression.
    Range(Option<StrId>),
    /// String restrictions, kept raw.
    Str {
        /// Raw length expression.
        length: Option<StrId>,
        /// Raw pattern expressions.
        patterns: Vec<StrId>,
    },
    /// Binary length restriction, kept raw.
    Binary(Option<StrId>),
    /// Leafref path expression.
    Leafref(Option<StrId>),
}

/// A use of a type: built-in or derived.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Type {
    /// Base kind, copied from the end of the derivation chain.
    pub base: TypeBase,
    /// The prefix the type was written with, when qualified.
    pub prefix: Option<StrId>,
    /// Derivation.
    pub der: TypeDer,
    /// Kind-specific payload.
    pub info: TypeInfo,
}

impl Type {
    /// A bare use of a built-in type.
    #[must_use]
    pub fn builtin(base: TypeBase) -> Self {
        Self {
            base,
            prefix: None,
            der: TypeDer::Builtin,
            info: TypeInfo::None,
        }
    }

    /// Release every dictionary reference held by this type.
    pub fn release(&self, dict: &mut Dict) {
        if let Some(prefix) = self.prefix {
            dict.remove(prefix);
        }
        match &self.info {
            TypeInfo::Enums(enums) => {
                for e in enums {
                    dict.remove(e.name);
                    if let Some(dsc) = e.dsc {
                        dict.remove(dsc);
                    }
                    if let Some(r) = e.reference {
                        dict.remove(r);
                    }
                }
            }
            TypeInfo::Bits(bits) => {
                for b in bits {
                    dict.remove(b.name);
                }
            }
            TypeInfo::Union(types) => {
                for t in types {
                    t.release(dict);
                }
            }
            TypeInfo::Range(range) | TypeInfo::Binary(range) | TypeInfo::Leafref(range) => {
                if let Some(s) = range {
                    dict.remove(*s);
                }
            }
            TypeInfo::Str { length, patterns } => {
                if let Some(l) = length {
                    dict.remove(*l);
                }
                for p in patterns {
                    dict.remove(*p);
                }
            }
            TypeInfo::None | TypeInfo::Identityref(_) | TypeInfo::Dec64 { .. } => {}
        }
    }
}

/// A named type derivation.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Typedef {
    /// Typedef name.
    pub name: StrId,
    /// The derived type.
    pub ty: Type,
    /// Description.
    pub dsc: Option<StrId>,
    /// Reference.
    pub reference: Option<StrId>,
    /// Status.
    pub status: Status,
}

impl Typedef {
    /// Release every dictionary reference held by this typedef.
    pub fn release(&self, dict: &mut Dict) {
        dict.remove(self.name);
        if let Some(dsc) = self.dsc {
            dict.remove(dsc);
        }
        if let Some(r) = self.reference {
            dict.remove(r);
        }
        self.ty.release(dict);
    }
}

/// A named identity.
///
/// Identities form a directed acyclic graph through `base`; every identity
/// also appears in the `derived` list of each of its ancestors, so
/// identity-subtree queries are O(depth).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identity {
    /// Identity name.
    pub name: StrId,
    /// Description.
    pub dsc: Option<StrId>,
    /// Reference.
    pub reference: Option<StrId>,
    /// Status.
    pub status: Status,
    /// Base identity, when derived.
    pub base: Option<IdentRef>,
    /// Identities derived from this one, directly or transitively.
    pub derived: Vec<IdentRef>,
}

impl Identity {
    /// Create an identity with no base.
    #[must_use]
    pub fn new(name: StrId) -> Self {
        Self {
            name,
            dsc: None,
            reference: None,
            status: Status::Current,
            base: None,
            derived: Vec::new(),
        }
    }

    /// Release every dictionary reference held by this identity.
    pub fn release(&self, dict: &mut Dict) {
        dict.remove(self.name);
        if let Some(dsc) = self.dsc {
            dict.remove(dsc);
        }
        if let Some(r) = self.reference {
            dict.remove(r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_lookup() {
        assert_eq!(TypeBase::from_name("string"), Some(TypeBase::String));
        assert_eq!(TypeBase::from_name("uint32"), Some(TypeBase::Uint32));
        assert_eq!(
            TypeBase::from_name("instance-identifier"),
            Some(TypeBase::InstanceIdentifier)
        );
        assert_eq!(TypeBase::from_name("int128"), None);
        assert_eq!(BUILTIN_TYPES.len(), 19);
    }

    #[test]
    fn test_builtin_names_round_trip() {
        for base in BUILTIN_TYPES {
            assert_eq!(TypeBase::from_name(base.name()), Some(base));
        }
    }

    #[test]
    fn test_status_default() {
        assert_eq!(Status::default(), Status::Current);
        assert_eq!(Status::Deprecated.as_str(), "deprecated");
    }

    #[test]
    fn test_type_release_balances_refs() {
        let mut dict = Dict::new();
        let prefix = dict.insert("p");
        let name = dict.insert("a");
        let ty = Type {
            base: TypeBase::Enumeration,
            prefix: Some(prefix),
            der: TypeDer::Builtin,
            info: TypeInfo::Enums(alloc::vec![EnumSpec {
                name,
                dsc: None,
                reference: None,
                status: Status::Current,
                value: 0,
            }]),
        };
        ty.release(&mut dict);
        assert!(dict.is_empty());
    }
}
