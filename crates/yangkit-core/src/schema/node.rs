//! Schema tree nodes.
//!
//! Nodes live in a per-module arena ([`super::Module`]) and are linked in the
//! same half-ring shape as the XML tree: within one parent, the first
//! child's `prev` points at the last child and the last child's `next` is
//! `None`. Cross-module links (grouping targets, identity bases, typedef
//! derivations) are handles into the owning module's tables.

use super::types::{Config, ModuleHandle, Status, Type, Typedef};
use crate::dict::Dict;
use crate::ids::{NodeId, StrId};
use alloc::vec::Vec;

/// Schema node discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// `container`
    Container,
    /// `list`
    List,
    /// `leaf`
    Leaf,
    /// `leaf-list`
    LeafList,
    /// `choice`
    Choice,
    /// `case`
    Case,
    /// `uses`
    Uses,
    /// `grouping`
    Grouping,
    /// `anyxml`
    AnyXml,
}

/// Reference to a grouping node in some module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GrpRef {
    /// Module owning the grouping.
    pub owner: ModuleHandle,
    /// The grouping node.
    pub node: NodeId,
}

/// Kind-specific node payload.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodePayload {
    /// Container payload.
    Container {
        /// The container has `presence` meaning.
        presence: bool,
        /// Local typedef table.
        typedefs: Vec<Typedef>,
    },
    /// List payload.
    List {
        /// Local typedef table.
        typedefs: Vec<Typedef>,
        /// Key leaves, in key-statement order; point at direct leaf
        /// children of the list.
        keys: Vec<NodeId>,
        /// `min-elements`, 0 when unset.
        min_elements: u32,
        /// `max-elements`, `None` for unbounded.
        max_elements: Option<u32>,
    },
    /// Leaf payload.
    Leaf {
        /// Leaf type.
        ty: Type,
        /// `units` string.
        units: Option<StrId>,
        /// `default` value.
        default: Option<StrId>,
    },
    /// Leaf-list payload.
    LeafList {
        /// Leaf-list type.
        ty: Type,
        /// `units` string.
        units: Option<StrId>,
        /// `min-elements`, 0 when unset.
        min_elements: u32,
        /// `max-elements`, `None` for unbounded.
        max_elements: Option<u32>,
    },
    /// Choice payload.
    Choice {
        /// `default` case name.
        default: Option<StrId>,
    },
    /// Case payload.
    Case,
    /// Uses payload.
    Uses {
        /// Referenced grouping; `None` while unresolved (a `uses` inside a
        /// grouping is bound only when the grouping is instantiated).
        grouping: Option<GrpRef>,
        /// Raw `refine` target arguments, recorded but not applied.
        refines: Vec<StrId>,
        /// Raw `augment` target arguments, recorded but not applied.
        augments: Vec<StrId>,
    },
    /// Grouping payload.
    Grouping {
        /// Local typedef table.
        typedefs: Vec<Typedef>,
    },
    /// Anyxml payload.
    AnyXml,
}

impl NodePayload {
    /// The discriminant of this payload.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Container { .. } => NodeKind::Container,
            Self::List { .. } => NodeKind::List,
            Self::Leaf { .. } => NodeKind::Leaf,
            Self::LeafList { .. } => NodeKind::LeafList,
            Self::Choice { .. } => NodeKind::Choice,
            Self::Case => NodeKind::Case,
            Self::Uses { .. } => NodeKind::Uses,
            Self::Grouping { .. } => NodeKind::Grouping,
            Self::AnyXml => NodeKind::AnyXml,
        }
    }
}

/// A schema tree node.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchemaNode {
    /// Parent node; `None` for top-level nodes.
    pub parent: Option<NodeId>,
    /// First child.
    pub child: Option<NodeId>,
    /// Next sibling; `None` for the last.
    pub next: Option<NodeId>,
    /// Previous sibling; the first child points at the last (half ring).
    /// A detached node points at itself.
    pub prev: NodeId,
    /// Owning module or submodule.
    pub module: ModuleHandle,
    /// Node name.
    pub name: StrId,
    /// Description.
    pub dsc: Option<StrId>,
    /// Reference.
    pub reference: Option<StrId>,
    /// Status; inherited from the parent when unspecified.
    pub status: Status,
    /// Config flag; inherited from the parent when unspecified, `W` at the
    /// top level.
    pub config: Config,
    /// `mandatory true`.
    pub mandatory: bool,
    /// `ordered-by user`.
    pub ordered_by_user: bool,
    /// Kind-specific payload.
    pub payload: NodePayload,
}

impl SchemaNode {
    /// The node's discriminant.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    /// Typedef table of this node, when its kind carries one.
    #[must_use]
    pub fn typedefs(&self) -> Option<&[Typedef]> {
        match &self.payload {
            NodePayload::Container { typedefs, .. }
            | NodePayload::List { typedefs, .. }
            | NodePayload::Grouping { typedefs } => Some(typedefs),
            _ => None,
        }
    }

    /// Leaf or leaf-list type, when present.
    #[must_use]
    pub fn leaf_type(&self) -> Option<&Type> {
        match &self.payload {
            NodePayload::Leaf { ty, .. } | NodePayload::LeafList { ty, .. } => Some(ty),
            _ => None,
        }
    }

    /// Release every dictionary reference held by this node (not its
    /// children; the caller walks the tree).
    pub(crate) fn release(&self, dict: &mut Dict) {
        dict.remove(self.name);
        if let Some(dsc) = self.dsc {
            dict.remove(dsc);
        }
        if let Some(r) = self.reference {
            dict.remove(r);
        }
        match &self.payload {
            NodePayload::Container { typedefs, .. } | NodePayload::Grouping { typedefs } => {
                for t in typedefs {
                    t.release(dict);
                }
            }
            NodePayload::List { typedefs, .. } => {
                for t in typedefs {
                    t.release(dict);
                }
            }
            NodePayload::Leaf { ty, units, default } => {
                ty.release(dict);
                if let Some(u) = units {
                    dict.remove(*u);
                }
                if let Some(d) = default {
                    dict.remove(*d);
                }
            }
            NodePayload::LeafList { ty, units, .. } => {
                ty.release(dict);
                if let Some(u) = units {
                    dict.remove(*u);
                }
            }
            NodePayload::Choice { default } => {
                if let Some(d) = default {
                    dict.remove(*d);
                }
            }
            NodePayload::Uses {
                refines, augments, ..
            } => {
                for r in refines {
                    dict.remove(*r);
                }
                for a in augments {
                    dict.remove(*a);
                }
            }
            NodePayload::Case | NodePayload::AnyXml => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kind() {
        assert_eq!(
            NodePayload::Container {
                presence: false,
                typedefs: Vec::new()
            }
            .kind(),
            NodeKind::Container
        );
        assert_eq!(NodePayload::AnyXml.kind(), NodeKind::AnyXml);
    }

    #[test]
    fn test_release_balances_refs() {
        let mut dict = Dict::new();
        let name = dict.insert("c");
        let dsc = dict.insert("a container");
        let node = SchemaNode {
            parent: None,
            child: None,
            next: None,
            prev: NodeId::from_raw(1).unwrap(),
            module: ModuleHandle::Module(crate::ids::ModuleId::from_raw(1).unwrap()),
            name,
            dsc: Some(dsc),
            reference: None,
            status: Status::Current,
            config: Config::Write,
            mandatory: false,
            ordered_by_user: false,
            payload: NodePayload::Container {
                presence: false,
                typedefs: Vec::new(),
            },
        };
        node.release(&mut dict);
        assert!(dict.is_empty());
    }
}
