//! Compiled schema model.
//!
//! A [`Module`] is the end product of the YIN compiler: header metadata,
//! revision history, import/include tables, typedefs, identities, features,
//! and a tree of schema nodes kept in a per-module arena. The context owns
//! every module; all cross-module links are index handles (see
//! [`types::TpdfRef`], [`types::IdentRef`], [`node::GrpRef`]).

pub mod node;
pub mod types;

pub use node::{GrpRef, NodeKind, NodePayload, SchemaNode};
pub use types::{
    BitSpec, Config, EnumSpec, IdentRef, Identity, ModuleHandle, Status, TpdfRef, Type, TypeBase,
    TypeDer, TypeInfo, Typedef, BUILTIN_TYPES,
};

use crate::dict::Dict;
use crate::error::Error;
use crate::ids::{ModuleId, NodeId, StrId, SubmoduleId};
use alloc::vec::Vec;

/// One `revision` entry.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Revision {
    /// Revision date, fixed-width `YYYY-MM-DD`.
    pub date: StrId,
    /// Description.
    pub dsc: Option<StrId>,
    /// Reference.
    pub reference: Option<StrId>,
}

/// A resolved `import`.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Import {
    /// Prefix the importing module uses for the target.
    pub prefix: StrId,
    /// Requested revision date, when pinned.
    pub revision: Option<StrId>,
    /// The imported module.
    pub module: ModuleId,
}

/// A resolved `include`.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Include {
    /// Requested revision date, when pinned.
    pub revision: Option<StrId>,
    /// The included submodule.
    pub submodule: SubmoduleId,
}

/// A `feature` declaration with its advertisement state.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    /// Feature name.
    pub name: StrId,
    /// Description.
    pub dsc: Option<StrId>,
    /// Reference.
    pub reference: Option<StrId>,
    /// Status.
    pub status: Status,
    /// Currently enabled.
    pub enabled: bool,
}

/// A compiled module or submodule.
///
/// A submodule carries `belongs_to` and no namespace/prefix of its own.
#[derive(Clone, Debug)]
pub struct Module {
    /// This module's handle in the context.
    pub handle: ModuleHandle,
    /// Module name.
    pub name: StrId,
    /// Namespace URI; `None` for submodules.
    pub namespace: Option<StrId>,
    /// Module prefix; `None` for submodules.
    pub prefix: Option<StrId>,
    /// Owning module, for submodules.
    pub belongs_to: Option<ModuleId>,
    /// YANG language version (1 for RFC 6020).
    pub version: u8,
    /// Description.
    pub dsc: Option<StrId>,
    /// Reference.
    pub reference: Option<StrId>,
    /// Organization.
    pub organization: Option<StrId>,
    /// Contact.
    pub contact: Option<StrId>,
    /// Revision history, in source order.
    pub revisions: Vec<Revision>,
    /// Imports.
    pub imports: Vec<Import>,
    /// Includes.
    pub includes: Vec<Include>,
    /// Top-level typedefs.
    pub typedefs: Vec<Typedef>,
    /// Identities.
    pub identities: Vec<Identity>,
    /// Features.
    pub features: Vec<Feature>,
    /// Loaded explicitly (`implement`) rather than as an import dependency.
    pub implemented: bool,
    /// First top-level data node.
    pub data: Option<NodeId>,
    nodes: Vec<Option<SchemaNode>>,
}

impl Module {
    /// Create an empty module shell.
    #[must_use]
    pub fn new(handle: ModuleHandle, name: StrId) -> Self {
        Self {
            handle,
            name,
            namespace: None,
            prefix: None,
            belongs_to: None,
            version: 0,
            dsc: None,
            reference: None,
            organization: None,
            contact: None,
            revisions: Vec::new(),
            imports: Vec::new(),
            includes: Vec::new(),
            typedefs: Vec::new(),
            identities: Vec::new(),
            features: Vec::new(),
            implemented: false,
            data: None,
            nodes: Vec::new(),
        }
    }

    // === Node arena ===

    /// Allocate a detached node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capacity`] past `u32::MAX - 1` nodes.
    pub fn alloc_node(&mut self, mut node: SchemaNode) -> Result<NodeId, Error> {
        let id = NodeId::from_index(self.nodes.len()).ok_or(Error::Capacity("schema nodes"))?;
        node.prev = id;
        self.nodes.push(Some(node));
        Ok(id)
    }

    /// Get a node.
    ///
    /// # Panics
    ///
    /// Panics if the node has been freed.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &SchemaNode {
        self.nodes[id.to_index()].as_ref().expect("freed node")
    }

    /// Get a mutable node.
    ///
    /// # Panics
    ///
    /// Panics if the node has been freed.
    pub fn node_mut(&mut self, id: NodeId) -> &mut SchemaNode {
        self.nodes[id.to_index()].as_mut().expect("freed node")
    }

    /// Append `child` into `parent`'s half ring; `None` appends to the
    /// module's top-level ring.
    pub fn add_child(&mut self, parent: Option<NodeId>, child: NodeId) {
        self.node_mut(child).parent = parent;

        let first = match parent {
            Some(p) => self.node(p).child,
            None => self.data,
        };
        match first {
            Some(first) => {
                let last = self.node(first).prev;
                self.node_mut(child).prev = last;
                self.node_mut(child).next = None;
                self.node_mut(last).next = Some(child);
                self.node_mut(first).prev = child;
            }
            None => {
                match parent {
                    Some(p) => self.node_mut(p).child = Some(child),
                    None => self.data = Some(child),
                }
                self.node_mut(child).prev = child;
                self.node_mut(child).next = None;
            }
        }
    }

    /// Detach a node from its parent and siblings, restoring the half ring.
    pub fn unlink_node(&mut self, id: NodeId) {
        let parent = self.node(id).parent;
        let first = match parent {
            Some(p) => self.node(p).child,
            None => self.data,
        };
        if first == Some(id) {
            let next = self.node(id).next;
            match parent {
                Some(p) => self.node_mut(p).child = next,
                None => self.data = next,
            }
        }
        self.node_mut(id).parent = None;

        let prev = self.node(id).prev;
        if prev == id {
            return;
        }
        let next = self.node(id).next;
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => {
                // unlinking the last: fix the (new) first's back link
                let first = match parent {
                    Some(p) => self.node(p).child,
                    None => self.data,
                };
                if let Some(f) = first {
                    self.node_mut(f).prev = prev;
                }
            }
        }
        if self.node(prev).next == Some(id) {
            self.node_mut(prev).next = next;
        }
        self.node_mut(id).next = None;
        self.node_mut(id).prev = id;
    }

    /// Recursively free a node: descendants first, then the node's own
    /// payload references. Identity and typedef targets are handles into
    /// other tables and are not owned, so they are left alone.
    pub fn free_node(&mut self, dict: &mut Dict, id: NodeId) {
        self.unlink_node(id);
        self.free_node_rec(dict, id);
    }

    fn free_node_rec(&mut self, dict: &mut Dict, id: NodeId) {
        let mut child = self.node(id).child;
        while let Some(c) = child {
            child = self.node(c).next;
            self.free_node_rec(dict, c);
        }
        let node = self.nodes[id.to_index()].take().expect("freed node");
        node.release(dict);
    }

    /// Iterate the children of `parent` (`None` for top-level nodes).
    pub fn children(&self, parent: Option<NodeId>) -> NodeIter<'_> {
        NodeIter {
            module: self,
            next: match parent {
                Some(p) => self.node(p).child,
                None => self.data,
            },
        }
    }

    /// Linear search of `parent`'s half ring for a node named `name` whose
    /// kind is in `kinds` (an empty slice matches any kind).
    #[must_use]
    pub fn find_child(
        &self,
        parent: Option<NodeId>,
        name: StrId,
        kinds: &[NodeKind],
    ) -> Option<NodeId> {
        self.children(parent).find(|&id| {
            let node = self.node(id);
            node.name == name && (kinds.is_empty() || kinds.contains(&node.kind()))
        })
    }

    /// Number of live nodes in the arena.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    // === Features ===

    /// Feature names with a parallel on/off state vector.
    #[must_use]
    pub fn features_list(&self) -> (Vec<StrId>, Vec<bool>) {
        let names = self.features.iter().map(|f| f.name).collect();
        let states = self.features.iter().map(|f| f.enabled).collect();
        (names, states)
    }

    // === Revisions ===

    /// The newest revision date, by lexicographic `YYYY-MM-DD` comparison.
    #[must_use]
    pub fn newest_revision(&self, dict: &Dict) -> Option<StrId> {
        self.revisions
            .iter()
            .map(|r| r.date)
            .max_by(|a, b| dict.get(*a).cmp(dict.get(*b)))
    }

    // === Teardown ===

    /// Release every dictionary reference held by the module. Called by the
    /// context on teardown and on failed compilation; pairs every `insert`
    /// made while building the module with a `remove`.
    pub fn release(&self, dict: &mut Dict) {
        dict.remove(self.name);
        for s in [
            self.namespace,
            self.prefix,
            self.dsc,
            self.reference,
            self.organization,
            self.contact,
        ]
        .into_iter()
        .flatten()
        {
            dict.remove(s);
        }
        for rev in &self.revisions {
            dict.remove(rev.date);
            for s in [rev.dsc, rev.reference].into_iter().flatten() {
                dict.remove(s);
            }
        }
        for imp in &self.imports {
            dict.remove(imp.prefix);
            if let Some(rev) = imp.revision {
                dict.remove(rev);
            }
        }
        for inc in &self.includes {
            if let Some(rev) = inc.revision {
                dict.remove(rev);
            }
        }
        for tpdf in &self.typedefs {
            tpdf.release(dict);
        }
        for ident in &self.identities {
            ident.release(dict);
        }
        for feature in &self.features {
            dict.remove(feature.name);
            for s in [feature.dsc, feature.reference].into_iter().flatten() {
                dict.remove(s);
            }
        }
        for node in self.nodes.iter().flatten() {
            node.release(dict);
        }
    }
}

/// Iterator over a schema sibling list.
pub struct NodeIter<'a> {
    module: &'a Module,
    next: Option<NodeId>,
}

impl Iterator for NodeIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.next?;
        self.next = self.module.node(cur).next;
        Some(cur)
    }
}
