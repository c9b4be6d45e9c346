//! In-memory XML tree.
//!
//! Elements live in an arena indexed by [`ElemId`]; sibling order is kept in a
//! half ring: the first child's `prev` points to the last child while the last
//! child's `next` is `None`, giving O(1) append without a tail pointer. All
//! names, values, and text content are interned in the caller's [`Dict`].
//!
//! The tree is produced by [`XmlDoc::parse`], mutated only by the schema
//! compiler (which unlinks statements into staging lists), and destroyed
//! element by element once the compiler has copied what it needs.

mod dump;
mod parse;

pub use dump::{ClbWrite, DumpOpts, XmlWrite};

#[cfg(feature = "std")]
pub use dump::IoWrite;

use crate::dict::Dict;
use crate::ids::{ElemId, StrId};
use alloc::vec::Vec;

/// Reference to a namespace declaration: the element carrying the `xmlns`
/// attribute and the attribute's index within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NsRef {
    /// Element holding the declaration.
    pub elem: ElemId,
    /// Index into that element's attribute list.
    pub attr: u32,
}

/// Attribute variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrKind {
    /// Standard attribute, with its resolved namespace if the name was
    /// prefixed.
    Std {
        /// Resolved namespace of the attribute, if prefixed.
        ns: Option<NsRef>,
    },
    /// Namespace declaration (`xmlns` or `xmlns:prefix`).
    Ns,
}

/// An element attribute. Attributes keep document order in a per-element
/// vector; namespace declarations share the list with standard attributes.
#[derive(Clone, Copy, Debug)]
pub struct Attr {
    /// Variant tag.
    pub kind: AttrKind,
    /// Local name. `None` only for a default namespace declaration.
    pub name: Option<StrId>,
    /// Attribute value (the URI for namespace declarations).
    pub value: StrId,
}

/// An XML element.
///
/// A `None` name marks an anonymous text chunk inside mixed content.
#[derive(Clone, Debug)]
pub struct Element {
    /// Parent element.
    pub parent: Option<ElemId>,
    /// First child.
    pub child: Option<ElemId>,
    /// Next sibling; `None` for the last child.
    pub next: Option<ElemId>,
    /// Previous sibling; the first child points at the last (half ring).
    /// A detached element points at itself.
    pub prev: ElemId,
    /// Attributes and namespace declarations, in document order.
    pub attrs: Vec<Attr>,
    /// Element name, or `None` for a mixed-content text chunk.
    pub name: Option<StrId>,
    /// Resolved namespace.
    pub ns: Option<NsRef>,
    /// Text content, when the element holds only character data.
    pub content: Option<StrId>,
    /// Character data appeared alongside child elements.
    pub mixed: bool,
    /// Source line of the open tag.
    pub line: u32,
}

/// Arena-backed XML document.
#[derive(Clone, Debug, Default)]
pub struct XmlDoc {
    elems: Vec<Option<Element>>,
    root: Option<ElemId>,
}

impl XmlDoc {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The document root, if a parse succeeded.
    #[must_use]
    pub fn root(&self) -> Option<ElemId> {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: Option<ElemId>) {
        self.root = root;
    }

    /// Allocate a detached element.
    pub(crate) fn alloc(&mut self, name: Option<StrId>, line: u32) -> ElemId {
        let id = ElemId::from_index(self.elems.len()).expect("too many elements");
        self.elems.push(Some(Element {
            parent: None,
            child: None,
            next: None,
            prev: id,
            attrs: Vec::new(),
            name,
            ns: None,
            content: None,
            mixed: false,
            line,
        }));
        id
    }

    /// Get an element.
    ///
    /// # Panics
    ///
    /// Panics if the element has been freed.
    #[must_use]
    pub fn elem(&self, id: ElemId) -> &Element {
        self.elems[id.to_index()].as_ref().expect("freed element")
    }

    /// Get a mutable element.
    ///
    /// # Panics
    ///
    /// Panics if the element has been freed.
    pub fn elem_mut(&mut self, id: ElemId) -> &mut Element {
        self.elems[id.to_index()].as_mut().expect("freed element")
    }

    /// Check whether an element is still live.
    #[must_use]
    pub fn is_live(&self, id: ElemId) -> bool {
        self.elems
            .get(id.to_index())
            .is_some_and(Option::is_some)
    }

    /// Append `child` to `parent`'s half ring. A child linked elsewhere is
    /// unlinked first.
    pub fn add_child(&mut self, parent: ElemId, child: ElemId) {
        if self.elem(child).parent.is_some() {
            self.unlink(child);
        }
        self.elem_mut(child).parent = Some(parent);

        match self.elem(parent).child {
            Some(first) => {
                let last = self.elem(first).prev;
                self.elem_mut(child).prev = last;
                self.elem_mut(child).next = None;
                self.elem_mut(last).next = Some(child);
                self.elem_mut(first).prev = child;
            }
            None => {
                self.elem_mut(parent).child = Some(child);
                self.elem_mut(child).prev = child;
                self.elem_mut(child).next = None;
            }
        }
    }

    /// Detach an element from its parent and siblings, restoring the half
    /// ring around it. The element keeps its children and attributes.
    pub fn unlink(&mut self, id: ElemId) {
        let parent = self.elem(id).parent;

        if let Some(p) = parent {
            if self.elem(p).child == Some(id) {
                self.elem_mut(p).child = self.elem(id).next;
            }
            self.elem_mut(id).parent = None;
        }

        let prev = self.elem(id).prev;
        if prev == id {
            // no siblings
            return;
        }
        let next = self.elem(id).next;
        match next {
            Some(n) => self.elem_mut(n).prev = prev,
            None => {
                // unlinking the last element: fix the first child's back link
                let first = match parent {
                    Some(p) => self.elem(p).child,
                    None => {
                        let mut first = id;
                        while let Some(f) = self.prev_in_ring(first) {
                            first = f;
                        }
                        Some(first)
                    }
                };
                if let Some(f) = first {
                    self.elem_mut(f).prev = prev;
                }
            }
        }
        if self.elem(prev).next == Some(id) {
            self.elem_mut(prev).next = next;
        }

        self.elem_mut(id).next = None;
        self.elem_mut(id).prev = id;
    }

    /// Previous sibling through the ring, `None` when `id` is the first
    /// child (its `prev` back link points at the last sibling).
    fn prev_in_ring(&self, id: ElemId) -> Option<ElemId> {
        let prev = self.elem(id).prev;
        if prev == id || self.elem(prev).next != Some(id) {
            None
        } else {
            Some(prev)
        }
    }

    /// Iterate an element's children in document order.
    pub fn children(&self, parent: ElemId) -> ChildIter<'_> {
        ChildIter {
            doc: self,
            next: self.elem(parent).child,
        }
    }

    /// First child with the given interned name.
    #[must_use]
    pub fn child_by_name(&self, parent: ElemId, name: StrId) -> Option<ElemId> {
        self.children(parent)
            .find(|&c| self.elem(c).name == Some(name))
    }

    /// Free an element with all its attributes and descendants, releasing
    /// every dictionary reference the subtree holds.
    pub fn free_elem(&mut self, dict: &mut Dict, id: ElemId) {
        self.unlink(id);
        if self.root == Some(id) {
            self.root = None;
        }
        self.free_rec(dict, id);
    }

    fn free_rec(&mut self, dict: &mut Dict, id: ElemId) {
        let mut child = self.elem(id).child;
        while let Some(c) = child {
            child = self.elem(c).next;
            self.free_rec(dict, c);
        }

        let elem = self.elems[id.to_index()].take().expect("freed element");
        for attr in &elem.attrs {
            if let Some(name) = attr.name {
                dict.remove(name);
            }
            dict.remove(attr.value);
        }
        if let Some(name) = elem.name {
            dict.remove(name);
        }
        if let Some(content) = elem.content {
            dict.remove(content);
        }
    }

    /// Resolve a prefix against the namespace declarations in scope at
    /// `elem`; the nearest ancestor wins. `None` asks for the default
    /// namespace; an empty default declaration (`xmlns=""`) cancels it.
    #[must_use]
    pub fn get_ns(&self, dict: &Dict, elem: ElemId, prefix: Option<&str>) -> Option<NsRef> {
        let mut cur = Some(elem);
        while let Some(e) = cur {
            for (i, attr) in self.elem(e).attrs.iter().enumerate() {
                if attr.kind != AttrKind::Ns {
                    continue;
                }
                match (attr.name, prefix) {
                    (None, None) => {
                        if dict.get(attr.value).is_empty() {
                            return None;
                        }
                        return Some(NsRef {
                            elem: e,
                            attr: i as u32,
                        });
                    }
                    (Some(name), Some(p)) if dict.get(name) == p => {
                        return Some(NsRef {
                            elem: e,
                            attr: i as u32,
                        });
                    }
                    _ => {}
                }
            }
            cur = self.elem(e).parent;
        }
        None
    }

    /// Namespace declaration parts: `(prefix, uri)`.
    #[must_use]
    pub fn ns_parts(&self, ns: NsRef) -> (Option<StrId>, StrId) {
        let attr = &self.elem(ns.elem).attrs[ns.attr as usize];
        (attr.name, attr.value)
    }

    /// Value of a standard attribute by name. `ns_uri` of `None` matches
    /// only attributes without a namespace.
    #[must_use]
    pub fn get_attr(
        &self,
        dict: &Dict,
        elem: ElemId,
        name: &str,
        ns_uri: Option<&str>,
    ) -> Option<StrId> {
        for attr in &self.elem(elem).attrs {
            let AttrKind::Std { ns } = attr.kind else {
                continue;
            };
            if attr.name.map(|n| dict.get(n)) != Some(name) {
                continue;
            }
            let attr_uri = ns.map(|r| dict.get(self.ns_parts(r).1));
            if attr_uri == ns_uri {
                return Some(attr.value);
            }
        }
        None
    }

    /// Number of live elements (for leak assertions in tests).
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.elems.iter().filter(|e| e.is_some()).count()
    }
}

/// Iterator over a sibling list.
pub struct ChildIter<'a> {
    doc: &'a XmlDoc,
    next: Option<ElemId>,
}

impl Iterator for ChildIter<'_> {
    type Item = ElemId;

    fn next(&mut self) -> Option<ElemId> {
        let cur = self.next?;
        self.next = self.doc.elem(cur).next;
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(doc: &mut XmlDoc, dict: &mut Dict, name: &str) -> ElemId {
        let name = dict.insert(name);
        doc.alloc(Some(name), 1)
    }

    #[test]
    fn test_half_ring_append() {
        let mut doc = XmlDoc::new();
        let mut dict = Dict::new();
        let p = named(&mut doc, &mut dict, "p");
        let a = named(&mut doc, &mut dict, "a");
        let b = named(&mut doc, &mut dict, "b");
        let c = named(&mut doc, &mut dict, "c");
        doc.add_child(p, a);
        doc.add_child(p, b);
        doc.add_child(p, c);

        // first child's prev points to the last child
        assert_eq!(doc.elem(p).child, Some(a));
        assert_eq!(doc.elem(a).prev, c);
        assert_eq!(doc.elem(c).next, None);

        // walking next from the first reaches the last in N-1 steps
        let order: Vec<_> = doc.children(p).collect();
        assert_eq!(order, [a, b, c]);
        assert_eq!(doc.elem(b).prev, a);
        assert_eq!(doc.elem(c).prev, b);
    }

    #[test]
    fn test_unlink_middle() {
        let mut doc = XmlDoc::new();
        let mut dict = Dict::new();
        let p = named(&mut doc, &mut dict, "p");
        let a = named(&mut doc, &mut dict, "a");
        let b = named(&mut doc, &mut dict, "b");
        let c = named(&mut doc, &mut dict, "c");
        doc.add_child(p, a);
        doc.add_child(p, b);
        doc.add_child(p, c);

        doc.unlink(b);
        let order: Vec<_> = doc.children(p).collect();
        assert_eq!(order, [a, c]);
        assert_eq!(doc.elem(a).prev, c);
        assert_eq!(doc.elem(c).prev, a);
        assert_eq!(doc.elem(b).parent, None);
        assert_eq!(doc.elem(b).prev, b);
        assert_eq!(doc.elem(b).next, None);
    }

    #[test]
    fn test_unlink_first_and_last() {
        let mut doc = XmlDoc::new();
        let mut dict = Dict::new();
        let p = named(&mut doc, &mut dict, "p");
        let a = named(&mut doc, &mut dict, "a");
        let b = named(&mut doc, &mut dict, "b");
        let c = named(&mut doc, &mut dict, "c");
        doc.add_child(p, a);
        doc.add_child(p, b);
        doc.add_child(p, c);

        doc.unlink(a);
        assert_eq!(doc.elem(p).child, Some(b));
        assert_eq!(doc.elem(b).prev, c);

        doc.unlink(c);
        assert_eq!(doc.elem(p).child, Some(b));
        assert_eq!(doc.elem(b).prev, b);
        assert_eq!(doc.elem(b).next, None);
    }

    #[test]
    fn test_unlink_sole_child() {
        let mut doc = XmlDoc::new();
        let mut dict = Dict::new();
        let p = named(&mut doc, &mut dict, "p");
        let a = named(&mut doc, &mut dict, "a");
        doc.add_child(p, a);
        doc.unlink(a);
        assert_eq!(doc.elem(p).child, None);
        assert_eq!(doc.elem(a).parent, None);
    }

    #[test]
    fn test_reparent() {
        let mut doc = XmlDoc::new();
        let mut dict = Dict::new();
        let p = named(&mut doc, &mut dict, "p");
        let q = named(&mut doc, &mut dict, "q");
        let a = named(&mut doc, &mut dict, "a");
        doc.add_child(p, a);
        doc.add_child(q, a);
        assert_eq!(doc.elem(p).child, None);
        assert_eq!(doc.elem(a).parent, Some(q));
        assert_eq!(doc.children(q).collect::<Vec<_>>(), [a]);
    }

    #[test]
    fn test_free_releases_dict_refs() {
        let mut doc = XmlDoc::new();
        let mut dict = Dict::new();
        let p = named(&mut doc, &mut dict, "p");
        let a = named(&mut doc, &mut dict, "a");
        doc.add_child(p, a);
        let name_a = doc.elem(a).name.unwrap();
        assert_eq!(dict.refcount(name_a), 1);

        doc.free_elem(&mut dict, p);
        assert_eq!(dict.refcount(name_a), 0);
        assert_eq!(doc.live_count(), 0);
    }

    #[test]
    fn test_get_ns_nearest_ancestor_wins() {
        let mut doc = XmlDoc::new();
        let mut dict = Dict::new();
        let outer = named(&mut doc, &mut dict, "outer");
        let inner = named(&mut doc, &mut dict, "inner");
        doc.add_child(outer, inner);

        let prefix = dict.insert("x");
        let outer_uri = dict.insert("urn:outer");
        doc.elem_mut(outer).attrs.push(Attr {
            kind: AttrKind::Ns,
            name: Some(prefix),
            value: outer_uri,
        });
        let prefix2 = dict.insert("x");
        let inner_uri = dict.insert("urn:inner");
        doc.elem_mut(inner).attrs.push(Attr {
            kind: AttrKind::Ns,
            name: Some(prefix2),
            value: inner_uri,
        });

        let ns = doc.get_ns(&dict, inner, Some("x")).unwrap();
        assert_eq!(ns.elem, inner);
        let ns = doc.get_ns(&dict, outer, Some("x")).unwrap();
        assert_eq!(ns.elem, outer);
        assert!(doc.get_ns(&dict, inner, Some("y")).is_none());
    }

    #[test]
    fn test_empty_default_ns_cancels() {
        let mut doc = XmlDoc::new();
        let mut dict = Dict::new();
        let outer = named(&mut doc, &mut dict, "outer");
        let inner = named(&mut doc, &mut dict, "inner");
        doc.add_child(outer, inner);

        let uri = dict.insert("urn:outer");
        doc.elem_mut(outer).attrs.push(Attr {
            kind: AttrKind::Ns,
            name: None,
            value: uri,
        });
        let empty = dict.insert("");
        doc.elem_mut(inner).attrs.push(Attr {
            kind: AttrKind::Ns,
            name: None,
            value: empty,
        });

        assert!(doc.get_ns(&dict, outer, None).is_some());
        // xmlns="" cancels the inherited default namespace
        assert!(doc.get_ns(&dict, inner, None).is_none());
    }
}
