//! XML tree serialization.
//!
//! The dumper renders a subtree back to bytes. Option flags select the open
//! part, the close part, or only the attributes of the top element; the
//! format flag indents children. Namespace declarations that repeat a binding
//! already in scope at the element's position are suppressed.

use super::{AttrKind, XmlDoc};
use crate::dict::Dict;
use crate::ids::ElemId;
use alloc::string::String;

/// Dump options. With no flag set the element is printed with all its
/// children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DumpOpts {
    /// Print only the open part of the element. Combined with `close`,
    /// prints the element without its children: `<element/>`.
    pub open: bool,
    /// Print only the closing part of the element.
    pub close: bool,
    /// Print only attributes and namespace declarations, without the
    /// element name. Not combinable with `open`/`close`.
    pub attrs_only: bool,
    /// Indent children. Ignored when any other flag is set.
    pub format: bool,
}

impl DumpOpts {
    /// Formatted full dump.
    #[must_use]
    pub fn formatted() -> Self {
        Self {
            format: true,
            ..Self::default()
        }
    }
}

/// Byte sink for the dumper.
///
/// Implemented for `String`; [`ClbWrite`] adapts any `FnMut(&str)` callback
/// and, with the `std` feature, [`IoWrite`] adapts any `std::io::Write`
/// (streams, file descriptors).
pub trait XmlWrite {
    /// Write a chunk of output.
    fn write_str(&mut self, s: &str);
}

impl XmlWrite for String {
    fn write_str(&mut self, s: &str) {
        self.push_str(s);
    }
}

/// Adapter from [`XmlWrite`] to a caller-provided callback.
pub struct ClbWrite<F: FnMut(&str)>(pub F);

impl<F: FnMut(&str)> XmlWrite for ClbWrite<F> {
    fn write_str(&mut self, s: &str) {
        (self.0)(s);
    }
}

/// Adapter from [`XmlWrite`] to `std::io::Write`.
#[cfg(feature = "std")]
pub struct IoWrite<W: std::io::Write>(pub W);

#[cfg(feature = "std")]
impl<W: std::io::Write> XmlWrite for IoWrite<W> {
    fn write_str(&mut self, s: &str) {
        let _ = self.0.write_all(s.as_bytes());
    }
}

/// Escape text content: `& < >`.
fn write_text(out: &mut dyn XmlWrite, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.write_str("&amp;"),
            '<' => out.write_str("&lt;"),
            '>' => out.write_str("&gt;"),
            _ => {
                let mut buf = [0u8; 4];
                out.write_str(c.encode_utf8(&mut buf));
            }
        }
    }
}

/// Escape an attribute value: text escapes plus the double quote.
fn write_attr_value(out: &mut dyn XmlWrite, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.write_str("&amp;"),
            '<' => out.write_str("&lt;"),
            '>' => out.write_str("&gt;"),
            '"' => out.write_str("&quot;"),
            _ => {
                let mut buf = [0u8; 4];
                out.write_str(c.encode_utf8(&mut buf));
            }
        }
    }
}

impl XmlDoc {
    /// Dump an element to a sink.
    pub fn dump(&self, dict: &Dict, out: &mut dyn XmlWrite, elem: ElemId, opts: DumpOpts) {
        self.dump_elem(dict, out, elem, 0, opts);
    }

    /// Dump an element into a fresh string.
    #[must_use]
    pub fn dump_mem(&self, dict: &Dict, elem: ElemId, opts: DumpOpts) -> String {
        let mut out = String::new();
        self.dump(dict, &mut out, elem, opts);
        out
    }

    /// True when an ancestor of `elem` already declares `prefix` with the
    /// same URI.
    fn ns_in_scope(&self, dict: &Dict, elem: ElemId, prefix: Option<&str>, uri: &str) -> bool {
        let Some(parent) = self.elem(elem).parent else {
            return false;
        };
        match self.get_ns(dict, parent, prefix) {
            Some(ns) => dict.get(self.ns_parts(ns).1) == uri,
            None => false,
        }
    }

    fn write_qname(&self, dict: &Dict, out: &mut dyn XmlWrite, elem: ElemId) {
        if let Some(ns) = self.elem(elem).ns {
            if let (Some(prefix), _) = self.ns_parts(ns) {
                out.write_str(dict.get(prefix));
                out.write_str(":");
            }
        }
        out.write_str(dict.get(self.elem(elem).name.expect("named element")));
    }

    fn write_attrs(&self, dict: &Dict, out: &mut dyn XmlWrite, elem: ElemId) {
        for attr in &self.elem(elem).attrs {
            match attr.kind {
                AttrKind::Ns => {
                    let uri = dict.get(attr.value);
                    let prefix = attr.name.map(|n| dict.get(n));
                    if self.ns_in_scope(dict, elem, prefix, uri) {
                        continue;
                    }
                    match prefix {
                        Some(p) => {
                            out.write_str(" xmlns:");
                            out.write_str(p);
                        }
                        None => out.write_str(" xmlns"),
                    }
                    out.write_str("=\"");
                    write_attr_value(out, uri);
                    out.write_str("\"");
                }
                AttrKind::Std { ns } => {
                    out.write_str(" ");
                    if let Some(ns) = ns {
                        if let (Some(prefix), _) = self.ns_parts(ns) {
                            out.write_str(dict.get(prefix));
                            out.write_str(":");
                        }
                    }
                    out.write_str(dict.get(attr.name.expect("attribute name")));
                    out.write_str("=\"");
                    write_attr_value(out, dict.get(attr.value));
                    out.write_str("\"");
                }
            }
        }
    }

    fn indent(out: &mut dyn XmlWrite, level: usize) {
        for _ in 0..level {
            out.write_str("  ");
        }
    }

    fn dump_elem(&self, dict: &Dict, out: &mut dyn XmlWrite, elem: ElemId, level: usize, opts: DumpOpts) {
        let e = self.elem(elem);
        if e.name.is_none() {
            // mixed-content text chunk
            if let Some(content) = e.content {
                write_text(out, dict.get(content));
            }
            return;
        }

        // no newlines inside or around mixed content
        let in_mixed = e.parent.is_some_and(|p| self.elem(p).mixed);
        let format = opts.format && !e.mixed && !in_mixed;
        let format_outer = opts.format && !in_mixed;

        if opts.attrs_only {
            self.write_attrs(dict, out, elem);
            return;
        }

        if !opts.close || opts.open {
            if format_outer {
                Self::indent(out, level);
            }
            out.write_str("<");
            self.write_qname(dict, out, elem);
            self.write_attrs(dict, out, elem);

            if opts.open && opts.close {
                out.write_str("/>");
                return;
            }
            if opts.open {
                out.write_str(">");
                return;
            }

            if e.child.is_none() && e.content.is_none() {
                out.write_str("/>");
                if format_outer {
                    out.write_str("\n");
                }
                return;
            }
            if let Some(content) = e.content {
                out.write_str(">");
                write_text(out, dict.get(content));
                out.write_str("</");
                self.write_qname(dict, out, elem);
                out.write_str(">");
                if format_outer {
                    out.write_str("\n");
                }
                return;
            }

            out.write_str(">");
            if format {
                out.write_str("\n");
            }
            for child in self.children(elem) {
                self.dump_elem(
                    dict,
                    out,
                    child,
                    level + 1,
                    DumpOpts {
                        format: opts.format,
                        ..DumpOpts::default()
                    },
                );
            }
        }

        if format && !opts.close {
            Self::indent(out, level);
        }
        out.write_str("</");
        self.write_qname(dict, out, elem);
        out.write_str(">");
        if format_outer && !opts.close {
            out.write_str("\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DiagSink;

    fn parse(data: &str) -> (XmlDoc, Dict) {
        let mut dict = Dict::new();
        let mut sink = DiagSink::new();
        let doc = XmlDoc::parse(data, &mut dict, &mut sink).expect("parse");
        (doc, dict)
    }

    fn round(data: &str) -> String {
        let (doc, dict) = parse(data);
        doc.dump_mem(&dict, doc.root().unwrap(), DumpOpts::default())
    }

    #[test]
    fn test_dump_simple() {
        assert_eq!(round("<x/>"), "<x/>");
        assert_eq!(round("<x>text</x>"), "<x>text</x>");
        assert_eq!(round("<x><y/><z/></x>"), "<x><y/><z/></x>");
    }

    #[test]
    fn test_dump_escapes() {
        assert_eq!(round("<x>a &amp; &lt;b&gt;</x>"), "<x>a &amp; &lt;b&gt;</x>");
        assert_eq!(round("<x a=\"&quot;v&quot;\"/>"), "<x a=\"&quot;v&quot;\"/>");
    }

    #[test]
    fn test_dump_namespaces() {
        assert_eq!(
            round("<m:x xmlns:m=\"urn:m\"><m:y/></m:x>"),
            "<m:x xmlns:m=\"urn:m\"><m:y/></m:x>"
        );
    }

    #[test]
    fn test_redundant_ns_suppressed() {
        // the inner re-declaration of the same binding is not emitted
        assert_eq!(
            round("<x xmlns:m=\"urn:m\"><y xmlns:m=\"urn:m\"/></x>"),
            "<x xmlns:m=\"urn:m\"><y/></x>"
        );
        // a different URI for the same prefix must be kept
        assert_eq!(
            round("<x xmlns:m=\"urn:m\"><y xmlns:m=\"urn:other\"/></x>"),
            "<x xmlns:m=\"urn:m\"><y xmlns:m=\"urn:other\"/></x>"
        );
    }

    #[test]
    fn test_round_trip_fixed_point() {
        // dump, re-parse, dump again: byte-identical output
        let inputs = [
            "<a b=\"1\"><c>t&amp;t</c><d xmlns=\"urn:d\"/></a>",
            "<x>one<y/>two</x>",
            "<m:mod xmlns:m=\"urn:m\"><leaf name=\"n\">v</leaf></m:mod>",
        ];
        for input in inputs {
            let first = round(input);
            assert_eq!(round(&first), first, "not a fixed point: {input}");
        }
    }

    #[test]
    fn test_open_close_options() {
        let (doc, dict) = parse("<x a=\"1\"><y/></x>");
        let root = doc.root().unwrap();
        let open = DumpOpts {
            open: true,
            ..DumpOpts::default()
        };
        assert_eq!(doc.dump_mem(&dict, root, open), "<x a=\"1\">");
        let close = DumpOpts {
            close: true,
            ..DumpOpts::default()
        };
        assert_eq!(doc.dump_mem(&dict, root, close), "</x>");
        let both = DumpOpts {
            open: true,
            close: true,
            ..DumpOpts::default()
        };
        assert_eq!(doc.dump_mem(&dict, root, both), "<x a=\"1\"/>");
        let attrs = DumpOpts {
            attrs_only: true,
            ..DumpOpts::default()
        };
        assert_eq!(doc.dump_mem(&dict, root, attrs), " a=\"1\"");
    }

    #[test]
    fn test_formatted() {
        let (doc, dict) = parse("<x><y><z/></y></x>");
        let root = doc.root().unwrap();
        assert_eq!(
            doc.dump_mem(&dict, root, DumpOpts::formatted()),
            "<x>\n  <y>\n    <z/>\n  </y>\n</x>\n"
        );
    }

    #[test]
    fn test_mixed_content_round_trip() {
        assert_eq!(round("<x>one<y/>two</x>"), "<x>one<y/>two</x>");
    }

    #[test]
    fn test_callback_sink() {
        let (doc, dict) = parse("<x/>");
        let mut collected = String::new();
        {
            let mut clb = ClbWrite(|s: &str| collected.push_str(s));
            doc.dump(&dict, &mut clb, doc.root().unwrap(), DumpOpts::default());
        }
        assert_eq!(collected, "<x/>");
    }
}
