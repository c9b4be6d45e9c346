//! XML parser.
//!
//! Consumes a UTF-8 buffer and produces an [`XmlDoc`]. The grammar subset is
//! what schema documents need: the XML declaration, elements, attributes,
//! namespace declarations, the five predefined entities plus numeric
//! character references, CDATA sections, and comments (discarded). DOCTYPE
//! is rejected. Failures are reported to the diagnostic sink and surface as
//! `None`; partially built elements are freed before returning.

use super::{Attr, AttrKind, XmlDoc};
use crate::dict::Dict;
use crate::diag::DiagSink;
use crate::ids::ElemId;
use alloc::format;
use alloc::string::String;

/// XML NameStartChar (production [4]), colon excluded: prefixes are split
/// out of qualified names by the caller.
fn is_name_start_char(c: char) -> bool {
    matches!(c,
        'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

/// XML NameChar (production [4a]), colon excluded.
fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c, '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

fn is_xml_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

impl XmlDoc {
    /// Parse an XML document.
    ///
    /// Returns `None` on any syntax error; the error is reported to `sink`
    /// and everything allocated during the failed parse is freed.
    #[must_use]
    pub fn parse(data: &str, dict: &mut Dict, sink: &mut DiagSink) -> Option<XmlDoc> {
        let mut parser = Parser {
            data,
            pos: 0,
            line: 1,
            doc: XmlDoc::new(),
            dict,
            sink,
        };
        parser.parse_document()
    }
}

struct Parser<'a> {
    data: &'a str,
    pos: usize,
    line: u32,
    doc: XmlDoc,
    dict: &'a mut Dict,
    sink: &'a mut DiagSink,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &str {
        &self.data[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Advance `n` bytes, counting newlines.
    fn bump(&mut self, n: usize) {
        for b in self.data[self.pos..self.pos + n].bytes() {
            if b == b'\n' {
                self.line += 1;
            }
        }
        self.pos += n;
    }

    fn cur_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.rest().bytes().next() {
            if is_xml_ws(b) {
                self.bump(1);
            } else {
                break;
            }
        }
    }

    fn error(&mut self, message: String) {
        let line = self.line;
        self.sink.report(crate::diag::Diagnostic {
            severity: crate::diag::Severity::Error,
            code: None,
            line: Some(line),
            message,
        });
    }

    /// Skip everything up to and including `endstr`.
    fn skip_until(&mut self, endstr: &str) -> bool {
        match self.rest().find(endstr) {
            Some(off) => {
                self.bump(off + endstr.len());
                true
            }
            None => {
                self.error(format!("missing closing sequence \"{endstr}\""));
                false
            }
        }
    }

    fn parse_document(mut self) -> Option<XmlDoc> {
        // prolog: XML declaration, PIs, comments, whitespace
        loop {
            if self.at_end() {
                self.error("empty document".into());
                return None;
            }
            let rest = self.rest();
            if is_xml_ws(rest.as_bytes()[0]) {
                self.skip_ws();
            } else if rest.starts_with("<?") {
                self.bump(2);
                if !self.skip_until("?>") {
                    return None;
                }
            } else if rest.starts_with("<!--") {
                self.bump(4);
                if !self.skip_until("-->") {
                    return None;
                }
            } else if rest.starts_with("<!") {
                self.error("DOCTYPE not supported".into());
                return None;
            } else if rest.starts_with('<') {
                break;
            } else {
                self.error(format!("invalid character '{}'", rest.chars().next().unwrap()));
                return None;
            }
        }

        let root = self.parse_elem(None)?;
        self.doc.set_root(Some(root));

        // the rest of the document may hold comments, PIs, and whitespace;
        // syntax errors there are not detected
        self.skip_ws();
        if !self.at_end() {
            let line = self.line;
            self.sink.warning(Some(line), "data after the root element ignored".into());
        }

        Some(self.doc)
    }

    /// Parse a name, returning `(prefix, local)`.
    fn parse_name(&mut self) -> Option<(Option<&'a str>, &'a str)> {
        let data = self.data;
        let start = self.pos;
        let mut colon = None;
        let Some(c) = self.cur_char() else {
            self.error("unexpected end of input in name".into());
            return None;
        };
        if !is_name_start_char(c) {
            self.error(format!("invalid NameStartChar '{c}'"));
            return None;
        }
        self.bump(c.len_utf8());
        while let Some(c) = self.cur_char() {
            if c == ':' {
                if colon.is_some() {
                    self.error("multiple colons in name".into());
                    return None;
                }
                colon = Some(self.pos);
                self.bump(1);
            } else if is_name_char(c) {
                self.bump(c.len_utf8());
            } else {
                break;
            }
        }
        match colon {
            Some(at) => Some((Some(&data[start..at]), &data[at + 1..self.pos])),
            None => Some((None, &data[start..self.pos])),
        }
    }

    /// Parse text until `delim`, resolving entity and character references
    /// and splicing CDATA sections. The delimiter is not consumed.
    fn parse_text(&mut self, delim: char) -> Option<String> {
        let mut out = String::new();
        let mut cdata = false;
        loop {
            let rest = self.rest();
            if cdata {
                if rest.starts_with("]]>") {
                    self.bump(3);
                    cdata = false;
                } else if let Some(c) = self.cur_char() {
                    out.push(c);
                    self.bump(c.len_utf8());
                } else {
                    self.error("unterminated CDATA section".into());
                    return None;
                }
                continue;
            }
            if rest.starts_with("<![CDATA[") {
                self.bump(9);
                cdata = true;
                continue;
            }
            if rest.starts_with(delim) {
                return Some(out);
            }
            if rest.is_empty() || rest.starts_with("]]>") {
                self.error("invalid element content, \"]]>\" or end of input".into());
                return None;
            }
            if rest.starts_with('&') {
                self.bump(1);
                self.parse_reference(&mut out)?;
                continue;
            }
            let c = self.cur_char().unwrap();
            out.push(c);
            self.bump(c.len_utf8());
        }
    }

    /// Parse an entity or character reference after the `&`.
    fn parse_reference(&mut self, out: &mut String) -> Option<()> {
        let rest = self.rest();
        for (entity, ch) in [
            ("lt;", '<'),
            ("gt;", '>'),
            ("amp;", '&'),
            ("apos;", '\''),
            ("quot;", '"'),
        ] {
            if rest.starts_with(entity) {
                out.push(ch);
                self.bump(entity.len());
                return Some(());
            }
        }
        if !rest.starts_with('#') {
            self.error("unknown entity reference (only predefined references are supported)".into());
            return None;
        }
        self.bump(1);
        let (radix, digits) = if self.rest().starts_with('x') {
            self.bump(1);
            (16, "0123456789abcdefABCDEF")
        } else {
            (10, "0123456789")
        };
        let start = self.pos;
        while self.cur_char().is_some_and(|c| digits.contains(c)) {
            self.bump(1);
        }
        if start == self.pos {
            self.error("invalid character reference".into());
            return None;
        }
        let value = u32::from_str_radix(&self.data[start..self.pos], radix).ok();
        if !self.rest().starts_with(';') {
            self.error("character reference missing semicolon".into());
            return None;
        }
        self.bump(1);
        match value.and_then(char::from_u32) {
            Some(c) => {
                out.push(c);
                Some(())
            }
            None => {
                self.error("invalid character reference value".into());
                None
            }
        }
    }

    /// Parse one attribute of `elem` and append it to the attribute list.
    /// Returns the attribute index.
    fn parse_attr(&mut self, elem: ElemId) -> Option<usize> {
        let mut attr = if self.rest().starts_with("xmlns") {
            self.bump(5);
            let name = if self.rest().starts_with(':') {
                self.bump(1);
                let (prefix, local) = self.parse_name()?;
                if prefix.is_some() {
                    self.error("invalid namespace declaration name".into());
                    return None;
                }
                Some(self.dict.insert(local))
            } else {
                None
            };
            Attr {
                kind: AttrKind::Ns,
                name,
                value: self.dict.insert(""),
            }
        } else {
            let (prefix, local) = self.parse_name()?;
            let ns = match prefix {
                Some(p) => {
                    let ns = self.doc.get_ns(self.dict, elem, Some(p));
                    if ns.is_none() {
                        let line = self.line;
                        self.sink
                            .warning(Some(line), format!("unresolvable attribute prefix \"{p}\""));
                    }
                    ns
                }
                None => None,
            };
            Attr {
                kind: AttrKind::Std { ns },
                name: Some(self.dict.insert(local)),
                value: self.dict.insert(""),
            }
        };

        // Eq mark, possibly surrounded by whitespace
        self.skip_ws();
        if !self.rest().starts_with('=') {
            self.error("attribute definition, \"=\" expected".into());
            self.release_attr(&attr);
            return None;
        }
        self.bump(1);
        self.skip_ws();

        let delim = match self.cur_char() {
            Some(c @ ('"' | '\'')) => c,
            _ => {
                self.error("attribute value, \" or ' expected".into());
                self.release_attr(&attr);
                return None;
            }
        };
        self.bump(1);
        let Some(value) = self.parse_text(delim) else {
            self.release_attr(&attr);
            return None;
        };
        self.bump(1); // closing quote

        self.dict.remove(attr.value);
        attr.value = self.dict.insert(&value);

        let attrs = &mut self.doc.elem_mut(elem).attrs;
        attrs.push(attr);
        Some(attrs.len() - 1)
    }

    fn release_attr(&mut self, attr: &Attr) {
        if let Some(name) = attr.name {
            self.dict.remove(name);
        }
        self.dict.remove(attr.value);
    }

    /// Parse an element and its subtree. On failure the partial element is
    /// freed and `None` is returned.
    fn parse_elem(&mut self, parent: Option<ElemId>) -> Option<ElemId> {
        debug_assert!(self.rest().starts_with('<'));
        self.bump(1);
        let open_line = self.line;
        let (prefix, local) = self.parse_name()?;

        let name = self.dict.insert(local);
        let elem = self.doc.alloc(Some(name), open_line);
        if let Some(p) = parent {
            self.doc.add_child(p, elem);
        }

        match self.parse_elem_body(elem, prefix) {
            Some(()) => Some(elem),
            None => {
                self.doc.free_elem(self.dict, elem);
                None
            }
        }
    }

    fn parse_elem_body(&mut self, elem: ElemId, prefix: Option<&'a str>) -> Option<()> {
        // xmlns="" on this element cancels any inherited default namespace
        let mut nons = false;
        let closed = loop {
            self.skip_ws();
            if self.rest().starts_with("/>") {
                self.bump(2);
                break true;
            }
            if self.rest().starts_with('>') {
                self.bump(1);
                break false;
            }
            if self.at_end() {
                self.error("unexpected end of input in element tag".into());
                return None;
            }

            let idx = self.parse_attr(elem)?;
            let attr = self.doc.elem(elem).attrs[idx];
            if attr.kind == AttrKind::Ns {
                match (prefix, attr.name) {
                    (None, None) => {
                        if self.dict.get(attr.value).is_empty() {
                            nons = true;
                        } else {
                            self.doc.elem_mut(elem).ns = Some(super::NsRef {
                                elem,
                                attr: idx as u32,
                            });
                        }
                    }
                    (Some(p), Some(n)) if self.dict.get(n) == p => {
                        self.doc.elem_mut(elem).ns = Some(super::NsRef {
                            elem,
                            attr: idx as u32,
                        });
                    }
                    _ => {}
                }
            }
        };

        if !closed {
            self.parse_content(elem, prefix)?;
        }

        if self.doc.elem(elem).ns.is_none() && !nons {
            if let Some(p) = self.doc.elem(elem).parent {
                let ns = self.doc.get_ns(self.dict, p, prefix);
                self.doc.elem_mut(elem).ns = ns;
            }
            if prefix.is_some() && self.doc.elem(elem).ns.is_none() {
                self.error(format!(
                    "unresolvable element prefix \"{}\"",
                    prefix.unwrap()
                ));
                return None;
            }
        }

        Some(())
    }

    /// Parse element content up to and including the matching end tag.
    fn parse_content(&mut self, elem: ElemId, prefix: Option<&'a str>) -> Option<()> {
        // pending leading whitespace; becomes content only if the element
        // turns out to hold text
        let mut lws: Option<(usize, u32)> = None;
        loop {
            if self.at_end() {
                self.error("missing closing element tag".into());
                return None;
            }
            let rest = self.rest();

            if rest.starts_with("</") {
                if lws.is_some() && self.doc.elem(elem).child.is_none() {
                    // leading whitespace was actually content
                    self.store_content(elem, &mut lws)?;
                    continue;
                }
                self.bump(2);
                let (close_prefix, close_local) = self.parse_name()?;
                if close_prefix != prefix {
                    self.error("mixed opening and closing element tags (different prefixes)".into());
                    return None;
                }
                let open_name = self.doc.elem(elem).name.unwrap();
                if self.dict.get(open_name) != close_local {
                    self.error(format!(
                        "mixed opening ({}) and closing ({close_local}) element tags",
                        self.dict.get(open_name)
                    ));
                    return None;
                }
                self.skip_ws();
                if !self.rest().starts_with('>') {
                    self.error("closing element tag contains additional data".into());
                    return None;
                }
                self.bump(1);
                return Some(());
            }

            if rest.starts_with("<?") {
                lws = None;
                self.bump(2);
                if !self.skip_until("?>") {
                    return None;
                }
            } else if rest.starts_with("<!--") {
                lws = None;
                self.bump(4);
                if !self.skip_until("-->") {
                    return None;
                }
            } else if rest.starts_with("<![CDATA[") {
                self.store_content(elem, &mut lws)?;
            } else if rest.starts_with('<') {
                if lws.is_some() {
                    if self.doc.elem(elem).mixed {
                        // inside mixed content the whitespace is data
                        self.store_content(elem, &mut lws)?;
                        continue;
                    }
                    // leading whitespace was only formatting
                    lws = None;
                }
                if let Some(content) = self.doc.elem(elem).content {
                    self.demote_content(elem, content);
                }
                self.parse_elem(Some(elem))?;
            } else if is_xml_ws(rest.as_bytes()[0]) {
                if lws.is_none() {
                    lws = Some((self.pos, self.line));
                }
                self.skip_ws();
            } else {
                self.store_content(elem, &mut lws)?;
            }
        }
    }

    /// Store text content, rewinding over remembered leading whitespace.
    fn store_content(&mut self, elem: ElemId, lws: &mut Option<(usize, u32)>) -> Option<()> {
        if let Some((pos, line)) = lws.take() {
            self.pos = pos;
            self.line = line;
        }
        let text = self.parse_text('<')?;
        let content = self.dict.insert(&text);
        self.doc.elem_mut(elem).content = Some(content);
        if self.doc.elem(elem).child.is_some() {
            self.demote_content(elem, content);
        }
        Some(())
    }

    /// Move `elem`'s text content into an anonymous child and flag the
    /// element as mixed content.
    fn demote_content(&mut self, elem: ElemId, content: crate::ids::StrId) {
        let line = self.line;
        let chunk = self.doc.alloc(None, line);
        self.doc.elem_mut(chunk).content = Some(content);
        self.doc.elem_mut(elem).content = None;
        self.doc.elem_mut(elem).mixed = true;
        self.doc.add_child(elem, chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn parse_ok(data: &str) -> (XmlDoc, Dict) {
        let mut dict = Dict::new();
        let mut sink = DiagSink::new();
        let doc = XmlDoc::parse(data, &mut dict, &mut sink);
        assert!(
            doc.is_some(),
            "parse failed: {:?}",
            sink.diagnostics().last().map(|d| &d.message)
        );
        (doc.unwrap(), dict)
    }

    fn parse_err(data: &str) -> DiagSink {
        let mut dict = Dict::new();
        let mut sink = DiagSink::new();
        assert!(XmlDoc::parse(data, &mut dict, &mut sink).is_none());
        sink
    }

    #[test]
    fn test_minimal_element() {
        let (doc, dict) = parse_ok("<x/>");
        let root = doc.root().unwrap();
        assert_eq!(dict.get(doc.elem(root).name.unwrap()), "x");
        assert!(doc.elem(root).child.is_none());
        assert!(doc.elem(root).content.is_none());
    }

    #[test]
    fn test_text_content_and_entities() {
        let (doc, dict) = parse_ok("<x>a &amp; b &lt;c&gt; &#65;&#x42;</x>");
        let root = doc.root().unwrap();
        let content = doc.elem(root).content.unwrap();
        assert_eq!(dict.get(content), "a & b <c> AB");
    }

    #[test]
    fn test_cdata() {
        let (doc, dict) = parse_ok("<x>pre<![CDATA[<raw&>]]>post</x>");
        let root = doc.root().unwrap();
        assert_eq!(dict.get(doc.elem(root).content.unwrap()), "pre<raw&>post");
    }

    #[test]
    fn test_attributes() {
        let (doc, dict) = parse_ok(r#"<x a="1" b='two &quot;q&quot;'/>"#);
        let root = doc.root().unwrap();
        assert_eq!(dict.get(doc.get_attr(&dict, root, "a", None).unwrap()), "1");
        assert_eq!(
            dict.get(doc.get_attr(&dict, root, "b", None).unwrap()),
            "two \"q\""
        );
        assert!(doc.get_attr(&dict, root, "c", None).is_none());
    }

    #[test]
    fn test_namespace_resolution() {
        let (doc, dict) = parse_ok(
            r#"<m:mod xmlns:m="urn:m" xmlns="urn:default"><leaf/><m:inner/></m:mod>"#,
        );
        let root = doc.root().unwrap();
        let ns = doc.elem(root).ns.unwrap();
        assert_eq!(dict.get(doc.ns_parts(ns).1), "urn:m");

        let kids: Vec<_> = doc.children(root).collect();
        let leaf_ns = doc.elem(kids[0]).ns.unwrap();
        assert_eq!(dict.get(doc.ns_parts(leaf_ns).1), "urn:default");
        let inner_ns = doc.elem(kids[1]).ns.unwrap();
        assert_eq!(dict.get(doc.ns_parts(inner_ns).1), "urn:m");
    }

    #[test]
    fn test_mixed_content() {
        let (doc, dict) = parse_ok("<x>one<y/>two</x>");
        let root = doc.root().unwrap();
        assert!(doc.elem(root).mixed);
        assert!(doc.elem(root).content.is_none());
        let kids: Vec<_> = doc.children(root).collect();
        assert_eq!(kids.len(), 3);
        assert_eq!(dict.get(doc.elem(kids[0]).content.unwrap()), "one");
        assert_eq!(dict.get(doc.elem(kids[1]).name.unwrap()), "y");
        assert_eq!(dict.get(doc.elem(kids[2]).content.unwrap()), "two");
    }

    #[test]
    fn test_formatting_whitespace_discarded() {
        let (doc, _dict) = parse_ok("<x>\n  <y/>\n</x>");
        let root = doc.root().unwrap();
        assert!(!doc.elem(root).mixed);
        assert_eq!(doc.children(root).count(), 1);
    }

    #[test]
    fn test_whitespace_only_content_kept() {
        let (doc, dict) = parse_ok("<x>  </x>");
        let root = doc.root().unwrap();
        assert_eq!(dict.get(doc.elem(root).content.unwrap()), "  ");
    }

    #[test]
    fn test_prolog_and_comments() {
        let (doc, _dict) =
            parse_ok("<?xml version=\"1.0\"?>\n<!-- hi -->\n<x><!-- in --><y/></x>");
        let root = doc.root().unwrap();
        assert_eq!(doc.children(root).count(), 1);
    }

    #[test]
    fn test_line_numbers() {
        let (doc, _dict) = parse_ok("<x>\n  <y/>\n  <z/>\n</x>");
        let root = doc.root().unwrap();
        let kids: Vec<_> = doc.children(root).collect();
        assert_eq!(doc.elem(root).line, 1);
        assert_eq!(doc.elem(kids[0]).line, 2);
        assert_eq!(doc.elem(kids[1]).line, 3);
    }

    #[test]
    fn test_unbalanced_tags() {
        let sink = parse_err("<x><y></x></y>");
        assert!(sink.last_error().is_some());
    }

    #[test]
    fn test_unknown_entity() {
        parse_err("<x>&nbsp;</x>");
    }

    #[test]
    fn test_doctype_rejected() {
        parse_err("<!DOCTYPE x []><x/>");
    }

    #[test]
    fn test_empty_document() {
        parse_err("");
        parse_err("   \n  ");
    }

    #[test]
    fn test_unresolvable_element_prefix() {
        parse_err("<q:x xmlns:p=\"urn:p\"/>");
    }

    #[test]
    fn test_failed_parse_releases_everything() {
        let mut dict = Dict::new();
        let mut sink = DiagSink::new();
        assert!(XmlDoc::parse("<x><y a=\"1\"><z></x>", &mut dict, &mut sink).is_none());
        assert!(dict.is_empty());
    }
}
