//! Namespace-aware element tree for submission envelopes
//!
//! Submission documents are small (one form instance each), so they are read
//! fully into a tree of [`Element`]s rather than processed as a stream. Each
//! element keeps its resolved namespace URI, so lookups match on
//! `(namespace, local name)` regardless of the prefixes the server chose.

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::error::{Result, SyncError};

/// Namespace of the Aggregate submission envelope and form fields
pub const SUBMISSIONS_NS: &str = "http://opendatakit.org/submissions";

/// Namespace of the OpenRosa `meta` block
pub const OPENROSA_NS: &str = "http://openrosa.org/xforms";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Trimmed character data directly inside this element
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// First direct child with the given namespace and local name
    pub fn child(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    /// All matching elements below this one, in document order
    pub fn descendants(&self, namespace: &str, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(namespace, name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, namespace: &str, name: &str, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.is(namespace, name) {
                found.push(child);
            }
            child.collect_descendants(namespace, name, found);
        }
    }

    /// Unprefixed attribute value by local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Text content, `None` when empty
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

fn start_element(ns: ResolveResult, e: &quick_xml::events::BytesStart) -> Result<Element> {
    let namespace = match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(prefix) => {
            return Err(SyncError::malformed(format!(
                "undeclared namespace prefix '{}'",
                String::from_utf8_lossy(&prefix)
            )))
        },
    };

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        namespace,
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn append_text(stack: &mut [Element], text: &str) {
    if let Some(current) = stack.last_mut() {
        current.text.push_str(text);
    }
}

/// Parse a complete XML document and return its root element
pub fn parse(xml: &str) -> Result<Element> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(e) => {
                let element = start_element(ns, &e)?;
                stack.push(element);
            },
            Event::Empty(e) => {
                let element = start_element(ns, &e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            },
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SyncError::malformed("unbalanced closing tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            },
            Event::Text(t) => {
                let text = t.unescape()?;
                append_text(&mut stack, &text);
            },
            Event::CData(c) => {
                let bytes = c.into_inner();
                append_text(&mut stack, &String::from_utf8_lossy(&bytes));
            },
            Event::Eof => break,
            _ => {},
        }
    }

    if !stack.is_empty() {
        return Err(SyncError::malformed("document ended inside an open element"));
    }
    root.ok_or_else(|| SyncError::malformed("document has no root element"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const ENVELOPE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<submission xmlns="http://opendatakit.org/submissions" xmlns:orx="http://openrosa.org/xforms">
  <data>
    <data id="net" instanceID="uuid:1" submissionDate="2025-03-01">
      <orx:meta>
        <orx:instanceID>uuid:1</orx:instanceID>
        <orx:rowID>row-9</orx:rowID>
      </orx:meta>
      <household_id>  HH-12 </household_id>
      <any_one_sleep_under_this_net/>
      <note>a &amp; b</note>
    </data>
  </data>
</submission>"#;

    #[test]
    fn test_parse_resolves_namespaces() {
        let root = parse(ENVELOPE).unwrap();
        assert!(root.is(SUBMISSIONS_NS, "submission"));

        let outer = root.child(SUBMISSIONS_NS, "data").unwrap();
        let block = outer.child(SUBMISSIONS_NS, "data").unwrap();
        assert_eq!(block.attr("id"), Some("net"));
        assert_eq!(block.attr("instanceID"), Some("uuid:1"));

        let meta = block.child(OPENROSA_NS, "meta").unwrap();
        assert_eq!(meta.child(OPENROSA_NS, "rowID").and_then(Element::text), Some("row-9"));
        assert!(block.child(SUBMISSIONS_NS, "meta").is_none());
    }

    #[test]
    fn test_text_is_trimmed_and_unescaped() {
        let root = parse(ENVELOPE).unwrap();
        let block = &root.children[0].children[0];

        assert_eq!(block.child(SUBMISSIONS_NS, "household_id").unwrap().text(), Some("HH-12"));
        assert_eq!(block.child(SUBMISSIONS_NS, "note").unwrap().text(), Some("a & b"));
        assert_eq!(
            block.child(SUBMISSIONS_NS, "any_one_sleep_under_this_net").unwrap().text(),
            None
        );
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = parse(ENVELOPE).unwrap();
        let data: Vec<_> = root.descendants(SUBMISSIONS_NS, "data");
        assert_eq!(data.len(), 2);
        assert_eq!(data[1].attr("id"), Some("net"));
    }

    #[test]
    fn test_malformed_xml_is_rejected() {
        assert!(matches!(
            parse("<submission><data></submission>"),
            Err(SyncError::MalformedDocument(_))
        ));
        assert!(matches!(parse(""), Err(SyncError::MalformedDocument(_))));
    }
}
