/// Rich-text markup parsing: HTML subset string -> owned element/text tree
///
/// Parsing is delegated to html5ever (through `scraper`), which recovers from
/// any malformed input. Nothing here can fail; at worst the input comes back
/// as a single text node.
use scraper::{ElementRef, Html, Node};
use std::collections::BTreeMap;

/// Elements whose content is never letter text
const DROPPED_TAGS: [&str; 4] = ["script", "style", "template", "head"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Text(String),
    Element(MarkupElement),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupElement {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<MarkupNode>,
}

impl MarkupElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Parse a markup fragment. Empty input yields an empty tree.
pub fn parse_markup(markup: &str) -> Vec<MarkupNode> {
    if markup.is_empty() {
        return Vec::new();
    }

    let fragment = Html::parse_fragment(markup);
    let nodes = collect_children(fragment.root_element());

    if nodes.is_empty() && !markup.trim().is_empty() && !markup.trim_start().starts_with('<') {
        // Parser produced nothing for text-like input: show it literally.
        return vec![MarkupNode::Text(markup.to_string())];
    }
    nodes
}

fn collect_children(parent: ElementRef<'_>) -> Vec<MarkupNode> {
    let mut out = Vec::new();
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => {
                let text: &str = text;
                if !text.is_empty() {
                    out.push(MarkupNode::Text(text.to_string()));
                }
            }
            Node::Element(element) => {
                let tag = element.name().to_ascii_lowercase();
                if DROPPED_TAGS.contains(&tag.as_str()) {
                    continue;
                }
                let attrs = element
                    .attrs()
                    .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
                    .collect();
                let children = ElementRef::wrap(child)
                    .map(collect_children)
                    .unwrap_or_default();
                out.push(MarkupNode::Element(MarkupElement {
                    tag,
                    attrs,
                    children,
                }));
            }
            // Comments, doctypes and processing instructions carry no letter text.
            _ => {}
        }
    }
    out
}

/// Concatenated text content, with block boundaries collapsed to single spaces.
pub fn plain_text(markup: &str) -> String {
    let mut out = String::new();
    append_text(&parse_markup(markup), &mut out);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn append_text(nodes: &[MarkupNode], out: &mut String) {
    for node in nodes {
        match node {
            MarkupNode::Text(text) => out.push_str(text),
            MarkupNode::Element(element) => {
                if element.tag == "br" {
                    out.push(' ');
                }
                append_text(&element.children, out);
                if matches!(element.tag.as_str(), "p" | "li" | "div" | "ul" | "ol") {
                    out.push(' ');
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &MarkupNode) -> &MarkupElement {
        match node {
            MarkupNode::Element(e) => e,
            MarkupNode::Text(t) => panic!("expected element, got text {:?}", t),
        }
    }

    #[test]
    fn test_parse_nested_structure() {
        let nodes = parse_markup(r#"<p>ab <b>cd</b></p><ul><li>one</li></ul>"#);
        assert_eq!(nodes.len(), 2);

        let p = element(&nodes[0]);
        assert_eq!(p.tag, "p");
        assert_eq!(p.children[0], MarkupNode::Text("ab ".to_string()));
        assert_eq!(element(&p.children[1]).tag, "b");

        let ul = element(&nodes[1]);
        assert_eq!(element(&ul.children[0]).tag, "li");
    }

    #[test]
    fn test_attributes_survive() {
        let nodes = parse_markup(r#"<a href="https://x.example" target="_blank" onclick="evil()">x</a>"#);
        let a = element(&nodes[0]);
        assert_eq!(a.attr("href"), Some("https://x.example"));
        assert_eq!(a.attr("target"), Some("_blank"));
    }

    #[test]
    fn test_malformed_markup_does_not_panic() {
        for input in ["<p>unclosed <b>bold", "</div></p>", "<<<>>>", "a < b > c", "<li>orphan"] {
            let _ = parse_markup(input);
        }
        assert_eq!(parse_markup("just text"), vec![MarkupNode::Text("just text".to_string())]);
    }

    #[test]
    fn test_scripts_are_dropped() {
        let nodes = parse_markup("<p>hi</p><script>alert(1)</script>");
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_empty_markup() {
        assert!(parse_markup("").is_empty());
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            plain_text("<p>Dear <b>Alice</b>,</p><p>See you soon</p>"),
            "Dear Alice, See you soon"
        );
    }
}
