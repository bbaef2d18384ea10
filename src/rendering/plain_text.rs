use serde_json::Value;

use crate::models::document::{normalize, Document, Node};

/// Reduce a document to the plain text used for search and reading time.
///
/// Text payloads are collected in document order (depth-first, pre-order)
/// and joined with a single space.
pub fn to_plain_text(doc: &Document) -> String {
    let mut parts = Vec::new();
    collect(&doc.children, &mut parts);
    parts.join(" ")
}

/// Same as [`to_plain_text`] for raw stored content; anything that is not a
/// document object reduces to `""`.
pub fn plain_text_from_value(value: &Value) -> String {
    to_plain_text(&normalize(value))
}

fn collect<'a>(nodes: &'a [Node], parts: &mut Vec<&'a str>) {
    for node in nodes {
        if let Some(text) = node.text_payload().filter(|t| !t.is_empty()) {
            parts.push(text);
        }
        collect(node.children(), parts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::Mark;
    use serde_json::json;

    #[test]
    fn test_two_paragraphs() {
        let doc = Document::new(vec![
            Node::paragraph(vec![Node::marked("Hi", [Mark::Bold])]),
            Node::paragraph(vec![Node::text("World")]),
        ]);
        assert_eq!(to_plain_text(&doc), "Hi World");
    }

    #[test]
    fn test_document_order_through_nesting() {
        let doc = Document::new(vec![
            Node::heading(1, vec![Node::text("Title")]),
            Node::BulletList {
                children: vec![
                    Node::ListItem {
                        children: vec![Node::paragraph(vec![Node::text("one")])],
                    },
                    Node::ListItem {
                        children: vec![Node::paragraph(vec![
                            Node::text("two"),
                            Node::marked("three", [Mark::Code]),
                        ])],
                    },
                ],
            },
            Node::HorizontalRule,
            Node::CodeBlock {
                language: None,
                children: vec![Node::text("let x = 1;")],
            },
        ]);
        assert_eq!(to_plain_text(&doc), "Title one two three let x = 1;");
    }

    #[test]
    fn test_non_documents_reduce_to_empty() {
        assert_eq!(plain_text_from_value(&Value::Null), "");
        assert_eq!(plain_text_from_value(&json!(17)), "");
        assert_eq!(plain_text_from_value(&json!("just a string")), "");
        assert_eq!(to_plain_text(&Document::empty()), "");
    }

    #[test]
    fn test_unknown_kinds_contribute_their_children() {
        let value = json!({
            "type": "doc",
            "content": [
                { "type": "callout", "content": [{ "type": "text", "text": "inside" }] },
                { "type": "paragraph", "content": [{ "type": "text", "text": "after" }] }
            ]
        });
        assert_eq!(plain_text_from_value(&value), "inside after");
    }

    #[test]
    fn test_stable_under_renormalization() {
        let value = json!({
            "type": "doc",
            "content": [
                { "type": "blockquote", "content": [
                    { "type": "paragraph", "content": [
                        { "type": "text", "text": "a" },
                        { "type": "text", "text": "b", "marks": [{ "type": "italic" }] }
                    ]}
                ]},
                { "type": "image", "attrs": { "src": "x.png" } },
                "junk"
            ]
        });
        let doc = normalize(&value);
        let renormalized = normalize(&doc.to_value());
        assert_eq!(to_plain_text(&renormalized), to_plain_text(&doc));
        assert_eq!(to_plain_text(&doc), "a b");
    }
}
