//! The structured rich-text document produced by the block editor.
//!
//! Documents travel as editor JSON (`{"type": "doc", "content": [...]}`) and
//! are turned into a typed tree by [`normalize`], which never fails: anything
//! it cannot make sense of collapses to the empty document or is skipped.
//! Node kinds the schema does not know about are kept as [`Node::Unknown`] so
//! a newer editor does not lose content when an older server saves it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

/// Inline style applied to a text run.
///
/// Variant order is the canonical wrapping order used by the renderer
/// (outermost first).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Code,
    /// A mark this schema does not render (e.g. `strike`, `link`).
    Other(String),
}

impl Mark {
    pub fn parse(name: &str) -> Self {
        match name {
            "bold" => Mark::Bold,
            "italic" => Mark::Italic,
            "underline" => Mark::Underline,
            "code" => Mark::Code,
            other => Mark::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Mark::Bold => "bold",
            Mark::Italic => "italic",
            Mark::Underline => "underline",
            Mark::Code => "code",
            Mark::Other(name) => name,
        }
    }
}

/// The fixed set of node kinds understood by the renderer and reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Paragraph,
    Heading,
    Blockquote,
    BulletList,
    OrderedList,
    ListItem,
    CodeBlock,
    Image,
    HorizontalRule,
    Text,
    Unknown,
}

impl NodeKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "paragraph" => NodeKind::Paragraph,
            "heading" => NodeKind::Heading,
            "blockquote" => NodeKind::Blockquote,
            "bulletList" => NodeKind::BulletList,
            "orderedList" => NodeKind::OrderedList,
            "listItem" => NodeKind::ListItem,
            "codeBlock" => NodeKind::CodeBlock,
            "image" => NodeKind::Image,
            "horizontalRule" => NodeKind::HorizontalRule,
            "text" => NodeKind::Text,
            _ => NodeKind::Unknown,
        }
    }

    /// Editor name of the kind. `Unknown` has no canonical name.
    pub fn as_str(&self) -> Option<&'static str> {
        Some(match self {
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading => "heading",
            NodeKind::Blockquote => "blockquote",
            NodeKind::BulletList => "bulletList",
            NodeKind::OrderedList => "orderedList",
            NodeKind::ListItem => "listItem",
            NodeKind::CodeBlock => "codeBlock",
            NodeKind::Image => "image",
            NodeKind::HorizontalRule => "horizontalRule",
            NodeKind::Text => "text",
            NodeKind::Unknown => return None,
        })
    }
}

/// Attributes of an image node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageAttrs {
    pub src: String,
    pub alt: Option<String>,
    pub title: Option<String>,
}

/// One element of the document tree.
///
/// Only [`Node::Text`] carries a string payload and marks.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Paragraph { children: Vec<Node> },
    /// `level` is kept as stored; the renderer clamps it to 1..=6.
    Heading { level: Option<i64>, children: Vec<Node> },
    Blockquote { children: Vec<Node> },
    BulletList { children: Vec<Node> },
    OrderedList { children: Vec<Node> },
    ListItem { children: Vec<Node> },
    CodeBlock { language: Option<String>, children: Vec<Node> },
    Image(ImageAttrs),
    HorizontalRule,
    Text { text: String, marks: Vec<Mark> },
    Unknown {
        kind: String,
        attrs: Map<String, Value>,
        children: Vec<Node>,
    },
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn marked(text: impl Into<String>, marks: impl IntoIterator<Item = Mark>) -> Self {
        Node::Text {
            text: text.into(),
            marks: marks.into_iter().collect(),
        }
    }

    pub fn paragraph(children: Vec<Node>) -> Self {
        Node::Paragraph { children }
    }

    pub fn heading(level: i64, children: Vec<Node>) -> Self {
        Node::Heading {
            level: Some(level),
            children,
        }
    }

    pub fn image(src: impl Into<String>, alt: Option<String>) -> Self {
        Node::Image(ImageAttrs {
            src: src.into(),
            alt,
            title: None,
        })
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Paragraph { .. } => NodeKind::Paragraph,
            Node::Heading { .. } => NodeKind::Heading,
            Node::Blockquote { .. } => NodeKind::Blockquote,
            Node::BulletList { .. } => NodeKind::BulletList,
            Node::OrderedList { .. } => NodeKind::OrderedList,
            Node::ListItem { .. } => NodeKind::ListItem,
            Node::CodeBlock { .. } => NodeKind::CodeBlock,
            Node::Image(_) => NodeKind::Image,
            Node::HorizontalRule => NodeKind::HorizontalRule,
            Node::Text { .. } => NodeKind::Text,
            Node::Unknown { .. } => NodeKind::Unknown,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Paragraph { children }
            | Node::Heading { children, .. }
            | Node::Blockquote { children }
            | Node::BulletList { children }
            | Node::OrderedList { children }
            | Node::ListItem { children }
            | Node::CodeBlock { children, .. }
            | Node::Unknown { children, .. } => children,
            Node::Image(_) | Node::HorizontalRule | Node::Text { .. } => &[],
        }
    }

    /// The literal text carried by this node, if it is a text run.
    pub fn text_payload(&self) -> Option<&str> {
        match self {
            Node::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Node> {
        let object = value.as_object()?;
        let kind = object.get("type").and_then(Value::as_str).unwrap_or("");
        let attrs = object.get("attrs").and_then(Value::as_object);
        let attr_str = |name: &str| {
            attrs
                .and_then(|a| a.get(name))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let children = || children_from(object.get("content"));

        let node = match NodeKind::parse(kind) {
            NodeKind::Paragraph => Node::Paragraph {
                children: children(),
            },
            NodeKind::Heading => Node::Heading {
                level: attrs.and_then(|a| a.get("level")).and_then(|level| {
                    level.as_i64().or_else(|| level.as_f64().map(|f| f as i64))
                }),
                children: children(),
            },
            NodeKind::Blockquote => Node::Blockquote {
                children: children(),
            },
            NodeKind::BulletList => Node::BulletList {
                children: children(),
            },
            NodeKind::OrderedList => Node::OrderedList {
                children: children(),
            },
            NodeKind::ListItem => Node::ListItem {
                children: children(),
            },
            NodeKind::CodeBlock => Node::CodeBlock {
                language: attr_str("language"),
                children: children(),
            },
            NodeKind::Image => Node::Image(ImageAttrs {
                src: attr_str("src").unwrap_or_default(),
                alt: attr_str("alt"),
                title: attr_str("title"),
            }),
            NodeKind::HorizontalRule => Node::HorizontalRule,
            NodeKind::Text => {
                let text = object.get("text").and_then(Value::as_str)?;
                let marks = object
                    .get("marks")
                    .and_then(Value::as_array)
                    .map(|marks| {
                        marks
                            .iter()
                            .filter_map(|m| m.get("type").and_then(Value::as_str))
                            .map(Mark::parse)
                            .collect()
                    })
                    .unwrap_or_default();
                Node::Text {
                    text: text.to_string(),
                    marks,
                }
            }
            NodeKind::Unknown => Node::Unknown {
                kind: kind.to_string(),
                attrs: attrs.cloned().unwrap_or_default(),
                children: children(),
            },
        };
        Some(node)
    }

    pub fn to_value(&self) -> Value {
        let with_children = |kind: &str, children: &[Node]| {
            let mut object = Map::new();
            object.insert("type".into(), Value::String(kind.to_string()));
            if !children.is_empty() {
                object.insert(
                    "content".into(),
                    Value::Array(children.iter().map(Node::to_value).collect()),
                );
            }
            object
        };

        let object = match self {
            Node::Heading { level, children } => {
                let mut object = with_children("heading", children);
                if let Some(level) = level {
                    object.insert("attrs".into(), json!({ "level": level }));
                }
                object
            }
            Node::CodeBlock { language, children } => {
                let mut object = with_children("codeBlock", children);
                if let Some(language) = language {
                    object.insert("attrs".into(), json!({ "language": language }));
                }
                object
            }
            Node::Image(image) => {
                let mut object = with_children("image", &[]);
                let mut attrs = Map::new();
                attrs.insert("src".into(), Value::String(image.src.clone()));
                if let Some(alt) = &image.alt {
                    attrs.insert("alt".into(), Value::String(alt.clone()));
                }
                if let Some(title) = &image.title {
                    attrs.insert("title".into(), Value::String(title.clone()));
                }
                object.insert("attrs".into(), Value::Object(attrs));
                object
            }
            Node::Text { text, marks } => {
                let mut object = with_children("text", &[]);
                object.insert("text".into(), Value::String(text.clone()));
                if !marks.is_empty() {
                    let marks = marks
                        .iter()
                        .map(|m| json!({ "type": m.as_str() }))
                        .collect();
                    object.insert("marks".into(), Value::Array(marks));
                }
                object
            }
            Node::Unknown {
                kind,
                attrs,
                children,
            } => {
                let mut object = with_children(kind, children);
                if !attrs.is_empty() {
                    object.insert("attrs".into(), Value::Object(attrs.clone()));
                }
                object
            }
            other => {
                // Remaining kinds carry nothing but children.
                let kind = other.kind().as_str().unwrap_or_default();
                with_children(kind, other.children())
            }
        };
        Value::Object(object)
    }
}

fn children_from(content: Option<&Value>) -> Vec<Node> {
    content
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Node::from_value).collect())
        .unwrap_or_default()
}

/// A post body: the root of the document tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// The document a new draft starts with.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn push(&mut self, node: Node) {
        self.children.push(node);
    }

    pub fn to_value(&self) -> Value {
        json!({
            "type": "doc",
            "content": self.children.iter().map(Node::to_value).collect::<Vec<_>>(),
        })
    }
}

/// Turn arbitrary structured input into a document tree.
///
/// Total: non-objects and objects without a `content` array yield the empty
/// document, child entries that are not objects (or text nodes without text)
/// are skipped, and unrecognized kinds are kept as [`Node::Unknown`].
pub fn normalize(value: &Value) -> Document {
    match value.as_object() {
        Some(object) => Document::new(children_from(object.get("content"))),
        None => Document::empty(),
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(normalize(&value))
    }
}
