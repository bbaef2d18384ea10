use std::collections::{BTreeSet, HashSet};

use crate::models::document::{Document, ImageAttrs, Mark, Node};

const PARAGRAPH_CLASS: &str = "my-4";
const HEADING_CLASS: &str = "font-serif font-semibold mt-8 mb-2";
const BLOCKQUOTE_CLASS: &str =
    "border-l-4 border-stone-300 dark:border-stone-600 pl-4 my-4 italic text-stone-600 dark:text-stone-400";
const BULLET_LIST_CLASS: &str = "list-disc pl-6 my-4 space-y-1";
const ORDERED_LIST_CLASS: &str = "list-decimal pl-6 my-4 space-y-1";
const CODE_BLOCK_CLASS: &str = "overflow-x-auto rounded-lg p-4 text-sm my-4";
const INLINE_CODE_CLASS: &str = "px-1.5 py-0.5 rounded bg-stone-200 dark:bg-stone-700 text-sm";
const IMAGE_FRAME_CLASS: &str = "block my-4 relative w-full aspect-video max-w-2xl mx-auto";
const IMAGE_CLASS: &str = "object-contain rounded-lg";
const IMAGE_FALLBACK_CLASS: &str = "my-4 max-w-full rounded-lg";
const RULE_CLASS: &str = "my-8 border-stone-200 dark:border-stone-700";

const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

/// Rendered output: an element with ordered attributes, or a text leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: &'static str,
    pub attrs: Vec<(&'static str, String)>,
    pub children: Vec<Markup>,
}

impl Element {
    fn new(tag: &'static str) -> Self {
        Self {
            tag,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    fn attr(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((name, value.into()));
        self
    }

    fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    fn children(mut self, children: Vec<Markup>) -> Self {
        self.children = children;
        self
    }

    fn is_void(&self) -> bool {
        matches!(self.tag, "img" | "hr")
    }

    pub fn attr_value(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl From<Element> for Markup {
    fn from(element: Element) -> Self {
        Markup::Element(element)
    }
}

impl Markup {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Markup::Element(element) => Some(element),
            Markup::Text(_) => None,
        }
    }

    pub fn write_html(&self, out: &mut String) {
        match self {
            Markup::Text(text) => escape_into(text, false, out),
            Markup::Element(element) => {
                out.push('<');
                out.push_str(element.tag);
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if element.is_void() {
                    return;
                }
                for child in &element.children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(element.tag);
                out.push('>');
            }
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }
}

fn escape_into(raw: &str, attribute: bool, out: &mut String) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

/// Render a document to its display markup.
///
/// Pure and total: the same document always yields the same tree, and
/// nothing in the input can make it fail.
pub fn render(doc: &Document) -> Vec<Markup> {
    render_all(&doc.children)
}

/// Serialize rendered markup without sanitizing it.
pub fn to_html(markup: &[Markup]) -> String {
    let mut out = String::new();
    for node in markup {
        node.write_html(&mut out);
    }
    out
}

/// Render a document to sanitized HTML, ready to embed in a page.
pub fn render_html(doc: &Document) -> String {
    sanitizer().clean(&to_html(&render(doc))).to_string()
}

fn sanitizer() -> ammonia::Builder<'static> {
    let mut builder = ammonia::Builder::default();
    builder
        .add_generic_attributes(["class"])
        .add_tag_attributes("img", ["loading"])
        .url_schemes(HashSet::from(["http", "https"]));
    builder
}

fn render_all(nodes: &[Node]) -> Vec<Markup> {
    nodes.iter().filter_map(render_node).collect()
}

fn render_node(node: &Node) -> Option<Markup> {
    let element = match node {
        Node::Paragraph { children } => Element::new("p")
            .class(PARAGRAPH_CLASS)
            .children(render_all(children)),
        Node::Heading { level, children } => {
            let level = level.unwrap_or(1).clamp(1, 6) as usize;
            Element::new(HEADING_TAGS[level - 1])
                .class(HEADING_CLASS)
                .children(render_all(children))
        }
        Node::Blockquote { children } => Element::new("blockquote")
            .class(BLOCKQUOTE_CLASS)
            .children(render_all(children)),
        Node::BulletList { children } => Element::new("ul")
            .class(BULLET_LIST_CLASS)
            .children(render_all(children)),
        Node::OrderedList { children } => Element::new("ol")
            .class(ORDERED_LIST_CLASS)
            .children(render_all(children)),
        Node::ListItem { children } => Element::new("li").children(render_all(children)),
        Node::CodeBlock { language, children } => {
            let mut code = Element::new("code");
            if let Some(language) = language {
                code = code.class(&format!("language-{language}"));
            }
            let code = code.children(vec![Markup::Text(code_text(children))]);
            Element::new("pre")
                .class(CODE_BLOCK_CLASS)
                .children(vec![code.into()])
        }
        Node::Image(image) => render_image(image),
        Node::HorizontalRule => Element::new("hr").class(RULE_CLASS),
        Node::Text { text, marks } => render_text(text, marks),
        Node::Unknown { children, .. } => {
            if children.is_empty() {
                return None;
            }
            Element::new("div").children(render_all(children))
        }
    };
    Some(element.into())
}

/// Wrap a text run in its marks, outermost first: bold, italic, underline,
/// code. Storage order and duplicates do not matter.
fn render_text(text: &str, marks: &[Mark]) -> Element {
    let marks: BTreeSet<&Mark> = marks
        .iter()
        .filter(|m| !matches!(m, Mark::Other(_)))
        .collect();

    let mut inner = Markup::Text(text.to_string());
    for mark in marks.into_iter().rev() {
        let wrapper = match mark {
            Mark::Bold => Element::new("strong"),
            Mark::Italic => Element::new("em"),
            Mark::Underline => Element::new("u"),
            Mark::Code => Element::new("code").class(INLINE_CODE_CLASS),
            Mark::Other(_) => continue,
        };
        inner = wrapper.children(vec![inner]).into();
    }
    Element::new("span").children(vec![inner])
}

fn code_text(nodes: &[Node]) -> String {
    fn collect(nodes: &[Node], out: &mut String) {
        for node in nodes {
            if let Some(text) = node.text_payload() {
                out.push_str(text);
            }
            collect(node.children(), out);
        }
    }
    let mut out = String::new();
    collect(nodes, &mut out);
    out
}

fn render_image(image: &ImageAttrs) -> Element {
    let alt = image.alt.clone().unwrap_or_default();
    let Some(src) = resolve_image_src(&image.src) else {
        // Unresolvable source: a plain reference the page can still lay out.
        return Element::new("img")
            .attr("alt", alt)
            .class(IMAGE_FALLBACK_CLASS);
    };

    let mut img = Element::new("img")
        .attr("src", src)
        .attr("alt", alt)
        .class(IMAGE_CLASS)
        .attr("loading", "lazy");
    if let Some(title) = &image.title {
        img = img.attr("title", title.clone());
    }
    Element::new("span")
        .class(IMAGE_FRAME_CLASS)
        .children(vec![img.into()])
}

/// Resolve a stored image source to the URL the page should load.
///
/// Absolute `http(s)` URLs and site-local paths are kept as they are;
/// scheme-less sources get `https`. Empty sources and other schemes
/// (`javascript:`, `data:`, ...) do not resolve.
pub fn resolve_image_src(src: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() {
        return None;
    }
    if src.starts_with("//") {
        return url::Url::parse(&format!("https:{src}"))
            .ok()
            .map(String::from);
    }
    if src.starts_with('/') {
        return Some(src.to_string());
    }
    let with_https = || {
        url::Url::parse(&format!("https://{src}"))
            .ok()
            .map(String::from)
    };
    match url::Url::parse(src) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(src.to_string()),
        // `host.name:port/path` parses with the host as its scheme.
        Ok(url) if url.scheme().contains('.') => with_https(),
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) => with_https(),
        Err(_) => None,
    }
}
