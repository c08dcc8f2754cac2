//! Deterministic HTML indentation
//!
//! Documents are parsed with html5ever (through `scraper`) and the tree is
//! printed back with two-space indentation. Only whitespace a browser
//! collapses anyway is touched: an element whose children are all blocks gets
//! one child per line, anything holding text or inline elements stays on a
//! single line with whitespace runs collapsed. `pre`/`textarea` content and
//! `script` bodies are kept verbatim, `style` bodies are re-indented.
//!
//! `html`, `head` and `body` wrappers are printed only when the input wrote
//! them. Each result is checked against the input's rendered text.

use crate::types::CandidateMutation;
use scraper::{ElementRef, Html, Node};
use thiserror::Error;
use tracing::warn;

const INDENT: &str = "  ";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

/// Elements that start a new line of rendered text
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "base", "blockquote", "body", "caption", "col", "colgroup",
    "dd", "details", "dialog", "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header", "hgroup", "hr", "html", "li",
    "link", "listing", "main", "menu", "meta", "nav", "noscript", "ol", "p", "pre", "script",
    "section", "style", "summary", "table", "tbody", "td", "template", "tfoot", "th", "thead",
    "title", "tr", "ul",
];

/// Bodies the parser keeps as unescaped text
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "iframe", "noembed", "noframes", "noscript", "plaintext", "script", "style", "xmp",
];

const PRESERVED_ELEMENTS: &[&str] = &["listing", "pre", "textarea"];

const HTML_SPACE: &[char] = &[' ', '\t', '\n', '\r', '\x0c'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("formatting would change the rendered text of the document")]
    ContentChanged,
}

/// Pretty-print `html`. Idempotent: `format_html(format_html(x)) == format_html(x)`.
pub fn format_html(html: &str) -> Result<String, FormatError> {
    let nodes = parse(html);
    let mut printer = Printer::default();
    printer.children(&nodes, 0);
    let formatted = printer.lines.join("\n");

    if collect_text(&nodes) != collect_text(&parse(&formatted)) {
        return Err(FormatError::ContentChanged);
    }
    Ok(formatted)
}

/// Pretty-print `html`, falling back to the input unchanged on failure
pub fn format_or_original(html: &str) -> String {
    match format_html(html) {
        Ok(formatted) => formatted,
        Err(e) => {
            warn!("Formatting failed, keeping unformatted html: {}", e);
            html.to_string()
        }
    }
}

/// Format the `html` of every candidate; other fields are untouched
pub fn format_candidates(candidates: Vec<CandidateMutation>) -> Vec<CandidateMutation> {
    candidates
        .into_iter()
        .map(|cand| CandidateMutation {
            html: format_or_original(&cand.html),
            ..cand
        })
        .collect()
}

/// Text a browser would show, one entry per block, whitespace collapsed.
/// Raw and preformatted bodies are kept as written.
pub fn rendered_text(html: &str) -> Vec<String> {
    collect_text(&parse(html))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Dom {
    Doctype(String),
    Comment(String),
    Text(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Dom>,
    },
}

impl Dom {
    fn is_blank(&self) -> bool {
        matches!(self, Dom::Text(text) if text.trim_matches(HTML_SPACE).is_empty())
    }
}

/// Which of the wrappers the parser would otherwise imply were written out
struct WrittenWrappers {
    html: bool,
    head: bool,
    body: bool,
}

impl WrittenWrappers {
    fn scan(source: &str) -> Self {
        let lower = source.to_ascii_lowercase();
        Self {
            html: mentions_tag(&lower, "html"),
            head: mentions_tag(&lower, "head"),
            body: mentions_tag(&lower, "body"),
        }
    }

    fn implied(&self, name: &str) -> bool {
        match name {
            "html" => !self.html,
            "head" => !self.head,
            "body" => !self.body,
            _ => false,
        }
    }
}

fn mentions_tag(lower: &str, name: &str) -> bool {
    let needle = format!("<{}", name);
    lower.match_indices(&needle).any(|(at, _)| {
        match lower[at + needle.len()..].chars().next() {
            None => true,
            Some(c) => c == '>' || c == '/' || HTML_SPACE.contains(&c),
        }
    })
}

fn parse(html: &str) -> Vec<Dom> {
    let document = Html::parse_document(html);
    let written = WrittenWrappers::scan(html);
    let mut nodes = Vec::new();

    for child in document.tree.root().children() {
        match child.value() {
            Node::Doctype(doctype) => nodes.push(Dom::Doctype(doctype_tag(
                doctype.name(),
                doctype.public_id(),
                doctype.system_id(),
            ))),
            Node::Comment(comment) => {
                let comment: &str = comment;
                nodes.push(Dom::Comment(comment.to_string()));
            }
            _ => {
                if let Some(element) = ElementRef::wrap(child) {
                    lower_element(element, &written, &mut nodes);
                }
            }
        }
    }
    nodes
}

fn lower_element(element: ElementRef<'_>, written: &WrittenWrappers, out: &mut Vec<Dom>) {
    let mut children = Vec::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let text: &str = text;
                children.push(Dom::Text(text.to_string()));
            }
            Node::Comment(comment) => {
                let comment: &str = comment;
                children.push(Dom::Comment(comment.to_string()));
            }
            _ => {
                if let Some(inner) = ElementRef::wrap(child) {
                    lower_element(inner, written, &mut children);
                }
            }
        }
    }

    let name = element.value().name();
    if written.implied(name) {
        out.extend(children);
        return;
    }
    out.push(Dom::Element {
        name: name.to_string(),
        attrs: element
            .value()
            .attrs()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        children,
    });
}

fn doctype_tag(name: &str, public_id: &str, system_id: &str) -> String {
    let mut tag = format!("<!DOCTYPE {}", name);
    if !public_id.is_empty() {
        tag.push_str(&format!(" PUBLIC \"{}\"", public_id));
    }
    if !system_id.is_empty() {
        if public_id.is_empty() {
            tag.push_str(" SYSTEM");
        }
        tag.push_str(&format!(" \"{}\"", system_id));
    }
    tag.push('>');
    tag
}

fn is_block(name: &str) -> bool {
    BLOCK_ELEMENTS.contains(&name)
}

/// Children can be laid out one per line without touching rendered text
fn is_block_layout(nodes: &[Dom]) -> bool {
    nodes.iter().all(|node| match node {
        Dom::Element { name, .. } => is_block(name),
        Dom::Text(_) => node.is_blank(),
        Dom::Comment(_) | Dom::Doctype(_) => true,
    })
}

/// Body of a raw-text element, when it holds nothing but text
fn raw_body(name: &str, children: &[Dom]) -> Option<String> {
    if !RAW_TEXT_ELEMENTS.contains(&name) {
        return None;
    }
    children
        .iter()
        .map(|child| match child {
            Dom::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(|parts| parts.concat())
}

fn style_lines(body: &str) -> Vec<&str> {
    body.lines()
        .map(|line| line.trim_matches(HTML_SPACE))
        .filter(|line| !line.is_empty())
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if HTML_SPACE.contains(&c) {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

fn open_tag(name: &str, attrs: &[(String, String)]) -> String {
    let mut tag = format!("<{}", name);
    for (key, value) in attrs {
        if value.is_empty() {
            tag.push_str(&format!(" {}", key));
        } else {
            tag.push_str(&format!(" {}=\"{}\"", key, escape_attr(value)));
        }
    }
    tag.push('>');
    tag
}

#[derive(Default)]
struct Printer {
    lines: Vec<String>,
}

impl Printer {
    fn push(&mut self, depth: usize, line: &str) {
        self.lines.push(format!("{}{}", INDENT.repeat(depth), line));
    }

    fn children(&mut self, nodes: &[Dom], depth: usize) {
        if is_block_layout(nodes) {
            for node in nodes.iter().filter(|node| !node.is_blank()) {
                self.node(node, depth);
            }
        } else {
            let line = inline_run(nodes);
            if !line.is_empty() {
                self.push(depth, &line);
            }
        }
    }

    fn node(&mut self, node: &Dom, depth: usize) {
        match node {
            Dom::Doctype(tag) => self.push(depth, tag),
            Dom::Comment(comment) => self.push(depth, &format!("<!--{}-->", comment)),
            Dom::Text(text) => {
                let text = collapse_whitespace(text);
                let text = text.trim_matches(' ');
                if !text.is_empty() {
                    self.push(depth, &escape_text(text));
                }
            }
            Dom::Element { name, attrs, children } => self.element(name, attrs, children, depth),
        }
    }

    fn element(&mut self, name: &str, attrs: &[(String, String)], children: &[Dom], depth: usize) {
        let open = open_tag(name, attrs);
        if VOID_ELEMENTS.contains(&name) {
            self.push(depth, &open);
            return;
        }
        let close = format!("</{}>", name);

        if let Some(body) = raw_body(name, children) {
            if body.trim_matches(HTML_SPACE).is_empty() {
                self.push(depth, &format!("{}{}", open, close));
            } else if name == "style" {
                self.push(depth, &open);
                for line in style_lines(&body) {
                    self.push(depth + 1, line);
                }
                self.push(depth, &close);
            } else {
                self.push(depth, &format!("{}{}{}", open, body, close));
            }
            return;
        }

        if PRESERVED_ELEMENTS.contains(&name) {
            self.push(depth, &format!("{}{}{}", open, preserved_body(children), close));
            return;
        }

        if children.iter().all(Dom::is_blank) {
            self.push(depth, &format!("{}{}", open, close));
        } else if is_block_layout(children) {
            self.push(depth, &open);
            self.children(children, depth + 1);
            self.push(depth, &close);
        } else {
            self.push(depth, &format!("{}{}{}", open, inline_run(children), close));
        }
    }
}

/// Single-line rendering of mixed content, trimmed at both ends
fn inline_run(nodes: &[Dom]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_inline(node, &mut out);
    }
    out.trim_matches(HTML_SPACE).to_string()
}

fn write_inline(node: &Dom, out: &mut String) {
    match node {
        Dom::Doctype(tag) => out.push_str(tag),
        Dom::Comment(comment) => out.push_str(&format!("<!--{}-->", comment)),
        Dom::Text(text) => out.push_str(&escape_text(&collapse_whitespace(text))),
        Dom::Element { name, attrs, children } => {
            out.push_str(&open_tag(name, attrs));
            if VOID_ELEMENTS.contains(&name.as_str()) {
                return;
            }
            if let Some(body) = raw_body(name, children) {
                out.push_str(&body);
            } else if PRESERVED_ELEMENTS.contains(&name.as_str()) {
                out.push_str(&preserved_body(children));
            } else {
                for child in children {
                    write_inline(child, out);
                }
            }
            out.push_str(&format!("</{}>", name));
        }
    }
}

/// Content of `pre`-like elements, byte for byte. The parser drops one
/// newline right after the start tag, so a leading newline is doubled.
fn preserved_body(children: &[Dom]) -> String {
    let mut out = String::new();
    if let Some(Dom::Text(text)) = children.first() {
        if text.starts_with('\n') {
            out.push('\n');
        }
    }
    for child in children {
        write_verbatim(child, &mut out);
    }
    out
}

fn write_verbatim(node: &Dom, out: &mut String) {
    match node {
        Dom::Doctype(tag) => out.push_str(tag),
        Dom::Comment(comment) => out.push_str(&format!("<!--{}-->", comment)),
        Dom::Text(text) => out.push_str(&escape_text(text)),
        Dom::Element { name, attrs, children } => {
            out.push_str(&open_tag(name, attrs));
            if VOID_ELEMENTS.contains(&name.as_str()) {
                return;
            }
            match raw_body(name, children) {
                Some(body) => out.push_str(&body),
                None => children.iter().for_each(|child| write_verbatim(child, out)),
            }
            out.push_str(&format!("</{}>", name));
        }
    }
}

fn collect_text(nodes: &[Dom]) -> Vec<String> {
    let mut collector = TextCollector::default();
    for node in nodes {
        collector.visit(node);
    }
    collector.flush();
    collector.blocks
}

#[derive(Default)]
struct TextCollector {
    blocks: Vec<String>,
    run: String,
}

impl TextCollector {
    fn visit(&mut self, node: &Dom) {
        let (name, children) = match node {
            Dom::Text(text) => {
                self.run.push_str(text);
                return;
            }
            Dom::Comment(_) | Dom::Doctype(_) => return,
            Dom::Element { name, children, .. } => (name.as_str(), children),
        };

        if let Some(body) = raw_body(name, children) {
            self.flush();
            let body = if name == "style" {
                style_lines(&body).join("\n")
            } else if body.trim_matches(HTML_SPACE).is_empty() {
                String::new()
            } else {
                body
            };
            self.keep(body);
        } else if PRESERVED_ELEMENTS.contains(&name) {
            self.flush();
            let mut text = String::new();
            raw_text(children, &mut text);
            self.keep(text);
        } else if is_block(name) {
            self.flush();
            children.iter().for_each(|child| self.visit(child));
            self.flush();
        } else {
            children.iter().for_each(|child| self.visit(child));
        }
    }

    fn flush(&mut self) {
        let text = collapse_whitespace(&self.run);
        self.keep(text.trim_matches(' ').to_string());
        self.run.clear();
    }

    fn keep(&mut self, block: String) {
        if !block.is_empty() {
            self.blocks.push(block);
        }
    }
}

fn raw_text(nodes: &[Dom], out: &mut String) {
    for node in nodes {
        match node {
            Dom::Text(text) => out.push_str(text),
            Dom::Element { children, .. } => raw_text(children, out),
            Dom::Comment(_) | Dom::Doctype(_) => {}
        }
    }
}
