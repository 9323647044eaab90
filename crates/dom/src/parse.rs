use thiserror::Error;

use crate::element::{Element, Node};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of markup")]
    UnexpectedEof,
    #[error("malformed tag at byte {0}")]
    MalformedTag(usize),
}

/// Elements that never hold content and take no closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

fn is_void(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

/// Parse an HTML fragment into detached nodes.
///
/// The accepted subset covers what templates emit: nested tags with quoted,
/// single-quoted, bare, or bare-boolean attributes, text runs with the five
/// standard entities, comments, and void/self-closing elements. Unclosed
/// elements are closed at end of input; a stray closing tag that matches no
/// open element is dropped.
pub fn parse_fragment(markup: &str) -> Result<Vec<Node>, ParseError> {
    let mut parser = Parser {
        bytes: markup.as_bytes(),
        pos: 0,
    };
    let mut roots: Vec<Node> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    while !parser.at_end() {
        if parser.eat("<!--") {
            parser.skip_through("-->")?;
        } else if parser.peek_is("</") {
            parser.pos += 2;
            let name = parser.read_name()?.to_ascii_lowercase();
            parser.skip_to_gt()?;
            if let Some(open) = stack.iter().rposition(|el| el.is_tag(&name)) {
                stack.truncate(open);
            }
        } else if parser.peek_is("<") && parser.next_is_name_start() {
            let start = parser.pos;
            parser.pos += 1;
            let tag = parser.read_name()?.to_ascii_lowercase();
            let element = Element::new(&tag);
            let self_closed = parser.read_attributes(&element, start)?;
            sync_props(&element);
            attach(&mut roots, &stack, Node::Element(element.clone()));
            if !self_closed && !is_void(&tag) {
                stack.push(element);
            }
        } else {
            let text = parser.read_text();
            if !text.is_empty() {
                attach(&mut roots, &stack, Node::Text(decode_entities(&text)));
            }
        }
    }

    Ok(roots)
}

/// Mirror form-control attributes into their live props.
fn sync_props(element: &Element) {
    if let Some(value) = element.attr("value") {
        element.set_value(&value);
    }
    if element.attr("checked").is_some() {
        element.set_checked(true);
    }
    if element.attr("disabled").is_some() {
        element.set_disabled(true);
    }
}

fn attach(roots: &mut Vec<Node>, stack: &[Element], node: Node) {
    match stack.last() {
        Some(parent) => parent.append_node(node),
        None => roots.push(node),
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek_is(&self, prefix: &str) -> bool {
        self.bytes[self.pos..].starts_with(prefix.as_bytes())
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.peek_is(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn next_is_name_start(&self) -> bool {
        self.bytes
            .get(self.pos + 1)
            .is_some_and(|b| b.is_ascii_alphabetic())
    }

    fn skip_through(&mut self, marker: &str) -> Result<(), ParseError> {
        let haystack = &self.bytes[self.pos..];
        match haystack
            .windows(marker.len())
            .position(|w| w == marker.as_bytes())
        {
            Some(offset) => {
                self.pos += offset + marker.len();
                Ok(())
            }
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn skip_ws(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn read_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(|b| {
            b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_' || *b == b':'
        }) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ParseError::MalformedTag(start));
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn skip_to_gt(&mut self) -> Result<(), ParseError> {
        while let Some(b) = self.bytes.get(self.pos) {
            self.pos += 1;
            if *b == b'>' {
                return Ok(());
            }
        }
        Err(ParseError::UnexpectedEof)
    }

    /// Read attributes up to the closing `>`. Returns whether the tag was
    /// self-closing (`/>`).
    fn read_attributes(&mut self, element: &Element, start: usize) -> Result<bool, ParseError> {
        loop {
            self.skip_ws();
            match self.bytes.get(self.pos).copied() {
                None => return Err(ParseError::UnexpectedEof),
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(false);
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.eat(">") {
                        return Ok(true);
                    }
                    return Err(ParseError::MalformedTag(start));
                }
                Some(_) => {
                    let name = self.read_name()?;
                    self.skip_ws();
                    if self.eat("=") {
                        self.skip_ws();
                        let value = self.read_attr_value()?;
                        element.set_attr(&name, &decode_entities(&value));
                    } else {
                        // Bare boolean attribute.
                        element.set_attr(&name, "");
                    }
                }
            }
        }
    }

    fn read_attr_value(&mut self) -> Result<String, ParseError> {
        match self.bytes.get(self.pos).copied() {
            Some(quote @ (b'"' | b'\'')) => {
                self.pos += 1;
                let start = self.pos;
                while let Some(b) = self.bytes.get(self.pos).copied() {
                    if b == quote {
                        let value =
                            String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                        self.pos += 1;
                        return Ok(value);
                    }
                    self.pos += 1;
                }
                Err(ParseError::UnexpectedEof)
            }
            Some(_) => {
                let start = self.pos;
                while self
                    .bytes
                    .get(self.pos)
                    .is_some_and(|b| !b.is_ascii_whitespace() && *b != b'>' && *b != b'/')
                {
                    self.pos += 1;
                }
                Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
            }
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn read_text(&mut self) -> String {
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(|b| *b != b'<') {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn encode_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn encode_attr(text: &str) -> String {
    encode_text(text).replace('"', "&quot;")
}

/// Serialize one node into `out`.
pub(crate) fn serialize_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(&encode_text(text)),
        Node::Element(el) => {
            let tag = el.tag();
            out.push('<');
            out.push_str(&tag);
            for (name, value) in el.attrs_snapshot() {
                out.push(' ');
                out.push_str(&name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    out.push_str(&encode_attr(&value));
                    out.push('"');
                }
            }
            out.push('>');
            if is_void(&tag) {
                return;
            }
            for child in el.child_nodes() {
                serialize_node(&child, out);
            }
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
        }
    }
}
