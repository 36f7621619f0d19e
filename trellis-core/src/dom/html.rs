//! HTML serialization and parsing for the markup this crate emits.
//!
//! The parser is not a general HTML5 parser. It understands what the
//! serializer produces (elements, quoted attributes, text, comments, void
//! elements, raw-text `script`/`style`) plus a doctype, which is enough for
//! a client to load server-rendered pages.

use serde_json::Value as Json;

use super::document::Arena;
use super::node::{ElementData, NodeData, NodeId};
use crate::error::{Error, Result};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Escape text content.
pub fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// Escape a double-quoted attribute value.
pub fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    if !value.is_empty() {
        out.push_str("=\"");
        escape_attribute(value, out);
        out.push('"');
    }
}

/// How a property is reflected into markup. `None` means omitted.
fn reflect_property(value: &Json) -> Option<String> {
    match value {
        Json::Bool(true) => Some(String::new()),
        Json::Bool(false) | Json::Null => None,
        Json::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn serialize(arena: &Arena, node: NodeId, out: &mut String) {
    let slot = arena.slot(node);
    match &slot.data {
        NodeData::Document | NodeData::Holder => {
            for &child in &slot.children {
                serialize(arena, child, out);
            }
        }
        NodeData::Text(text) => escape_text(text, out),
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeData::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attributes {
                if !el.properties.contains_key(name) {
                    push_attribute(out, name, value);
                }
            }
            for (name, value) in &el.properties {
                if let Some(value) = reflect_property(value) {
                    push_attribute(out, name, &value);
                }
            }
            out.push('>');
            if is_void(&el.tag) {
                return;
            }
            if RAW_TEXT_ELEMENTS.contains(&el.tag.as_str()) {
                for &child in &slot.children {
                    if let NodeData::Text(text) = &arena.slot(child).data {
                        out.push_str(text);
                    }
                }
            } else {
                for &child in &slot.children {
                    serialize(arena, child, out);
                }
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

/// Decode the entities the serializer emits plus numeric references.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        // Entity names are short; only look a few characters ahead.
        let window = rest.char_indices().nth(12).map_or(rest.len(), |(i, _)| i);
        let Some(semi) = rest[..window].find(';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Html {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn take_until(&mut self, needle: &str) -> Result<&'a str> {
        let rest = self.rest();
        let end = rest
            .find(needle)
            .ok_or_else(|| self.error(format!("expected `{needle}`")))?;
        self.pos += end + needle.len();
        Ok(&rest[..end])
    }

    fn take_name(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/'))
            .unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn parse_attributes(&mut self, el: &mut ElementData) -> Result<bool> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if let Some(after) = rest.strip_prefix("/>") {
                self.pos = self.input.len() - after.len();
                return Ok(true);
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok(false);
            }
            if rest.is_empty() {
                return Err(self.error("unterminated tag"));
            }

            let name = self.take_name();
            if name.is_empty() {
                return Err(self.error("expected attribute name"));
            }
            self.skip_whitespace();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                match self.rest().chars().next() {
                    Some(quote @ ('"' | '\'')) => {
                        self.pos += 1;
                        decode_entities(self.take_until(&quote.to_string())?)
                    }
                    _ => decode_entities(self.take_name()),
                }
            } else {
                String::new()
            };
            el.attributes.insert(name.to_ascii_lowercase(), value);
        }
    }
}

/// Parse markup into detached nodes in `arena`, returning the top level.
pub(crate) fn parse(arena: &mut Arena, input: &str) -> Result<Vec<NodeId>> {
    let mut parser = Parser { input, pos: 0 };
    let mut top = Vec::new();
    let mut open: Vec<(NodeId, String)> = Vec::new();

    let mut attach = |arena: &mut Arena, open: &[(NodeId, String)], node: NodeId| -> Result<()> {
        match open.last() {
            Some((parent, _)) => arena.insert_before(*parent, node, None),
            None => {
                top.push(node);
                Ok(())
            }
        }
    };

    while parser.pos < input.len() {
        let rest = parser.rest();
        if let Some(after) = rest.strip_prefix("<!--") {
            parser.pos = input.len() - after.len();
            let text = parser.take_until("-->")?;
            let node = arena.push(NodeData::Comment(text.to_string()));
            attach(arena, &open, node)?;
        } else if rest.starts_with("<!") {
            parser.take_until(">")?;
        } else if let Some(after) = rest.strip_prefix("</") {
            parser.pos = input.len() - after.len();
            let name = parser.take_until(">")?.trim().to_ascii_lowercase();
            if let Some(depth) = open.iter().rposition(|(_, tag)| *tag == name) {
                open.truncate(depth);
            }
        } else if rest.starts_with('<')
            && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
        {
            parser.pos += 1;
            let tag = parser.take_name().to_ascii_lowercase();
            let mut el = ElementData::new(&tag);
            let self_closing = parser.parse_attributes(&mut el)?;
            let node = arena.push(NodeData::Element(el));
            attach(arena, &open, node)?;

            if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) && !self_closing {
                let close = format!("</{tag}>");
                let body = parser.take_until(&close)?;
                if !body.is_empty() {
                    let text = arena.push(NodeData::Text(body.to_string()));
                    arena.insert_before(node, text, None)?;
                }
            } else if !self_closing && !is_void(&tag) {
                open.push((node, tag));
            }
        } else {
            let first = rest.chars().next().map_or(1, char::len_utf8);
            let end = rest[first..].find('<').map_or(rest.len(), |i| i + first);
            let node = arena.push(NodeData::Text(decode_entities(&rest[..end])));
            parser.pos += end;
            attach(arena, &open, node)?;
        }
    }

    Ok(top)
}
