//! Minimal CSS selector matching.
//!
//! Supports compound selectors built from a tag, `#id`, `.class`, `[attr]`
//! and `[attr=value]`, joined by the descendant combinator (whitespace).

use super::document::Arena;
use super::node::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrTest {
    Present(String),
    Equals(String, String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

impl Compound {
    fn parse(input: &str) -> Option<Self> {
        let mut compound = Compound::default();
        let mut rest = input;

        let tag_end = rest.find(['#', '.', '[']).unwrap_or(rest.len());
        match &rest[..tag_end] {
            "" | "*" => {}
            tag if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') => {
                compound.tag = Some(tag.to_ascii_lowercase())
            }
            _ => return None,
        }
        rest = &rest[tag_end..];

        while let Some(c) = rest.chars().next() {
            match c {
                '#' | '.' => {
                    let end = rest[1..].find(['#', '.', '[']).map_or(rest.len(), |i| i + 1);
                    let name = &rest[1..end];
                    if name.is_empty() {
                        return None;
                    }
                    if c == '#' {
                        compound.id = Some(name.to_string());
                    } else {
                        compound.classes.push(name.to_string());
                    }
                    rest = &rest[end..];
                }
                '[' => {
                    let end = rest.find(']')?;
                    let body = &rest[1..end];
                    let test = match body.split_once('=') {
                        Some((name, value)) => AttrTest::Equals(
                            name.trim().to_string(),
                            value.trim().trim_matches(['"', '\'']).to_string(),
                        ),
                        None => AttrTest::Present(body.trim().to_string()),
                    };
                    compound.attrs.push(test);
                    rest = &rest[end + 1..];
                }
                _ => return None,
            }
        }
        Some(compound)
    }

    fn matches(&self, arena: &Arena, node: NodeId) -> bool {
        let Some(el) = arena.element(node) else {
            return false;
        };
        if self.tag.as_ref().is_some_and(|tag| *tag != el.tag) {
            return false;
        }
        if let Some(id) = &self.id {
            if el.attributes.get("id") != Some(id) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class = el.attributes.get("class").map_or("", String::as_str);
            if !self
                .classes
                .iter()
                .all(|wanted| class.split_whitespace().any(|c| c == wanted))
            {
                return false;
            }
        }
        self.attrs.iter().all(|test| match test {
            AttrTest::Present(name) => el.attributes.contains_key(name),
            AttrTest::Equals(name, value) => el.attributes.get(name) == Some(value),
        })
    }
}

/// A parsed selector: compounds separated by descendant combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Selector {
    parts: Vec<Compound>,
}

impl Selector {
    /// Parse a selector. Returns `None` for unsupported syntax.
    pub(crate) fn parse(input: &str) -> Option<Self> {
        let parts = input
            .split_whitespace()
            .map(Compound::parse)
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(Self { parts })
    }

    pub(crate) fn matches(&self, arena: &Arena, node: NodeId) -> bool {
        let Some((last, ancestors)) = self.parts.split_last() else {
            return false;
        };
        if !last.matches(arena, node) {
            return false;
        }

        // Greedy right-to-left ancestor match is exact for descendant-only chains.
        let mut remaining = ancestors.iter().rev().peekable();
        let mut current = arena.slot(node).parent;
        while let (Some(part), Some(id)) = (remaining.peek(), current) {
            if part.matches(arena, id) {
                remaining.next();
            }
            current = arena.slot(id).parent;
        }
        remaining.peek().is_none()
    }
}
