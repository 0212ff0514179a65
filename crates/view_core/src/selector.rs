//! A small CSS selector subset: `tag#id.class[attr=value]` compounds joined by
//! descendant whitespace, with `,` separated alternatives.

use crate::{
    dom::{Document, NodeId},
    error::{Result, ViewError},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Vec<Compound>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    value: Option<String>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = || ViewError::Selector(source.to_string());
        let mut alternatives = Vec::new();

        for alternative in split_top_level(source, |c| c == ',') {
            let compounds = split_top_level(&alternative, char::is_whitespace)
                .iter()
                .map(|token| parse_compound(token).ok_or_else(invalid))
                .collect::<Result<Vec<_>>>()?;
            if compounds.is_empty() {
                return Err(invalid());
            }
            alternatives.push(compounds);
        }

        if alternatives.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            source: source.trim().to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|chain| chain_matches(doc, node, chain))
    }
}

fn chain_matches(doc: &Document, node: NodeId, chain: &[Compound]) -> bool {
    let Some((subject, ancestors)) = chain.split_last() else {
        return false;
    };
    if !compound_matches(doc, node, subject) {
        return false;
    }

    let mut cursor = doc.parent(node);
    for compound in ancestors.iter().rev() {
        loop {
            let Some(candidate) = cursor else {
                return false;
            };
            cursor = doc.parent(candidate);
            if compound_matches(doc, candidate, compound) {
                break;
            }
        }
    }
    true
}

fn compound_matches(doc: &Document, node: NodeId, compound: &Compound) -> bool {
    let Some(tag) = doc.tag(node) else {
        return false;
    };
    if doc.is_text(node) {
        return false;
    }
    if let Some(expected) = &compound.tag {
        if !expected.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if doc.attr(node, "id") != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.iter().all(|class| doc.has_class(node, class)) {
        return false;
    }
    compound.attrs.iter().all(|attr| match &attr.value {
        Some(value) => doc.attr(node, &attr.name) == Some(value.as_str()),
        None => doc.attr(node, &attr.name).is_some(),
    })
}

fn split_top_level(source: &str, is_separator: impl Fn(char) -> bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in source.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '[') => {
                depth += 1;
                current.push(c);
            }
            (None, ']') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, c) if depth == 0 && is_separator(c) => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
            }
            (None, c) => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], pos: &mut usize) -> Option<String> {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    (*pos > start).then(|| chars[start..*pos].iter().collect())
}

fn parse_compound(token: &str) -> Option<Compound> {
    let chars: Vec<char> = token.chars().collect();
    let mut pos = 0;
    let mut compound = Compound::default();

    if chars.first() == Some(&'*') {
        pos = 1;
    } else if chars.first().copied().is_some_and(is_ident_char) {
        compound.tag = take_ident(&chars, &mut pos);
    }

    while pos < chars.len() {
        match chars[pos] {
            '#' => {
                pos += 1;
                compound.id = Some(take_ident(&chars, &mut pos)?);
            }
            '.' => {
                pos += 1;
                compound.classes.push(take_ident(&chars, &mut pos)?);
            }
            '[' => {
                pos += 1;
                let name = take_ident(&chars, &mut pos)?;
                let value = if chars.get(pos) == Some(&'=') {
                    pos += 1;
                    Some(take_attr_value(&chars, &mut pos)?)
                } else {
                    None
                };
                if chars.get(pos) != Some(&']') {
                    return None;
                }
                pos += 1;
                compound.attrs.push(AttrMatch { name, value });
            }
            _ => return None,
        }
    }

    Some(compound)
}

fn take_attr_value(chars: &[char], pos: &mut usize) -> Option<String> {
    match chars.get(*pos).copied() {
        Some(quote) if quote == '"' || quote == '\'' => {
            *pos += 1;
            let start = *pos;
            while *pos < chars.len() && chars[*pos] != quote {
                *pos += 1;
            }
            let value = chars[start..*pos].iter().collect();
            if *pos >= chars.len() {
                return None;
            }
            *pos += 1;
            Some(value)
        }
        _ => take_ident(chars, pos),
    }
}
