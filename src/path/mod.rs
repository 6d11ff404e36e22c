//! Path expressions over record graphs
//!
//! A path is a dot-separated list of segments. Each segment is an attribute
//! name, optionally followed by a bracket selector:
//!
//! - `dept.leader.name` - plain attributes
//! - `skills[0]` - element of a sequence
//! - `skills[*]` - every element, joined into one cell (final segment only)
//! - `properties[city]` / `properties['city']` - value of a map entry

mod resolver;

pub use resolver::{NoTemplates, PathResolver, ResolverConfig, Templates};

use crate::error::{FlatsheetError, FlatsheetResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:\[([^\[\]]*)\])?$").expect("segment pattern is valid")
});

/// Largest list index a path may name; writes grow lists up to it
pub const MAX_INDEX: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Field(String),
    Index(String, usize),
    Wildcard(String),
    Key(String, String),
}

impl Segment {
    /// The attribute this segment reads
    pub fn name(&self) -> &str {
        match self {
            Segment::Field(name)
            | Segment::Index(name, _)
            | Segment::Wildcard(name)
            | Segment::Key(name, _) => name,
        }
    }

    fn parse(raw: &str, full: &str) -> FlatsheetResult<Self> {
        let caps = SEGMENT_RE
            .captures(raw)
            .ok_or_else(|| invalid(full, format!("malformed segment '{}'", raw)))?;
        let name = caps[1].to_string();

        let Some(selector) = caps.get(2).map(|m| m.as_str().trim()) else {
            return Ok(Segment::Field(name));
        };

        if selector.is_empty() {
            return Err(invalid(full, format!("empty selector in '{}'", raw)));
        }
        if selector == "*" {
            return Ok(Segment::Wildcard(name));
        }
        if selector.chars().all(|c| c.is_ascii_digit()) {
            let index = selector
                .parse::<usize>()
                .map_err(|e| invalid(full, format!("bad index in '{}': {}", raw, e)))?;
            if index > MAX_INDEX {
                return Err(invalid(
                    full,
                    format!("index {} in '{}' exceeds {}", index, raw, MAX_INDEX),
                ));
            }
            return Ok(Segment::Index(name, index));
        }

        let key = strip_quotes(selector);
        if key.is_empty() {
            return Err(invalid(full, format!("empty key in '{}'", raw)));
        }
        Ok(Segment::Key(name, key.to_string()))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "{}", name),
            Segment::Index(name, index) => write!(f, "{}[{}]", name, index),
            Segment::Wildcard(name) => write!(f, "{}[*]", name),
            Segment::Key(name, key) if key.chars().all(|c| c.is_ascii_digit()) => {
                write!(f, "{}['{}']", name, key)
            }
            Segment::Key(name, key) => write!(f, "{}[{}]", name, key),
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

fn invalid(path: &str, reason: String) -> FlatsheetError {
    FlatsheetError::InvalidPathExpression {
        path: path.to_string(),
        reason,
    }
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn parse(expr: &str) -> FlatsheetResult<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(invalid(expr, "path is empty".to_string()));
        }

        let segments = split_outside_brackets(expr)?
            .into_iter()
            .map(|raw| Segment::parse(raw, expr))
            .collect::<FlatsheetResult<Vec<_>>>()?;

        Self::from_segments(segments).map_err(|reason| invalid(expr, reason))
    }

    /// Single plain attribute
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Field(name.into())],
        }
    }

    fn from_segments(segments: Vec<Segment>) -> Result<Self, String> {
        let last = segments.len().saturating_sub(1);
        if let Some(pos) = segments
            .iter()
            .position(|s| matches!(s, Segment::Wildcard(_)))
        {
            if pos != last {
                return Err("wildcard is only allowed on the final segment".to_string());
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.last(), Some(Segment::Wildcard(_)))
    }

    /// `self` followed by `child`
    pub fn join(&self, child: &Path) -> FlatsheetResult<Path> {
        let mut segments = self.segments.clone();
        segments.extend(child.segments.iter().cloned());
        Self::from_segments(segments).map_err(|reason| {
            invalid(&format!("{}.{}", self, child), reason)
        })
    }

    /// Key naming the declared type of the value reached after segment `upto`
    ///
    /// Indices and map keys are erased (`items[2].dept` -> `items[].dept`), since
    /// every element of a container shares one declared type.
    pub fn template_key(&self, upto: usize) -> String {
        self.segments
            .iter()
            .take(upto + 1)
            .map(|segment| match segment {
                Segment::Field(name) => name.clone(),
                Segment::Index(name, _) | Segment::Wildcard(name) | Segment::Key(name, _) => {
                    format!("{}[]", name)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = FlatsheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

fn split_outside_brackets(expr: &str) -> FlatsheetResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, c) in expr.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid(expr, "unbalanced ']'".to_string()))?;
            }
            '.' if depth == 0 => {
                parts.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(invalid(expr, "unbalanced '['".to_string()));
    }
    parts.push(&expr[start..]);

    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(invalid(expr, "empty segment".to_string()));
    }
    Ok(parts.into_iter().map(str::trim).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_path() {
        let path = Path::parse("dept.leader.name").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Field("dept".to_string()),
                Segment::Field("leader".to_string()),
                Segment::Field("name".to_string()),
            ]
        );
        assert_eq!(path.to_string(), "dept.leader.name");
    }

    #[test]
    fn test_parse_selectors() {
        let path = Path::parse("skills[0]").unwrap();
        assert_eq!(path.segments(), &[Segment::Index("skills".to_string(), 0)]);

        let path = Path::parse("skills[*]").unwrap();
        assert!(path.is_wildcard());

        let path = Path::parse("properties[city]").unwrap();
        assert_eq!(
            path.segments(),
            &[Segment::Key("properties".to_string(), "city".to_string())]
        );

        let path = Path::parse("properties['a.b']").unwrap();
        assert_eq!(
            path.segments(),
            &[Segment::Key("properties".to_string(), "a.b".to_string())]
        );
    }

    #[test]
    fn test_dots_inside_brackets_do_not_split() {
        let path = Path::parse("items[2].tags[x.y]").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.to_string(), "items[2].tags[x.y]");
    }

    #[test]
    fn test_quoted_numeric_key_round_trips() {
        let path = Path::parse("codes['7']").unwrap();
        assert_eq!(
            path.segments(),
            &[Segment::Key("codes".to_string(), "7".to_string())]
        );
        assert_eq!(Path::parse(&path.to_string()).unwrap(), path);
    }

    #[test]
    fn test_invalid_paths() {
        for bad in [
            "", "a..b", ".a", "a.", "a[", "a]", "a[]", "1abc", "a b", "a[*].b", "a[0][1]",
        ] {
            let err = Path::parse(bad).unwrap_err();
            assert!(
                matches!(err, FlatsheetError::InvalidPathExpression { .. }),
                "'{}' should be invalid, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_huge_index_is_rejected() {
        assert!(Path::parse(&format!("a[{}]", MAX_INDEX)).is_ok());
        for bad in ["a[1048577]", "a[18446744073709551615]", "a[99999999999999999999999]"] {
            let err = Path::parse(bad).unwrap_err();
            assert!(
                matches!(err, FlatsheetError::InvalidPathExpression { .. }),
                "'{}' should be invalid, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_join_rejects_wildcard_in_middle() {
        let base = Path::parse("tags[*]").unwrap();
        let child = Path::parse("name").unwrap();
        assert!(base.join(&child).is_err());

        let base = Path::parse("dept").unwrap();
        assert_eq!(base.join(&child).unwrap().to_string(), "dept.name");
    }

    #[test]
    fn test_template_key_erases_selectors() {
        let path = Path::parse("items[2].dept.leader").unwrap();
        assert_eq!(path.template_key(0), "items[]");
        assert_eq!(path.template_key(1), "items[].dept");
        assert_eq!(path.template_key(2), "items[].dept.leader");
    }
}
