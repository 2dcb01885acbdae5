//! Path pattern matching.
//!
//! # Responsibilities
//! - Compile templates like `/games/{game_id}/teams/{team_id}`
//! - Match a request path segment by segment, capturing parameters
//! - Rank patterns so literal segments beat parameters
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - A parameter matches exactly one non-empty segment, and must still be
//!   one segment once percent-decoded (no `.`, `..`, `/` or `\`)
//! - A trailing slash is ignored
//! - No regex to guarantee O(n) matching

use std::cmp::Ordering;

use percent_encoding::percent_decode_str;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

/// Parameters captured by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.trim_matches('/');
    trimmed.split('/').filter(move |_| !trimmed.is_empty())
}

/// Dot segments and encoded separators are collapsed by URL parsers
/// downstream, so they never count as a parameter value.
fn is_single_segment(raw: &str) -> bool {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    !decoded.is_empty()
        && decoded != "."
        && decoded != ".."
        && !decoded.contains(['/', '\\'])
}

impl PathPattern {
    pub fn parse(template: &str) -> Self {
        let segments = split(template)
            .map(|segment| {
                match segment
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                {
                    Some(name) => Segment::Param(name.to_string()),
                    None => Segment::Literal(segment.to_string()),
                }
            })
            .collect();
        Self { segments }
    }

    /// Match `path`, returning captured parameters.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = Vec::new();
        let mut parts = split(path);

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(expected) if expected == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if !is_single_segment(part) => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(PathParams(params))
    }

    /// Order by specificity: at the first differing position a literal wins.
    pub fn specificity_cmp(&self, other: &Self) -> Ordering {
        let rank = |s: &Segment| match s {
            Segment::Literal(_) => 0u8,
            Segment::Param(_) => 1u8,
        };
        self.segments
            .iter()
            .map(rank)
            .cmp(other.segments.iter().map(rank))
    }
}
