//! Virtual path algebra: absolute paths below a virtual root, relative paths
//! with "up" levels, and optional fragments.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A path below the virtual root `/`, optionally pointing at an anchor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AbsolutePath {
    /// Named segments from the root downward; empty for the root itself.
    segments: Vec<String>,
    /// Anchor within the addressed document.
    fragment: Option<String>,
}

/// A path relative to some base, ascending `parent_levels` times first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RelativePath {
    /// Anchor within the addressed document.
    fragment: Option<String>,
    /// Number of leading `..` segments.
    parent_levels: usize,
    /// Named segments after the leading `..` run.
    segments: Vec<String>,
}

/// A path as written in markup: absolute when it starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Path {
    /// Rooted at the virtual root.
    Absolute(AbsolutePath),
    /// Relative to the referencing document.
    Relative(RelativePath),
}

/// Outcome of resolving a relative path against an absolute base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathResolution {
    /// The path ascends above the virtual root; the literal relative path is kept.
    EscapesRoot(RelativePath),
    /// The path stays inside the virtual tree.
    Internal(AbsolutePath),
}

impl AbsolutePath {
    /// The virtual root `/`.
    pub const fn root() -> Self {
        return Self {
            segments: Vec::new(),
            fragment: None,
        };
    }

    /// Parse `/a/b.md#frag`. `.` and `..` segments are collapsed.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` if the text is not rooted or ascends above the root.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(Error::InvalidPath {
                path: raw.to_string(),
                reason: "absolute paths start with `/`".to_string(),
            });
        };
        return match Self::root().resolve(&RelativePath::parse(rest)) {
            PathResolution::Internal(path) => Ok(path),
            PathResolution::EscapesRoot(_) => Err(Error::InvalidPath {
                path: raw.to_string(),
                reason: "ascends above the virtual root".to_string(),
            }),
        };
    }

    /// Number of named segments below the root.
    pub fn depth(&self) -> usize {
        return self.segments.len();
    }

    /// The anchor part, if any.
    pub fn fragment(&self) -> Option<&str> {
        return self.fragment.as_deref();
    }

    /// Whether `self` equals `ancestor` or lies below it, ignoring fragments.
    pub fn is_within(&self, ancestor: &Self) -> bool {
        return self.segments.starts_with(&ancestor.segments);
    }

    /// Whether this is the virtual root.
    pub fn is_root(&self) -> bool {
        return self.segments.is_empty();
    }

    /// Append one named segment, dropping any fragment.
    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        return Self {
            segments,
            fragment: None,
        };
    }

    /// Last segment, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        return self.segments.last().map(String::as_str);
    }

    /// The enclosing tree path. The root is its own parent.
    pub fn parent(&self) -> Self {
        let keep = self.segments.len().saturating_sub(1);
        return Self {
            segments: self.segments.iter().take(keep).cloned().collect(),
            fragment: None,
        };
    }

    /// Express `self` relative to the document at `document`.
    ///
    /// A target inside the same document becomes a bare `#fragment`; anything
    /// else is relative to the document's parent tree.
    pub fn relative_to(&self, document: &Self) -> RelativePath {
        if self.segments == document.segments {
            return RelativePath {
                fragment: self.fragment.clone(),
                parent_levels: 0,
                segments: Vec::new(),
            };
        }
        let base = document.parent();
        let common = self
            .segments
            .iter()
            .zip(base.segments.iter())
            .take_while(|(a, b)| return a == b)
            .count();
        return RelativePath {
            fragment: self.fragment.clone(),
            parent_levels: base.depth().saturating_sub(common),
            segments: self.segments.iter().skip(common).cloned().collect(),
        };
    }

    /// Resolve `relative` against `self`, treating `self` as a tree path.
    pub fn resolve(&self, relative: &RelativePath) -> PathResolution {
        if relative.parent_levels > self.depth() {
            return PathResolution::EscapesRoot(relative.clone());
        }
        let keep = self.depth().saturating_sub(relative.parent_levels);
        let segments = self
            .segments
            .iter()
            .take(keep)
            .chain(relative.segments.iter())
            .cloned()
            .collect();
        return PathResolution::Internal(Self {
            segments,
            fragment: relative.fragment.clone(),
        });
    }

    /// Resolve a link written inside the document at `self`.
    ///
    /// A fragment-only or empty path addresses the document itself; anything
    /// else is resolved against the document's parent tree.
    pub fn resolve_from_document(&self, relative: &RelativePath) -> PathResolution {
        if relative.is_current_document() {
            return PathResolution::Internal(self.with_fragment(relative.fragment()));
        }
        return self.parent().resolve(relative);
    }

    /// Segments of `self` below `ancestor`, or `None` when not within it.
    pub fn segments_below(&self, ancestor: &Self) -> Option<&[String]> {
        return self.segments.strip_prefix(ancestor.segments.as_slice());
    }

    /// Same path with the given fragment.
    pub fn with_fragment(&self, fragment: Option<&str>) -> Self {
        return Self {
            segments: self.segments.clone(),
            fragment: fragment.map(String::from),
        };
    }

    /// Same path without a fragment.
    pub fn without_fragment(&self) -> Self {
        return self.with_fragment(None);
    }
}

impl RelativePath {
    /// Parse `../a/b.md#frag`. Never fails: `.` and empty segments are
    /// dropped, and `..` cancels a preceding named segment.
    pub fn parse(raw: &str) -> Self {
        let (path_part, fragment) = match raw.split_once('#') {
            Some((path, frag)) if !frag.is_empty() => (path, Some(frag.to_string())),
            Some((path, _)) => (path, None),
            None => (raw, None),
        };

        let mut parent_levels = 0_usize;
        let mut segments: Vec<String> = Vec::new();
        for segment in path_part.split('/') {
            match segment {
                "" | "." => {},
                ".." => {
                    if segments.pop().is_none() {
                        parent_levels = parent_levels.saturating_add(1);
                    }
                },
                name => segments.push(name.to_string()),
            }
        }

        return Self {
            fragment,
            parent_levels,
            segments,
        };
    }

    /// The anchor part, if any.
    pub fn fragment(&self) -> Option<&str> {
        return self.fragment.as_deref();
    }

    /// Whether the path addresses the referencing document itself.
    pub fn is_current_document(&self) -> bool {
        return self.parent_levels == 0 && self.segments.is_empty();
    }

    /// Number of leading `..` segments.
    pub const fn parent_levels(&self) -> usize {
        return self.parent_levels;
    }
}

impl Path {
    /// Parse a path as written in markup.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` for an absolute path that ascends above the root.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if raw.starts_with('/') {
            return AbsolutePath::parse(raw).map(Path::Absolute);
        }
        return Ok(Path::Relative(RelativePath::parse(raw)));
    }

    /// The anchor part, if any.
    pub fn fragment(&self) -> Option<&str> {
        return match self {
            Path::Absolute(path) => path.fragment(),
            Path::Relative(path) => path.fragment(),
        };
    }
}

/// Whether a link destination is an external URL rather than a virtual path.
///
/// Accepts scheme-prefixed URLs (`https:`, `mailto:`, …) and protocol-relative `//host`.
pub fn is_external_url(raw: &str) -> bool {
    if raw.starts_with("//") {
        return true;
    }
    let Some((scheme, _)) = raw.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alphabetic = chars.next().is_some_and(|c| return c.is_ascii_alphabetic());
    return starts_alphabetic
        && chars.all(|c| return c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'));
}

impl fmt::Display for AbsolutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        return Ok(());
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = std::iter::repeat_n("..", self.parent_levels)
            .chain(self.segments.iter().map(String::as_str))
            .collect();
        if parts.is_empty() && self.fragment.is_none() {
            return write!(f, ".");
        }
        write!(f, "{}", parts.join("/"))?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        return Ok(());
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Path::Absolute(path) => fmt::Display::fmt(path, f),
            Path::Relative(path) => fmt::Display::fmt(path, f),
        };
    }
}

impl FromStr for AbsolutePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        return Self::parse(s);
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        return Self::parse(s);
    }
}

impl From<AbsolutePath> for String {
    fn from(path: AbsolutePath) -> Self {
        return path.to_string();
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        return path.to_string();
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        return path.to_string();
    }
}

impl TryFrom<String> for AbsolutePath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        return Self::parse(&value);
    }
}

impl TryFrom<String> for RelativePath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        return Ok(Self::parse(&value));
    }
}

impl TryFrom<String> for Path {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        return Self::parse(&value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abs(raw: &str) -> AbsolutePath {
        return AbsolutePath::parse(raw).unwrap();
    }

    #[test]
    fn parses_relative_with_up_levels_and_fragment() {
        let path = RelativePath::parse("../tree2/doc5.md#ref");
        assert_eq!(path.parent_levels(), 1);
        assert_eq!(path.fragment(), Some("ref"));
        assert_eq!(path.to_string(), "../tree2/doc5.md#ref");
    }

    #[test]
    fn dot_dot_cancels_named_segment() {
        assert_eq!(RelativePath::parse("a/./../../b").to_string(), "../b");
    }

    #[test]
    fn resolves_against_document_parent() {
        let doc = abs("/tree1/doc3.md");
        let resolved = doc.resolve_from_document(&RelativePath::parse("../tree2/doc5.md#ref"));
        assert_eq!(resolved, PathResolution::Internal(abs("/tree2/doc5.md#ref")));
    }

    #[test]
    fn fragment_only_addresses_current_document() {
        let doc = abs("/tree1/doc3.md");
        let resolved = doc.resolve_from_document(&RelativePath::parse("#intro"));
        assert_eq!(resolved, PathResolution::Internal(abs("/tree1/doc3.md#intro")));
    }

    #[test]
    fn ascending_above_root_is_tagged_not_rejected() {
        let doc = abs("/tree1/doc3.md");
        let relative = RelativePath::parse("../../outside/file.md");
        assert_eq!(
            doc.resolve_from_document(&relative),
            PathResolution::EscapesRoot(relative.clone())
        );
    }

    #[test]
    fn absolute_parse_rejects_escaping_root() {
        assert!(AbsolutePath::parse("/../x").is_err());
        assert!(AbsolutePath::parse("x").is_err());
    }

    #[test]
    fn relative_to_sibling_tree() {
        let target = abs("/tree2/doc5.md#ref");
        let from = abs("/tree1/doc3.md");
        assert_eq!(target.relative_to(&from).to_string(), "../tree2/doc5.md#ref");
    }

    #[test]
    fn relative_to_same_document_is_fragment() {
        let target = abs("/tree1/doc3.md#ref");
        let from = abs("/tree1/doc3.md");
        assert_eq!(target.relative_to(&from).to_string(), "#ref");
    }

    #[test]
    fn root_displays_as_slash() {
        assert_eq!(AbsolutePath::root().to_string(), "/");
        assert!(AbsolutePath::root().parent().is_root());
    }

    #[test]
    fn within_ignores_fragment() {
        assert!(abs("/tree2/doc5.md#x").is_within(&abs("/tree2")));
        assert!(!abs("/tree22/doc.md").is_within(&abs("/tree2")));
    }

    #[test]
    fn detects_external_urls() {
        assert!(is_external_url("https://example.com"));
        assert!(is_external_url("mailto:me@example.com"));
        assert!(is_external_url("//cdn.example.com/x.png"));
        assert!(!is_external_url("../doc.md"));
        assert!(!is_external_url("doc.md#a:b"));
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&abs("/a/b.md#c")).unwrap();
        assert_eq!(json, "\"/a/b.md#c\"");
        let back: AbsolutePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, abs("/a/b.md#c"));
    }
}
