//! Format identity: [`FormatTag`] and the [`FormatPair`] registry key.
//!
//! A tag is the only "wire" vocabulary the dispatch core speaks. Tags are
//! normalised once, at construction, so every comparison after that is a
//! plain byte comparison: `"PDF"`, `" pdf "` and `".pdf"` all become `pdf`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Reason a string was rejected as a format tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatTagError {
    #[error("format tag is empty")]
    Empty,

    #[error("format tag '{tag}' contains invalid character {ch:?} (allowed: a-z, 0-9, '+', '-', '_')")]
    InvalidChar { tag: String, ch: char },
}

/// Normalised, case-insensitive identifier of a file format (`"pdf"`, `"png"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormatTag(String);

impl FormatTag {
    /// Parse and normalise a tag.
    ///
    /// Surrounding whitespace and a single leading `.` are dropped, the rest is
    /// lowercased. The result must be non-empty ASCII alphanumerics plus
    /// `+`, `-` and `_`.
    pub fn parse(input: &str) -> Result<Self, FormatTagError> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(FormatTagError::Empty);
        }
        if let Some(ch) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_')))
        {
            return Err(FormatTagError::InvalidChar {
                tag: input.to_string(),
                ch,
            });
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Derive a tag from a path's extension (`report.PDF` → `pdf`).
    ///
    /// Returns `None` when the path has no usable extension. Aliases such as
    /// `jpeg`/`jpg` are not folded; that mapping belongs to the caller's
    /// file-type detection.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        Self::parse_extension(path).ok()
    }

    /// [`Self::from_path`] that keeps the reason. A missing extension is
    /// [`FormatTagError::Empty`].
    pub fn parse_extension(path: impl AsRef<Path>) -> Result<Self, FormatTagError> {
        let ext = path
            .as_ref()
            .extension()
            .map(|ext| ext.to_string_lossy())
            .unwrap_or_default();
        Self::parse(&ext)
    }

    /// A tag from a compile-time constant known to be valid.
    pub(crate) fn known(tag: &'static str) -> Self {
        debug_assert!(Self::parse(tag).is_ok_and(|t| t.0 == tag), "bad tag {tag}");
        Self(tag.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against an unparsed string.
    pub fn matches(&self, other: &str) -> bool {
        Self::parse(other).map(|t| t == *self).unwrap_or(false)
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FormatTag {
    type Err = FormatTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FormatTag {
    type Error = FormatTagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for FormatTag {
    type Error = FormatTagError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<FormatTag> for String {
    fn from(tag: FormatTag) -> Self {
        tag.0
    }
}

impl AsRef<str> for FormatTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A `(source, target)` conversion key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FormatPair {
    pub source: FormatTag,
    pub target: FormatTag,
}

impl FormatPair {
    pub fn new(source: FormatTag, target: FormatTag) -> Self {
        Self { source, target }
    }

    /// Parse both sides; the error names the first side that failed.
    pub fn parse(source: &str, target: &str) -> Result<Self, (Side, FormatTagError)> {
        let source = FormatTag::parse(source).map_err(|e| (Side::Source, e))?;
        let target = FormatTag::parse(target).map_err(|e| (Side::Target, e))?;
        Ok(Self { source, target })
    }
}

impl fmt::Display for FormatPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.source, self.target)
    }
}

/// Which side of a pair a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pdf", "pdf")]
    #[case("PDF", "pdf")]
    #[case(" Png ", "png")]
    #[case(".jpg", "jpg")]
    #[case("c++", "c++")]
    #[case("tar_gz", "tar_gz")]
    fn parse_normalises(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(FormatTag::parse(input).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case(".")]
    fn parse_rejects_empty(#[case] input: &str) {
        assert_eq!(FormatTag::parse(input), Err(FormatTagError::Empty));
    }

    #[test]
    fn parse_rejects_separators() {
        let err = FormatTag::parse("tar.gz").unwrap_err();
        assert!(matches!(err, FormatTagError::InvalidChar { ch: '.', .. }));
        assert!(FormatTag::parse("a b").is_err());
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let a = FormatTag::parse("DocX").unwrap();
        let b: FormatTag = "docx".parse().unwrap();
        assert_eq!(a, b);
        assert!(a.matches("DOCX"));
        assert!(!a.matches("doc"));
    }

    #[test]
    fn from_path_uses_extension() {
        assert_eq!(
            FormatTag::from_path("/tmp/Report.PDF").map(String::from),
            Some("pdf".to_string())
        );
        assert_eq!(FormatTag::from_path("/tmp/Makefile"), None);
    }

    #[test]
    fn parse_extension_keeps_the_reason() {
        assert_eq!(
            FormatTag::parse_extension("/tmp/Makefile"),
            Err(FormatTagError::Empty)
        );
        assert!(matches!(
            FormatTag::parse_extension("/tmp/a.t x t"),
            Err(FormatTagError::InvalidChar { ch: ' ', .. })
        ));
        assert_eq!(FormatTag::parse_extension("x.Md").unwrap().as_str(), "md");
    }

    #[test]
    fn pair_display_and_parse() {
        let pair = FormatPair::parse("TXT", "pdf").unwrap();
        assert_eq!(pair.to_string(), "txt → pdf");

        let (side, _) = FormatPair::parse("txt", "").unwrap_err();
        assert_eq!(side, Side::Target);
    }

    #[test]
    fn serde_round_trips_as_plain_string() {
        let tag = FormatTag::parse("Png").unwrap();
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"png\"");
        let bad: Result<FormatTag, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
