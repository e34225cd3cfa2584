//! Structured matches found in build output.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::diagnostic::Severity;

/// A secondary location attached to a match, such as a "note: required by"
/// line of a compiler error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceEntry {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub col: Option<u32>,
    pub line_end: Option<u32>,
    pub col_end: Option<u32>,
    pub severity: Option<Severity>,
    pub message: Option<String>,
    pub html_message: Option<String>,
}

impl TraceEntry {
    /// Plain message, falling back to the HTML one.
    pub fn text(&self) -> Option<&str> {
        self.message.as_deref().or(self.html_message.as_deref())
    }
}

/// A match as returned by a match function.
///
/// Every field is optional; `severity` defaults to error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionMatch {
    pub file: Option<String>,
    /// Deprecated alias of `file`
    pub abs_file: Option<String>,
    pub line: Option<u32>,
    pub col: Option<u32>,
    pub line_end: Option<u32>,
    pub col_end: Option<u32>,
    pub severity: Option<Severity>,
    pub message: Option<String>,
    pub html_message: Option<String>,
    pub description: Option<String>,
    pub trace: Vec<TraceEntry>,
}

impl FunctionMatch {
    /// A match pointing at `file`.
    pub fn at(file: impl Into<String>) -> Self {
        FunctionMatch {
            file: Some(file.into()),
            ..Default::default()
        }
    }

    pub fn line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn col(mut self, col: u32) -> Self {
        self.col = Some(col);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn trace(mut self, entry: TraceEntry) -> Self {
        self.trace.push(entry);
        self
    }
}

/// One location found in the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    /// Ordinal assigned at parse time, stable until the next `set`
    pub id: usize,
    pub file: Option<String>,
    pub abs_file: Option<String>,
    pub line: Option<u32>,
    pub col: Option<u32>,
    pub line_end: Option<u32>,
    pub col_end: Option<u32>,
    pub severity: Severity,
    pub message: Option<String>,
    pub html_message: Option<String>,
    pub description: Option<String>,
    pub trace: Vec<TraceEntry>,
    /// Byte range in the output, for pattern matches
    #[serde(skip)]
    pub span: Option<Range<usize>>,
}

impl Match {
    /// Wrap a function result.
    pub fn from_function(id: usize, m: FunctionMatch) -> Self {
        Match {
            id,
            file: m.file,
            abs_file: m.abs_file,
            line: m.line,
            col: m.col,
            line_end: m.line_end,
            col_end: m.col_end,
            severity: m.severity.unwrap_or_default(),
            message: m.message,
            html_message: m.html_message,
            description: m.description,
            trace: m.trace,
            span: None,
        }
    }

    /// Plain message, falling back to the HTML one.
    pub fn text(&self) -> Option<&str> {
        self.message.as_deref().or(self.html_message.as_deref())
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// The file this match points at, resolved against `cwd`.
    ///
    /// `file` wins over the deprecated `abs_file`.
    pub fn resolve(&self, cwd: &Path) -> Option<PathBuf> {
        self.file
            .as_deref()
            .or(self.abs_file.as_deref())
            .map(|file| cwd.join(file))
    }

    /// Zero-based start position; missing or zero values become 0.
    pub fn position(&self) -> (u32, u32) {
        (zero_based(self.line), zero_based(self.col))
    }
}

/// Convert an optional 1-based value to 0-based.
pub(crate) fn zero_based(value: Option<u32>) -> u32 {
    value.unwrap_or(1).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message_wins() {
        let mut m = Match::from_function(0, FunctionMatch::at("a.rs"));
        m.html_message = Some("<b>bad</b>".into());
        assert_eq!(m.text(), Some("<b>bad</b>"));
        m.message = Some("bad".into());
        assert_eq!(m.text(), Some("bad"));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let m = Match::from_function(0, FunctionMatch::at("src/a.rs"));
        assert_eq!(m.resolve(Path::new("/p")), Some(PathBuf::from("/p/src/a.rs")));

        let m = Match::from_function(0, FunctionMatch::at("/abs/a.rs"));
        assert_eq!(m.resolve(Path::new("/p")), Some(PathBuf::from("/abs/a.rs")));

        let m = Match::from_function(0, FunctionMatch::default());
        assert_eq!(m.resolve(Path::new("/p")), None);
    }

    #[test]
    fn test_position_is_zero_based() {
        let m = Match::from_function(0, FunctionMatch::at("a").line(3).col(8));
        assert_eq!(m.position(), (2, 7));

        let m = Match::from_function(0, FunctionMatch::at("a").line(0));
        assert_eq!(m.position(), (0, 0));
    }

    #[test]
    fn test_function_match_defaults_to_error() {
        let m = Match::from_function(1, FunctionMatch::at("a"));
        assert!(m.is_error());
        let m = Match::from_function(1, FunctionMatch::at("a").severity(Severity::Warning));
        assert!(!m.is_error());
    }
}
