//! Conversion of matches into per-file linter messages.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::matcher::matches::{zero_based, Match, TraceEntry};
use crate::util::diagnostic::Severity;

/// Where a lint message points: zero-based `[[row, col], [row_end, col_end]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintLocation {
    pub file: PathBuf,
    pub position: [[u32; 2]; 2],
}

/// One diagnostic handed to a linter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintMessage {
    pub severity: Severity,
    pub location: LintLocation,
    pub excerpt: String,
    pub description: Option<String>,
}

struct Span {
    line: Option<u32>,
    col: Option<u32>,
    line_end: Option<u32>,
    col_end: Option<u32>,
}

impl Span {
    fn position(&self) -> [[u32; 2]; 2] {
        let start = [zero_based(self.line), zero_based(self.col)];
        let end = [
            zero_based(self.line_end.or(self.line)),
            zero_based(self.col_end.or(self.col)),
        ];
        [start, end]
    }
}

/// Group matches and their trace entries by resolved file.
///
/// Entries without a file are dropped; trace entries without a file inherit
/// their parent's.
pub fn lint_messages(matches: &[Match], cwd: &Path) -> BTreeMap<PathBuf, Vec<LintMessage>> {
    let mut by_file: BTreeMap<PathBuf, Vec<LintMessage>> = BTreeMap::new();

    for m in matches {
        let Some(file) = m.resolve(cwd) else { continue };

        let span = Span {
            line: m.line,
            col: m.col,
            line_end: m.line_end,
            col_end: m.col_end,
        };
        push(
            &mut by_file,
            &file,
            m.severity,
            &span,
            m.text().unwrap_or_default(),
            m.description.clone(),
        );

        for entry in &m.trace {
            let entry_file = entry
                .file
                .as_deref()
                .map(|f| cwd.join(f))
                .unwrap_or_else(|| file.clone());
            push(
                &mut by_file,
                &entry_file,
                entry.severity.unwrap_or(Severity::Info),
                &trace_span(entry),
                entry.text().unwrap_or_default(),
                None,
            );
        }
    }

    by_file
}

fn trace_span(entry: &TraceEntry) -> Span {
    Span {
        line: entry.line,
        col: entry.col,
        line_end: entry.line_end,
        col_end: entry.col_end,
    }
}

fn push(
    by_file: &mut BTreeMap<PathBuf, Vec<LintMessage>>,
    file: &Path,
    severity: Severity,
    span: &Span,
    excerpt: &str,
    description: Option<String>,
) {
    by_file
        .entry(file.to_path_buf())
        .or_default()
        .push(LintMessage {
            severity,
            location: LintLocation {
                file: file.to_path_buf(),
                position: span.position(),
            },
            excerpt: excerpt.to_string(),
            description,
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::matches::FunctionMatch;

    #[test]
    fn test_groups_by_file() {
        let matches = vec![
            Match::from_function(0, FunctionMatch::at("a.rs").line(3).col(8).message("x")),
            Match::from_function(1, FunctionMatch::at("b.rs").line(1)),
            Match::from_function(2, FunctionMatch::at("a.rs").line(9)),
            Match::from_function(3, FunctionMatch::default().message("nowhere")),
        ];
        let lints = lint_messages(&matches, Path::new("/p"));

        assert_eq!(lints.len(), 2);
        let a = &lints[Path::new("/p/a.rs")];
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].location.position, [[2, 7], [2, 7]]);
        assert_eq!(a[0].excerpt, "x");
        assert_eq!(a[1].location.position, [[8, 0], [8, 0]]);
    }

    #[test]
    fn test_trace_entries_are_flattened() {
        let m = FunctionMatch::at("a.rs")
            .line(2)
            .message("mismatched types")
            .trace(TraceEntry {
                message: Some("expected due to this".into()),
                line: Some(1),
                ..Default::default()
            })
            .trace(TraceEntry {
                file: Some("b.rs".into()),
                severity: Some(Severity::Warning),
                html_message: Some("<i>defined here</i>".into()),
                line: Some(5),
                col: Some(2),
                line_end: Some(6),
                col_end: Some(1),
                ..Default::default()
            });
        let lints = lint_messages(&[Match::from_function(0, m)], Path::new("/p"));

        let a = &lints[Path::new("/p/a.rs")];
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].severity, Severity::Info);
        assert_eq!(a[1].excerpt, "expected due to this");

        let b = &lints[Path::new("/p/b.rs")];
        assert_eq!(b[0].severity, Severity::Warning);
        assert_eq!(b[0].excerpt, "<i>defined here</i>");
        assert_eq!(b[0].location.position, [[4, 1], [5, 0]]);
    }
}
