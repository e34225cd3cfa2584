//! Regex-based match extraction.
//!
//! Patterns use the named groups `file`, `line`, `col`, `line_end`,
//! `col_end` and `message`; every group is optional. Patterns compile in
//! multi-line mode so `^` and `$` anchor at output lines.

use regex::{Captures, Regex, RegexBuilder};

use crate::matcher::matches::Match;
use crate::util::diagnostic::{Error, Severity};

/// A compiled error or warning pattern.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub severity: Severity,
    regex: Regex,
}

impl CompiledPattern {
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Compile a pattern list.
///
/// Empty patterns are skipped. Invalid ones are reported and skipped so the
/// rest of the list still applies.
pub fn compile(patterns: &[String], severity: Severity) -> (Vec<CompiledPattern>, Vec<Error>) {
    let mut compiled = Vec::with_capacity(patterns.len());
    let mut errors = Vec::new();

    for pattern in patterns.iter().filter(|p| !p.is_empty()) {
        match RegexBuilder::new(pattern).multi_line(true).build() {
            Ok(regex) => compiled.push(CompiledPattern { severity, regex }),
            Err(e) => {
                tracing::warn!("invalid {} pattern `{}`: {}", severity, pattern, e);
                errors.push(Error::Pattern {
                    pattern: pattern.clone(),
                    detail: e.to_string(),
                });
            }
        }
    }

    (compiled, errors)
}

/// Collect every occurrence of every pattern.
///
/// Ids are assigned in pattern order, then by offset. Empty occurrences are
/// ignored.
pub fn scan(patterns: &[CompiledPattern], text: &str) -> Vec<Match> {
    let mut matches = Vec::new();

    for pattern in patterns {
        for caps in pattern.regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.range().is_empty() {
                continue;
            }

            matches.push(Match {
                id: matches.len(),
                file: group(&caps, "file"),
                abs_file: None,
                line: number(&caps, "line"),
                col: number(&caps, "col"),
                line_end: number(&caps, "line_end"),
                col_end: number(&caps, "col_end"),
                severity: pattern.severity,
                message: group(&caps, "message"),
                html_message: None,
                description: None,
                trace: Vec::new(),
                span: Some(whole.range()),
            });
        }
    }

    matches
}

fn group(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number(caps: &Captures<'_>, name: &str) -> Option<u32> {
    caps.name(name).and_then(|m| m.as_str().trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_compile_skips_empty_and_invalid() {
        let (compiled, errors) = compile(&patterns(&["", "(?<file>x", "ok"]), Severity::Error);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].as_str(), "ok");
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], Error::Pattern { pattern, .. } if pattern == "(?<file>x"));
    }

    #[test]
    fn test_scan_named_groups() {
        let (compiled, _) = compile(
            &patterns(&["(?<file>[\\w.]+):(?<line>\\d+):(?<col>\\d+): (?<message>.+)$"]),
            Severity::Error,
        );
        let found = scan(&compiled, "a.rs:3:8: expected `;`\nok\nb.rs:10:1: unknown\n");

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].file.as_deref(), Some("a.rs"));
        assert_eq!(found[0].line, Some(3));
        assert_eq!(found[0].col, Some(8));
        assert_eq!(found[0].message.as_deref(), Some("expected `;`"));
        assert_eq!(found[1].file.as_deref(), Some("b.rs"));
        assert_eq!(found[1].id, 1);
    }

    #[test]
    fn test_ids_follow_pattern_then_offset() {
        let (mut compiled, _) = compile(&patterns(&["E(?<line>\\d)"]), Severity::Error);
        let (warnings, _) = compile(&patterns(&["W(?<line>\\d)"]), Severity::Warning);
        compiled.extend(warnings);

        let found = scan(&compiled, "W1 E2 W3 E4");
        let summary: Vec<_> = found.iter().map(|m| (m.id, m.line, m.severity)).collect();
        assert_eq!(
            summary,
            vec![
                (0, Some(2), Severity::Error),
                (1, Some(4), Severity::Error),
                (2, Some(1), Severity::Warning),
                (3, Some(3), Severity::Warning),
            ]
        );
    }

    #[test]
    fn test_unparseable_numbers_are_dropped() {
        let (compiled, _) = compile(&patterns(&["(?<file>\\w+):(?<line>\\w+)"]), Severity::Error);
        let found = scan(&compiled, "main:abc");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, None);
    }

    #[test]
    fn test_empty_occurrences_are_ignored() {
        let (compiled, _) = compile(&patterns(&["x*"]), Severity::Error);
        let found = scan(&compiled, "abxxc");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].span, Some(2..4));
    }
}
