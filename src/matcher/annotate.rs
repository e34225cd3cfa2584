//! HTML rendering of build output with clickable match anchors.

use std::fmt::Write;

use crate::matcher::matches::Match;

/// Escape text for HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape `text` and wrap every match span in an anchor carrying its id.
///
/// Spans overlapping an earlier one are left unwrapped. Matches without a
/// span (function results) are ignored.
pub fn annotate(text: &str, matches: &[Match]) -> String {
    let mut spans: Vec<_> = matches
        .iter()
        .filter_map(|m| m.span.clone().map(|span| (span, m)))
        .filter(|(span, _)| span.end <= text.len())
        .collect();
    spans.sort_by_key(|(span, m)| (span.start, m.id));

    let mut out = String::with_capacity(text.len() + spans.len() * 64);
    let mut pos = 0;

    for (span, m) in spans {
        if span.start < pos {
            continue;
        }
        out.push_str(&escape_html(&text[pos..span.start]));
        let _ = write!(
            out,
            "<a class=\"dockyard-match {}\" data-match-id=\"{}\">{}</a>",
            m.severity,
            m.id,
            escape_html(&text[span.clone()])
        );
        pos = span.end;
    }
    out.push_str(&escape_html(&text[pos..]));

    out
}
