//! Presenter sink and the build events it receives.
//!
//! The engine never renders anything itself. Everything a user sees goes
//! through a [`Presenter`]; [`BuildEvent`] is the serializable form of those
//! calls, used for machine-readable output and for recording in tests.
//!
//! # Event Types
//!
//! - `output`: A chunk of process output
//! - `build-started` / `build-finished`: Process lifecycle
//! - `build-abort-initiated` / `build-aborted`: Cancellation lifecycle
//! - `notice`: A titled notification
//! - `annotated-output`: Escaped output with addressable match anchors
//! - `match-selected`: Navigation reached a match

use std::sync::Arc;

use serde::Serialize;

use crate::util::diagnostic::{Notice, NoticeLevel, Severity};

/// Navigates to the match with the given id.
pub type GotoCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Receives everything the build engine wants to show.
pub trait Presenter: Send + Sync {
    /// Raw process output, in arrival order per stream.
    fn append(&self, text: &str);

    fn build_started(&self);

    fn build_finished(&self, success: bool);

    fn build_abort_initiated(&self);

    fn build_aborted(&self);

    /// A titled notification.
    fn notify(&self, notice: &Notice);

    /// Replace the output with an annotated copy. `goto` navigates to a
    /// match anchor's id.
    fn replace_annotated_output(&self, html: &str, goto: GotoCallback);

    /// Navigation reached the match `id`.
    fn scroll_to_match(&self, id: usize, severity: Severity);

    /// Back to the idle display.
    fn reset(&self);

    /// Hide the output panel.
    fn hide(&self) {}

    /// Toggle the output panel.
    fn toggle(&self) {}
}

/// A presenter call in serializable form.
///
/// Each event is serialized as a single JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    #[serde(rename = "output")]
    Output { text: String },

    #[serde(rename = "build-started")]
    BuildStarted,

    #[serde(rename = "build-finished")]
    BuildFinished { success: bool },

    #[serde(rename = "build-abort-initiated")]
    BuildAbortInitiated,

    #[serde(rename = "build-aborted")]
    BuildAborted,

    #[serde(rename = "notice")]
    Notice {
        level: String,
        title: String,
        #[serde(skip_serializing_if = "String::is_empty")]
        detail: String,
    },

    #[serde(rename = "annotated-output")]
    AnnotatedOutput { html: String },

    #[serde(rename = "match-selected")]
    MatchSelected { id: usize, severity: String },

    #[serde(rename = "reset")]
    Reset,

    #[serde(rename = "hide")]
    Hide,

    #[serde(rename = "toggle")]
    Toggle,
}

impl BuildEvent {
    /// Create a notice event.
    pub fn notice(notice: &Notice) -> Self {
        BuildEvent::Notice {
            level: notice.level.to_string(),
            title: notice.title.clone(),
            detail: notice.detail.clone(),
        }
    }

    /// Whether this is an error notice.
    pub fn is_error_notice(&self) -> bool {
        matches!(self, BuildEvent::Notice { level, .. } if level == &NoticeLevel::Error.to_string())
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_serialization() {
        let json = BuildEvent::BuildFinished { success: true }.to_json();
        assert!(json.contains("\"reason\":\"build-finished\""));
        assert!(json.contains("\"success\":true"));
    }

    #[test]
    fn test_notice_serialization_skips_empty_detail() {
        let event = BuildEvent::notice(&Notice::info("Build targets parsed."));
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"notice\""));
        assert!(json.contains("\"level\":\"info\""));
        assert!(!json.contains("detail"));
        assert!(!event.is_error_notice());
    }

    #[test]
    fn test_error_notice_detection() {
        let event = BuildEvent::notice(&Notice::error("Unable to execute.").with_detail("x"));
        assert!(event.is_error_notice());
    }

    #[test]
    fn test_match_selected_serialization() {
        let json = BuildEvent::MatchSelected {
            id: 4,
            severity: Severity::Warning.to_string(),
        }
        .to_json();
        assert_eq!(json, r#"{"reason":"match-selected","id":4,"severity":"warning"}"#);
    }
}
