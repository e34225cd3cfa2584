//! Provider trait - common interface for all sources of build targets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::core::TargetDraft;

/// A source of build targets for one project path.
///
/// Providers are created per path by a [`ProviderFactory`]; the path they
/// serve is fixed at construction.
pub trait Provider: Send + Sync {
    /// Get the provider name for display.
    fn nice_name(&self) -> String;

    /// Check if this provider applies to its path.
    fn is_eligible(&self) -> bool;

    /// Produce the raw targets.
    ///
    /// Failures only affect this provider; wrap a
    /// [`ConfigSyntaxError`](crate::util::diagnostic::ConfigSyntaxError) in the
    /// error when a build file is malformed.
    fn settings(&self) -> BoxFuture<'_, Result<DraftSet>>;

    /// Start reporting "my targets changed" through `notifier`.
    fn watch(&self, _notifier: RefreshNotifier) {}

    /// Stop reporting changes.
    fn unwatch(&self) {}
}

/// Creates a [`Provider`] for a project path.
pub trait ProviderFactory: Send + Sync {
    /// Name of the provider kind, used for registry bookkeeping.
    fn name(&self) -> &str;

    /// Create a provider for `path`.
    fn create(&self, path: &Path) -> Arc<dyn Provider>;
}

/// What a provider returns: one draft, or a list where gaps are allowed.
#[derive(Debug, Clone)]
pub enum DraftSet {
    Single(TargetDraft),
    List(Vec<Option<TargetDraft>>),
}

impl DraftSet {
    /// An empty set.
    pub fn empty() -> Self {
        DraftSet::List(Vec::new())
    }

    /// Flatten into drafts, dropping gaps.
    pub fn into_drafts(self) -> Vec<TargetDraft> {
        match self {
            DraftSet::Single(draft) => vec![draft],
            DraftSet::List(drafts) => drafts.into_iter().flatten().collect(),
        }
    }
}

impl From<TargetDraft> for DraftSet {
    fn from(draft: TargetDraft) -> Self {
        DraftSet::Single(draft)
    }
}

impl From<Vec<TargetDraft>> for DraftSet {
    fn from(drafts: Vec<TargetDraft>) -> Self {
        DraftSet::List(drafts.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<TargetDraft>>> for DraftSet {
    fn from(drafts: Vec<Option<TargetDraft>>) -> Self {
        DraftSet::List(drafts)
    }
}

/// A provider asking for its targets to be rediscovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub path: PathBuf,
    pub provider: String,
}

/// Handed to providers so they can ask for a refresh of their path.
#[derive(Debug, Clone)]
pub struct RefreshNotifier {
    path: PathBuf,
    provider: String,
    tx: mpsc::UnboundedSender<RefreshRequest>,
}

impl RefreshNotifier {
    pub fn new(
        path: impl Into<PathBuf>,
        provider: impl Into<String>,
        tx: mpsc::UnboundedSender<RefreshRequest>,
    ) -> Self {
        RefreshNotifier {
            path: path.into(),
            provider: provider.into(),
            tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Request a refresh. Returns false once the manager is gone.
    pub fn request(&self) -> bool {
        self.tx
            .send(RefreshRequest {
                path: self.path.clone(),
                provider: self.provider.clone(),
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_set_drops_gaps() {
        let set = DraftSet::from(vec![
            Some(TargetDraft::new("a")),
            None,
            Some(TargetDraft::new("b")),
        ]);
        let execs: Vec<_> = set.into_drafts().into_iter().map(|d| d.exec).collect();
        assert_eq!(execs, vec!["a", "b"]);
    }

    #[test]
    fn test_single_draft() {
        assert_eq!(DraftSet::from(TargetDraft::new("a")).into_drafts().len(), 1);
        assert!(DraftSet::empty().into_drafts().is_empty());
    }

    #[test]
    fn test_notifier_sends_request() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = RefreshNotifier::new("/proj", "Make", tx);
        assert!(notifier.request());
        assert_eq!(
            rx.try_recv().unwrap(),
            RefreshRequest {
                path: PathBuf::from("/proj"),
                provider: "Make".to_string()
            }
        );
        drop(rx);
        assert!(!notifier.request());
    }
}
