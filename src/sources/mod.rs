//! Target providers.
//!
//! Providers are responsible for telling which build targets exist for a
//! project path (build files, make, npm scripts, ...).

pub mod build_file;
pub mod legacy;
pub mod provider;
pub mod registry;

pub use build_file::{BuildFileFactory, BuildFileProvider};
pub use legacy::LegacyModule;
pub use provider::{DraftSet, Provider, ProviderFactory, RefreshNotifier, RefreshRequest};
pub use registry::ProviderRegistry;
