//! Adapter for free-function style providers.
//!
//! Older providers are just a name plus two functions taking the project
//! path. [`LegacyModule`] turns such a bundle into a [`ProviderFactory`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use futures::future::{self, BoxFuture, FutureExt};

use crate::sources::provider::{DraftSet, Provider, ProviderFactory};

type EligibleFn = dyn Fn(&Path) -> bool + Send + Sync;
type SettingsFn = dyn Fn(&Path) -> Result<DraftSet> + Send + Sync;

struct ModuleFns {
    nice_name: String,
    is_eligible: Box<EligibleFn>,
    settings: Box<SettingsFn>,
}

/// A provider described by plain functions.
#[derive(Clone)]
pub struct LegacyModule {
    fns: Arc<ModuleFns>,
}

impl LegacyModule {
    pub fn new<E, S>(nice_name: impl Into<String>, is_eligible: E, settings: S) -> Self
    where
        E: Fn(&Path) -> bool + Send + Sync + 'static,
        S: Fn(&Path) -> Result<DraftSet> + Send + Sync + 'static,
    {
        LegacyModule {
            fns: Arc::new(ModuleFns {
                nice_name: nice_name.into(),
                is_eligible: Box::new(is_eligible),
                settings: Box::new(settings),
            }),
        }
    }
}

impl ProviderFactory for LegacyModule {
    fn name(&self) -> &str {
        &self.fns.nice_name
    }

    fn create(&self, path: &Path) -> Arc<dyn Provider> {
        Arc::new(LegacyProvider {
            fns: Arc::clone(&self.fns),
            path: path.to_path_buf(),
        })
    }
}

/// A [`LegacyModule`] bound to one path.
pub struct LegacyProvider {
    fns: Arc<ModuleFns>,
    path: PathBuf,
}

impl Provider for LegacyProvider {
    fn nice_name(&self) -> String {
        self.fns.nice_name.clone()
    }

    fn is_eligible(&self) -> bool {
        (self.fns.is_eligible)(&self.path)
    }

    fn settings(&self) -> BoxFuture<'_, Result<DraftSet>> {
        future::ready((self.fns.settings)(&self.path)).boxed()
    }
}
