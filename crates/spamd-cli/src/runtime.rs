/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The process-wide `Runtime` context (§9 DESIGN NOTES / §G): bundles the
//! compiled configuration, an opened Bayes store handle, and the
//! debug/version flags that the original tracked as global mutable state.
//! Constructed once at startup and shared (`Arc`) into every forked
//! worker, which re-derives nothing — it only re-installs its own
//! tracing subscriber (§B).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bayes::TokenStore;
use sa_config::Config;

use crate::error::Result;

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const HOME_URL: &str = "https://stalw.art/spamd";

/// Everything a classification needs that outlives a single message:
/// the compiled rule set, the (optionally absent) Bayes corpus, and the
/// process-wide debug flag. `PerMsgStatus` borrows a `Config` and owns
/// its `Message` for the classification's lifetime and is never
/// published beyond the call that created it (§9).
pub struct Runtime {
    pub config: Config,
    pub bayes_store: Option<Arc<TokenStore>>,
    pub bayes_path: Option<PathBuf>,
    pub debug: bool,
}

impl Runtime {
    pub fn new(config: Config, debug: bool) -> Result<Self> {
        let bayes_path = (!config.bayes_path().is_empty() && config.use_bayes())
            .then(|| expand_home(config.bayes_path()));

        let bayes_store = match &bayes_path {
            Some(path) if path.exists() => Some(Arc::new(TokenStore::load(path)?)),
            Some(_) => Some(Arc::new(TokenStore::new())),
            None => None,
        };

        Ok(Self { config, bayes_store, bayes_path, debug })
    }

    /// Persists the Bayes store back to disk, if one is open. Called after
    /// `learn`/`forget` in the one-shot CLI; the long-lived daemon calls
    /// this periodically instead (§4.4 journal-merge cadence).
    pub fn save_bayes(&self) -> Result<()> {
        if let (Some(store), Some(path)) = (&self.bayes_store, &self.bayes_path) {
            store.save(path, now_unix())?;
        }
        Ok(())
    }

    pub fn bayes_combiner(&self) -> bayes::Combiner {
        if self.config.bayes_use_chi2_combining() {
            bayes::Combiner::ChiSquare
        } else {
            bayes::Combiner::Naive
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_config::NullResolver;

    #[test]
    fn runtime_without_bayes_path_has_no_store() {
        let cfg = sa_config::parse("use_bayes 0\n", false, &NullResolver);
        let rt = Runtime::new(cfg, false).unwrap();
        assert!(rt.bayes_store.is_none());
    }

    #[test]
    fn runtime_with_bayes_enabled_opens_a_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bayes_toks");
        let cfg = sa_config::parse(&format!("use_bayes 1\nbayes_path {}\n", path.display()), false, &NullResolver);
        let rt = Runtime::new(cfg, false).unwrap();
        assert!(rt.bayes_store.is_some());
    }
}
