/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Process-bootstrap logging (§B of SPEC_FULL.md): a single layered
//! `tracing_subscriber::fmt` subscriber driven by `RUST_LOG`, installed
//! once in the parent and re-installed in every forked child (a
//! subscriber's writer is not fork-safe to share).

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber. Safe to call once per process; a
/// forked child must call this again after `fork()` rather than try to
/// reuse the parent's installed subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
