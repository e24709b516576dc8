/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Shared plumbing behind the `spamd` and `spamc` binaries: config
//! loading, the `Runtime` context (§9 DESIGN NOTES), the local
//! classify-and-rewrite pipeline, and the prefork daemon entry point.

pub mod classify;
pub mod config_loader;
pub mod daemon_entry;
pub mod error;
pub mod learn;
pub mod lint;
pub mod logging;
pub mod runtime;

pub use error::{CliError, Result};
pub use runtime::Runtime;
