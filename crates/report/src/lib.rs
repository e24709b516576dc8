/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Reporter / rewriter (C5): annotates a classified message with its
//! verdict, optionally tags the subject and wraps the original message
//! in a report-safe container, and provides the inverse `remove_markup`.

pub mod container;
pub mod error;
pub mod fold;
pub mod rewrite;

pub use error::ReportError;
pub use rewrite::{remove_markup, rewrite, verdict, Verdict};
