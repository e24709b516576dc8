/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Adaptive Bayesian classifier (C4): tokenizer, persistent token store,
//! and the naive / chi-squared combiners used to turn a learned corpus
//! into a spam probability for a new message.

pub mod classifier;
pub mod combiner;
pub mod error;
pub mod store;
pub mod tokenizer;

pub use classifier::{forget, learn, scan};
pub use combiner::Combiner;
pub use error::BayesError;
pub use store::{StoreLock, TokenCounts, TokenStore, DEFAULT_MIN_TOKENS};
