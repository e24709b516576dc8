/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Configuration store (C2): parses the SpamAssassin-style directive
//! grammar into a compiled rule set, scores, addrlists, and templates.

pub mod addrlist;
pub mod directive;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod pattern;
pub mod rule;
pub mod templates;

pub use error::ConfigError;
pub use parser::{parse, Config, IncludeResolver, NullResolver};
pub use rule::{Rule, RuleKind, ScoreSetIndex, TFlag};
