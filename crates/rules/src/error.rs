/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt;

/// Per §7.2: a single rule failing to execute is trapped, logged, and
/// counted — it never aborts the classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    BadPattern { rule: String, detail: String },
    UnknownEvalFunction { rule: String, function: String },
    EvalFailed { rule: String, detail: String },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::BadPattern { rule, detail } => {
                write!(f, "rule {rule}: bad pattern: {detail}")
            }
            RuleError::UnknownEvalFunction { rule, function } => {
                write!(f, "rule {rule}: unknown eval function {function}")
            }
            RuleError::EvalFailed { rule, detail } => {
                write!(f, "rule {rule}: eval failed: {detail}")
            }
        }
    }
}

impl std::error::Error for RuleError {}
