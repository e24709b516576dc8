/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt;

/// Per §7.1: a configuration parse failure is a *counted* warning, not a
/// hard error — the offending line is skipped in normal mode, and lint
/// mode reports the total so the caller can choose a nonzero exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub source_file: Option<String>,
    pub line_no: usize,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_file {
            Some(file) => write!(f, "{file}:{}: {}", self.line_no, self.message),
            None => write!(f, "line {}: {}", self.line_no, self.message),
        }
    }
}

impl std::error::Error for ConfigError {}
