/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum BayesError {
    Io(io::Error),
    Corrupt(String),
    Locked(String),
}

impl fmt::Display for BayesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BayesError::Io(e) => write!(f, "bayes store i/o error: {e}"),
            BayesError::Corrupt(msg) => write!(f, "bayes store corrupt: {msg}"),
            BayesError::Locked(msg) => write!(f, "bayes store locked: {msg}"),
        }
    }
}

impl std::error::Error for BayesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BayesError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BayesError {
    fn from(e: io::Error) -> Self {
        BayesError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, BayesError>;
