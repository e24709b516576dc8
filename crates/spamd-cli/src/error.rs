/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt;
use std::io;

/// The crate-wide error composed from each core crate's own error type
/// (§C of SPEC_FULL.md): the CLI layer is the only place that needs to
/// talk about all of them at once.
#[derive(Debug)]
pub enum CliError {
    Io(io::Error),
    Config(String),
    Message(message::MessageError),
    Bayes(bayes::BayesError),
    Daemon(daemon::DaemonError),
    /// A configuration lint pass found one or more errors (§4.2, §7.1);
    /// carries the count so the caller can pick the exit code.
    LintFailed(usize),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "i/o error: {e}"),
            CliError::Config(msg) => write!(f, "configuration error: {msg}"),
            CliError::Message(e) => write!(f, "message parse error: {e}"),
            CliError::Bayes(e) => write!(f, "bayes error: {e}"),
            CliError::Daemon(e) => write!(f, "daemon error: {e}"),
            CliError::LintFailed(n) => write!(f, "{n} configuration error{}", if *n == 1 { "" } else { "s" }),
        }
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<message::MessageError> for CliError {
    fn from(e: message::MessageError) -> Self {
        CliError::Message(e)
    }
}

impl From<bayes::BayesError> for CliError {
    fn from(e: bayes::BayesError) -> Self {
        CliError::Bayes(e)
    }
}

impl From<daemon::DaemonError> for CliError {
    fn from(e: daemon::DaemonError) -> Self {
        CliError::Daemon(e)
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
