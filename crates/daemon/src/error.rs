/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum DaemonError {
    Io(io::Error),
    Protocol(String),
    ChildDead(u32),
    Timeout,
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Io(e) => write!(f, "daemon i/o error: {e}"),
            DaemonError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            DaemonError::ChildDead(pid) => write!(f, "child {pid} is dead"),
            DaemonError::Timeout => write!(f, "read deadline exceeded"),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DaemonError {
    fn from(e: io::Error) -> Self {
        DaemonError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
