/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt;

/// Failures that can occur while parsing a raw message into a [`crate::Message`].
///
/// Per the message-model contract, malformed MIME structure never aborts a
/// parse — it degrades to treating the body as a single opaque part. The
/// only hard failure is a message with no discoverable header/body split at
/// all (an empty input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    Empty,
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::Empty => write!(f, "refusing to parse an empty message"),
        }
    }
}

impl std::error::Error for MessageError {}

pub type Result<T> = std::result::Result<T, MessageError>;
