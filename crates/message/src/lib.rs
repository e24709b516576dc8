/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The message model (C1): parses a raw message once and exposes every view
//! the rule engine needs — header accessors, decoded body, raw body, URI
//! list, and full text — without re-parsing per access.

pub mod body;
pub mod error;
pub mod header;
pub mod message;
pub mod mime;
pub mod uri;

pub use error::{MessageError, Result};
pub use header::HeaderField;
pub use message::Message;
