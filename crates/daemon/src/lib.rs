/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Prefork scheduler (C6) and spamc/spamd wire protocol (C7). [`parent`]
//! and [`child`] implement the two halves of the Apache-MPM-prefork
//! command loop described in §4.6; [`protocol`] implements the
//! line-oriented request/response framing of §4.7.

pub mod child;
pub mod error;
pub mod frame;
pub mod parent;
pub mod pool;
pub mod protocol;

pub use error::{DaemonError, Result};
pub use frame::Frame;
pub use pool::{ChildState, Pool, PoolAction};
pub use protocol::{read_request, read_response, write_request, write_response, Request, Response, Verb};
