/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! `sa-learn`-equivalent `learn`/`forget` subcommands (§6 CLI surface):
//! operate directly on the local Bayes store, bypassing the daemon.

use message::Message;

use crate::error::{CliError, Result};
use crate::runtime::Runtime;

fn message_id(msg: &Message) -> String {
    let id = msg.get_header("Message-ID", "");
    if id.is_empty() {
        // No stable identifier: fall back to a digest of the full text so
        // repeat learns of byte-identical input are still idempotent.
        format!("sha:{:x}", fnv1a(&msg.get_full_text()))
    } else {
        id
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// `learn --spam` / `learn --ham`: learns `raw` as the given class and
/// persists the store (§4.4 "Learning and forgetting").
pub fn learn(runtime: &Runtime, raw: &[u8], is_spam: bool) -> Result<bool> {
    let store = runtime.bayes_store.as_ref().ok_or_else(|| CliError::Config("bayes is not enabled".into()))?;
    let msg = Message::parse(raw)?;
    let id = message_id(&msg);
    let learned = bayes::learn(&msg, &id, is_spam, store, now())?;
    runtime.save_bayes()?;
    Ok(learned)
}

/// `forget`: reverses a previous learn, auto-detecting the class from
/// the `seen` store is out of scope here (the caller must say which
/// class to reverse, same as the `sa-learn --forget` CLI).
pub fn forget(runtime: &Runtime, raw: &[u8], is_spam: bool) -> Result<bool> {
    let store = runtime.bayes_store.as_ref().ok_or_else(|| CliError::Config("bayes is not enabled".into()))?;
    let msg = Message::parse(raw)?;
    let id = message_id(&msg);
    let forgotten = bayes::forget(&msg, &id, is_spam, store, now())?;
    runtime.save_bayes()?;
    Ok(forgotten)
}

fn now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_config::NullResolver;

    fn runtime() -> Runtime {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toks");
        std::mem::forget(dir); // keep the tempdir alive for the store's lifetime
        let cfg = sa_config::parse(&format!("use_bayes 1\nbayes_path {}\n", path.display()), false, &NullResolver);
        Runtime::new(cfg, false).unwrap()
    }

    #[test]
    fn learn_then_forget_restores_counts() {
        let rt = runtime();
        let raw = b"Message-ID: <abc@x>\nSubject: win cash\n\nclick here now\n";
        assert!(learn(&rt, raw, true).unwrap());
        assert_eq!(rt.bayes_store.as_ref().unwrap().nspam(), 1);
        assert!(forget(&rt, raw, true).unwrap());
        assert_eq!(rt.bayes_store.as_ref().unwrap().nspam(), 0);
    }

    #[test]
    fn learning_without_bayes_enabled_is_an_error() {
        let cfg = sa_config::parse("use_bayes 0\n", false, &NullResolver);
        let rt = Runtime::new(cfg, false).unwrap();
        assert!(learn(&rt, b"Subject: x\n\nbody\n", true).is_err());
    }
}
