/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use message::Message;

use crate::combiner::{self, Combiner, MIN_CORPUS_SIZE};
use crate::error::Result;
use crate::store::TokenStore;
use crate::tokenizer::tokenize_message;

/// A neutral 0.5 is returned verbatim, without running any token math,
/// whenever the corpus hasn't accumulated enough examples yet.
fn below_min_corpus(store: &TokenStore) -> bool {
    store.nspam() < MIN_CORPUS_SIZE || store.nham() < MIN_CORPUS_SIZE
}

/// Scans `msg` against `store`, returning a probability in `[0, 1]` that
/// it is spam. Below the minimum corpus size this is always neutral
/// 0.5 (§4.4 "Scan"). `expiry_scan_count`/`expiry_min_db_size` are the
/// site's `bayes_expiry_scan_count`/`bayes_expiry_min_db_size`
/// directives; opportunistic expiry (§4.4) runs at the end of the scan
/// once enough scans have elapsed since the last one.
pub fn scan(
    msg: &Message,
    store: &TokenStore,
    combiner: Combiner,
    now: u64,
    expiry_scan_count: u64,
    expiry_min_db_size: usize,
) -> f64 {
    if below_min_corpus(store) {
        store.maybe_expire(now, expiry_scan_count, expiry_min_db_size);
        return 0.5;
    }
    let tokens = tokenize_message(msg);
    let mut counted = Vec::with_capacity(tokens.len());
    for tok in &tokens {
        if let Some(counts) = store.get(tok, now) {
            counted.push((tok.clone(), counts));
        }
    }
    let result = if counted.is_empty() {
        0.5
    } else {
        let probs = combiner::select_interesting(&counted, store.nspam(), store.nham(), combiner);
        combiner::combine(&probs, combiner)
    };
    store.maybe_expire(now, expiry_scan_count, expiry_min_db_size);
    result
}

/// Learns `msg` as spam or ham. `msg_id` should be the message's
/// `Message-ID` header (or another stable identifier) so repeat learns
/// of the same message are idempotent.
pub fn learn(msg: &Message, msg_id: &str, is_spam: bool, store: &TokenStore, now: u64) -> Result<bool> {
    let tokens = tokenize_message(msg);
    store.learn(msg_id, is_spam, &tokens, now)
}

/// Reverses a previous [`learn`] call for the same message id and class.
pub fn forget(msg: &Message, msg_id: &str, is_spam: bool, store: &TokenStore, now: u64) -> Result<bool> {
    let tokens = tokenize_message(msg);
    store.forget(msg_id, is_spam, &tokens, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_MIN_TOKENS;

    fn spam_message() -> Message {
        Message::parse(b"Subject: WIN cash now\n\nClick here to win free viagra cash today\n").unwrap()
    }

    fn ham_message() -> Message {
        Message::parse(b"Subject: meeting notes\n\nLet's meet tomorrow to discuss the agenda\n").unwrap()
    }

    #[test]
    fn below_min_corpus_returns_neutral() {
        let store = TokenStore::new();
        let score = scan(&spam_message(), &store, Combiner::Naive, 1000, 0, DEFAULT_MIN_TOKENS);
        assert_eq!(score, 0.5);
    }

    #[test]
    fn trained_store_scores_spam_above_neutral() {
        let store = TokenStore::new();
        for i in 0..250 {
            learn(&spam_message(), &format!("spam-{i}"), true, &store, 1000).unwrap();
            learn(&ham_message(), &format!("ham-{i}"), false, &store, 1000).unwrap();
        }
        let score = scan(&spam_message(), &store, Combiner::Naive, 1000, 0, DEFAULT_MIN_TOKENS);
        assert!(score > 0.5, "expected spam-leaning score, got {score}");
    }

    #[test]
    fn trained_store_scores_ham_below_neutral() {
        let store = TokenStore::new();
        for i in 0..250 {
            learn(&spam_message(), &format!("spam-{i}"), true, &store, 1000).unwrap();
            learn(&ham_message(), &format!("ham-{i}"), false, &store, 1000).unwrap();
        }
        let score = scan(&ham_message(), &store, Combiner::ChiSquare, 1000, 0, DEFAULT_MIN_TOKENS);
        assert!(score < 0.5, "expected ham-leaning score, got {score}");
    }

    #[test]
    fn learn_then_forget_is_idempotent_pair() {
        let store = TokenStore::new();
        learn(&spam_message(), "msg-x", true, &store, 1000).unwrap();
        assert_eq!(store.nspam(), 1);
        forget(&spam_message(), "msg-x", true, &store, 1000).unwrap();
        assert_eq!(store.nspam(), 0);
    }
}
