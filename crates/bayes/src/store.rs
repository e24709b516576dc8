/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock};

use crate::error::{BayesError, Result};

/// Per-token spam/ham counters and last-touched timestamp, the unit of
/// persistence for the token store (§4.4 "Token Store").
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounts {
    pub spam: u32,
    pub ham: u32,
    pub atime: u64,
}

/// Default floor below which opportunistic expiry refuses to shrink the
/// store, matching the data model's documented default.
pub const DEFAULT_MIN_TOKENS: usize = 100_000;

/// Rolling window (§4.4 "Opportunistic expiry"): a token not touched in
/// this many seconds is a candidate for expiry.
pub const EXPIRY_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

/// In-memory token store with an append-only journal and a `seen` set for
/// message-id based learn/forget dedupe. Reads may run concurrently;
/// mutation of the token table itself (learn/forget/expire) is
/// serialized behind a single `RwLock` writer guard. A scan's atime
/// touches don't take that guard at all: `get` only holds a read lock on
/// the token table and appends to a separate, independently-locked side
/// journal, so concurrent scans never serialize against each other —
/// the write lock is only taken later, in `sync_journal`, to fold the
/// accumulated touches in (§5 "scans are lock-free").
#[derive(Debug, Default)]
pub struct TokenStore {
    inner: RwLock<Inner>,
    atime_journal: Mutex<Vec<(String, u64)>>,
}

#[derive(Debug, Default)]
struct Inner {
    tokens: AHashMap<String, TokenCounts>,
    nspam: u64,
    nham: u64,
    last_expire: u64,
    last_journal_sync: u64,
    scans_since_expire: u64,
    seen: AHashSet<String>,
    journal: Vec<JournalEntry>,
}

#[derive(Debug, Clone)]
enum JournalEntry {
    Learn { msg_id: String, is_spam: bool, tokens: Vec<String> },
    Forget { msg_id: String, is_spam: bool, tokens: Vec<String> },
}

impl JournalEntry {
    /// One line of the append-only op journal: `L|F s|h msg_id tok,tok,...`.
    fn to_line(&self) -> String {
        let (tag, is_spam, msg_id, tokens) = match self {
            JournalEntry::Learn { msg_id, is_spam, tokens } => ("L", *is_spam, msg_id, tokens),
            JournalEntry::Forget { msg_id, is_spam, tokens } => ("F", *is_spam, msg_id, tokens),
        };
        format!("{tag}\t{}\t{msg_id}\t{}", if is_spam { "s" } else { "h" }, tokens.join(","))
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nspam(&self) -> u64 {
        self.inner.read().nspam
    }

    pub fn nham(&self) -> u64 {
        self.inner.read().nham
    }

    pub fn token_count(&self) -> usize {
        self.inner.read().tokens.len()
    }

    /// Looks up a token's counts. Read-only against the token table: the
    /// access-time bump is recorded in the side atime journal instead of
    /// being written in place, so concurrent scans only ever take a read
    /// lock here (§5, §4.4). A later `sync_journal` call folds the
    /// recorded touches into the real counts.
    pub fn get(&self, token: &str, now: u64) -> Option<TokenCounts> {
        let counts = self.inner.read().tokens.get(token).copied()?;
        self.atime_journal.lock().push((token.to_string(), now));
        Some(counts)
    }

    /// Records a message as spam or ham. Idempotent per `msg_id`: a
    /// repeat `learn` with the same id and the same class is a no-op and
    /// returns `Ok(false)`; a repeat with the opposite class is rejected
    /// (the caller must `forget` first).
    pub fn learn(&self, msg_id: &str, is_spam: bool, tokens: &AHashSet<String>, now: u64) -> Result<bool> {
        let mut inner = self.inner.write();
        let key = format!("{}:{}", if is_spam { "s" } else { "h" }, msg_id);
        if inner.seen.contains(&key) {
            return Ok(false);
        }
        inner.seen.insert(key);
        for tok in tokens {
            let entry = inner.tokens.entry(tok.clone()).or_default();
            if is_spam {
                entry.spam = entry.spam.saturating_add(1);
            } else {
                entry.ham = entry.ham.saturating_add(1);
            }
            entry.atime = now;
        }
        if is_spam {
            inner.nspam += 1;
        } else {
            inner.nham += 1;
        }
        inner.journal.push(JournalEntry::Learn {
            msg_id: msg_id.to_string(),
            is_spam,
            tokens: tokens.iter().cloned().collect(),
        });
        Ok(true)
    }

    /// Reverses a previous `learn` for the same message id and class.
    /// A no-op (`Ok(false)`) if that message was never learned as that
    /// class.
    pub fn forget(&self, msg_id: &str, is_spam: bool, tokens: &AHashSet<String>, now: u64) -> Result<bool> {
        let mut inner = self.inner.write();
        let key = format!("{}:{}", if is_spam { "s" } else { "h" }, msg_id);
        if !inner.seen.remove(&key) {
            return Ok(false);
        }
        for tok in tokens {
            if let Some(entry) = inner.tokens.get_mut(tok) {
                if is_spam {
                    entry.spam = entry.spam.saturating_sub(1);
                } else {
                    entry.ham = entry.ham.saturating_sub(1);
                }
                entry.atime = now;
                if entry.spam == 0 && entry.ham == 0 {
                    inner.tokens.remove(tok);
                }
            }
        }
        if is_spam {
            inner.nspam = inner.nspam.saturating_sub(1);
        } else {
            inner.nham = inner.nham.saturating_sub(1);
        }
        inner.journal.push(JournalEntry::Forget {
            msg_id: msg_id.to_string(),
            is_spam,
            tokens: tokens.iter().cloned().collect(),
        });
        Ok(true)
    }

    /// Opportunistically drops tokens not touched since `older_than`,
    /// never shrinking the store below `min_tokens`. Returns the number
    /// of tokens dropped.
    pub fn expire(&self, older_than: u64, min_tokens: usize, now: u64) -> usize {
        let mut inner = self.inner.write();
        if inner.tokens.len() <= min_tokens {
            return 0;
        }
        let mut candidates: Vec<(String, u64)> = inner
            .tokens
            .iter()
            .filter(|(_, c)| c.atime < older_than)
            .map(|(k, c)| (k.clone(), c.atime))
            .collect();
        candidates.sort_by_key(|(_, atime)| *atime);
        let budget = inner.tokens.len().saturating_sub(min_tokens);
        let drop_count = candidates.len().min(budget);
        for (tok, _) in candidates.into_iter().take(drop_count) {
            inner.tokens.remove(&tok);
        }
        inner.last_expire = now;
        drop_count
    }

    pub fn last_expire(&self) -> u64 {
        self.inner.read().last_expire
    }

    pub fn last_journal_sync(&self) -> u64 {
        self.inner.read().last_journal_sync
    }

    /// Opportunistic expiry (§4.4): called once per `scan`. Counts scans
    /// since the last expiry and, once `scan_count` have elapsed, drops
    /// tokens outside the rolling [`EXPIRY_WINDOW_SECS`] window (never
    /// below `min_tokens`) and resets the counter. `scan_count == 0`
    /// disables opportunistic expiry, matching `bayes_expiry_scan_count`'s
    /// own default.
    pub fn maybe_expire(&self, now: u64, scan_count: u64, min_tokens: usize) -> usize {
        if scan_count == 0 {
            return 0;
        }
        {
            let mut inner = self.inner.write();
            inner.scans_since_expire += 1;
            if inner.scans_since_expire < scan_count {
                return 0;
            }
            inner.scans_since_expire = 0;
        }
        self.expire(now.saturating_sub(EXPIRY_WINDOW_SECS), min_tokens, now)
    }

    /// Folds the pending atime touches recorded by concurrent scans into
    /// the token table, and appends any pending learn/forget journal
    /// entries to `journal_path` so they survive a crash before the next
    /// full `save`. Both sides of the journal are cleared once merged;
    /// this is the one place that takes the write lock for longer than a
    /// single mutation, matching §5's "periodically merged under the
    /// write-lock" contract.
    pub fn sync_journal(&self, journal_path: &Path, now: u64) -> Result<()> {
        let pending_atimes: Vec<(String, u64)> = std::mem::take(&mut *self.atime_journal.lock());
        let mut inner = self.inner.write();
        for (tok, atime) in pending_atimes {
            if let Some(entry) = inner.tokens.get_mut(&tok) {
                entry.atime = entry.atime.max(atime);
            }
        }
        if !inner.journal.is_empty() {
            let mut file = OpenOptions::new().create(true).append(true).open(journal_path)?;
            for entry in inner.journal.drain(..) {
                writeln!(file, "{}", entry.to_line())?;
            }
            file.flush()?;
        }
        inner.last_journal_sync = now;
        Ok(())
    }

    /// Serializes the store to `path` as a simple line-oriented format:
    /// a header line of `nspam nham last_expire`, then one `token spam
    /// ham atime` line per entry. Writes to a sibling temp file and
    /// renames into place so readers never see a half-written store.
    /// Merges the pending journal first, then truncates the op journal
    /// file — the snapshot just written already reflects everything it
    /// held.
    pub fn save(&self, path: &Path, now: u64) -> Result<()> {
        let journal_path = journal_path_for(path);
        self.sync_journal(&journal_path, now)?;

        let inner = self.inner.read();
        let tmp_path = tmp_path_for(path);
        {
            let file = File::create(&tmp_path)?;
            let mut w = BufWriter::new(file);
            writeln!(w, "{} {} {}", inner.nspam, inner.nham, inner.last_expire)?;
            for (tok, counts) in inner.tokens.iter() {
                writeln!(w, "{}\t{}\t{}\t{}", tok, counts.spam, counts.ham, counts.atime)?;
            }
            w.flush()?;
        }
        fs::rename(&tmp_path, path)?;
        let _ = fs::remove_file(&journal_path);
        Ok(())
    }

    /// Loads a store previously written by [`save`](Self::save). Returns
    /// an empty store if `path` does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let mut parts = header.split_whitespace();
        let nspam: u64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| BayesError::Corrupt("missing nspam header field".into()))?;
        let nham: u64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| BayesError::Corrupt("missing nham header field".into()))?;
        let last_expire: u64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);

        let mut tokens = AHashMap::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let mut cols = line.split('\t');
            let tok = cols
                .next()
                .ok_or_else(|| BayesError::Corrupt("missing token column".into()))?
                .to_string();
            let spam: u32 = cols.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let ham: u32 = cols.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let atime: u64 = cols.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            tokens.insert(tok, TokenCounts { spam, ham, atime });
        }

        Ok(Self {
            inner: RwLock::new(Inner {
                tokens,
                nspam,
                nham,
                last_expire,
                last_journal_sync: 0,
                scans_since_expire: 0,
                seen: AHashSet::new(),
                journal: Vec::new(),
            }),
            atime_journal: Mutex::new(Vec::new()),
        })
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn journal_path_for(path: &Path) -> PathBuf {
    let mut journal = path.as_os_str().to_os_string();
    journal.push(".journal");
    PathBuf::from(journal)
}

/// Advisory lock held for the duration of a learn/forget/expire batch so
/// concurrent writers (e.g. a `spamd` worker and a `sa-learn`-style CLI
/// invocation) don't race on the same store file.
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    pub fn acquire(store_path: &Path) -> Result<Self> {
        let lock_path = tmp_path_for(store_path).with_extension("lock");
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| BayesError::Locked(format!("{}: {e}", lock_path.display())))?;
        Ok(Self { path: lock_path })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(words: &[&str]) -> AHashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn learn_spam_increments_counts_and_nspam() {
        let store = TokenStore::new();
        store.learn("msg1", true, &toks(&["viagra", "win"]), 1000).unwrap();
        assert_eq!(store.nspam(), 1);
        assert_eq!(store.get("viagra", 1000).unwrap().spam, 1);
    }

    #[test]
    fn learn_is_idempotent_per_message_id_and_class() {
        let store = TokenStore::new();
        store.learn("msg1", true, &toks(&["viagra"]), 1000).unwrap();
        let second = store.learn("msg1", true, &toks(&["viagra"]), 1000).unwrap();
        assert!(!second);
        assert_eq!(store.get("viagra", 1000).unwrap().spam, 1);
    }

    #[test]
    fn forget_reverses_learn() {
        let store = TokenStore::new();
        store.learn("msg1", true, &toks(&["viagra"]), 1000).unwrap();
        let forgotten = store.forget("msg1", true, &toks(&["viagra"]), 1000).unwrap();
        assert!(forgotten);
        assert!(store.get("viagra", 1000).is_none());
        assert_eq!(store.nspam(), 0);
    }

    #[test]
    fn forget_unknown_message_is_noop() {
        let store = TokenStore::new();
        let forgotten = store.forget("never-learned", true, &toks(&["foo"]), 1000).unwrap();
        assert!(!forgotten);
    }

    #[test]
    fn expire_respects_minimum_floor() {
        let store = TokenStore::new();
        for i in 0..5 {
            store.learn(&format!("m{i}"), true, &toks(&[&format!("tok{i}")]), 100).unwrap();
        }
        let dropped = store.expire(10_000, 3, 20_000);
        assert_eq!(store.token_count(), 3);
        assert_eq!(dropped, 2);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bayes.store");
        let store = TokenStore::new();
        store.learn("msg1", true, &toks(&["viagra", "free"]), 500).unwrap();
        store.learn("msg2", false, &toks(&["meeting"]), 500).unwrap();
        store.save(&path, 500).unwrap();

        let loaded = TokenStore::load(&path).unwrap();
        assert_eq!(loaded.nspam(), 1);
        assert_eq!(loaded.nham(), 1);
        assert_eq!(loaded.get("viagra", 500).unwrap().spam, 1);
        assert_eq!(loaded.get("meeting", 500).unwrap().ham, 1);
    }

    #[test]
    fn load_missing_file_returns_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.store");
        let store = TokenStore::load(&path).unwrap();
        assert_eq!(store.nspam(), 0);
        assert_eq!(store.token_count(), 0);
    }

    #[test]
    fn get_does_not_mutate_atime_until_synced() {
        let store = TokenStore::new();
        store.learn("msg1", true, &toks(&["viagra"]), 100).unwrap();
        // get() at a later `now` must not be visible in the returned
        // counts (it's only queued), and must not require a write lock
        // to run concurrently with other reads.
        let seen = store.get("viagra", 9_000).unwrap();
        assert_eq!(seen.atime, 100);
    }

    #[test]
    fn sync_journal_folds_queued_atime_bumps() {
        let dir = tempfile::tempdir().unwrap();
        let journal_path = dir.path().join("bayes.store.journal");
        let store = TokenStore::new();
        store.learn("msg1", true, &toks(&["viagra"]), 100).unwrap();
        store.get("viagra", 9_000).unwrap();
        store.sync_journal(&journal_path, 9_000).unwrap();
        assert_eq!(store.get("viagra", 9_000).unwrap().atime, 9_000);
        assert_eq!(store.last_journal_sync(), 9_000);
    }

    #[test]
    fn sync_journal_persists_and_clears_learn_forget_entries() {
        let dir = tempfile::tempdir().unwrap();
        let journal_path = dir.path().join("bayes.store.journal");
        let store = TokenStore::new();
        store.learn("msg1", true, &toks(&["viagra"]), 100).unwrap();
        store.forget("msg1", true, &toks(&["viagra"]), 200).unwrap();
        store.sync_journal(&journal_path, 200).unwrap();

        let contents = fs::read_to_string(&journal_path).unwrap();
        assert!(contents.contains("L\ts\tmsg1\tviagra"));
        assert!(contents.contains("F\ts\tmsg1\tviagra"));

        // A second sync with nothing new pending appends nothing further.
        store.sync_journal(&journal_path, 300).unwrap();
        let contents_after = fs::read_to_string(&journal_path).unwrap();
        assert_eq!(contents, contents_after);
    }

    #[test]
    fn save_truncates_the_op_journal_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bayes.store");
        let journal_path = dir.path().join("bayes.store.journal");
        let store = TokenStore::new();
        store.learn("msg1", true, &toks(&["viagra"]), 100).unwrap();
        store.sync_journal(&journal_path, 100).unwrap();
        assert!(journal_path.exists());

        store.save(&path, 200).unwrap();
        assert!(!journal_path.exists());
    }

    #[test]
    fn maybe_expire_is_a_noop_until_scan_count_elapses() {
        let store = TokenStore::new();
        for i in 0..5 {
            store.learn(&format!("m{i}"), true, &toks(&[&format!("tok{i}")]), 100).unwrap();
        }
        assert_eq!(store.maybe_expire(20_000, 3, 3), 0);
        assert_eq!(store.maybe_expire(20_000, 3, 3), 0);
        let dropped = store.maybe_expire(20_000, 3, 3);
        assert_eq!(dropped, 2);
        assert_eq!(store.token_count(), 3);
    }

    #[test]
    fn maybe_expire_disabled_when_scan_count_is_zero() {
        let store = TokenStore::new();
        store.learn("m0", true, &toks(&["tok0"]), 100).unwrap();
        assert_eq!(store.maybe_expire(20_000, 0, 0), 0);
    }
}
