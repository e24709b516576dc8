/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::{AHashMap, AHashSet};

/// Lifetime = one classification (§3 data model). Holds everything the
/// engine accumulates while scoring a single message; discarded at the end
/// of `check`.
#[derive(Debug, Default)]
pub struct PerMsgStatus {
    pub score: f64,
    /// Matched rule names, insertion ordered; sub-rules never appear here.
    pub hits: Vec<String>,
    /// Free-text `score, area, description` lines, one per hit.
    pub log: Vec<String>,
    already_hit: AHashSet<String>,
    pub rule_errors: usize,
    /// Populated only when pattern-hit recording is requested (debugging);
    /// maps rule name to the literal substrings that matched.
    pub pattern_hits: AHashMap<String, Vec<String>>,
}

impl PerMsgStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_hit(&self, rule: &str) -> bool {
        self.already_hit.contains(rule)
    }

    /// Every name that has been hit so far, including sub-rules and any
    /// synthetic hit (e.g. a Bayes bucket) not present in the loaded
    /// config's rule table. Used to seed the meta-rule evaluator's
    /// symbol table with names `cfg.rules` alone wouldn't cover.
    pub fn hit_names(&self) -> impl Iterator<Item = &String> {
        self.already_hit.iter()
    }

    /// Records a rule hit: sub-rules (`__`-prefixed) never score or appear
    /// in the hit list, but must still be marked so meta rules can see
    /// them. Non-sub-rules are idempotent per name (hitting it twice adds
    /// the score only once, matching the "already hit" set in the data
    /// model).
    pub fn record_hit(&mut self, name: &str, score: f64, description: &str, area: &str) {
        let is_sub = name.starts_with("__");
        if self.already_hit.contains(name) {
            return;
        }
        self.already_hit.insert(name.to_string());
        if is_sub {
            return;
        }
        self.score += score;
        self.hits.push(name.to_string());
        self.log.push(format!("{score:.1} {area} {description}"));
    }

    pub fn record_error(&mut self) {
        self.rule_errors += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subrule_hits_are_tracked_but_not_scored() {
        let mut status = PerMsgStatus::new();
        status.record_hit("__FOO", 1.0, "d", "BODY");
        assert!(status.has_hit("__FOO"));
        assert_eq!(status.score, 0.0);
        assert!(status.hits.is_empty());
    }

    #[test]
    fn duplicate_hit_is_idempotent() {
        let mut status = PerMsgStatus::new();
        status.record_hit("FOO", 2.0, "d", "BODY");
        status.record_hit("FOO", 2.0, "d", "BODY");
        assert_eq!(status.score, 2.0);
        assert_eq!(status.hits, vec!["FOO".to_string()]);
    }
}
