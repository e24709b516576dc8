/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The local, non-daemon classify-and-rewrite pipeline: §2's control flow
//! ("C3 is run against C1, consulting C4 if enabled... C5 formats the
//! response") collapsed into one call, shared by `spamd`'s request
//! handler and `spamassassin -t`-style stdin filtering.

use std::time::{SystemTime, UNIX_EPOCH};

use message::Message;
use rules::{BayesHit, ClassifyFlags, PerMsgStatus};
use sa_config::rule::ScoreSetIndex;
use sa_config::Config;

use crate::runtime::Runtime;

pub struct ClassifyResult {
    pub status: PerMsgStatus,
    pub rewritten: Message,
    pub verdict: report::Verdict,
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Classifies `msg` against `runtime`'s compiled configuration and (if
/// open) Bayes store, then rewrites it per §4.5. The Bayes scan runs
/// first so its bucket can be handed to `rules::check` and folded in
/// during step 7 (eval rules), ahead of the step-9 meta phase — meta
/// rules referencing a `BAYES_NN` sub-result see it like any other hit.
pub fn classify(msg: &Message, runtime: &Runtime) -> ClassifyResult {
    let bayes_on = runtime.bayes_store.is_some() && runtime.config.use_bayes();
    let net_on = !runtime.config.skip_rbl_checks();
    let flags = ClassifyFlags { bayes_on, net_on, stop_at_threshold: false };

    let bayes_hit = runtime.bayes_store.as_ref().map(|store| {
        let probability = bayes::scan(
            msg,
            store,
            runtime.bayes_combiner(),
            now_unix(),
            runtime.config.bayes_expiry_scan_count(),
            runtime.config.bayes_expiry_min_db_size(),
        );
        bucket_hit(probability, &runtime.config, ScoreSetIndex::select(bayes_on, net_on))
    });

    let status = rules::check(&runtime.config, msg, flags, bayes_hit);

    let verdict = report::verdict(&status, &runtime.config);
    let rewritten = report::rewrite(msg, &status, &runtime.config, crate::runtime::VERSION, crate::runtime::HOME_URL);

    ClassifyResult { status, rewritten, verdict }
}

/// Maps a Bayes posterior probability onto one of the `BAYES_NN` buckets
/// `spamassassin` itself uses, so existing `score BAYES_NN ...` lines in
/// a site configuration are honored verbatim; a bucket with no
/// configured score falls back to a small built-in default table.
fn bucket_hit(probability: f64, config: &Config, set: ScoreSetIndex) -> BayesHit {
    const BUCKETS: &[(f64, &str, f64)] = &[
        (0.01, "BAYES_00", -1.9),
        (0.05, "BAYES_05", -1.0),
        (0.20, "BAYES_20", -0.5),
        (0.40, "BAYES_40", -0.1),
        (0.60, "BAYES_50", 0.1),
        (0.80, "BAYES_60", 0.5),
        (0.95, "BAYES_80", 1.5),
        (0.99, "BAYES_95", 2.5),
        (1.0, "BAYES_99", 3.5),
    ];
    let (name, default_score) = BUCKETS
        .iter()
        .find(|(ceiling, _, _)| probability < *ceiling)
        .map(|(_, n, s)| (*n, *s))
        .unwrap_or(("BAYES_100", 4.5));

    let score = config.rules.get(name).map(|r| r.score(set)).unwrap_or(default_score);
    BayesHit {
        name: name.to_string(),
        score,
        description: format!("BODY: Bayes spam probability is {probability:.4}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_config::NullResolver;

    fn runtime_with(cfg_text: &str) -> Runtime {
        let cfg = sa_config::parse(cfg_text, false, &NullResolver);
        Runtime::new(cfg, false).unwrap()
    }

    #[test]
    fn classify_without_bayes_runs_plain_rules() {
        let runtime = runtime_with("header FOO Subject =~ /win/i\nscore FOO 6.0\nrequired_hits 5.0\n");
        let msg = Message::parse(b"Subject: you win\n\nbody\n").unwrap();
        let result = classify(&msg, &runtime);
        assert!(result.verdict.is_spam);
        assert_eq!(result.status.hits, vec!["FOO".to_string()]);
    }

    #[test]
    fn bayes_hit_uses_configured_score_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toks");
        let runtime = runtime_with(&format!(
            "use_bayes 1\nbayes_path {}\nscore BAYES_50 2.0\nrequired_hits 5.0\n",
            path.display()
        ));
        let msg = Message::parse(b"Subject: hi\n\nbody\n").unwrap();
        let result = classify(&msg, &runtime);
        // Below the minimum corpus size, scan() is neutral (0.5), landing
        // in the BAYES_50 bucket with the configured score.
        assert!(result.status.hits.contains(&"BAYES_50".to_string()));
        assert_eq!(result.status.score, 2.0);
    }

    #[test]
    fn meta_rule_can_reference_bayes_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toks");
        let runtime = runtime_with(&format!(
            "use_bayes 1\nbayes_path {}\nscore BAYES_50 1.0\n\
             meta SPAMMY_AND_BAYES BAYES_50\nscore SPAMMY_AND_BAYES 3.0\nrequired_hits 5.0\n",
            path.display()
        ));
        let msg = Message::parse(b"Subject: hi\n\nbody\n").unwrap();
        let result = classify(&msg, &runtime);
        assert!(result.status.hits.contains(&"SPAMMY_AND_BAYES".to_string()));
        assert_eq!(result.status.score, 4.0);
    }
}
