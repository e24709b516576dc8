/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::AHashMap;
use message::Message;
use sa_config::rule::{RuleKind, ScoreSetIndex};
use sa_config::Config;

use crate::eval;
use crate::meta::eval_meta;
use crate::status::PerMsgStatus;

/// Runtime classification flags threading through a single `check` call:
/// whether Bayes is available (selects the active scoreset) and whether
/// network tests are enabled (`tflags net` gating plus scoreset
/// selection).
#[derive(Debug, Clone, Copy)]
pub struct ClassifyFlags {
    pub bayes_on: bool,
    pub net_on: bool,
    /// §4.3 early-exit: after any positive-scoring rule, stop running
    /// remaining positive rules once `score >= threshold`. Negative rules
    /// still run to completion.
    pub stop_at_threshold: bool,
}

struct Ordered<'a> {
    name: &'a str,
    kind: &'a RuleKind,
    score: f64,
    priority: i32,
    description: &'a str,
}

/// A precomputed Bayes classification, folded in as a synthetic hit
/// during the eval-rule phase (§4.3 step 7) so meta rules evaluated in
/// step 9 see it like any other hit. Computed by the caller since the
/// engine has no dependency on the Bayes store or combiner.
pub struct BayesHit {
    pub name: String,
    pub score: f64,
    pub description: String,
}

/// Runs every applicable test against `msg` and returns the resulting
/// [`PerMsgStatus`]. `msg` is scored as given — callers that need to strip
/// previously-added result headers before re-scoring (§9 open question a)
/// must do so before calling `check`.
pub fn check(cfg: &Config, msg: &Message, flags: ClassifyFlags, bayes: Option<BayesHit>) -> PerMsgStatus {
    let mut status = PerMsgStatus::new();
    let set = ScoreSetIndex::select(flags.bayes_on, flags.net_on);
    let threshold = cfg.required_hits();

    let mut by_priority: Vec<Ordered> = cfg
        .rules
        .values()
        .map(|r| Ordered {
            name: &r.name,
            kind: &r.kind,
            score: r.score(set),
            priority: r.priority,
            description: &r.description,
        })
        .collect();
    by_priority.sort_by_key(|o| o.priority);

    // Group rules of a given execution phase by ascending priority, and
    // within each priority group run negative-score rules first, then
    // positive-score rules sorted by descending score, per §4.3 step 3.
    let order_within_group = |rules: &mut [&Ordered]| {
        rules.sort_by(|a, b| {
            let a_neg = a.score < 0.0;
            let b_neg = b.score < 0.0;
            match (a_neg, b_neg) {
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                (true, true) => a.score.partial_cmp(&b.score).unwrap(),
                (false, false) => b.score.partial_cmp(&a.score).unwrap(),
            }
        });
    };

    let run_phase = |status: &mut PerMsgStatus, pred: &dyn Fn(&RuleKind) -> bool| {
        let mut priorities: Vec<i32> = by_priority
            .iter()
            .filter(|o| pred(o.kind))
            .map(|o| o.priority)
            .collect();
        priorities.sort_unstable();
        priorities.dedup();
        for prio in priorities {
            let mut group: Vec<&Ordered> = by_priority
                .iter()
                .filter(|o| o.priority == prio && pred(o.kind))
                .collect();
            order_within_group(&mut group);
            for o in group {
                if flags.stop_at_threshold && o.score > 0.0 && status.score >= threshold {
                    continue;
                }
                run_one(msg, o.name, o.kind, o.score, o.description, status);
            }
        }
    };

    run_phase(&mut status, &|k| matches!(k, RuleKind::HeaderRegex { .. } | RuleKind::HeaderExists { .. }));
    run_phase(&mut status, &|k| matches!(k, RuleKind::BodyRegex { .. }));
    run_phase(&mut status, &|k| matches!(k, RuleKind::RawbodyRegex { .. } | RuleKind::UriRegex { .. }));
    run_phase(&mut status, &|k| matches!(k, RuleKind::FullRegex { .. }));
    run_phase(&mut status, &|k| {
        matches!(
            k,
            RuleKind::HeaderEval { .. }
                | RuleKind::BodyEval { .. }
                | RuleKind::RawbodyEval { .. }
                | RuleKind::FullEval { .. }
        )
    });

    // Folded in here, as the last of step 7's eval-rule hits, so a meta
    // rule (step 9) referencing a `BAYES_NN` sub-result sees it like any
    // other hit — not bolted on after `check` returns.
    if let Some(hit) = bayes {
        status.record_hit(&hit.name, hit.score, &hit.description, "BAYES");
    }

    // rbl-eval / rbl-result-eval: network lookups are an external
    // collaborator (§1, §6); absent a live resolver every such rule is a
    // timeout, i.e. "not hit", per the §7.5 failure contract.
    run_phase(&mut status, &|k| matches!(k, RuleKind::RblEval { .. } | RuleKind::RblResultEval { .. }));

    run_meta_phase(cfg, &by_priority, &mut status);

    status
}

fn run_one(msg: &Message, name: &str, kind: &RuleKind, score: f64, description: &str, status: &mut PerMsgStatus) {
    let area = kind.kind_name();
    let hit = match kind {
        RuleKind::HeaderRegex { header, pattern, negate, if_unset } => {
            match regex::Regex::new(pattern) {
                Ok(re) => {
                    let value = msg.get_header(header, if_unset.as_deref().unwrap_or(""));
                    let matched = re.is_match(&value);
                    Some(matched != *negate)
                }
                Err(_) => {
                    status.record_error();
                    None
                }
            }
        }
        RuleKind::HeaderExists { header } => Some(!msg.get_header(header, "").is_empty()),
        RuleKind::BodyRegex { pattern } => match regex::Regex::new(pattern) {
            Ok(re) => Some(msg.get_body_lines().iter().any(|l| re.is_match(l))),
            Err(_) => {
                status.record_error();
                None
            }
        },
        RuleKind::RawbodyRegex { pattern } => match regex::Regex::new(pattern) {
            Ok(re) => Some(msg.get_raw_body_lines().iter().any(|l| re.is_match(l))),
            Err(_) => {
                status.record_error();
                None
            }
        },
        RuleKind::UriRegex { pattern } => match regex::Regex::new(pattern) {
            Ok(re) => Some(msg.get_uris().iter().any(|u| re.is_match(u))),
            Err(_) => {
                status.record_error();
                None
            }
        },
        RuleKind::FullRegex { pattern } => match regex::Regex::new(pattern) {
            Ok(re) => Some(re.is_match(&String::from_utf8_lossy(&msg.get_full_text()))),
            Err(_) => {
                status.record_error();
                None
            }
        },
        RuleKind::HeaderEval { function, args, .. }
        | RuleKind::BodyEval { function, args }
        | RuleKind::RawbodyEval { function, args }
        | RuleKind::FullEval { function, args } => match eval::call(function, msg, status, args) {
            Ok(v) => Some(v),
            Err(_) => {
                status.record_error();
                None
            }
        },
        RuleKind::RblEval { .. } | RuleKind::RblResultEval { .. } => Some(false),
        RuleKind::MetaBoolean { .. } => None,
    };

    if hit == Some(true) {
        status.record_hit(name, score, description, area);
    }
}

fn run_meta_phase(cfg: &Config, by_priority: &[Ordered], status: &mut PerMsgStatus) {
    let mut metas: Vec<&Ordered> = by_priority
        .iter()
        .filter(|o| matches!(o.kind, RuleKind::MetaBoolean { .. }))
        .collect();
    metas.sort_by_key(|o| o.priority);

    let mut hit_values: AHashMap<String, f64> = cfg
        .rules
        .keys()
        .map(|name| (name.clone(), if status.has_hit(name) { 1.0 } else { 0.0 }))
        .collect();
    // A synthetic hit (e.g. the Bayes bucket folded in above) has no
    // entry in `cfg.rules` unless the site configured a `score` line for
    // it; seed those in too so a meta rule referencing it still works.
    for name in status.hit_names() {
        hit_values.entry(name.clone()).or_insert(1.0);
    }

    for o in metas {
        let RuleKind::MetaBoolean { expr } = o.kind else {
            continue;
        };
        let value = eval_meta(expr, &hit_values);
        let hit = value != 0.0;
        if hit {
            status.record_hit(o.name, o.score, o.description, "meta");
        }
        hit_values.insert(o.name.to_string(), if hit { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_config::{parse, NullResolver};

    fn flags() -> ClassifyFlags {
        ClassifyFlags {
            bayes_on: false,
            net_on: false,
            stop_at_threshold: false,
        }
    }

    #[test]
    fn scenario_empty_config_single_rule() {
        let cfg = parse(
            "header FOO Subject =~ /\\bwin\\b/i\nscore FOO 2.5\nrequired_hits 5.0",
            false,
            &NullResolver,
        );
        let msg = Message::parse(b"Subject: You can WIN today\n\nbody\n").unwrap();
        let status = check(&cfg, &msg, flags(), None);
        assert_eq!(status.score, 2.5);
        assert_eq!(status.hits, vec!["FOO".to_string()]);
        assert!(status.score < cfg.required_hits());
    }

    #[test]
    fn scenario_meta_rule() {
        let cfg = parse(
            "header FOO Subject =~ /\\bwin\\b/i\nscore FOO 2.5\n\
             header BAR From =~ /@example\\.com/\nscore BAR 3.0\n\
             meta BAZ FOO && BAR\nscore BAZ 4.0\nrequired_hits 5.0",
            false,
            &NullResolver,
        );
        let msg = Message::parse(
            b"Subject: You can WIN today\r\nFrom: a@example.com\r\n\r\nbody\r\n",
        )
        .unwrap();
        let status = check(&cfg, &msg, flags(), None);
        let mut hits = status.hits.clone();
        hits.sort();
        assert_eq!(hits, vec!["BAR".to_string(), "BAZ".to_string(), "FOO".to_string()]);
        assert_eq!(status.score, 9.5);
        assert!(status.score >= cfg.required_hits());
    }

    #[test]
    fn scenario_subrule_suppression() {
        let cfg = parse(
            "header __FOO Subject =~ /win/i\nmeta BAZ __FOO\nscore BAZ 6.0\nrequired_hits 5.0",
            false,
            &NullResolver,
        );
        let msg = Message::parse(b"Subject: You can win today\n\nbody\n").unwrap();
        let status = check(&cfg, &msg, flags(), None);
        assert!(!status.hits.contains(&"__FOO".to_string()));
        assert_eq!(status.hits, vec!["BAZ".to_string()]);
        assert_eq!(status.score, 6.0);
    }

    #[test]
    fn meta_rule_sees_bayes_hit_folded_in_before_meta_phase() {
        let cfg = parse(
            "meta BAZ BAYES_99\nscore BAZ 4.0\nrequired_hits 5.0",
            false,
            &NullResolver,
        );
        let msg = Message::parse(b"Subject: hi\n\nbody\n").unwrap();
        let bayes = BayesHit {
            name: "BAYES_99".to_string(),
            score: 3.5,
            description: "BODY: Bayes spam probability is 0.9950".to_string(),
        };
        let status = check(&cfg, &msg, flags(), Some(bayes));
        let mut hits = status.hits.clone();
        hits.sort();
        assert_eq!(hits, vec!["BAYES_99".to_string(), "BAZ".to_string()]);
        assert_eq!(status.score, 7.5);
    }

    #[test]
    fn hit_log_line_carries_the_configured_description() {
        let cfg = parse(
            "header FOO Subject =~ /win/i\nscore FOO 2.0\ndescribe FOO Classic lottery scam wording\n",
            false,
            &NullResolver,
        );
        let msg = Message::parse(b"Subject: you win\n\nbody\n").unwrap();
        let status = check(&cfg, &msg, flags(), None);
        assert!(status.log.iter().any(|l| l.contains("Classic lottery scam wording")));
    }

    #[test]
    fn negative_scoring_rule_runs_before_positive_in_same_priority_group() {
        let cfg = parse(
            "header GOOD From =~ /@trusted\\.com/\nscore GOOD -5.0\n\
             header BAD Subject =~ /buy/i\nscore BAD 3.0\nrequired_hits 5.0",
            false,
            &NullResolver,
        );
        let msg =
            Message::parse(b"Subject: buy now\r\nFrom: a@trusted.com\r\n\r\nbody\r\n").unwrap();
        let status = check(&cfg, &msg, flags(), None);
        assert_eq!(status.score, -2.0);
    }

    #[test]
    fn rule_error_does_not_abort_classification() {
        let mut cfg = parse("score FOO 1.0\n", false, &NullResolver);
        cfg.rules.insert(
            "FOO".to_string(),
            sa_config::Rule {
                name: "FOO".to_string(),
                kind: RuleKind::HeaderRegex {
                    header: "Subject".to_string(),
                    pattern: "(".to_string(),
                    negate: false,
                    if_unset: None,
                },
                tflags: Default::default(),
                scores: [1.0; 4],
                description: String::new(),
                priority: 0,
            },
        );
        let msg = Message::parse(b"Subject: hi\n\nbody\n").unwrap();
        let status = check(&cfg, &msg, flags(), None);
        assert_eq!(status.rule_errors, 1);
        assert!(status.hits.is_empty());
    }
}
