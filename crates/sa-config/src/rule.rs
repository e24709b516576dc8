/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::AHashSet;

/// The four (bayes-off/on × net-off/on) scoresets, indexed in the order
/// the data model defines them: `[bayes_off_net_off, bayes_off_net_on,
/// bayes_on_net_off, bayes_on_net_on]`.
pub const SCORESET_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreSetIndex(pub usize);

impl ScoreSetIndex {
    pub fn select(bayes_on: bool, net_on: bool) -> Self {
        ScoreSetIndex(((bayes_on as usize) << 1) | (net_on as usize))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TFlag {
    Net,
    Nice,
    Learn,
    Userconf,
}

impl TFlag {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "net" => Some(TFlag::Net),
            "nice" => Some(TFlag::Nice),
            "learn" => Some(TFlag::Learn),
            "userconf" => Some(TFlag::Userconf),
            _ => None,
        }
    }
}

/// The rule kind, carrying its pattern/expression payload. One compiled
/// variant per §4.3/§9's tagged-variant design note.
#[derive(Debug, Clone)]
pub enum RuleKind {
    HeaderRegex {
        header: String,
        pattern: String,
        negate: bool,
        if_unset: Option<String>,
    },
    HeaderExists {
        header: String,
    },
    HeaderEval {
        header: String,
        function: String,
        args: Vec<String>,
    },
    BodyRegex {
        pattern: String,
    },
    BodyEval {
        function: String,
        args: Vec<String>,
    },
    RawbodyRegex {
        pattern: String,
    },
    RawbodyEval {
        function: String,
        args: Vec<String>,
    },
    UriRegex {
        pattern: String,
    },
    FullRegex {
        pattern: String,
    },
    FullEval {
        function: String,
        args: Vec<String>,
    },
    MetaBoolean {
        expr: String,
    },
    RblEval {
        function: String,
        args: Vec<String>,
    },
    RblResultEval {
        function: String,
        args: Vec<String>,
    },
}

impl RuleKind {
    pub fn is_eval(&self) -> bool {
        matches!(
            self,
            RuleKind::HeaderEval { .. }
                | RuleKind::BodyEval { .. }
                | RuleKind::RawbodyEval { .. }
                | RuleKind::FullEval { .. }
                | RuleKind::RblEval { .. }
                | RuleKind::RblResultEval { .. }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            RuleKind::HeaderRegex { .. } => "header",
            RuleKind::HeaderExists { .. } => "header",
            RuleKind::HeaderEval { .. } => "header eval",
            RuleKind::BodyRegex { .. } => "body",
            RuleKind::BodyEval { .. } => "body eval",
            RuleKind::RawbodyRegex { .. } => "rawbody",
            RuleKind::RawbodyEval { .. } => "rawbody eval",
            RuleKind::UriRegex { .. } => "uri",
            RuleKind::FullRegex { .. } => "full",
            RuleKind::FullEval { .. } => "full eval",
            RuleKind::MetaBoolean { .. } => "meta",
            RuleKind::RblEval { .. } => "rbl eval",
            RuleKind::RblResultEval { .. } => "rbl result eval",
        }
    }
}

/// A compiled rule: name, kind, tflags, per-scoreset scores, description,
/// priority. Built by [`crate::parser::parse`] / `finish_parsing`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub kind: RuleKind,
    pub tflags: AHashSet<TFlag>,
    pub scores: [f64; SCORESET_COUNT],
    pub description: String,
    pub priority: i32,
}

impl Rule {
    pub fn is_subrule(&self) -> bool {
        self.name.starts_with("__")
    }

    pub fn default_score(name: &str) -> f64 {
        if name.starts_with("T_") {
            0.01
        } else {
            1.0
        }
    }

    /// §3 score-assignment rule, applied once per-scoreset.
    pub fn apply_score_line(&mut self, floats: &[f64]) {
        match floats.len() {
            4 => self.scores.copy_from_slice(floats),
            1 => self.scores = [floats[0]; SCORESET_COUNT],
            _ => {}
        }
        if self.tflags.contains(&TFlag::Nice) {
            for s in &mut self.scores {
                *s = -s.abs();
            }
        }
    }

    pub fn score(&self, set: ScoreSetIndex) -> f64 {
        self.scores[set.0]
    }
}

/// §3 rule-name validity: `[A-Za-z_][A-Za-z0-9_]*`, length <= 200 (warn
/// over 50).
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("rule name must not be empty".into());
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(format!("rule name {name:?} must start with a letter or underscore"));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("rule name {name:?} contains invalid characters"));
    }
    if name.len() > 200 {
        return Err(format!("rule name {name:?} exceeds 200 characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_prefixed_rules_default_to_low_score() {
        assert_eq!(Rule::default_score("T_FOO"), 0.01);
        assert_eq!(Rule::default_score("FOO"), 1.0);
    }

    #[test]
    fn nice_flag_negates_the_default_sign() {
        let mut rule = Rule {
            name: "FOO".into(),
            kind: RuleKind::HeaderExists { header: "X".into() },
            tflags: [TFlag::Nice].into_iter().collect(),
            scores: [1.0; SCORESET_COUNT],
            description: String::new(),
            priority: 0,
        };
        rule.apply_score_line(&[2.0]);
        assert_eq!(rule.scores, [-2.0; SCORESET_COUNT]);
    }

    #[test]
    fn single_float_broadcasts_to_all_scoresets() {
        let mut rule = Rule {
            name: "FOO".into(),
            kind: RuleKind::HeaderExists { header: "X".into() },
            tflags: Default::default(),
            scores: [1.0; SCORESET_COUNT],
            description: String::new(),
            priority: 0,
        };
        rule.apply_score_line(&[3.5]);
        assert_eq!(rule.scores, [3.5; SCORESET_COUNT]);
    }

    #[test]
    fn name_validation_rejects_bad_start_char() {
        assert!(validate_name("1FOO").is_err());
        assert!(validate_name("__FOO").is_ok());
        assert!(validate_name("FOO_BAR").is_ok());
    }
}
