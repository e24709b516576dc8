/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! `--lint` (§4.2 "lint mode", §7.1): parses a configuration, prints each
//! accumulated warning, and returns the total count so the caller can
//! exit nonzero.

use std::path::Path;

use sa_config::Config;

use crate::config_loader::load_site_config;
use crate::error::Result;

/// Parses and validates `rules_dir`, printing every accumulated
/// [`sa_config::ConfigError`] to stderr. Returns the compiled config and
/// the error count; the caller maps a nonzero count to a nonzero exit
/// status, matching `spamassassin --lint`'s exit-code contract.
pub fn lint(rules_dir: &Path) -> Result<(Config, usize)> {
    let cfg = load_site_config(rules_dir)?;
    for err in &cfg.errors {
        eprintln!("{err}");
    }
    for name in unbacked_meta_rules(&cfg) {
        eprintln!("warning: meta rule {name} references an unknown or cyclic sub-rule");
    }
    let count = cfg.error_count();
    Ok((cfg, count))
}

/// Meta rules whose referenced names don't exist in the rule table at
/// all (§3 invariant: "meta rules' referenced sub-rule names must exist
/// and form no cycle"). Cycle detection itself lives in
/// `sa_config::parser::finish_parsing`; this only catches dangling
/// references that slipped through.
fn unbacked_meta_rules(cfg: &Config) -> Vec<String> {
    cfg.rules
        .values()
        .filter_map(|rule| match &rule.kind {
            sa_config::RuleKind::MetaBoolean { expr } => {
                let unknown = sa_config::parser::tokenize_meta_expr(expr)
                    .into_iter()
                    .filter(|tok| tok.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_'))
                    .any(|tok| !cfg.rules.contains_key(&tok));
                unknown.then(|| rule.name.clone())
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lint_reports_zero_errors_for_clean_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("local.cf"), "header FOO Subject =~ /x/\nscore FOO 1.0\n").unwrap();
        let (_, count) = lint(dir.path()).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn lint_flags_dangling_meta_reference() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("local.cf"), "meta BAZ DOES_NOT_EXIST\n").unwrap();
        let (cfg, _) = lint(dir.path()).unwrap();
        assert!(!unbacked_meta_rules(&cfg).is_empty());
    }
}
