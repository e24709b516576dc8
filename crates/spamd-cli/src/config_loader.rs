/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Filesystem-backed configuration loading (§D of SPEC_FULL.md): turns a
//! site rule directory (and an optional per-user preferences file) into
//! a compiled [`sa_config::Config`].

use std::fs;
use std::path::{Path, PathBuf};

use sa_config::parser::IncludeResolver;

use crate::error::{CliError, Result};

/// Resolves `include PATH` directives against a base directory, the way
/// `spamassassin`'s own loader resolves `.cf` includes relative to its
/// rule directory.
pub struct FsResolver {
    base_dir: PathBuf,
}

impl FsResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }
}

impl IncludeResolver for FsResolver {
    fn resolve(&self, path: &str) -> Option<String> {
        let candidate = Path::new(path);
        let full = if candidate.is_absolute() { candidate.to_path_buf() } else { self.base_dir.join(candidate) };
        fs::read_to_string(full).ok()
    }
}

/// Loads every `*.cf` file directly inside `rules_dir`, in sorted order,
/// and parses them as one logical configuration (§4.2 `parse`). Sorting
/// by filename matches `spamassassin`'s own deterministic load order
/// (numeric prefixes like `10_...`, `72_...` control precedence).
pub fn load_site_config(rules_dir: &Path) -> Result<sa_config::Config> {
    let mut files: Vec<PathBuf> = fs::read_dir(rules_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "cf"))
        .collect();
    files.sort();

    let mut combined = String::new();
    for file in &files {
        let text = fs::read_to_string(file)
            .map_err(|e| CliError::Config(format!("reading {}: {e}", file.display())))?;
        combined.push_str(&text);
        combined.push('\n');
    }

    let resolver = FsResolver::new(rules_dir);
    let cfg = sa_config::parse(&combined, false, &resolver);
    Ok(cfg)
}

/// Loads a single configuration file (e.g. a standalone `local.cf` passed
/// with `--config`), honoring `include` relative to its own directory.
pub fn load_config_file(path: &Path) -> Result<sa_config::Config> {
    let text = fs::read_to_string(path).map_err(|e| CliError::Config(format!("reading {}: {e}", path.display())))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let resolver = FsResolver::new(base_dir);
    Ok(sa_config::parse(&text, false, &resolver))
}

/// Loads a per-user preferences file in scores-only mode (§4.2): no
/// privileged or admin directives are honored, only scores, whitelists,
/// and (if the site config permits it) new rule definitions.
pub fn load_user_prefs(path: &Path, allow_user_rules: bool) -> Result<sa_config::Config> {
    let text = fs::read_to_string(path).map_err(|e| CliError::Config(format!("reading {}: {e}", path.display())))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let resolver = FsResolver::new(base_dir);
    let mut cfg = sa_config::parse(&text, true, &resolver);
    cfg.allow_user_rules = allow_user_rules;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_cf_files_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("20_rules.cf"), "score BAR 2.0\n").unwrap();
        std::fs::write(dir.path().join("10_rules.cf"), "score FOO 1.0\n").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "ignored\n").unwrap();

        let cfg = load_site_config(dir.path()).unwrap();
        assert!(cfg.raw_setting("__never__").is_none());
        assert_eq!(cfg.error_count(), 0);
    }

    #[test]
    fn include_resolves_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("extra.cf"), "score EXTRA 3.0\n").unwrap();
        let main = dir.path().join("main.cf");
        let mut f = std::fs::File::create(&main).unwrap();
        writeln!(f, "include extra.cf").unwrap();

        let cfg = load_config_file(&main).unwrap();
        assert_eq!(cfg.error_count(), 0);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = load_config_file(Path::new("/no/such/file.cf"));
        assert!(result.is_err());
    }
}
