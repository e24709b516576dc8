/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::AHashMap;
use regex::Regex;

/// One compiled glob entry: `*` -> `.*`, `?` -> `.`, other regex
/// metacharacters escaped, anchored start-to-end.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pub literal: String,
    pub regex: Regex,
}

pub fn compile_glob(literal: &str) -> GlobPattern {
    let mut pattern = String::with_capacity(literal.len() + 2);
    pattern.push('^');
    for c in literal.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c if regex_syntax::is_meta_character(c) => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern.push('$');
    GlobPattern {
        literal: literal.to_string(),
        regex: Regex::new(&format!("(?i){pattern}")).expect("glob-derived regex is always valid"),
    }
}

impl GlobPattern {
    pub fn matches(&self, addr: &str) -> bool {
        self.regex.is_match(addr)
    }
}

/// The five named address lists plus the received-constrained whitelist
/// variant, per the data model's Addrlist definition.
#[derive(Debug, Clone, Default)]
pub struct Addrlists {
    pub whitelist_from: Vec<GlobPattern>,
    pub blacklist_from: Vec<GlobPattern>,
    pub whitelist_to: Vec<GlobPattern>,
    pub more_spam_to: Vec<GlobPattern>,
    pub all_spam_to: Vec<GlobPattern>,
    /// address pattern -> required Received-chain domain substrings.
    pub whitelist_from_rcvd: AHashMap<String, (GlobPattern, Vec<String>)>,
}

impl Addrlists {
    pub fn add_whitelist_from(&mut self, pat: &str) {
        self.whitelist_from.push(compile_glob(pat));
    }

    pub fn remove_whitelist_from(&mut self, pat: &str) {
        self.whitelist_from.retain(|g| g.literal != pat);
    }

    pub fn add_blacklist_from(&mut self, pat: &str) {
        self.blacklist_from.push(compile_glob(pat));
    }

    pub fn add_whitelist_to(&mut self, pat: &str) {
        self.whitelist_to.push(compile_glob(pat));
    }

    pub fn add_more_spam_to(&mut self, pat: &str) {
        self.more_spam_to.push(compile_glob(pat));
    }

    pub fn add_all_spam_to(&mut self, pat: &str) {
        self.all_spam_to.push(compile_glob(pat));
    }

    pub fn add_whitelist_from_rcvd(&mut self, addr: &str, domain: &str) {
        self.whitelist_from_rcvd
            .entry(addr.to_string())
            .or_insert_with(|| (compile_glob(addr), Vec::new()))
            .1
            .push(domain.to_string());
    }

    pub fn is_whitelisted_from(&self, addr: &str) -> bool {
        self.whitelist_from.iter().any(|g| g.matches(addr))
    }

    pub fn is_blacklisted_from(&self, addr: &str) -> bool {
        self.blacklist_from.iter().any(|g| g.matches(addr))
    }

    /// A received-constrained whitelist hit requires both the address glob
    /// to match and at least one of its registered domain substrings to
    /// appear somewhere in the folded Received-header chain.
    pub fn is_whitelisted_from_rcvd(&self, addr: &str, received_chain: &str) -> bool {
        self.whitelist_from_rcvd.values().any(|(glob, domains)| {
            glob.matches(addr) && domains.iter().any(|d| received_chain.contains(d.as_str()))
        })
    }
}

mod regex_syntax {
    pub fn is_meta_character(c: char) -> bool {
        matches!(
            c,
            '.' | '+'
                | '('
                | ')'
                | '['
                | ']'
                | '{'
                | '}'
                | '^'
                | '$'
                | '|'
                | '\\'
                | '/'
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_matches_any_run() {
        let g = compile_glob("*@example.com");
        assert!(g.matches("user@example.com"));
        assert!(!g.matches("user@example.org"));
    }

    #[test]
    fn glob_question_mark_matches_one_char() {
        let g = compile_glob("a?c@example.com");
        assert!(g.matches("abc@example.com"));
        assert!(!g.matches("abbc@example.com"));
    }

    #[test]
    fn received_constrained_whitelist_requires_both() {
        let mut lists = Addrlists::default();
        lists.add_whitelist_from_rcvd("friend@example.com", "mail.example.com");
        assert!(lists.is_whitelisted_from_rcvd(
            "friend@example.com",
            "Received: from mail.example.com by us"
        ));
        assert!(!lists.is_whitelisted_from_rcvd("friend@example.com", "Received: from evil.net"));
    }
}
