/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

/// Append-accumulated report templates (§4.5). Substitution is literal,
/// single-pass, no recursion: `_HITS_`, `_REQD_`, `_SUMMARY_`, `_VER_`,
/// `_HOME_`.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    pub report: String,
    pub unsafe_report: String,
    pub terse_report: String,
    pub spamtrap: String,
}

pub struct Substitutions<'a> {
    pub hits: f64,
    pub required: f64,
    pub summary: &'a str,
    pub version: &'a str,
    pub home: &'a str,
}

impl Templates {
    pub fn append_report(&mut self, line: &str) {
        append_line(&mut self.report, line);
    }
    pub fn append_unsafe_report(&mut self, line: &str) {
        append_line(&mut self.unsafe_report, line);
    }
    pub fn append_terse_report(&mut self, line: &str) {
        append_line(&mut self.terse_report, line);
    }
    pub fn append_spamtrap(&mut self, line: &str) {
        append_line(&mut self.spamtrap, line);
    }

    pub fn clear(&mut self) {
        *self = Templates::default();
    }

    pub fn render_report(&self, subs: &Substitutions) -> String {
        substitute(&self.report, subs)
    }
}

fn append_line(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

pub fn substitute(template: &str, subs: &Substitutions) -> String {
    template
        .replace("_HITS_", &format!("{:.1}", subs.hits))
        .replace("_REQD_", &format!("{:.1}", subs.required))
        .replace("_SUMMARY_", subs.summary)
        .replace("_VER_", subs.version)
        .replace("_HOME_", subs.home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_is_literal_not_recursive() {
        let mut t = Templates::default();
        t.append_report("Score: _HITS_/_REQD_ (_SUMMARY_)");
        let out = t.render_report(&Substitutions {
            hits: 9.5,
            required: 5.0,
            summary: "FOO, BAR",
            version: "1.0",
            home: "https://example.org",
        });
        assert_eq!(out, "Score: 9.5/5.0 (FOO, BAR)");
    }

    #[test]
    fn append_joins_with_newline() {
        let mut t = Templates::default();
        t.append_report("line one");
        t.append_report("line two");
        assert_eq!(t.report, "line one\nline two");
    }
}
