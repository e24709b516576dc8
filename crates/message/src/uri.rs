/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::sync::OnceLock;

use regex::Regex;

/// The URI forms recognised by `get_uris`: explicit `scheme://...` URIs,
/// bare `www.`/`ftp.` hostnames (scheme synthesized), and `mailto:`
/// addresses pulled out with an RFC-822-style address regex.
fn uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:[a-z][a-z0-9+.\-]*://|www\.|ftp\.)[^\s<>"'\)\]]+"#).unwrap()
    })
}

fn mailto_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b"#).unwrap()
    })
}

/// Extracts every URI referenced in a decoded body, synthesizing a scheme
/// for bare `www.`/`ftp.` hostnames and sweeping for `mailto:` addresses
/// separately, per the message-model URI contract.
pub fn extract_uris(body_lines: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for line in body_lines {
        for m in uri_regex().find_iter(line) {
            let found = m.as_str();
            let normalized = if found.contains("://") {
                found.to_string()
            } else if found.starts_with("ftp.") || found.starts_with("FTP.") {
                format!("ftp://{found}")
            } else {
                format!("http://{found}")
            };
            out.push(normalized);
        }
        for m in mailto_regex().find_iter(line) {
            out.push(format!("mailto:{}", m.as_str()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_explicit_scheme() {
        let lines = vec!["visit https://example.com/path now".to_string()];
        assert_eq!(extract_uris(&lines), vec!["https://example.com/path"]);
    }

    #[test]
    fn synthesizes_scheme_for_bare_hostnames() {
        let lines = vec!["go to www.example.com today".to_string()];
        assert_eq!(extract_uris(&lines), vec!["http://www.example.com"]);
    }

    #[test]
    fn sweeps_mailto_addresses() {
        let lines = vec!["contact sales@example.com for info".to_string()];
        assert_eq!(extract_uris(&lines), vec!["mailto:sales@example.com"]);
    }
}
