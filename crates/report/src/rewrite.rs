/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use message::Message;
use regex::Regex;
use rules::PerMsgStatus;
use sa_config::parser::Config;
use sa_config::templates::Substitutions;

use crate::container::{self, WrapMode};
use crate::fold;

const SENTINEL_START: &str = "SPAM: ----- Spam Report -----";
const SENTINEL_END: &str = "SPAM: ----- End Spam Report -----";

/// Verdict, score and threshold for a classified message — the trio the
/// reporter needs to render `X-Spam-Status` and decide whether to apply
/// any of the spam-only rewrites.
pub struct Verdict {
    pub is_spam: bool,
    pub hits: f64,
    pub required: f64,
}

pub fn verdict(status: &PerMsgStatus, config: &Config) -> Verdict {
    let required = config.required_hits();
    Verdict { is_spam: status.score >= required, hits: status.score, required }
}

fn subject_tag_pattern(template: &str) -> Regex {
    let escaped = regex::escape(template).replace("_HITS_", "[0-9.]+").replace("_REQD_", "[0-9.]+");
    Regex::new(&format!("^{escaped}")).unwrap_or_else(|_| Regex::new("^$").unwrap())
}

/// Rewrites `msg` per §4.5: always adds `X-Spam-Status`/`X-Spam-Level`/
/// `X-Spam-Checker-Version`; for a spam verdict additionally sets
/// `X-Spam-Flag`, optionally tags the subject, and applies the
/// configured report-safe mode.
pub fn rewrite(msg: &Message, status: &PerMsgStatus, config: &Config, version: &str, home: &str) -> Message {
    let mut out = msg.clone();
    let v = verdict(status, config);
    let tests = status.hits.join(",");

    let status_value = format!(
        "{}, hits={:.1} required={:.1} tests={}",
        if v.is_spam { "Yes" } else { "No" },
        v.hits,
        v.required,
        tests
    );
    let status_value = if config.fold_headers() { fold::fold(&status_value, 74) } else { status_value };
    out.replace_header("X-Spam-Status", &status_value);

    let stars = "*".repeat(v.hits.max(0.0).floor().min(200.0) as usize);
    out.replace_header("X-Spam-Level", &stars);
    out.put_header("X-Spam-Checker-Version", version);

    if !v.is_spam {
        return out;
    }

    out.replace_header("X-Spam-Flag", "YES");

    if config.rewrite_subject() {
        let subs = Substitutions { hits: v.hits, required: v.required, summary: "", version, home };
        let tag = sa_config::templates::substitute(config.subject_tag(), &subs);
        let subject = out.get_header("Subject", "");
        if !subject_tag_pattern(config.subject_tag()).is_match(&subject) {
            let tagged = format!("{tag} {subject}");
            out.replace_header("Subject", tagged.trim());
        }
    }

    let summary = status.log.join("\n");
    let subs = Substitutions { hits: v.hits, required: v.required, summary: &summary, version, home };
    let report_text = config.templates.render_report(&subs);

    match config.report_safe() {
        1 | 2 => {
            let wrap_mode = if config.report_safe() == 1 { WrapMode::Rfc822 } else { WrapMode::PlainText };
            let prev_content_type = out.get_header("Content-Type", "text/plain");
            let prev_cte = out.get_header("Content-Transfer-Encoding", "");
            let original_bytes = out.to_bytes();
            let boundary = container::new_boundary();

            out.replace_header("X-Spam-Prev-Content-Type", &prev_content_type);
            if !prev_cte.is_empty() {
                out.replace_header("X-Spam-Prev-Content-Transfer-Encoding", &prev_cte);
            }
            out.delete_header("Content-Transfer-Encoding");
            out.replace_header("Content-Type", &format!("multipart/mixed; boundary=\"{boundary}\""));

            let body = container::build_container(&boundary, &report_text, &original_bytes, wrap_mode);
            out.set_raw_body(body);
        }
        _ => {
            if config.report_header() {
                out.replace_header("X-Spam-Report", &report_text.replace('\n', "  "));
            } else {
                let mut new_body =
                    format!("{SENTINEL_START}\n{report_text}\n{SENTINEL_END}\n\n").into_bytes();
                new_body.extend_from_slice(out.raw_body());
                out.set_raw_body(new_body);
            }
        }
    }

    out
}

fn extract_boundary(content_type: &str) -> Option<String> {
    let idx = content_type.to_ascii_lowercase().find("boundary=")?;
    let rest = &content_type[idx + "boundary=".len()..];
    let rest = rest.trim_start_matches('"');
    let end = rest.find(['"', ';']).unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

fn strip_sentinel_block(body: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(body);
    let Some(start) = text.find(SENTINEL_START) else {
        return body.to_vec();
    };
    let Some(end_marker) = text[start..].find(SENTINEL_END) else {
        return body.to_vec();
    };
    let mut end = start + end_marker + SENTINEL_END.len();
    let rest = &text[end..];
    let trimmed = rest.trim_start_matches('\n');
    end += rest.len() - trimmed.len();
    let mut out = text[..start].as_bytes().to_vec();
    out.extend_from_slice(text[end..].as_bytes());
    out
}

/// Inverse of [`rewrite`]: strips every `X-Spam-*` header, restores the
/// original `Content-Type`/`Content-Transfer-Encoding` and body (undoing
/// a report-safe wrap if one was applied), and removes the subject tag
/// prefix (§4.5).
pub fn remove_markup(msg: &Message, config: &Config) -> Message {
    let mut out = msg.clone();

    let prev_content_type = out.get_header("X-Spam-Prev-Content-Type", "");
    if !prev_content_type.is_empty() {
        let content_type = out.get_header("Content-Type", "");
        if let Some(boundary) = extract_boundary(&content_type) {
            if let Some(original) = container::extract_original(out.raw_body(), &boundary) {
                out.set_raw_body(original);
            }
        }
        out.replace_header("Content-Type", &prev_content_type);
    }
    let prev_cte = out.get_header("X-Spam-Prev-Content-Transfer-Encoding", "");
    if !prev_cte.is_empty() {
        out.replace_header("Content-Transfer-Encoding", &prev_cte);
    }

    out.delete_headers_with_prefix("X-Spam-");

    let subject = out.get_header("Subject", "");
    let pattern = subject_tag_pattern(config.subject_tag());
    if let Some(m) = pattern.find(&subject) {
        let stripped = subject[m.end()..].trim_start().to_string();
        out.replace_header("Subject", &stripped);
    }

    let body = strip_sentinel_block(out.raw_body());
    out.set_raw_body(body);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_config::parser::{parse, NullResolver};

    fn config(text: &str) -> Config {
        parse(text, false, &NullResolver)
    }

    fn msg() -> Message {
        Message::parse(b"Subject: hello\r\nContent-Type: text/plain\r\n\r\nbody text\r\n").unwrap()
    }

    fn status_with_score(score: f64, hits: &[&str]) -> PerMsgStatus {
        let mut s = PerMsgStatus::new();
        for h in hits {
            s.record_hit(h, 1.0, "desc", "BODY");
        }
        s.score = score;
        s
    }

    #[test]
    fn ham_message_gets_status_header_but_no_flag() {
        let cfg = config("required_hits 5.0\n");
        let status = status_with_score(1.0, &["FOO"]);
        let out = rewrite(&msg(), &status, &cfg, "1.0", "https://example.org");
        assert!(out.get_header("X-Spam-Status", "").starts_with("No,"));
        assert_eq!(out.get_header("X-Spam-Flag", ""), "");
    }

    #[test]
    fn spam_message_gets_flag_and_tagged_subject() {
        let cfg = config("required_hits 5.0\nrewrite_subject 1\nsubject_tag [SPAM _HITS_/_REQD_]\n");
        let status = status_with_score(9.0, &["FOO", "BAR"]);
        let out = rewrite(&msg(), &status, &cfg, "1.0", "https://example.org");
        assert_eq!(out.get_header("X-Spam-Flag", ""), "YES");
        assert!(out.get_header("Subject", "").starts_with("[SPAM 9.0/5.0]"));
    }

    #[test]
    fn report_safe_mode_1_wraps_original_as_rfc822() {
        let cfg = config("required_hits 5.0\nreport_safe 1\nreport Score: _HITS_/_REQD_\n");
        let status = status_with_score(9.0, &["FOO"]);
        let out = rewrite(&msg(), &status, &cfg, "1.0", "https://example.org");
        assert!(out.get_header("Content-Type", "").starts_with("multipart/mixed"));
        assert!(!out.get_header("X-Spam-Prev-Content-Type", "").is_empty());
    }

    #[test]
    fn remove_markup_restores_original_after_mode_1_wrap() {
        let cfg = config("required_hits 5.0\nreport_safe 1\nrewrite_subject 1\nsubject_tag [SPAM]\nreport Score: _HITS_/_REQD_\n");
        let status = status_with_score(9.0, &["FOO"]);
        let rewritten = rewrite(&msg(), &status, &cfg, "1.0", "https://example.org");
        let restored = remove_markup(&rewritten, &cfg);
        assert_eq!(restored.get_header("Content-Type", ""), "text/plain");
        assert_eq!(restored.get_body_lines(), vec!["body text"]);
        assert_eq!(restored.get_header("X-Spam-Flag", ""), "");
        assert_eq!(restored.get_header("Subject", ""), "hello");
    }

    #[test]
    fn mode_0_splices_sentinel_report_into_body_and_inverse_removes_it() {
        let cfg = config("required_hits 5.0\nreport_safe 0\nreport Score: _HITS_/_REQD_\n");
        let status = status_with_score(9.0, &["FOO"]);
        let rewritten = rewrite(&msg(), &status, &cfg, "1.0", "https://example.org");
        let body_text = String::from_utf8(rewritten.raw_body().to_vec()).unwrap();
        assert!(body_text.contains("SPAM: -----"));

        let restored = remove_markup(&rewritten, &cfg);
        assert_eq!(restored.get_body_lines(), vec!["body text"]);
    }
}
