/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::AHashSet;
use message::{HeaderField, Message};

/// Headers whose value never contributes a token: every `Received` line
/// except the last two (the ones closest to the submitting MUA), `Date`,
/// `List-*`, and any prior `X-Spam-*` result header.
fn header_is_ignored(name: &str, received_index: Option<usize>, received_total: usize) -> bool {
    if name.eq_ignore_ascii_case("Date") {
        return true;
    }
    if name.to_ascii_lowercase().starts_with("list-") {
        return true;
    }
    if name.to_ascii_lowercase().starts_with("x-spam-") {
        return true;
    }
    if name.eq_ignore_ascii_case("Received") {
        if let Some(idx) = received_index {
            return idx + 2 < received_total;
        }
    }
    false
}

/// Compressed 2-character header-name codes for the common headers, per
/// §4.4. Anything not listed falls back to its lowercased first four
/// characters, kept stable and short without a fixed table entry.
fn compress_header_name(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "message-id" => "*m".to_string(),
        "received" => "*r".to_string(),
        "subject" => "*s".to_string(),
        "from" => "*f".to_string(),
        "to" => "*t".to_string(),
        "content-type" => "*c".to_string(),
        "x-mailer" => "*x".to_string(),
        "mime-version" => "*v".to_string(),
        other => other.chars().take(4).collect(),
    }
}

const STOPLIST: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "has", "was",
    "were", "with", "this", "that", "from", "have", "been",
];

const DIGIT_FINGERPRINT_STOPLIST: &[&str] = &["NNN", "NNNNNNNN", "NNNNNNNNNNNN"];

fn is_stopword(token: &str) -> bool {
    STOPLIST.iter().any(|s| s.eq_ignore_ascii_case(token))
}

fn is_allowed_body_char(c: char) -> bool {
    matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | ',' | '@' | '*' | '!' | '_' | '\'' | '"' | '$' | '.')
        || ('\u{A1}'..='\u{FF}').contains(&c)
}

/// Expands a run of 3-6 dots or 2-6 dashes into its own token, matching
/// the ellipsis/dash-run special case in §4.4's tokenizer contract.
fn is_dot_or_dash_run(s: &str) -> bool {
    let all_dots = s.chars().all(|c| c == '.') && (3..=6).contains(&s.len());
    let all_dashes = s.chars().all(|c| c == '-') && (2..=6).contains(&s.len());
    all_dots || all_dashes
}

fn trim_punct(s: &str) -> &str {
    s.trim_matches(|c: char| matches!(c, '-' | '\'' | '"' | '.' | ','))
}

/// Title-case folding: a word whose first letter is uppercase and every
/// other letter lowercase has its initial letter lowered, so
/// "Viagra"/"viagra" collapse to the same token.
fn fold_title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() && chars.clone().all(|c| !c.is_uppercase()) => {
            let mut out = String::with_capacity(word.len());
            out.extend(first.to_lowercase());
            out.push_str(chars.as_str());
            out
        }
        _ => word.to_string(),
    }
}

fn has_high_ascii_run(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.windows(2).any(|w| (0xA0..=0xFF).contains(&w[0]) && (0xA0..=0xFF).contains(&w[1]))
}

/// Tokenizes one whitespace-delimited body word into zero or more token
/// strings, applying the length/stoplist/digit-fingerprint rules of §4.4.
fn tokenize_body_word(word: &str, out: &mut Vec<String>) {
    let filtered: String = word.chars().filter(|c| is_allowed_body_char(*c)).collect();
    if filtered.is_empty() {
        return;
    }
    if is_dot_or_dash_run(&filtered) {
        out.push(filtered);
        return;
    }
    let trimmed = trim_punct(&filtered);
    if trimmed.len() < 3 {
        return;
    }
    if is_stopword(trimmed) {
        return;
    }
    let folded = fold_title_case(trimmed);

    let base_token = if folded.len() > 15 {
        if has_high_ascii_run(&folded) {
            for chunk in folded.as_bytes().chunks(2) {
                out.push(format!("8:{}", chunk.iter().map(|b| format!("{b:02x}")).collect::<String>()));
            }
            return;
        } else {
            format!("sk:{}", &folded[..folded.len().min(7)])
        }
    } else {
        folded
    };

    let has_digit = base_token.chars().any(|c| c.is_ascii_digit());
    out.push(base_token.clone());
    if has_digit {
        let digit_folded: String = base_token
            .chars()
            .map(|c| if c.is_ascii_digit() { 'N' } else { c })
            .collect();
        if !DIGIT_FINGERPRINT_STOPLIST.contains(&digit_folded.as_str()) {
            out.push(digit_folded);
        }
    }
}

/// Tokenizes the decoded body per §4.4.
pub fn tokenize_body(body_lines: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for line in body_lines {
        for word in line.split_whitespace() {
            tokenize_body_word(word, &mut out);
        }
    }
    out
}

/// Reduces a `Message-ID` value to the parts that survive across messages
/// from the same (possibly spamming) MTA, dropping the locally-unique
/// serial so the MTA's ID *format* becomes the learned signal.
fn preprocess_message_id(value: &str) -> String {
    value
        .trim_start_matches('<')
        .trim_end_matches('>')
        .chars()
        .map(|c| if c.is_ascii_digit() { 'N' } else { c })
        .collect()
}

/// Reduces a `Received` line: strips the ESMTP/sendmail queue id, replaces
/// the last IP octet with a `/24`-style mask, and lowercases the
/// `with`/`from`/`for` structural keywords so formatting differences
/// between MTAs don't fragment otherwise-identical tokens.
fn preprocess_received(value: &str) -> String {
    let mut s = value.to_string();
    for kw in ["With", "WITH", "From", "FROM", "For", "FOR"] {
        let lower = kw.to_ascii_lowercase();
        s = s.replace(kw, &lower);
    }
    if let Some(start) = s.find("id ") {
        let rest = &s[start + 3..];
        let end = rest.find([';', '\t']).unwrap_or(rest.len());
        s.replace_range(start + 3..start + 3 + end, "ID");
    }
    mask_ip_last_octet(&s)
}

fn mask_ip_last_octet(s: &str) -> String {
    static IP_PARTS: usize = 4;
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    loop {
        match rest.find(|c: char| c.is_ascii_digit()) {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let tail = &rest[start..];
                let mut end = 0;
                let mut dots = 0;
                for (i, c) in tail.char_indices() {
                    if c.is_ascii_digit() || c == '.' {
                        if c == '.' {
                            dots += 1;
                        }
                        end = i + 1;
                    } else {
                        break;
                    }
                }
                let candidate = &tail[..end];
                if dots == IP_PARTS - 1 && candidate.split('.').all(|p| p.parse::<u8>().is_ok()) {
                    let mut octets: Vec<&str> = candidate.split('.').collect();
                    octets.pop();
                    out.push_str(&octets.join("."));
                    out.push_str("/24");
                } else {
                    out.push_str(candidate);
                }
                rest = &tail[end..];
            }
        }
    }
    out
}

fn preprocess_content_type(value: &str) -> String {
    value
        .split(';')
        .map(str::trim)
        .filter(|p| !p.to_ascii_lowercase().starts_with("charset=") && !p.eq_ignore_ascii_case("text"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Tokenizes the headers of a message into `H<code>:<token>` pairs, per
/// §4.4's header-token contract.
pub fn tokenize_headers(headers: &[HeaderField]) -> Vec<String> {
    let mut out = Vec::new();
    let received_total = headers.iter().filter(|h| h.name_matches("Received")).count();
    let mut received_seen = 0usize;

    for h in headers {
        let is_received = h.name_matches("Received");
        let received_index = if is_received {
            let idx = received_seen;
            received_seen += 1;
            Some(idx)
        } else {
            None
        };
        if header_is_ignored(&h.name, received_index, received_total) {
            continue;
        }
        let value = if h.name_matches("Message-ID") {
            preprocess_message_id(&h.value)
        } else if is_received {
            preprocess_received(&h.value)
        } else if h.name_matches("Content-Type") {
            preprocess_content_type(&h.value)
        } else {
            h.value.clone()
        };
        let code = compress_header_name(&h.name);
        for word in value.split_whitespace() {
            let mut toks = Vec::new();
            tokenize_body_word(word, &mut toks);
            for tok in toks {
                out.push(format!("H{code}:{tok}"));
            }
        }
    }
    out
}

/// Tokenizes a whole message (headers + body), deduplicating within the
/// message — a token that appears multiple times is learned once per
/// message (§4.4 learn/forget dedupe contract).
pub fn tokenize_message(msg: &Message) -> AHashSet<String> {
    let mut set = AHashSet::new();
    for t in tokenize_headers(msg.headers()) {
        set.insert(t);
    }
    for t in tokenize_body(&msg.get_body_lines()) {
        set.insert(t);
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_tokens_are_rejected() {
        let mut out = Vec::new();
        tokenize_body_word("ab", &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn stopwords_are_rejected() {
        let mut out = Vec::new();
        tokenize_body_word("the", &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn dot_run_becomes_its_own_token() {
        let mut out = Vec::new();
        tokenize_body_word("....", &mut out);
        assert_eq!(out, vec!["....".to_string()]);
    }

    #[test]
    fn title_case_word_is_folded_to_lowercase() {
        let mut out = Vec::new();
        tokenize_body_word("Viagra", &mut out);
        assert_eq!(out, vec!["viagra".to_string()]);
    }

    #[test]
    fn all_caps_word_is_not_folded() {
        let mut out = Vec::new();
        tokenize_body_word("VIAGRA", &mut out);
        assert_eq!(out, vec!["VIAGRA".to_string()]);
    }

    #[test]
    fn long_ascii_token_is_prefixed_and_truncated() {
        let mut out = Vec::new();
        tokenize_body_word("abcdefghijklmnopqrstuvwxyz", &mut out);
        assert_eq!(out[0], "sk:abcdefg");
    }

    #[test]
    fn digit_token_emits_n_folded_twin() {
        let mut out = Vec::new();
        tokenize_body_word("call555", &mut out);
        assert_eq!(out, vec!["call555".to_string(), "callNNN".to_string()]);
    }

    #[test]
    fn message_tokenization_dedupes() {
        let msg = Message::parse(b"Subject: win win win\n\nwin win\n").unwrap();
        let toks = tokenize_message(&msg);
        assert!(toks.iter().any(|t| t == "win"));
    }

    #[test]
    fn received_ip_last_octet_is_masked() {
        let out = preprocess_received("from x.com (x.com [192.168.1.42]) by y.com");
        assert!(out.contains("192.168.1/24"));
    }
}
