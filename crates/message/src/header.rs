/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::borrow::Cow;
use std::cell::RefCell;

use ahash::AHashMap;
use base64::Engine;
use regex::Regex;
use std::sync::OnceLock;

/// One `Name: value` pair as it appeared in the message, in original byte
/// order. Continuation lines have already been folded into `value` with
/// their leading whitespace preserved (minus the line break itself) so
/// re-rendering with a single newline-join reconstructs the logical value.
#[derive(Debug, Clone)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    pub fn name_matches(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

/// Parses a raw header block (bytes before the first blank line) into
/// ordered fields, folding RFC 5322 continuation lines.
pub fn parse_headers(raw: &[u8]) -> Vec<HeaderField> {
    let text = String::from_utf8_lossy(raw);
    let mut fields: Vec<HeaderField> = Vec::new();
    for line in text.split("\r\n").flat_map(|l| l.split('\n')) {
        if line.is_empty() {
            continue;
        }
        let is_continuation = line.starts_with(' ') || line.starts_with('\t');
        if is_continuation {
            if let Some(last) = fields.last_mut() {
                last.value.push(' ');
                last.value.push_str(line.trim_start());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            fields.push(HeaderField {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            });
        }
    }
    fields
}

/// Decodes RFC 2047 encoded-words (`=?charset?Q|B?text?=`) appearing in a
/// header value. Unsupported charsets are passed through as Latin-1 to
/// stay total: a header value must never cause a classification to fail.
pub fn decode_mime_words(value: &str) -> String {
    static ENCODED_WORD: OnceLock<Regex> = OnceLock::new();
    let re = ENCODED_WORD.get_or_init(|| {
        Regex::new(r#"=\?(?P<charset>[^?]+)\?(?P<enc>[QqBb])\?(?P<text>[^?]*)\?="#).unwrap()
    });

    if !value.contains("=?") {
        return value.to_string();
    }

    // Adjacent encoded-words separated only by folding whitespace are one
    // logical run per RFC 2047 §2: drop the whitespace between them.
    static RUN_GAP: OnceLock<Regex> = OnceLock::new();
    let gap_re = RUN_GAP.get_or_init(|| Regex::new(r"\?=\s+=\?").unwrap());
    let collapsed = gap_re.replace_all(value, "?==?");

    re.replace_all(&collapsed, |caps: &regex::Captures| {
        let enc = caps["enc"].to_ascii_uppercase();
        let text = &caps["text"];
        let decoded: Vec<u8> = if enc == "B" {
            base64::engine::general_purpose::STANDARD
                .decode(text.as_bytes())
                .unwrap_or_default()
        } else {
            decode_q_encoding(text)
        };
        String::from_utf8(decoded.clone())
            .unwrap_or_else(|_| decoded.iter().map(|&b| b as char).collect())
    })
    .into_owned()
}

fn decode_q_encoding(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = &text[i + 1..i + 3];
                if let Ok(b) = u8::from_str_radix(hex, 16) {
                    out.push(b);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Strips RFC 5322 parenthesized comments (including nested ones) from an
/// address-bearing header value.
fn strip_comments(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut depth = 0u32;
    let mut in_quotes = false;
    for c in value.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                out.push(c);
            }
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn addr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}"#).unwrap()
    })
}

/// Extracts the first email address from a `"Display Name" <addr>` or bare
/// `addr` construct, per the `:addr` accessor contract.
pub fn extract_addr(value: &str) -> Option<String> {
    let stripped = strip_comments(value);
    if let Some(start) = stripped.find('<') {
        if let Some(end) = stripped[start..].find('>') {
            let inner = &stripped[start + 1..start + end];
            if addr_regex().is_match(inner) {
                return Some(inner.trim().to_string());
            }
        }
    }
    addr_regex().find(&stripped).map(|m| m.as_str().to_string())
}

/// Extracts the display name from `"Display Name" <addr>` or
/// `addr (Display Name)`, per the `:name` accessor contract.
pub fn extract_name(value: &str) -> Option<String> {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('"') {
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }
    if let Some(start) = value.find('<') {
        let before = value[..start].trim().trim_matches('"').trim();
        if !before.is_empty() {
            return Some(before.to_string());
        }
    }
    if let Some(open) = value.find('(') {
        if let Some(close) = value[open..].find(')') {
            return Some(value[open + 1..open + close].to_string());
        }
    }
    None
}

/// The per-message header-accessor cache mandated by the message-model
/// contract: every distinct request key (`Name`, `Name:addr`, `ALL`, ...)
/// is computed once and memoized until the next header mutation.
#[derive(Debug, Default)]
pub struct HeaderCache {
    entries: RefCell<AHashMap<String, String>>,
}

impl HeaderCache {
    pub fn get_or_compute(&self, key: &str, compute: impl FnOnce() -> String) -> String {
        if let Some(hit) = self.entries.borrow().get(key) {
            return hit.clone();
        }
        let value = compute();
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        value
    }

    pub fn invalidate(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// Parses a header request key into its base name and requested form.
pub enum RequestKey<'a> {
    All,
    ToCc,
    Named { name: &'a str, form: AccessorForm },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorForm {
    Decoded,
    Addr,
    Name,
    Raw,
}

pub fn parse_request_key(key: &str) -> RequestKey<'_> {
    if key.eq_ignore_ascii_case("ALL") {
        return RequestKey::All;
    }
    if key.eq_ignore_ascii_case("ToCc") {
        return RequestKey::ToCc;
    }
    match key.split_once(':') {
        Some((name, "addr")) => RequestKey::Named {
            name,
            form: AccessorForm::Addr,
        },
        Some((name, "name")) => RequestKey::Named {
            name,
            form: AccessorForm::Name,
        },
        Some((name, "raw")) => RequestKey::Named {
            name,
            form: AccessorForm::Raw,
        },
        _ => RequestKey::Named {
            name: key,
            form: AccessorForm::Decoded,
        },
    }
}

pub fn cow_decode(value: &str, raw: bool) -> Cow<'_, str> {
    if raw || !value.contains("=?") {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(decode_mime_words(value))
    }
}
