/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::body;
use crate::error::{MessageError, Result};
use crate::header::{
    self, AccessorForm, HeaderCache, HeaderField, RequestKey,
};
use crate::uri;

/// One parsed message, immutable for the lifetime of a single
/// classification (per the PerMsgStatus lifecycle in the data model).
///
/// Header mutation methods exist only to support the reporter's rewrite /
/// remove-markup pass, which produces a *new* logical message; they are not
/// used mid-classification.
#[derive(Debug, Clone)]
pub struct Message {
    headers: Vec<HeaderField>,
    raw_body: Vec<u8>,
    cache: HeaderCache,
}

impl Message {
    /// Splits headers from body on the first blank line and folds
    /// continuation lines. The only hard failure is an empty input.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(MessageError::Empty);
        }
        let split_at = find_header_body_split(raw);
        let (header_block, body_block) = match split_at {
            Some(pos) => (&raw[..pos.0], &raw[pos.1..]),
            None => (raw, &raw[raw.len()..]),
        };
        Ok(Message {
            headers: header::parse_headers(header_block),
            raw_body: body_block.to_vec(),
            cache: HeaderCache::default(),
        })
    }

    pub fn headers(&self) -> &[HeaderField] {
        &self.headers
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    /// Implements the `Name` / `Name:addr` / `Name:name` / `Name:raw` /
    /// `ALL` / `ToCc` accessor DSL, memoized per request key until the next
    /// header mutation.
    pub fn get_header(&self, request_key: &str, default: &str) -> String {
        self.cache.get_or_compute(request_key, || {
            self.compute_header(request_key)
                .unwrap_or_else(|| default.to_string())
        })
    }

    fn compute_header(&self, request_key: &str) -> Option<String> {
        match header::parse_request_key(request_key) {
            RequestKey::All => Some(
                self.headers
                    .iter()
                    .map(|h| format!("{}: {}", h.name, h.value))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            RequestKey::ToCc => {
                let joined = self.join_named("To", false).unwrap_or_default();
                let cc = self.join_named("Cc", false).unwrap_or_default();
                let combined = [joined, cc].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("\n");
                if combined.is_empty() { None } else { Some(combined) }
            }
            RequestKey::Named { name, form } => match form {
                AccessorForm::Decoded => self.join_named(name, false),
                AccessorForm::Raw => self.join_named(name, true),
                AccessorForm::Addr => self
                    .first_named(name)
                    .and_then(|v| header::extract_addr(&v)),
                AccessorForm::Name => {
                    self.first_named(name).and_then(|v| header::extract_name(&v))
                }
            },
        }
    }

    fn first_named(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|h| h.name_matches(name))
            .map(|h| header::decode_mime_words(&h.value))
    }

    fn join_named(&self, name: &str, raw: bool) -> Option<String> {
        let values: Vec<String> = self
            .headers
            .iter()
            .filter(|h| h.name_matches(name))
            .map(|h| header::cow_decode(&h.value, raw).into_owned())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join("\n"))
        }
    }

    /// Appends a header. Invalidates the accessor cache, per the message
    /// model's "invalidate the cache on any header mutation" contract.
    pub fn put_header(&mut self, name: &str, value: &str) {
        self.headers.push(HeaderField {
            name: name.to_string(),
            value: value.to_string(),
        });
        self.cache.invalidate();
    }

    /// Replaces every occurrence of `name` with a single new value,
    /// preserving its first position; removes the rest.
    pub fn replace_header(&mut self, name: &str, value: &str) {
        let mut replaced = false;
        self.headers.retain_mut(|h| {
            if h.name_matches(name) {
                if !replaced {
                    h.value = value.to_string();
                    replaced = true;
                    true
                } else {
                    false
                }
            } else {
                true
            }
        });
        if !replaced {
            self.put_header(name, value);
        }
        self.cache.invalidate();
    }

    pub fn delete_header(&mut self, name: &str) {
        self.headers.retain(|h| !h.name_matches(name));
        self.cache.invalidate();
    }

    pub fn delete_headers_with_prefix(&mut self, prefix: &str) {
        self.headers
            .retain(|h| !h.name.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()));
        self.cache.invalidate();
    }

    /// Replaces the raw body wholesale, used by the reporter to splice in
    /// a report-safe container or restore an original body.
    pub fn set_raw_body(&mut self, body: Vec<u8>) {
        self.raw_body = body;
    }

    /// Decoded body, MIME-aware: non-text parts collapse to a stable
    /// `[skipped TYPE attachment]` marker line.
    pub fn get_body_lines(&self) -> Vec<String> {
        body::decoded_body_lines(&self.headers, &self.raw_body)
    }

    /// Pre-decoding body lines, chunked to the 4096-byte bound.
    pub fn get_raw_body_lines(&self) -> Vec<String> {
        body::raw_body_lines(&self.raw_body)
    }

    pub fn get_uris(&self) -> Vec<String> {
        uri::extract_uris(&self.get_body_lines())
    }

    /// Header bytes, a blank line, then raw body bytes — the view consumed
    /// by full-text tests.
    pub fn get_full_text(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.raw_body.len() + 256);
        for h in &self.headers {
            out.extend_from_slice(h.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(h.value.as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.raw_body);
        out
    }

    /// Renders the message back to bytes (headers in their current order,
    /// blank line, raw body), used by the reporter to emit the rewritten
    /// message.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.get_full_text()
    }
}

/// Locates the header/body split: the first blank line (`\n\n` or
/// `\r\n\r\n`). Returns `(header_end, body_start)`.
fn find_header_body_split(raw: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < raw.len() {
        if raw[i] == b'\n' && raw[i + 1] == b'\n' {
            return Some((i, i + 2));
        }
        if i + 3 < raw.len() && &raw[i..i + 4] == b"\r\n\r\n" {
            return Some((i, i + 4));
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] =
        b"Subject: You can WIN today\r\nFrom: a@example.com\r\n\r\nHello world\r\n";

    #[test]
    fn parse_splits_headers_and_body() {
        let msg = Message::parse(SAMPLE).unwrap();
        assert_eq!(msg.headers().len(), 2);
        assert_eq!(msg.get_body_lines(), vec!["Hello world"]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(Message::parse(b""), Err(MessageError::Empty));
    }

    #[test]
    fn header_accessor_joins_multivalue_with_newline() {
        let msg = Message::parse(b"Received: a\nReceived: b\n\nbody\n").unwrap();
        assert_eq!(msg.get_header("Received", ""), "a\nb");
    }

    #[test]
    fn addr_accessor_extracts_bracketed_address() {
        let msg = Message::parse(SAMPLE).unwrap();
        assert_eq!(msg.get_header("From:addr", ""), "a@example.com");
    }

    #[test]
    fn missing_header_falls_back_to_default() {
        let msg = Message::parse(SAMPLE).unwrap();
        assert_eq!(msg.get_header("X-Missing", "fallback"), "fallback");
    }

    #[test]
    fn all_accessor_reconstructs_header_block() {
        let msg = Message::parse(SAMPLE).unwrap();
        assert!(msg.get_header("ALL", "").contains("Subject: You can WIN today"));
    }

    #[test]
    fn put_header_invalidates_cache() {
        let mut msg = Message::parse(SAMPLE).unwrap();
        assert_eq!(msg.get_header("X-Spam-Flag", "no"), "no");
        msg.put_header("X-Spam-Flag", "YES");
        assert_eq!(msg.get_header("X-Spam-Flag", "no"), "YES");
    }
}
