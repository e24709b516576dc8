/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::sync::OnceLock;

use base64::Engine;
use regex::Regex;

use crate::header::HeaderField;

const MAX_BODY_LINE: usize = 4096;

#[derive(Debug, Clone, Default)]
pub struct ContentType {
    pub full: String,
    pub main: String,
    pub boundary: Option<String>,
}

pub fn parse_content_type(value: &str) -> ContentType {
    let mut parts = value.split(';');
    let main = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    let mut boundary = None;
    for param in parts {
        let param = param.trim();
        if let Some(rest) = param
            .strip_prefix("boundary=")
            .or_else(|| param.strip_prefix("Boundary="))
        {
            boundary = Some(rest.trim_matches('"').to_string());
        }
    }
    ContentType {
        full: value.to_string(),
        main,
        boundary,
    }
}

pub fn find_header<'a>(headers: &'a [HeaderField], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name_matches(name))
        .map(|h| h.value.as_str())
}

/// Truncates a body line to the configured bound to keep regex
/// backtracking costs predictable, per the message-model failure contract.
/// Over-length lines are processed as consecutive chunks rather than
/// silently dropped.
pub fn chunk_line(line: &str) -> Vec<&str> {
    if line.len() <= MAX_BODY_LINE {
        return vec![line];
    }
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let mut end = (start + MAX_BODY_LINE).min(bytes.len());
        // don't split a UTF-8 char boundary
        while end < bytes.len() && !line.is_char_boundary(end) {
            end -= 1;
        }
        out.push(&line[start..end]);
        start = end;
    }
    out
}

/// A single MIME body part after boundary splitting: its own headers and
/// raw (pre-transfer-decoding) byte content.
pub struct RawPart {
    pub headers: Vec<HeaderField>,
    pub content_type: ContentType,
    pub body: Vec<u8>,
}

/// Splits a body on a MIME boundary into parts. Malformed/missing
/// boundaries degrade to a single opaque part covering the whole body,
/// matching the "silently degrade to raw body" failure contract.
pub fn split_parts(body: &[u8], top_level: &ContentType) -> Vec<RawPart> {
    let whole = || {
        vec![RawPart {
            headers: Vec::new(),
            content_type: top_level.clone(),
            body: body.to_vec(),
        }]
    };
    let Some(boundary) = &top_level.boundary else {
        return whole();
    };
    if !top_level.main.starts_with("multipart/") {
        return whole();
    }

    let delim = format!("--{boundary}");
    let text = String::from_utf8_lossy(body);
    let mut segments: Vec<&str> = Vec::new();
    let mut rest = text.as_ref();
    loop {
        match rest.find(&delim) {
            Some(pos) => {
                let after = &rest[pos + delim.len()..];
                if let Some(nl) = after.find('\n') {
                    segments.push(&after[..nl.min(after.len())]);
                    rest = &after[nl + 1..];
                } else {
                    break;
                }
                if after.trim_start().starts_with("--") {
                    break;
                }
            }
            None => break,
        }
    }

    if segments.is_empty() {
        return whole();
    }

    let mut out = Vec::with_capacity(segments.len());
    for seg in segments {
        let (hdr_block, body_block) = match seg.find("\n\n").or_else(|| seg.find("\r\n\r\n")) {
            Some(pos) => {
                let sep_len = if seg[pos..].starts_with("\r\n\r\n") { 4 } else { 2 };
                (&seg[..pos], &seg[pos + sep_len..])
            }
            None => ("", seg),
        };
        let headers = crate::header::parse_headers(hdr_block.as_bytes());
        let ct = find_header(&headers, "Content-Type")
            .map(parse_content_type)
            .unwrap_or_default();
        out.push(RawPart {
            headers,
            content_type: ct,
            body: body_block.trim_end_matches("--").as_bytes().to_vec(),
        });
    }
    out
}

/// Decodes a single part's body according to its Content-Transfer-Encoding.
/// Unknown/absent encodings pass through as 8-bit/7-bit text unchanged.
pub fn decode_transfer_encoding(body: &[u8], cte: Option<&str>) -> Vec<u8> {
    match cte.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref enc) if enc == "base64" => decode_base64_body(body),
        Some(ref enc) if enc == "quoted-printable" => {
            quoted_printable::decode(body, quoted_printable::ParseMode::Robust)
                .unwrap_or_else(|_| body.to_vec())
        }
        _ => body.to_vec(),
    }
}

fn decode_base64_body(body: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(body);
    let joined: String = text.lines().map(|l| l.trim()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(joined.as_bytes())
        .unwrap_or_else(|_| body.to_vec())
}

/// Heuristic base64-section sniffing for [`crate::Message::get_raw_body_lines`]:
/// three or more consecutive lines of equal, constant length, pure
/// ASCII-base64 alphabet and no embedded whitespace mark the start of an
/// (undeclared) base64 section, per the raw-body contract.
pub fn sniff_base64_sections(lines: &[String]) -> Vec<bool> {
    static B64_LINE: OnceLock<Regex> = OnceLock::new();
    let re = B64_LINE.get_or_init(|| Regex::new(r"^[A-Za-z0-9+/]+=*$").unwrap());

    let mut is_b64 = vec![false; lines.len()];
    let mut i = 0;
    while i < lines.len() {
        if lines[i].is_empty() || !re.is_match(&lines[i]) {
            i += 1;
            continue;
        }
        let len = lines[i].len();
        let mut j = i;
        while j < lines.len() && lines[j].len() == len && re.is_match(&lines[j]) {
            j += 1;
        }
        if j - i >= 3 {
            for slot in is_b64.iter_mut().take(j).skip(i) {
                *slot = true;
            }
        }
        i = j.max(i + 1);
    }
    is_b64
}
