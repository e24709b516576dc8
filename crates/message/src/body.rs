/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::header::HeaderField;
use crate::mime::{self, ContentType, RawPart};

/// Marker inserted in place of a skipped (non-text) MIME part so that line
/// counts between the decoded and raw body views stay comparable, per the
/// `get_body_lines` contract.
fn skipped_marker(content_type: &str) -> String {
    format!("[skipped {} attachment]", content_type.to_ascii_uppercase())
}

fn is_text_part(ct: &ContentType) -> bool {
    ct.main.is_empty() || ct.main.starts_with("text/") || ct.main == "message/rfc822"
}

/// Builds the decoded body line sequence: text parts are transfer-decoded
/// and split on terminating newlines; non-text parts collapse to a single
/// marker line.
pub fn decoded_body_lines(headers: &[HeaderField], raw_body: &[u8]) -> Vec<String> {
    let top_ct = mime::find_header(headers, "Content-Type")
        .map(mime::parse_content_type)
        .unwrap_or_default();
    let parts = mime::split_parts(raw_body, &top_ct);

    let mut lines = Vec::new();
    for part in &parts {
        if !is_text_part(&part.content_type) {
            lines.push(skipped_marker(&part.content_type.main));
            continue;
        }
        let cte = mime::find_header(&part.headers, "Content-Transfer-Encoding");
        let decoded = mime::decode_transfer_encoding(&part.body, cte);
        push_lines(&decoded, &mut lines);
    }
    lines
}

fn push_lines(decoded: &[u8], out: &mut Vec<String>) {
    let text = String::from_utf8_lossy(decoded);
    for raw_line in text.split_inclusive('\n') {
        let line = raw_line.trim_end_matches(['\r', '\n']);
        for chunk in mime::chunk_line(line) {
            out.push(chunk.to_string());
        }
    }
}

/// Raw (pre-transfer-decoding) body lines, used by rawbody tests and as
/// input to the URI extractor and the Bayes tokenizer's base64 sniffer.
pub fn raw_body_lines(raw_body: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    push_lines(raw_body, &mut lines);
    lines
}

/// Part list exposed for callers (MIME defanging in the reporter) that need
/// per-part content-type/encoding rather than just flattened text.
pub fn parts(headers: &[HeaderField], raw_body: &[u8]) -> Vec<RawPart> {
    let top_ct = mime::find_header(headers, "Content-Type")
        .map(mime::parse_content_type)
        .unwrap_or_default();
    mime::split_parts(raw_body, &top_ct)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdrs(pairs: &[(&str, &str)]) -> Vec<HeaderField> {
        pairs
            .iter()
            .map(|(n, v)| HeaderField {
                name: n.to_string(),
                value: v.to_string(),
            })
            .collect()
    }

    #[test]
    fn plain_text_body_passes_through() {
        let headers = hdrs(&[("Content-Type", "text/plain")]);
        let lines = decoded_body_lines(&headers, b"hello\nworld\n");
        assert_eq!(lines, vec!["hello", "world"]);
    }

    #[test]
    fn non_text_part_becomes_marker() {
        let headers = hdrs(&[("Content-Type", "application/octet-stream")]);
        let lines = decoded_body_lines(&headers, b"\x00\x01binary");
        assert_eq!(lines, vec!["[skipped APPLICATION/OCTET-STREAM attachment]"]);
    }

    #[test]
    fn long_line_is_chunked_not_dropped() {
        let headers = hdrs(&[("Content-Type", "text/plain")]);
        let body = "a".repeat(9000) + "\n";
        let lines = decoded_body_lines(&headers, body.as_bytes());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 4096);
        assert_eq!(lines[1].len(), 4096);
    }
}
