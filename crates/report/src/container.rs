/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use rand::Rng;

const BOUNDARY_PREFIX: &str = "----------=_SPAMCLASSIFIER-REPORT";

pub fn new_boundary() -> String {
    let suffix: u64 = rand::rng().random();
    format!("{BOUNDARY_PREFIX}-{suffix:016x}")
}

/// Report-safe mode 1 wraps the original message as a `message/rfc822`
/// part; mode 2 wraps it as `text/plain` (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Rfc822,
    PlainText,
}

/// Builds the multipart body: a first `text/plain` part holding the
/// rendered report, then the original message as the second part
/// (content-type depending on `mode`).
pub fn build_container(boundary: &str, report_text: &str, original: &[u8], mode: WrapMode) -> Vec<u8> {
    let inner_type = match mode {
        WrapMode::Rfc822 => "message/rfc822",
        WrapMode::PlainText => "text/plain",
    };
    let mut out = Vec::new();
    out.extend_from_slice(format!("This is a multi-part message in MIME format.\n\n--{boundary}\n").as_bytes());
    out.extend_from_slice(b"Content-Type: text/plain; charset=us-ascii\n\n");
    out.extend_from_slice(report_text.as_bytes());
    out.extend_from_slice(format!("\n\n--{boundary}\nContent-Type: {inner_type}\n\n").as_bytes());
    out.extend_from_slice(original);
    out.extend_from_slice(format!("\n--{boundary}--\n").as_bytes());
    out
}

/// Inverse of [`build_container`]: extracts the bytes of the second
/// (original-message) part, given the same boundary. Returns `None` if
/// the body doesn't look like one of our containers.
pub fn extract_original(body: &[u8], boundary: &str) -> Option<Vec<u8>> {
    let text = String::from_utf8_lossy(body);
    let marker = format!("--{boundary}");
    let mut parts = text.split(&marker);
    parts.next()?;
    let _report_part = parts.next()?;
    let original_part = parts.next()?;
    let header_end = original_part.find("\n\n")?;
    let content = &original_part[header_end + 2..];
    let content = content.strip_suffix('\n').unwrap_or(content);
    Some(content.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_roundtrips_original_message() {
        let boundary = new_boundary();
        let original = b"Subject: hi\r\n\r\nbody text\r\n".to_vec();
        let container = build_container(&boundary, "Spam report text", &original, WrapMode::Rfc822);
        let extracted = extract_original(&container, &boundary).unwrap();
        assert_eq!(extracted, original);
    }

    #[test]
    fn plain_text_mode_also_roundtrips() {
        let boundary = new_boundary();
        let original = b"Subject: hi\n\nbody\n".to_vec();
        let container = build_container(&boundary, "report", &original, WrapMode::PlainText);
        let extracted = extract_original(&container, &boundary).unwrap();
        assert_eq!(extracted, original);
    }

    #[test]
    fn boundaries_are_unique() {
        assert_ne!(new_boundary(), new_boundary());
    }
}
