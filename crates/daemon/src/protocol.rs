/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The spamc/spamd line-oriented wire protocol (§4.7): CRLF-terminated
//! ASCII headers, `Content-length`-framed bodies.

use std::io::{self, BufRead, Read, Write};

use crate::error::{DaemonError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Check,
    Symbols,
    Report,
    ReportIfSpam,
    Process,
}

impl Verb {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "CHECK" => Ok(Verb::Check),
            "SYMBOLS" => Ok(Verb::Symbols),
            "REPORT" => Ok(Verb::Report),
            "REPORT_IFSPAM" => Ok(Verb::ReportIfSpam),
            "PROCESS" => Ok(Verb::Process),
            other => Err(DaemonError::Protocol(format!("unknown verb {other}"))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Verb::Check => "CHECK",
            Verb::Symbols => "SYMBOLS",
            Verb::Report => "REPORT",
            Verb::ReportIfSpam => "REPORT_IFSPAM",
            Verb::Process => "PROCESS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub verb: Verb,
    pub protocol_version: String,
    pub user: Option<String>,
    pub body: Vec<u8>,
}

fn read_crlf_line(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Err(DaemonError::Protocol("unexpected eof".into()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Parses one request: the verb line, headers up to a blank line, then
/// exactly `Content-length` bytes of message body.
pub fn read_request(reader: &mut impl BufRead) -> Result<Request> {
    let first = read_crlf_line(reader)?;
    let mut parts = first.split_whitespace();
    let verb_str = parts.next().ok_or_else(|| DaemonError::Protocol("empty request line".into()))?;
    let proto = parts.next().unwrap_or("SPAMC/1.5").to_string();
    let verb = Verb::parse(verb_str)?;

    let mut user = None;
    let mut content_length: Option<usize> = None;
    loop {
        let line = read_crlf_line(reader)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| DaemonError::Protocol(format!("bad header line: {line}")))?;
        let value = value.trim();
        match name.to_ascii_lowercase().as_str() {
            "user" => user = Some(value.to_string()),
            "content-length" => {
                content_length = Some(
                    value
                        .parse()
                        .map_err(|_| DaemonError::Protocol(format!("bad content-length: {value}")))?,
                )
            }
            _ => {}
        }
    }

    let len = content_length.ok_or_else(|| DaemonError::Protocol("missing Content-length".into()))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;

    Ok(Request { verb, protocol_version: proto, user, body })
}

/// Writes a request the way the real `spamc` client does: verb line,
/// optional `User:` header, `Content-length:`, blank line, exact body.
/// The server-side counterpart is [`read_request`].
pub fn write_request(writer: &mut impl Write, verb: Verb, protocol_version: &str, user: Option<&str>, body: &[u8]) -> io::Result<()> {
    write!(writer, "{} SPAMC/{}\r\n", verb.as_str(), protocol_version)?;
    if let Some(user) = user {
        write!(writer, "User: {user}\r\n")?;
    }
    write!(writer, "Content-length: {}\r\n\r\n", body.len())?;
    writer.write_all(body)?;
    Ok(())
}

/// Parses a response from the server side of the wire: status line,
/// `Spam:` header, then either a bare comma-separated symbol list or a
/// `Content-length`-framed body, mirroring [`write_response`].
pub fn read_response(reader: &mut impl BufRead) -> Result<Response> {
    let status_line = read_crlf_line(reader)?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts
        .next()
        .and_then(|p| p.strip_prefix("SPAMD/"))
        .ok_or_else(|| DaemonError::Protocol(format!("bad status line: {status_line}")))?
        .to_string();
    let code: u16 = parts
        .next()
        .ok_or_else(|| DaemonError::Protocol("missing response code".into()))?
        .parse()
        .map_err(|_| DaemonError::Protocol("non-numeric response code".into()))?;
    let message = parts.next().unwrap_or("").to_string();

    let spam_line = read_crlf_line(reader)?;
    let (is_spam, score, threshold) = parse_spam_header(&spam_line)?;

    let mut content_length: Option<usize> = None;
    loop {
        let line = read_crlf_line(reader)?;
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| DaemonError::Protocol(format!("bad content-length: {value}")))
                    .ok();
            }
        }
    }

    let (symbols, body) = match content_length {
        Some(len) => {
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf)?;
            (Vec::new(), Some(buf))
        }
        None => {
            // `SYMBOLS` responses carry a bare comma-separated line with no
            // `Content-length` framing (§4.7); an empty line means no hits.
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => (Vec::new(), None),
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']);
                    if trimmed.is_empty() {
                        (Vec::new(), None)
                    } else {
                        (trimmed.split(',').map(str::to_string).collect(), None)
                    }
                }
                Err(e) => return Err(DaemonError::Io(e)),
            }
        }
    };

    Ok(Response { protocol_version: version, code, message, is_spam, score, threshold, symbols, body })
}

fn parse_spam_header(line: &str) -> Result<(bool, f64, f64)> {
    let rest = line
        .strip_prefix("Spam: ")
        .ok_or_else(|| DaemonError::Protocol(format!("missing Spam header: {line}")))?;
    let (flag, rest) = rest
        .split_once(" ; ")
        .ok_or_else(|| DaemonError::Protocol(format!("malformed Spam header: {line}")))?;
    let (score_str, threshold_str) = rest
        .split_once(" / ")
        .ok_or_else(|| DaemonError::Protocol(format!("malformed Spam header: {line}")))?;
    let is_spam = flag == "true";
    let score: f64 = score_str
        .parse()
        .map_err(|_| DaemonError::Protocol(format!("bad score: {score_str}")))?;
    let threshold: f64 = threshold_str
        .parse()
        .map_err(|_| DaemonError::Protocol(format!("bad threshold: {threshold_str}")))?;
    Ok((is_spam, score, threshold))
}

#[derive(Debug, Clone)]
pub struct Response {
    pub protocol_version: String,
    pub code: u16,
    pub message: String,
    pub is_spam: bool,
    pub score: f64,
    pub threshold: f64,
    /// Matched rule names, for `SYMBOLS`.
    pub symbols: Vec<String>,
    /// Full text body, for `REPORT`/`REPORT_IFSPAM`/`PROCESS`.
    pub body: Option<Vec<u8>>,
}

/// Renders a float the way `%.1f` would under the `C` locale: `.` as the
/// decimal separator regardless of the host's locale settings. Rust's
/// `{:.1}` formatter never consults locale, so this is satisfied for
/// free — this wrapper exists to make that guarantee explicit at the
/// call site.
fn render_float(v: f64) -> String {
    format!("{v:.1}")
}

pub fn write_response(writer: &mut impl Write, resp: &Response) -> io::Result<()> {
    write!(writer, "SPAMD/{} {} {}\r\n", resp.protocol_version, resp.code, resp.message)?;
    write!(
        writer,
        "Spam: {} ; {} / {}\r\n",
        if resp.is_spam { "true" } else { "false" },
        render_float(resp.score),
        render_float(resp.threshold)
    )?;
    if !resp.symbols.is_empty() {
        write!(writer, "\r\n{}\r\n", resp.symbols.join(","))?;
        return Ok(());
    }
    match &resp.body {
        Some(body) => {
            write!(writer, "Content-length: {}\r\n\r\n", body.len())?;
            writer.write_all(body)?;
        }
        None => {
            write!(writer, "\r\n")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_check_request() {
        let raw = b"CHECK SPAMC/1.5\r\nContent-length: 5\r\n\r\nhello";
        let mut cur = Cursor::new(&raw[..]);
        let req = read_request(&mut cur).unwrap();
        assert_eq!(req.verb, Verb::Check);
        assert_eq!(req.body, b"hello");
    }

    #[test]
    fn parses_user_header() {
        let raw = b"SYMBOLS SPAMC/1.5\r\nUser: alice\r\nContent-length: 2\r\n\r\nhi";
        let mut cur = Cursor::new(&raw[..]);
        let req = read_request(&mut cur).unwrap();
        assert_eq!(req.user.as_deref(), Some("alice"));
    }

    #[test]
    fn missing_content_length_is_an_error() {
        let raw = b"CHECK SPAMC/1.5\r\n\r\n";
        let mut cur = Cursor::new(&raw[..]);
        assert!(read_request(&mut cur).is_err());
    }

    #[test]
    fn unknown_verb_is_rejected() {
        let raw = b"DANCE SPAMC/1.5\r\nContent-length: 0\r\n\r\n";
        let mut cur = Cursor::new(&raw[..]);
        assert!(read_request(&mut cur).is_err());
    }

    #[test]
    fn response_renders_locale_independent_floats() {
        let resp = Response {
            protocol_version: "1.5".into(),
            code: 0,
            message: "EX_OK".into(),
            is_spam: true,
            score: 12.3,
            threshold: 5.0,
            symbols: vec![],
            body: None,
        };
        let mut out = Vec::new();
        write_response(&mut out, &resp).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Spam: true ; 12.3 / 5.0"));
    }

    #[test]
    fn response_with_symbols_lists_comma_separated_hits() {
        let resp = Response {
            protocol_version: "1.5".into(),
            code: 0,
            message: "EX_OK".into(),
            is_spam: true,
            score: 9.0,
            threshold: 5.0,
            symbols: vec!["FOO".into(), "BAR".into()],
            body: None,
        };
        let mut out = Vec::new();
        write_response(&mut out, &resp).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("FOO,BAR"));
    }

    #[test]
    fn response_with_body_includes_content_length() {
        let resp = Response {
            protocol_version: "1.5".into(),
            code: 0,
            message: "EX_OK".into(),
            is_spam: false,
            score: 1.0,
            threshold: 5.0,
            symbols: vec![],
            body: Some(b"rewritten message".to_vec()),
        };
        let mut out = Vec::new();
        write_response(&mut out, &resp).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-length: 17"));
        assert!(text.ends_with("rewritten message"));
    }

    #[test]
    fn write_request_roundtrips_through_read_request() {
        let mut out = Vec::new();
        write_request(&mut out, Verb::Process, "1.5", Some("bob"), b"hello world").unwrap();
        let mut cur = Cursor::new(out);
        let req = read_request(&mut cur).unwrap();
        assert_eq!(req.verb, Verb::Process);
        assert_eq!(req.user.as_deref(), Some("bob"));
        assert_eq!(req.body, b"hello world");
    }

    #[test]
    fn read_response_parses_score_and_body() {
        let raw = b"SPAMD/1.5 0 EX_OK\r\nSpam: true ; 9.0 / 5.0\r\nContent-length: 4\r\n\r\nbody";
        let mut cur = Cursor::new(&raw[..]);
        let resp = read_response(&mut cur).unwrap();
        assert!(resp.is_spam);
        assert_eq!(resp.score, 9.0);
        assert_eq!(resp.threshold, 5.0);
        assert_eq!(resp.body, Some(b"body".to_vec()));
    }

    #[test]
    fn read_response_parses_symbol_list() {
        let raw = b"SPAMD/1.5 0 EX_OK\r\nSpam: false ; 1.0 / 5.0\r\n\r\nFOO,BAR\r\n";
        let mut cur = Cursor::new(&raw[..]);
        let resp = read_response(&mut cur).unwrap();
        assert_eq!(resp.symbols, vec!["FOO".to_string(), "BAR".to_string()]);
    }

    #[test]
    fn response_roundtrips_through_write_and_read() {
        let resp = Response {
            protocol_version: "1.5".into(),
            code: 0,
            message: "EX_OK".into(),
            is_spam: true,
            score: 12.3,
            threshold: 5.0,
            symbols: vec![],
            body: Some(b"rewritten".to_vec()),
        };
        let mut out = Vec::new();
        write_response(&mut out, &resp).unwrap();
        let mut cur = Cursor::new(out);
        let parsed = read_response(&mut cur).unwrap();
        assert_eq!(parsed.is_spam, resp.is_spam);
        assert_eq!(parsed.score, resp.score);
        assert_eq!(parsed.body, resp.body);
    }
}
