/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::sync::OnceLock;

use ahash::AHashMap;
use message::Message;
use regex::Regex;

use crate::error::RuleError;
use crate::status::PerMsgStatus;

/// Fixed argument convention for every eval callback (§9 design notes):
/// the message, the in-progress status (for cross-rule state), and the
/// rule's literal argument list as written in `eval:fn(args)`.
pub type EvalFn = fn(&Message, &PerMsgStatus, &[String]) -> Result<bool, RuleError>;

/// The eval-callback registry, split conceptually into "local" and
/// "network" groups by the caller (network ones are additionally gated by
/// `tflags net`); this registry only holds the local group, since network
/// reputation lookups are an external collaborator per §1/§6.
pub fn registry() -> &'static AHashMap<&'static str, EvalFn> {
    static REG: OnceLock<AHashMap<&'static str, EvalFn>> = OnceLock::new();
    REG.get_or_init(|| {
        let mut m: AHashMap<&'static str, EvalFn> = AHashMap::new();
        m.insert("check_for_missing_to_header", check_for_missing_to_header);
        m.insert("check_for_shifted_date", check_for_shifted_date);
        m.insert("check_subject_all_caps", check_subject_all_caps);
        m.insert("check_unique_subject_id", check_unique_subject_id);
        m.insert("check_for_forged_received_trail", check_for_forged_received_trail);
        m.insert("check_ratware_envelope_from", check_ratware_envelope_from);
        m
    })
}

pub fn call(
    name: &str,
    msg: &Message,
    status: &PerMsgStatus,
    args: &[String],
) -> Result<bool, RuleError> {
    match registry().get(name) {
        Some(f) => f(msg, status, args),
        None => Err(RuleError::UnknownEvalFunction {
            rule: String::new(),
            function: name.to_string(),
        }),
    }
}

/// `eval:check_for_missing_to_header()` — hits when neither `To` nor `Cc`
/// is present.
fn check_for_missing_to_header(
    msg: &Message,
    _status: &PerMsgStatus,
    _args: &[String],
) -> Result<bool, RuleError> {
    Ok(msg.get_header("To", "").is_empty() && msg.get_header("Cc", "").is_empty())
}

/// `eval:check_for_shifted_date()` — hits when the `Date` header is absent
/// or does not parse as an RFC 5322 date-time skeleton.
fn check_for_shifted_date(
    msg: &Message,
    _status: &PerMsgStatus,
    _args: &[String],
) -> Result<bool, RuleError> {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    let re = DATE_RE.get_or_init(|| {
        Regex::new(r"(?i)\d{1,2}\s+[a-z]{3}\s+\d{2,4}\s+\d{1,2}:\d{2}:\d{2}").unwrap()
    });
    let date = msg.get_header("Date", "");
    Ok(date.is_empty() || !re.is_match(&date))
}

/// `eval:check_subject_all_caps()` — hits when the subject has at least
/// one cased letter and every cased letter is uppercase.
fn check_subject_all_caps(
    msg: &Message,
    _status: &PerMsgStatus,
    _args: &[String],
) -> Result<bool, RuleError> {
    let subject = msg.get_header("Subject", "");
    let has_letter = subject.chars().any(|c| c.is_alphabetic());
    Ok(has_letter && !subject.chars().any(|c| c.is_lowercase()))
}

/// `eval:check_unique_subject_id()` — hits when the subject contains a
/// long hex/base36-looking token, a common ratware fingerprint-avoidance
/// trick.
fn check_unique_subject_id(
    msg: &Message,
    _status: &PerMsgStatus,
    _args: &[String],
) -> Result<bool, RuleError> {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    let re = TOKEN_RE.get_or_init(|| Regex::new(r"(?i)\b[0-9a-f]{8,}\b").unwrap());
    let subject = msg.get_header("Subject", "");
    Ok(re.is_match(&subject))
}

/// `eval:check_for_forged_received_trail()` — hits when a `Received` line
/// claims a HELO hostname that shares no label with the IP's reverse
/// pointer hint included in the same line (a cheap local heuristic; real
/// DNS verification is an external collaborator per §6).
fn check_for_forged_received_trail(
    msg: &Message,
    _status: &PerMsgStatus,
    _args: &[String],
) -> Result<bool, RuleError> {
    static HELO_RE: OnceLock<Regex> = OnceLock::new();
    let re = HELO_RE.get_or_init(|| {
        Regex::new(r"(?i)from\s+(\S+)\s+\(.*?\[(?:\d{1,3}\.){3}\d{1,3}\].*?\brdns=(\S+)\)").unwrap()
    });
    let received = msg.get_header("Received", "");
    for line in received.split('\n') {
        if let Some(caps) = re.captures(line) {
            let helo = caps[1].to_ascii_lowercase();
            let rdns = caps[2].to_ascii_lowercase();
            if !rdns.ends_with(helo.trim_start_matches("www.")) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// `eval:check_ratware_envelope_from()` — hits when `From` and
/// `Return-Path` addresses disagree in domain, a common bulk-mailer
/// envelope mismatch.
fn check_ratware_envelope_from(
    msg: &Message,
    _status: &PerMsgStatus,
    _args: &[String],
) -> Result<bool, RuleError> {
    let from = msg.get_header("From:addr", "");
    let return_path = msg.get_header("Return-Path:addr", "");
    if from.is_empty() || return_path.is_empty() {
        return Ok(false);
    }
    let from_domain = from.rsplit('@').next().unwrap_or("");
    let rp_domain = return_path.rsplit('@').next().unwrap_or("");
    Ok(!from_domain.eq_ignore_ascii_case(rp_domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_to_header_hits() {
        let msg = Message::parse(b"Subject: hi\n\nbody\n").unwrap();
        let status = PerMsgStatus::new();
        assert!(check_for_missing_to_header(&msg, &status, &[]).unwrap());
    }

    #[test]
    fn present_to_header_does_not_hit() {
        let msg = Message::parse(b"To: a@b.com\n\nbody\n").unwrap();
        let status = PerMsgStatus::new();
        assert!(!check_for_missing_to_header(&msg, &status, &[]).unwrap());
    }

    #[test]
    fn all_caps_subject_hits() {
        let msg = Message::parse(b"Subject: BUY NOW\n\nbody\n").unwrap();
        let status = PerMsgStatus::new();
        assert!(check_subject_all_caps(&msg, &status, &[]).unwrap());
    }

    #[test]
    fn mixed_case_subject_does_not_hit() {
        let msg = Message::parse(b"Subject: Buy Now\n\nbody\n").unwrap();
        let status = PerMsgStatus::new();
        assert!(!check_subject_all_caps(&msg, &status, &[]).unwrap());
    }

    #[test]
    fn unknown_function_returns_error() {
        let msg = Message::parse(b"Subject: hi\n\nbody\n").unwrap();
        let status = PerMsgStatus::new();
        assert!(call("no_such_function", &msg, &status, &[]).is_err());
    }
}
