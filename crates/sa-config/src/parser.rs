/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::AHashMap;

use crate::addrlist::Addrlists;
use crate::directive;
use crate::error::ConfigError;
use crate::lexer::{lex, LogicalLine};
use crate::pattern;
use crate::rule::{validate_name, Rule, RuleKind, TFlag, SCORESET_COUNT};
use crate::templates::Templates;

/// Resolves `include PATH` directives to file content. Production callers
/// back this with the filesystem; tests use a fixed in-memory map.
pub trait IncludeResolver {
    fn resolve(&self, path: &str) -> Option<String>;
}

pub struct NullResolver;
impl IncludeResolver for NullResolver {
    fn resolve(&self, _path: &str) -> Option<String> {
        None
    }
}

/// The fully compiled configuration: rule registry, scores baked into each
/// rule, addrlists, templates, and the flat setting table backing the
/// typed accessors below.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub rules: AHashMap<String, Rule>,
    pub addrlists: Addrlists,
    pub templates: Templates,
    settings: AHashMap<String, String>,
    pub errors: Vec<ConfigError>,
    /// Set by `allow_user_rules 1`; gates whether a scores-only parse may
    /// still accept new rule definitions (§4.2).
    pub allow_user_rules: bool,
}

impl Config {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    fn setting(&self, name: &str) -> &str {
        self.settings
            .get(name)
            .map(String::as_str)
            .unwrap_or_else(|| directive::lookup(name).map(|d| d.default).unwrap_or(""))
    }

    pub fn required_hits(&self) -> f64 {
        self.setting("required_hits").parse().unwrap_or(5.0)
    }

    pub fn rewrite_subject(&self) -> bool {
        parse_bool(self.setting("rewrite_subject"))
    }

    pub fn subject_tag(&self) -> &str {
        self.setting("subject_tag")
    }

    pub fn report_safe(&self) -> u8 {
        self.setting("report_safe").parse().unwrap_or(1)
    }

    pub fn use_bayes(&self) -> bool {
        parse_bool(self.setting("use_bayes"))
    }

    pub fn skip_rbl_checks(&self) -> bool {
        parse_bool(self.setting("skip_rbl_checks"))
    }

    pub fn auto_learn(&self) -> bool {
        parse_bool(self.setting("auto_learn"))
    }

    pub fn auto_learn_threshold_spam(&self) -> f64 {
        self.setting("auto_learn_threshold_spam").parse().unwrap_or(12.0)
    }

    pub fn auto_learn_threshold_nonspam(&self) -> f64 {
        self.setting("auto_learn_threshold_nonspam").parse().unwrap_or(0.1)
    }

    pub fn bayes_path(&self) -> &str {
        self.setting("bayes_path")
    }

    pub fn bayes_use_hapaxes(&self) -> bool {
        parse_bool(self.setting("bayes_use_hapaxes"))
    }

    pub fn bayes_use_chi2_combining(&self) -> bool {
        parse_bool(self.setting("bayes_use_chi2_combining"))
    }

    pub fn bayes_expiry_min_db_size(&self) -> usize {
        self.setting("bayes_expiry_min_db_size").parse().unwrap_or(100_000)
    }

    /// Number of scans between opportunistic expiry attempts; `0`
    /// disables opportunistic expiry (the directive's own default).
    pub fn bayes_expiry_scan_count(&self) -> u64 {
        self.setting("bayes_expiry_scan_count").parse().unwrap_or(0)
    }

    pub fn raw_setting(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(String::as_str)
    }

    pub fn report_header(&self) -> bool {
        parse_bool(self.setting("report_header"))
    }

    pub fn fold_headers(&self) -> bool {
        parse_bool(self.setting("fold_headers"))
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "1" | "true" | "yes")
}

struct IfFrame {
    active: bool,
    taken: bool,
}

/// Parses a configuration text into a [`Config`]. `scores_only` restricts
/// acceptance to score lines, rule definitions (if permitted), and
/// whitelists per §4.2's scores-only mode.
pub fn parse(text: &str, scores_only: bool, resolver: &dyn IncludeResolver) -> Config {
    let mut cfg = Config::default();
    let lines = lex(text, None);
    parse_lines(&mut cfg, &lines, scores_only, resolver, 0);
    finish_parsing(&mut cfg);
    cfg
}

fn parse_lines(
    cfg: &mut Config,
    lines: &[LogicalLine],
    scores_only: bool,
    resolver: &dyn IncludeResolver,
    depth: u32,
) {
    if depth > 16 {
        cfg.errors.push(ConfigError {
            source_file: None,
            line_no: 0,
            message: "include nesting too deep, aborting".into(),
        });
        return;
    }

    let mut if_stack: Vec<IfFrame> = Vec::new();

    for line in lines {
        let active = if_stack.iter().all(|f| f.active);

        if let Some(rest) = line.text.strip_prefix("endif") {
            if rest.trim().is_empty() {
                if if_stack.pop().is_none() {
                    cfg.errors.push(err(line, "endif without matching if"));
                }
                continue;
            }
        }
        if let Some(expr) = strip_kw(&line.text, "if") {
            let taken = active && eval_if_expr(expr);
            if_stack.push(IfFrame { active: taken, taken });
            continue;
        }
        if let Some(name) = strip_kw(&line.text, "ifplugin") {
            // No plugin system is modeled; ifplugin blocks are always
            // inactive, matching "plugin(name)" always evaluating false.
            let _ = name;
            if_stack.push(IfFrame { active: false, taken: false });
            continue;
        }

        if !active {
            continue;
        }

        if let Some(rest) = strip_kw(&line.text, "lang") {
            if let Some((_locale, inner)) = rest.split_once(char::is_whitespace) {
                // Only the `en` locale is modeled as "current"; any other
                // `lang XX` line is parsed for validity but discarded.
                if rest.starts_with("en ") {
                    let inner_line = LogicalLine {
                        text: inner.trim().to_string(),
                        ..clone_pos(line)
                    };
                    parse_lines(cfg, std::slice::from_ref(&inner_line), scores_only, resolver, depth);
                }
            }
            continue;
        }

        if let Some(path) = strip_kw(&line.text, "include") {
            match resolver.resolve(path) {
                Some(content) => {
                    let nested = lex(&content, Some(path));
                    parse_lines(cfg, &nested, scores_only, resolver, depth + 1);
                }
                None => cfg.errors.push(err(line, &format!("cannot include {path}"))),
            }
            continue;
        }

        if let Some(rest) = strip_kw(&line.text, "require_version") {
            // The implementation's own version is always >= any requested
            // minimum; nothing further to do but validate the number.
            if rest.trim().parse::<f64>().is_err() {
                cfg.errors.push(err(line, "require_version: not a number"));
            }
            continue;
        }

        parse_directive(cfg, line, scores_only);
    }

    for _ in if_stack {
        cfg.errors.push(ConfigError {
            source_file: None,
            line_no: lines.last().map(|l| l.line_no).unwrap_or(0),
            message: "unterminated if block".into(),
        });
    }
}

fn clone_pos(line: &LogicalLine) -> LogicalLine {
    LogicalLine {
        text: String::new(),
        source_file: line.source_file.clone(),
        line_no: line.line_no,
    }
}

fn strip_kw<'a>(text: &'a str, kw: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(kw)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix(char::is_whitespace).map(|s| s.trim())
        .or_else(|| if rest.chars().next().map(|c| c.is_whitespace()).unwrap_or(false) { Some(rest.trim()) } else { None })
}

/// A tiny calculator over `plugin(name)` (always false: no plugin system
/// exists) and `version` comparisons, combined with `&&`/`||`/`!`/parens.
fn eval_if_expr(expr: &str) -> bool {
    let mut toks = tokenize_if(expr);
    let mut pos = 0;
    eval_or(&mut toks, &mut pos)
}

fn tokenize_if(expr: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' | ')' | '!' => {
                out.push(c.to_string());
                chars.next();
            }
            '&' | '|' => {
                chars.next();
                chars.next();
                out.push(format!("{c}{c}"));
            }
            _ => {
                let mut tok = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '(' || c == ')' || c.is_whitespace() {
                        break;
                    }
                    tok.push(c);
                    chars.next();
                }
                out.push(tok);
            }
        }
    }
    out
}

fn eval_or(toks: &mut [String], pos: &mut usize) -> bool {
    let mut v = eval_and(toks, pos);
    while *pos < toks.len() && toks[*pos] == "||" {
        *pos += 1;
        let rhs = eval_and(toks, pos);
        v = v || rhs;
    }
    v
}

fn eval_and(toks: &mut [String], pos: &mut usize) -> bool {
    let mut v = eval_unary(toks, pos);
    while *pos < toks.len() && toks[*pos] == "&&" {
        *pos += 1;
        let rhs = eval_unary(toks, pos);
        v = v && rhs;
    }
    v
}

fn eval_unary(toks: &mut [String], pos: &mut usize) -> bool {
    if *pos < toks.len() && toks[*pos] == "!" {
        *pos += 1;
        return !eval_unary(toks, pos);
    }
    eval_atom(toks, pos)
}

fn eval_atom(toks: &mut [String], pos: &mut usize) -> bool {
    if *pos >= toks.len() {
        return false;
    }
    if toks[*pos] == "(" {
        *pos += 1;
        let v = eval_or(toks, pos);
        if *pos < toks.len() && toks[*pos] == ")" {
            *pos += 1;
        }
        return v;
    }
    let tok = toks[*pos].clone();
    *pos += 1;
    if let Some(rest) = tok.strip_prefix("plugin(") {
        let _name = rest.trim_end_matches(')');
        return false; // no plugin registry exists
    }
    if tok == "version" {
        // bare `version` token consumed by a following comparison op
        // handled at this same precedence level: `version >= N`
        if *pos + 1 < toks.len() {
            let op = toks[*pos].clone();
            let rhs: f64 = toks[*pos + 1].parse().unwrap_or(0.0);
            *pos += 2;
            const CURRENT_VERSION: f64 = 4.0;
            return match op.as_str() {
                ">=" => CURRENT_VERSION >= rhs,
                "<=" => CURRENT_VERSION <= rhs,
                ">" => CURRENT_VERSION > rhs,
                "<" => CURRENT_VERSION < rhs,
                "==" => (CURRENT_VERSION - rhs).abs() < f64::EPSILON,
                _ => true,
            };
        }
        return true;
    }
    false
}

fn err(line: &LogicalLine, message: &str) -> ConfigError {
    ConfigError {
        source_file: line.source_file.clone(),
        line_no: line.line_no,
        message: message.to_string(),
    }
}

fn rule_mut<'a>(cfg: &'a mut Config, name: &str) -> &'a mut Rule {
    cfg.rules.entry(name.to_string()).or_insert_with(|| Rule {
        name: name.to_string(),
        kind: RuleKind::HeaderExists { header: String::new() },
        tflags: Default::default(),
        scores: [Rule::default_score(name); SCORESET_COUNT],
        description: String::new(),
        priority: 0,
    })
}

fn parse_directive(cfg: &mut Config, line: &LogicalLine, scores_only: bool) {
    let text = &line.text;
    let mut parts = text.splitn(2, char::is_whitespace);
    let Some(keyword) = parts.next() else { return };
    let rest = parts.next().unwrap_or("").trim();

    match keyword {
        "score" => parse_score(cfg, line, rest),
        "describe" => parse_describe(cfg, line, rest),
        "tflags" => parse_tflags(cfg, line, rest),
        "priority" => parse_priority(cfg, line, rest),
        "header" if !scores_only || cfg.allow_user_rules => parse_header_rule(cfg, line, rest),
        "body" if !scores_only || cfg.allow_user_rules => parse_simple_rule(cfg, line, rest, RuleClass::Body),
        "rawbody" if !scores_only || cfg.allow_user_rules => parse_simple_rule(cfg, line, rest, RuleClass::Rawbody),
        "uri" if !scores_only || cfg.allow_user_rules => parse_simple_rule(cfg, line, rest, RuleClass::Uri),
        "full" if !scores_only || cfg.allow_user_rules => parse_simple_rule(cfg, line, rest, RuleClass::Full),
        "meta" if !scores_only || cfg.allow_user_rules => parse_meta(cfg, line, rest),
        "whitelist_from" => cfg.addrlists.add_whitelist_from(rest),
        "unwhitelist_from" => cfg.addrlists.remove_whitelist_from(rest),
        "blacklist_from" if !scores_only => cfg.addrlists.add_blacklist_from(rest),
        "whitelist_to" => cfg.addrlists.add_whitelist_to(rest),
        "more_spam_to" => cfg.addrlists.add_more_spam_to(rest),
        "all_spam_to" => cfg.addrlists.add_all_spam_to(rest),
        "whitelist_from_rcvd" if !scores_only => {
            if let Some((addr, domain)) = rest.split_once(char::is_whitespace) {
                cfg.addrlists.add_whitelist_from_rcvd(addr.trim(), domain.trim());
            } else {
                cfg.errors.push(err(line, "whitelist_from_rcvd requires ADDR DOMAIN"));
            }
        }
        "report" if !scores_only => cfg.templates.append_report(rest),
        "unsafe_report" if !scores_only => cfg.templates.append_unsafe_report(rest),
        "terse_report" if !scores_only => cfg.templates.append_terse_report(rest),
        "spamtrap" if !scores_only => cfg.templates.append_spamtrap(rest),
        "clear_report_template" if !scores_only => cfg.templates.clear(),
        "allow_user_rules" if !scores_only => {
            cfg.allow_user_rules = parse_bool(rest);
            cfg.settings.insert("allow_user_rules".into(), rest.to_string());
        }
        _ => {
            if let Some(def) = directive::lookup(keyword) {
                if scores_only && (def.is_priv || def.is_admin) {
                    cfg.errors.push(err(line, &format!("{keyword}: not permitted in scores-only mode")));
                    return;
                }
                cfg.settings.insert(def.name.to_string(), rest.to_string());
            } else {
                cfg.errors.push(err(line, &format!("unrecognized directive: {keyword}")));
            }
        }
    }
}

enum RuleClass {
    Body,
    Rawbody,
    Uri,
    Full,
}

fn parse_score(cfg: &mut Config, line: &LogicalLine, rest: &str) {
    let mut it = rest.split_whitespace();
    let Some(name) = it.next() else {
        cfg.errors.push(err(line, "score: missing rule name"));
        return;
    };
    if let Err(e) = validate_name(name) {
        cfg.errors.push(err(line, &e));
        return;
    }
    let floats: Vec<f64> = it.filter_map(|s| s.parse().ok()).collect();
    if floats.is_empty() {
        cfg.errors.push(err(line, &format!("score {name}: no numeric value")));
        return;
    }
    rule_mut(cfg, name).apply_score_line(&floats);
}

fn parse_describe(cfg: &mut Config, line: &LogicalLine, rest: &str) {
    let Some((name, desc)) = rest.split_once(char::is_whitespace) else {
        cfg.errors.push(err(line, "describe: missing text"));
        return;
    };
    rule_mut(cfg, name).description = desc.trim().to_string();
}

fn parse_tflags(cfg: &mut Config, line: &LogicalLine, rest: &str) {
    let Some((name, flags)) = rest.split_once(char::is_whitespace) else {
        cfg.errors.push(err(line, "tflags: missing flag list"));
        return;
    };
    let rule = rule_mut(cfg, name);
    for f in flags.split_whitespace() {
        match TFlag::parse(f) {
            Some(flag) => {
                rule.tflags.insert(flag);
            }
            None => cfg.errors.push(err(line, &format!("tflags: unknown flag {f}"))),
        }
    }
}

fn parse_priority(cfg: &mut Config, line: &LogicalLine, rest: &str) {
    let Some((name, prio)) = rest.split_once(char::is_whitespace) else {
        cfg.errors.push(err(line, "priority: missing value"));
        return;
    };
    match prio.trim().parse::<i32>() {
        Ok(p) => rule_mut(cfg, name).priority = p,
        Err(_) => cfg.errors.push(err(line, "priority: not an integer")),
    }
}

/// `header NAME Header =~ /pat/mods [if-unset: DEFAULT]` or `header NAME
/// eval:fn(args)` or `header NAME exists:Header`.
fn parse_header_rule(cfg: &mut Config, line: &LogicalLine, rest: &str) {
    let Some((name, body)) = rest.split_once(char::is_whitespace) else {
        cfg.errors.push(err(line, "header: missing test body"));
        return;
    };
    if let Err(e) = validate_name(name) {
        cfg.errors.push(err(line, &e));
        return;
    }
    let body = body.trim();

    if let Some(rest) = body.strip_prefix("eval:") {
        let (function, args) = parse_eval_call(rest);
        rule_mut(cfg, name).kind = RuleKind::HeaderEval {
            header: String::new(),
            function,
            args,
        };
        return;
    }
    if let Some(header) = body.strip_prefix("exists:") {
        rule_mut(cfg, name).kind = RuleKind::HeaderExists {
            header: header.trim().to_string(),
        };
        return;
    }

    let negate = body.contains("!~");
    let op = if negate { "!~" } else { "=~" };
    let Some((header, tail)) = body.split_once(op) else {
        cfg.errors.push(err(line, &format!("header {name}: expected 'Header =~ /pat/'")));
        return;
    };
    let header = header.trim().to_string();
    let (pattern_part, if_unset) = split_if_unset(tail.trim());
    let Some(pat) = pattern::parse_delimited(pattern_part) else {
        cfg.errors.push(err(line, &format!("header {name}: unparsable pattern {pattern_part:?}")));
        return;
    };
    rule_mut(cfg, name).kind = RuleKind::HeaderRegex {
        header,
        pattern: pattern::to_regex_source(&pat),
        negate,
        if_unset,
    };
}

fn split_if_unset(tail: &str) -> (&str, Option<String>) {
    if let Some(pos) = tail.find("[if-unset:") {
        let pattern_part = tail[..pos].trim();
        let after = &tail[pos + "[if-unset:".len()..];
        let value = after.trim_end_matches(']').trim().to_string();
        (pattern_part, Some(value))
    } else {
        (tail, None)
    }
}

fn parse_eval_call(text: &str) -> (String, Vec<String>) {
    let text = text.trim();
    match text.split_once('(') {
        Some((name, tail)) => {
            let args_str = tail.trim_end_matches(')');
            let args = if args_str.trim().is_empty() {
                Vec::new()
            } else {
                args_str
                    .split(',')
                    .map(|s| s.trim().trim_matches('\'').trim_matches('"').to_string())
                    .collect()
            };
            (name.trim().to_string(), args)
        }
        None => (text.to_string(), Vec::new()),
    }
}

fn parse_simple_rule(cfg: &mut Config, line: &LogicalLine, rest: &str, class: RuleClass) {
    let Some((name, body)) = rest.split_once(char::is_whitespace) else {
        cfg.errors.push(err(line, "rule: missing test body"));
        return;
    };
    if let Err(e) = validate_name(name) {
        cfg.errors.push(err(line, &e));
        return;
    }
    let body = body.trim();
    if let Some(rest) = body.strip_prefix("eval:") {
        let (function, args) = parse_eval_call(rest);
        rule_mut(cfg, name).kind = match class {
            RuleClass::Body => RuleKind::BodyEval { function, args },
            RuleClass::Rawbody => RuleKind::RawbodyEval { function, args },
            RuleClass::Full => RuleKind::FullEval { function, args },
            RuleClass::Uri => {
                cfg.errors.push(err(line, "uri rules do not support eval:"));
                return;
            }
        };
        return;
    }
    let Some(pat) = pattern::parse_delimited(body) else {
        cfg.errors.push(err(line, &format!("{name}: unparsable pattern {body:?}")));
        return;
    };
    let pattern = pattern::to_regex_source(&pat);
    rule_mut(cfg, name).kind = match class {
        RuleClass::Body => RuleKind::BodyRegex { pattern },
        RuleClass::Rawbody => RuleKind::RawbodyRegex { pattern },
        RuleClass::Uri => RuleKind::UriRegex { pattern },
        RuleClass::Full => RuleKind::FullRegex { pattern },
    };
}

fn parse_meta(cfg: &mut Config, line: &LogicalLine, rest: &str) {
    let Some((name, expr)) = rest.split_once(char::is_whitespace) else {
        cfg.errors.push(err(line, "meta: missing expression"));
        return;
    };
    if let Err(e) = validate_name(name) {
        cfg.errors.push(err(line, &e));
        return;
    }
    let expr = expr.trim().to_string();
    if !balanced_tokens(&expr) {
        cfg.errors.push(err(line, &format!("meta {name}: unbalanced expression {expr:?}")));
        return;
    }
    rule_mut(cfg, name).kind = RuleKind::MetaBoolean { expr };
}

/// Balanced-token validation: parentheses must nest correctly and every
/// operator token must separate two operand tokens (no dangling operator
/// at either end or two operators in a row).
fn balanced_tokens(expr: &str) -> bool {
    let mut depth = 0i32;
    for c in expr.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !expr.trim().is_empty()
}

/// §4.2 `finish_parsing`: reclassify rules (already grouped via the
/// `rules` map keyed by name — priority grouping happens in the rule
/// engine's compiler), validate meta references exist and contain no
/// cycles, and check declared scores reference existing rules.
pub fn finish_parsing(cfg: &mut Config) {
    let names: std::collections::HashSet<String> = cfg.rules.keys().cloned().collect();
    let meta_exprs: Vec<(String, String)> = cfg
        .rules
        .iter()
        .filter_map(|(n, r)| match &r.kind {
            RuleKind::MetaBoolean { expr } => Some((n.clone(), expr.clone())),
            _ => None,
        })
        .collect();

    for (name, expr) in &meta_exprs {
        for tok in tokenize_meta_expr(expr) {
            if is_identifier(&tok) && !names.contains(&tok) {
                cfg.errors.push(ConfigError {
                    source_file: None,
                    line_no: 0,
                    message: format!("meta {name}: references undefined rule {tok}"),
                });
            }
        }
        if let Some(cycle) = detect_meta_cycle(name, &meta_exprs) {
            cfg.errors.push(ConfigError {
                source_file: None,
                line_no: 0,
                message: format!("meta {name}: cyclic reference via {cycle}"),
            });
        }
    }
}

fn is_identifier(tok: &str) -> bool {
    let mut chars = tok.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

pub fn tokenize_meta_expr(expr: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut tok = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    tok.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            out.push(tok);
            continue;
        }
        if c.is_ascii_digit() {
            let mut tok = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() || c == '.' {
                    tok.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            out.push(tok);
            continue;
        }
        out.push(c.to_string());
        chars.next();
    }
    out
}

fn detect_meta_cycle(start: &str, metas: &[(String, String)]) -> Option<String> {
    fn visit(
        node: &str,
        metas: &[(String, String)],
        stack: &mut Vec<String>,
    ) -> Option<String> {
        if stack.iter().any(|n| n == node) {
            return Some(format!("{} -> {}", stack.join(" -> "), node));
        }
        let Some((_, expr)) = metas.iter().find(|(n, _)| n == node) else {
            return None;
        };
        stack.push(node.to_string());
        for tok in tokenize_meta_expr(expr) {
            if is_identifier(&tok) && metas.iter().any(|(n, _)| n == &tok) {
                if let Some(c) = visit(&tok, metas, stack) {
                    return Some(c);
                }
            }
        }
        stack.pop();
        None
    }
    let mut stack = Vec::new();
    visit(start, metas, &mut stack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_header_rule_and_score() {
        let cfg = parse(
            "header FOO Subject =~ /\\bwin\\b/i\nscore FOO 2.5\nrequired_hits 5.0",
            false,
            &NullResolver,
        );
        assert!(cfg.errors.is_empty(), "{:?}", cfg.errors);
        let rule = &cfg.rules["FOO"];
        assert_eq!(rule.scores, [2.5; SCORESET_COUNT]);
        assert_eq!(cfg.required_hits(), 5.0);
        match &rule.kind {
            RuleKind::HeaderRegex { header, pattern, negate, .. } => {
                assert_eq!(header, "Subject");
                assert_eq!(pattern, r"(?i)\bwin\b");
                assert!(!negate);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn meta_rule_referencing_unknown_rule_is_an_error() {
        let cfg = parse("meta BAZ FOO && BAR", false, &NullResolver);
        assert_eq!(cfg.errors.len(), 2);
    }

    #[test]
    fn meta_cycle_is_rejected() {
        let cfg = parse("meta A B\nmeta B A\n", false, &NullResolver);
        assert!(cfg.errors.iter().any(|e| e.message.contains("cyclic")));
    }

    #[test]
    fn scores_only_mode_rejects_privileged_directives() {
        let cfg = parse("bayes_path /tmp/x\nscore FOO 1.0", true, &NullResolver);
        assert!(cfg.errors.iter().any(|e| e.message.contains("not permitted")));
    }

    #[test]
    fn t_prefixed_rule_gets_default_low_score() {
        let cfg = parse("header T_FOO Subject =~ /x/", false, &NullResolver);
        assert_eq!(cfg.rules["T_FOO"].scores, [0.01; SCORESET_COUNT]);
    }

    #[test]
    fn if_block_guards_directives() {
        let cfg = parse("if (0)\nscore FOO 9.0\nendif\n", false, &NullResolver);
        assert!(!cfg.rules.contains_key("FOO"));
    }

    #[test]
    fn unbalanced_meta_expression_rejected() {
        let cfg = parse("meta BAZ (FOO && BAR", false, &NullResolver);
        assert!(cfg.errors.iter().any(|e| e.message.contains("unbalanced")));
    }
}
