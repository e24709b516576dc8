/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::AHashMap;
use sa_config::parser::tokenize_meta_expr;

/// Evaluates a validated meta-rule expression, substituting each rule-name
/// token with its current hit value (1.0 if hit, 0.0 otherwise — this
/// implementation does not track per-rule hit *counts*, only hit/not-hit,
/// which is sufficient since no non-meta rule can hit more than once per
/// message). A meta rule hits when the result is non-zero (§4.3).
pub fn eval_meta(expr: &str, hits: &AHashMap<String, f64>) -> f64 {
    let toks = tokenize_meta_expr(expr);
    let mut pos = 0;
    eval_or(&toks, &mut pos, hits)
}

fn lookup(tok: &str, hits: &AHashMap<String, f64>) -> f64 {
    if let Ok(n) = tok.parse::<f64>() {
        return n;
    }
    hits.get(tok).copied().unwrap_or(0.0)
}

fn eval_or(toks: &[String], pos: &mut usize, hits: &AHashMap<String, f64>) -> f64 {
    let mut v = eval_and(toks, pos, hits);
    while *pos < toks.len() && toks[*pos] == "||" {
        *pos += 1;
        let rhs = eval_and(toks, pos, hits);
        v = bool_to_f(nonzero(v) || nonzero(rhs));
    }
    v
}

fn eval_and(toks: &[String], pos: &mut usize, hits: &AHashMap<String, f64>) -> f64 {
    let mut v = eval_cmp(toks, pos, hits);
    while *pos < toks.len() && toks[*pos] == "&&" {
        *pos += 1;
        let rhs = eval_cmp(toks, pos, hits);
        v = bool_to_f(nonzero(v) && nonzero(rhs));
    }
    v
}

fn eval_cmp(toks: &[String], pos: &mut usize, hits: &AHashMap<String, f64>) -> f64 {
    let v = eval_add(toks, pos, hits);
    if *pos < toks.len() {
        let op = toks[*pos].as_str();
        if matches!(op, "==" | "!=" | ">=" | "<=" | ">" | "<") {
            *pos += 1;
            let rhs = eval_add(toks, pos, hits);
            return bool_to_f(match op {
                "==" => v == rhs,
                "!=" => v != rhs,
                ">=" => v >= rhs,
                "<=" => v <= rhs,
                ">" => v > rhs,
                "<" => v < rhs,
                _ => unreachable!(),
            });
        }
    }
    v
}

fn eval_add(toks: &[String], pos: &mut usize, hits: &AHashMap<String, f64>) -> f64 {
    let mut v = eval_mul(toks, pos, hits);
    while *pos < toks.len() && (toks[*pos] == "+" || toks[*pos] == "-") {
        let op = toks[*pos].clone();
        *pos += 1;
        let rhs = eval_mul(toks, pos, hits);
        v = if op == "+" { v + rhs } else { v - rhs };
    }
    v
}

fn eval_mul(toks: &[String], pos: &mut usize, hits: &AHashMap<String, f64>) -> f64 {
    let mut v = eval_unary(toks, pos, hits);
    while *pos < toks.len() && (toks[*pos] == "*" || toks[*pos] == "/") {
        let op = toks[*pos].clone();
        *pos += 1;
        let rhs = eval_unary(toks, pos, hits);
        v = if op == "*" {
            v * rhs
        } else if rhs != 0.0 {
            v / rhs
        } else {
            0.0
        };
    }
    v
}

fn eval_unary(toks: &[String], pos: &mut usize, hits: &AHashMap<String, f64>) -> f64 {
    if *pos < toks.len() && toks[*pos] == "!" {
        *pos += 1;
        let v = eval_unary(toks, pos, hits);
        return bool_to_f(!nonzero(v));
    }
    if *pos < toks.len() && toks[*pos] == "-" {
        *pos += 1;
        return -eval_unary(toks, pos, hits);
    }
    eval_atom(toks, pos, hits)
}

fn eval_atom(toks: &[String], pos: &mut usize, hits: &AHashMap<String, f64>) -> f64 {
    if *pos >= toks.len() {
        return 0.0;
    }
    if toks[*pos] == "(" {
        *pos += 1;
        let v = eval_or(toks, pos, hits);
        if *pos < toks.len() && toks[*pos] == ")" {
            *pos += 1;
        }
        return v;
    }
    let tok = toks[*pos].clone();
    *pos += 1;
    lookup(&tok, hits)
}

fn nonzero(v: f64) -> bool {
    v != 0.0
}

fn bool_to_f(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(pairs: &[(&str, f64)]) -> AHashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn and_of_two_hit_rules() {
        let h = hits(&[("FOO", 1.0), ("BAR", 1.0)]);
        assert_eq!(eval_meta("FOO && BAR", &h), 1.0);
    }

    #[test]
    fn and_with_one_miss_is_zero() {
        let h = hits(&[("FOO", 1.0), ("BAR", 0.0)]);
        assert_eq!(eval_meta("FOO && BAR", &h), 0.0);
    }

    #[test]
    fn negation() {
        let h = hits(&[("FOO", 0.0)]);
        assert_eq!(eval_meta("!FOO", &h), 1.0);
    }

    #[test]
    fn arithmetic_sum_threshold() {
        let h = hits(&[("A", 1.0), ("B", 1.0), ("C", 0.0)]);
        assert_eq!(eval_meta("(A + B + C) >= 2", &h), 1.0);
    }
}
