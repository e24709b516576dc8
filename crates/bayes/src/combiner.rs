/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Robinson's f(w) smoothing and the naive / chi-squared combiners that
//! turn a bag of per-token probabilities into a single spam score
//! (§4.4 "Scan").

use crate::store::TokenCounts;

/// Minimum learned-message counts (per class) below which scanning
/// returns a neutral score instead of attempting to classify.
pub const MIN_CORPUS_SIZE: u64 = 200;

const NAIVE_S: f64 = 0.160;
const NAIVE_X: f64 = 0.600;
const CHI2_S: f64 = 0.373;
const CHI2_X: f64 = 0.538;

const PROB_MIN: f64 = 0.001;
const PROB_MAX: f64 = 0.999;

/// Maximum number of most-interesting tokens fed to the combiner.
pub const MAX_TOKENS: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combiner {
    Naive,
    ChiSquare,
}

/// Robinson's f(w): blends the token's observed spam/ham skew with a
/// corpus-wide prior (`x`), weighted by how many times the token has
/// been seen (`s` acts as a virtual observation count). `s`/`x` differ
/// between the naive and chi-squared combiners (§4.4).
fn robinson_fw(counts: TokenCounts, nspam: u64, nham: u64, combiner: Combiner) -> f64 {
    let (s, x) = match combiner {
        Combiner::Naive => (NAIVE_S, NAIVE_X),
        Combiner::ChiSquare => (CHI2_S, CHI2_X),
    };
    let spam_freq = if nspam > 0 {
        (counts.spam as f64 / nspam as f64).min(1.0)
    } else {
        0.0
    };
    let ham_freq = if nham > 0 {
        (counts.ham as f64 / nham as f64).min(1.0)
    } else {
        0.0
    };
    let denom = spam_freq + ham_freq;
    if denom == 0.0 {
        return 0.5;
    }
    let prob = spam_freq / denom;
    let n = (counts.spam + counts.ham) as f64;
    let fw = (s * x + n * prob) / (s + n);
    fw.clamp(PROB_MIN, PROB_MAX)
}

/// Computes each candidate token's f(w) and keeps the `MAX_TOKENS` most
/// distinctive ones (by distance from neutral 0.5), tie-broken by the
/// token's own byte ordering so the choice is deterministic.
pub fn select_interesting(
    tokens: &[(String, TokenCounts)],
    nspam: u64,
    nham: u64,
    combiner: Combiner,
) -> Vec<f64> {
    let mut scored: Vec<(f64, &str)> = tokens
        .iter()
        .map(|(tok, counts)| (robinson_fw(*counts, nspam, nham, combiner), tok.as_str()))
        .collect();
    scored.sort_by(|a, b| {
        let dist_a = (a.0 - 0.5).abs();
        let dist_b = (b.0 - 0.5).abs();
        dist_b.partial_cmp(&dist_a).unwrap().then_with(|| a.1.cmp(b.1))
    });
    scored.truncate(MAX_TOKENS);
    scored.into_iter().map(|(p, _)| p).collect()
}

/// Graham-style naive combiner (§4.4): `H = 1 - (prod(1-p))^(1/N)` and
/// `S = 1 - (prod(p))^(1/N)` are the geometric-mean-rooted ham/spam
/// indicators, folded into `(1 + (H-S)/(H+S)) / 2`. Both products are
/// accumulated in log space and only exponentiated once, after dividing
/// by `N`, so a long token list never underflows to zero first.
pub fn naive_combine(probs: &[f64]) -> f64 {
    if probs.is_empty() {
        return 0.5;
    }
    let n = probs.len() as f64;
    let log_p: f64 = probs.iter().map(|p| p.ln()).sum();
    let log_q: f64 = probs.iter().map(|p| (1.0 - p).ln()).sum();
    let s = 1.0 - (log_p / n).exp();
    let h = 1.0 - (log_q / n).exp();
    if h + s == 0.0 {
        0.5
    } else {
        ((1.0 + (h - s) / (h + s)) / 2.0).clamp(0.0, 1.0)
    }
}

/// Upper-tail probability of the chi-squared distribution with even
/// degrees of freedom `v`, evaluated via its closed-form series. `x`
/// must be `>= 0`.
fn chi2q(x: f64, v: usize) -> f64 {
    let m = x / 2.0;
    let mut term = (-m).exp();
    let mut sum = term;
    let terms = v / 2;
    for i in 1..terms {
        term *= m / i as f64;
        sum += term;
    }
    sum.min(1.0)
}

/// Fisher/chi-squared combiner: treats `-2 * sum(ln p_i)` as chi-squared
/// distributed with `2n` degrees of freedom under the null hypothesis
/// that the message is ham (and symmetrically for spam), then folds the
/// two tail probabilities into a single `[0, 1]` score.
pub fn chi_square_combine(probs: &[f64]) -> f64 {
    let n = probs.len();
    if n == 0 {
        return 0.5;
    }
    let log_p: f64 = probs.iter().map(|p| p.ln()).sum();
    let log_q: f64 = probs.iter().map(|p| (1.0 - p).ln()).sum();
    let h = chi2q(-2.0 * log_p, 2 * n);
    let s = chi2q(-2.0 * log_q, 2 * n);
    ((1.0 + h - s) / 2.0).clamp(0.0, 1.0)
}

pub fn combine(probs: &[f64], combiner: Combiner) -> f64 {
    match combiner {
        Combiner::Naive => naive_combine(probs),
        Combiner::ChiSquare => chi_square_combine(probs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(spam: u32, ham: u32) -> TokenCounts {
        TokenCounts { spam, ham, atime: 0 }
    }

    #[test]
    fn robinson_fw_leans_spam_for_spam_only_token() {
        let fw = robinson_fw(counts(10, 0), 1000, 1000, Combiner::Naive);
        assert!(fw > 0.5);
    }

    #[test]
    fn robinson_fw_leans_ham_for_ham_only_token() {
        let fw = robinson_fw(counts(0, 10), 1000, 1000, Combiner::Naive);
        assert!(fw < 0.5);
    }

    #[test]
    fn robinson_fw_is_clamped() {
        let fw = robinson_fw(counts(10_000, 0), 10_000, 10_000, Combiner::Naive);
        assert!(fw <= PROB_MAX);
    }

    #[test]
    fn select_interesting_caps_at_max_tokens() {
        let tokens: Vec<(String, TokenCounts)> = (0..300)
            .map(|i| (format!("tok{i}"), counts((i % 5) as u32, 1)))
            .collect();
        let selected = select_interesting(&tokens, 1000, 1000, Combiner::Naive);
        assert_eq!(selected.len(), MAX_TOKENS);
    }

    #[test]
    fn naive_combine_matches_spec_formula_exactly() {
        // H = 1 - (0.1 * 0.1)^(1/2) = 0.9, S = 1 - (0.9 * 0.9)^(1/2) = 0.1
        // (1 + (H-S)/(H+S)) / 2 = (1 + 0.8/1.0) / 2 = 0.9
        let probs = vec![0.9, 0.9];
        assert!((naive_combine(&probs) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn naive_combine_all_spam_leans_high() {
        let probs = vec![0.99, 0.98, 0.97];
        assert!(naive_combine(&probs) > 0.9);
    }

    #[test]
    fn naive_combine_all_ham_leans_low() {
        let probs = vec![0.01, 0.02, 0.03];
        assert!(naive_combine(&probs) < 0.1);
    }

    #[test]
    fn chi_square_combine_all_spam_leans_high() {
        let probs = vec![0.99, 0.98, 0.97, 0.96];
        assert!(chi_square_combine(&probs) > 0.9);
    }

    #[test]
    fn chi_square_combine_mixed_is_near_neutral() {
        let probs = vec![0.5, 0.5, 0.5, 0.5];
        let score = chi_square_combine(&probs);
        assert!((score - 0.5).abs() < 0.2);
    }

    #[test]
    fn chi2q_of_zero_is_one() {
        assert!((chi2q(0.0, 10) - 1.0).abs() < 1e-9);
    }
}
