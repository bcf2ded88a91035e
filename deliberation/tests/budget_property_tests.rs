//! Budget property tests: loop-driven validation of truncation and clamp
//! bounds across varied sizes, budgets and both estimator paths.
//!
//! Tests verify:
//! - Middle truncation fits the budget plus the marker's cost
//! - Text already within budget comes back unchanged
//! - Tail truncation keeps the original ending
//! - Clamped blocks never exceed the shared budget
//! - A zero budget empties every block

use std::sync::Arc;

use deliberation::budget::{self, Tokenizer, Truncator, TRUNCATION_MARKER};
use deliberation::{EstimatorMode, PromptBudget};

/// One token per byte; enough for ASCII fixtures.
struct ByteTokenizer;

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.bytes().map(u32::from).collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        let bytes: Vec<u8> = tokens.iter().map(|t| *t as u8).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn truncators() -> Vec<Truncator> {
    vec![
        Truncator::heuristic(),
        Truncator::with_tokenizer(Arc::new(ByteTokenizer)),
    ]
}

/// Deterministic filler with word boundaries and a recognisable ending.
fn filler(len: usize, seed: usize) -> String {
    let words = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"];
    let mut out = String::with_capacity(len + 8);
    let mut i = seed;
    while out.len() < len {
        out.push_str(words[i % words.len()]);
        out.push(' ');
        i += 1;
    }
    out.truncate(len);
    out
}

// ── Property: middle truncation bound ──────────────────────────────

#[test]
fn prop_middle_truncation_fits_budget() {
    for t in truncators() {
        for len in [0, 10, 500, 5_000, 60_000] {
            for budget in [1, 5, 7, 50, 400, 2_000] {
                let text = filler(len, len + budget);
                let out = t.truncate_middle(&text, budget);
                assert!(
                    t.estimate(&out) <= budget + t.marker_cost(),
                    "mode={} len={} budget={}: got {} tokens",
                    t.mode(),
                    len,
                    budget,
                    t.estimate(&out)
                );
            }
        }
    }
}

#[test]
fn prop_within_budget_is_noop() {
    for t in truncators() {
        for len in [0, 1, 30, 300] {
            let text = filler(len, 3);
            let budget = t.estimate(&text).max(1);
            assert_eq!(t.truncate_middle(&text, budget), text);
            assert_eq!(t.truncate_tail(&text, budget), text);
        }
    }
}

#[test]
fn prop_truncation_is_idempotent() {
    for t in truncators() {
        for budget in [20, 200, 900] {
            let once = t.truncate_middle(&filler(20_000, budget), budget);
            let marker_slack = t.marker_cost();
            let twice = t.truncate_middle(&once, budget + marker_slack);
            assert_eq!(once, twice, "mode={} budget={}", t.mode(), budget);
        }
    }
}

// ── Property: tail truncation keeps the ending ─────────────────────

#[test]
fn prop_tail_keeps_ending() {
    for t in truncators() {
        for budget in [25, 100, 1_000] {
            let text = format!("{}END", filler(30_000, budget));
            let out = t.truncate_tail(&text, budget);
            assert!(out.ends_with("END"), "mode={} budget={}", t.mode(), budget);
            assert!(out.starts_with(TRUNCATION_MARKER));
            assert!(t.estimate(&out) <= budget + t.marker_cost());
        }
    }
}

// ── Property: clamp bound ──────────────────────────────────────────

#[test]
fn prop_clamp_fits_total() {
    for t in truncators() {
        for block_count in [1, 2, 3, 5, 8] {
            for total in [1, 3, 10, 100, 1_500, 6_000] {
                let texts: Vec<String> = (0..block_count)
                    .map(|i| filler(1_000 * (i + 1) * (i + 1), i))
                    .collect();
                let names: Vec<String> = (0..block_count).map(|i| format!("block{i}")).collect();
                let blocks: Vec<(&str, &str)> = names
                    .iter()
                    .zip(&texts)
                    .map(|(n, s)| (n.as_str(), s.as_str()))
                    .collect();

                let clamped = t.clamp_many_blocks(&blocks, total);
                assert_eq!(clamped.len(), block_count);
                let joined = t.estimate(&clamped.joined());
                assert!(
                    joined <= total,
                    "mode={} blocks={} total={}: joined={}",
                    t.mode(),
                    block_count,
                    total,
                    joined
                );
            }
        }
    }
}

#[test]
fn prop_clamp_zero_total_empties_all() {
    for t in truncators() {
        let clamped = t.clamp_many_blocks(&[("a", "some text"), ("b", ""), ("c", "more")], 0);
        assert!(clamped.iter().all(|(_, text)| text.is_empty()));
        assert_eq!(clamped.joined(), "");
    }
}

// ── Scenarios ──────────────────────────────────────────────────────

#[test]
fn scenario_huge_single_text() {
    let out = budget::truncate_middle(&"A".repeat(200_000), 1_000);
    assert!(out.contains(TRUNCATION_MARKER));
    assert!(budget::estimate_tokens(&out) <= 1_100);
}

#[test]
fn scenario_tail_ends_with_marker_word() {
    let text = format!("{}END", "x".repeat(90_000));
    let out = budget::truncate_tail(&text, 500);
    assert!(out.ends_with("END"));
}

#[test]
fn scenario_three_large_blocks() {
    let big = "B".repeat(50_000);
    let clamped = budget::clamp_many_blocks(&[("one", &big), ("two", &big), ("three", &big)], 1_500);
    assert!(budget::estimate_tokens(&clamped.joined()) <= 1_700);
}

#[test]
fn scenario_default_budget() {
    assert_eq!(PromptBudget::new(12_000, 2_048).content_budget_tokens(), 9_952);
    assert_eq!(Truncator::default().mode(), EstimatorMode::Heuristic);
}
