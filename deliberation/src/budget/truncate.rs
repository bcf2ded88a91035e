//! Truncation policies: middle-preserving and tail-preserving.
//!
//! Both policies are no-ops when the text already fits, so re-truncating
//! truncated output is idempotent. Output fits `max_tokens` plus at most the
//! marker's own cost.
//!
//! With an exact tokenizer the cut points fall on token boundaries. Without
//! one, cut points are computed in characters at [`CHARS_PER_TOKEN`], the same
//! ratio the heuristic estimator divides by, so a character cut never
//! produces output the estimator would count as over budget.

use std::sync::Arc;

use tracing::debug;

use super::estimator::{
    EstimatorMode, HeuristicEstimator, TokenEstimator, Tokenizer, TokenizerEstimator,
    CHARS_PER_TOKEN,
};

/// Inserted wherever content was elided.
pub const TRUNCATION_MARKER: &str = "\n...<truncated>...\n";

#[derive(Clone)]
enum Backend {
    Heuristic(HeuristicEstimator),
    Exact(TokenizerEstimator),
}

/// Token-aware truncator. Cheap to clone.
#[derive(Clone)]
pub struct Truncator {
    backend: Backend,
    marker: Arc<str>,
}

impl std::fmt::Debug for Truncator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Truncator")
            .field("mode", &self.mode())
            .field("marker", &self.marker)
            .finish()
    }
}

impl Default for Truncator {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl Truncator {
    /// Character-ratio truncator (no tokenizer available).
    pub fn heuristic() -> Self {
        Self {
            backend: Backend::Heuristic(HeuristicEstimator),
            marker: Arc::from(TRUNCATION_MARKER),
        }
    }

    /// Exact truncator cutting on token boundaries.
    pub fn with_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            backend: Backend::Exact(TokenizerEstimator::new(tokenizer)),
            marker: Arc::from(TRUNCATION_MARKER),
        }
    }

    /// Select exact mode when a tokenizer is supplied, heuristic otherwise.
    pub fn select(tokenizer: Option<Arc<dyn Tokenizer>>) -> Self {
        match tokenizer {
            Some(t) => Self::with_tokenizer(t),
            None => Self::heuristic(),
        }
    }

    /// Replace the truncation marker.
    pub fn with_marker(mut self, marker: &str) -> Self {
        self.marker = Arc::from(marker);
        self
    }

    /// The marker inserted at cut points.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Estimated cost of the marker itself.
    pub fn marker_cost(&self) -> usize {
        self.estimate(&self.marker)
    }

    /// Estimate tokens with the active backend.
    pub fn estimate(&self, text: &str) -> usize {
        match &self.backend {
            Backend::Heuristic(h) => h.estimate(text),
            Backend::Exact(e) => e.estimate(text),
        }
    }

    /// Which estimation path is active.
    pub fn mode(&self) -> EstimatorMode {
        match &self.backend {
            Backend::Heuristic(h) => h.mode(),
            Backend::Exact(e) => e.mode(),
        }
    }

    /// Keep head and tail, elide the middle.
    pub fn truncate_middle(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }
        if self.estimate(text) <= max_tokens {
            return text.to_string();
        }

        let out = match &self.backend {
            Backend::Heuristic(_) => self.middle_by_chars(text, max_tokens),
            Backend::Exact(e) => self.middle_by_tokens(e.tokenizer().as_ref(), text, max_tokens),
        };
        debug!(
            max_tokens,
            before = self.estimate(text),
            after = self.estimate(&out),
            "middle truncation"
        );
        out
    }

    /// Keep only the most recent portion, discarding the head.
    pub fn truncate_tail(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }
        if self.estimate(text) <= max_tokens {
            return text.to_string();
        }

        let out = match &self.backend {
            Backend::Heuristic(_) => self.tail_by_chars(text, max_tokens),
            Backend::Exact(e) => self.tail_by_tokens(e.tokenizer().as_ref(), text, max_tokens),
        };
        debug!(
            max_tokens,
            before = self.estimate(text),
            after = self.estimate(&out),
            "tail truncation"
        );
        out
    }

    fn middle_by_chars(&self, text: &str, max_tokens: usize) -> String {
        let budget_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
        let marker_chars = self.marker.chars().count();
        if marker_chars >= budget_chars {
            return last_chars(text, budget_chars).to_string();
        }

        let available = budget_chars - marker_chars;
        let head_n = available.div_ceil(2);
        let tail_n = available - head_n;
        format!(
            "{}{}{}",
            first_chars(text, head_n).trim_end(),
            self.marker,
            last_chars(text, tail_n).trim_start()
        )
    }

    fn tail_by_chars(&self, text: &str, max_tokens: usize) -> String {
        let budget_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
        let marker_chars = self.marker.chars().count();
        if marker_chars >= budget_chars {
            return last_chars(text, budget_chars).to_string();
        }

        let tail_n = budget_chars - marker_chars;
        format!("{}{}", self.marker, last_chars(text, tail_n).trim_start())
    }

    fn middle_by_tokens(&self, tok: &dyn Tokenizer, text: &str, max_tokens: usize) -> String {
        let tokens = tok.encode(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        let marker_tokens = tok.encode(&self.marker).len();
        if marker_tokens >= max_tokens {
            return tok.decode(&tokens[tokens.len() - max_tokens..]);
        }

        let available = max_tokens - marker_tokens;
        let head_n = available.div_ceil(2);
        let tail_n = available - head_n;
        format!(
            "{}{}{}",
            tok.decode(&tokens[..head_n]).trim_end(),
            self.marker,
            tok.decode(&tokens[tokens.len() - tail_n..]).trim_start()
        )
    }

    fn tail_by_tokens(&self, tok: &dyn Tokenizer, text: &str, max_tokens: usize) -> String {
        let tokens = tok.encode(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        let marker_tokens = tok.encode(&self.marker).len();
        if marker_tokens >= max_tokens {
            return tok.decode(&tokens[tokens.len() - max_tokens..]);
        }

        let tail_n = max_tokens - marker_tokens;
        format!(
            "{}{}",
            self.marker,
            tok.decode(&tokens[tokens.len() - tail_n..]).trim_start()
        )
    }
}

/// First `n` characters of `text`, cut on a char boundary.
fn first_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Last `n` characters of `text`, cut on a char boundary.
fn last_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::estimator::tests::CharTokenizer;

    #[test]
    fn test_middle_noop_below_budget() {
        let t = Truncator::heuristic();
        let text = "short text that fits";
        assert_eq!(t.truncate_middle(text, 100), text);
    }

    #[test]
    fn test_middle_zero_budget_is_empty() {
        let t = Truncator::heuristic();
        assert_eq!(t.truncate_middle("anything", 0), "");
        assert_eq!(t.truncate_tail("anything", 0), "");
    }

    #[test]
    fn test_middle_large_input_scenario() {
        let t = Truncator::heuristic();
        let text = "A".repeat(200_000);
        let out = t.truncate_middle(&text, 1000);
        assert!(out.contains("<truncated>"));
        assert!(t.estimate(&out) <= 1100);
        assert!(t.estimate(&out) <= 1000 + t.marker_cost());
    }

    #[test]
    fn test_middle_keeps_head_and_tail() {
        let t = Truncator::heuristic();
        let text = format!("HEAD{}TAIL", "m".repeat(5_000));
        let out = t.truncate_middle(&text, 100);
        assert!(out.starts_with("HEAD"));
        assert!(out.ends_with("TAIL"));
        assert!(out.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn test_middle_head_gets_larger_half() {
        // Marker-free truncator so the split is easy to observe: budget 9 chars.
        let t = Truncator::heuristic().with_marker("|");
        let text = "abcdefghijklmnopqrstuvwxyz";
        let out = t.truncate_middle(text, 3);
        // 9 chars - 1 marker = 8 → head 4, tail 4
        assert_eq!(out, "abcd|wxyz");

        let out = t.truncate_middle(text, 4);
        // 12 - 1 = 11 → head 6, tail 5
        assert_eq!(out, "abcdef|vwxyz");
    }

    #[test]
    fn test_middle_trims_whitespace_at_cut() {
        let t = Truncator::heuristic().with_marker("|");
        let text = format!("abc   {}   xyz", "-".repeat(100));
        let out = t.truncate_middle(&text, 3);
        assert!(!out.contains(" |"));
        assert!(!out.contains("| "));
    }

    #[test]
    fn test_middle_marker_does_not_fit_returns_tail() {
        let t = Truncator::heuristic();
        let text = "x".repeat(100) + "end";
        // 5 tokens → 15 chars, marker is 19 chars.
        let out = t.truncate_middle(&text, 5);
        assert!(!out.contains("<truncated>"));
        assert!(out.ends_with("end"));
        assert_eq!(out.chars().count(), 15);
    }

    #[test]
    fn test_middle_idempotent() {
        let t = Truncator::heuristic();
        let text = "lorem ipsum dolor sit amet ".repeat(500);
        let once = t.truncate_middle(&text, 200);
        let twice = t.truncate_middle(&once, 200);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_tail_keeps_end_scenario() {
        let t = Truncator::heuristic();
        let text = format!("start\n{}\nEND", "x".repeat(10_000));
        let out = t.truncate_tail(&text, 200);
        assert!(out.ends_with("END"));
        assert!(out.starts_with(TRUNCATION_MARKER));
        assert!(!out.contains("start"));
        assert!(t.estimate(&out) <= 200);
    }

    #[test]
    fn test_tail_noop_below_budget() {
        let t = Truncator::heuristic();
        assert_eq!(t.truncate_tail("recent turn", 50), "recent turn");
    }

    #[test]
    fn test_multibyte_cut_is_char_safe() {
        let t = Truncator::heuristic();
        let text = "日本語のテキスト".repeat(200);
        let mid = t.truncate_middle(&text, 20);
        let tail = t.truncate_tail(&text, 20);
        assert!(t.estimate(&mid) <= 20);
        assert!(t.estimate(&tail) <= 20);
    }

    #[test]
    fn test_exact_mode_cuts_on_tokens() {
        let t = Truncator::with_tokenizer(Arc::new(CharTokenizer)).with_marker("|");
        assert_eq!(t.mode(), EstimatorMode::Exact);
        let out = t.truncate_middle("abcdefghij", 5);
        // 5 - 1 marker = 4 → head 2, tail 2
        assert_eq!(out, "ab|ij");
        let out = t.truncate_tail("abcdefghij", 5);
        assert_eq!(out, "|ghij");
    }

    #[test]
    fn test_exact_marker_does_not_fit() {
        let t = Truncator::with_tokenizer(Arc::new(CharTokenizer));
        let out = t.truncate_middle(&"z".repeat(50), 4);
        assert_eq!(out, "zzzz");
    }

    #[test]
    fn test_select_falls_back_to_heuristic() {
        assert_eq!(Truncator::select(None).mode(), EstimatorMode::Heuristic);
        assert_eq!(
            Truncator::select(Some(Arc::new(CharTokenizer))).mode(),
            EstimatorMode::Exact
        );
    }

    #[test]
    fn test_char_helpers() {
        assert_eq!(first_chars("héllo", 2), "hé");
        assert_eq!(last_chars("héllo", 4), "éllo");
        assert_eq!(last_chars("abc", 0), "");
        assert_eq!(last_chars("abc", 10), "abc");
        assert_eq!(first_chars("abc", 10), "abc");
    }
}
