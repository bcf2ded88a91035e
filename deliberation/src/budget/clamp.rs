//! Multi-block clamping: fit several named prompt blocks into one shared budget.
//!
//! Each block first gets an equal share and is middle-truncated to it. Because
//! character-based cuts can overshoot slightly once blocks are joined, a greedy
//! pass then shrinks the single largest block by 10% at a time until the
//! joined estimate fits. This is a heuristic, not an optimal packing: callers
//! should rely on the total bound, never on exact per-block sizes.

use tracing::{debug, warn};

use super::truncate::Truncator;

/// Separator used when clamped blocks are joined into a prompt.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Hard cap on shrink iterations. Each iteration strictly shrinks or empties
/// one block, so the cap only guards against a misbehaving tokenizer.
const MAX_SHRINK_ITERATIONS: usize = 10_000;

/// Clamped blocks in their original order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClampedBlocks {
    blocks: Vec<(String, String)>,
}

impl ClampedBlocks {
    /// Clamped text for `name`, or `""` if no such block was supplied.
    pub fn get(&self, name: &str) -> &str {
        self.blocks
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, text)| text.as_str())
            .unwrap_or("")
    }

    /// Non-empty blocks joined with [`BLOCK_SEPARATOR`].
    pub fn joined(&self) -> String {
        join_non_empty(&self.blocks)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.blocks.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn join_non_empty(blocks: &[(String, String)]) -> String {
    blocks
        .iter()
        .map(|(_, text)| text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

impl Truncator {
    /// Clamp named blocks so their joined estimate fits `total_tokens`.
    ///
    /// `total_tokens == 0` empties every block.
    pub fn clamp_many_blocks(&self, blocks: &[(&str, &str)], total_tokens: usize) -> ClampedBlocks {
        if total_tokens == 0 {
            return ClampedBlocks {
                blocks: blocks
                    .iter()
                    .map(|(name, _)| (name.to_string(), String::new()))
                    .collect(),
            };
        }
        if blocks.is_empty() {
            return ClampedBlocks::default();
        }

        let per_block = (total_tokens / blocks.len()).max(1);
        let mut clamped: Vec<(String, String)> = blocks
            .iter()
            .map(|(name, text)| (name.to_string(), self.truncate_middle(text, per_block)))
            .collect();

        let mut joined_tokens = self.estimate(&join_non_empty(&clamped));
        let mut iterations = 0;
        while joined_tokens > total_tokens {
            if iterations >= MAX_SHRINK_ITERATIONS {
                warn!(
                    total_tokens,
                    joined_tokens, "clamp shrink cap reached; returning best effort"
                );
                break;
            }
            iterations += 1;

            let Some((idx, size)) = self.largest_block(&clamped) else {
                break;
            };
            let target = (size * 9 / 10).max(1);
            let shrunk = self.truncate_middle(&clamped[idx].1, target);
            if self.estimate(&shrunk) >= size {
                // Already at the 1-token floor; drop the block entirely.
                clamped[idx].1.clear();
            } else {
                clamped[idx].1 = shrunk;
            }
            joined_tokens = self.estimate(&join_non_empty(&clamped));
        }

        debug!(
            blocks = clamped.len(),
            per_block,
            total_tokens,
            joined_tokens,
            iterations,
            "clamped blocks"
        );
        ClampedBlocks { blocks: clamped }
    }

    /// Index and estimate of the largest non-empty block (first on ties).
    fn largest_block(&self, blocks: &[(String, String)]) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, (_, text)) in blocks.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            let size = self.estimate(text);
            if best.is_none_or(|(_, b)| size > b) {
                best = Some((idx, size));
            }
        }
        best
    }
}
