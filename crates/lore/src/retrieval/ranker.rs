//! Result ranking with a same-type diversity penalty
//!
//! Items are first put in descending score order (stable, NaN last). The
//! output is then built greedily: each step takes the remaining item with
//! the highest effective score, where
//!
//! ```text
//! effective = score - diversity_penalty * (already selected items of the same type)
//! ```
//!
//! Ties go to the item that came first in score order, so equal inputs keep
//! their original relative order.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::memory::types::Memory;

pub const DEFAULT_DIVERSITY_PENALTY: f64 = 0.05;

/// A memory with its relevance score, as produced by the scorer
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub score: f64,
}

impl ScoredMemory {
    pub fn new(memory: Memory, score: f64) -> Self {
        Self { memory, score }
    }
}

#[derive(Debug, Clone)]
pub struct RankedMemory {
    pub memory: Memory,
    pub score: f64,
    /// Score after the diversity penalty at the position it was selected
    pub effective_score: f64,
}

#[derive(Debug, Clone)]
pub struct ResultRanker {
    diversity_penalty: f64,
}

impl Default for ResultRanker {
    fn default() -> Self {
        Self::new(DEFAULT_DIVERSITY_PENALTY)
    }
}

impl ResultRanker {
    /// Negative or NaN penalties are treated as zero
    pub fn new(diversity_penalty: f64) -> Self {
        Self {
            diversity_penalty: if diversity_penalty > 0.0 {
                diversity_penalty
            } else {
                0.0
            },
        }
    }

    pub fn diversity_penalty(&self) -> f64 {
        self.diversity_penalty
    }

    pub fn rank(&self, items: Vec<ScoredMemory>) -> Vec<RankedMemory> {
        let mut remaining = items;
        // stable: equal scores keep input order
        remaining.sort_by(|a, b| score_order(b.score, a.score));

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut ranked = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let mut best = 0;
            let mut best_effective = self.effective(&remaining[0], &seen);
            for (i, item) in remaining.iter().enumerate().skip(1) {
                let effective = self.effective(item, &seen);
                if score_order(effective, best_effective) == Ordering::Greater {
                    best = i;
                    best_effective = effective;
                }
            }

            let item = remaining.remove(best);
            *seen.entry(item.memory.type_name().to_string()).or_insert(0) += 1;
            ranked.push(RankedMemory {
                memory: item.memory,
                score: item.score,
                effective_score: best_effective,
            });
        }
        ranked
    }

    fn effective(&self, item: &ScoredMemory, seen: &HashMap<String, usize>) -> f64 {
        let repeats = seen.get(item.memory.type_name()).copied().unwrap_or(0);
        item.score - self.diversity_penalty * repeats as f64
    }
}

/// Total order on scores with NaN below everything, including -inf
fn score_order(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}
