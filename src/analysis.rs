//! The structured verdict produced from a model reply.
//!
//! [`AnalysisResult`] is always fully populated: downstream code (overlay,
//! report, status clients) never has to branch on a missing key. The lenient
//! construction from arbitrary JSON lives in [`crate::pipeline::extract`];
//! this module only holds the types and their invariants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

/// Risk classification used per chunk and for the whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Case-insensitive parse. Anything unrecognised is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The model's reasoning for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    /// 1-based chunk index.
    pub chunk: u32,
    /// 1 (guess) to 10 (certain).
    pub confidence: u8,
    pub risk: RiskLevel,
    pub reasoning: String,
}

impl Explanation {
    pub const MIN_CONFIDENCE: u8 = 1;
    pub const MAX_CONFIDENCE: u8 = 10;
}

/// Tamper verdict for one page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Flagged chunk indices. Serialised as a sorted array.
    pub suspicious_chunks: BTreeSet<u32>,
    pub explanation: Vec<Explanation>,
    pub overall_risk: RiskLevel,
}

impl AnalysisResult {
    /// `true` when nothing was flagged.
    pub fn is_clear(&self) -> bool {
        self.suspicious_chunks.is_empty()
    }

    /// Flagged indices in ascending order.
    pub fn tampered_chunks(&self) -> Vec<u32> {
        self.suspicious_chunks.iter().copied().collect()
    }

    /// Drop every index outside `1..=chunk_count`.
    ///
    /// The model infers indices from message order and can misreport them.
    /// Returns the indices that were removed from `suspicious_chunks`.
    pub fn retain_chunks(&mut self, chunk_count: usize) -> Vec<u32> {
        let in_range = |i: u32| i >= 1 && (i as usize) <= chunk_count;

        let dropped: Vec<u32> = self
            .suspicious_chunks
            .iter()
            .copied()
            .filter(|&i| !in_range(i))
            .collect();
        self.suspicious_chunks.retain(|&i| in_range(i));

        let before = self.explanation.len();
        self.explanation.retain(|e| in_range(e.chunk));
        let dropped_explanations = before - self.explanation.len();

        if !dropped.is_empty() || dropped_explanations > 0 {
            warn!(
                "Model referenced chunks outside 1..={}: dropped indices {:?} and {} explanation(s)",
                chunk_count, dropped, dropped_explanations
            );
        }
        dropped
    }
}
