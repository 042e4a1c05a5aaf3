//! Fuzzy lookup of a recognized plate in a registry snapshot.

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::plate_detection::normalize::normalize;
use crate::plate_detection::normalize::NormalizedPlate;
use crate::registry::PlateRecord;

pub const DEFAULT_THRESHOLD: u8 = 80;

/// How to pick among several rows that clear the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// First row in registry order that clears the threshold
    #[default]
    FirstMatch,
    /// Highest scoring row, earliest on ties
    BestMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub record: PlateRecord,
    /// Similarity 0-100
    pub score: u8,
}

/// Indel similarity on a 0-100 scale: `2 * lcs / (len_a + len_b)`.
///
/// Only insertions and deletions count, so a dropped or extra character
/// costs less than under Levenshtein. Empty input scores 0.
pub fn similarity(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = (a.len() + b.len()) as f64;
    (200.0 * longest_common_subsequence(&a, &b) as f64 / total).round() as u8
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for ca in a {
        let mut diagonal = 0;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

#[derive(Debug, Clone)]
pub struct RegistryMatcher {
    threshold: u8,
    policy: MatchPolicy,
}

impl Default for RegistryMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl RegistryMatcher {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold: threshold.min(100),
            policy: MatchPolicy::FirstMatch,
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn match_plate(
        &self,
        candidate: &NormalizedPlate,
        records: &[PlateRecord],
    ) -> Option<MatchResult> {
        if candidate.is_empty() {
            return None;
        }

        let mut best: Option<(&PlateRecord, u8)> = None;

        for record in records {
            let stored = normalize(&record.plate);
            if stored.is_empty() {
                debug!(plate = %record.plate, "registry row has no usable plate");
                continue;
            }

            let score = similarity(candidate.as_str(), stored.as_str());
            if score < self.threshold {
                continue;
            }

            match self.policy {
                MatchPolicy::FirstMatch => {
                    best = Some((record, score));
                    break;
                }
                MatchPolicy::BestMatch => {
                    if best.map_or(true, |(_, top)| score > top) {
                        best = Some((record, score));
                    }
                }
            }
        }

        best.map(|(record, score)| MatchResult {
            record: record.clone(),
            score,
        })
    }
}
