//! Fingerprint Matcher
//!
//! Decides whether an observed media fingerprint belongs to a known catalog
//! item.
//!
//! **Algorithm:**
//! 1. Exact: content hash found in the store → match, confidence 100
//! 2. Fuzzy: candidates whose size is within ±tolerance of the observed size,
//!    unioned with candidates whose duration is within ±tolerance (when both
//!    durations are known), capped
//! 3. Score each candidate from size and duration closeness (equal weights
//!    when both are known, size only otherwise), scaled to 0-100
//! 4. Best candidate wins if it reaches the confidence threshold; ties go to
//!    the smallest absolute size difference
//!
//! A fingerprint without a usable hash never matches.

use crate::config::MatcherConfig;
use crate::db::content_items::get_item;
use crate::db::fingerprints::{find_by_hash, find_similar, StoredFingerprint};
use crate::error::Result;
use crate::types::MatchResult;
use repost_common::Fingerprint;
use sqlx::{Pool, Sqlite};

/// Relative closeness of two non-negative magnitudes, 0.0-1.0
pub fn closeness(a: f64, b: f64) -> f64 {
    let larger = a.abs().max(b.abs());
    if larger == 0.0 {
        return 1.0;
    }
    (1.0 - (a - b).abs() / larger).clamp(0.0, 1.0)
}

/// Similarity confidence (0-100) of a stored fingerprint to an observed one
pub fn similarity_confidence(observed: &Fingerprint, candidate: &Fingerprint) -> f64 {
    let size = closeness(observed.byte_size as f64, candidate.byte_size as f64);

    let combined = match (observed.duration_seconds, candidate.duration_seconds) {
        (Some(a), Some(b)) => (size + closeness(a, b)) / 2.0,
        _ => size,
    };

    combined * 100.0
}

pub struct FingerprintMatcher {
    db: Pool<Sqlite>,
    config: MatcherConfig,
}

impl FingerprintMatcher {
    pub fn new(db: Pool<Sqlite>, config: MatcherConfig) -> Self {
        Self { db, config }
    }

    pub async fn match_fingerprint(&self, observed: &Fingerprint) -> Result<MatchResult> {
        if !observed.has_hash() {
            tracing::warn!(
                byte_size = observed.byte_size,
                "Fingerprint has no content hash, refusing to match"
            );
            return Ok(MatchResult::unhashable());
        }

        if let Some(stored) = find_by_hash(&self.db, &observed.content_hash).await? {
            tracing::debug!(
                hash = %observed.content_hash,
                content_item_id = %stored.content_item_id,
                "Exact fingerprint match"
            );
            let item = get_item(&self.db, stored.content_item_id).await?;
            return Ok(MatchResult::exact(item));
        }

        let candidates = self.fuzzy_candidates(observed).await?;
        let Some((best, confidence)) = self.best_candidate(observed, &candidates) else {
            tracing::debug!(hash = %observed.content_hash, "No similar fingerprints");
            return Ok(MatchResult::no_match(0.0));
        };

        if confidence < self.config.confidence_threshold {
            tracing::debug!(
                hash = %observed.content_hash,
                candidates = candidates.len(),
                confidence,
                "Best candidate below confidence threshold"
            );
            return Ok(MatchResult::no_match(confidence));
        }

        tracing::info!(
            hash = %observed.content_hash,
            content_item_id = %best.content_item_id,
            confidence,
            "Probable fingerprint match"
        );
        let item = get_item(&self.db, best.content_item_id).await?;
        Ok(MatchResult::probable(confidence, item))
    }

    async fn fuzzy_candidates(&self, observed: &Fingerprint) -> Result<Vec<StoredFingerprint>> {
        let tol = self.config.similarity_tolerance;
        let size = observed.byte_size as f64;
        let size_range = (
            (size * (1.0 - tol)).floor() as i64,
            (size * (1.0 + tol)).ceil() as i64,
        );
        let duration_range = observed
            .duration_seconds
            .map(|d| (d * (1.0 - tol), d * (1.0 + tol)));

        find_similar(
            &self.db,
            observed.byte_size,
            size_range,
            duration_range,
            self.config.candidate_cap,
        )
        .await
    }

    fn best_candidate<'a>(
        &self,
        observed: &Fingerprint,
        candidates: &'a [StoredFingerprint],
    ) -> Option<(&'a StoredFingerprint, f64)> {
        let mut best: Option<(&StoredFingerprint, f64, i64)> = None;

        for candidate in candidates {
            let confidence = similarity_confidence(observed, &candidate.fingerprint);
            let size_diff = (candidate.fingerprint.byte_size - observed.byte_size).abs();

            let better = match best {
                None => true,
                Some((_, best_conf, best_diff)) => {
                    confidence > best_conf || (confidence == best_conf && size_diff < best_diff)
                }
            };
            if better {
                best = Some((candidate, confidence, size_diff));
            }
        }

        best.map(|(candidate, confidence, _)| (candidate, confidence))
    }
}
