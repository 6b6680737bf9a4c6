//! Threshold search over the fingerprint store.

use std::sync::Arc;
use std::time::Instant;

use futures::TryStreamExt;
use tracing::{debug, trace, warn};

use rooter_core::defaults;
use rooter_core::{
    rank_hits, Error, FingerprintCandidate, FingerprintHash, FingerprintRepository, Hasher,
    MatchHit, Result,
};

/// Per-namespace search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePolicy {
    pub namespace: String,
    /// Width of every hash in the namespace.
    pub hash_bits: u32,
    /// Default threshold; callers may lower it but never raise it.
    pub max_distance: u32,
}

impl NamespacePolicy {
    pub fn new(namespace: impl Into<String>, hash_bits: u32, max_distance: u32) -> Self {
        Self {
            namespace: namespace.into(),
            hash_bits,
            max_distance,
        }
    }

    /// Policy of a registered hasher.
    pub fn of(hasher: &dyn Hasher) -> Self {
        Self::new(hasher.namespace(), hasher.hash_bits(), hasher.max_distance())
    }

    /// Threshold to apply given an optional caller override.
    pub fn effective_distance(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(d) => d.min(self.max_distance),
            None => self.max_distance,
        }
    }
}

/// Result of a search, with the threshold actually applied.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub namespace: String,
    pub max_distance: u32,
    pub hits: Vec<MatchHit>,
}

/// Full-scan matcher over a [`FingerprintRepository`].
#[derive(Clone)]
pub struct Matcher {
    fingerprints: Arc<dyn FingerprintRepository>,
    limit: usize,
}

impl Matcher {
    pub fn new(fingerprints: Arc<dyn FingerprintRepository>) -> Self {
        Self {
            fingerprints,
            limit: defaults::SEARCH_LIMIT as usize,
        }
    }

    /// Set the upper bound on hits per search.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Validate a hex query against `policy` and search its namespace.
    ///
    /// `distance` and `limit` may only narrow the namespace threshold and the
    /// configured cap.
    pub async fn search_hex(
        &self,
        query_hex: &str,
        policy: &NamespacePolicy,
        distance: Option<u32>,
        limit: Option<usize>,
    ) -> Result<SearchOutcome> {
        let query = FingerprintHash::parse(query_hex, policy.hash_bits)?;
        let max_distance = policy.effective_distance(distance);
        let limit = limit.map_or(self.limit, |l| l.min(self.limit));
        let hits = self
            .search(&query, &policy.namespace, max_distance, limit)
            .await?;
        Ok(SearchOutcome {
            namespace: policy.namespace.clone(),
            max_distance,
            hits,
        })
    }

    /// Every fingerprint in `namespace` with distance strictly below
    /// `max_distance`, closest first, at most `limit`.
    pub async fn search(
        &self,
        query: &FingerprintHash,
        namespace: &str,
        max_distance: u32,
        limit: usize,
    ) -> Result<Vec<MatchHit>> {
        let start = Instant::now();
        let mut hits = Vec::new();
        let mut scanned = 0u64;
        let mut skipped = 0u64;

        let mut rows = self.fingerprints.scan_namespace(namespace);
        while let Some(candidate) = rows.try_next().await? {
            scanned += 1;
            match score(query, &candidate) {
                Ok(distance) if distance < max_distance => {
                    trace!(
                        subsystem = "search",
                        component = "matcher",
                        fingerprint_id = %candidate.fingerprint_id,
                        distance,
                        "Candidate within threshold"
                    );
                    hits.push(into_hit(candidate, namespace, distance));
                }
                Ok(_) => {}
                Err(e) => {
                    skipped += 1;
                    warn!(
                        subsystem = "search",
                        component = "matcher",
                        fingerprint_id = %candidate.fingerprint_id,
                        namespace,
                        error = %e,
                        "Skipping undecodable stored fingerprint"
                    );
                }
            }
        }

        rank_hits(&mut hits, limit);

        debug!(
            subsystem = "search",
            component = "matcher",
            op = "search",
            namespace,
            max_distance,
            scanned,
            skipped,
            result_count = hits.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Fingerprint scan complete"
        );
        Ok(hits)
    }
}

/// Distance between the query and a stored candidate.
pub(crate) fn score(query: &FingerprintHash, candidate: &FingerprintCandidate) -> Result<u32> {
    let stored = FingerprintHash::from_hex(&candidate.hash)?;
    query.distance(&stored).ok_or_else(|| {
        Error::InvalidInput(format!(
            "stored hash is {} bits, query is {} bits",
            stored.bits(),
            query.bits()
        ))
    })
}

pub(crate) fn into_hit(candidate: FingerprintCandidate, namespace: &str, distance: u32) -> MatchHit {
    MatchHit {
        work_id: candidate.work_id,
        work_title: candidate.work_title,
        manifestation_id: candidate.manifestation_id,
        fingerprint_id: candidate.fingerprint_id,
        namespace: namespace.to_string(),
        distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rooter_db::test_fixtures::{hash_with_bits_set, seed_fingerprint};
    use rooter_db::Database;

    const NS: &str = defaults::BLOCKHASH_NAMESPACE;

    fn policy() -> NamespacePolicy {
        NamespacePolicy::new(NS, 256, defaults::BLOCKHASH_MAX_DISTANCE)
    }

    fn matcher(db: &Database) -> Matcher {
        Matcher::new(db.fingerprints.clone())
    }

    #[test]
    fn test_effective_distance_clamps_override() {
        let p = policy();
        assert_eq!(p.effective_distance(None), 10);
        assert_eq!(p.effective_distance(Some(4)), 4);
        assert_eq!(p.effective_distance(Some(50)), 10);
    }

    #[tokio::test]
    async fn test_nine_bit_difference_threshold_is_strict() {
        let db = Database::in_memory();
        seed_fingerprint(&db, "Nine", NS, &hash_with_bits_set(9)).await.unwrap();
        let m = matcher(&db);
        let zero = "0".repeat(64);

        let at_ten = m.search_hex(&zero, &policy(), Some(10), None).await.unwrap();
        assert_eq!(at_ten.hits.len(), 1);
        assert_eq!(at_ten.hits[0].distance, 9);

        let at_nine = m.search_hex(&zero, &policy(), Some(9), None).await.unwrap();
        assert!(at_nine.hits.is_empty());
        assert_eq!(at_nine.max_distance, 9);
    }

    #[tokio::test]
    async fn test_search_scoped_to_namespace() {
        let db = Database::in_memory();
        seed_fingerprint(&db, "Image", NS, &hash_with_bits_set(1)).await.unwrap();
        seed_fingerprint(&db, "Video", defaults::BLOCKHASH_VIDEO_NAMESPACE, &hash_with_bits_set(1))
            .await
            .unwrap();

        let out = matcher(&db)
            .search_hex(&"0".repeat(64), &policy(), None, None)
            .await
            .unwrap();
        assert_eq!(out.hits.len(), 1);
        assert_eq!(out.hits[0].work_title.as_deref(), Some("Image"));
        assert_eq!(out.hits[0].namespace, NS);
    }

    #[tokio::test]
    async fn test_hits_sorted_then_capped() {
        let db = Database::in_memory();
        for bits in [7, 0, 3, 5] {
            seed_fingerprint(&db, &format!("d{}", bits), NS, &hash_with_bits_set(bits))
                .await
                .unwrap();
        }
        let out = matcher(&db)
            .search_hex(&"0".repeat(64), &policy(), None, Some(3))
            .await
            .unwrap();
        let d: Vec<u32> = out.hits.iter().map(|h| h.distance).collect();
        assert_eq!(d, vec![0, 3, 5]);
    }

    #[tokio::test]
    async fn test_limit_never_exceeds_configured_cap() {
        let db = Database::in_memory();
        for _ in 0..4 {
            seed_fingerprint(&db, "same", NS, &hash_with_bits_set(0)).await.unwrap();
        }
        let out = matcher(&db)
            .with_limit(2)
            .search_hex(&"0".repeat(64), &policy(), None, Some(100))
            .await
            .unwrap();
        assert_eq!(out.hits.len(), 2);
    }

    #[tokio::test]
    async fn test_bad_stored_rows_are_skipped() {
        let db = Database::in_memory();
        seed_fingerprint(&db, "short", NS, "abcd").await.unwrap();
        seed_fingerprint(&db, "garbage", NS, "not-hex").await.unwrap();
        seed_fingerprint(&db, "good", NS, &hash_with_bits_set(2)).await.unwrap();

        let out = matcher(&db)
            .search_hex(&"0".repeat(64), &policy(), None, None)
            .await
            .unwrap();
        assert_eq!(out.hits.len(), 1);
        assert_eq!(out.hits[0].work_title.as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_malformed_query_rejected() {
        let db = Database::in_memory();
        let m = matcher(&db);
        let bad_inputs = vec![
            String::new(),
            "abc".to_string(),
            "0".repeat(63),
            "z".repeat(64),
            "0".repeat(65),
        ];
        for bad in &bad_inputs {
            let err = m.search_hex(bad, &policy(), None, None).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{bad:?} gave {err}");
        }
    }

    #[tokio::test]
    async fn test_empty_store_is_not_an_error() {
        let db = Database::in_memory();
        let out = matcher(&db)
            .search_hex(&"f".repeat(64), &policy(), None, None)
            .await
            .unwrap();
        assert!(out.hits.is_empty());
    }

    #[tokio::test]
    async fn test_zero_threshold_matches_nothing() {
        let db = Database::in_memory();
        seed_fingerprint(&db, "exact", NS, &hash_with_bits_set(0)).await.unwrap();
        let out = matcher(&db)
            .search_hex(&"0".repeat(64), &policy(), Some(0), None)
            .await
            .unwrap();
        assert!(out.hits.is_empty());
    }
}
