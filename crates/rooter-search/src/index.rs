//! Multi-index hashing accelerator.
//!
//! The hash is cut into `bands` disjoint bit ranges, each with its own exact
//! lookup table. Two hashes at distance `d` differ in at most `d` bands, so a
//! stored hash with `d < bands` agrees with the query on at least one band
//! and is found by the lookup. When the threshold exceeds the band count the
//! index scans every entry instead, so results always equal a full scan.
//!
//! The index is a snapshot: fingerprints upserted after [`HammingIndex::build`]
//! are not seen until it is rebuilt. It is not wired into [`crate::Matcher`].

use std::collections::{BTreeSet, HashMap};

use futures::TryStreamExt;
use tracing::{debug, warn};

use rooter_core::{
    rank_hits, Error, FingerprintCandidate, FingerprintHash, FingerprintRepository, MatchHit,
    Result,
};

use crate::matcher::into_hit;

struct Entry {
    candidate: FingerprintCandidate,
    hash: FingerprintHash,
}

/// In-memory banded index over one namespace.
pub struct HammingIndex {
    namespace: String,
    bits: u32,
    bands: Vec<(usize, usize)>,
    tables: Vec<HashMap<Vec<u8>, Vec<usize>>>,
    entries: Vec<Entry>,
}

impl HammingIndex {
    /// Create an empty index for `bits`-wide hashes split into `bands` bands.
    pub fn new(namespace: impl Into<String>, bits: u32, bands: usize) -> Result<Self> {
        if bits == 0 || bits % 8 != 0 {
            return Err(Error::Config(format!(
                "hash width must be a positive multiple of 8 bits, got {}",
                bits
            )));
        }
        if bands == 0 || bands > bits as usize {
            return Err(Error::Config(format!(
                "band count must be between 1 and {}, got {}",
                bits, bands
            )));
        }

        // Spread the remainder so band widths differ by at most one bit.
        let total = bits as usize;
        let base = total / bands;
        let extra = total % bands;
        let mut ranges = Vec::with_capacity(bands);
        let mut start = 0;
        for i in 0..bands {
            let width = base + usize::from(i < extra);
            ranges.push((start, start + width));
            start += width;
        }

        Ok(Self {
            namespace: namespace.into(),
            bits,
            tables: vec![HashMap::new(); bands],
            bands: ranges,
            entries: Vec::new(),
        })
    }

    /// Load every decodable fingerprint of `namespace` from the store.
    ///
    /// Rows that fail to decode or have the wrong width are skipped with a
    /// warning, as the full scan does.
    pub async fn build(
        fingerprints: &dyn FingerprintRepository,
        namespace: &str,
        bits: u32,
        bands: usize,
    ) -> Result<Self> {
        let mut index = Self::new(namespace, bits, bands)?;
        let mut rows = fingerprints.scan_namespace(namespace);
        while let Some(candidate) = rows.try_next().await? {
            let fingerprint_id = candidate.fingerprint_id;
            if let Err(e) = index.insert(candidate) {
                warn!(
                    subsystem = "search",
                    component = "hamming_index",
                    %fingerprint_id,
                    namespace,
                    error = %e,
                    "Skipping undecodable stored fingerprint"
                );
            }
        }
        debug!(
            subsystem = "search",
            component = "hamming_index",
            op = "build",
            namespace,
            entries = index.len(),
            bands,
            "Index built"
        );
        Ok(index)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a lookup at `max_distance` uses the band tables.
    pub fn is_exact_for(&self, max_distance: u32) -> bool {
        max_distance as usize <= self.bands.len()
    }

    /// Add a stored fingerprint.
    pub fn insert(&mut self, candidate: FingerprintCandidate) -> Result<()> {
        let hash = FingerprintHash::from_hex(&candidate.hash)?;
        if hash.bits() != self.bits {
            return Err(Error::InvalidInput(format!(
                "stored hash is {} bits, index expects {}",
                hash.bits(),
                self.bits
            )));
        }
        let idx = self.entries.len();
        for (table, &(start, end)) in self.tables.iter_mut().zip(&self.bands) {
            table
                .entry(band_key(hash.as_bytes(), start, end))
                .or_default()
                .push(idx);
        }
        self.entries.push(Entry { candidate, hash });
        Ok(())
    }

    /// Entries with distance strictly below `max_distance`, closest first, at
    /// most `limit`.
    pub fn search(
        &self,
        query: &FingerprintHash,
        max_distance: u32,
        limit: usize,
    ) -> Result<Vec<MatchHit>> {
        if query.bits() != self.bits {
            return Err(Error::InvalidInput(format!(
                "query hash is {} bits, index expects {}",
                query.bits(),
                self.bits
            )));
        }

        let mut hits = Vec::new();
        if self.is_exact_for(max_distance) {
            let mut seen = BTreeSet::new();
            for (table, &(start, end)) in self.tables.iter().zip(&self.bands) {
                if let Some(ids) = table.get(&band_key(query.as_bytes(), start, end)) {
                    seen.extend(ids.iter().copied());
                }
            }
            for idx in seen {
                self.push_if_within(&mut hits, idx, query, max_distance);
            }
        } else {
            for idx in 0..self.entries.len() {
                self.push_if_within(&mut hits, idx, query, max_distance);
            }
        }

        rank_hits(&mut hits, limit);
        Ok(hits)
    }

    fn push_if_within(
        &self,
        hits: &mut Vec<MatchHit>,
        idx: usize,
        query: &FingerprintHash,
        max_distance: u32,
    ) {
        let entry = &self.entries[idx];
        if let Some(distance) = query.distance(&entry.hash) {
            if distance < max_distance {
                hits.push(into_hit(entry.candidate.clone(), &self.namespace, distance));
            }
        }
    }
}

/// Pack bits `[start, end)` of `bytes` (MSB first) into a lookup key.
fn band_key(bytes: &[u8], start: usize, end: usize) -> Vec<u8> {
    let mut key = vec![0u8; (end - start).div_ceil(8)];
    for (i, bit) in (start..end).enumerate() {
        if bytes[bit / 8] & (0x80 >> (bit % 8)) != 0 {
            key[i / 8] |= 0x80 >> (i % 8);
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Matcher;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rooter_core::defaults::BLOCKHASH_NAMESPACE as NS;
    use rooter_db::test_fixtures::seed_fingerprint;
    use rooter_db::Database;
    use uuid::Uuid;

    fn candidate(hash: &str) -> FingerprintCandidate {
        FingerprintCandidate {
            fingerprint_id: Uuid::new_v4(),
            manifestation_id: Uuid::new_v4(),
            work_id: Uuid::new_v4(),
            work_title: None,
            hash: hash.to_string(),
        }
    }

    /// Flip `n` distinct random bits of `base`.
    fn perturb(rng: &mut StdRng, base: &[u8], n: u32) -> Vec<u8> {
        let mut out = base.to_vec();
        let mut flipped = BTreeSet::new();
        while flipped.len() < n as usize {
            flipped.insert(rng.gen_range(0..out.len() * 8));
        }
        for bit in flipped {
            out[bit / 8] ^= 0x80 >> (bit % 8);
        }
        out
    }

    #[test]
    fn test_band_key_extracts_bits() {
        assert_eq!(band_key(&[0b1010_0000], 0, 3), vec![0b1010_0000]);
        assert_eq!(band_key(&[0x0F, 0xF0], 4, 12), vec![0xFF]);
        assert_eq!(band_key(&[0xFF, 0x00], 7, 9), vec![0b1000_0000]);
    }

    #[test]
    fn test_new_rejects_bad_bands() {
        assert!(HammingIndex::new(NS, 256, 0).is_err());
        assert!(HammingIndex::new(NS, 256, 257).is_err());
        assert!(HammingIndex::new(NS, 12, 2).is_err());
        let idx = HammingIndex::new(NS, 256, 7).unwrap();
        assert_eq!(idx.band_count(), 7);
        assert_eq!(idx.bands.last().unwrap().1, 256);
    }

    #[test]
    fn test_insert_rejects_wrong_width() {
        let mut idx = HammingIndex::new(NS, 256, 16).unwrap();
        assert!(idx.insert(candidate("abcd")).is_err());
        assert!(idx.insert(candidate("zz")).is_err());
        assert!(idx.is_empty());
    }

    #[test]
    fn test_strict_threshold() {
        let mut idx = HammingIndex::new(NS, 256, 16).unwrap();
        let mut bytes = [0u8; 32];
        bytes[31] = 0xFF;
        bytes[30] = 0x01;
        idx.insert(candidate(&hex_of(&bytes))).unwrap();
        let zero = FingerprintHash::from_bytes(vec![0; 32]);

        assert_eq!(idx.search(&zero, 10, 1000).unwrap().len(), 1);
        assert!(idx.search(&zero, 9, 1000).unwrap().is_empty());
    }

    fn hex_of(bytes: &[u8]) -> String {
        FingerprintHash::from_bytes(bytes.to_vec()).to_hex()
    }

    #[tokio::test]
    async fn test_index_equals_full_scan() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let db = Database::in_memory();
        let base: Vec<u8> = (0..32).map(|_| rng.gen()).collect();

        for i in 0..200 {
            let flips = rng.gen_range(0..60);
            let stored = if i % 10 == 0 {
                (0..32).map(|_| rng.gen()).collect()
            } else {
                perturb(&mut rng, &base, flips)
            };
            seed_fingerprint(&db, &format!("w{}", i), NS, &hex_of(&stored))
                .await
                .unwrap();
        }

        let matcher = Matcher::new(db.fingerprints.clone());
        for bands in [8, 16, 40] {
            let index = HammingIndex::build(db.fingerprints.as_ref(), NS, 256, bands)
                .await
                .unwrap();
            assert_eq!(index.len(), 200);

            for max_distance in [0, 1, 5, 10, 16, 24, 40, 60] {
                let flips = rng.gen_range(0..8);
                let query_bytes = perturb(&mut rng, &base, flips);
                let query = FingerprintHash::from_bytes(query_bytes);

                let scanned = matcher.search(&query, NS, max_distance, 1000).await.unwrap();
                let indexed = index.search(&query, max_distance, 1000).unwrap();
                assert_eq!(
                    scanned, indexed,
                    "bands={} max_distance={}",
                    bands, max_distance
                );
            }
        }
    }

    #[tokio::test]
    async fn test_build_skips_bad_rows() {
        let db = Database::in_memory();
        seed_fingerprint(&db, "bad", NS, "ff").await.unwrap();
        seed_fingerprint(&db, "good", NS, &"0".repeat(64)).await.unwrap();
        let index = HammingIndex::build(db.fingerprints.as_ref(), NS, 256, 10)
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.namespace(), NS);
    }
}
