use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::types::Article;

/// Constants of the pseudo-random tiebreak `(id * multiplier + seed) mod modulus`.
///
/// With an odd multiplier and a power-of-two modulus the map is a bijection
/// on ids below the modulus, so equal scores still get a total order that
/// looks shuffled but never changes between calls.
///
/// Ids are positive and the constants are validated to be non-negative, so
/// SQL's truncating `%` and the Euclidean remainder used here agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiebreakHash {
    multiplier: i64,
    seed: i64,
    modulus: i64,
}

impl Default for TiebreakHash {
    fn default() -> Self {
        Self {
            multiplier: 2_654_435_761,
            seed: 40_503,
            modulus: 1 << 32,
        }
    }
}

impl TiebreakHash {
    pub fn new(multiplier: i64, seed: i64, modulus: i64) -> Result<Self> {
        if multiplier <= 0 || multiplier % 2 == 0 {
            return Err(Error::Config(format!(
                "Tiebreak multiplier must be odd and positive, got {}",
                multiplier
            )));
        }
        if seed < 0 {
            return Err(Error::Config(format!(
                "Tiebreak seed must not be negative, got {}",
                seed
            )));
        }
        if modulus <= 0 {
            return Err(Error::Config(format!(
                "Tiebreak modulus must be positive, got {}",
                modulus
            )));
        }
        Ok(Self {
            multiplier,
            seed,
            modulus,
        })
    }

    pub fn multiplier(&self) -> i64 {
        self.multiplier
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn modulus(&self) -> i64 {
        self.modulus
    }

    pub fn key(&self, id: i64) -> i64 {
        let raw = id as i128 * self.multiplier as i128 + self.seed as i128;
        raw.rem_euclid(self.modulus as i128) as i64
    }

    /// Full ranking order: scored first, score descending, hash ascending, id ascending.
    pub fn compare(&self, a: &Article, b: &Article) -> Ordering {
        b.is_scored()
            .cmp(&a.is_scored())
            .then_with(|| b.score.cmp(&a.score))
            .then_with(|| self.key(a.id).cmp(&self.key(b.id)))
            .then_with(|| a.id.cmp(&b.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNSCORED;
    use chrono::Utc;

    fn article(id: i64, score: i32) -> Article {
        Article {
            id,
            site_name: "Site".to_string(),
            url: format!("https://example.com/{}", id),
            title: String::new(),
            text: String::new(),
            authors: vec![],
            publish_date: None,
            score,
            summary: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_key_is_within_modulus_and_distinct() {
        let hash = TiebreakHash::default();
        let mut keys: Vec<i64> = (1..=1000).map(|id| hash.key(id)).collect();
        assert!(keys.iter().all(|k| (0..hash.modulus()).contains(k)));
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn test_key_known_values() {
        let hash = TiebreakHash::default();
        assert_eq!(hash.key(0), 40_503);
        assert_eq!(hash.key(1), 2_654_476_264);
        assert_eq!(hash.key(2), (2 * 2_654_435_761i64 + 40_503) % (1 << 32));
    }

    #[test]
    fn test_rejects_invalid_constants() {
        for (multiplier, seed, modulus) in [(3, 1, 0), (3, 1, -8), (4, 1, 16), (0, 1, 16), (-3, 1, 16), (3, -1, 16)] {
            assert!(
                matches!(TiebreakHash::new(multiplier, seed, modulus), Err(Error::Config(_))),
                "accepted ({}, {}, {})",
                multiplier,
                seed,
                modulus
            );
        }

        let small = TiebreakHash::new(3, 1, 8).unwrap();
        assert_eq!(small.key(5), 0);
        assert_eq!(small.modulus(), 8);
        assert_eq!(
            TiebreakHash::new(2_654_435_761, 40_503, 1 << 32).unwrap(),
            TiebreakHash::default()
        );
    }

    #[test]
    fn test_compare_priority() {
        let hash = TiebreakHash::default();
        let mut articles = vec![
            article(1, UNSCORED),
            article(2, 7),
            article(3, 7),
            article(4, 3),
            article(5, 0),
        ];
        articles.sort_by(|a, b| hash.compare(a, b));

        let scores: Vec<i32> = articles.iter().map(|a| a.score).collect();
        assert_eq!(scores, vec![7, 7, 3, 0, UNSCORED]);
        let first_two: Vec<i64> = articles[..2].iter().map(|a| a.id).collect();
        let expected = if hash.key(2) < hash.key(3) { vec![2, 3] } else { vec![3, 2] };
        assert_eq!(first_two, expected);
    }
}
