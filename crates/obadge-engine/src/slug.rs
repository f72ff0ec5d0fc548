//! # Slug Allocator
//!
//! Derives wallet slugs and guarantees they are unique against every live
//! and retired slug in the directory.
//!
//! - Derived: [`slugify`] of the display name (`"Jane Doe"` → `jane-doe`).
//!   A name with no usable ASCII falls back to an anonymized slug.
//! - Custom: the requested slug, normalized the same way.
//! - Collision: `-1`, `-2`, … up to `max_suffix`; exhaustion is a conflict.
//! - Anonymized: `anonymous_length` random characters from `[a-z0-9]`,
//!   regenerated on collision, at most `anonymous_attempts` times.
//!
//! ## Security Invariant
//!
//! Every candidate, anonymized ones included, is checked against the
//! directory. Silent aliasing would publish one recipient's credentials
//! under another recipient's URL.

use rand::Rng;

use obadge_core::{slugify, Slug};

use crate::config::SlugConfig;
use crate::directory::WalletDirectory;
use crate::error::EngineError;

const ANON_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Slug allocation against a directory snapshot.
#[derive(Debug, Clone)]
pub struct SlugAllocator {
    config: SlugConfig,
}

impl SlugAllocator {
    /// Allocator with the given bounds.
    pub fn new(config: SlugConfig) -> Self {
        Self { config }
    }

    /// `base` if free, else the first free `base-N`.
    pub fn first_free(&self, base: &Slug, dir: &WalletDirectory) -> Result<Slug, EngineError> {
        if !dir.is_taken(base) {
            return Ok(base.clone());
        }
        for n in 1..=self.config.max_suffix {
            let candidate = base.with_suffix(n)?;
            if !dir.is_taken(&candidate) {
                tracing::debug!(%base, %candidate, "slug disambiguated");
                return Ok(candidate);
            }
        }
        Err(EngineError::Conflict(format!(
            "no free slug for {base} within {} suffixes",
            self.config.max_suffix
        )))
    }

    /// Slug derived from a display name.
    pub fn derive(
        &self,
        name: &str,
        dir: &WalletDirectory,
        rng: &mut impl Rng,
    ) -> Result<Slug, EngineError> {
        let base = slugify(name);
        if base.is_empty() {
            tracing::debug!("name has no ASCII slug form, anonymizing");
            return self.anonymous(dir, rng);
        }
        self.first_free(&Slug::parse(&base)?, dir)
    }

    /// Slug from a requested custom value.
    pub fn custom(&self, requested: &str, dir: &WalletDirectory) -> Result<Slug, EngineError> {
        let base = Slug::from_text(requested)?;
        self.first_free(&base, dir)
    }

    /// A fresh random slug.
    pub fn anonymous(&self, dir: &WalletDirectory, rng: &mut impl Rng) -> Result<Slug, EngineError> {
        for _ in 0..self.config.anonymous_attempts {
            let token: String = (0..self.config.anonymous_length)
                .map(|_| char::from(ANON_ALPHABET[rng.gen_range(0..ANON_ALPHABET.len())]))
                .collect();
            let candidate = Slug::parse(&token)?;
            if !dir.is_taken(&candidate) {
                return Ok(candidate);
            }
            tracing::warn!("anonymized slug collided, regenerating");
        }
        Err(EngineError::Conflict(format!(
            "no free anonymized slug after {} attempts",
            self.config.anonymous_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obadge_core::{Email, Timestamp};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dir_with(slugs: &[&str]) -> WalletDirectory {
        let mut d = WalletDirectory::default();
        for (i, s) in slugs.iter().enumerate() {
            d.create_wallet(
                Slug::parse(s).unwrap(),
                Email::parse(&format!("u{i}@example.com")).unwrap(),
                "U",
                Timestamp::now(),
            )
            .unwrap();
        }
        d
    }

    fn alloc() -> SlugAllocator {
        SlugAllocator::new(SlugConfig::default())
    }

    #[test]
    fn derives_from_name() {
        let mut rng = StdRng::seed_from_u64(1);
        let s = alloc().derive("Jane Doe", &WalletDirectory::default(), &mut rng).unwrap();
        assert_eq!(s.as_str(), "jane-doe");
    }

    #[test]
    fn collisions_get_numeric_suffix() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = dir_with(&["jane-doe", "jane-doe-1"]);
        assert_eq!(alloc().derive("Jane Doe", &d, &mut rng).unwrap().as_str(), "jane-doe-2");
    }

    #[test]
    fn retired_slugs_count_as_taken() {
        let mut d = dir_with(&["jd"]);
        d.remove_wallet(&Slug::parse("jd").unwrap()).unwrap();
        assert_eq!(alloc().custom("JD", &d).unwrap().as_str(), "jd-1");
    }

    #[test]
    fn suffix_exhaustion_is_conflict() {
        let a = SlugAllocator::new(SlugConfig {
            max_suffix: 2,
            ..SlugConfig::default()
        });
        let d = dir_with(&["x", "x-1", "x-2"]);
        assert!(matches!(a.custom("x", &d), Err(EngineError::Conflict(_))));
    }

    #[test]
    fn empty_derivation_falls_back_to_anonymous() {
        let mut rng = StdRng::seed_from_u64(7);
        let s = alloc().derive("李小龍", &WalletDirectory::default(), &mut rng).unwrap();
        assert_eq!(s.as_str().len(), 12);
        assert!(s.as_str().bytes().all(|b| ANON_ALPHABET.contains(&b)));
    }

    #[test]
    fn custom_must_normalize_to_something() {
        assert!(matches!(
            alloc().custom("!!!", &WalletDirectory::default()),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn anonymous_regenerates_on_collision() {
        // Same seed twice: the first token is taken, so the second draw wins.
        let mut seeded = StdRng::seed_from_u64(42);
        let first = alloc().anonymous(&WalletDirectory::default(), &mut seeded).unwrap();
        let d = dir_with(&[first.as_str()]);
        let mut rng = StdRng::seed_from_u64(42);
        let second = alloc().anonymous(&d, &mut rng).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn anonymous_attempts_are_bounded() {
        let a = SlugAllocator::new(SlugConfig {
            anonymous_attempts: 1,
            ..SlugConfig::default()
        });
        let mut seeded = StdRng::seed_from_u64(3);
        let first = a.anonymous(&WalletDirectory::default(), &mut seeded).unwrap();
        let d = dir_with(&[first.as_str()]);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(a.anonymous(&d, &mut rng), Err(EngineError::Conflict(_))));
    }
}
