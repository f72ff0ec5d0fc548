//! # Identifier Newtypes
//!
//! Wallets are addressed by [`Slug`], recipients by [`Email`], achievements
//! by [`AchievementId`], and a single issued credential by the composite
//! [`CredentialKey`] `wallet_slug/achievement_id`.
//!
//! ## Security Invariant
//!
//! Every newtype validates at construction and at deserialization, so a
//! registry file edited by hand cannot smuggle a path separator into a slug
//! and make an artifact path escape its profile directory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Longest slug accepted, including numeric disambiguation suffixes.
pub const MAX_SLUG_LEN: usize = 96;

/// Longest achievement identifier accepted.
pub const MAX_ACHIEVEMENT_ID_LEN: usize = 128;

/// Derive a URL-safe token from a display name.
///
/// Lowercases, turns whitespace and underscore runs into single hyphens,
/// drops every character outside `[a-z0-9-]`, collapses hyphen runs and trims
/// hyphens from both ends. `"Jane  Doe"` becomes `"jane-doe"`. The result may
/// be empty (for example for a name written entirely in a non-Latin script);
/// callers decide what to do in that case.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() || c == '_' || c == '-' {
            pending_hyphen = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        }
    }
    out.truncate(MAX_SLUG_LEN);
    while out.ends_with('-') {
        out.pop();
    }
    out
}

// ---------------------------------------------------------------------------
// Slug
// ---------------------------------------------------------------------------

/// A validated wallet slug: lowercase ASCII words joined by single hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Validate an already-normalized slug.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let valid = !s.is_empty()
            && s.len() <= MAX_SLUG_LEN
            && !s.starts_with('-')
            && !s.ends_with('-')
            && !s.contains("--")
            && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::InvalidSlug(s.to_string()))
        }
    }

    /// Normalize free text with [`slugify`] and validate the result.
    pub fn from_text(text: &str) -> Result<Self, ValidationError> {
        Self::parse(&slugify(text)).map_err(|_| ValidationError::InvalidSlug(text.to_string()))
    }

    /// This slug with a numeric disambiguator appended (`jane-doe-2`).
    pub fn with_suffix(&self, n: u32) -> Result<Self, ValidationError> {
        Self::parse(&format!("{}-{n}", self.0))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Slug {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Slug> for String {
    fn from(s: Slug) -> Self {
        s.0
    }
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// A recipient email address, lowercased and trimmed.
///
/// Only structural checks are made (one `@`, non-empty local part and
/// domain, no whitespace). Ownership of the address is trusted input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Normalize and validate an email address.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let normalized = s.trim().to_lowercase();
        let mut parts = normalized.split('@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();
        let valid = parts.next().is_none()
            && !local.is_empty()
            && !domain.is_empty()
            && !normalized.chars().any(char::is_whitespace);
        if valid {
            Ok(Self(normalized))
        } else {
            Err(ValidationError::InvalidEmail(s.to_string()))
        }
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `mailto:` URI used as the credential subject id.
    pub fn to_mailto(&self) -> String {
        format!("mailto:{}", self.0)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Email> for String {
    fn from(e: Email) -> Self {
        e.0
    }
}

// ---------------------------------------------------------------------------
// AchievementId
// ---------------------------------------------------------------------------

/// Identifier of an achievement template, e.g. `tsc-member-2026`.
///
/// Also the file stem of `achievements/<id>.json` and a path component of the
/// published credential, so `/`, `\` and a leading `.` are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AchievementId(String);

impl AchievementId {
    /// Validate an achievement identifier.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        let valid = !s.is_empty()
            && s.len() <= MAX_ACHIEVEMENT_ID_LEN
            && !s.starts_with('.')
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::InvalidAchievementId(s.to_string()))
        }
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AchievementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AchievementId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AchievementId> for String {
    fn from(a: AchievementId) -> Self {
        a.0
    }
}

// ---------------------------------------------------------------------------
// CredentialKey
// ---------------------------------------------------------------------------

/// Identity of one issued credential: `wallet_slug/achievement_id`.
///
/// Serializes as the composite string so it can key JSON maps in the status
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialKey {
    /// Wallet that holds the credential.
    pub slug: Slug,
    /// Achievement the credential attests.
    pub achievement: AchievementId,
}

impl CredentialKey {
    /// Pair a wallet slug with an achievement.
    pub fn new(slug: Slug, achievement: AchievementId) -> Self {
        Self { slug, achievement }
    }

    /// Parse `wallet_slug/achievement_id`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidCredentialKey(s.to_string());
        let (slug, achievement) = s.trim().split_once('/').ok_or_else(invalid)?;
        Ok(Self {
            slug: Slug::parse(slug).map_err(|_| invalid())?,
            achievement: AchievementId::parse(achievement).map_err(|_| invalid())?,
        })
    }

    /// The same achievement under a different wallet.
    pub fn rekey(&self, slug: &Slug) -> Self {
        Self {
            slug: slug.clone(),
            achievement: self.achievement.clone(),
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.slug, self.achievement)
    }
}

impl TryFrom<String> for CredentialKey {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CredentialKey> for String {
    fn from(k: CredentialKey) -> Self {
        k.to_string()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn slugify_output_is_empty_or_valid(name in "\\PC{0,60}") {
            let s = slugify(&name);
            prop_assert!(s.is_empty() || Slug::parse(&s).is_ok(), "{:?} -> {:?}", name, s);
        }

        #[test]
        fn slugify_is_idempotent(name in "[A-Za-z0-9 _.'-]{0,40}") {
            let once = slugify(&name);
            prop_assert_eq!(slugify(&once), once);
        }
    }
}
