//! # Engine Configuration
//!
//! [`EngineConfig`] is read from YAML. Every member has a default matching
//! the CogniPilot deployment, so an empty file (or no file) is a complete
//! configuration:
//!
//! ```yaml
//! base_url: https://credentials.cognipilot.org
//! issuer:
//!   id: did:web:credentials.cognipilot.org
//!   name: CogniPilot Foundation
//!   url: https://cognipilot.org
//! status_list_url: https://credentials.cognipilot.org/status/revocation-list
//! verify_url: https://credentials.cognipilot.org/verify
//! merge_policy: reject_unless_identical
//! slugs: { max_suffix: 100, anonymous_length: 12, anonymous_attempts: 16 }
//! lock_timeout_secs: 10
//! signing_key_env: OBADGE_SIGNING_KEY
//! layout:
//!   profile_dir: docs/profile
//!   # ... every persisted path, relative to the repository root
//! ```
//!
//! Discovery: an explicit `--config` path, else `<repo_root>/obadge.yaml`
//! when present, else the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use obadge_core::{CredentialKey, Slug};
use obadge_status::StatusListSettings;
use obadge_vc::IssuerProfile;

/// Name of the configuration file looked up in the repository root.
pub const CONFIG_FILE_NAME: &str = "obadge.yaml";

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for [`EngineConfig`].
    #[error("cannot parse config {}: {message}", path.display())]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The configuration parsed but is unusable.
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// How a merge treats an achievement present in both wallets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Conflict unless both records are field-identical, in which case the
    /// destination copy survives.
    #[default]
    RejectUnlessIdentical,
    /// Keep the destination wallet's record.
    PreferDestination,
    /// Replace the destination wallet's record with the source's.
    PreferSource,
}

/// Issuer identity placed in every credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Issuer DID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Homepage.
    pub url: Option<String>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            id: "did:web:credentials.cognipilot.org".to_string(),
            name: "CogniPilot Foundation".to_string(),
            url: Some("https://cognipilot.org".to_string()),
        }
    }
}

impl IssuerConfig {
    /// As an OpenBadges `Profile`.
    pub fn profile(&self) -> IssuerProfile {
        IssuerProfile::new(&self.id, &self.name, self.url.clone())
    }
}

/// Bounds for slug allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlugConfig {
    /// Highest numeric suffix tried before a collision is a conflict.
    pub max_suffix: u32,
    /// Length of anonymized slugs.
    pub anonymous_length: usize,
    /// Anonymized slug generations tried before giving up.
    pub anonymous_attempts: u32,
}

impl Default for SlugConfig {
    fn default() -> Self {
        Self {
            max_suffix: 100,
            anonymous_length: 12,
            anonymous_attempts: 16,
        }
    }
}

/// Repository layout, every path relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Wallet directory.
    pub wallet_registry: PathBuf,
    /// Status index registry.
    pub status_registry: PathBuf,
    /// Applied request digests.
    pub request_ledger: PathBuf,
    /// Published status list credential.
    pub status_list: PathBuf,
    /// Root of per-wallet credential artifacts.
    pub profile_dir: PathBuf,
    /// Achievement catalog.
    pub achievements_dir: PathBuf,
    /// Badge image templates.
    pub badge_templates_dir: PathBuf,
    /// Pending request files.
    pub requests_dir: PathBuf,
    /// Private Multikey document.
    pub private_key: PathBuf,
    /// Public Multikey document.
    pub public_key: PathBuf,
    /// Single-writer lock file.
    pub lock_file: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            wallet_registry: "wallet-registry.json".into(),
            status_registry: "status-registry.json".into(),
            request_ledger: "request-ledger.json".into(),
            status_list: "docs/status/revocation-list".into(),
            profile_dir: "docs/profile".into(),
            achievements_dir: "achievements".into(),
            badge_templates_dir: "docs/images/badges".into(),
            requests_dir: "requests".into(),
            private_key: "keys/key-1-private.json".into(),
            public_key: "keys/key-1-public.json".into(),
            lock_file: ".obadge.lock".into(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Public base URL; credential ids are `{base_url}/profile/{slug}/{achievement}`.
    pub base_url: String,
    /// Issuer identity.
    pub issuer: IssuerConfig,
    /// URL of the status list credential.
    pub status_list_url: String,
    /// URL advertised in baked SVGs.
    pub verify_url: String,
    /// Shared-achievement policy for wallet merges.
    pub merge_policy: MergePolicy,
    /// Slug allocation bounds.
    pub slugs: SlugConfig,
    /// How long to wait for the workspace lock.
    pub lock_timeout_secs: u64,
    /// Environment variable that may carry the private Multikey document.
    pub signing_key_env: Option<String>,
    /// File layout.
    pub layout: LayoutConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "https://credentials.cognipilot.org".to_string(),
            issuer: IssuerConfig::default(),
            status_list_url: "https://credentials.cognipilot.org/status/revocation-list".to_string(),
            verify_url: "https://credentials.cognipilot.org/verify".to_string(),
            merge_policy: MergePolicy::default(),
            slugs: SlugConfig::default(),
            lock_timeout_secs: 10,
            signing_key_env: Some("OBADGE_SIGNING_KEY".to_string()),
            layout: LayoutConfig::default(),
        }
    }
}

fn is_http_url(s: &str) -> bool {
    (s.starts_with("https://") || s.starts_with("http://")) && s.len() > "https://".len()
}

impl EngineConfig {
    /// Parse YAML. An empty document yields the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, String> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| e.to_string())
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// The explicit file if given, else `<repo_root>/obadge.yaml` if it
    /// exists, else the defaults.
    pub fn discover(repo_root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = repo_root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            tracing::debug!("no {CONFIG_FILE_NAME}, using built-in defaults");
            Ok(Self::default())
        }
    }

    /// Check the configuration. Returns a list of problems (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (name, url) in [
            ("base_url", &self.base_url),
            ("status_list_url", &self.status_list_url),
            ("verify_url", &self.verify_url),
        ] {
            if !is_http_url(url) {
                errors.push(format!("{name} must be an http(s) URL, got {url:?}"));
            }
        }
        if self.issuer.id.trim().is_empty() {
            errors.push("issuer.id must not be empty".to_string());
        }
        if self.issuer.name.trim().is_empty() {
            errors.push("issuer.name must not be empty".to_string());
        }
        if self.slugs.anonymous_length < 8 {
            errors.push(format!(
                "slugs.anonymous_length must be at least 8, got {}",
                self.slugs.anonymous_length
            ));
        }
        if self.slugs.anonymous_length > obadge_core::identity::MAX_SLUG_LEN {
            errors.push("slugs.anonymous_length exceeds the maximum slug length".to_string());
        }
        if self.slugs.anonymous_attempts == 0 {
            errors.push("slugs.anonymous_attempts must be > 0".to_string());
        }
        if self.lock_timeout_secs == 0 {
            errors.push("lock_timeout_secs must be > 0".to_string());
        }
        errors
    }

    /// Lock acquisition timeout.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Public URL of a credential.
    pub fn credential_url(&self, key: &CredentialKey) -> String {
        obadge_vc::credential_url(&self.base_url, key)
    }
}

// ---------------------------------------------------------------------------
// Resolved paths
// ---------------------------------------------------------------------------

/// The layout resolved against a repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    /// Repository root.
    pub root: PathBuf,
    /// See [`LayoutConfig::wallet_registry`].
    pub wallet_registry: PathBuf,
    /// See [`LayoutConfig::status_registry`].
    pub status_registry: PathBuf,
    /// See [`LayoutConfig::request_ledger`].
    pub request_ledger: PathBuf,
    /// See [`LayoutConfig::status_list`].
    pub status_list: PathBuf,
    /// See [`LayoutConfig::profile_dir`].
    pub profile_dir: PathBuf,
    /// See [`LayoutConfig::achievements_dir`].
    pub achievements_dir: PathBuf,
    /// See [`LayoutConfig::badge_templates_dir`].
    pub badge_templates_dir: PathBuf,
    /// See [`LayoutConfig::requests_dir`].
    pub requests_dir: PathBuf,
    /// See [`LayoutConfig::private_key`].
    pub private_key: PathBuf,
    /// See [`LayoutConfig::public_key`].
    pub public_key: PathBuf,
    /// See [`LayoutConfig::lock_file`].
    pub lock_file: PathBuf,
}

impl WorkspacePaths {
    /// Resolve `layout` under `root`. Absolute layout paths are kept as is.
    pub fn resolve(root: &Path, layout: &LayoutConfig) -> Self {
        let at = |p: &Path| root.join(p);
        Self {
            root: root.to_path_buf(),
            wallet_registry: at(&layout.wallet_registry),
            status_registry: at(&layout.status_registry),
            request_ledger: at(&layout.request_ledger),
            status_list: at(&layout.status_list),
            profile_dir: at(&layout.profile_dir),
            achievements_dir: at(&layout.achievements_dir),
            badge_templates_dir: at(&layout.badge_templates_dir),
            requests_dir: at(&layout.requests_dir),
            private_key: at(&layout.private_key),
            public_key: at(&layout.public_key),
            lock_file: at(&layout.lock_file),
        }
    }

    /// Directory holding one wallet's artifacts.
    pub fn wallet_dir(&self, slug: &Slug) -> PathBuf {
        self.profile_dir.join(slug.as_str())
    }

    /// Directory holding one credential's artifacts.
    pub fn credential_dir(&self, key: &CredentialKey) -> PathBuf {
        self.wallet_dir(&key.slug).join(key.achievement.as_str())
    }

    /// `credential.json` of a credential.
    pub fn credential_json(&self, key: &CredentialKey) -> PathBuf {
        self.credential_dir(key).join("credential.json")
    }

    /// Baked badge of a credential, `badge.svg` or `badge.png`.
    pub fn badge(&self, key: &CredentialKey, kind: obadge_bake::ImageKind) -> PathBuf {
        self.credential_dir(key).join(format!("badge.{}", kind.extension()))
    }

    /// Status list settings for this workspace.
    pub fn status_settings(&self, config: &EngineConfig) -> StatusListSettings {
        StatusListSettings {
            list_url: config.status_list_url.clone(),
            issuer_id: config.issuer.id.clone(),
            registry_path: self.status_registry.clone(),
            list_path: self.status_list.clone(),
        }
    }
}
