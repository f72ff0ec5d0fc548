//! # Request Dispatcher
//!
//! [`Engine`] owns the loaded state of one repository and applies requests
//! to it. Every request runs the same pipeline:
//!
//! ```text
//! Received ──validate──▶ Validated ──handler──▶ change set ──commit──▶ Applied
//!     │                      │                      │
//!     └──────────────────────┴──────────────────────┴──────────────▶ Rejected
//! ```
//!
//! 1. Structural validation and the replay check against the request
//!    ledger.
//! 2. The handler mutates a *clone* of the wallet directory and a status
//!    transaction, and queues every artifact write and delete.
//! 3. The status list is rendered and signed, the registries serialized,
//!    and all of it appended to the same [`ChangeSet`].
//! 4. The change set is committed. Only then does the in-memory state move
//!    forward.
//!
//! ## Security Invariant
//!
//! A rejected request leaves no trace: no file is touched and the loaded
//! state is exactly what it was before. A commit that fails part-way
//! restores every file it had already replaced.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;

use obadge_core::fsio::read_json_opt;
use obadge_core::{ContentDigest, CredentialKey, Email, Slug, Timestamp, WorkspaceLock};
use obadge_crypto::KeyProvider;
use obadge_status::{StatusListManager, StatusRegistry, StatusStats};

use crate::catalog::AchievementCatalog;
use crate::config::{EngineConfig, WorkspacePaths};
use crate::directory::WalletDirectory;
use crate::error::EngineError;
use crate::intake::{self, RequestFile};
use crate::ledger::{LedgerEntry, RequestLedger};
use crate::outcome::{BatchEntry, BatchReport, Outcome, RequestState};
use crate::request::{Request, Submission};
use crate::slug::SlugAllocator;
use crate::store::ChangeSet;

/// Serialize a persisted document the way every engine file is written:
/// pretty JSON with a trailing newline.
pub(crate) fn pretty_json(value: &impl Serialize) -> Result<Vec<u8>, EngineError> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| EngineError::Persistence(format!("serialization failed: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Committed wallet directory and request ledger.
#[derive(Debug, Default)]
struct EngineState {
    directory: WalletDirectory,
    ledger: RequestLedger,
}

/// Working state handed to a request handler.
pub(crate) struct Draft<'a> {
    /// Clone of the committed directory.
    pub dir: WalletDirectory,
    /// Working copy of the status registry.
    pub status: &'a mut StatusRegistry,
    /// Queued artifact operations.
    pub changes: ChangeSet,
    /// Request time; every timestamp the request writes uses it.
    pub now: Timestamp,
}

/// Whether a pipeline run commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Commit,
    DryRun,
}

/// One row of [`Engine::credentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialSummary {
    /// `wallet_slug/achievement_id`.
    pub credential: CredentialKey,
    /// Owner e-mail.
    pub email: Email,
    /// Recipient name.
    pub recipient_name: String,
    /// Status list index.
    pub status_list_index: u64,
    /// Revocation bit.
    pub revoked: bool,
    /// Public URL.
    pub url: String,
}

/// The credential lifecycle engine for one repository.
pub struct Engine {
    config: EngineConfig,
    paths: WorkspacePaths,
    provider: Box<dyn KeyProvider>,
    catalog: AchievementCatalog,
    slugs: SlugAllocator,
    status: StatusListManager,
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.paths.root)
            .field("signer", &self.provider.verification_method())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Load the catalog, directory, ledger and status registry under
    /// `repo_root`.
    pub fn open(
        config: EngineConfig,
        repo_root: &Path,
        provider: Box<dyn KeyProvider>,
    ) -> Result<Self, EngineError> {
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(EngineError::Validation(problems.join("; ")));
        }
        let paths = WorkspacePaths::resolve(repo_root, &config.layout);
        let catalog = AchievementCatalog::load(&paths.achievements_dir, &paths.badge_templates_dir)?;
        let status = StatusListManager::open(paths.status_settings(&config))?;
        let state = load_state(&paths)?;
        tracing::info!(
            root = %paths.root.display(),
            wallets = state.directory.len(),
            achievements = catalog.ids().count(),
            signer = provider.verification_method(),
            "engine opened"
        );
        Ok(Self {
            slugs: SlugAllocator::new(config.slugs.clone()),
            config,
            paths,
            provider,
            catalog,
            status,
            state: Mutex::new(state),
        })
    }

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolved file locations.
    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    /// The achievement catalog.
    pub fn catalog(&self) -> &AchievementCatalog {
        &self.catalog
    }

    pub(crate) fn provider(&self) -> &dyn KeyProvider {
        self.provider.as_ref()
    }

    pub(crate) fn slugs(&self) -> &SlugAllocator {
        &self.slugs
    }

    /// A copy of the committed wallet directory.
    pub fn directory(&self) -> WalletDirectory {
        self.state.lock().directory.clone()
    }

    /// Number of requests in the replay ledger.
    pub fn ledger_len(&self) -> usize {
        self.state.lock().ledger.len()
    }

    /// A copy of the committed status registry.
    pub fn status_registry(&self) -> StatusRegistry {
        self.status.snapshot()
    }

    /// Status list statistics.
    pub fn status_stats(&self) -> StatusStats {
        self.status.stats()
    }

    /// Every live credential, in wallet then achievement order.
    pub fn credentials(&self) -> Vec<CredentialSummary> {
        let state = self.state.lock();
        state
            .directory
            .wallets()
            .flat_map(|w| {
                w.credentials.iter().map(move |(ach, record)| {
                    let key = w.key(ach);
                    CredentialSummary {
                        url: self.config.credential_url(&key),
                        credential: key,
                        email: w.email.clone(),
                        recipient_name: record.recipient_name.clone(),
                        status_list_index: record.status_list_index,
                        revoked: record.revoked,
                    }
                })
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Apply one request under the workspace lock.
    pub fn apply(&self, submission: &Submission) -> Result<Outcome, EngineError> {
        let _lock = self.lock()?;
        self.reload()?;
        self.execute(submission, Mode::Commit, None).map(|(o, _)| o)
    }

    /// Compute what `submission` would do without writing anything.
    /// Returns the outcome and the files that would change.
    pub fn plan(&self, submission: &Submission) -> Result<(Outcome, Vec<PathBuf>), EngineError> {
        let _lock = self.lock()?;
        self.reload()?;
        self.execute(submission, Mode::DryRun, None)
    }

    /// Apply requests in order under one lock. A rejected request is
    /// recorded in the report and the batch continues.
    ///
    /// In a dry run every request is planned against the committed state,
    /// so later requests do not see the effects of earlier ones.
    pub fn apply_batch(&self, submissions: &[Submission], dry_run: bool) -> Result<BatchReport, EngineError> {
        let _lock = self.lock()?;
        self.reload()?;
        let mode = if dry_run { Mode::DryRun } else { Mode::Commit };
        let entries = submissions
            .iter()
            .enumerate()
            .map(|(i, sub)| self.batch_entry(format!("#{i}"), sub, mode, None))
            .collect();
        Ok(BatchReport { entries, dry_run })
    }

    /// Process pending request files from the request directory, or only
    /// `only` when given. Applied files receive a `receipt`; rejected files
    /// are left untouched and retried on the next run.
    pub fn process_requests(&self, only: Option<&Path>, dry_run: bool) -> Result<BatchReport, EngineError> {
        let _lock = self.lock()?;
        self.reload()?;
        let files = match only {
            Some(path) => intake::read_request_file(path)?.into_iter().collect(),
            None => intake::pending_requests(&self.paths.requests_dir)?,
        };
        let mode = if dry_run { Mode::DryRun } else { Mode::Commit };
        let mut report = BatchReport {
            entries: Vec::with_capacity(files.len()),
            dry_run,
        };
        for file in &files {
            let entry = match file.submission() {
                Ok(sub) => self.batch_entry(file.name.clone(), &sub, mode, Some(file)),
                Err(e) => {
                    tracing::warn!(file = %file.name, error = %e, "request file rejected");
                    BatchEntry {
                        source: file.name.clone(),
                        state: RequestState::Rejected,
                        result: Err(e),
                        changes: Vec::new(),
                    }
                }
            };
            report.entries.push(entry);
        }
        tracing::info!(
            applied = report.applied().count(),
            rejected = report.rejected().count(),
            dry_run,
            "request files processed"
        );
        Ok(report)
    }

    /// Re-render and re-sign the status list from the registry.
    pub fn update_status_list(&self) -> Result<StatusStats, EngineError> {
        let _lock = self.lock()?;
        self.status.reload()?;
        let prepared = self.status.update(self.provider(), Timestamp::now())?;
        tracing::info!(version = prepared.registry.version, "status list re-signed");
        Ok(prepared.registry.stats())
    }

    /// Re-read the directory, ledger and status registry from disk.
    pub fn reload(&self) -> Result<(), EngineError> {
        self.status.reload()?;
        let fresh = load_state(&self.paths)?;
        *self.state.lock() = fresh;
        Ok(())
    }

    fn lock(&self) -> Result<WorkspaceLock, EngineError> {
        Ok(WorkspaceLock::acquire(&self.paths.lock_file, self.config.lock_timeout())?)
    }

    fn batch_entry(
        &self,
        source: String,
        submission: &Submission,
        mode: Mode,
        file: Option<&RequestFile>,
    ) -> BatchEntry {
        match self.execute(submission, mode, file) {
            Ok((outcome, changes)) => BatchEntry {
                source,
                state: RequestState::Applied,
                result: Ok(outcome),
                changes,
            },
            Err(e) => {
                tracing::warn!(%source, kind = ?e.kind(), error = %e, "request rejected");
                BatchEntry {
                    source,
                    state: RequestState::Rejected,
                    result: Err(e),
                    changes: Vec::new(),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    fn execute(
        &self,
        submission: &Submission,
        mode: Mode,
        file: Option<&RequestFile>,
    ) -> Result<(Outcome, Vec<PathBuf>), EngineError> {
        let request = &submission.request;
        submission.request.validate()?;
        let digest = submission.digest()?;
        tracing::debug!(request = request.type_name(), digest = %digest.to_hex(), "request validated");

        let mut state = self.state.lock();
        if let Some(seen) = state.ledger.get(&digest) {
            let outcome = Outcome::Unchanged {
                wallet: seen.wallet_slug.as_deref().and_then(|s| Slug::parse(s).ok()),
                credential: None,
                reason: format!("request already applied at {}", seen.applied_at),
            };
            return self.finish_unchanged(outcome, &digest, mode, file);
        }

        let now = Timestamp::now();
        let mut txn = self.status.begin();
        let mut draft = Draft {
            dir: state.directory.clone(),
            status: txn.registry_mut(),
            changes: ChangeSet::default(),
            now,
        };
        let outcome = match request {
            Request::Create(r) => self.create(&mut draft, r),
            Request::Update(r) => self.update(&mut draft, r),
            Request::Rename(r) => self.rename(&mut draft, r),
            Request::Remove(r) => self.remove(&mut draft, r),
            Request::Revoke(r) => self.revoke(&mut draft, r),
        }?;
        let Draft { dir, mut changes, .. } = draft;
        if outcome.is_unchanged() {
            drop(txn);
            drop(state);
            return self.finish_unchanged(outcome, &digest, mode, file);
        }

        let problems = dir.check_invariants();
        if !problems.is_empty() {
            return Err(EngineError::Conflict(format!(
                "request would break the wallet directory: {}",
                problems.join("; ")
            )));
        }

        let prepared = if txn.is_dirty() {
            let prepared = txn.prepare(self.provider(), now)?;
            changes.write(&self.paths.status_list, prepared.list_bytes.clone());
            changes.write(&self.paths.status_registry, prepared.registry_bytes.clone());
            Some(prepared)
        } else {
            None
        };
        if dir != state.directory {
            changes.write(&self.paths.wallet_registry, pretty_json(&dir)?);
        }
        let mut ledger = state.ledger.clone();
        ledger.record(
            &digest,
            LedgerEntry {
                applied_at: now,
                request_type: request.type_name().to_string(),
                outcome: outcome.kind().to_string(),
                wallet_slug: outcome.wallet_slug().map(ToString::to_string),
            },
        );
        changes.write(&self.paths.request_ledger, pretty_json(&ledger)?);
        if let Some(file) = file {
            changes.write(&file.path, file.with_receipt(&self.receipt(&outcome, &digest, now))?);
        }

        let touched: Vec<PathBuf> = changes.ops().iter().map(|(p, _)| p.clone()).collect();
        if mode == Mode::DryRun {
            tracing::info!(
                request = request.type_name(),
                outcome = outcome.kind(),
                files = touched.len(),
                "dry run, nothing written"
            );
            return Ok((outcome, touched));
        }

        changes.commit()?;
        if let Some(prepared) = prepared {
            txn.commit(prepared);
        }
        state.directory = dir;
        state.ledger = ledger;
        tracing::info!(
            request = request.type_name(),
            outcome = outcome.kind(),
            wallet = outcome.wallet_slug().map(Slug::as_str).unwrap_or("-"),
            files = touched.len(),
            "request applied"
        );
        Ok((outcome, touched))
    }

    /// A no-op writes nothing, except the receipt of a request file so the
    /// file is not picked up again.
    fn finish_unchanged(
        &self,
        outcome: Outcome,
        digest: &ContentDigest,
        mode: Mode,
        file: Option<&RequestFile>,
    ) -> Result<(Outcome, Vec<PathBuf>), EngineError> {
        tracing::info!(outcome = outcome.kind(), "request changed nothing");
        let Some(file) = file else {
            return Ok((outcome, Vec::new()));
        };
        let mut changes = ChangeSet::default();
        changes.write(&file.path, file.with_receipt(&self.receipt(&outcome, digest, Timestamp::now()))?);
        let touched = vec![file.path.clone()];
        if mode == Mode::Commit {
            changes.commit()?;
        }
        Ok((outcome, touched))
    }

    fn receipt(&self, outcome: &Outcome, digest: &ContentDigest, now: Timestamp) -> intake::Receipt {
        intake::Receipt {
            processed_at: now,
            outcome: outcome.kind().to_string(),
            wallet_slug: outcome.wallet_slug().map(ToString::to_string),
            credential_url: outcome.credential().map(|k| self.config.credential_url(k)),
            request_digest: digest.to_hex(),
        }
    }
}

fn load_state(paths: &WorkspacePaths) -> Result<EngineState, EngineError> {
    let directory: WalletDirectory = read_json_opt(&paths.wallet_registry)?.unwrap_or_default();
    let problems = directory.check_invariants();
    if !problems.is_empty() {
        return Err(EngineError::Persistence(format!(
            "{} is inconsistent: {}",
            paths.wallet_registry.display(),
            problems.join("; ")
        )));
    }
    let ledger: RequestLedger = read_json_opt(&paths.request_ledger)?.unwrap_or_default();
    Ok(EngineState { directory, ledger })
}
