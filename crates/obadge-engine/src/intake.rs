//! # Request Files
//!
//! Pending requests are JSON files in the request directory, processed in
//! file-name order. A file is skipped when
//!
//! - its name starts with `_` or `.` (templates, editor droppings),
//! - it already carries a `receipt` object, or
//! - it carries a legacy processed marker (`"status": "issued"` and
//!   friends).
//!
//! An applied request gets a `receipt` written into its own file as part of
//! the request's change set. A rejected file is left as it was and is
//! retried on the next run. The file name is the default `request_id`, so
//! two files with identical content are two distinct submissions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use obadge_core::{StorageError, Timestamp};

use crate::engine::pretty_json;
use crate::error::EngineError;
use crate::request::Submission;

/// `status` values older tooling wrote into processed request files.
const LEGACY_PROCESSED: &[&str] = &["issued", "updated", "renamed", "removed", "processed"];

/// Written into a request file once it has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// When the request was applied.
    pub processed_at: Timestamp,
    /// Outcome kind.
    pub outcome: String,
    /// Wallet affected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_slug: Option<String>,
    /// Public URL of the credential concerned, when there is exactly one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_url: Option<String>,
    /// Hex replay digest.
    pub request_digest: String,
}

/// One request file.
#[derive(Debug, Clone)]
pub struct RequestFile {
    /// Location.
    pub path: PathBuf,
    /// File name, used as the batch source and default `request_id`.
    pub name: String,
    body: Result<Map<String, Value>, EngineError>,
}

impl RequestFile {
    /// The submission this file holds.
    pub fn submission(&self) -> Result<Submission, EngineError> {
        let body = self.body.clone()?;
        let id_given = body.contains_key("request_id");
        let sub = Submission::from_value(&Value::Object(body))?;
        Ok(if id_given { sub } else { sub.with_id(self.name.clone()) })
    }

    /// The file's bytes with `receipt` set.
    pub fn with_receipt(&self, receipt: &Receipt) -> Result<Vec<u8>, EngineError> {
        let mut body = self.body.clone()?;
        let value = serde_json::to_value(receipt)
            .map_err(|e| EngineError::Persistence(format!("receipt serialization failed: {e}")))?;
        body.insert("receipt".into(), value);
        pretty_json(&body)
    }
}

fn is_processed(body: &Map<String, Value>) -> bool {
    body.get("receipt").is_some_and(Value::is_object)
        || body
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| LEGACY_PROCESSED.contains(&s))
}

/// Read one request file. `Ok(None)` means the file is already processed.
/// Unparseable JSON is returned as a file whose submission is an error.
pub fn read_request_file(path: &Path) -> Result<Option<RequestFile>, EngineError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EngineError::Validation(format!("bad request file name {}", path.display())))?
        .to_string();
    let bytes = std::fs::read(path).map_err(|e| StorageError::io(path, e))?;
    let body = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(EngineError::Validation("request must be a JSON object".into())),
        Err(e) => Err(EngineError::Validation(format!("request is not valid JSON: {e}"))),
    };
    if body.as_ref().is_ok_and(is_processed) {
        tracing::debug!(file = %name, "already processed, skipped");
        return Ok(None);
    }
    Ok(Some(RequestFile {
        path: path.to_path_buf(),
        name,
        body,
    }))
}

/// Every unprocessed `*.json` file in `dir`, sorted by name. A missing
/// directory has no pending requests.
pub fn pending_requests(dir: &Path) -> Result<Vec<RequestFile>, EngineError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(dir, e).into()),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| StorageError::io(dir, e))?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('_') || name.starts_with('.') || !name.ends_with(".json") || !path.is_file() {
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        if let Some(file) = read_request_file(&path)? {
            files.push(file);
        }
    }
    tracing::debug!(dir = %dir.display(), pending = files.len(), "request directory scanned");
    Ok(files)
}
