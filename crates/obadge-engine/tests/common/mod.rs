//! Shared fixture: a throwaway credentials repository with two catalog
//! achievements, badge templates and a freshly generated issuer key.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;

use obadge_crypto::Ed25519PublicKey;
use obadge_engine::{keys, Engine, EngineConfig, Outcome, Submission, WorkspacePaths};

/// A 1x1 RGBA PNG.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0b, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x60,
    0x00, 0x02, 0x00, 0x00, 0x05, 0x00, 0x01, 0x7a, 0x5e, 0xab, 0x3f, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

pub const TSC_SVG: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="120" height="120" viewBox="0 0 120 120">
  <circle cx="60" cy="60" r="56" fill="#1d3557"/>
  <text x="60" y="66" text-anchor="middle" fill="#fff">TSC</text>
</svg>
"##;

pub const TSC: &str = "tsc-member-2026";
pub const CONTRIB: &str = "contributor-cognipilot";

pub struct Fixture {
    pub dir: TempDir,
    pub config: EngineConfig,
    pub engine: Engine,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut EngineConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("achievements").join(format!("{TSC}.json")),
            &json!({
                "id": format!("https://credentials.cognipilot.org/achievements/{TSC}"),
                "type": "Achievement",
                "name": "TSC Member 2026",
                "description": "Member of the CogniPilot Technical Steering Committee for 2026.",
                "achievementType": "Membership",
                "image": {"id": "https://credentials.cognipilot.org/images/badges/tsc-member.svg", "type": "Image"},
                "criteria": {"narrative": "Elected to the TSC."}
            })
            .to_string(),
        );
        write(
            &root.join("achievements").join(format!("{CONTRIB}.json")),
            &json!({
                "id": format!("https://credentials.cognipilot.org/achievements/{CONTRIB}"),
                "type": "Achievement",
                "name": "CogniPilot Contributor",
                "criteria": {"narrative": "Merged contribution."}
            })
            .to_string(),
        );
        let badges = root.join("docs/images/badges");
        write(&badges.join("tsc-member.svg"), TSC_SVG);
        std::fs::write(badges.join("tsc-member.png"), TINY_PNG).unwrap();

        let mut config = EngineConfig::default();
        config.signing_key_env = None;
        tweak(&mut config);
        keys::generate(&root.join("keys"), &config.issuer.id, "key-1", false).unwrap();
        let engine = open(root, &config);
        Self { dir, config, engine }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> &WorkspacePaths {
        self.engine.paths()
    }

    /// A second engine on the same repository, as another process would
    /// see it.
    pub fn reopen(&self) -> Engine {
        open(self.root(), &self.config)
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        keys::public_key(&self.paths().public_key).unwrap()
    }

    pub fn read_json(&self, path: &Path) -> Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    pub fn apply(&self, request: Value) -> Outcome {
        self.engine.apply(&sub(request)).unwrap()
    }

    /// Every regular file under the repository, relative, sorted, with
    /// contents. Used to prove that nothing was written.
    pub fn snapshot(&self) -> Vec<(PathBuf, Vec<u8>)> {
        let mut out = Vec::new();
        walk(self.root(), self.root(), &mut out);
        out.sort();
        out
    }
}

fn open(root: &Path, config: &EngineConfig) -> Engine {
    let paths = WorkspacePaths::resolve(root, &config.layout);
    let provider = keys::signing_provider(config, &paths).unwrap();
    Engine::open(config.clone(), root, provider).unwrap()
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, Vec<u8>)>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            walk(root, &path, out);
        } else if path.file_name().and_then(|n| n.to_str()) != Some(".obadge.lock") {
            let rel = path.strip_prefix(root).unwrap().to_path_buf();
            out.push((rel, std::fs::read(&path).unwrap()));
        }
    }
}

pub fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

pub fn sub(request: Value) -> Submission {
    Submission::from_value(&request).unwrap()
}

pub fn issue(name: &str, email: &str, achievement: &str) -> Value {
    json!({
        "request_type": "issue",
        "recipient_name": name,
        "recipient_email": email,
        "achievement": achievement,
        "valid_from": "2025-01-01"
    })
}
