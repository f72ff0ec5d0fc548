//! # Achievement Catalog
//!
//! Achievement definitions live in `achievements/<id>.json`; the file stem is
//! the achievement id used in requests and credential paths. Badge templates
//! are looked up in the template directory by the last segment of the
//! achievement's image URL, with the PNG template sharing the SVG's stem.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use obadge_bake::ImageKind;
use obadge_core::fsio::read_bytes_opt;
use obadge_core::{AchievementId, StorageError};
use obadge_vc::AchievementTemplate;

use crate::error::EngineError;

/// All known achievements.
#[derive(Debug, Clone, Default)]
pub struct AchievementCatalog {
    achievements: BTreeMap<AchievementId, AchievementTemplate>,
    templates_dir: PathBuf,
}

impl AchievementCatalog {
    /// Load every `*.json` in `dir`. A missing directory is an empty catalog.
    pub fn load(dir: &Path, templates_dir: &Path) -> Result<Self, EngineError> {
        let mut achievements = BTreeMap::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %dir.display(), "achievement directory missing");
                return Ok(Self {
                    achievements,
                    templates_dir: templates_dir.to_path_buf(),
                });
            }
            Err(e) => return Err(StorageError::io(dir, e).into()),
        };
        for entry in entries {
            let path = entry.map_err(|e| StorageError::io(dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = AchievementId::parse(stem)?;
            let bytes = std::fs::read(&path).map_err(|e| StorageError::io(&path, e))?;
            let template: AchievementTemplate = serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::json(&path, e))?;
            achievements.insert(id, template);
        }
        tracing::debug!(count = achievements.len(), "achievement catalog loaded");
        Ok(Self {
            achievements,
            templates_dir: templates_dir.to_path_buf(),
        })
    }

    /// Build from in-memory definitions.
    pub fn from_templates(
        achievements: impl IntoIterator<Item = (AchievementId, AchievementTemplate)>,
        templates_dir: &Path,
    ) -> Self {
        Self {
            achievements: achievements.into_iter().collect(),
            templates_dir: templates_dir.to_path_buf(),
        }
    }

    /// The definition of `id`, or `NotFound`.
    pub fn get(&self, id: &AchievementId) -> Result<&AchievementTemplate, EngineError> {
        self.achievements
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("achievement {id} is not in the catalog")))
    }

    /// Known achievement ids.
    pub fn ids(&self) -> impl Iterator<Item = &AchievementId> {
        self.achievements.keys()
    }

    /// Path of the badge template of `kind` for `id`, if the achievement
    /// names an image.
    pub fn template_path(&self, id: &AchievementId, kind: ImageKind) -> Option<PathBuf> {
        let file = self.achievements.get(id)?.image_file_name()?;
        let stem = Path::new(file).file_stem()?.to_str()?;
        Some(self.templates_dir.join(format!("{stem}.{}", kind.extension())))
    }

    /// The badge template bytes, or `None` when there is no template.
    pub fn template(&self, id: &AchievementId, kind: ImageKind) -> Result<Option<Vec<u8>>, EngineError> {
        match self.template_path(id, kind) {
            Some(path) => Ok(read_bytes_opt(&path)?),
            None => Ok(None),
        }
    }
}
