use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use crate::errors::PlaylistError;
use crate::models::{Category, Playlist, RawCategory};

/// Playlist labels keyed by playlist id, in insertion order. Every key equals
/// the id stored in its entry.
#[derive(Debug, Clone, Default)]
pub struct CategoriesRegistry {
    registry: IndexMap<String, Category>,
}

impl CategoriesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from an already keyed map, rejecting any entry whose
    /// key differs from its own id.
    pub fn from_map(map: IndexMap<String, Category>) -> Result<Self, PlaylistError> {
        validate_map(&map)?;
        Ok(Self { registry: map })
    }

    /// Bulk upsert. Nothing is merged when any record is invalid.
    pub fn add_categories(&mut self, categories: Vec<Category>) -> Result<(), PlaylistError> {
        let mut mergeable = IndexMap::with_capacity(categories.len());
        for category in categories {
            validate_category(&category)?;
            mergeable.insert(category.id.clone(), category);
        }
        validate_map(&mergeable)?;
        self.registry.extend(mergeable);
        Ok(())
    }

    pub fn add_raw_categories(&mut self, raw: Vec<RawCategory>) -> Result<(), PlaylistError> {
        let categories = raw
            .into_iter()
            .enumerate()
            .map(|(index, record)| into_category(index, record))
            .collect::<Result<Vec<_>, _>>()?;
        self.add_categories(categories)
    }

    /// Loads a JSON array of categories. A missing file is not an error.
    pub fn add_categories_from_file(&mut self, path: &Path) -> Result<(), PlaylistError> {
        if !path.exists() {
            debug!(path = %path.display(), "categories file not found, skipping");
            return Ok(());
        }
        let content = fs::read_to_string(path)?;
        let raw: Vec<RawCategory> = serde_json::from_str(&content)
            .map_err(|err| PlaylistError::InvalidCategory(format!("{}: {err}", path.display())))?;
        self.add_raw_categories(raw)
    }

    /// Registers unseen playlists as syncable playlist categories. Existing
    /// entries are left untouched.
    pub fn add_playlists_as_new_categories(&mut self, playlists: &[Playlist]) -> usize {
        let mut added = 0;
        for playlist in playlists {
            if self.registry.contains_key(&playlist.id) {
                continue;
            }
            let label = playlist
                .title
                .as_deref()
                .filter(|title| !title.is_empty())
                .unwrap_or(&playlist.id);
            self.registry.insert(
                playlist.id.clone(),
                Category::playlist(playlist.id.clone(), label, true),
            );
            added += 1;
        }
        added
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Category> {
        self.registry.get(id)
    }

    pub fn label_for<'a>(&'a self, id: &'a str) -> &'a str {
        self.registry
            .get(id)
            .map(|category| category.label.as_str())
            .unwrap_or(id)
    }

    pub fn syncable_playlist_ids(&self) -> Vec<String> {
        self.registry
            .values()
            .filter(|category| category.is_syncable_playlist())
            .map(|category| category.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn to_categories(&self) -> Vec<Category> {
        self.registry.values().cloned().collect()
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), PlaylistError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.to_categories())
            .map_err(|err| PlaylistError::InvalidJson(err.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }
}

fn validate_category(category: &Category) -> Result<(), PlaylistError> {
    if category.id.trim().is_empty() {
        return Err(PlaylistError::InvalidCategory("id不能为空".to_string()));
    }
    if category.kind.trim().is_empty() {
        return Err(PlaylistError::InvalidCategory(format!(
            "{}: type不能为空",
            category.id
        )));
    }
    Ok(())
}

fn validate_map(map: &IndexMap<String, Category>) -> Result<(), PlaylistError> {
    for (key, category) in map {
        if key != &category.id {
            return Err(PlaylistError::InvalidCategory(format!(
                "键 {key} 与记录id {} 不一致",
                category.id
            )));
        }
        validate_category(category)?;
    }
    Ok(())
}

fn into_category(index: usize, raw: RawCategory) -> Result<Category, PlaylistError> {
    let missing =
        |field: &str| PlaylistError::InvalidCategory(format!("第{index}条记录缺少{field}"));
    Ok(Category {
        id: raw.id.ok_or_else(|| missing("id"))?,
        label: raw.label.ok_or_else(|| missing("label"))?,
        kind: raw.kind.ok_or_else(|| missing("type"))?,
        syncable: raw.syncable.ok_or_else(|| missing("syncable"))?,
    })
}
