//! Categories: the persisted per-profile collection and its lookup cache.
//!
//! Built-in categories carry fixed well-known ids. Tasks reference categories
//! by id only; an id that no longer resolves reads as [`uncategorized`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, PersistError, Result};
use crate::profile::{Profile, ProfilePartition};
use crate::storage::Storage;
use crate::task::Task;

pub const UNCATEGORIZED_ID: &str = "uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub is_custom: bool,
}

impl Category {
    pub fn custom(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            color: color.into(),
            is_custom: true,
        }
    }

    fn builtin(id: &str, name: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            is_custom: false,
        }
    }
}

const BUILTINS: [(&str, &str, &str); 5] = [
    ("builtin.work", "Work", "blue"),
    ("builtin.personal", "Personal", "green"),
    ("builtin.shopping", "Shopping", "orange"),
    ("builtin.health", "Health", "red"),
    ("builtin.learning", "Learning", "purple"),
];

/// The built-in categories, in seeding order.
pub fn builtin_categories() -> Vec<Category> {
    BUILTINS
        .iter()
        .map(|(id, name, color)| Category::builtin(id, name, color))
        .collect()
}

pub fn is_builtin_id(id: &str) -> bool {
    BUILTINS.iter().any(|(builtin_id, _, _)| *builtin_id == id)
}

/// Placeholder returned for missing or dangling category ids.
pub fn uncategorized() -> Category {
    Category::builtin(UNCATEGORIZED_ID, "Uncategorized", "gray")
}

/// Add any missing built-ins. Never touches existing entries.
pub fn seed_builtins(categories: &mut Vec<Category>) -> usize {
    let mut added = 0;
    for builtin in builtin_categories() {
        if !categories.iter().any(|category| category.id == builtin.id) {
            categories.push(builtin);
            added += 1;
        }
    }
    added
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Built-in categories found under a regenerated id.
    pub categories_fixed: usize,
    /// Tasks whose `category_id` was rewritten to the well-known id.
    pub tasks_rewritten: usize,
}

/// Restore well-known ids for built-ins that were stored under a random id,
/// and point affected tasks back at the well-known id.
pub fn repair_builtin_ids(categories: &mut Vec<Category>, tasks: &mut [Task]) -> RepairReport {
    let mut remap: HashMap<String, String> = HashMap::new();
    for category in categories.iter() {
        if category.is_custom || is_builtin_id(&category.id) {
            continue;
        }
        let known = BUILTINS
            .iter()
            .find(|(_, name, _)| name.eq_ignore_ascii_case(category.name.trim()));
        if let Some((id, _, _)) = known {
            remap.insert(category.id.clone(), id.to_string());
        }
    }

    let mut report = RepairReport::default();
    if remap.is_empty() {
        return report;
    }

    let mut repaired: Vec<Category> = Vec::with_capacity(categories.len());
    for mut category in categories.drain(..) {
        if let Some(known_id) = remap.get(&category.id) {
            report.categories_fixed += 1;
            category.id = known_id.clone();
        }
        if !repaired.iter().any(|existing| existing.id == category.id) {
            repaired.push(category);
        }
    }
    *categories = repaired;

    for task in tasks.iter_mut() {
        let Some(current) = task.category_id.as_ref() else {
            continue;
        };
        if let Some(known_id) = remap.get(current) {
            task.category_id = Some(known_id.clone());
            report.tasks_rewritten += 1;
        }
    }
    report
}

/// TTL-bounded id -> category map.
///
/// A full rebuild happens on every category change. After the TTL lapses, a
/// miss scans the authoritative list and inserts only that entry.
#[derive(Debug)]
pub struct CategoryCache {
    ttl: Duration,
    entries: HashMap<String, Category>,
    built_at: Option<Instant>,
}

impl CategoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            built_at: None,
        }
    }

    pub fn rebuild(&mut self, categories: &[Category]) {
        self.entries = categories
            .iter()
            .map(|category| (category.id.clone(), category.clone()))
            .collect();
        self.built_at = Some(Instant::now());
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.built_at = None;
    }

    pub fn is_fresh(&self) -> bool {
        self.built_at
            .map(|built_at| built_at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    pub fn cached_len(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&mut self, id: &str, authoritative: &[Category]) -> Option<Category> {
        if let Some(hit) = self.entries.get(id) {
            return Some(hit.clone());
        }
        if self.is_fresh() {
            return None;
        }
        let found = authoritative.iter().find(|category| category.id == id)?.clone();
        self.entries.insert(found.id.clone(), found.clone());
        Some(found)
    }
}

/// Persisted category collection for one profile, fronted by a cache.
#[derive(Debug)]
pub struct CategoryStore {
    storage: Storage,
    profile: Profile,
    categories: Vec<Category>,
    cache: CategoryCache,
    unreadable: bool,
}

impl CategoryStore {
    /// Open the collection for `profile`, seeding built-ins when missing.
    pub fn open(storage: Storage, profile: Profile, cache_ttl: Duration) -> Self {
        let mut store = Self {
            storage,
            profile,
            categories: Vec::new(),
            cache: CategoryCache::new(cache_ttl),
            unreadable: false,
        };
        store.refresh();
        store
    }

    pub fn key(&self) -> String {
        ProfilePartition::categories_key(self.profile)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Reload from disk, re-seed built-ins, rebuild the cache. If the file
    /// cannot be read, built-ins are served and saves are refused.
    pub fn refresh(&mut self) {
        let mut categories = match self.load() {
            Ok(categories) => {
                self.unreadable = false;
                categories
            }
            Err(err) => {
                let key = self.key();
                tracing::warn!("cannot read {key}, saves disabled until it loads: {err}");
                self.unreadable = true;
                self.categories = builtin_categories();
                self.cache.rebuild(&self.categories);
                return;
            }
        };
        let added = seed_builtins(&mut categories);
        if added > 0 {
            tracing::debug!("seeded {added} built-in categories for {}", self.profile);
            if let Err(err) = self.save(&categories) {
                tracing::warn!("cannot persist seeded categories: {err}");
            }
        }
        self.categories = categories;
        self.cache.rebuild(&self.categories);
    }

    /// Persisted categories; undecodable data reads as empty.
    pub fn load(&self) -> std::result::Result<Vec<Category>, PersistError> {
        let key = self.key();
        let Some(bytes) = self.storage.read_key(&key)? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            tracing::warn!("cannot decode {key}, reseeding: {err}");
            Vec::new()
        }))
    }

    pub fn save(&self, categories: &[Category]) -> std::result::Result<(), PersistError> {
        self.storage.write_key(&self.key(), categories)
    }

    pub fn lookup(&mut self, id: &str) -> Option<Category> {
        self.cache.lookup(id, &self.categories)
    }

    /// Lookup with the "uncategorized" fallback for absent or dangling ids.
    pub fn resolve(&mut self, id: Option<&str>) -> Category {
        id.and_then(|id| self.lookup(id)).unwrap_or_else(uncategorized)
    }

    pub fn invalidate_cache(&mut self) {
        self.cache.invalidate();
    }

    pub fn add(&mut self, name: &str, color: &str) -> Result<Category> {
        let name = validate_name(name)?;
        let category = Category::custom(name, color.trim());
        let mut next = self.categories.clone();
        next.push(category.clone());
        self.commit(next)?;
        Ok(category)
    }

    pub fn update(&mut self, id: &str, name: Option<&str>, color: Option<&str>) -> Result<Category> {
        let mut next = self.categories.clone();
        let slot = next
            .iter_mut()
            .find(|category| category.id == id)
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;
        if let Some(name) = name {
            slot.name = validate_name(name)?;
        }
        if let Some(color) = color {
            slot.color = color.trim().to_string();
        }
        let updated = slot.clone();
        self.commit(next)?;
        Ok(updated)
    }

    /// Delete a custom category. Tasks keep their dangling id.
    pub fn delete(&mut self, id: &str) -> Result<Category> {
        let index = self
            .categories
            .iter()
            .position(|category| category.id == id)
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;
        if !self.categories[index].is_custom {
            return Err(Error::BuiltinCategory(id.to_string()));
        }
        let mut next = self.categories.clone();
        let removed = next.remove(index);
        self.commit(next)?;
        Ok(removed)
    }

    /// Repaired collection for `tasks`, whose ids are rewritten in place.
    /// Nothing is saved: persist the tasks, then [`Self::commit_repair`].
    pub fn plan_repair(&self, tasks: &mut [Task]) -> (Vec<Category>, RepairReport) {
        let mut next = self.categories.clone();
        let report = repair_builtin_ids(&mut next, tasks);
        seed_builtins(&mut next);
        (next, report)
    }

    pub fn commit_repair(&mut self, repaired: Vec<Category>) -> Result<()> {
        self.commit(repaired)
    }

    fn commit(&mut self, next: Vec<Category>) -> Result<()> {
        if self.unreadable {
            return Err(PersistError::Unreadable { key: self.key() }.into());
        }
        self.save(&next)?;
        self.categories = next;
        self.cache.rebuild(&self.categories);
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument(
            "category name cannot be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
