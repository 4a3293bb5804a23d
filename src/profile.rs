//! Profiles and their storage namespaces.
//!
//! Profile resolution order:
//! 1) CLI --profile (explicit)
//! 2) SIMPLR_PROFILE environment variable
//! 3) Persisted value in `<data_dir>/active_profile`
//! 4) Config default (profile.default)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::Storage;

pub const PROFILE_ENV: &str = "SIMPLR_PROFILE";

/// Namespace selector. Exactly one profile is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Personal,
    Work,
}

impl Profile {
    pub const ALL: [Profile; 2] = [Profile::Personal, Profile::Work];

    pub fn tag(&self) -> &'static str {
        match self {
            Profile::Personal => "personal",
            Profile::Work => "work",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Profile::Personal => "Personal",
            Profile::Work => "Work",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "personal" => Ok(Profile::Personal),
            "work" => Ok(Profile::Work),
            other => Err(Error::UnknownProfile(other.to_string())),
        }
    }
}

/// Pure mapping from profile to storage keys.
///
/// `Personal` keeps the unprefixed keys written before profiles existed.
pub struct ProfilePartition;

impl ProfilePartition {
    pub fn tasks_key(profile: Profile) -> String {
        Self::scoped(profile, "tasks")
    }

    pub fn categories_key(profile: Profile) -> String {
        Self::scoped(profile, "categories")
    }

    pub fn filter_key(profile: Profile) -> String {
        Self::scoped(profile, "filter")
    }

    fn scoped(profile: Profile, base: &str) -> String {
        match profile {
            Profile::Personal => base.to_string(),
            other => format!("{}_{base}", other.tag()),
        }
    }
}

/// Resolve the active profile using CLI, environment, persisted value, and config.
pub fn resolve_profile(storage: &Storage, config: &Config, cli_profile: Option<&str>) -> Result<Profile> {
    if let Some(raw) = non_empty(cli_profile) {
        return raw.parse();
    }

    if let Ok(env_profile) = std::env::var(PROFILE_ENV) {
        if let Some(raw) = non_empty(Some(env_profile.as_str())) {
            return raw.parse();
        }
    }

    if let Some(profile) = load_persisted_profile(storage)? {
        return Ok(profile);
    }

    config.default_profile()
}

/// Persist the active profile tag.
pub fn persist_profile(storage: &Storage, profile: Profile) -> Result<()> {
    std::fs::create_dir_all(storage.data_dir())?;
    crate::lock::write_atomic(
        storage.active_profile_file(),
        format!("{}\n", profile.tag()).as_bytes(),
    )
}

/// Load the persisted active profile, if present. Unknown tags read as absent.
pub fn load_persisted_profile(storage: &Storage) -> Result<Option<Profile>> {
    let path = storage.active_profile_file();
    if !path.exists() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(&path)?;
    match non_empty(Some(raw.as_str())) {
        Some(tag) => match tag.parse() {
            Ok(profile) => Ok(Some(profile)),
            Err(_) => {
                tracing::warn!("ignoring unknown persisted profile '{tag}'");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}
