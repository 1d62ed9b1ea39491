//! JSON data store.
//!
//! Holds the read model every job works on: users, teams, memberships,
//! projects and the notification cache. The whole file is loaded at the
//! start of a run and written back atomically at the end.

use crate::models::{Item, Membership, Project, Team, User};
use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Largest buffer a project may carry, in percent.
const MAX_BUFFER_PERCENT: u8 = 100;

/// Keys with an expiry, used to avoid repeating notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationCache {
    #[serde(default)]
    entries: BTreeMap<String, DateTime<Utc>>,
}

impl NotificationCache {
    /// Whether `key` is set and not yet expired.
    pub fn contains(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(key)
            .map(|expires_at| *expires_at > now)
            .unwrap_or(false)
    }

    /// Sets `key` until `now + ttl`.
    pub fn insert(&mut self, key: impl Into<String>, ttl: Duration, now: DateTime<Utc>) {
        self.entries.insert(key.into(), now + ttl);
    }

    /// Drops expired keys.
    pub fn purge(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, expires_at| *expires_at > now);
    }
}

/// The persisted read model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub memberships: Vec<Membership>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub notifications: NotificationCache,
}

impl Store {
    /// Load the store from a JSON file. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No data file at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data file: {}", path.display()))?;

        let store: Store = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse data file: {}", path.display()))?;

        store
            .validate()
            .with_context(|| format!("Invalid data file: {}", path.display()))?;

        Ok(store)
    }

    /// Checks the hour and buffer ranges of every project.
    pub fn validate(&self) -> Result<()> {
        for project in &self.projects {
            validate_project(project)
                .with_context(|| format!("Project {} ({})", project.id, project.name))?;
        }
        Ok(())
    }

    /// Write the store next to `path` and rename it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut file, self).context("Failed to serialize data")?;
        file.write_all(b"\n")?;
        file.persist(path)
            .with_context(|| format!("Failed to write data file: {}", path.display()))?;

        debug!("Saved data file {}", path.display());
        Ok(())
    }

    pub fn user(&self, user_id: u64) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    /// The team a user belongs to, if any.
    pub fn team_id_for_user(&self, user_id: u64) -> Option<u64> {
        self.memberships
            .iter()
            .find(|m| m.user_id == user_id)
            .map(|m| m.team_id)
    }

    /// Projects owned by a team.
    pub fn team_projects(&self, team_id: u64) -> impl Iterator<Item = &Project> {
        self.projects.iter().filter(move |p| p.team_id == team_id)
    }

    /// Mutable projects owned by a team.
    pub fn team_projects_mut(&mut self, team_id: u64) -> impl Iterator<Item = &mut Project> {
        self.projects.iter_mut().filter(move |p| p.team_id == team_id)
    }
}

fn validate_project(project: &Project) -> Result<()> {
    ensure!(
        project.buffer_percent <= MAX_BUFFER_PERCENT,
        "buffer_percent {} is above {}",
        project.buffer_percent,
        MAX_BUFFER_PERCENT
    );
    ensure!(
        project.last_weeks_hours >= Decimal::ZERO,
        "last_weeks_hours {} is negative",
        project.last_weeks_hours
    );

    for category in &project.categories {
        for item in &category.items {
            validate_item(item).with_context(|| {
                format!(
                    "Item {} ({}) in category {}",
                    item.id, item.description, category.name
                )
            })?;
        }
    }
    Ok(())
}

fn validate_item(item: &Item) -> Result<()> {
    ensure!(
        item.estimated >= Decimal::ZERO,
        "estimated hours {} are negative",
        item.estimated
    );
    ensure!(
        item.actual >= Decimal::ZERO,
        "actual hours {} are negative",
        item.actual
    );
    Ok(())
}
