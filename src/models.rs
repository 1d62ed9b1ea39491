//! Data models for the hours tracker.
//!
//! This module contains the read model shared by every job: the
//! item → category → project → team hierarchy, users and their provider
//! credentials, and the status buckets used by reporting.

use crate::analysis::{apply_buffer, sum_category_field, sum_item_field, HourField};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A single estimated line item. Leaf of the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub description: String,
    /// Estimated hours.
    #[serde(default)]
    pub estimated: Decimal,
    /// Hours actually logged, usually written by a provider import.
    #[serde(default)]
    pub actual: Decimal,
}

/// A named group of items within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Category {
    /// Sum of the items' actual hours (0 when empty).
    pub fn actual(&self) -> Decimal {
        sum_item_field(&self.items, HourField::Actual)
    }

    /// Sum of the items' estimated hours (0 when empty).
    pub fn estimated(&self) -> Decimal {
        sum_item_field(&self.items, HourField::Estimated)
    }
}

/// One entry of a project's weekly history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekHours {
    /// Hours logged during the week.
    pub hours: Decimal,
    /// Short date label of the recomputation run, e.g. "Jul 04".
    pub label: String,
}

/// A project owned by a team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub team_id: u64,
    pub name: String,
    /// Percentage markup applied to the raw estimate (0-100).
    #[serde(default)]
    pub buffer_percent: u8,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Project actual at the time of the previous weekly run.
    #[serde(default)]
    pub last_weeks_hours: Decimal,
    /// Weekly deltas, newest first.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub previous_weeks_hours: Vec<WeekHours>,
    /// When a provider import last touched this project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_imported_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Creates an empty project with no history.
    #[cfg(test)]
    pub fn new(id: u64, team_id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            team_id,
            name: name.into(),
            buffer_percent: 0,
            archived: false,
            categories: Vec::new(),
            last_weeks_hours: Decimal::ZERO,
            previous_weeks_hours: Vec::new(),
            last_imported_at: None,
        }
    }

    /// Sum of the categories' actual hours. Archiving does not affect it.
    pub fn actual(&self) -> Decimal {
        sum_category_field(&self.categories, HourField::Actual)
    }

    /// Sum of the categories' estimates with the buffer applied, rounded to 2 dp.
    pub fn estimated(&self) -> Decimal {
        apply_buffer(
            sum_category_field(&self.categories, HourField::Estimated),
            self.buffer_percent,
        )
    }

    /// All items across every category.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.categories.iter().flat_map(|c| c.items.iter())
    }

    /// Whether the project has at least one line item.
    pub fn has_items(&self) -> bool {
        self.items().next().is_some()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<WeekHours>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<WeekHours>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A team owns projects and is the rollup boundary for weekly reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub name: String,
    pub creator_id: u64,
    #[serde(default)]
    pub on_trial: bool,
    pub trial_expires_at: DateTime<Utc>,
}

impl Team {
    /// Creates a team whose trial runs for `trial_days` from `now`.
    #[cfg(test)]
    pub fn new_trial(
        id: u64,
        name: impl Into<String>,
        creator_id: u64,
        now: DateTime<Utc>,
        trial_days: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            creator_id,
            on_trial: true,
            trial_expires_at: now + chrono::Duration::days(trial_days),
        }
    }
}

/// Role of a user within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Owner,
}

/// Whether the membership has been accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipState {
    Invited,
    #[default]
    Joined,
}

/// Links a user to a team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub team_id: u64,
    pub user_id: u64,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub state: MembershipState,
}

/// OAuth token pair for Harvest.
///
/// Tokens are only replaced through [`HarvestCredentials::set_tokens`] so
/// the refresh timestamp always moves with them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestCredentials {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tokens_last_refreshed_at: Option<DateTime<Utc>>,
}

impl HarvestCredentials {
    #[cfg(test)]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        refreshed_at: DateTime<Utc>,
    ) -> Self {
        let mut credentials = Self::default();
        credentials.set_tokens(access_token, refresh_token, refreshed_at);
        credentials
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn tokens_last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.tokens_last_refreshed_at
    }

    /// True when an access token is stored.
    pub fn is_connected(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Replaces both tokens and stamps the refresh time.
    pub fn set_tokens(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.access_token = access_token.into();
        self.refresh_token = refresh_token.into();
        self.tokens_last_refreshed_at = Some(now);
    }

    /// Drops the tokens so the user has to reconnect Harvest.
    pub fn clear(&mut self) {
        self.access_token.clear();
        self.refresh_token.clear();
        self.tokens_last_refreshed_at = None;
    }
}

/// Per-user provider settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub harvest: HarvestCredentials,
    #[serde(default)]
    pub toggl_api_key: String,
}

/// An account holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub profile: UserProfile,
}

impl User {
    #[cfg(test)]
    pub fn new(id: u64, email: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: first_name.into(),
            last_name: String::new(),
            profile: UserProfile::default(),
        }
    }
}

/// How a project or item is tracking against its estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Actual exceeds the estimate.
    Over,
    /// Less than 10% of the estimate left.
    Close,
    /// Comfortably within the estimate.
    Under,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Over => write!(f, "over"),
            Status::Close => write!(f, "close"),
            Status::Under => write!(f, "under"),
        }
    }
}

impl Status {
    /// Color keyword used by the email template.
    pub fn color(&self) -> &'static str {
        match self {
            Status::Over => "red",
            Status::Close => "yellow",
            Status::Under => "green",
        }
    }

    /// Hex code matching [`Status::color`].
    pub fn hex(&self) -> &'static str {
        match self {
            Status::Over => "#E74C3C",
            Status::Close => "#F5A623",
            Status::Under => "#2ECC71",
        }
    }
}

/// Item counts per status bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub under: usize,
    pub close: usize,
    pub over: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Under => self.under += 1,
            Status::Close => self.close += 1,
            Status::Over => self.over += 1,
        }
    }
}

/// Snapshot of one project prepared for weekly reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: u64,
    pub name: String,
    pub estimated: Decimal,
    pub actual: Decimal,
    pub hours_diff: Decimal,
    pub status: Status,
    pub items: StatusCounts,
    pub previous_weeks_hours: Vec<WeekHours>,
}
