//! Time-tracking providers.
//!
//! Each provider pulls time entries for a project from an external service
//! and writes the matched totals into the project's line items.

pub mod harvest;
pub mod toggl;

pub use harvest::HarvestProvider;
pub use toggl::TogglProvider;

use crate::models::{Category, Item, Project};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use thiserror::Error;

/// The supported time-tracking services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Harvest,
    Toggl,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Harvest => write!(f, "Harvest"),
            ProviderKind::Toggl => write!(f, "Toggl"),
        }
    }
}

/// Errors raised while talking to a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no Harvest account is available for this token")]
    MissingAccount,

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// A service that can fill in a project's actual hours.
#[allow(async_fn_in_trait)]
pub trait TimeTracker {
    /// What the service needs to authenticate a user.
    type Credentials;

    fn kind(&self) -> ProviderKind;

    /// Overwrites every line item's `actual` with the hours tracked for it.
    ///
    /// Returns `Ok(false)` when there was nothing to update: the project has
    /// no line items or no project with the same name exists upstream.
    async fn update_project_line_item_times(
        &self,
        credentials: &Self::Credentials,
        project: &mut Project,
        now: DateTime<Utc>,
    ) -> Result<bool, ProviderError>;
}

/// Sets each item's actual hours from `totals`, zero when it has no entry.
pub fn apply_line_item_totals<F>(project: &mut Project, totals: &HashMap<String, Decimal>, key: F)
where
    F: Fn(&str, &Item) -> String,
{
    for Category { name, items, .. } in project.categories.iter_mut() {
        for item in items.iter_mut() {
            let total = totals.get(&key(name.as_str(), item)).copied();
            item.actual = total.unwrap_or(Decimal::ZERO);
        }
    }
}

/// First day of the import window.
pub fn lookback_start(now: DateTime<Utc>, weeks: i64) -> NaiveDate {
    (now - Duration::weeks(weeks)).date_naive()
}

/// One page of a paginated listing.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of the following page, `None` on the last one.
    pub next: Option<u32>,
}

/// Fetches pages starting at 1 until one has no next page.
///
/// A `next` that does not move forward ends the walk.
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, ProviderError>>,
{
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        let Page { items: batch, next } = fetch(page).await?;
        items.extend(batch);

        match next {
            Some(next) if next > page => page = next,
            _ => return Ok(items),
        }
    }
}

/// Sends a request and decodes a JSON body, turning non-2xx into errors.
async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, ProviderError> {
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api { status, body });
    }

    Ok(response.json().await?)
}
