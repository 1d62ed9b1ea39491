//! Harvest integration.
//!
//! Harvest projects are matched to ours by exact name. Time entries are
//! matched to line items on `"<task>:<notes>"` vs.
//! `"<category>:<description>"`, ignoring case.

use crate::config::HarvestConfig;
use crate::models::{HarvestCredentials, Item, Project};
use crate::providers::{
    apply_line_item_totals, collect_pages, lookback_start, send_json, Page, ProviderError,
    ProviderKind, TimeTracker,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("hourbook/", env!("CARGO_PKG_VERSION"));

/// A fresh OAuth token pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    id: u64,
    #[serde(default)]
    product: String,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarvestProject {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ProjectsPage {
    projects: Vec<HarvestProject>,
    next_page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskRef {
    pub name: String,
}

/// One Harvest time entry.
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestTimeEntry {
    pub hours: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    pub task: TaskRef,
}

#[derive(Debug, Deserialize)]
struct TimeEntriesPage {
    time_entries: Vec<HarvestTimeEntry>,
    next_page: Option<u32>,
}

/// Id of the Harvest product account, skipping Forecast and others.
fn harvest_account_id(accounts: &[Account]) -> Option<String> {
    accounts
        .iter()
        .find(|a| a.product == "harvest")
        .map(|a| a.id.to_string())
}

/// Matching key for a task name and entry notes.
pub fn entry_key(task: &str, notes: &str) -> String {
    format!("{}:{}", task.to_lowercase(), notes.to_lowercase())
}

/// Matching key for one of our line items.
pub fn item_key(category: &str, item: &Item) -> String {
    entry_key(category, &item.description)
}

/// Sums entry hours per line item key. Every item gets a total, zero if
/// nothing matched.
pub fn line_item_totals(project: &Project, entries: &[HarvestTimeEntry]) -> HashMap<String, Decimal> {
    let mut totals: HashMap<String, Decimal> = project
        .categories
        .iter()
        .flat_map(|c| c.items.iter().map(move |i| (item_key(&c.name, i), Decimal::ZERO)))
        .collect();

    for entry in entries {
        let key = entry_key(&entry.task.name, entry.notes.as_deref().unwrap_or(""));
        if let Some(total) = totals.get_mut(&key) {
            *total += entry.hours;
        }
    }

    totals
}

/// Harvest v2 API client.
pub struct HarvestProvider {
    config: HarvestConfig,
    http_client: reqwest::Client,
}

impl HarvestProvider {
    pub fn new(config: HarvestConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Whether the access token was refreshed recently enough to keep.
    pub fn is_access_token_fresh(&self, credentials: &HarvestCredentials, now: DateTime<Utc>) -> bool {
        match credentials.tokens_last_refreshed_at() {
            Some(refreshed_at) => now - refreshed_at < Duration::hours(self.config.refresh_after_hours),
            None => false,
        }
    }

    /// Refreshes the tokens if they are stale. `Ok(None)` means still fresh.
    pub async fn refresh_access_token_by_demand(
        &self,
        credentials: &HarvestCredentials,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenPair>, ProviderError> {
        if self.is_access_token_fresh(credentials, now) {
            return Ok(None);
        }
        self.refresh_access_token(credentials).await.map(Some)
    }

    /// Exchanges the refresh token for a new token pair.
    pub async fn refresh_access_token(
        &self,
        credentials: &HarvestCredentials,
    ) -> Result<TokenPair, ProviderError> {
        if self.config.client_id.is_empty() || self.config.client_secret.is_empty() {
            return Err(ProviderError::NotConfigured("Harvest OAuth client"));
        }

        let url = format!("{}/api/v2/oauth2/token", self.config.id_url);
        let form = [
            ("refresh_token", credentials.refresh_token()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        send_json(self.http_client.post(&url).form(&form)).await
    }

    /// The account to send with API calls, looked up when not stored.
    async fn account_id(&self, credentials: &HarvestCredentials) -> Result<String, ProviderError> {
        match credentials.account_id {
            Some(ref account_id) => Ok(account_id.clone()),
            None => self.lookup_account_id(credentials.access_token()).await,
        }
    }

    /// Looks up the account id once and keeps it on the credentials.
    pub async fn resolve_account_id(
        &self,
        credentials: &mut HarvestCredentials,
    ) -> Result<(), ProviderError> {
        if credentials.account_id.is_none() {
            let account_id = self.lookup_account_id(credentials.access_token()).await?;
            debug!("Resolved Harvest account {}", account_id);
            credentials.account_id = Some(account_id);
        }
        Ok(())
    }

    async fn lookup_account_id(&self, token: &str) -> Result<String, ProviderError> {
        let url = format!("{}/api/v2/accounts", self.config.id_url);
        let response: AccountsResponse =
            send_json(self.http_client.get(&url).bearer_auth(token)).await?;

        harvest_account_id(&response.accounts).ok_or(ProviderError::MissingAccount)
    }

    fn authed(&self, url: &str, token: &str, account_id: &str) -> reqwest::RequestBuilder {
        self.http_client
            .get(url)
            .bearer_auth(token)
            .header("Harvest-Account-Id", account_id)
    }

    /// Finds the Harvest project with exactly this name.
    async fn find_project(
        &self,
        token: &str,
        account_id: &str,
        name: &str,
    ) -> Result<Option<HarvestProject>, ProviderError> {
        let url = format!("{}/projects", self.config.api_url);
        let url = url.as_str();

        let projects = collect_pages(move |page| async move {
            let response: ProjectsPage = send_json(
                self.authed(url, token, account_id)
                    .query(&[("page", page.to_string())]),
            )
            .await?;
            Ok::<_, ProviderError>(Page {
                items: response.projects,
                next: response.next_page,
            })
        })
        .await?;

        Ok(projects.into_iter().find(|p| p.name == name))
    }

    /// All time entries of a project since `from`.
    async fn time_entries(
        &self,
        token: &str,
        account_id: &str,
        project_id: u64,
        from: NaiveDate,
    ) -> Result<Vec<HarvestTimeEntry>, ProviderError> {
        let url = format!("{}/time_entries", self.config.api_url);
        let url = url.as_str();

        collect_pages(move |page| async move {
            let response: TimeEntriesPage = send_json(self.authed(url, token, account_id).query(&[
                ("project_id", project_id.to_string()),
                ("from", from.format("%Y-%m-%d").to_string()),
                ("page", page.to_string()),
            ]))
            .await?;
            Ok::<_, ProviderError>(Page {
                items: response.time_entries,
                next: response.next_page,
            })
        })
        .await
    }
}

impl TimeTracker for HarvestProvider {
    type Credentials = HarvestCredentials;

    fn kind(&self) -> ProviderKind {
        ProviderKind::Harvest
    }

    async fn update_project_line_item_times(
        &self,
        credentials: &HarvestCredentials,
        project: &mut Project,
        now: DateTime<Utc>,
    ) -> Result<bool, ProviderError> {
        if !project.has_items() {
            return Ok(false);
        }

        let token = credentials.access_token();
        let account_id = self.account_id(credentials).await?;

        let Some(remote) = self.find_project(token, &account_id, &project.name).await? else {
            debug!("No Harvest project named {}", project.name);
            return Ok(false);
        };

        let from = lookback_start(now, self.config.lookback_weeks);
        let entries = self.time_entries(token, &account_id, remote.id, from).await?;
        debug!("Fetched {} Harvest entries for {}", entries.len(), project.name);

        let totals = line_item_totals(project, &entries);
        apply_line_item_totals(project, &totals, item_key);
        project.last_imported_at = Some(now);

        info!("Imported Harvest hours for project {}", project.name);
        Ok(true)
    }
}
