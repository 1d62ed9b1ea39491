//! Toggl integration.
//!
//! Projects are matched by exact name and categories by exact tag name.
//! Report entries are matched to line items by exact description.

use crate::config::TogglConfig;
use crate::models::{Item, Project};
use crate::providers::{
    apply_line_item_totals, collect_pages, lookback_start, send_json, Page, ProviderError,
    ProviderKind, TimeTracker,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

const USER_AGENT: &str = concat!("hourbook/", env!("CARGO_PKG_VERSION"));

/// Milliseconds per hour; report durations are in milliseconds.
const MS_PER_HOUR: i64 = 1000 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct TogglProject {
    pub id: u64,
    pub name: String,
    pub workspace_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TogglTag {
    pub id: u64,
    pub name: String,
}

/// One row of the detailed report.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportEntry {
    #[serde(default)]
    pub description: Option<String>,
    /// Duration in milliseconds.
    pub dur: i64,
}

#[derive(Debug, Deserialize)]
struct DetailedReport {
    total_count: u64,
    per_page: u64,
    #[serde(default)]
    data: Vec<ReportEntry>,
}

/// Number of report pages needed for `total` rows.
pub fn page_count(total: u64, per_page: u64) -> u64 {
    if per_page == 0 {
        return 1;
    }
    total.div_ceil(per_page).max(1)
}

/// The report page after `page`, `None` once every row was fetched.
pub fn next_report_page(page: u32, total: u64, per_page: u64) -> Option<u32> {
    (u64::from(page) < page_count(total, per_page)).then(|| page + 1)
}

/// Ids of the tags named after one of the project's categories.
pub fn matching_tag_ids(project: &Project, tags: &[TogglTag]) -> Vec<u64> {
    let category_names: HashSet<&str> = project.categories.iter().map(|c| c.name.as_str()).collect();
    tags.iter()
        .filter(|t| category_names.contains(t.name.as_str()))
        .map(|t| t.id)
        .collect()
}

fn item_key(_category: &str, item: &Item) -> String {
    item.description.clone()
}

/// Sums report durations per item description, in hours. Every item gets a
/// total, zero if nothing matched.
pub fn line_item_totals(project: &Project, entries: &[ReportEntry]) -> HashMap<String, Decimal> {
    let mut millis: HashMap<String, i64> = project
        .items()
        .map(|i| (i.description.clone(), 0))
        .collect();

    for entry in entries {
        let Some(ref description) = entry.description else {
            continue;
        };
        if let Some(total) = millis.get_mut(description) {
            *total += entry.dur;
        }
    }

    millis
        .into_iter()
        .map(|(description, ms)| (description, Decimal::from(ms) / Decimal::from(MS_PER_HOUR)))
        .collect()
}

/// Toggl Track API client.
pub struct TogglProvider {
    config: TogglConfig,
    http_client: reqwest::Client,
}

impl TogglProvider {
    pub fn new(config: TogglConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn get(&self, url: &str, api_key: &str) -> reqwest::RequestBuilder {
        self.http_client
            .get(url)
            .basic_auth(api_key, Some("api_token"))
    }

    async fn find_project(&self, api_key: &str, name: &str) -> Result<Option<TogglProject>, ProviderError> {
        let url = format!("{}/me/projects", self.config.api_url);
        let projects: Option<Vec<TogglProject>> = send_json(self.get(&url, api_key)).await?;

        Ok(projects
            .unwrap_or_default()
            .into_iter()
            .find(|p| p.name == name))
    }

    async fn tags(&self, api_key: &str, workspace_id: u64) -> Result<Vec<TogglTag>, ProviderError> {
        let url = format!("{}/workspaces/{}/tags", self.config.api_url, workspace_id);
        let tags: Option<Vec<TogglTag>> = send_json(self.get(&url, api_key)).await?;
        Ok(tags.unwrap_or_default())
    }

    /// Every page of the detailed report for the project and tags.
    async fn report_entries(
        &self,
        api_key: &str,
        remote: &TogglProject,
        tag_ids: &[u64],
        since: NaiveDate,
    ) -> Result<Vec<ReportEntry>, ProviderError> {
        let url = format!("{}/details", self.config.reports_url);
        let mut params = vec![
            ("workspace_id", remote.workspace_id.to_string()),
            ("project_ids", remote.id.to_string()),
            ("since", since.format("%Y-%m-%d").to_string()),
            ("without_description", "false".to_string()),
            ("user_agent", USER_AGENT.to_string()),
        ];
        if !tag_ids.is_empty() {
            let ids: Vec<String> = tag_ids.iter().map(u64::to_string).collect();
            params.push(("tag_ids", ids.join(",")));
        }

        let url = url.as_str();
        let params = params.as_slice();

        collect_pages(move |page| async move {
            let report: DetailedReport = send_json(
                self.get(url, api_key)
                    .query(params)
                    .query(&[("page", page.to_string())]),
            )
            .await?;
            Ok::<_, ProviderError>(Page {
                next: next_report_page(page, report.total_count, report.per_page),
                items: report.data,
            })
        })
        .await
    }
}

impl TimeTracker for TogglProvider {
    type Credentials = String;

    fn kind(&self) -> ProviderKind {
        ProviderKind::Toggl
    }

    async fn update_project_line_item_times(
        &self,
        api_key: &String,
        project: &mut Project,
        now: DateTime<Utc>,
    ) -> Result<bool, ProviderError> {
        if !project.has_items() {
            return Ok(false);
        }

        let Some(remote) = self.find_project(api_key, &project.name).await? else {
            debug!("No Toggl project named {}", project.name);
            return Ok(false);
        };

        let tags = self.tags(api_key, remote.workspace_id).await?;
        let tag_ids = matching_tag_ids(project, &tags);

        let since = lookback_start(now, self.config.lookback_weeks);
        let entries = self.report_entries(api_key, &remote, &tag_ids, since).await?;
        debug!("Fetched {} Toggl entries for {}", entries.len(), project.name);

        let totals = line_item_totals(project, &entries);
        apply_line_item_totals(project, &totals, item_key);
        project.last_imported_at = Some(now);

        info!("Imported Toggl hours for project {}", project.name);
        Ok(true)
    }
}
