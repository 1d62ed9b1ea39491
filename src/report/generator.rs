//! Weekly progress report generation.
//!
//! Turns project summaries and the team's weekly rollup into template-ready
//! records for the progress email, plus Markdown/JSON renderings used for
//! previews.

use crate::analysis::{format_decimal, item_count_text, status_text};
use crate::email::{Record, TemplateValue};
use crate::models::{ProjectSummary, Status};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Format for the report date range, e.g. "July 04".
const DATE_RANGE_FORMAT: &str = "%B %d";

/// Presentation-ready view of one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    pub actual: String,
    pub estimated: String,
    pub status_color: String,
    pub status_hex: String,
    pub status_text: String,
    pub items_under: String,
    pub items_close: String,
    pub items_over: String,
}

impl ProjectRecord {
    /// Formats a project summary.
    pub fn from_summary(summary: &ProjectSummary) -> Self {
        Self {
            name: summary.name.clone(),
            actual: format_decimal(summary.actual),
            estimated: format_decimal(summary.estimated),
            status_color: summary.status.color().to_string(),
            status_hex: summary.status.hex().to_string(),
            status_text: status_text(summary.estimated, summary.actual),
            items_under: item_count_text(summary.items.under, Status::Under),
            items_close: item_count_text(summary.items.close, Status::Close),
            items_over: item_count_text(summary.items.over, Status::Over),
        }
    }

    /// Flattens the record into template key/value pairs.
    pub fn to_record(&self) -> Record {
        [
            ("name", &self.name),
            ("actual", &self.actual),
            ("estimated", &self.estimated),
            ("status_color", &self.status_color),
            ("status_hex", &self.status_hex),
            ("status_text", &self.status_text),
            ("items_under", &self.items_under),
            ("items_close", &self.items_close),
            ("items_over", &self.items_over),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }
}

/// One bar of the weekly hours chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekBar {
    /// Bar height relative to the busiest week, e.g. "75%".
    pub height: String,
    pub label: String,
}

impl WeekBar {
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("height".to_string(), self.height.clone());
        record.insert("label".to_string(), self.label.clone());
        record
    }
}

/// Builds chart bars from the team's weekly hours, newest first.
///
/// Bars are scaled to the busiest week. Returns nothing when there is no
/// history or every week is zero. `max_weeks == 0` keeps every week.
pub fn weekly_chart(hours: &[Decimal], labels: &[String], max_weeks: usize) -> Vec<WeekBar> {
    let shown = if max_weeks == 0 {
        hours
    } else {
        &hours[..hours.len().min(max_weeks)]
    };

    let max_hours = shown.iter().copied().max().unwrap_or(Decimal::ZERO);
    if max_hours <= Decimal::ZERO {
        return Vec::new();
    }

    shown
        .iter()
        .enumerate()
        .map(|(i, week_hours)| {
            let percent = (*week_hours / max_hours * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            WeekBar {
                height: format!("{}%", percent.normalize()),
                label: labels.get(i).cloned().unwrap_or_default(),
            }
        })
        .collect()
}

/// `"<7 days ago> - <today>"`.
pub fn report_date_range(now: DateTime<Utc>) -> String {
    let start = now - Duration::days(7);
    format!(
        "{} - {}",
        start.format(DATE_RANGE_FORMAT),
        now.format(DATE_RANGE_FORMAT)
    )
}

/// A complete weekly progress report for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub recipient: String,
    pub first_name: String,
    pub date_range: String,
    /// Team hours logged in the newest week.
    pub hours_this_week: String,
    pub projects: Vec<ProjectRecord>,
    pub weeks: Vec<WeekBar>,
}

impl WeeklyReport {
    /// Assembles the report from project summaries and the team rollup.
    pub fn build(
        recipient: &str,
        first_name: &str,
        now: DateTime<Utc>,
        summaries: &[ProjectSummary],
        team_hours: &[Decimal],
        team_labels: &[String],
        max_weeks: usize,
    ) -> Self {
        Self {
            recipient: recipient.to_string(),
            first_name: first_name.to_string(),
            date_range: report_date_range(now),
            hours_this_week: format_decimal(team_hours.first().copied().unwrap_or_default()),
            projects: summaries.iter().map(ProjectRecord::from_summary).collect(),
            weeks: weekly_chart(team_hours, team_labels, max_weeks),
        }
    }

    /// Template substitutions for the progress email.
    pub fn to_substitutions(&self) -> BTreeMap<String, TemplateValue> {
        let mut substitutions = BTreeMap::new();
        substitutions.insert("name".to_string(), TemplateValue::from(self.first_name.as_str()));
        substitutions.insert(
            "date_range".to_string(),
            TemplateValue::from(self.date_range.as_str()),
        );
        substitutions.insert(
            "hours_this_week".to_string(),
            TemplateValue::from(self.hours_this_week.as_str()),
        );
        substitutions.insert(
            "projects".to_string(),
            TemplateValue::Records(self.projects.iter().map(ProjectRecord::to_record).collect()),
        );
        substitutions.insert(
            "weeks".to_string(),
            TemplateValue::Records(self.weeks.iter().map(WeekBar::to_record).collect()),
        );
        substitutions
    }
}

/// Render reports as Markdown.
pub fn generate_markdown_report(reports: &[WeeklyReport]) -> String {
    let mut output = String::new();

    output.push_str("# Weekly Progress Reports\n\n");

    if reports.is_empty() {
        output.push_str("No team tracked any hours this week.\n\n");
    }

    for report in reports {
        output.push_str(&generate_report_section(report));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the section for a single recipient.
fn generate_report_section(report: &WeeklyReport) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "## {} ({})\n\n",
        report.first_name, report.recipient
    ));
    section.push_str(&format!("- **Week:** {}\n", report.date_range));
    section.push_str(&format!(
        "- **Hours this week:** {}\n\n",
        report.hours_this_week
    ));

    section.push_str(&generate_projects_table(&report.projects));
    section.push_str(&generate_chart_table(&report.weeks));

    section
}

/// Generate the projects table.
fn generate_projects_table(projects: &[ProjectRecord]) -> String {
    let mut table = String::new();

    table.push_str("### Projects\n\n");
    if projects.is_empty() {
        table.push_str("No active projects.\n\n");
        return table;
    }

    table.push_str("| Project | Actual | Estimated | Status | Items |\n");
    table.push_str("|:---|:---:|:---:|:---|:---|\n");
    for project in projects {
        table.push_str(&format!(
            "| {} | {} | {} | {} ({}) | {}, {}, {} |\n",
            project.name,
            project.actual,
            project.estimated,
            project.status_text,
            project.status_color,
            project.items_under,
            project.items_close,
            project.items_over
        ));
    }
    table.push('\n');

    table
}

/// Generate the weekly hours chart as a table.
fn generate_chart_table(weeks: &[WeekBar]) -> String {
    if weeks.is_empty() {
        return String::new();
    }

    let mut table = String::new();

    table.push_str("### Weekly Hours\n\n");
    table.push_str("| Week | Relative hours |\n");
    table.push_str("|:---|:---:|\n");
    for week in weeks {
        table.push_str(&format!("| {} | {} |\n", week.label, week.height));
    }
    table.push('\n');

    table
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Generated by hourbook*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(reports: &[WeeklyReport]) -> Result<String> {
    serde_json::to_string_pretty(reports).map_err(Into::into)
}
