//! Hour aggregation.
//!
//! Sums actual and estimated hours from line items up through categories
//! to projects, and prepares the per-project snapshot used by reporting.

use crate::analysis::status::classify;
use crate::models::{Category, Item, Project, ProjectSummary, StatusCounts};
use rust_decimal::{Decimal, RoundingStrategy};

/// Which hour quantity to sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourField {
    Estimated,
    Actual,
}

impl HourField {
    fn of_item(self, item: &Item) -> Decimal {
        match self {
            HourField::Estimated => item.estimated,
            HourField::Actual => item.actual,
        }
    }

    fn of_category(self, category: &Category) -> Decimal {
        match self {
            HourField::Estimated => category.estimated(),
            HourField::Actual => category.actual(),
        }
    }
}

/// Unweighted sum of one field over items. Empty input sums to zero.
pub fn sum_item_field(items: &[Item], field: HourField) -> Decimal {
    items.iter().map(|i| field.of_item(i)).sum()
}

/// Unweighted sum of one field over categories. Empty input sums to zero.
pub fn sum_category_field(categories: &[Category], field: HourField) -> Decimal {
    categories.iter().map(|c| field.of_category(c)).sum()
}

/// Scales a raw estimate by `1 + buffer_percent / 100`, rounded half away
/// from zero to 2 decimal places.
pub fn apply_buffer(raw_estimate: Decimal, buffer_percent: u8) -> Decimal {
    let multiplier = Decimal::ONE + Decimal::from(buffer_percent) / Decimal::ONE_HUNDRED;
    (raw_estimate * multiplier).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Counts the project's line items per status bucket.
pub fn count_item_statuses(project: &Project) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for item in project.items() {
        counts.record(classify(item.estimated, item.actual));
    }
    counts
}

/// Builds the reporting snapshot for a project.
pub fn summarize_project(project: &Project) -> ProjectSummary {
    let estimated = project.estimated();
    let actual = project.actual();

    ProjectSummary {
        id: project.id,
        name: project.name.clone(),
        estimated,
        actual,
        hours_diff: estimated - actual,
        status: classify(estimated, actual),
        items: count_item_statuses(project),
        previous_weeks_hours: project.previous_weeks_hours.clone(),
    }
}
