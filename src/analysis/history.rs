//! Weekly hour history.
//!
//! Records per-project week-over-week deltas and rolls them up across a
//! team's projects.

use crate::models::{Project, ProjectSummary, WeekHours};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

/// Label format for history entries, e.g. "Jul 04".
pub const WEEK_LABEL_FORMAT: &str = "%b %d";

/// Short date label for a recomputation run.
pub fn week_label(now: DateTime<Utc>) -> String {
    now.format(WEEK_LABEL_FORMAT).to_string()
}

/// Records the hours logged since the previous run.
///
/// Stores `max(0, actual - last_weeks_hours)` at the front of the history
/// and moves `last_weeks_hours` up to the current actual. Calling this twice
/// in one cycle records two entries.
pub fn update_project_weekly_hours(project: &mut Project, now: DateTime<Utc>) -> &[WeekHours] {
    let actual = project.actual();
    let weekly_hours = (actual - project.last_weeks_hours).max(Decimal::ZERO);
    project.last_weeks_hours = actual;

    project.previous_weeks_hours.insert(
        0,
        WeekHours {
            hours: weekly_hours,
            label: week_label(now),
        },
    );

    debug!(
        "Project {} logged {} hours this week",
        project.name, weekly_hours
    );

    &project.previous_weeks_hours
}

/// Runs the weekly update for every project, archived ones included.
pub fn update_all_projects(projects: &mut [Project], now: DateTime<Utc>) {
    for project in projects.iter_mut() {
        update_project_weekly_hours(project, now);
    }
}

/// Combines ragged per-project histories into one team series.
///
/// Position `i` of the hours is the sum of position `i` across every
/// project, missing entries counting as zero. Labels are the distinct labels
/// in the order they are first seen and are not paired with the hour columns
/// when projects carry different label sequences.
pub fn team_weekly_hours(projects: &[ProjectSummary]) -> (Vec<Decimal>, Vec<String>) {
    let longest = projects
        .iter()
        .map(|p| p.previous_weeks_hours.len())
        .max()
        .unwrap_or(0);

    let mut hours = vec![Decimal::ZERO; longest];
    let mut labels: Vec<String> = Vec::new();

    for project in projects {
        for (column, week) in project.previous_weeks_hours.iter().enumerate() {
            hours[column] += week.hours;
            if !labels.contains(&week.label) {
                labels.push(week.label.clone());
            }
        }
    }

    (hours, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summarize_project;
    use crate::models::{Category, Item};
    use chrono::TimeZone;

    fn project_with_actual(actual: i64) -> Project {
        let mut project = Project::new(1, 1, "Tracked");
        project.categories = vec![Category {
            id: 1,
            name: "Dev".to_string(),
            items: vec![Item {
                id: 1,
                description: "Build".to_string(),
                estimated: Decimal::from(100),
                actual: Decimal::from(actual),
            }],
        }];
        project
    }

    fn week(hours: i64, label: &str) -> WeekHours {
        WeekHours {
            hours: Decimal::from(hours),
            label: label.to_string(),
        }
    }

    fn summary_with_history(history: Vec<WeekHours>) -> ProjectSummary {
        let mut summary = summarize_project(&Project::new(1, 1, "P"));
        summary.previous_weeks_hours = history;
        summary
    }

    #[test]
    fn test_week_label() {
        let now = Utc.with_ymd_and_hms(2024, 7, 4, 6, 0, 0).unwrap();
        assert_eq!(week_label(now), "Jul 04");
    }

    #[test]
    fn test_update_prepends_delta() {
        let first = Utc.with_ymd_and_hms(2024, 7, 4, 6, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 7, 11, 6, 0, 0).unwrap();

        let mut project = project_with_actual(10);
        update_project_weekly_hours(&mut project, first);
        assert_eq!(project.last_weeks_hours, Decimal::from(10));
        assert_eq!(project.previous_weeks_hours, vec![week(10, "Jul 04")]);

        project.categories[0].items[0].actual = Decimal::from(16);
        let history = update_project_weekly_hours(&mut project, second);
        assert_eq!(history, &[week(6, "Jul 11"), week(10, "Jul 04")][..]);
    }

    #[test]
    fn test_delta_never_negative() {
        let now = Utc.with_ymd_and_hms(2024, 7, 4, 6, 0, 0).unwrap();
        let mut project = project_with_actual(3);
        project.last_weeks_hours = Decimal::from(8);

        update_project_weekly_hours(&mut project, now);
        assert_eq!(project.previous_weeks_hours[0].hours, Decimal::ZERO);
        assert_eq!(project.last_weeks_hours, Decimal::from(3));
    }

    #[test]
    fn test_double_run_double_prepends() {
        let now = Utc.with_ymd_and_hms(2024, 7, 4, 6, 0, 0).unwrap();
        let mut projects = vec![project_with_actual(5)];

        update_all_projects(&mut projects, now);
        update_all_projects(&mut projects, now);

        assert_eq!(
            projects[0].previous_weeks_hours,
            vec![week(0, "Jul 04"), week(5, "Jul 04")]
        );
    }

    #[test]
    fn test_team_rollup_ragged_columns() {
        let projects = vec![
            summary_with_history(vec![week(49, "Jul 11"), week(2, "Jul 04")]),
            summary_with_history(vec![week(6, "Jul 11")]),
            summary_with_history(vec![week(3, "Jul 11"), week(1, "Jul 04"), week(7, "Jun 27")]),
        ];

        let (hours, labels) = team_weekly_hours(&projects);
        assert_eq!(hours, vec![Decimal::from(58), Decimal::from(3), Decimal::from(7)]);
        assert_eq!(labels, vec!["Jul 11", "Jul 04", "Jun 27"]);
    }

    #[test]
    fn test_team_rollup_labels_follow_discovery_order() {
        // Second project started a week later; its first label lands after
        // the first project's labels even though it sums into column 0.
        let projects = vec![
            summary_with_history(vec![week(4, "Jul 04"), week(2, "Jun 27")]),
            summary_with_history(vec![week(1, "Jul 11")]),
        ];

        let (hours, labels) = team_weekly_hours(&projects);
        assert_eq!(hours, vec![Decimal::from(5), Decimal::from(2)]);
        assert_eq!(labels, vec!["Jul 04", "Jun 27", "Jul 11"]);
    }

    #[test]
    fn test_team_rollup_empty() {
        let (hours, labels) = team_weekly_hours(&[]);
        assert!(hours.is_empty());
        assert!(labels.is_empty());
    }
}
