//! Weekly progress report job.

use crate::analysis::{summarize_project, team_weekly_hours, update_all_projects};
use crate::config::Config;
use crate::email::{EmailMessage, Mailer};
use crate::models::ProjectSummary;
use crate::report::WeeklyReport;
use crate::store::Store;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

const WEEKLY_SUBJECT: &str = "Your Weekly Progress Report";

/// Summaries of the team projects that belong in the report.
fn team_summaries(store: &Store, team_id: u64, include_archived: bool) -> Vec<ProjectSummary> {
    store
        .team_projects(team_id)
        .filter(|p| include_archived || !p.archived)
        .map(summarize_project)
        .collect()
}

/// Records this week's hours for every project, then emails each team
/// member a progress report.
///
/// Users without a team are skipped, as are teams that logged no hours in
/// the newest week. Returns the reports that were sent.
pub async fn send_weekly_progress_reports<M: Mailer>(
    store: &mut Store,
    config: &Config,
    mailer: &M,
    now: DateTime<Utc>,
) -> Result<Vec<WeeklyReport>> {
    update_all_projects(&mut store.projects, now);

    let mut reports = Vec::new();

    for user in &store.users {
        let Some(team_id) = store.team_id_for_user(user.id) else {
            debug!("{} has no team, skipping", user.email);
            continue;
        };

        let summaries = team_summaries(store, team_id, config.report.include_archived);
        let (team_hours, team_labels) = team_weekly_hours(&summaries);

        match team_hours.first() {
            Some(hours) if !hours.is_zero() => {}
            _ => {
                debug!("Team {} logged no hours this week, skipping {}", team_id, user.email);
                continue;
            }
        }

        let report = WeeklyReport::build(
            &user.email,
            &user.first_name,
            now,
            &summaries,
            &team_hours,
            &team_labels,
            config.report.chart_weeks,
        );

        let mut message = EmailMessage::new(
            user.email.as_str(),
            user.first_name.as_str(),
            WEEKLY_SUBJECT,
            config.email.weekly_progress_template.as_str(),
        );
        message.substitutions = report.to_substitutions();

        if let Err(e) = mailer.send(&message).await {
            error!("Failed to send weekly report to {}: {}", user.email, e);
            return Err(e).with_context(|| format!("Failed to email {}", user.email));
        }

        info!(
            "Sent weekly report to {} ({} hours this week)",
            user.email, report.hours_this_week
        );
        reports.push(report);
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::testing::RecordingMailer;
    use crate::email::TemplateValue;
    use crate::models::{Category, Item, Membership, Project, User, WeekHours};
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 8, 6, 0, 0).unwrap()
    }

    fn project(id: u64, team_id: u64, estimated: i64, actual: i64, last_week: i64) -> Project {
        let mut project = Project::new(id, team_id, format!("Project {}", id));
        project.categories = vec![Category {
            id,
            name: "Dev".to_string(),
            items: vec![Item {
                id,
                description: "Build".to_string(),
                estimated: Decimal::from(estimated),
                actual: Decimal::from(actual),
            }],
        }];
        project.last_weeks_hours = Decimal::from(last_week);
        project.previous_weeks_hours = vec![WeekHours {
            hours: Decimal::from(last_week),
            label: "Jul 01".to_string(),
        }];
        project
    }

    fn membership(team_id: u64, user_id: u64) -> Membership {
        Membership {
            team_id,
            user_id,
            role: Default::default(),
            state: Default::default(),
        }
    }

    fn store() -> Store {
        let mut archived = project(3, 10, 10, 9, 0);
        archived.archived = true;

        Store {
            users: vec![
                User::new(1, "kim@example.com", "Kim"),
                User::new(2, "lee@example.com", "Lee"),
                User::new(3, "max@example.com", "Max"),
            ],
            memberships: vec![membership(10, 1), membership(20, 2)],
            projects: vec![
                project(1, 10, 20, 12, 6),
                project(2, 10, 20, 8, 8),
                archived,
                project(4, 20, 10, 5, 5),
            ],
            ..Store::default()
        }
    }

    #[test]
    fn test_reports_only_teams_with_hours() {
        let config = Config::default();
        let mailer = RecordingMailer::default();
        let mut store = store();

        let reports = tokio_test::block_on(send_weekly_progress_reports(
            &mut store, &config, &mailer, now(),
        ))
        .unwrap();

        // Every project got a new history entry, archived ones included.
        assert!(store.projects.iter().all(|p| p.previous_weeks_hours.len() == 2));
        assert_eq!(store.projects[2].previous_weeks_hours[0].hours, Decimal::from(9));
        assert_eq!(store.projects[0].last_weeks_hours, Decimal::from(12));

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.recipient, "kim@example.com");
        assert_eq!(report.hours_this_week, "6");
        assert_eq!(report.projects.len(), 2);
        assert_eq!(report.date_range, "July 01 - July 08");

        let messages = mailer.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].template_id, config.email.weekly_progress_template);
        assert_eq!(
            messages[0].substitutions.get("name"),
            Some(&TemplateValue::from("Kim"))
        );
        assert!(matches!(
            messages[0].substitutions.get("projects"),
            Some(TemplateValue::Records(rows)) if rows.len() == 2
        ));
    }

    #[test]
    fn test_include_archived_projects() {
        let mut config = Config::default();
        config.report.include_archived = true;
        let mailer = RecordingMailer::default();
        let mut store = store();

        let reports = tokio_test::block_on(send_weekly_progress_reports(
            &mut store, &config, &mailer, now(),
        ))
        .unwrap();

        assert_eq!(reports[0].projects.len(), 3);
        assert_eq!(reports[0].hours_this_week, "15");
    }

    #[test]
    fn test_email_failure_aborts() {
        let config = Config::default();
        let mailer = RecordingMailer::failing();
        let mut store = store();

        let result = tokio_test::block_on(send_weekly_progress_reports(
            &mut store, &config, &mailer, now(),
        ));
        assert!(result.is_err());
    }
}
