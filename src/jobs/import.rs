//! Actual-hours import job.

use crate::models::User;
use crate::providers::{HarvestProvider, ProviderError, TimeTracker, TogglProvider};
use crate::store::Store;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

/// A tracker that knows where its credentials live on a user.
#[allow(async_fn_in_trait)]
pub trait UserCredentials: TimeTracker {
    /// `None` when the user has not connected this provider.
    fn credentials_for(&self, user: &User) -> Option<Self::Credentials>;

    /// Runs once per user before any of their projects are imported.
    async fn prepare(&self, _credentials: &mut Self::Credentials) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Writes what `prepare` learned back onto the user.
    fn remember(&self, _user: &mut User, _credentials: &Self::Credentials) {}
}

impl UserCredentials for HarvestProvider {
    fn credentials_for(&self, user: &User) -> Option<Self::Credentials> {
        let credentials = &user.profile.harvest;
        credentials.is_connected().then(|| credentials.clone())
    }

    async fn prepare(&self, credentials: &mut Self::Credentials) -> Result<(), ProviderError> {
        self.resolve_account_id(credentials).await
    }

    fn remember(&self, user: &mut User, credentials: &Self::Credentials) {
        user.profile.harvest.account_id = credentials.account_id.clone();
    }
}

impl UserCredentials for TogglProvider {
    fn credentials_for(&self, user: &User) -> Option<Self::Credentials> {
        let api_key = &user.profile.toggl_api_key;
        (!api_key.is_empty()).then(|| api_key.clone())
    }
}

/// Outcome counts of one provider's import.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ImportStats {
    pub fn add(&mut self, other: ImportStats) {
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Progress bar over users, hidden when `show` is false.
pub fn progress_bar(len: usize, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Imports actual hours from one provider for every connected user.
///
/// Each user's team projects are updated in place. A failing project is
/// logged and the import moves on; a user whose credentials cannot be
/// prepared is skipped as a whole.
pub async fn import_actual_hours<P: UserCredentials>(
    store: &mut Store,
    provider: &P,
    now: DateTime<Utc>,
    show_progress: bool,
) -> ImportStats {
    let mut stats = ImportStats::default();

    let work: Vec<(usize, String, u64, P::Credentials)> = store
        .users
        .iter()
        .enumerate()
        .filter_map(|(index, user)| {
            let credentials = provider.credentials_for(user)?;
            match store.team_id_for_user(user.id) {
                Some(team_id) => Some((index, user.email.clone(), team_id, credentials)),
                None => {
                    debug!("{} has no team, skipping", user.email);
                    None
                }
            }
        })
        .collect();

    info!("Importing {} hours for {} users", provider.kind(), work.len());
    let pb = progress_bar(work.len(), show_progress);

    for (index, email, team_id, mut credentials) in work {
        pb.set_message(email.clone());

        if let Err(e) = provider.prepare(&mut credentials).await {
            warn!("{} setup failed for {}: {}", provider.kind(), email, e);
            stats.failed += 1;
            pb.inc(1);
            continue;
        }
        provider.remember(&mut store.users[index], &credentials);

        for project in store.team_projects_mut(team_id) {
            match provider
                .update_project_line_item_times(&credentials, project, now)
                .await
            {
                Ok(true) => stats.updated += 1,
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    warn!(
                        "{} import failed for project {} ({}): {}",
                        provider.kind(),
                        project.name,
                        email,
                        e
                    );
                    stats.failed += 1;
                }
            }
        }

        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "{} import: {} updated, {} skipped, {} failed",
        provider.kind(),
        stats.updated,
        stats.skipped,
        stats.failed
    );
    stats
}


#[cfg(test)]
mod tests {
    use super::testing::FakeTracker;
    use super::*;
    use crate::config::HarvestConfig;
    use crate::models::{Category, HarvestCredentials, Item, Membership, Project};
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn project(id: u64, team_id: u64, name: &str) -> Project {
        let mut project = Project::new(id, team_id, name);
        project.categories = vec![Category {
            id,
            name: "Dev".to_string(),
            items: vec![Item {
                id,
                description: "Build".to_string(),
                estimated: Decimal::from(10),
                actual: Decimal::ZERO,
            }],
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

    #[test]
    fn test_import_updates_team_projects_and_continues_on_failure() {
        let now = Utc.with_ymd_and_hms(2024, 7, 8, 5, 0, 0).unwrap();

        let mut connected = User::new(1, "kim@example.com", "Kim");
        connected.profile.toggl_api_key = "key".to_string();
        let mut teamless = User::new(2, "lee@example.com", "Lee");
        teamless.profile.toggl_api_key = "key".to_string();
        let disconnected = User::new(3, "max@example.com", "Max");

        let mut store = Store {
            users: vec![connected, teamless, disconnected],
            memberships: vec![membership(10, 1), membership(20, 3)],
            projects: vec![
                project(1, 10, "Broken"),
                project(2, 10, "Albatross"),
                Project::new(3, 10, "Empty"),
                project(4, 20, "Other team"),
            ],
            ..Store::default()
        };

        let tracker = FakeTracker {
            hours: Decimal::from(4),
        };
        let stats = tokio_test::block_on(import_actual_hours(&mut store, &tracker, now, false));

        assert_eq!(
            stats,
            ImportStats {
                updated: 1,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(store.projects[1].actual(), Decimal::from(4));
        assert_eq!(store.projects[1].last_imported_at, Some(now));
        assert_eq!(store.projects[0].actual(), Decimal::ZERO);
        assert_eq!(store.projects[3].actual(), Decimal::ZERO);
    }

    #[test]
    fn test_provider_credentials_from_profile() {
        let now = Utc.with_ymd_and_hms(2024, 7, 8, 5, 0, 0).unwrap();
        let harvest = HarvestProvider::new(HarvestConfig::default()).unwrap();

        let mut user = User::new(1, "kim@example.com", "Kim");
        assert!(harvest.credentials_for(&user).is_none());

        user.profile.harvest = HarvestCredentials::new("access", "refresh", now);
        let credentials = harvest.credentials_for(&user).unwrap();
        assert_eq!(credentials.access_token(), "access");
    }

    #[test]
    fn test_user_with_failing_setup_is_skipped() {
        let now = Utc.with_ymd_and_hms(2024, 7, 8, 5, 0, 0).unwrap();

        let mut revoked = User::new(1, "kim@example.com", "Kim");
        revoked.profile.toggl_api_key = "revoked".to_string();
        let mut valid = User::new(2, "lee@example.com", "Lee");
        valid.profile.toggl_api_key = "key".to_string();

        let mut store = Store {
            users: vec![revoked, valid],
            memberships: vec![membership(10, 1), membership(20, 2)],
            projects: vec![project(1, 10, "Albatross"), project(2, 20, "Heron")],
            ..Store::default()
        };

        let tracker = FakeTracker {
            hours: Decimal::from(2),
        };
        let stats = tokio_test::block_on(import_actual_hours(&mut store, &tracker, now, false));

        assert_eq!(
            stats,
            ImportStats {
                updated: 1,
                skipped: 0,
                failed: 1
            }
        );
        assert_eq!(store.projects[0].actual(), Decimal::ZERO);
        assert_eq!(store.projects[0].last_imported_at, None);
        assert_eq!(store.projects[1].actual(), Decimal::from(2));
    }

    #[test]
    fn test_harvest_remembers_account_id() {
        let now = Utc.with_ymd_and_hms(2024, 7, 8, 5, 0, 0).unwrap();
        let harvest = HarvestProvider::new(HarvestConfig::default()).unwrap();

        let mut user = User::new(1, "kim@example.com", "Kim");
        user.profile.harvest = HarvestCredentials::new("access", "refresh", now);
        let mut credentials = harvest.credentials_for(&user).unwrap();
        assert_eq!(credentials.account_id, None);

        // Stored ids are kept, so no request is made.
        credentials.account_id = Some("22".to_string());
        tokio_test::block_on(harvest.prepare(&mut credentials)).unwrap();
        harvest.remember(&mut user, &credentials);

        assert_eq!(user.profile.harvest.account_id, Some("22".to_string()));
        assert_eq!(user.profile.harvest.access_token(), "access");
    }

    #[test]
    fn test_stats_add() {
        let mut total = ImportStats::default();
        total.add(ImportStats {
            updated: 2,
            skipped: 1,
            failed: 0,
        });
        total.add(ImportStats {
            updated: 1,
            skipped: 0,
            failed: 1,
        });
        assert_eq!(total.updated, 3);
        assert_eq!(total.failed, 1);
    }
}
