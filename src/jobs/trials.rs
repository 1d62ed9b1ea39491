//! Trial expiration job.

use crate::config::Config;
use crate::email::{EmailMessage, Mailer};
use crate::models::Team;
use crate::store::Store;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

const ALMOST_EXPIRED_SUBJECT: &str = "Your Free Trial is Almost Over - Upgrade Now";
const EXPIRED_SUBJECT: &str = "Your Free Trial Just Expired - Upgrade Now";

/// Which trial notification to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialNotice {
    AlmostExpired,
    Expired,
}

impl TrialNotice {
    fn subject(self) -> &'static str {
        match self {
            TrialNotice::AlmostExpired => ALMOST_EXPIRED_SUBJECT,
            TrialNotice::Expired => EXPIRED_SUBJECT,
        }
    }

    fn template(self, config: &Config) -> &str {
        match self {
            TrialNotice::AlmostExpired => &config.email.trial_almost_expired_template,
            TrialNotice::Expired => &config.email.trial_expired_template,
        }
    }
}

/// Cache key guarding the "almost expired" email for a team.
pub fn almost_expired_key(team_id: u64) -> String {
    format!("team_{}:trial_almost_expired", team_id)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrialStats {
    pub warned: usize,
    pub expired: usize,
}

/// A team whose creator has to be told about the trial.
struct Notice {
    team_id: u64,
    email: String,
    first_name: String,
}

async fn send_notice<M: Mailer>(
    mailer: &M,
    config: &Config,
    notice: &Notice,
    kind: TrialNotice,
) -> Result<()> {
    let message = EmailMessage::new(
        notice.email.as_str(),
        notice.first_name.as_str(),
        kind.subject(),
        kind.template(config),
    )
    .with("name", notice.first_name.as_str());

    if let Err(e) = mailer.send(&message).await {
        error!("Failed to send {:?} email for team {}: {}", kind, notice.team_id, e);
        return Err(e).with_context(|| format!("Failed to email {}", notice.email));
    }
    Ok(())
}

/// Collects the creators of the teams matching `filter`.
fn notices(store: &Store, filter: impl Fn(&Team) -> bool) -> Vec<Notice> {
    store
        .teams
        .iter()
        .filter(|&team| filter(team))
        .filter_map(|team| match store.user(team.creator_id) {
            Some(creator) => Some(Notice {
                team_id: team.id,
                email: creator.email.clone(),
                first_name: creator.first_name.clone(),
            }),
            None => {
                warn!("Team {} has no creator on record, skipping", team.id);
                None
            }
        })
        .collect()
}

/// Warns teams whose trial ends soon and ends trials that have run out.
///
/// The warning goes out once per window. Email failures abort the job.
pub async fn expire_trials<M: Mailer>(
    store: &mut Store,
    config: &Config,
    mailer: &M,
    now: DateTime<Utc>,
) -> Result<TrialStats> {
    let mut stats = TrialStats::default();
    let window = Duration::days(config.trial.warning_days);

    let almost_expired = notices(store, |team| {
        team.on_trial && team.trial_expires_at >= now && team.trial_expires_at <= now + window
    });
    for notice in &almost_expired {
        let key = almost_expired_key(notice.team_id);
        if store.notifications.contains(&key, now) {
            continue;
        }
        send_notice(mailer, config, notice, TrialNotice::AlmostExpired).await?;
        store.notifications.insert(key, window, now);
        stats.warned += 1;
    }

    let expired = notices(store, |team| team.on_trial && team.trial_expires_at <= now);
    for notice in &expired {
        if let Some(team) = store.teams.iter_mut().find(|t| t.id == notice.team_id) {
            team.on_trial = false;
            info!("Trial ended for team {}", team.name);
        }
        send_notice(mailer, config, notice, TrialNotice::Expired).await?;
        stats.expired += 1;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::testing::RecordingMailer;
    use crate::email::TemplateValue;
    use crate::models::User;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 8, 5, 0, 0).unwrap()
    }

    fn team(id: u64, expires_in: Duration) -> Team {
        let mut team = Team::new_trial(id, format!("Team {}", id), 1, now(), 0);
        team.trial_expires_at = now() + expires_in;
        team
    }

    fn store() -> Store {
        Store {
            users: vec![User::new(1, "andrew@example.com", "Andrew")],
            teams: vec![
                team(1, Duration::days(2)),
                team(2, -Duration::hours(1)),
                team(3, Duration::days(10)),
            ],
            ..Store::default()
        }
    }

    #[test]
    fn test_warns_once_and_expires() {
        let config = Config::default();
        let mailer = RecordingMailer::default();
        let mut store = store();

        let stats =
            tokio_test::block_on(expire_trials(&mut store, &config, &mailer, now())).unwrap();
        assert_eq!(stats, TrialStats { warned: 1, expired: 1 });

        assert!(store.teams[0].on_trial);
        assert!(!store.teams[1].on_trial);
        assert!(store.teams[2].on_trial);

        let messages = mailer.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].template_id, config.email.trial_almost_expired_template);
        assert_eq!(messages[1].template_id, config.email.trial_expired_template);
        assert_eq!(messages[1].to, "andrew@example.com");
        assert_eq!(
            messages[1].substitutions.get("name"),
            Some(&TemplateValue::from("Andrew"))
        );

        // A second run inside the window sends nothing new.
        let later = now() + Duration::hours(1);
        let stats =
            tokio_test::block_on(expire_trials(&mut store, &config, &mailer, later)).unwrap();
        assert_eq!(stats, TrialStats::default());
        assert_eq!(mailer.messages().len(), 2);
    }

    #[test]
    fn test_email_failure_propagates() {
        let config = Config::default();
        let mailer = RecordingMailer::failing();
        let mut store = store();

        let result = tokio_test::block_on(expire_trials(&mut store, &config, &mailer, now()));
        assert!(result.is_err());
        assert!(!store.notifications.contains(&almost_expired_key(1), now()));
    }
}
