//! Harvest token refresh job.

use crate::models::HarvestCredentials;
use crate::providers::harvest::TokenPair;
use crate::providers::{HarvestProvider, ProviderError};
use crate::store::Store;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Anything that can exchange stale Harvest tokens for fresh ones.
#[allow(async_fn_in_trait)]
pub trait TokenRefresher {
    /// `Ok(None)` when the stored tokens are still fresh.
    async fn refresh_if_stale(
        &self,
        credentials: &HarvestCredentials,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenPair>, ProviderError>;
}

impl TokenRefresher for HarvestProvider {
    async fn refresh_if_stale(
        &self,
        credentials: &HarvestCredentials,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenPair>, ProviderError> {
        self.refresh_access_token_by_demand(credentials, now).await
    }
}

/// Outcome counts of a refresh run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    pub refreshed: usize,
    pub fresh: usize,
    pub cleared: usize,
}

/// Refreshes every connected user's Harvest tokens on demand.
///
/// A failed refresh clears the user's credentials so they have to connect
/// Harvest again.
pub async fn refresh_provider_tokens<R: TokenRefresher>(
    store: &mut Store,
    refresher: &R,
    now: DateTime<Utc>,
) -> RefreshStats {
    let mut stats = RefreshStats::default();

    for user in store.users.iter_mut() {
        let credentials = &mut user.profile.harvest;
        if !credentials.is_connected() {
            continue;
        }

        match refresher.refresh_if_stale(credentials, now).await {
            Ok(Some(tokens)) => {
                credentials.set_tokens(tokens.access_token, tokens.refresh_token, now);
                info!("Refreshed Harvest tokens for {}", user.email);
                stats.refreshed += 1;
            }
            Ok(None) => {
                debug!("Harvest tokens for {} are fresh", user.email);
                stats.fresh += 1;
            }
            Err(e) => {
                warn!("Could not refresh Harvest tokens for {}: {}", user.email, e);
                credentials.clear();
                stats.cleared += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use chrono::{Duration, TimeZone};

    /// Refreshes tokens starting with "stale", fails on "broken".
    struct FakeRefresher;

    impl TokenRefresher for FakeRefresher {
        async fn refresh_if_stale(
            &self,
            credentials: &HarvestCredentials,
            _now: DateTime<Utc>,
        ) -> Result<Option<TokenPair>, ProviderError> {
            match credentials.access_token() {
                token if token.starts_with("stale") => Ok(Some(TokenPair {
                    access_token: "new-access".to_string(),
                    refresh_token: "new-refresh".to_string(),
                })),
                "broken" => Err(ProviderError::Api {
                    status: 401,
                    body: "invalid_grant".to_string(),
                }),
                _ => Ok(None),
            }
        }
    }

    fn user(id: u64, access_token: &str, refreshed_at: DateTime<Utc>) -> User {
        let mut user = User::new(id, format!("user{}@example.com", id), "User");
        if !access_token.is_empty() {
            user.profile.harvest = HarvestCredentials::new(access_token, "refresh", refreshed_at);
        }
        user
    }

    #[test]
    fn test_refresh_updates_clears_and_skips() {
        let now = Utc.with_ymd_and_hms(2024, 7, 8, 5, 0, 0).unwrap();
        let earlier = now - Duration::days(8);
        let mut store = Store {
            users: vec![
                user(1, "stale-token", earlier),
                user(2, "fresh-token", now),
                user(3, "broken", earlier),
                user(4, "", earlier),
            ],
            ..Store::default()
        };

        let stats = tokio_test::block_on(refresh_provider_tokens(&mut store, &FakeRefresher, now));

        assert_eq!(
            stats,
            RefreshStats {
                refreshed: 1,
                fresh: 1,
                cleared: 1
            }
        );

        let refreshed = &store.users[0].profile.harvest;
        assert_eq!(refreshed.access_token(), "new-access");
        assert_eq!(refreshed.refresh_token(), "new-refresh");
        assert_eq!(refreshed.tokens_last_refreshed_at(), Some(now));

        assert_eq!(store.users[1].profile.harvest.access_token(), "fresh-token");

        let cleared = &store.users[2].profile.harvest;
        assert!(!cleared.is_connected());
        assert_eq!(cleared.refresh_token(), "");
        assert_eq!(cleared.tokens_last_refreshed_at(), None);
    }
}
