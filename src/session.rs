use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, Credentials, SessionToken};
use crate::clock::Clock;
use crate::domain::{CatalogId, RawElementSet};
use crate::error::TleError;

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub ttl: TimeDelta,
    pub cooldown: TimeDelta,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            ttl: TimeDelta::minutes(20),
            cooldown: TimeDelta::seconds(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Authenticated,
    RateLimited,
}

#[derive(Debug, Clone)]
struct Authenticated {
    token: SessionToken,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncSession {
    authenticated: Option<Authenticated>,
    rate_limited_until: Option<DateTime<Utc>>,
}

impl SyncSession {
    pub fn credential_token(&self) -> Option<&SessionToken> {
        self.authenticated.as_ref().map(|auth| &auth.token)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.authenticated.as_ref().map(|auth| auth.issued_at)
    }

    pub fn rate_limited_until(&self) -> Option<DateTime<Utc>> {
        self.rate_limited_until
    }
}

pub struct SessionManager<C: CatalogClient> {
    client: C,
    credentials: Credentials,
    policy: SessionPolicy,
    clock: Arc<dyn Clock>,
    session: SyncSession,
}

impl<C: CatalogClient> SessionManager<C> {
    pub fn new(
        client: C,
        credentials: Credentials,
        policy: SessionPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            credentials,
            policy,
            clock,
            session: SyncSession::default(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        let now = self.clock.now();
        match (&self.session.authenticated, self.session.rate_limited_until) {
            (_, Some(until)) if now < until => SessionState::RateLimited,
            (Some(auth), _) if !self.is_expired(auth, now) => SessionState::Authenticated,
            _ => SessionState::NoSession,
        }
    }

    // Drops the held credential. A pending cooldown is kept.
    pub fn invalidate(&mut self) {
        if self.session.authenticated.take().is_some() {
            debug!("catalog session invalidated");
        }
    }

    pub fn ensure_session(&mut self) -> Result<SessionToken, TleError> {
        self.check_cooldown()?;

        let now = self.clock.now();
        if let Some(auth) = &self.session.authenticated {
            if !self.is_expired(auth, now) {
                return Ok(auth.token.clone());
            }
            debug!(issued_at = %auth.issued_at, "catalog session expired");
        }
        self.login()
    }

    pub fn fetch_latest(&mut self, catalog_id: CatalogId) -> Result<RawElementSet, TleError> {
        let token = self.ensure_session()?;
        match self.client.fetch_latest(&token, catalog_id) {
            Ok(text) => RawElementSet::parse(&text),
            Err(TleError::Throttled) => {
                self.record_throttle();
                Err(TleError::Throttled)
            }
            Err(err @ TleError::Unauthorized(_)) => {
                self.invalidate();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn login(&mut self) -> Result<SessionToken, TleError> {
        self.session.authenticated = None;
        debug!(username = %self.credentials.username, "logging in to catalog");

        match self.client.login(&self.credentials) {
            Ok(token) => {
                let issued_at = self.clock.now();
                self.session.authenticated = Some(Authenticated {
                    token: token.clone(),
                    issued_at,
                });
                info!("catalog session established");
                Ok(token)
            }
            Err(err) => {
                if matches!(err, TleError::Throttled) {
                    self.record_throttle();
                }
                warn!(error = %err, "catalog login failed");
                Err(err)
            }
        }
    }

    fn check_cooldown(&mut self) -> Result<(), TleError> {
        if let Some(until) = self.session.rate_limited_until {
            if self.clock.now() < until {
                return Err(TleError::CoolingDown { until });
            }
            debug!("catalog cooldown expired");
            self.session.rate_limited_until = None;
        }
        Ok(())
    }

    fn record_throttle(&mut self) {
        let until = self.clock.now() + self.policy.cooldown;
        self.session.rate_limited_until = Some(until);
        warn!(%until, "catalog throttled requests; cooling down");
    }

    fn is_expired(&self, auth: &Authenticated, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(auth.issued_at) >= self.policy.ttl
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    const ELEMENTS: &str = "ISS (ZARYA)\n\
        1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927\n\
        2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537\n";

    struct TestClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl TestClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            })
        }

        fn advance(&self, delta: TimeDelta) {
            *self.now.lock().unwrap() += delta;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) {
            self.advance(TimeDelta::from_std(duration).unwrap());
        }
    }

    #[derive(Default)]
    struct ScriptedClient {
        logins: Mutex<usize>,
        fetches: Mutex<usize>,
        throttle_next_fetch: Mutex<bool>,
    }

    impl CatalogClient for ScriptedClient {
        fn login(&self, _credentials: &Credentials) -> Result<SessionToken, TleError> {
            let mut guard = self.logins.lock().unwrap();
            *guard += 1;
            Ok(SessionToken::new(format!("chocolatechip={}", *guard)))
        }

        fn fetch_latest(
            &self,
            _token: &SessionToken,
            _catalog_id: CatalogId,
        ) -> Result<String, TleError> {
            *self.fetches.lock().unwrap() += 1;
            let mut throttle = self.throttle_next_fetch.lock().unwrap();
            if *throttle {
                *throttle = false;
                return Err(TleError::Throttled);
            }
            Ok(ELEMENTS.to_string())
        }
    }

    fn manager(clock: Arc<TestClock>) -> SessionManager<ScriptedClient> {
        let credentials = Credentials {
            username: "ops".to_string(),
            password: "secret".to_string(),
        };
        SessionManager::new(
            ScriptedClient::default(),
            credentials,
            SessionPolicy::default(),
            clock,
        )
    }

    #[test]
    fn reuses_fresh_session_and_refreshes_after_ttl() {
        let clock = TestClock::new();
        let mut manager = manager(clock.clone());

        manager.ensure_session().unwrap();
        clock.advance(TimeDelta::minutes(19));
        manager.ensure_session().unwrap();
        assert_eq!(*manager.client().logins.lock().unwrap(), 1);

        clock.advance(TimeDelta::minutes(1));
        manager.ensure_session().unwrap();
        assert_eq!(*manager.client().logins.lock().unwrap(), 2);
        assert_eq!(manager.session().issued_at(), Some(clock.now()));
        assert_eq!(manager.state(), SessionState::Authenticated);

        manager.invalidate();
        assert_eq!(manager.state(), SessionState::NoSession);
    }

    #[test]
    fn throttle_blocks_requests_for_exactly_the_cooldown() {
        let clock = TestClock::new();
        let mut manager = manager(clock.clone());
        let id = CatalogId::new(25544).unwrap();

        *manager.client().throttle_next_fetch.lock().unwrap() = true;
        assert_matches!(manager.fetch_latest(id), Err(TleError::Throttled));
        assert_eq!(manager.state(), SessionState::RateLimited);
        assert_eq!(
            manager.session().rate_limited_until(),
            Some(clock.now() + TimeDelta::seconds(60))
        );
        assert!(manager.session().credential_token().is_some());

        clock.advance(TimeDelta::seconds(59));
        assert_matches!(manager.fetch_latest(id), Err(TleError::CoolingDown { .. }));
        assert_eq!(*manager.client().fetches.lock().unwrap(), 1);

        clock.advance(TimeDelta::seconds(1));
        let set = manager.fetch_latest(id).unwrap();
        assert_eq!(set.name, "ISS (ZARYA)");
        assert_eq!(*manager.client().fetches.lock().unwrap(), 2);
        assert_eq!(*manager.client().logins.lock().unwrap(), 1);
    }
}
