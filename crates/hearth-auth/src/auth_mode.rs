//! [`AuthMode`]: issuance and mode transitions of bearer tokens.
//!
//! Sessions are a sum type, per the design note: `effective_role=Shared`
//! always carries an `original_role` to restore on `Upgrade`; there is no
//! "downgraded admin" role that coexists independent of its origin.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::{Clock, FullRole, HearthError, HearthResult, Role, Session};
use uuid::Uuid;

use crate::claims::Claims;
use crate::rate_limit::RateLimiter;
use crate::signer::Signer;

/// The external collaborator that resolves login credentials and verifies
/// upgrade passwords. Password-hashing internals are explicitly out of
/// scope here — this trait is the seam an encryption subsystem plugs into.
#[async_trait]
pub trait Credentials: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> HearthResult<LoginIdentity>;
    async fn verify_password(&self, user_id: Uuid, password: &str) -> HearthResult<bool>;
}

#[derive(Debug, Clone, Copy)]
pub struct LoginIdentity {
    pub user_id: Uuid,
    pub family_id: Uuid,
    pub role: FullRole,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthModeConfig {
    pub token_ttl: Duration,
    pub upgrade_window: Duration,
    pub upgrade_max: usize,
}

impl Default for AuthModeConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(4 * 60 * 60),
            upgrade_window: Duration::from_secs(15 * 60),
            upgrade_max: 5,
        }
    }
}

impl AuthModeConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            token_ttl: std::env::var("HEARTH_TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.token_ttl),
            upgrade_window: std::env::var("HEARTH_UPGRADE_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.upgrade_window),
            upgrade_max: std::env::var("HEARTH_UPGRADE_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.upgrade_max),
        }
    }
}

pub struct AuthMode {
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
    credentials: Arc<dyn Credentials>,
    rate_limiter: RateLimiter,
    config: AuthModeConfig,
}

impl AuthMode {
    pub fn new(
        signer: Arc<dyn Signer>,
        clock: Arc<dyn Clock>,
        credentials: Arc<dyn Credentials>,
        rate_limiter: RateLimiter,
        config: AuthModeConfig,
    ) -> Self {
        Self { signer, clock, credentials, rate_limiter, config }
    }

    pub async fn login(&self, email: &str, password: &str) -> HearthResult<String> {
        let identity = self.credentials.login(email, password).await?;
        let now = self.clock.now();
        let expires_at = now + chrono::Duration::from_std(self.config.token_ttl).unwrap_or_default();

        self.issue(Claims {
            sub: identity.user_id,
            family_id: identity.family_id,
            effective_role: Role::from(identity.role),
            original_role: identity.role,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        })
    }

    pub fn validate(&self, token: &str) -> HearthResult<Session> {
        let claims = self.decode(token)?;
        Ok(claims.to_session())
    }

    /// Preserves identity and roles; resets the TTL. See the open question
    /// in the design notes — `Refresh` is TTL-resetting by decision here.
    pub async fn refresh(&self, token: &str) -> HearthResult<String> {
        let claims = self.decode(token)?;
        let now = self.clock.now();
        let expires_at = now + chrono::Duration::from_std(self.config.token_ttl).unwrap_or_default();

        self.issue(Claims {
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
            ..claims
        })
    }

    /// `effective_role = Shared`, `original_role` becomes the prior
    /// effective role. Retains the source `expires_at` — a downgrade does
    /// not extend the session's life.
    pub async fn downgrade(&self, token: &str) -> HearthResult<String> {
        let claims = self.decode(token)?;
        if claims.effective_role == Role::Shared {
            return Err(HearthError::Validation("token is already in shared mode".into()));
        }

        let restored = match claims.effective_role {
            Role::Admin => FullRole::Admin,
            Role::User => FullRole::User,
            Role::Shared => unreachable!("checked above"),
        };

        self.issue(Claims {
            effective_role: Role::Shared,
            original_role: restored,
            jti: Uuid::new_v4(),
            ..claims
        })
    }

    /// Requires `effective_role == Shared`, a passing rate-limit check,
    /// and a matching password. Retains the source `expires_at`.
    pub async fn upgrade(&self, token: &str, password: &str) -> HearthResult<String> {
        let claims = self.decode(token)?;
        if claims.effective_role != Role::Shared {
            return Err(HearthError::Validation("token is not in shared mode".into()));
        }

        self.rate_limiter.check_and_record(claims.sub).await?;

        let ok = self.credentials.verify_password(claims.sub, password).await?;
        if !ok {
            return Err(HearthError::InvalidPassword);
        }

        self.issue(Claims {
            effective_role: Role::from(claims.original_role),
            jti: Uuid::new_v4(),
            ..claims
        })
    }

    fn issue(&self, claims: Claims) -> HearthResult<String> {
        self.signer.sign(&claims).map_err(|e| HearthError::Invalid(e.to_string()))
    }

    fn decode(&self, token: &str) -> HearthResult<Claims> {
        let claims = self.signer.verify(token).map_err(|e| HearthError::Invalid(e.to_string()))?;
        let now = self.clock.now().timestamp();
        if now < claims.nbf {
            return Err(HearthError::Invalid("token not yet valid".into()));
        }
        if now >= claims.exp {
            return Err(HearthError::Expired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::HmacSigner;
    use hearth_core::FakeClock;
    use hearth_persistence::InMemoryStore;
    use std::sync::Mutex;

    struct FixedCredentials {
        identity: LoginIdentity,
        password: &'static str,
        attempts: Mutex<u32>,
    }

    #[async_trait]
    impl Credentials for FixedCredentials {
        async fn login(&self, _email: &str, password: &str) -> HearthResult<LoginIdentity> {
            if password == self.password {
                Ok(self.identity)
            } else {
                Err(HearthError::Invalid("bad credentials".into()))
            }
        }

        async fn verify_password(&self, _user_id: Uuid, password: &str) -> HearthResult<bool> {
            *self.attempts.lock().unwrap() += 1;
            Ok(password == self.password)
        }
    }

    fn setup(password: &'static str) -> (AuthMode, Arc<FakeClock>, LoginIdentity) {
        let identity = LoginIdentity { user_id: Uuid::new_v4(), family_id: Uuid::new_v4(), role: FullRole::Admin };
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let signer: Arc<dyn Signer> = Arc::new(HmacSigner::new(b"test-secret"));
        let store: Arc<dyn hearth_persistence::Store> = Arc::new(InMemoryStore::new());
        let limiter = RateLimiter::new(store, clock.clone(), Duration::from_secs(900), 5);
        let credentials = Arc::new(FixedCredentials { identity, password, attempts: Mutex::new(0) });
        let auth = AuthMode::new(signer, clock.clone(), credentials, limiter, AuthModeConfig::default());
        (auth, clock, identity)
    }

    #[tokio::test]
    async fn downgrade_upgrade_round_trip_preserves_role_and_expiry() {
        let (auth, clock, identity) = setup("correct-horse");

        let t1 = auth.login("a@b.com", "correct-horse").await.unwrap();
        let session1 = auth.validate(&t1).unwrap();
        assert_eq!(session1.effective_role, Role::Admin);

        let t2 = auth.downgrade(&t1).await.unwrap();
        let session2 = auth.validate(&t2).unwrap();
        assert_eq!(session2.effective_role, Role::Shared);
        assert_eq!(session2.original_role, FullRole::Admin);
        assert_eq!(session2.expires_at, session1.expires_at);

        assert!(matches!(auth.upgrade(&t2, "wrong").await, Err(HearthError::InvalidPassword)));

        for _ in 0..5 {
            let _ = auth.upgrade(&t2, "wrong").await;
        }
        assert!(matches!(auth.upgrade(&t2, "wrong").await, Err(HearthError::RateLimited)));

        clock.advance(Duration::from_secs(15 * 60 + 1));

        let t3 = auth.upgrade(&t2, "correct-horse").await.unwrap();
        let session3 = auth.validate(&t3).unwrap();
        assert_eq!(session3.effective_role, Role::Admin);
        assert_eq!(session3.expires_at, session1.expires_at);
        assert_eq!(session3.user_id, identity.user_id);
    }

    #[tokio::test]
    async fn refresh_advances_expiry_but_preserves_identity() {
        let (auth, clock, _identity) = setup("pw");
        let t1 = auth.login("a@b.com", "pw").await.unwrap();
        let s1 = auth.validate(&t1).unwrap();

        clock.advance(Duration::from_secs(60));
        let t2 = auth.refresh(&t1).await.unwrap();
        let s2 = auth.validate(&t2).unwrap();

        assert_eq!(s2.user_id, s1.user_id);
        assert_eq!(s2.family_id, s1.family_id);
        assert_eq!(s2.effective_role, s1.effective_role);
        assert!(s2.expires_at > s1.expires_at);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (auth, clock, _identity) = setup("pw");
        let t1 = auth.login("a@b.com", "pw").await.unwrap();
        clock.advance(Duration::from_secs(5 * 60 * 60));
        assert!(matches!(auth.validate(&t1), Err(HearthError::Expired)));
    }

    #[tokio::test]
    async fn downgrading_an_already_shared_token_is_rejected() {
        let (auth, _clock, _identity) = setup("pw");
        let t1 = auth.login("a@b.com", "pw").await.unwrap();
        let t2 = auth.downgrade(&t1).await.unwrap();
        assert!(auth.downgrade(&t2).await.is_err());
    }
}
