use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{
    application::unit_of_work::CatalogUnitOfWork,
    error::{CatalogError, Result},
    types::{GUEST_LOGIN, SessionRecord, TokenScope, User},
};

use super::password::{MIN_PASSWORD_LENGTH, hash_password, verify_password};
use super::session_token::{SessionToken, hash_token};

pub const DEFAULT_SESSION_TTL_DAYS: i64 = 30;
pub const DEFAULT_GUEST_PASSWORD: &str = "guestpass";
const GUEST_EMAIL: &str = "guest@stroke.local";

#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub login: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// A token minted at login. The raw value is only available here.
#[derive(Debug)]
pub struct IssuedSession {
    pub user: User,
    pub token: SessionToken,
    pub scopes: Vec<TokenScope>,
}

/// Result of resolving a bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub session: SessionRecord,
}

impl AuthenticatedUser {
    pub fn require_scope(&self, scope: TokenScope) -> Result<()> {
        if self.session.has_scope(scope) {
            Ok(())
        } else {
            Err(CatalogError::access_denied(format!(
                "token lacks the {} scope",
                scope.as_str()
            )))
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    uow: Arc<CatalogUnitOfWork>,
    session_ttl: Duration,
    /// Serializes the first-admin count with the insert that follows it.
    registration: Arc<Mutex<()>>,
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("session_ttl", &self.session_ttl)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn new(uow: Arc<CatalogUnitOfWork>, session_ttl: Duration) -> Self {
        Self {
            uow,
            session_ttl,
            registration: Arc::new(Mutex::new(())),
        }
    }

    /// Create an account. The first non-guest account becomes a site admin.
    #[instrument(skip(self, request), fields(login = %request.login))]
    pub async fn register(&self, request: RegisterUser) -> Result<User> {
        let login = request.login.trim();
        if login.is_empty() {
            return Err(CatalogError::validation("login must not be empty"));
        }
        if login.eq_ignore_ascii_case(GUEST_LOGIN) {
            return Err(CatalogError::validation("the guest login is reserved"));
        }
        if !request.email.contains('@') {
            return Err(CatalogError::validation("email address is not valid"));
        }
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(CatalogError::validation(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let password_hash = hash_password(&request.password)?;

        let _registering = self.registration.lock().await;
        let admin = self.registered_users().await? == 0;
        let mut user = User::new(
            login,
            request.email,
            request.first_name,
            request.last_name,
            admin,
        );
        user.password_hash = Some(password_hash);

        let user = self.uow.users.create_user(user).await?;
        info!(user = %user.id, admin, "registered user");
        Ok(user)
    }

    async fn registered_users(&self) -> Result<i64> {
        let total = self.uow.users.count_users().await?;
        let guest = self.uow.users.get_user_by_login(GUEST_LOGIN).await?;
        Ok(total - i64::from(guest.is_some()))
    }

    /// Password check with the guest bypass: the `guest` login, in any case,
    /// yields the provisioned guest account without looking at the password.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<User> {
        let login = login.trim();
        if login.eq_ignore_ascii_case(GUEST_LOGIN) {
            return self
                .uow
                .users
                .get_user_by_login(GUEST_LOGIN)
                .await?
                .ok_or_else(|| {
                    warn!("guest login attempted before the guest account exists");
                    invalid_credentials()
                });
        }

        let user = self
            .uow
            .users
            .get_user_by_login(login)
            .await?
            .ok_or_else(invalid_credentials)?;
        let verified = user
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(hash, password));
        if !verified {
            debug!(login, "password mismatch");
            return Err(invalid_credentials());
        }
        Ok(user)
    }

    pub async fn login(&self, login: &str, password: &str) -> Result<IssuedSession> {
        let user = self.authenticate(login, password).await?;
        let token = SessionToken::generate(self.session_ttl)?;
        let scopes = TokenScope::all();

        self.uow
            .sessions
            .create_session(SessionRecord {
                token_hash: token.hash(),
                user_id: user.id,
                scopes: scopes.clone(),
                created_at: token.created_at(),
                expires_at: token.expires_at(),
            })
            .await?;
        info!(user = %user.id, expires_at = %token.expires_at(), "session issued");

        Ok(IssuedSession {
            user,
            token,
            scopes,
        })
    }

    pub async fn logout(&self, raw_token: &str) -> Result<bool> {
        self.uow.sessions.delete_session(&hash_token(raw_token)).await
    }

    /// Same as [`logout`](Self::logout) for a session that is already resolved.
    pub async fn revoke_session(&self, session: &SessionRecord) -> Result<bool> {
        self.uow.sessions.delete_session(&session.token_hash).await
    }

    /// Map a raw bearer token to its user. Unknown and expired tokens are
    /// `Unauthorized`; expired ones are deleted on the way.
    pub async fn resolve_token(&self, raw_token: &str) -> Result<AuthenticatedUser> {
        let hash = hash_token(raw_token);
        let session = self
            .uow
            .sessions
            .get_session(&hash)
            .await?
            .ok_or_else(invalid_token)?;

        if session.is_expired(Utc::now()) {
            self.uow.sessions.delete_session(&hash).await?;
            return Err(invalid_token());
        }

        let user = self
            .uow
            .users
            .get_user(session.user_id)
            .await?
            .ok_or_else(invalid_token)?;
        Ok(AuthenticatedUser { user, session })
    }

    /// Create the guest account unless it exists. Losing a creation race to
    /// another process counts as success.
    #[instrument(skip(self, password))]
    pub async fn ensure_guest_account(&self, password: &str) -> Result<User> {
        if let Some(existing) = self.uow.users.get_user_by_login(GUEST_LOGIN).await? {
            debug!(user = %existing.id, "guest account already provisioned");
            return Ok(existing);
        }

        let mut guest = User::new(GUEST_LOGIN, GUEST_EMAIL, "Guest", "User", false);
        guest.password_hash = Some(hash_password(password)?);

        match self.uow.users.create_user(guest).await {
            Ok(user) => {
                info!(user = %user.id, "provisioned guest account");
                Ok(user)
            }
            Err(CatalogError::Conflict(_)) => self
                .uow
                .users
                .get_user_by_login(GUEST_LOGIN)
                .await?
                .ok_or_else(|| CatalogError::internal("guest account vanished after conflict")),
            Err(err) => Err(err),
        }
    }

    pub async fn prune_expired_sessions(&self) -> Result<u64> {
        let removed = self.uow.sessions.delete_expired(Utc::now()).await?;
        if removed > 0 {
            info!(removed, "pruned expired sessions");
        }
        Ok(removed)
    }
}

fn invalid_credentials() -> CatalogError {
    CatalogError::Unauthorized("login failed".to_string())
}

fn invalid_token() -> CatalogError {
    CatalogError::Unauthorized("invalid or expired token".to_string())
}
