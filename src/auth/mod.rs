//! Registration, login and session token handling.
//!
//! [`AuthService`] sits on top of a [`UserStore`](crate::db::UserStore). Passwords are
//! hashed with bcrypt on the blocking pool; session tokens are stateless HS256 JWTs.

pub mod password;
pub mod token;

pub use token::{Claims, TokenError, TokenSigner};

use chrono::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::db::{AuthResponse, DynUserStore, StoreError, User, UserResponse};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("User already exists")]
    EmailTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No token provided")]
    TokenMissing,

    #[error("Invalid or expired token")]
    TokenInvalid,

    #[error("User not found")]
    UserNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal auth error: {0}")]
    Internal(String),
}

pub struct AuthService {
    store: DynUserStore,
    signer: TokenSigner,
    bcrypt_cost: u32,
    /// Serializes the read-modify-write of registration
    write_lock: Mutex<()>,
}

impl AuthService {
    pub fn new(store: DynUserStore, signer: TokenSigner, bcrypt_cost: u32) -> Self {
        Self {
            store,
            signer,
            bcrypt_cost,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(store: DynUserStore, config: &AuthConfig) -> Self {
        let secret = config.signing_secret();
        let signer = TokenSigner::new(secret.as_bytes(), Duration::hours(config.token_ttl_hours));
        Self::new(store, signer, config.bcrypt_cost)
    }

    /// Create a user and return its public view with a fresh token.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthError> {
        require("name", name)?;
        require("email", email)?;
        require("password", password)?;

        // Cheap pre-check so a taken email does not cost a bcrypt round
        if self.store.load().await.find_by_email(email).is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash(password).await?;

        let user = {
            let _guard = self.write_lock.lock().await;
            let mut snapshot = self.store.load().await;
            if snapshot.find_by_email(email).is_some() {
                return Err(AuthError::EmailTaken);
            }

            let user = User {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                email: email.to_string(),
                password_hash,
            };
            snapshot.push(user.clone());
            self.store.save(&snapshot).await?;
            user
        };

        info!(user_id = %user.id, email = %user.email, "User registered");

        let token = self.issue_token(&user)?;
        Ok(AuthResponse {
            user: UserResponse::from(user),
            token,
        })
    }

    /// Check credentials and issue a fresh token.
    ///
    /// Unknown email and wrong password produce the same error.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        require("email", email)?;
        require("password", password)?;

        let snapshot = self.store.load().await;
        let Some(user) = snapshot.find_by_email(email).cloned() else {
            debug!("Login attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.verify(password, &user.password_hash).await? {
            warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, "User logged in");

        let token = self.issue_token(&user)?;
        Ok(AuthResponse {
            user: UserResponse::from(user),
            token,
        })
    }

    /// Validate a bearer token and return its claims.
    pub fn verify_token(&self, token: Option<&str>) -> Result<Claims, AuthError> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::TokenMissing),
        };

        self.signer.verify(token).map_err(|e| {
            debug!(error = %e, "Token verification failed");
            AuthError::TokenInvalid
        })
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        self.signer
            .issue(user)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Resolve the user a token was issued for.
    pub async fn current_user(&self, claims: &Claims) -> Result<UserResponse, AuthError> {
        self.store
            .load()
            .await
            .find_by_id(&claims.id)
            .map(UserResponse::from)
            .ok_or(AuthError::UserNotFound)
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || password::hash_password(&password, cost))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(|e| AuthError::Internal(format!("Failed to hash password: {}", e)))
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

fn require(field: &'static str, value: &str) -> Result<(), AuthError> {
    if value.is_empty() {
        Err(AuthError::MissingField(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{JsonFileStore, Snapshot, UserStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: Arc<JsonFileStore>,
        auth: Arc<AuthService>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("users.json")));
        let signer = TokenSigner::new(b"test-secret", Duration::days(1));
        let auth = Arc::new(AuthService::new(store.clone(), signer, 4));
        Harness {
            _dir: dir,
            store,
            auth,
        }
    }

    #[tokio::test]
    async fn test_register_distinct_emails() {
        let h = harness();
        let a = h.auth.register("Alice", "a@x.com", "pw123").await.unwrap();
        let b = h.auth.register("Bob", "b@x.com", "pw456").await.unwrap();

        assert_ne!(a.user.id, b.user.id);
        assert_eq!(h.store.load().await.len(), 2);
    }

    #[tokio::test]
    async fn test_register_same_email_twice() {
        let h = harness();
        h.auth.register("Alice", "a@x.com", "pw123").await.unwrap();
        let err = h.auth.register("Alice 2", "a@x.com", "other").await.unwrap_err();

        assert!(matches!(err, AuthError::EmailTaken));
        assert_eq!(h.store.load().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_stores_hash_not_password() {
        let h = harness();
        h.auth.register("Alice", "a@x.com", "pw123").await.unwrap();

        let snapshot = h.store.load().await;
        let stored = snapshot.find_by_email("a@x.com").unwrap();
        assert_ne!(stored.password_hash, "pw123");
        assert!(password::verify_password("pw123", &stored.password_hash));
    }

    #[tokio::test]
    async fn test_register_missing_fields() {
        let h = harness();
        assert!(matches!(
            h.auth.register("", "a@x.com", "pw").await,
            Err(AuthError::MissingField("name"))
        ));
        assert!(matches!(
            h.auth.register("Alice", "", "pw").await,
            Err(AuthError::MissingField("email"))
        ));
        assert!(matches!(
            h.auth.register("Alice", "a@x.com", "").await,
            Err(AuthError::MissingField("password"))
        ));
        assert!(h.store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_login_token_carries_user_id() {
        let h = harness();
        let registered = h.auth.register("Alice", "a@x.com", "pw123").await.unwrap();
        let session = h.auth.login("a@x.com", "pw123").await.unwrap();

        let claims = h.auth.verify_token(Some(&session.token)).unwrap();
        assert_eq!(claims.id, registered.user.id);
        assert_eq!(session.user, registered.user);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness();
        h.auth.register("Alice", "a@x.com", "pw123").await.unwrap();

        let wrong_password = h.auth.login("a@x.com", "nope").await.unwrap_err();
        let unknown_email = h.auth.login("z@x.com", "pw123").await.unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_email, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_login_email_is_case_sensitive() {
        let h = harness();
        h.auth.register("Alice", "a@x.com", "pw123").await.unwrap();

        assert!(matches!(
            h.auth.login("A@X.COM", "pw123").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_login_with_corrupt_hash() {
        let h = harness();
        let mut snapshot = Snapshot::default();
        snapshot.push(User {
            id: "legacy".to_string(),
            name: "Legacy".to_string(),
            email: "l@x.com".to_string(),
            password_hash: "plaintext".to_string(),
        });
        h.store.save(&snapshot).await.unwrap();

        assert!(matches!(
            h.auth.login("l@x.com", "plaintext").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_register_token_resolves_to_user() {
        let h = harness();
        let session = h.auth.register("Alice", "a@x.com", "pw123").await.unwrap();

        let claims = h.auth.verify_token(Some(&session.token)).unwrap();
        let user = h.auth.current_user(&claims).await.unwrap();

        assert_eq!(user.name, "Alice");
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.id, session.user.id);
    }

    #[tokio::test]
    async fn test_verify_token_missing_and_invalid() {
        let h = harness();
        assert!(matches!(h.auth.verify_token(None), Err(AuthError::TokenMissing)));
        assert!(matches!(h.auth.verify_token(Some("")), Err(AuthError::TokenMissing)));
        assert!(matches!(
            h.auth.verify_token(Some("abc.def.ghi")),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_current_user_removed_from_store() {
        let h = harness();
        let session = h.auth.register("Alice", "a@x.com", "pw123").await.unwrap();
        let claims = h.auth.verify_token(Some(&session.token)).unwrap();

        h.store.save(&Snapshot::default()).await.unwrap();

        assert!(matches!(
            h.auth.current_user(&claims).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_same_email_registers_once() {
        let h = harness();
        let mut handles = Vec::new();
        for i in 0..8 {
            let auth = h.auth.clone();
            handles.push(tokio::spawn(async move {
                auth.register(&format!("Racer {}", i), "race@x.com", "pw").await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AuthError::EmailTaken) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(h.store.load().await.len(), 1);
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl UserStore for FailingStore {
        async fn load(&self) -> Snapshot {
            Snapshot::default()
        }

        async fn save(&self, _snapshot: &Snapshot) -> Result<(), StoreError> {
            Err(StoreError::Task("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_register_surfaces_store_failure() {
        let signer = TokenSigner::new(b"test-secret", Duration::days(1));
        let auth = AuthService::new(Arc::new(FailingStore), signer, 4);

        let err = auth.register("Alice", "a@x.com", "pw123").await.unwrap_err();
        assert!(matches!(err, AuthError::Store(StoreError::Task(_))));
    }

    #[tokio::test]
    async fn test_concurrent_distinct_registers_keep_all_writes() {
        let h = harness();
        let mut handles = Vec::new();
        for i in 0..8 {
            let auth = h.auth.clone();
            handles.push(tokio::spawn(async move {
                auth.register("User", &format!("user{}@x.com", i), "pw").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(h.store.load().await.len(), 8);
    }
}
