use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::{
    dto::UpdateUserRequest,
    password::{hash_password, verify_password},
    repo::UserStore,
    repo_types::{NewUser, User},
};
use crate::error::{AppError, DUPLICATE_EMAIL};

pub const INVALID_EMAIL: &str = "Invalid email format";
pub const WEAK_PASSWORD: &str =
    "Password must be at least 8 characters with uppercase, number, and special character";
pub const EMAIL_IMMUTABLE: &str = "Email cannot be updated";
pub const EMAIL_TOO_LONG: &str = "Email must be at most 255 characters";

// column widths in the users table
const MAX_EMAIL_LEN: usize = 255;
const MAX_NAME_LEN: usize = 100;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref PASSWORD_CHARSET_RE: Regex = Regex::new(r"^[A-Za-z0-9@$!%*?&]{8,}$").unwrap();
    static ref UPPERCASE_RE: Regex = Regex::new(r"[A-Z]").unwrap();
    static ref DIGIT_RE: Regex = Regex::new(r"[0-9]").unwrap();
    static ref SPECIAL_RE: Regex = Regex::new(r"[@$!%*?&]").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_strong_password(password: &str) -> bool {
    PASSWORD_CHARSET_RE.is_match(password)
        && UPPERCASE_RE.is_match(password)
        && DIGIT_RE.is_match(password)
        && SPECIAL_RE.is_match(password)
}

fn check_name(field: &str, value: Option<&str>) -> Result<(), AppError> {
    match value {
        Some(v) if v.chars().count() > MAX_NAME_LEN => Err(AppError::Validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("User with id {id} not found"))
}

/// Validates input and mediates every access to the user store.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Creates a user. The returned record still carries the password hash.
    #[instrument(skip(self, password))]
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<User, AppError> {
        if !is_valid_email(email) {
            warn!("invalid email");
            return Err(AppError::Validation(INVALID_EMAIL.into()));
        }
        if email.chars().count() > MAX_EMAIL_LEN {
            warn!("email too long");
            return Err(AppError::Validation(EMAIL_TOO_LONG.into()));
        }
        if !is_strong_password(password) {
            warn!("weak password");
            return Err(AppError::Validation(WEAK_PASSWORD.into()));
        }
        check_name("firstName", first_name.as_deref())?;
        check_name("lastName", last_name.as_deref())?;

        if self.store.find_by_email(email).await?.is_some() {
            warn!("email already registered");
            return Err(AppError::Conflict(DUPLICATE_EMAIL.into()));
        }

        let password_hash = hash_password(password).await?;

        // A concurrent registration can still win the insert; the store reports
        // the unique violation, which converts to the same conflict.
        let user = self
            .store
            .create(NewUser {
                email: email.to_string(),
                password_hash,
                first_name,
                last_name,
            })
            .await?;

        info!(user_id = user.id, "user created");
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.store.find_by_email(email).await?)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<User, AppError> {
        self.store.find_by_id(id).await?.ok_or_else(|| not_found(id))
    }

    #[instrument(skip(self))]
    pub async fn update(&self, id: i64, changes: UpdateUserRequest) -> Result<User, AppError> {
        let mut user = self.find_by_id(id).await?;

        if changes.email.is_some() {
            warn!(user_id = id, "attempt to change email");
            return Err(AppError::Validation(EMAIL_IMMUTABLE.into()));
        }

        if let Some(first_name) = changes.first_name {
            check_name("firstName", first_name.as_deref())?;
            user.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            check_name("lastName", last_name.as_deref())?;
            user.last_name = last_name;
        }

        let saved = self.store.save(&user).await?;
        info!(user_id = id, "user updated");
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.find_by_id(id).await?;
        self.store.delete(id).await?;
        info!(user_id = id, "user deleted");
        Ok(())
    }

    /// True iff `hash` is a hash of `plain`. Malformed hashes compare false.
    pub async fn validate_password(&self, plain: &str, hash: &str) -> bool {
        match verify_password(plain, hash).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "stored password hash is malformed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{
        memory::MemoryUserStore,
        repo::StoreError,
    };
    use async_trait::async_trait;

    fn service() -> UserService {
        UserService::new(Arc::new(MemoryUserStore::new()))
    }

    async fn create_default(svc: &UserService, email: &str) -> User {
        svc.create(email, "Test@1234", Some("John".into()), Some("Doe".into()))
            .await
            .expect("create should succeed")
    }

    #[test]
    fn email_format_rules() {
        assert!(is_valid_email("test@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("space in@example.com"));
    }

    #[test]
    fn password_strength_rules() {
        assert!(is_strong_password("Test@1234"));
        assert!(!is_strong_password("123"));
        assert!(!is_strong_password("Te@1234")); // 7 chars
        assert!(!is_strong_password("test@1234")); // no uppercase
        assert!(!is_strong_password("Test@abcd")); // no digit
        assert!(!is_strong_password("Test12345")); // no symbol
        assert!(!is_strong_password("Test#1234")); // '#' outside the allowed set
    }

    #[tokio::test]
    async fn create_hashes_password_and_keeps_names() {
        let svc = service();
        let user = create_default(&svc, "test@example.com").await;

        assert_eq!(user.email, "test@example.com");
        assert_ne!(user.password_hash, "Test@1234");
        assert_eq!(user.first_name.as_deref(), Some("John"));
        assert_eq!(user.last_name.as_deref(), Some("Doe"));
        assert!(svc.validate_password("Test@1234", &user.password_hash).await);
    }

    #[tokio::test]
    async fn create_twice_with_same_email_conflicts() {
        let svc = service();
        create_default(&svc, "existing@example.com").await;

        let err = svc
            .create("existing@example.com", "Other@5678", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == DUPLICATE_EMAIL));
    }

    #[tokio::test]
    async fn create_rejects_weak_password() {
        let err = service()
            .create("test@example.com", "123", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == WEAK_PASSWORD));
    }

    #[tokio::test]
    async fn create_rejects_malformed_email() {
        let err = service()
            .create("not-an-email", "Test@1234", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == INVALID_EMAIL));
    }

    #[tokio::test]
    async fn create_rejects_overlong_names() {
        let err = service()
            .create("test@example.com", "Test@1234", Some("x".repeat(101)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn email_length_counts_characters_not_bytes() {
        let svc = service();

        // 250 two-byte characters: 500 bytes, but fits VARCHAR(255)
        let wide = format!("{}@example.com", "é".repeat(240));
        assert!(wide.chars().count() <= 255 && wide.len() > 255);
        let user = svc.create(&wide, "Test@1234", None, None).await.unwrap();
        assert_eq!(user.email, wide);

        let long = format!("{}@example.com", "a".repeat(250));
        let err = svc.create(&long, "Test@1234", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == EMAIL_TOO_LONG));
    }

    /// Misses every lookup, so only the store's unique constraint can catch a duplicate.
    struct RacingStore(MemoryUserStore);

    #[async_trait]
    impl UserStore for RacingStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
            self.0.find_by_id(id).await
        }
        async fn create(&self, new: NewUser) -> Result<User, StoreError> {
            self.0.create(new).await
        }
        async fn save(&self, user: &User) -> Result<User, StoreError> {
            self.0.save(user).await
        }
        async fn delete(&self, id: i64) -> Result<(), StoreError> {
            self.0.delete(id).await
        }
    }

    #[tokio::test]
    async fn unique_violation_from_store_is_a_conflict() {
        let svc = UserService::new(Arc::new(RacingStore(MemoryUserStore::new())));
        create_default(&svc, "race@example.com").await;

        let err = svc
            .create("race@example.com", "Test@1234", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == DUPLICATE_EMAIL));
    }

    #[tokio::test]
    async fn find_by_email_returns_none_for_unknown() {
        let svc = service();
        create_default(&svc, "test@example.com").await;

        let found = svc.find_by_email("test@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.email).as_deref(), Some("test@example.com"));
        assert!(svc.find_by_email("nonexistent@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_id_fails_for_unknown() {
        let svc = service();
        let user = create_default(&svc, "test@example.com").await;

        assert_eq!(svc.find_by_id(user.id).await.unwrap().id, user.id);
        let err = svc.find_by_id(999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "User with id 999 not found"));
    }

    #[tokio::test]
    async fn update_persists_only_name_fields() {
        let svc = service();
        let user = create_default(&svc, "test@example.com").await;

        let changes = UpdateUserRequest {
            first_name: Some(Some("Jane".into())),
            last_name: Some(Some("Smith".into())),
            email: None,
        };
        let updated = svc.update(user.id, changes).await.unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Jane"));
        assert_eq!(updated.last_name.as_deref(), Some("Smith"));
        assert_eq!(updated.email, user.email);
        assert_eq!(updated.password_hash, user.password_hash);

        let reloaded = svc.find_by_id(user.id).await.unwrap();
        assert_eq!(reloaded.first_name.as_deref(), Some("Jane"));
        assert_eq!(reloaded.last_name.as_deref(), Some("Smith"));
    }

    #[tokio::test]
    async fn update_leaves_omitted_fields_and_clears_nulls() {
        let svc = service();
        let user = create_default(&svc, "test@example.com").await;

        let changes = UpdateUserRequest {
            first_name: None,
            last_name: Some(None),
            email: None,
        };
        let updated = svc.update(user.id, changes).await.unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("John"));
        assert_eq!(updated.last_name, None);
    }

    #[tokio::test]
    async fn update_with_email_is_rejected_even_alongside_names() {
        let svc = service();
        let user = create_default(&svc, "test@example.com").await;

        let changes = UpdateUserRequest {
            first_name: Some(Some("Jane".into())),
            last_name: None,
            email: Some(Some("newemail@example.com".into())),
        };
        let err = svc.update(user.id, changes).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == EMAIL_IMMUTABLE));

        let reloaded = svc.find_by_id(user.id).await.unwrap();
        assert_eq!(reloaded.first_name.as_deref(), Some("John"));
        assert_eq!(reloaded.email, "test@example.com");
    }

    #[tokio::test]
    async fn update_unknown_user_is_not_found() {
        let err = service()
            .update(42, UpdateUserRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_the_user() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = UserService::new(store.clone());
        let user = create_default(&svc, "test@example.com").await;

        svc.delete(user.id).await.unwrap();
        assert_eq!(store.len(), 0);
        let err = svc.find_by_id(user.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_unknown_user_is_not_found() {
        let err = service().delete(999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn validate_password_only_accepts_the_original_plaintext() {
        let svc = service();
        let user = create_default(&svc, "test@example.com").await;

        assert!(svc.validate_password("Test@1234", &user.password_hash).await);
        assert!(!svc.validate_password("Test@12345", &user.password_hash).await);
        assert!(!svc.validate_password("", &user.password_hash).await);
        assert!(!svc.validate_password("Test@1234", "not-a-valid-hash").await);
    }
}
