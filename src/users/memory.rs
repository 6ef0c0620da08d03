use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{
    repo::{StoreError, UserStore},
    repo_types::{NewUser, User},
};

/// In-memory `UserStore` with the same email uniqueness rule as the `users` table.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<i64, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().unwrap().rows.get(&id).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.rows.values().any(|u| u.email == new.email) {
            return Err(StoreError::UniqueViolation("users_email_key".into()));
        }
        inner.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: inner.next_id,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let row = inner
            .rows
            .get_mut(&user.id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        row.first_name = user.first_name.clone();
        row.last_name = user.last_name.clone();
        row.updated_at = OffsetDateTime::now_utc();
        Ok(row.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.inner.lock().unwrap().rows.remove(&id);
        Ok(())
    }
}
