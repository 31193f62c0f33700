//! Read-only view of the user and listing stores owned by the rest of the platform.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{QuotaError, QuotaResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListingCounts {
    pub total: i64,
    pub active: i64,
    pub created_since: i64,
}

#[async_trait]
pub trait PlatformDirectory: Send + Sync {
    async fn user_exists(&self, user_id: Uuid) -> QuotaResult<bool>;

    async fn count_users(&self) -> QuotaResult<i64>;

    /// Listing totals; `created_since` counts listings created at or after `since`.
    async fn listing_counts(&self, since: DateTime<Utc>) -> QuotaResult<ListingCounts>;
}

/// key: platform-directory-postgres
#[derive(Clone)]
pub struct PgPlatformDirectory {
    pool: PgPool,
}

impl PgPlatformDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlatformDirectory for PgPlatformDirectory {
    async fn user_exists(&self, user_id: Uuid) -> QuotaResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(QuotaError::storage("user_exists"))
    }

    async fn count_users(&self) -> QuotaResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(QuotaError::storage("count_users"))
    }

    async fn listing_counts(&self, since: DateTime<Utc>) -> QuotaResult<ListingCounts> {
        let (total, active, created_since): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'active'),
                COUNT(*) FILTER (WHERE created_at >= $1)
            FROM listings
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(QuotaError::storage("listing_counts"))?;

        Ok(ListingCounts {
            total,
            active,
            created_since,
        })
    }
}

#[derive(Debug, Clone)]
struct ListingEntry {
    active: bool,
    created_at: DateTime<Utc>,
}

/// key: platform-directory-memory
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashSet<Uuid>>,
    listings: RwLock<Vec<ListingEntry>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: Uuid) {
        self.users.write().await.insert(user_id);
    }

    pub async fn add_listing(&self, active: bool, created_at: DateTime<Utc>) {
        self.listings.write().await.push(ListingEntry { active, created_at });
    }
}

#[async_trait]
impl PlatformDirectory for InMemoryDirectory {
    async fn user_exists(&self, user_id: Uuid) -> QuotaResult<bool> {
        Ok(self.users.read().await.contains(&user_id))
    }

    async fn count_users(&self) -> QuotaResult<i64> {
        Ok(self.users.read().await.len() as i64)
    }

    async fn listing_counts(&self, since: DateTime<Utc>) -> QuotaResult<ListingCounts> {
        let listings = self.listings.read().await;
        Ok(ListingCounts {
            total: listings.len() as i64,
            active: listings.iter().filter(|entry| entry.active).count() as i64,
            created_since: listings
                .iter()
                .filter(|entry| entry.created_at >= since)
                .count() as i64,
        })
    }
}
