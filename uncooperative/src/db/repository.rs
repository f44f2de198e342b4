//! Snapshot store trait and its implementations.
//!
//! A game is persisted as one JSON document per snapshot. Writes are
//! compare-and-swap on the snapshot version so two processes can never both
//! commit the same round.

use async_trait::async_trait;
use log::debug;
use sqlx::{PgPool, Row};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tokio::sync::RwLock;

use super::{
    errors::{StoreError, StoreResult},
    timeouts::{DEFAULT_QUERY_TIMEOUT, with_timeout},
};
use crate::game::entities::{GameId, GameSnapshot};

/// Shared state store for game snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest stored snapshot of a game.
    async fn load(&self, id: GameId) -> StoreResult<Option<GameSnapshot>>;

    /// Store `snapshot` if the stored version is still `expected_version`.
    /// `None` means the game must not exist yet.
    async fn save(&self, snapshot: &GameSnapshot, expected_version: Option<u64>)
    -> StoreResult<()>;

    /// Ids of every stored game, oldest first.
    async fn list_ids(&self) -> StoreResult<Vec<GameId>>;

    async fn delete(&self, id: GameId) -> StoreResult<()>;
}

/// In-process store. Used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<GameId, GameSnapshot>>,
    unavailable: AtomicBool,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail as if the backing store were
    /// down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, id: GameId) -> StoreResult<Option<GameSnapshot>> {
        self.check_available()?;
        Ok(self.snapshots.read().await.get(&id).cloned())
    }

    async fn save(
        &self,
        snapshot: &GameSnapshot,
        expected_version: Option<u64>,
    ) -> StoreResult<()> {
        self.check_available()?;
        let mut snapshots = self.snapshots.write().await;
        let actual = snapshots.get(&snapshot.id).map(|s| s.version);
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                id: snapshot.id,
                expected: expected_version,
                actual,
            });
        }
        snapshots.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<GameId>> {
        self.check_available()?;
        let snapshots = self.snapshots.read().await;
        let mut games: Vec<&GameSnapshot> = snapshots.values().collect();
        games.sort_by_key(|s| (s.state.created_at, s.id));
        Ok(games.into_iter().map(|s| s.id).collect())
    }

    async fn delete(&self, id: GameId) -> StoreResult<()> {
        self.check_available()?;
        self.snapshots.write().await.remove(&id);
        Ok(())
    }
}

/// PostgreSQL implementation of [`SnapshotStore`]
pub struct PgSnapshotStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgSnapshotStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    async fn stored_version(&self, id: GameId) -> StoreResult<Option<u64>> {
        let row = with_timeout(
            self.query_timeout,
            sqlx::query("SELECT version FROM games WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(|r| r.get::<i64, _>("version") as u64))
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn load(&self, id: GameId) -> StoreResult<Option<GameSnapshot>> {
        let row = with_timeout(
            self.query_timeout,
            sqlx::query("SELECT document::text AS document FROM games WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?;

        match row {
            Some(row) => {
                let document: String = row.get("document");
                Ok(Some(serde_json::from_str(&document)?))
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        snapshot: &GameSnapshot,
        expected_version: Option<u64>,
    ) -> StoreResult<()> {
        let document = serde_json::to_string(snapshot)?;
        let status = snapshot.state.status.to_string();

        let result = match expected_version {
            None => {
                with_timeout(
                    self.query_timeout,
                    sqlx::query(
                        "INSERT INTO games (id, version, status, document, created_at)
                         VALUES ($1, $2, $3, $4::jsonb, $5)
                         ON CONFLICT (id) DO NOTHING",
                    )
                    .bind(snapshot.id)
                    .bind(snapshot.version as i64)
                    .bind(&status)
                    .bind(&document)
                    .bind(snapshot.state.created_at)
                    .execute(&self.pool),
                )
                .await?
            }
            Some(expected) => {
                with_timeout(
                    self.query_timeout,
                    sqlx::query(
                        "UPDATE games
                         SET version = $2, status = $3, document = $4::jsonb, updated_at = NOW()
                         WHERE id = $1 AND version = $5",
                    )
                    .bind(snapshot.id)
                    .bind(snapshot.version as i64)
                    .bind(&status)
                    .bind(&document)
                    .bind(expected as i64)
                    .execute(&self.pool),
                )
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                id: snapshot.id,
                expected: expected_version,
                actual: self.stored_version(snapshot.id).await?,
            });
        }
        debug!("saved game {} at version {}", snapshot.id, snapshot.version);
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<GameId>> {
        let rows = with_timeout(
            self.query_timeout,
            sqlx::query("SELECT id FROM games ORDER BY created_at, id").fetch_all(&self.pool),
        )
        .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn delete(&self, id: GameId) -> StoreResult<()> {
        with_timeout(
            self.query_timeout,
            sqlx::query("DELETE FROM games WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
