//! SQLite-backed datastore for calls, triggers, room slots and configuration
//!
//! Every write republishes the affected snapshot to the in-process
//! [`MemoryFeed`], so subscribers see changes without polling the database.

use crate::db::init::init_in_memory;
use crate::feed::{ConfigDocument, ConfigSnapshot, MemoryFeed};
use crate::model::{compare_rooms, ActiveSlot, AnnounceTrigger, CallEvent, NewCall};
use crate::time::{from_millis, Clock, SystemClock};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Number of calls republished to subscribers after each write
pub const PUBLISHED_CALLS: usize = 50;

/// Maximum calls removed by a single clear operation
pub const CLEAR_BATCH_LIMIT: i64 = 200;

type CallRow = (String, String, String, i64, i64, i64);
type SlotRow = (String, String, i64, i64, String, Option<i64>);

/// Datastore handle
#[derive(Clone)]
pub struct CallStore {
    pool: SqlitePool,
    feed: Arc<MemoryFeed>,
    clock: Arc<dyn Clock>,
}

impl CallStore {
    /// Wrap an initialized pool and publish the current contents
    pub async fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = Self {
            pool,
            feed: Arc::new(MemoryFeed::new()),
            clock,
        };
        store.refresh_all().await?;
        Ok(store)
    }

    /// Private in-memory store on the system clock
    pub async fn in_memory() -> Result<Self> {
        Self::new(init_in_memory().await?, Arc::new(SystemClock)).await
    }

    /// Push feed mirroring this store
    pub fn feed(&self) -> Arc<MemoryFeed> {
        Arc::clone(&self.feed)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Republish every snapshot (startup, or after external edits)
    pub async fn refresh_all(&self) -> Result<()> {
        self.publish_calls().await?;
        self.publish_slots().await?;
        self.feed.publish_config(self.config_snapshot().await?);
        if let Some(trigger) = self.current_trigger().await? {
            self.feed.write_trigger(trigger);
        }
        Ok(())
    }

    // ========================================
    // Calls
    // ========================================

    /// Append a call with a server-assigned, strictly increasing timestamp
    pub async fn append_call(&self, new_call: NewCall) -> Result<CallEvent> {
        let last: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at_ms) FROM calls")
            .fetch_one(&self.pool)
            .await?;
        let now_ms = self.clock.now_ms();
        let created_ms = match last {
            Some(last) if last >= now_ms => last + 1,
            _ => now_ms,
        };

        let event = CallEvent {
            id: Uuid::new_v4().to_string(),
            name: new_call.name,
            room: new_call.room,
            created_at: from_millis(created_ms),
            is_test: new_call.is_test,
            is_recall: new_call.is_recall,
        };

        sqlx::query(
            r#"
            INSERT INTO calls (id, name, room, created_at_ms, is_test, is_recall)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.name)
        .bind(&event.room)
        .bind(created_ms)
        .bind(event.is_test as i64)
        .bind(event.is_recall as i64)
        .execute(&self.pool)
        .await?;

        debug!(
            "Recorded call {} ({} / room '{}', test={}, recall={})",
            event.id, event.name, event.room, event.is_test, event.is_recall
        );
        self.publish_calls().await?;
        Ok(event)
    }

    /// Most recent calls, newest first
    pub async fn recent_calls(&self, limit: usize) -> Result<Vec<CallEvent>> {
        let rows = sqlx::query_as::<_, CallRow>(
            r#"
            SELECT id, name, room, created_at_ms, is_test, is_recall
            FROM calls
            ORDER BY created_at_ms DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(call_from_row).collect())
    }

    /// Delete up to [`CLEAR_BATCH_LIMIT`] calls, newest first
    ///
    /// With `since`, only calls created at or after that instant are removed.
    pub async fn delete_calls(&self, since: Option<DateTime<Utc>>) -> Result<u64> {
        let since_ms = since.map(|s| s.timestamp_millis()).unwrap_or(i64::MIN);
        let result = sqlx::query(
            r#"
            DELETE FROM calls WHERE id IN (
                SELECT id FROM calls
                WHERE created_at_ms >= ?
                ORDER BY created_at_ms DESC
                LIMIT ?
            )
            "#,
        )
        .bind(since_ms)
        .bind(CLEAR_BATCH_LIMIT)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        info!("Cleared {} calls from history", removed);
        self.publish_calls().await?;
        Ok(removed)
    }

    async fn publish_calls(&self) -> Result<()> {
        let calls = self.recent_calls(PUBLISHED_CALLS).await?;
        self.feed.publish_calls(calls);
        Ok(())
    }

    // ========================================
    // Announce trigger
    // ========================================

    /// Overwrite the trigger record with a fresh nonce
    pub async fn write_trigger(
        &self,
        name: &str,
        room: &str,
        idle: Option<bool>,
    ) -> Result<AnnounceTrigger> {
        let trigger = AnnounceTrigger {
            name: name.to_string(),
            room: room.to_string(),
            idle,
            nonce: Uuid::new_v4().to_string(),
            triggered_at: Some(self.clock.now()),
        };
        let triggered_ms = self.clock.now_ms();

        sqlx::query(
            r#"
            INSERT INTO announce_trigger (id, name, room, idle, nonce, triggered_at_ms)
            VALUES (1, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                room = excluded.room,
                idle = excluded.idle,
                nonce = excluded.nonce,
                triggered_at_ms = excluded.triggered_at_ms
            "#,
        )
        .bind(&trigger.name)
        .bind(&trigger.room)
        .bind(idle.map(|b| b as i64))
        .bind(&trigger.nonce)
        .bind(triggered_ms)
        .execute(&self.pool)
        .await?;

        debug!("Trigger written (nonce {}, idle {:?})", trigger.nonce, idle);
        self.feed.write_trigger(trigger.clone());
        Ok(trigger)
    }

    pub async fn current_trigger(&self) -> Result<Option<AnnounceTrigger>> {
        let row = sqlx::query_as::<_, (String, String, Option<i64>, String, i64)>(
            "SELECT name, room, idle, nonce, triggered_at_ms FROM announce_trigger WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(name, room, idle, nonce, at)| AnnounceTrigger {
            name,
            room,
            idle: idle.map(|v| v != 0),
            nonce,
            triggered_at: Some(from_millis(at)),
        }))
    }

    // ========================================
    // Active slots
    // ========================================

    /// Occupy (or re-occupy) a room: resets `since`, clears ack, new ping nonce
    ///
    /// An empty room token is ignored.
    pub async fn set_active_slot(&self, name: &str, room: &str) -> Result<Option<ActiveSlot>> {
        let room = room.trim();
        if room.is_empty() {
            return Ok(None);
        }
        let now_ms = self.clock.now_ms();

        sqlx::query(
            r#"
            INSERT INTO active_calls (room, name, since_ms, ack, ping_nonce, last_announced_at_ms)
            VALUES (?, ?, ?, 0, ?, NULL)
            ON CONFLICT(room) DO UPDATE SET
                name = excluded.name,
                since_ms = excluded.since_ms,
                ack = 0,
                ping_nonce = excluded.ping_nonce
            "#,
        )
        .bind(room)
        .bind(name)
        .bind(now_ms)
        .bind(Uuid::new_v4().to_string())
        .execute(&self.pool)
        .await?;

        self.publish_slots().await?;
        self.active_slot(room).await
    }

    /// Re-announce a room without touching `since`
    pub async fn ping_active_slot(&self, name: &str, room: &str) -> Result<Option<ActiveSlot>> {
        let room = room.trim();
        if room.is_empty() {
            return Ok(None);
        }
        let now_ms = self.clock.now_ms();

        sqlx::query(
            r#"
            INSERT INTO active_calls (room, name, since_ms, ack, ping_nonce, last_announced_at_ms)
            VALUES (?, ?, ?, 0, ?, ?)
            ON CONFLICT(room) DO UPDATE SET
                name = excluded.name,
                ping_nonce = excluded.ping_nonce,
                last_announced_at_ms = excluded.last_announced_at_ms
            "#,
        )
        .bind(room)
        .bind(name)
        .bind(now_ms)
        .bind(Uuid::new_v4().to_string())
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        self.publish_slots().await?;
        self.active_slot(room).await
    }

    /// Free a room (patient attended). Returns whether a slot existed.
    pub async fn remove_active_slot(&self, room: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM active_calls WHERE room = ?")
            .bind(room.trim())
            .execute(&self.pool)
            .await?;
        self.publish_slots().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn active_slot(&self, room: &str) -> Result<Option<ActiveSlot>> {
        let row = sqlx::query_as::<_, SlotRow>(
            r#"
            SELECT room, name, since_ms, ack, ping_nonce, last_announced_at_ms
            FROM active_calls WHERE room = ?
            "#,
        )
        .bind(room.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(slot_from_row))
    }

    /// All occupied rooms in natural room order
    pub async fn active_slots(&self) -> Result<Vec<ActiveSlot>> {
        let rows = sqlx::query_as::<_, SlotRow>(
            "SELECT room, name, since_ms, ack, ping_nonce, last_announced_at_ms FROM active_calls",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut slots: Vec<ActiveSlot> = rows.into_iter().map(slot_from_row).collect();
        slots.sort_by(|a, b| compare_rooms(&a.room, &b.room));
        Ok(slots)
    }

    async fn publish_slots(&self) -> Result<()> {
        let slots = self.active_slots().await?;
        self.feed.publish_slots(slots);
        Ok(())
    }

    // ========================================
    // Configuration documents
    // ========================================

    /// Shallow-merge `patch` into the document `id`, creating it if needed
    pub async fn put_config(&self, id: &str, patch: Value) -> Result<Value> {
        let Value::Object(patch) = patch else {
            return Err(Error::InvalidInput(
                "configuration patch must be a JSON object".to_string(),
            ));
        };

        let existing: Option<String> =
            sqlx::query_scalar("SELECT body FROM config_docs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let mut merged = match existing {
            Some(body) => match serde_json::from_str::<Value>(&body)? {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
            None => serde_json::Map::new(),
        };
        merged.extend(patch);
        let merged = Value::Object(merged);

        sqlx::query(
            r#"
            INSERT INTO config_docs (id, body, updated_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                body = excluded.body,
                updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(id)
        .bind(serde_json::to_string(&merged)?)
        .bind(self.clock.now_ms())
        .execute(&self.pool)
        .await?;

        info!("Configuration document '{}' updated", id);
        self.feed.publish_config(self.config_snapshot().await?);
        Ok(merged)
    }

    /// Every configuration document; unreadable bodies are skipped
    pub async fn config_snapshot(&self) -> Result<ConfigSnapshot> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT id, body FROM config_docs ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let documents = rows
            .into_iter()
            .filter_map(|(id, body)| match serde_json::from_str::<Value>(&body) {
                Ok(body) => Some(ConfigDocument { id, body }),
                Err(e) => {
                    tracing::warn!("Skipping unreadable config document '{}': {}", id, e);
                    None
                }
            })
            .collect();

        Ok(ConfigSnapshot { documents })
    }
}

fn call_from_row(row: CallRow) -> CallEvent {
    CallEvent {
        id: row.0,
        name: row.1,
        room: row.2,
        created_at: from_millis(row.3),
        is_test: row.4 != 0,
        is_recall: row.5 != 0,
    }
}

fn slot_from_row(row: SlotRow) -> ActiveSlot {
    ActiveSlot {
        room: row.0,
        name: row.1,
        since: from_millis(row.2),
        ack: row.3 != 0,
        ping_nonce: row.4,
        last_announced_at: row.5.map(from_millis),
    }
}
