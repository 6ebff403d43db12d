use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use uuid::Uuid;

use super::{CallLog, Directory, SocialGraph};
use crate::db::models::{CallKind, CallRecord, CallStatus, CallUpdate, Participant};
use crate::db::DbPool;
use crate::error::StoreError;

/// SQLite-backed implementation of every collaborator trait.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl SocialGraph for SqliteStore {
    async fn friend_ids(&self, user_id: &str) -> Result<HashSet<String>, StoreError> {
        let uid = user_id.to_string();
        self.with_conn(move |conn| {
            // Both directions, regardless of request status
            let mut stmt = conn.prepare(
                "SELECT friend_id FROM friends WHERE user_id = ?1
                 UNION
                 SELECT user_id FROM friends WHERE friend_id = ?1",
            )?;
            let mut ids = stmt
                .query_map(params![uid], |row| row.get::<_, String>(0))?
                .collect::<Result<HashSet<_>, _>>()?;
            ids.remove(&uid);
            Ok(ids)
        })
        .await
    }
}

#[async_trait]
impl Directory for SqliteStore {
    async fn participants(&self, conversation_id: &str) -> Result<Vec<Participant>, StoreError> {
        let cid = conversation_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.push_token
                 FROM conversation_participants cp
                 JOIN users u ON u.id = cp.user_id
                 WHERE cp.conversation_id = ?1
                 ORDER BY u.id",
            )?;
            let participants = stmt
                .query_map(params![cid], |row| {
                    Ok(Participant {
                        user_id: row.get(0)?,
                        push_token: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(participants)
        })
        .await
    }

    async fn push_token(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let uid = user_id.to_string();
        self.with_conn(move |conn| {
            let token = conn
                .query_row(
                    "SELECT push_token FROM users WHERE id = ?1",
                    params![uid],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?
                .flatten();
            Ok(token)
        })
        .await
    }
}

#[async_trait]
impl CallLog for SqliteStore {
    async fn persist_call_record(&self, record: &CallRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO calls (id, caller_id, receiver_id, call_type, status, duration,
                                    start_time, end_time, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    record.id.to_string(),
                    record.caller_id,
                    record.receiver_id,
                    record.call_type.as_str(),
                    record.status.as_str(),
                    record.duration,
                    record.start_time.map(|t| t.to_rfc3339()),
                    record.end_time.map(|t| t.to_rfc3339()),
                    now,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_call_record(
        &self,
        id: Uuid,
        update: &CallUpdate,
    ) -> Result<Option<CallRecord>, StoreError> {
        let update = update.clone();
        self.with_conn(move |conn| {
            let Some(mut record) = load_call(conn, id)? else {
                return Ok(None);
            };

            if let Some(status) = update.status {
                record.status = status;
            }
            if let Some(duration) = update.duration {
                record.duration = duration;
            }
            if let Some(end_time) = update.end_time {
                record.end_time = Some(end_time);
            }

            conn.execute(
                "UPDATE calls SET status = ?1, duration = ?2, end_time = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    record.status.as_str(),
                    record.duration,
                    record.end_time.map(|t| t.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )?;
            Ok(Some(record))
        })
        .await
    }
}

fn load_call(conn: &Connection, id: Uuid) -> Result<Option<CallRecord>, StoreError> {
    let row = conn
        .query_row(
            "SELECT caller_id, receiver_id, call_type, status, duration, start_time, end_time
             FROM calls WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((caller_id, receiver_id, call_type, status, duration, start, end)) = row else {
        return Ok(None);
    };

    Ok(Some(CallRecord {
        id,
        caller_id,
        receiver_id,
        call_type: CallKind::parse(&call_type)
            .ok_or_else(|| StoreError::CorruptRow(format!("call_type {call_type}")))?,
        status: CallStatus::parse(&status)
            .ok_or_else(|| StoreError::CorruptRow(format!("status {status}")))?,
        duration,
        start_time: parse_time(start)?,
        end_time: parse_time(end)?,
    }))
}

fn parse_time(value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StoreError::CorruptRow(format!("timestamp {s}: {e}")))
        })
        .transpose()
}
