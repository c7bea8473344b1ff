//! Artifact timeline events.

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::domain::{ArtifactEvent, EventType};
use crate::storage::{parse_json_column, parse_uuid_column, RepoError, RepoResult};

pub struct EventRepo<'conn> {
    conn: &'conn Connection,
}

impl<'conn> EventRepo<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn append(&self, event: &ArtifactEvent) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO artifact_events (id, artifact_id, event_type, actor, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                event.id.to_string(),
                event.artifact_id.to_string(),
                event.event_type.as_str(),
                event.actor,
                event.payload.to_string(),
                event.created_at,
            ],
        )?;
        Ok(())
    }

    /// Events for one artifact, oldest first.
    pub fn for_artifact(&self, artifact_id: Uuid) -> RepoResult<Vec<ArtifactEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, artifact_id, event_type, actor, payload, created_at
             FROM artifact_events
             WHERE artifact_id = ?1
             ORDER BY created_at, rowid;",
        )?;
        let rows = stmt.query_map(params![artifact_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, artifact_id, event_type, actor, payload, created_at) = row?;
            events.push(ArtifactEvent {
                id: parse_uuid_column(&id, "artifact_events.id")?,
                artifact_id: parse_uuid_column(&artifact_id, "artifact_events.artifact_id")?,
                event_type: event_type
                    .parse::<EventType>()
                    .map_err(|e| RepoError::InvalidData(e.to_string()))?,
                actor,
                payload: parse_json_column(&payload, "artifact_events.payload")?,
                created_at,
            });
        }
        Ok(events)
    }
}
