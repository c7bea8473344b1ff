//! Provenance link persistence.

use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::domain::ProvenanceLink;
use crate::storage::{parse_uuid_column, RepoResult};

pub struct ProvenanceRepo<'conn> {
    conn: &'conn Connection,
}

impl<'conn> ProvenanceRepo<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, link: &ProvenanceLink) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO provenance_links (
                id, parent_artifact_id, child_artifact_id, relation, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                link.id.to_string(),
                link.parent_artifact_id.to_string(),
                link.child_artifact_id.to_string(),
                link.relation,
                link.created_by,
                link.created_at,
            ],
        )?;
        Ok(())
    }

    /// Links whose child is `artifact_id`.
    pub fn parents_of(&self, artifact_id: Uuid) -> RepoResult<Vec<ProvenanceLink>> {
        self.select("child_artifact_id", artifact_id)
    }

    /// Links whose parent is `artifact_id`.
    pub fn children_of(&self, artifact_id: Uuid) -> RepoResult<Vec<ProvenanceLink>> {
        self.select("parent_artifact_id", artifact_id)
    }

    fn select(&self, column: &str, artifact_id: Uuid) -> RepoResult<Vec<ProvenanceLink>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, parent_artifact_id, child_artifact_id, relation, created_by, created_at
             FROM provenance_links
             WHERE {column} = ?1
             ORDER BY created_at, id;"
        ))?;
        let rows = stmt.query_map(params![artifact_id.to_string()], raw_link)?;
        let mut links = Vec::new();
        for row in rows {
            let (id, parent, child, relation, created_by, created_at) = row?;
            links.push(ProvenanceLink {
                id: parse_uuid_column(&id, "provenance_links.id")?,
                parent_artifact_id: parse_uuid_column(&parent, "provenance_links.parent_artifact_id")?,
                child_artifact_id: parse_uuid_column(&child, "provenance_links.child_artifact_id")?,
                relation,
                created_by,
                created_at,
            });
        }
        Ok(links)
    }
}

fn raw_link(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, String, i64)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}
