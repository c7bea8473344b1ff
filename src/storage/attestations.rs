//! Attestation persistence.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::domain::{Attestation, AttestationStatus};
use crate::storage::{parse_json_column, parse_uuid_column, RepoError, RepoResult};

const ATTESTATION_SELECT_SQL: &str = "SELECT
    id, artifact_id, etid, kind, issued_by, role, details, status, created_at, updated_at
FROM attestations";

#[derive(Debug, Clone, Default)]
pub struct AttestationFilter {
    pub artifact_id: Option<Uuid>,
    pub status: Option<AttestationStatus>,
    pub limit: Option<u32>,
    pub offset: u32,
}

pub struct AttestationRepo<'conn> {
    conn: &'conn Connection,
}

impl<'conn> AttestationRepo<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, attestation: &Attestation) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO attestations (
                id, artifact_id, etid, kind, issued_by, role, details, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                attestation.id.to_string(),
                attestation.artifact_id.to_string(),
                attestation.etid,
                attestation.kind,
                attestation.issued_by,
                attestation.role,
                attestation.details.to_string(),
                attestation.status.as_str(),
                attestation.created_at,
                attestation.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> RepoResult<Option<Attestation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ATTESTATION_SELECT_SQL} WHERE id = ?1;"))?;
        stmt.query_row(params![id.to_string()], parse_row)
            .optional()?
            .map(decode)
            .transpose()
    }

    pub fn update_status(
        &self,
        id: Uuid,
        status: AttestationStatus,
        updated_at: i64,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE attestations SET status = ?1, updated_at = ?2 WHERE id = ?3;",
            params![status.as_str(), updated_at, id.to_string()],
        )?;
        Ok(changed > 0)
    }

    pub fn list(&self, filter: &AttestationFilter) -> RepoResult<Vec<Attestation>> {
        let mut sql = format!("{ATTESTATION_SELECT_SQL} WHERE 1 = 1");
        let mut binds: Vec<SqlValue> = Vec::new();

        if let Some(artifact_id) = filter.artifact_id {
            binds.push(SqlValue::Text(artifact_id.to_string()));
            sql.push_str(&format!(" AND artifact_id = ?{}", binds.len()));
        }
        if let Some(status) = filter.status {
            binds.push(SqlValue::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", binds.len()));
        }

        binds.push(SqlValue::Integer(i64::from(filter.limit.unwrap_or(50).min(500))));
        sql.push_str(&format!(" ORDER BY created_at DESC, id LIMIT ?{}", binds.len()));
        binds.push(SqlValue::Integer(i64::from(filter.offset)));
        sql.push_str(&format!(" OFFSET ?{};", binds.len()));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(binds), parse_row)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(decode(raw?)?);
        }
        Ok(out)
    }

    pub fn count_by_status(&self) -> RepoResult<Vec<(String, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM attestations GROUP BY status ORDER BY status;")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

type RawAttestation = (String, String, String, String, String, String, String, String, i64, i64);

fn parse_row(row: &Row<'_>) -> rusqlite::Result<RawAttestation> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn decode(raw: RawAttestation) -> RepoResult<Attestation> {
    let (id, artifact_id, etid, kind, issued_by, role, details, status, created_at, updated_at) =
        raw;
    Ok(Attestation {
        id: parse_uuid_column(&id, "attestations.id")?,
        artifact_id: parse_uuid_column(&artifact_id, "attestations.artifact_id")?,
        etid,
        kind,
        issued_by,
        role,
        details: parse_json_column(&details, "attestations.details")?,
        status: status
            .parse()
            .map_err(|e: crate::domain::models::UnknownVariant| RepoError::InvalidData(e.to_string()))?,
        created_at,
        updated_at,
    })
}
