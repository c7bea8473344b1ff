//! Artifact persistence.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{Artifact, DocumentKind, SealStatus};
use crate::storage::{parse_json_column, parse_uuid_column, RepoError, RepoResult};

const ARTIFACT_SELECT_SQL: &str = "SELECT
    id,
    loan_id,
    kind,
    filename,
    payload_sha256,
    size_bytes,
    etid,
    walacor_tx_id,
    status,
    created_by,
    created_at,
    sealed_at,
    metadata,
    payload_json
FROM artifacts";

/// Listing filters. `limit` defaults to 50 and is capped at 500.
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    pub loan_id: Option<String>,
    pub status: Option<SealStatus>,
    pub created_by: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

pub struct ArtifactRepo<'conn> {
    conn: &'conn Connection,
}

impl<'conn> ArtifactRepo<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, artifact: &Artifact) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO artifacts (
                id, loan_id, kind, filename, payload_sha256, size_bytes, etid,
                walacor_tx_id, status, created_by, created_at, sealed_at, metadata, payload_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);",
            params![
                artifact.id.to_string(),
                artifact.loan_id,
                artifact.kind.as_str(),
                artifact.filename,
                artifact.payload_sha256,
                artifact.size_bytes as i64,
                artifact.etid,
                artifact.walacor_tx_id,
                artifact.status.as_str(),
                artifact.created_by,
                artifact.created_at,
                artifact.sealed_at,
                artifact.metadata.to_string(),
                artifact.payload_json.as_ref().map(Value::to_string),
            ],
        )?;
        Ok(())
    }

    /// Record a successful seal.
    pub fn mark_sealed(
        &self,
        id: Uuid,
        etid: &str,
        walacor_tx_id: Option<&str>,
        sealed_at: i64,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE artifacts
             SET etid = ?1, walacor_tx_id = ?2, status = 'sealed', sealed_at = ?3
             WHERE id = ?4;",
            params![etid, walacor_tx_id, sealed_at, id.to_string()],
        )?;
        Ok(changed > 0)
    }

    pub fn set_status(&self, id: Uuid, status: SealStatus) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE artifacts SET status = ?1 WHERE id = ?2;",
            params![status.as_str(), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    pub fn get(&self, id: Uuid) -> RepoResult<Option<Artifact>> {
        self.query_one(
            &format!("{ARTIFACT_SELECT_SQL} WHERE id = ?1;"),
            id.to_string(),
        )
    }

    pub fn get_by_etid(&self, etid: &str) -> RepoResult<Option<Artifact>> {
        self.query_one(
            &format!("{ARTIFACT_SELECT_SQL} WHERE etid = ?1;"),
            etid.to_string(),
        )
    }

    /// Resolve either an ETID or an artifact id.
    pub fn resolve(&self, key: &str) -> RepoResult<Option<Artifact>> {
        if let Some(found) = self.get_by_etid(key)? {
            return Ok(Some(found));
        }
        match Uuid::parse_str(key) {
            Ok(id) => self.get(id),
            Err(_) => Ok(None),
        }
    }

    pub fn find_by_hash(&self, sha256: &str) -> RepoResult<Vec<Artifact>> {
        self.query_many(
            &format!("{ARTIFACT_SELECT_SQL} WHERE payload_sha256 = ?1 ORDER BY created_at, id;"),
            vec![SqlValue::Text(sha256.to_string())],
        )
    }

    pub fn find_by_loan_and_hash(&self, loan_id: &str, sha256: &str) -> RepoResult<Option<Artifact>> {
        let mut found = self.query_many(
            &format!(
                "{ARTIFACT_SELECT_SQL} WHERE loan_id = ?1 AND payload_sha256 = ?2
                 ORDER BY created_at, id LIMIT 1;"
            ),
            vec![
                SqlValue::Text(loan_id.to_string()),
                SqlValue::Text(sha256.to_string()),
            ],
        )?;
        Ok(found.pop())
    }

    pub fn list(&self, filter: &ArtifactFilter) -> RepoResult<Vec<Artifact>> {
        let mut sql = format!("{ARTIFACT_SELECT_SQL} WHERE 1 = 1");
        let mut binds: Vec<SqlValue> = Vec::new();

        if let Some(loan_id) = &filter.loan_id {
            binds.push(SqlValue::Text(loan_id.clone()));
            sql.push_str(&format!(" AND loan_id = ?{}", binds.len()));
        }
        if let Some(status) = filter.status {
            binds.push(SqlValue::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", binds.len()));
        }
        if let Some(created_by) = &filter.created_by {
            binds.push(SqlValue::Text(created_by.clone()));
            sql.push_str(&format!(" AND created_by = ?{}", binds.len()));
        }

        let limit = filter.limit.unwrap_or(50).min(500);
        binds.push(SqlValue::Integer(i64::from(limit)));
        sql.push_str(&format!(" ORDER BY created_at DESC, id LIMIT ?{}", binds.len()));
        binds.push(SqlValue::Integer(i64::from(filter.offset)));
        sql.push_str(&format!(" OFFSET ?{};", binds.len()));

        self.query_many(&sql, binds)
    }

    /// Every artifact in insertion order. Used by batch analyses.
    pub fn all(&self) -> RepoResult<Vec<Artifact>> {
        self.query_many(
            &format!("{ARTIFACT_SELECT_SQL} ORDER BY created_at, id;"),
            Vec::new(),
        )
    }

    pub fn count_by_kind(&self) -> RepoResult<Vec<(String, u64)>> {
        self.group_count("SELECT kind, COUNT(*) FROM artifacts GROUP BY kind ORDER BY kind;")
    }

    pub fn count_by_status(&self) -> RepoResult<Vec<(String, u64)>> {
        self.group_count("SELECT status, COUNT(*) FROM artifacts GROUP BY status ORDER BY status;")
    }

    /// Ingest counts per UTC day (`YYYY-MM-DD`) since `since_millis`.
    pub fn daily_counts(&self, since_millis: i64) -> RepoResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT date(created_at / 1000, 'unixepoch') AS day, COUNT(*)
             FROM artifacts
             WHERE created_at >= ?1
             GROUP BY day
             ORDER BY day;",
        )?;
        let rows = stmt.query_map(params![since_millis], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn group_count(&self, sql: &str) -> RepoResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_one(&self, sql: &str, key: String) -> RepoResult<Option<Artifact>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt.query_row(params![key], RawArtifact::from_row).optional()?;
        raw.map(RawArtifact::into_artifact).transpose()
    }

    fn query_many(&self, sql: &str, binds: Vec<SqlValue>) -> RepoResult<Vec<Artifact>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(binds), RawArtifact::from_row)?;
        let mut artifacts = Vec::new();
        for raw in rows {
            artifacts.push(raw?.into_artifact()?);
        }
        Ok(artifacts)
    }
}

/// Column values before domain decoding.
struct RawArtifact {
    id: String,
    loan_id: String,
    kind: String,
    filename: Option<String>,
    payload_sha256: String,
    size_bytes: i64,
    etid: Option<String>,
    walacor_tx_id: Option<String>,
    status: String,
    created_by: String,
    created_at: i64,
    sealed_at: Option<i64>,
    metadata: String,
    payload_json: Option<String>,
}

impl RawArtifact {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            loan_id: row.get(1)?,
            kind: row.get(2)?,
            filename: row.get(3)?,
            payload_sha256: row.get(4)?,
            size_bytes: row.get(5)?,
            etid: row.get(6)?,
            walacor_tx_id: row.get(7)?,
            status: row.get(8)?,
            created_by: row.get(9)?,
            created_at: row.get(10)?,
            sealed_at: row.get(11)?,
            metadata: row.get(12)?,
            payload_json: row.get(13)?,
        })
    }

    fn into_artifact(self) -> RepoResult<Artifact> {
        Ok(Artifact {
            id: parse_uuid_column(&self.id, "artifacts.id")?,
            loan_id: self.loan_id,
            kind: self
                .kind
                .parse::<DocumentKind>()
                .map_err(|e| RepoError::InvalidData(e.to_string()))?,
            filename: self.filename,
            payload_sha256: self.payload_sha256,
            size_bytes: self.size_bytes.max(0) as u64,
            etid: self.etid,
            walacor_tx_id: self.walacor_tx_id,
            status: self
                .status
                .parse::<SealStatus>()
                .map_err(|e| RepoError::InvalidData(e.to_string()))?,
            created_by: self.created_by,
            created_at: self.created_at,
            sealed_at: self.sealed_at,
            metadata: parse_json_column(&self.metadata, "artifacts.metadata")?,
            payload_json: self
                .payload_json
                .as_deref()
                .map(|raw| parse_json_column(raw, "artifacts.payload_json"))
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use serde_json::json;

    fn sample(loan: &str, hash: &str) -> Artifact {
        let mut a = Artifact::new(loan, DocumentKind::Json, hash, 10, "alice");
        a.payload_json = Some(json!({"loan_amount": 1000}));
        a.metadata = json!({"source": "test"});
        a
    }

    #[test]
    fn test_insert_get_and_seal() {
        let db = Database::open_in_memory().unwrap();
        let artifact = sample("LN-1", "aa");

        db.write(|tx| ArtifactRepo::new(tx).insert(&artifact)).unwrap();
        let sealed = db
            .write(|tx| ArtifactRepo::new(tx).mark_sealed(artifact.id, "etid-1", Some("tx-1"), 42))
            .unwrap();
        assert!(sealed);

        let loaded = db.read(|c| ArtifactRepo::new(c).get(artifact.id)).unwrap().unwrap();
        assert_eq!(loaded.status, SealStatus::Sealed);
        assert_eq!(loaded.etid.as_deref(), Some("etid-1"));
        assert_eq!(loaded.payload_json, artifact.payload_json);
        assert_eq!(loaded.metadata, json!({"source": "test"}));

        let by_etid = db.read(|c| ArtifactRepo::new(c).resolve("etid-1")).unwrap();
        assert_eq!(by_etid.unwrap().id, artifact.id);
        let by_id = db.read(|c| ArtifactRepo::new(c).resolve(&artifact.id.to_string())).unwrap();
        assert!(by_id.is_some());
        assert!(db.read(|c| ArtifactRepo::new(c).resolve("nope")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_etid_is_conflict() {
        let db = Database::open_in_memory().unwrap();
        let a = sample("LN-1", "aa");
        let b = sample("LN-2", "bb");
        db.write(|tx| {
            let repo = ArtifactRepo::new(tx);
            repo.insert(&a)?;
            repo.insert(&b)?;
            repo.mark_sealed(a.id, "same", None, 1)
        })
        .unwrap();
        let err = db
            .write(|tx| ArtifactRepo::new(tx).mark_sealed(b.id, "same", None, 1))
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[test]
    fn test_list_filters_and_paging() {
        let db = Database::open_in_memory().unwrap();
        db.write(|tx| {
            let repo = ArtifactRepo::new(tx);
            for i in 0..5 {
                let mut a = sample(if i % 2 == 0 { "LN-A" } else { "LN-B" }, &format!("h{i}"));
                a.created_at = i;
                repo.insert(&a)?;
            }
            Ok::<_, RepoError>(())
        })
        .unwrap();

        let loan_a = db
            .read(|c| {
                ArtifactRepo::new(c).list(&ArtifactFilter {
                    loan_id: Some("LN-A".into()),
                    ..Default::default()
                })
            })
            .unwrap();
        assert_eq!(loan_a.len(), 3);
        assert!(loan_a[0].created_at > loan_a[1].created_at);

        let page = db
            .read(|c| {
                ArtifactRepo::new(c).list(&ArtifactFilter {
                    limit: Some(2),
                    offset: 4,
                    ..Default::default()
                })
            })
            .unwrap();
        assert_eq!(page.len(), 1);

        let kinds = db.read(|c| ArtifactRepo::new(c).count_by_kind()).unwrap();
        assert_eq!(kinds, vec![("json".to_string(), 5)]);
    }
}
