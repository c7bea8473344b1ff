//! Verification log: one row per verification request.

use rusqlite::{params, Connection};

use crate::domain::VerificationRecord;
use crate::storage::RepoResult;

pub struct VerificationRepo<'conn> {
    conn: &'conn Connection,
}

impl<'conn> VerificationRepo<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, record: &VerificationRecord) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO verifications (id, method, artifact_id, payload_sha256, is_valid, actor, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                record.id.to_string(),
                record.method.as_str(),
                record.artifact_id.map(|id| id.to_string()),
                record.payload_sha256,
                record.is_valid,
                record.actor,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    /// Verifications split by outcome: `(valid, invalid)`.
    pub fn counts(&self) -> RepoResult<(u64, u64)> {
        let (valid, invalid) = self.conn.query_row(
            "SELECT
                COALESCE(SUM(is_valid), 0),
                COALESCE(SUM(1 - is_valid), 0)
             FROM verifications;",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok((valid as u64, invalid as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Artifact, DocumentKind, VerificationMethod};
    use crate::storage::{ArtifactRepo, Database};

    #[test]
    fn test_counts_include_unmatched_lookups() {
        let db = Database::open_in_memory().unwrap();
        let artifact = Artifact::new("LN-1", DocumentKind::Pdf, "ab", 3, "bob");
        db.write(|tx| {
            ArtifactRepo::new(tx).insert(&artifact)?;
            let log = VerificationRepo::new(tx);
            log.insert(&VerificationRecord::new(
                VerificationMethod::Etid,
                Some(artifact.id),
                "ab",
                true,
                "public",
            ))?;
            log.insert(&VerificationRecord::new(
                VerificationMethod::Content,
                None,
                "cd",
                false,
                "vera",
            ))
        })
        .unwrap();

        let counts = db.read(|c| VerificationRepo::new(c).counts()).unwrap();
        assert_eq!(counts, (1, 1));
    }

    #[test]
    fn test_empty_log_counts_zero() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.read(|c| VerificationRepo::new(c).counts()).unwrap(), (0, 0));
    }
}
