//! Verification of stored and uploaded documents against their seals.
//!
//! A report lists every check that ran. `is_valid` holds only when the
//! artifact is sealed and no check failed; checks that could not run are
//! reported as skipped and do not fail the report.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{
    now_millis, Artifact, ArtifactEvent, EventType, SealStatus, VerificationMethod,
    VerificationRecord,
};
use crate::integrity::{hash_json, is_sha256_hex, normalize_hash, sha256_hex};
use crate::observability::metrics;
use crate::sealing::SealMode;
use crate::services::{ServiceContext, ServiceError, ServiceResult};
use crate::storage::{ArtifactRepo, EventRepo, VerificationRepo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub outcome: CheckOutcome,
    pub detail: String,
}

impl Check {
    fn new(name: &'static str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name,
            outcome: if passed {
                CheckOutcome::Passed
            } else {
                CheckOutcome::Failed
            },
            detail: detail.into(),
        }
    }

    fn skipped(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            outcome: CheckOutcome::Skipped,
            detail: detail.into(),
        }
    }
}

/// Overall verdict for a single artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Verified,
    Tampered,
    Unsealed,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub artifact_id: Uuid,
    pub etid: Option<String>,
    pub loan_id: String,
    pub payload_sha256: String,
    pub sealed_at: Option<i64>,
    pub seal_mode: SealMode,
    pub is_valid: bool,
    pub verdict: Verdict,
    pub checks: Vec<Check>,
    pub verified_at: i64,
}

/// Content submitted for lookup by hash.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    Json(Value),
    Bytes(Vec<u8>),
    Hash(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentMatch {
    pub artifact_id: Uuid,
    pub etid: Option<String>,
    pub loan_id: String,
    pub status: SealStatus,
    pub sealed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentVerification {
    pub payload_sha256: String,
    pub is_valid: bool,
    pub matches: Vec<DocumentMatch>,
    pub verified_at: i64,
}

#[derive(Clone)]
pub struct VerificationService {
    ctx: ServiceContext,
}

impl VerificationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Verify the artifact behind an ETID (or artifact id), optionally
    /// against a hash the caller computed.
    pub async fn verify_by_etid(
        &self,
        actor: &str,
        key: &str,
        candidate_hash: Option<&str>,
    ) -> ServiceResult<VerificationReport> {
        let candidate = match candidate_hash {
            Some(raw) => Some(normalize_hash(raw).ok_or_else(|| {
                ServiceError::invalid("hash", "must be a 64 character hex SHA-256")
            })?),
            None => None,
        };

        let artifact = self.ctx.resolve_artifact(key)?;
        let checks = self.run_checks(&artifact, candidate.as_deref()).await;

        let sealed = artifact.is_sealed();
        let any_failed = checks.iter().any(|c| c.outcome == CheckOutcome::Failed);
        let is_valid = sealed && !any_failed;
        let verdict = if !sealed {
            Verdict::Unsealed
        } else if any_failed {
            Verdict::Tampered
        } else {
            Verdict::Verified
        };

        let report = VerificationReport {
            artifact_id: artifact.id,
            etid: artifact.etid.clone(),
            loan_id: artifact.loan_id.clone(),
            payload_sha256: artifact.payload_sha256.clone(),
            sealed_at: artifact.sealed_at,
            seal_mode: self.ctx.sealer.mode(),
            is_valid,
            verdict,
            checks,
            verified_at: now_millis(),
        };

        let event = ArtifactEvent::new(
            artifact.id,
            EventType::Verified,
            actor,
            json!({
                "is_valid": is_valid,
                "verdict": verdict,
                "candidate_hash": candidate,
            }),
        );
        let record = VerificationRecord::new(
            VerificationMethod::Etid,
            Some(artifact.id),
            artifact.payload_sha256.as_str(),
            is_valid,
            actor,
        );
        self.record(&record, &[event])?;
        metrics::record_verification(is_valid);
        tracing::info!(
            artifact_id = %artifact.id,
            is_valid,
            verdict = ?verdict,
            actor,
            "Artifact verified"
        );

        Ok(report)
    }

    /// Hash submitted content and look up sealed artifacts carrying that hash.
    pub fn verify_document(
        &self,
        actor: &str,
        input: DocumentInput,
    ) -> ServiceResult<DocumentVerification> {
        let hash = match input {
            DocumentInput::Json(value) => hash_json(&value),
            DocumentInput::Bytes(bytes) if bytes.is_empty() => {
                return Err(ServiceError::invalid("file", "must not be empty"));
            }
            DocumentInput::Bytes(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => hash_json(&value),
                Err(_) => sha256_hex(&bytes),
            },
            DocumentInput::Hash(raw) => normalize_hash(&raw).ok_or_else(|| {
                ServiceError::invalid("hash", "must be a 64 character hex SHA-256")
            })?,
        };

        let artifacts = self
            .ctx
            .db
            .read(|conn| ArtifactRepo::new(conn).find_by_hash(&hash))?;
        let is_valid = artifacts.iter().any(Artifact::is_sealed);

        // Each matching artifact gets a timeline entry; the log gets one row.
        let events: Vec<_> = artifacts
            .iter()
            .map(|artifact| {
                ArtifactEvent::new(
                    artifact.id,
                    EventType::Verified,
                    actor,
                    json!({ "is_valid": artifact.is_sealed(), "by_content": true }),
                )
            })
            .collect();
        let matched = artifacts
            .iter()
            .find(|a| a.is_sealed())
            .or_else(|| artifacts.first())
            .map(|a| a.id);
        let record = VerificationRecord::new(
            VerificationMethod::Content,
            matched,
            hash.as_str(),
            is_valid,
            actor,
        );
        self.record(&record, &events)?;
        metrics::record_verification(is_valid);
        tracing::info!(
            payload_sha256 = %hash,
            matches = artifacts.len(),
            is_valid,
            actor,
            "Document verified by content"
        );

        Ok(DocumentVerification {
            payload_sha256: hash,
            is_valid,
            matches: artifacts
                .into_iter()
                .map(|a| DocumentMatch {
                    artifact_id: a.id,
                    etid: a.etid,
                    loan_id: a.loan_id,
                    status: a.status,
                    sealed_at: a.sealed_at,
                })
                .collect(),
            verified_at: now_millis(),
        })
    }

    async fn run_checks(&self, artifact: &Artifact, candidate: Option<&str>) -> Vec<Check> {
        let mut checks = Vec::new();

        checks.push(Check::new(
            "hash_format",
            is_sha256_hex(&artifact.payload_sha256),
            "stored hash is a SHA-256 hex digest",
        ));

        let etid = match (&artifact.etid, artifact.status) {
            (Some(etid), SealStatus::Sealed) => {
                checks.push(Check::new("sealed", true, format!("sealed as {etid}")));
                Some(etid.clone())
            }
            _ => {
                checks.push(Check::new(
                    "sealed",
                    false,
                    format!("artifact status is {}", artifact.status),
                ));
                None
            }
        };

        if let Some(candidate) = candidate {
            let matches = candidate == artifact.payload_sha256;
            checks.push(Check::new(
                "candidate_hash",
                matches,
                if matches {
                    "submitted hash matches stored hash"
                } else {
                    "submitted hash differs from stored hash"
                },
            ));
        }

        if let Some(etid) = etid {
            let check = match self.ctx.sealer.fetch(&etid).await {
                Ok(Some(record)) => {
                    let matches = record.payload_sha256 == artifact.payload_sha256;
                    Check::new(
                        "sealed_record",
                        matches,
                        if matches {
                            "sealed record carries the stored hash"
                        } else {
                            "sealed record carries a different hash"
                        },
                    )
                }
                Ok(None) => match self.ctx.sealer.mode() {
                    SealMode::Walacor => {
                        Check::new("sealed_record", false, "sealing service has no such record")
                    }
                    SealMode::Simulated => {
                        Check::skipped("sealed_record", "simulated seal no longer held in memory")
                    }
                },
                Err(e) => {
                    tracing::warn!(etid = %etid, error = %e, "Sealed record lookup failed");
                    Check::skipped("sealed_record", format!("sealing service unavailable: {e}"))
                }
            };
            checks.push(check);
        }

        checks
    }

    fn record(&self, record: &VerificationRecord, events: &[ArtifactEvent]) -> ServiceResult<()> {
        self.ctx.db.write(|tx| {
            VerificationRepo::new(tx).insert(record)?;
            let timeline = EventRepo::new(tx);
            events.iter().try_for_each(|event| timeline.append(event))
        })?;
        Ok(())
    }
}
