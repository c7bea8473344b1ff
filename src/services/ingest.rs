//! Document ingest: validate, hash, store, seal.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{Permission, Principal};
use crate::domain::validation::{validate_loan_document, validate_loan_id};
use crate::domain::{now_millis, Artifact, ArtifactEvent, DocumentKind, EventType, SealStatus};
use crate::integrity::{canonical_json, detect_kind, sha256_hex};
use crate::observability::metrics;
use crate::resilience::Retryable;
use crate::sealing::SealRequest;
use crate::services::{ServiceContext, ServiceError, ServiceResult};
use crate::storage::{ArtifactFilter, ArtifactRepo, EventRepo, RepoResult};

/// Body of `POST /ingest-json`.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestJson {
    pub loan_id: String,
    pub document: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// A raw upload.
#[derive(Debug, Clone)]
pub struct IngestFile {
    pub loan_id: String,
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub artifact: Artifact,
    /// True when the same content already existed under the same loan.
    pub duplicate: bool,
    /// Why sealing did not complete, when it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seal_error: Option<String>,
}

#[derive(Clone)]
pub struct IngestService {
    ctx: ServiceContext,
}

impl IngestService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn ingest_json(
        &self,
        principal: &Principal,
        request: IngestJson,
    ) -> ServiceResult<IngestOutcome> {
        principal.require(Permission::Ingest)?;
        validate_loan_id(&request.loan_id)?;
        self.check_document(&request.document)?;
        let metadata = normalize_metadata(request.metadata)?;

        let canonical = canonical_json(&request.document);
        self.check_size(canonical.len())?;

        let mut artifact = Artifact::new(
            request.loan_id,
            DocumentKind::Json,
            sha256_hex(canonical.as_bytes()),
            canonical.len() as u64,
            principal.subject.clone(),
        );
        artifact.filename = request.filename;
        artifact.metadata = metadata;
        artifact.payload_json = Some(request.document);

        self.store_and_seal(principal, artifact).await
    }

    pub async fn ingest_file(
        &self,
        principal: &Principal,
        upload: IngestFile,
    ) -> ServiceResult<IngestOutcome> {
        principal.require(Permission::Ingest)?;
        if upload.bytes.is_empty() {
            return Err(ServiceError::invalid("file", "must not be empty"));
        }
        self.check_size(upload.bytes.len())?;

        match detect_kind(&upload.bytes, upload.filename.as_deref()) {
            DocumentKind::Json => {
                let document: Value = serde_json::from_slice(&upload.bytes)
                    .map_err(|e| ServiceError::invalid("file", e.to_string()))?;
                self.ingest_json(
                    principal,
                    IngestJson {
                        loan_id: upload.loan_id,
                        document,
                        metadata: upload.metadata,
                        filename: upload.filename,
                    },
                )
                .await
            }
            kind => {
                validate_loan_id(&upload.loan_id)?;
                let metadata = normalize_metadata(upload.metadata)?;
                let mut artifact = Artifact::new(
                    upload.loan_id,
                    kind,
                    sha256_hex(&upload.bytes),
                    upload.bytes.len() as u64,
                    principal.subject.clone(),
                );
                artifact.filename = upload.filename;
                artifact.metadata = metadata;
                self.store_and_seal(principal, artifact).await
            }
        }
    }

    /// Retry sealing for an artifact that is not sealed yet.
    pub async fn reseal(&self, principal: &Principal, key: &str) -> ServiceResult<Artifact> {
        principal.require(Permission::Ingest)?;
        let artifact = self.ctx.resolve_artifact(key)?;
        if artifact.is_sealed() {
            return Err(ServiceError::Conflict(format!(
                "artifact {} is already sealed",
                artifact.id
            )));
        }

        match self.seal(principal, artifact).await {
            (artifact, None) => Ok(artifact),
            (_, Some(err)) => Err(err),
        }
    }

    pub fn get(&self, key: &str) -> ServiceResult<Artifact> {
        self.ctx.resolve_artifact(key)
    }

    pub fn list(&self, filter: &ArtifactFilter) -> ServiceResult<Vec<Artifact>> {
        Ok(self.ctx.db.read(|conn| ArtifactRepo::new(conn).list(filter))?)
    }

    fn check_document(&self, document: &Value) -> ServiceResult<()> {
        if self.ctx.config.security.strict_validation {
            validate_loan_document(document).map_err(ServiceError::Validation)
        } else if document.is_object() {
            Ok(())
        } else {
            Err(ServiceError::invalid("document", "must be a JSON object"))
        }
    }

    fn check_size(&self, size: usize) -> ServiceResult<()> {
        let limit = self.ctx.config.security.max_body_size;
        if size > limit {
            return Err(ServiceError::PayloadTooLarge { size, limit });
        }
        Ok(())
    }

    async fn store_and_seal(
        &self,
        principal: &Principal,
        artifact: Artifact,
    ) -> ServiceResult<IngestOutcome> {
        // Lookup and insert share one transaction so identical uploads
        // cannot both pass the duplicate check.
        let existing = self.ctx.db.write(|tx| -> RepoResult<Option<Artifact>> {
            let artifacts = ArtifactRepo::new(tx);
            if let Some(existing) =
                artifacts.find_by_loan_and_hash(&artifact.loan_id, &artifact.payload_sha256)?
            {
                return Ok(Some(existing));
            }
            artifacts.insert(&artifact)?;
            EventRepo::new(tx).append(&ArtifactEvent::new(
                artifact.id,
                EventType::Uploaded,
                &principal.subject,
                json!({
                    "kind": artifact.kind,
                    "payload_sha256": artifact.payload_sha256,
                    "size_bytes": artifact.size_bytes,
                }),
            ))?;
            Ok(None)
        })?;
        if let Some(existing) = existing {
            tracing::info!(
                artifact_id = %existing.id,
                loan_id = %existing.loan_id,
                "Duplicate upload, returning existing artifact"
            );
            return Ok(IngestOutcome {
                artifact: existing,
                duplicate: true,
                seal_error: None,
            });
        }
        metrics::record_ingest(artifact.kind.as_str());
        tracing::info!(
            artifact_id = %artifact.id,
            loan_id = %artifact.loan_id,
            kind = %artifact.kind,
            actor = %principal.subject,
            "Artifact stored"
        );

        let (artifact, seal_error) = self.seal(principal, artifact).await;
        Ok(IngestOutcome {
            artifact,
            duplicate: false,
            seal_error: seal_error.map(|e| e.to_string()),
        })
    }

    /// Submit to the sealer and persist the outcome.
    ///
    /// Returns the updated artifact plus the sealing error, if any. Storage
    /// failures while recording the outcome are reported the same way.
    async fn seal(
        &self,
        principal: &Principal,
        mut artifact: Artifact,
    ) -> (Artifact, Option<ServiceError>) {
        let request = SealRequest {
            artifact_id: artifact.id,
            loan_id: artifact.loan_id.clone(),
            payload_sha256: artifact.payload_sha256.clone(),
            kind: artifact.kind.as_str().to_string(),
            submitted_at: now_millis(),
        };

        match self.ctx.sealer.seal(&request).await {
            Ok(receipt) => {
                metrics::record_seal("sealed");
                let recorded = self.ctx.db.write(|tx| {
                    ArtifactRepo::new(tx).mark_sealed(
                        artifact.id,
                        &receipt.etid,
                        receipt.tx_id.as_deref(),
                        receipt.sealed_at,
                    )?;
                    EventRepo::new(tx).append(&ArtifactEvent::new(
                        artifact.id,
                        EventType::Sealed,
                        &principal.subject,
                        json!({
                            "etid": receipt.etid,
                            "tx_id": receipt.tx_id,
                            "mode": self.ctx.sealer.mode(),
                        }),
                    ))
                });
                if let Err(e) = recorded {
                    tracing::error!(artifact_id = %artifact.id, error = %e, "Failed to record seal");
                    return (artifact, Some(e.into()));
                }

                tracing::info!(artifact_id = %artifact.id, etid = %receipt.etid, "Artifact sealed");
                artifact.etid = Some(receipt.etid);
                artifact.walacor_tx_id = receipt.tx_id;
                artifact.sealed_at = Some(receipt.sealed_at);
                artifact.status = SealStatus::Sealed;
                (artifact, None)
            }
            Err(e) => {
                metrics::record_seal("failed");
                let status = if e.is_retryable() {
                    SealStatus::PendingSeal
                } else {
                    SealStatus::Failed
                };
                tracing::warn!(
                    artifact_id = %artifact.id,
                    status = %status,
                    error = %e,
                    "Sealing failed"
                );

                let recorded = self.ctx.db.write(|tx| {
                    ArtifactRepo::new(tx).set_status(artifact.id, status)?;
                    EventRepo::new(tx).append(&ArtifactEvent::new(
                        artifact.id,
                        EventType::SealFailed,
                        &principal.subject,
                        json!({ "error": e.to_string() }),
                    ))
                });
                if let Err(db_err) = recorded {
                    tracing::error!(artifact_id = %artifact.id, error = %db_err, "Failed to record seal failure");
                }
                artifact.status = status;
                (artifact, Some(e.into()))
            }
        }
    }
}

fn normalize_metadata(metadata: Option<Value>) -> ServiceResult<Value> {
    match metadata {
        None | Some(Value::Null) => Ok(Value::Object(Default::default())),
        Some(value @ Value::Object(_)) => Ok(value),
        Some(_) => Err(ServiceError::invalid("metadata", "must be a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::integrity::hash_json;
    use crate::services::testing::{context, context_with, underwriter, FlakySealer};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn loan_doc(amount: f64) -> Value {
        json!({"borrower": {"name": "Ada Lovelace"}, "loan_amount": amount, "interest_rate": 6.25})
    }

    #[tokio::test]
    async fn test_ingest_json_seals_and_records_events() {
        let ctx = context();
        let service = IngestService::new(ctx.clone());

        let outcome = service
            .ingest_json(
                &underwriter(),
                IngestJson {
                    loan_id: "LN-100".into(),
                    document: loan_doc(250_000.0),
                    metadata: Some(json!({"source": "portal"})),
                    filename: None,
                },
            )
            .await
            .unwrap();

        let artifact = outcome.artifact;
        assert!(!outcome.duplicate);
        assert_eq!(artifact.status, SealStatus::Sealed);
        assert!(artifact.etid.as_deref().unwrap().starts_with("local-"));
        assert_eq!(artifact.payload_sha256, hash_json(&loan_doc(250_000.0)));

        let events = ctx
            .db
            .read(|c| EventRepo::new(c).for_artifact(artifact.id))
            .unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Uploaded, EventType::Sealed]);
    }

    #[tokio::test]
    async fn test_negative_amount_rejected() {
        let service = IngestService::new(context());
        let err = service
            .ingest_json(
                &underwriter(),
                IngestJson {
                    loan_id: "LN-1".into(),
                    document: loan_doc(-10.0),
                    metadata: None,
                    filename: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[tokio::test]
    async fn test_duplicate_upload_returns_existing() {
        let service = IngestService::new(context());
        let request = IngestJson {
            loan_id: "LN-1".into(),
            document: loan_doc(1000.0),
            metadata: None,
            filename: None,
        };
        let first = service.ingest_json(&underwriter(), request.clone()).await.unwrap();
        let second = service.ingest_json(&underwriter(), request).await.unwrap();
        assert!(second.duplicate);
        assert_eq!(first.artifact.id, second.artifact.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_uploads_store_one_row() {
        let service = IngestService::new(context());
        let mut uploads = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let service = service.clone();
            uploads.spawn(async move {
                service
                    .ingest_json(
                        &underwriter(),
                        IngestJson {
                            loan_id: "LN-9".into(),
                            document: loan_doc(42.0),
                            metadata: None,
                            filename: None,
                        },
                    )
                    .await
                    .unwrap()
            });
        }

        let mut created = 0;
        let mut ids = std::collections::HashSet::new();
        while let Some(outcome) = uploads.join_next().await {
            let outcome = outcome.unwrap();
            if !outcome.duplicate {
                created += 1;
            }
            ids.insert(outcome.artifact.id);
        }
        assert_eq!(created, 1);
        assert_eq!(ids.len(), 1);

        let filter = ArtifactFilter {
            loan_id: Some("LN-9".into()),
            ..Default::default()
        };
        assert_eq!(service.list(&filter).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_viewer_cannot_ingest() {
        let service = IngestService::new(context());
        let viewer = Principal::new("vic", Role::Viewer);
        let err = service
            .ingest_file(
                &viewer,
                IngestFile {
                    loan_id: "LN-1".into(),
                    filename: Some("a.pdf".into()),
                    bytes: b"%PDF-1.4".to_vec(),
                    metadata: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[tokio::test]
    async fn test_pdf_hashed_over_raw_bytes() {
        let service = IngestService::new(context());
        let bytes = b"%PDF-1.4 fake body".to_vec();
        let outcome = service
            .ingest_file(
                &underwriter(),
                IngestFile {
                    loan_id: "LN-2".into(),
                    filename: Some("closing.pdf".into()),
                    bytes: bytes.clone(),
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.artifact.kind, DocumentKind::Pdf);
        assert_eq!(outcome.artifact.payload_sha256, sha256_hex(&bytes));
        assert!(outcome.artifact.payload_json.is_none());
    }

    #[tokio::test]
    async fn test_json_file_matches_json_ingest_hash() {
        let service = IngestService::new(context());
        let outcome = service
            .ingest_file(
                &underwriter(),
                IngestFile {
                    loan_id: "LN-3".into(),
                    filename: Some("loan.json".into()),
                    bytes: br#"{ "loan_amount": 5,  "a": 1 }"#.to_vec(),
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.artifact.kind, DocumentKind::Json);
        assert_eq!(
            outcome.artifact.payload_sha256,
            hash_json(&json!({"a": 1, "loan_amount": 5}))
        );
    }

    #[tokio::test]
    async fn test_seal_failure_keeps_upload_and_reseal_recovers() {
        let sealer = Arc::new(FlakySealer::default());
        let ctx = context_with(sealer.clone());
        let service = IngestService::new(ctx);

        let outcome = service
            .ingest_json(
                &underwriter(),
                IngestJson {
                    loan_id: "LN-9".into(),
                    document: loan_doc(10.0),
                    metadata: None,
                    filename: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.artifact.status, SealStatus::PendingSeal);
        assert!(outcome.seal_error.is_some());

        let id = outcome.artifact.id.to_string();
        assert_eq!(
            service.reseal(&underwriter(), &id).await.unwrap_err().code(),
            "sealing_unavailable"
        );

        sealer.available.store(true, Ordering::SeqCst);
        let sealed = service.reseal(&underwriter(), &id).await.unwrap();
        assert_eq!(sealed.status, SealStatus::Sealed);

        let stored = service.get(&id).unwrap();
        assert_eq!(stored.etid, sealed.etid);
        assert_eq!(
            service.reseal(&underwriter(), &id).await.unwrap_err().code(),
            "conflict"
        );
    }

    #[tokio::test]
    async fn test_empty_and_oversized_files_rejected() {
        let mut config = crate::config::IntegrityConfig::default();
        config.security.max_body_size = 8;
        let mut ctx = context();
        ctx.config = Arc::new(config);
        let service = IngestService::new(ctx);

        let empty = service
            .ingest_file(
                &underwriter(),
                IngestFile {
                    loan_id: "LN-1".into(),
                    filename: None,
                    bytes: Vec::new(),
                    metadata: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(empty.code(), "validation_error");

        let big = service
            .ingest_file(
                &underwriter(),
                IngestFile {
                    loan_id: "LN-1".into(),
                    filename: None,
                    bytes: vec![1u8; 9],
                    metadata: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(big.code(), "payload_too_large");
    }
}
