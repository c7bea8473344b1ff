//! Role-based attestations on sealed artifacts.

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{Permission, Principal};
use crate::domain::{now_millis, ArtifactEvent, Attestation, AttestationStatus, EventType};
use crate::services::{ServiceContext, ServiceError, ServiceResult};
use crate::storage::{AttestationFilter, AttestationRepo, EventRepo};

const MAX_KIND_LEN: usize = 64;

/// Body of `POST /attestations`. One of `artifact_id` or `etid` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAttestation {
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub etid: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Clone)]
pub struct AttestationService {
    ctx: ServiceContext,
}

impl AttestationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn create(
        &self,
        principal: &Principal,
        request: CreateAttestation,
    ) -> ServiceResult<Attestation> {
        principal.require(Permission::Attest)?;

        let kind = request.kind.trim();
        if kind.is_empty() || kind.len() > MAX_KIND_LEN {
            return Err(ServiceError::invalid("kind", "must be 1 to 64 characters"));
        }
        let details = match request.details {
            None | Some(Value::Null) => json!({}),
            Some(value @ Value::Object(_)) => value,
            Some(_) => return Err(ServiceError::invalid("details", "must be a JSON object")),
        };

        let key = request
            .artifact_id
            .or(request.etid)
            .ok_or_else(|| ServiceError::invalid("artifact_id", "artifact_id or etid is required"))?;
        let artifact = self.ctx.resolve_artifact(&key)?;
        let etid = match (&artifact.etid, artifact.is_sealed()) {
            (Some(etid), true) => etid.clone(),
            _ => {
                return Err(ServiceError::Conflict(format!(
                    "artifact {} is not sealed",
                    artifact.id
                )))
            }
        };

        let now = now_millis();
        let attestation = Attestation {
            id: Uuid::new_v4(),
            artifact_id: artifact.id,
            etid,
            kind: kind.to_string(),
            issued_by: principal.subject.clone(),
            role: principal.role.as_str().to_string(),
            details,
            status: AttestationStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.ctx.db.write(|tx| {
            AttestationRepo::new(tx).insert(&attestation)?;
            EventRepo::new(tx).append(&ArtifactEvent::new(
                artifact.id,
                EventType::Attested,
                &principal.subject,
                json!({ "attestation_id": attestation.id, "kind": attestation.kind }),
            ))
        })?;

        tracing::info!(
            attestation_id = %attestation.id,
            artifact_id = %artifact.id,
            kind = %attestation.kind,
            issued_by = %attestation.issued_by,
            "Attestation created"
        );
        Ok(attestation)
    }

    pub fn list(
        &self,
        principal: &Principal,
        filter: &AttestationFilter,
    ) -> ServiceResult<Vec<Attestation>> {
        principal.require(Permission::Read)?;
        Ok(self
            .ctx
            .db
            .read(|conn| AttestationRepo::new(conn).list(filter))?)
    }

    /// Move an attestation along pending → approved/rejected, approved → revoked.
    pub fn update_status(
        &self,
        principal: &Principal,
        id: Uuid,
        status: AttestationStatus,
    ) -> ServiceResult<Attestation> {
        principal.require(Permission::ReviewAttestation)?;

        self.ctx.db.write(|tx| {
            let repo = AttestationRepo::new(tx);
            let mut attestation = repo
                .get(id)?
                .ok_or_else(|| ServiceError::NotFound(format!("attestation '{id}'")))?;

            if !attestation.status.can_transition_to(status) {
                return Err(ServiceError::Conflict(format!(
                    "cannot move attestation from {} to {}",
                    attestation.status, status
                )));
            }

            let now = now_millis();
            repo.update_status(id, status, now)?;
            EventRepo::new(tx).append(&ArtifactEvent::new(
                attestation.artifact_id,
                EventType::Attested,
                &principal.subject,
                json!({
                    "attestation_id": id,
                    "from": attestation.status,
                    "to": status,
                }),
            ))?;

            tracing::info!(attestation_id = %id, from = %attestation.status, to = %status, "Attestation status changed");
            attestation.status = status;
            attestation.updated_at = now;
            Ok(attestation)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::services::ingest::{IngestJson, IngestService};
    use crate::services::testing::{context, context_with, underwriter, FlakySealer};
    use std::sync::Arc;

    async fn sealed_artifact(ctx: &ServiceContext) -> crate::domain::Artifact {
        IngestService::new(ctx.clone())
            .ingest_json(
                &underwriter(),
                IngestJson {
                    loan_id: "LN-7".into(),
                    document: json!({"loan_amount": 10}),
                    metadata: None,
                    filename: None,
                },
            )
            .await
            .unwrap()
            .artifact
    }

    fn request(key: String) -> CreateAttestation {
        CreateAttestation {
            artifact_id: None,
            etid: Some(key),
            kind: "underwriting_approval".into(),
            details: Some(json!({"note": "income verified"})),
        }
    }

    #[tokio::test]
    async fn test_create_and_review() {
        let ctx = context();
        let artifact = sealed_artifact(&ctx).await;
        let service = AttestationService::new(ctx);

        let created = service
            .create(&underwriter(), request(artifact.etid.clone().unwrap()))
            .unwrap();
        assert_eq!(created.status, AttestationStatus::Pending);
        assert_eq!(created.issued_by, "uma");
        assert_eq!(created.role, "underwriter");

        let auditor = Principal::new("aud", Role::Auditor);
        let approved = service
            .update_status(&auditor, created.id, AttestationStatus::Approved)
            .unwrap();
        assert_eq!(approved.status, AttestationStatus::Approved);

        let err = service
            .update_status(&auditor, created.id, AttestationStatus::Pending)
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        let err = service
            .update_status(&underwriter(), created.id, AttestationStatus::Revoked)
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let listed = service
            .list(
                &auditor,
                &AttestationFilter {
                    artifact_id: Some(artifact.id),
                    status: Some(AttestationStatus::Approved),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_unsealed_artifact_cannot_be_attested() {
        let ctx = context_with(Arc::new(FlakySealer::default()));
        let artifact = sealed_artifact(&ctx).await;
        let err = AttestationService::new(ctx)
            .create(&underwriter(), request(artifact.id.to_string()))
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn test_validation_and_missing_artifact() {
        let service = AttestationService::new(context());
        let mut bad = request("x".into());
        bad.kind = "  ".into();
        assert_eq!(service.create(&underwriter(), bad).unwrap_err().code(), "validation_error");

        let missing = service.create(&underwriter(), request("local-nope".into())).unwrap_err();
        assert_eq!(missing.code(), "not_found");

        let unknown = service
            .update_status(&Principal::anonymous(), Uuid::new_v4(), AttestationStatus::Approved)
            .unwrap_err();
        assert_eq!(unknown.code(), "not_found");
    }
}
