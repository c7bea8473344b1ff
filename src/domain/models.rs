//! Records persisted by the storage layer and returned by the API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Error returned when a stored or supplied enum label is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! string_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $label, value: other.to_string() }),
                }
            }
        }
    };
}

/// Kind of uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Json,
    Pdf,
    Binary,
}

string_enum!(DocumentKind, "document kind", {
    Json => "json",
    Pdf => "pdf",
    Binary => "binary",
});

/// Where an artifact is in the sealing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealStatus {
    PendingSeal,
    Sealed,
    Failed,
}

string_enum!(SealStatus, "seal status", {
    PendingSeal => "pending_seal",
    Sealed => "sealed",
    Failed => "failed",
});

/// An uploaded document and its seal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub loan_id: String,
    pub kind: DocumentKind,
    pub filename: Option<String>,
    pub payload_sha256: String,
    pub size_bytes: u64,
    pub etid: Option<String>,
    pub walacor_tx_id: Option<String>,
    pub status: SealStatus,
    pub created_by: String,
    pub created_at: i64,
    pub sealed_at: Option<i64>,
    pub metadata: Value,
    /// Parsed body of JSON documents; kept for forensic comparison.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_json: Option<Value>,
}

impl Artifact {
    pub fn new(
        loan_id: impl Into<String>,
        kind: DocumentKind,
        payload_sha256: impl Into<String>,
        size_bytes: u64,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id: loan_id.into(),
            kind,
            filename: None,
            payload_sha256: payload_sha256.into(),
            size_bytes,
            etid: None,
            walacor_tx_id: None,
            status: SealStatus::PendingSeal,
            created_by: created_by.into(),
            created_at: now_millis(),
            sealed_at: None,
            metadata: Value::Object(Default::default()),
            payload_json: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.status == SealStatus::Sealed && self.etid.is_some()
    }
}

/// Review state of an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationStatus {
    Pending,
    Approved,
    Rejected,
    Revoked,
}

string_enum!(AttestationStatus, "attestation status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Revoked => "revoked",
});

impl AttestationStatus {
    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: AttestationStatus) -> bool {
        matches!(
            (self, next),
            (AttestationStatus::Pending, AttestationStatus::Approved)
                | (AttestationStatus::Pending, AttestationStatus::Rejected)
                | (AttestationStatus::Approved, AttestationStatus::Revoked)
        )
    }
}

/// A role-based approval or comment on a sealed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub id: Uuid,
    pub artifact_id: Uuid,
    pub etid: String,
    pub kind: String,
    pub issued_by: String,
    pub role: String,
    pub details: Value,
    pub status: AttestationStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Directed derivation edge between two artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceLink {
    pub id: Uuid,
    pub parent_artifact_id: Uuid,
    pub child_artifact_id: Uuid,
    pub relation: String,
    pub created_by: String,
    pub created_at: i64,
}

/// Timeline entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Uploaded,
    Sealed,
    SealFailed,
    Verified,
    Attested,
    Linked,
}

string_enum!(EventType, "event type", {
    Uploaded => "uploaded",
    Sealed => "sealed",
    SealFailed => "seal_failed",
    Verified => "verified",
    Attested => "attested",
    Linked => "linked",
});

/// Something that happened to an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEvent {
    pub id: Uuid,
    pub artifact_id: Uuid,
    pub event_type: EventType,
    pub actor: String,
    pub payload: Value,
    pub created_at: i64,
}

impl ArtifactEvent {
    pub fn new(artifact_id: Uuid, event_type: EventType, actor: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact_id,
            event_type,
            actor: actor.to_string(),
            payload,
            created_at: now_millis(),
        }
    }
}

/// How a verification located its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Etid,
    Content,
}

string_enum!(VerificationMethod, "verification method", {
    Etid => "etid",
    Content => "content",
});

/// One verification request and its outcome.
///
/// Content lookups that match nothing have no `artifact_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub method: VerificationMethod,
    pub artifact_id: Option<Uuid>,
    pub payload_sha256: String,
    pub is_valid: bool,
    pub actor: String,
    pub created_at: i64,
}

impl VerificationRecord {
    pub fn new(
        method: VerificationMethod,
        artifact_id: Option<Uuid>,
        payload_sha256: impl Into<String>,
        is_valid: bool,
        actor: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            artifact_id,
            payload_sha256: payload_sha256.into(),
            is_valid,
            actor: actor.to_string(),
            created_at: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_roundtrip() {
        assert_eq!("pending_seal".parse::<SealStatus>().unwrap(), SealStatus::PendingSeal);
        assert_eq!(SealStatus::PendingSeal.to_string(), "pending_seal");
        assert_eq!(EventType::SealFailed.as_str(), "seal_failed");
        let err = "pdfx".parse::<DocumentKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown document kind 'pdfx'");
    }

    #[test]
    fn test_attestation_transitions() {
        use AttestationStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Revoked));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Revoked.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_new_artifact_is_pending() {
        let a = Artifact::new("LN-1", DocumentKind::Json, "00", 2, "alice");
        assert_eq!(a.status, SealStatus::PendingSeal);
        assert!(!a.is_sealed());
    }
}
