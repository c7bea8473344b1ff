//! Domain records and validation rules.

pub mod models;
pub mod validation;

pub use models::{
    now_millis, Artifact, ArtifactEvent, Attestation, AttestationStatus, DocumentKind, EventType,
    ProvenanceLink, SealStatus, VerificationMethod, VerificationRecord,
};
