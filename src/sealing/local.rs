//! In-process sealer for running without a Walacor instance.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::domain::now_millis;
use crate::sealing::types::{SealMode, SealReceipt, SealRequest, SealResult, SealedRecord};
use crate::sealing::Sealer;

/// Issues `local-<uuid>` ETIDs and remembers what it sealed until restart.
#[derive(Default)]
pub struct LocalSealer {
    records: Mutex<HashMap<String, SealedRecord>>,
}

impl LocalSealer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Sealer for LocalSealer {
    async fn seal(&self, request: &SealRequest) -> SealResult<SealReceipt> {
        let etid = format!("local-{}", Uuid::new_v4());
        let sealed_at = now_millis();
        let record = SealedRecord {
            etid: etid.clone(),
            payload_sha256: request.payload_sha256.clone(),
            artifact_id: Some(request.artifact_id.to_string()),
            sealed_at: Some(sealed_at),
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(etid.clone(), record);

        tracing::debug!(etid = %etid, artifact_id = %request.artifact_id, "Sealed locally");
        Ok(SealReceipt {
            etid,
            tx_id: None,
            sealed_at,
        })
    }

    async fn fetch(&self, etid: &str) -> SealResult<Option<SealedRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(etid)
            .cloned())
    }

    async fn health(&self) -> bool {
        true
    }

    fn mode(&self) -> SealMode {
        SealMode::Simulated
    }
}
