//! Aggregate counters over the artifact store.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::auth::{Permission, Principal};
use crate::domain::now_millis;
use crate::sealing::SealMode;
use crate::services::{ServiceContext, ServiceResult};
use crate::storage::{ArtifactRepo, AttestationRepo, VerificationRepo};

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;
pub const DAILY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerificationCounts {
    pub valid: u64,
    pub invalid: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub day: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_artifacts: u64,
    pub by_kind: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
    pub attestations_by_status: BTreeMap<String, u64>,
    pub verifications: VerificationCounts,
    /// Days without ingests are omitted.
    pub daily_ingests: Vec<DailyCount>,
    pub seal_mode: SealMode,
    pub generated_at: i64,
}

#[derive(Clone)]
pub struct AnalyticsService {
    ctx: ServiceContext,
}

impl AnalyticsService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn summary(&self, principal: &Principal) -> ServiceResult<AnalyticsSummary> {
        principal.require(Permission::Read)?;

        let now = now_millis();
        let since = now - DAILY_WINDOW_DAYS * DAY_MILLIS;

        let summary = self.ctx.db.read(|conn| {
            let artifacts = ArtifactRepo::new(conn);
            let by_kind: BTreeMap<_, _> = artifacts.count_by_kind()?.into_iter().collect();
            let by_status: BTreeMap<_, _> = artifacts.count_by_status()?.into_iter().collect();
            let attestations_by_status = AttestationRepo::new(conn)
                .count_by_status()?
                .into_iter()
                .collect();
            let (valid, invalid) = VerificationRepo::new(conn).counts()?;
            let daily_ingests = artifacts
                .daily_counts(since)?
                .into_iter()
                .map(|(day, count)| DailyCount { day, count })
                .collect();

            Ok(AnalyticsSummary {
                total_artifacts: by_kind.values().sum(),
                by_kind,
                by_status,
                attestations_by_status,
                verifications: VerificationCounts { valid, invalid },
                daily_ingests,
                seal_mode: self.ctx.sealer.mode(),
                generated_at: now,
            })
        })?;

        tracing::debug!(total = summary.total_artifacts, "Analytics summary computed");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ingest::{IngestFile, IngestJson, IngestService};
    use crate::services::testing::{context, underwriter};
    use crate::services::VerificationService;
    use serde_json::json;

    #[tokio::test]
    async fn test_summary_counts() {
        let ctx = context();
        let ingest = IngestService::new(ctx.clone());
        let sealed = ingest
            .ingest_json(
                &underwriter(),
                IngestJson {
                    loan_id: "LN-1".into(),
                    document: json!({"loan_amount": 5}),
                    metadata: None,
                    filename: None,
                },
            )
            .await
            .unwrap()
            .artifact;
        ingest
            .ingest_file(
                &underwriter(),
                IngestFile {
                    loan_id: "LN-1".into(),
                    filename: Some("note.pdf".into()),
                    bytes: b"%PDF-1.7 body".to_vec(),
                    metadata: None,
                },
            )
            .await
            .unwrap();

        let verification = VerificationService::new(ctx.clone());
        verification
            .verify_by_etid("public", &sealed.id.to_string(), None)
            .await
            .unwrap();
        verification
            .verify_by_etid("public", &sealed.id.to_string(), Some(&"0".repeat(64)))
            .await
            .unwrap();

        let summary = AnalyticsService::new(ctx).summary(&underwriter()).unwrap();
        assert_eq!(summary.total_artifacts, 2);
        assert_eq!(summary.by_kind.get("json"), Some(&1));
        assert_eq!(summary.by_kind.get("pdf"), Some(&1));
        assert_eq!(summary.by_status.get("sealed"), Some(&2));
        assert!(summary.attestations_by_status.is_empty());
        assert_eq!(summary.verifications, VerificationCounts { valid: 1, invalid: 1 });
        assert_eq!(summary.daily_ingests.len(), 1);
        assert_eq!(summary.daily_ingests[0].count, 2);
        assert_eq!(summary.seal_mode, SealMode::Simulated);
    }

    #[test]
    fn test_empty_store() {
        let summary = AnalyticsService::new(context())
            .summary(&underwriter())
            .unwrap();
        assert_eq!(summary.total_artifacts, 0);
        assert!(summary.daily_ingests.is_empty());
    }
}
