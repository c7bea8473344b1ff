//! Document comparison and cross-artifact pattern detection.
//!
//! # Risk Levels
//! - `high`: financial and identity fields (amount, rate, income, ssn, account, borrower name)
//! - `medium`: dates, addresses and contact details
//! - `low`: everything else
//!
//! # Patterns
//! | Pattern | Severity | Trigger |
//! |---------|----------|---------|
//! | `duplicate_content` | high | same hash under different loan ids |
//! | `identity_reuse` | high | same SSN under different borrower names |
//! | `amount_revision` | medium | loan amount differs between versions of one loan |
//! | `rapid_submission` | low | one subject over the rapid threshold inside the window |

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{Permission, Principal};
use crate::domain::validation::{as_number, loan_field};
use crate::domain::{Artifact, DocumentKind};
use crate::services::{ServiceContext, ServiceResult};
use crate::storage::ArtifactRepo;

const HIGH_RISK_KEYS: &[&str] = &[
    "amount", "rate", "income", "salary", "ssn", "social_security", "account", "routing",
    "balance", "tax_id",
];
const MEDIUM_RISK_KEYS: &[&str] = &[
    "date", "address", "street", "city", "zip", "postal", "phone", "email", "employer",
];
const SSN_KEYS: &[&str] = &["ssn", "social_security_number"];
const NAME_KEYS: &[&str] = &["borrower_name", "full_name"];

/// Score given to non-JSON documents whose hashes differ.
const OPAQUE_CHANGE_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    fn weight(self) -> f64 {
        match self {
            RiskLevel::High => 0.4,
            RiskLevel::Medium => 0.15,
            RiskLevel::Low => 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub path: String,
    pub change_type: ChangeType,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffSide {
    pub artifact_id: Uuid,
    pub etid: Option<String>,
    pub loan_id: String,
    pub kind: DocumentKind,
    pub payload_sha256: String,
}

impl From<&Artifact> for DiffSide {
    fn from(artifact: &Artifact) -> Self {
        Self {
            artifact_id: artifact.id,
            etid: artifact.etid.clone(),
            loan_id: artifact.loan_id.clone(),
            kind: artifact.kind,
            payload_sha256: artifact.payload_sha256.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentDiff {
    pub left: DiffSide,
    pub right: DiffSide,
    pub identical: bool,
    /// False when either side has no stored JSON body.
    pub comparable: bool,
    pub changes: Vec<FieldChange>,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    DuplicateContent,
    IdentityReuse,
    AmountRevision,
    RapidSubmission,
}

impl Pattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::DuplicateContent => "duplicate_content",
            Pattern::IdentityReuse => "identity_reuse",
            Pattern::AmountRevision => "amount_revision",
            Pattern::RapidSubmission => "rapid_submission",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternFinding {
    pub pattern: Pattern,
    pub severity: RiskLevel,
    pub artifact_ids: Vec<Uuid>,
    pub description: String,
}

#[derive(Clone)]
pub struct ForensicsService {
    ctx: ServiceContext,
}

impl ForensicsService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn diff(&self, principal: &Principal, left: &str, right: &str) -> ServiceResult<DocumentDiff> {
        principal.require(Permission::Forensics)?;
        let left = self.ctx.resolve_artifact(left)?;
        let right = self.ctx.resolve_artifact(right)?;
        let identical = left.payload_sha256 == right.payload_sha256;

        let diff = match (&left.payload_json, &right.payload_json) {
            (Some(old), Some(new)) => {
                let changes = diff_values(old, new);
                let risk_score = score(&changes);
                DocumentDiff {
                    left: DiffSide::from(&left),
                    right: DiffSide::from(&right),
                    identical,
                    comparable: true,
                    changes,
                    risk_score,
                }
            }
            _ => DocumentDiff {
                left: DiffSide::from(&left),
                right: DiffSide::from(&right),
                identical,
                comparable: false,
                changes: Vec::new(),
                risk_score: if identical { 0.0 } else { OPAQUE_CHANGE_SCORE },
            },
        };

        tracing::info!(
            left = %left.id,
            right = %right.id,
            changes = diff.changes.len(),
            risk_score = diff.risk_score,
            actor = %principal.subject,
            "Documents compared"
        );
        Ok(diff)
    }

    /// Scan every stored artifact for suspicious patterns.
    pub fn detect_patterns(&self, principal: &Principal) -> ServiceResult<Vec<PatternFinding>> {
        principal.require(Permission::Forensics)?;
        let artifacts = self.ctx.db.read(|conn| ArtifactRepo::new(conn).all())?;

        let settings = &self.ctx.config.forensics;
        let window_millis = i64::try_from(settings.rapid_window_secs.saturating_mul(1000))
            .unwrap_or(i64::MAX);

        let mut findings = Vec::new();
        findings.extend(duplicate_content(&artifacts));
        findings.extend(identity_reuse(&artifacts));
        findings.extend(amount_revision(&artifacts));
        findings.extend(rapid_submission(&artifacts, settings.rapid_threshold, window_millis));

        findings.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| a.pattern.as_str().cmp(b.pattern.as_str()))
                .then_with(|| a.artifact_ids.first().cmp(&b.artifact_ids.first()))
        });

        tracing::info!(
            scanned = artifacts.len(),
            findings = findings.len(),
            actor = %principal.subject,
            "Pattern scan complete"
        );
        Ok(findings)
    }
}

/// Flatten a JSON value into `a.b` / `a[0]` paths. Empty containers are leaves.
fn flatten(value: &Value, path: String, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let next = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                flatten(child, next, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten(child, format!("{path}[{index}]"), out);
            }
        }
        leaf => {
            out.insert(path, leaf.clone());
        }
    }
}

fn flattened(value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten(value, String::new(), &mut out);
    out
}

fn diff_values(old: &Value, new: &Value) -> Vec<FieldChange> {
    let old = flattened(old);
    let new = flattened(new);
    let paths: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

    paths
        .into_iter()
        .filter_map(|path| {
            let change_type = match (old.get(path), new.get(path)) {
                (Some(a), Some(b)) if a == b => return None,
                (Some(_), Some(_)) => ChangeType::Modified,
                (Some(_), None) => ChangeType::Removed,
                (None, Some(_)) => ChangeType::Added,
                (None, None) => return None,
            };
            Some(FieldChange {
                path: path.clone(),
                change_type,
                old: old.get(path).cloned(),
                new: new.get(path).cloned(),
                risk: risk_for(path),
            })
        })
        .collect()
}

pub fn risk_for(path: &str) -> RiskLevel {
    let tokens = key_tokens(path);
    let has = |keyword: &&str| has_keyword(&tokens, keyword);
    let borrower_name = has(&"borrower") && has(&"name");
    if borrower_name || HIGH_RISK_KEYS.iter().any(has) {
        RiskLevel::High
    } else if MEDIUM_RISK_KEYS.iter().any(has) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Lowercase words of a field path, split at separators and camelCase humps.
fn key_tokens(path: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut after_lower = false;
    for c in path.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            after_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && after_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        after_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Multi-word keywords like `tax_id` must appear as consecutive tokens.
fn has_keyword(tokens: &[String], keyword: &str) -> bool {
    let words: Vec<&str> = keyword.split('_').collect();
    tokens
        .windows(words.len())
        .any(|window| window.iter().zip(&words).all(|(token, word)| token == word))
}

fn score(changes: &[FieldChange]) -> f64 {
    changes
        .iter()
        .map(|c| c.risk.weight())
        .sum::<f64>()
        .min(1.0)
}

fn last_segment(path: &str) -> &str {
    let tail = path.rsplit('.').next().unwrap_or(path);
    tail.split('[').next().unwrap_or(tail)
}

/// First value in the document whose key matches one of `keys`.
fn find_field(fields: &BTreeMap<String, Value>, keys: &[&str], nested_name: bool) -> Option<String> {
    fields.iter().find_map(|(path, value)| {
        let lower = path.to_ascii_lowercase();
        let key = last_segment(&lower);
        let matched = keys.contains(&key) || (nested_name && lower.ends_with("borrower.name"));
        match value {
            Value::String(s) if matched && !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) if matched => Some(n.to_string()),
            _ => None,
        }
    })
}

fn normalize_ssn(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn sorted_ids(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let set: BTreeSet<Uuid> = ids.into_iter().collect();
    set.into_iter().collect()
}

fn duplicate_content(artifacts: &[Artifact]) -> Vec<PatternFinding> {
    let mut by_hash: BTreeMap<&str, Vec<&Artifact>> = BTreeMap::new();
    for artifact in artifacts {
        by_hash.entry(&artifact.payload_sha256).or_default().push(artifact);
    }

    by_hash
        .into_iter()
        .filter_map(|(hash, group)| {
            let loans: BTreeSet<&str> = group.iter().map(|a| a.loan_id.as_str()).collect();
            if loans.len() < 2 {
                return None;
            }
            Some(PatternFinding {
                pattern: Pattern::DuplicateContent,
                severity: RiskLevel::High,
                artifact_ids: sorted_ids(group.iter().map(|a| a.id)),
                description: format!(
                    "content {} filed under {} loans: {}",
                    &hash[..hash.len().min(12)],
                    loans.len(),
                    loans.into_iter().collect::<Vec<_>>().join(", ")
                ),
            })
        })
        .collect()
}

fn identity_reuse(artifacts: &[Artifact]) -> Vec<PatternFinding> {
    // ssn -> normalized name -> artifact ids
    let mut by_ssn: BTreeMap<String, BTreeMap<String, Vec<Uuid>>> = BTreeMap::new();
    for artifact in artifacts {
        let Some(document) = &artifact.payload_json else {
            continue;
        };
        let fields = flattened(document);
        let ssn = find_field(&fields, SSN_KEYS, false).and_then(|s| normalize_ssn(&s));
        let name = find_field(&fields, NAME_KEYS, true).map(|n| normalize_name(&n));
        if let (Some(ssn), Some(name)) = (ssn, name) {
            by_ssn
                .entry(ssn)
                .or_default()
                .entry(name)
                .or_default()
                .push(artifact.id);
        }
    }

    by_ssn
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|(ssn, names)| {
            let masked = format!("***{}", &ssn[ssn.len().saturating_sub(4)..]);
            let count = names.len();
            PatternFinding {
                pattern: Pattern::IdentityReuse,
                severity: RiskLevel::High,
                artifact_ids: sorted_ids(names.into_values().flatten()),
                description: format!("SSN {masked} appears under {count} different borrower names"),
            }
        })
        .collect()
}

fn amount_revision(artifacts: &[Artifact]) -> Vec<PatternFinding> {
    let mut by_loan: BTreeMap<&str, Vec<(&Artifact, f64)>> = BTreeMap::new();
    for artifact in artifacts {
        let amount = artifact
            .payload_json
            .as_ref()
            .and_then(|doc| loan_field(doc, "loan_amount"))
            .and_then(as_number);
        if let Some(amount) = amount {
            by_loan.entry(&artifact.loan_id).or_default().push((artifact, amount));
        }
    }

    by_loan
        .into_iter()
        .filter_map(|(loan_id, versions)| {
            let (_, first) = versions.first()?;
            let (_, last) = versions.last()?;
            if versions.iter().all(|(_, amount)| amount == first) {
                return None;
            }
            Some(PatternFinding {
                pattern: Pattern::AmountRevision,
                severity: RiskLevel::Medium,
                artifact_ids: sorted_ids(versions.iter().map(|(a, _)| a.id)),
                description: format!(
                    "loan {loan_id} amount changed from {first} to {last} across {} versions",
                    versions.len()
                ),
            })
        })
        .collect()
}

fn rapid_submission(artifacts: &[Artifact], threshold: usize, window_millis: i64) -> Vec<PatternFinding> {
    let mut by_subject: BTreeMap<&str, Vec<&Artifact>> = BTreeMap::new();
    for artifact in artifacts {
        by_subject.entry(&artifact.created_by).or_default().push(artifact);
    }

    by_subject
        .into_iter()
        .filter_map(|(subject, mut uploads)| {
            uploads.sort_by_key(|a| (a.created_at, a.id));

            // Largest set of uploads whose span fits in the window.
            let mut best = (0, 0);
            let mut start = 0;
            for end in 0..uploads.len() {
                while uploads[end].created_at - uploads[start].created_at > window_millis {
                    start += 1;
                }
                if end + 1 - start > best.1 - best.0 {
                    best = (start, end + 1);
                }
            }

            let burst = &uploads[best.0..best.1];
            if burst.len() <= threshold {
                return None;
            }
            Some(PatternFinding {
                pattern: Pattern::RapidSubmission,
                severity: RiskLevel::Low,
                artifact_ids: sorted_ids(burst.iter().map(|a| a.id)),
                description: format!(
                    "{subject} submitted {} artifacts within {} seconds",
                    burst.len(),
                    window_millis / 1000
                ),
            })
        })
        .collect()
}
