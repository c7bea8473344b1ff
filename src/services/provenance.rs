//! Provenance links between artifacts and chain traversal.
//!
//! Links form a directed acyclic graph (parent → child). Traversal walks
//! breadth-first in both directions with a visited set and a depth cap, so
//! a corrupted graph cannot loop.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Permission, Principal};
use crate::domain::{now_millis, Artifact, ArtifactEvent, Attestation, EventType, ProvenanceLink};
use crate::services::{ServiceContext, ServiceError, ServiceResult};
use crate::storage::{
    ArtifactRepo, AttestationFilter, AttestationRepo, EventRepo, ProvenanceRepo, RepoResult,
};

pub const DEFAULT_RELATION: &str = "derived_from";
pub const MAX_CHAIN_DEPTH: u32 = 32;
const MAX_RELATION_LEN: usize = 64;

/// Body of `POST /provenance/link`. Parent and child accept an ETID or id.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkRequest {
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub relation: Option<String>,
}

/// An artifact reached while walking the graph.
#[derive(Debug, Clone, Serialize)]
pub struct ChainNode {
    pub artifact: Artifact,
    pub depth: u32,
    pub relation: String,
    /// The already-visited artifact this node was reached from.
    pub via: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvenanceChain {
    pub artifact: Artifact,
    pub ancestors: Vec<ChainNode>,
    pub descendants: Vec<ChainNode>,
    pub links: Vec<ProvenanceLink>,
    pub events: Vec<ArtifactEvent>,
    pub attestations: Vec<Attestation>,
    /// Set when traversal stopped at the depth cap.
    pub truncated: bool,
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

#[derive(Clone)]
pub struct ProvenanceService {
    ctx: ServiceContext,
}

impl ProvenanceService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn link(&self, principal: &Principal, request: LinkRequest) -> ServiceResult<ProvenanceLink> {
        principal.require(Permission::Ingest)?;

        let relation = request
            .relation
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_RELATION)
            .to_string();
        if relation.len() > MAX_RELATION_LEN {
            return Err(ServiceError::invalid("relation", "must be at most 64 characters"));
        }

        let parent = self.ctx.resolve_artifact(&request.parent)?;
        let child = self.ctx.resolve_artifact(&request.child)?;
        if parent.id == child.id {
            return Err(ServiceError::invalid("child", "an artifact cannot derive from itself"));
        }

        let link = ProvenanceLink {
            id: Uuid::new_v4(),
            parent_artifact_id: parent.id,
            child_artifact_id: child.id,
            relation,
            created_by: principal.subject.clone(),
            created_at: now_millis(),
        };

        self.ctx.db.write(|tx| {
            let repo = ProvenanceRepo::new(tx);
            // The new edge closes a cycle if the child is already upstream of the parent.
            if is_reachable(&repo, parent.id, child.id, Direction::Up)? {
                return Err(ServiceError::Conflict(format!(
                    "linking {} to {} would create a cycle",
                    parent.id, child.id
                )));
            }
            repo.insert(&link)?;

            let events = EventRepo::new(tx);
            for (artifact_id, role, other) in [
                (parent.id, "parent", child.id),
                (child.id, "child", parent.id),
            ] {
                events.append(&ArtifactEvent::new(
                    artifact_id,
                    EventType::Linked,
                    &principal.subject,
                    json!({
                        "link_id": link.id,
                        "role": role,
                        "other_artifact_id": other,
                        "relation": link.relation,
                    }),
                ))?;
            }
            Ok::<_, ServiceError>(())
        })?;

        tracing::info!(
            link_id = %link.id,
            parent = %parent.id,
            child = %child.id,
            relation = %link.relation,
            "Provenance link created"
        );
        Ok(link)
    }

    /// Full lineage of one artifact, with its timeline and attestations.
    pub fn chain(&self, principal: &Principal, key: &str) -> ServiceResult<ProvenanceChain> {
        principal.require(Permission::Read)?;
        let artifact = self.ctx.resolve_artifact(key)?;

        let chain = self.ctx.db.read(|conn| {
            let mut links = Vec::new();
            let mut seen_links = HashSet::new();
            let (ancestors, up_truncated) =
                walk(conn, artifact.id, Direction::Up, &mut links, &mut seen_links)?;
            let (descendants, down_truncated) =
                walk(conn, artifact.id, Direction::Down, &mut links, &mut seen_links)?;

            let events = EventRepo::new(conn).for_artifact(artifact.id)?;
            let attestations = AttestationRepo::new(conn).list(&AttestationFilter {
                artifact_id: Some(artifact.id),
                ..Default::default()
            })?;

            Ok(ProvenanceChain {
                artifact: artifact.clone(),
                ancestors,
                descendants,
                links,
                events,
                attestations,
                truncated: up_truncated || down_truncated,
            })
        })?;
        Ok(chain)
    }
}

fn neighbours(
    repo: &ProvenanceRepo<'_>,
    id: Uuid,
    direction: Direction,
) -> RepoResult<Vec<(Uuid, ProvenanceLink)>> {
    Ok(match direction {
        Direction::Up => repo
            .parents_of(id)?
            .into_iter()
            .map(|l| (l.parent_artifact_id, l))
            .collect(),
        Direction::Down => repo
            .children_of(id)?
            .into_iter()
            .map(|l| (l.child_artifact_id, l))
            .collect(),
    })
}

fn is_reachable(
    repo: &ProvenanceRepo<'_>,
    from: Uuid,
    target: Uuid,
    direction: Direction,
) -> RepoResult<bool> {
    let mut visited = HashSet::from([from]);
    let mut queue = VecDeque::from([from]);
    while let Some(current) = queue.pop_front() {
        for (next, _) in neighbours(repo, current, direction)? {
            if next == target {
                return Ok(true);
            }
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }
    Ok(false)
}

fn walk(
    conn: &rusqlite::Connection,
    root: Uuid,
    direction: Direction,
    links: &mut Vec<ProvenanceLink>,
    seen_links: &mut HashSet<Uuid>,
) -> RepoResult<(Vec<ChainNode>, bool)> {
    let repo = ProvenanceRepo::new(conn);
    let artifacts = ArtifactRepo::new(conn);

    let mut nodes = Vec::new();
    let mut truncated = false;
    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([(root, 0u32)]);

    while let Some((current, depth)) = queue.pop_front() {
        let next_links = neighbours(&repo, current, direction)?;
        if depth >= MAX_CHAIN_DEPTH {
            truncated |= !next_links.is_empty();
            continue;
        }
        for (next, link) in next_links {
            if seen_links.insert(link.id) {
                links.push(link.clone());
            }
            if !visited.insert(next) {
                continue;
            }
            if let Some(artifact) = artifacts.get(next)? {
                nodes.push(ChainNode {
                    artifact,
                    depth: depth + 1,
                    relation: link.relation,
                    via: current,
                });
                queue.push_back((next, depth + 1));
            }
        }
    }

    Ok((nodes, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::services::ingest::{IngestJson, IngestService};
    use crate::services::testing::{context, underwriter};

    async fn ingest(ctx: &ServiceContext, amount: u64) -> Artifact {
        IngestService::new(ctx.clone())
            .ingest_json(
                &underwriter(),
                IngestJson {
                    loan_id: "LN-9".into(),
                    document: json!({"loan_amount": amount}),
                    metadata: None,
                    filename: None,
                },
            )
            .await
            .unwrap()
            .artifact
    }

    fn link(parent: &Artifact, child: &Artifact) -> LinkRequest {
        LinkRequest {
            parent: parent.id.to_string(),
            child: child.etid.clone().unwrap(),
            relation: None,
        }
    }

    #[tokio::test]
    async fn test_chain_walks_both_directions() {
        let ctx = context();
        let a = ingest(&ctx, 1).await;
        let b = ingest(&ctx, 2).await;
        let c = ingest(&ctx, 3).await;
        let service = ProvenanceService::new(ctx);

        let first = service.link(&underwriter(), link(&a, &b)).unwrap();
        assert_eq!(first.relation, DEFAULT_RELATION);
        service.link(&underwriter(), link(&b, &c)).unwrap();

        let chain = service.chain(&underwriter(), &b.id.to_string()).unwrap();
        assert_eq!(chain.ancestors.len(), 1);
        assert_eq!(chain.ancestors[0].artifact.id, a.id);
        assert_eq!(chain.descendants.len(), 1);
        assert_eq!(chain.descendants[0].artifact.id, c.id);
        assert_eq!(chain.links.len(), 2);
        assert!(!chain.truncated);
        assert!(chain
            .events
            .iter()
            .any(|e| e.event_type == EventType::Linked));

        let from_leaf = service.chain(&underwriter(), c.etid.as_deref().unwrap()).unwrap();
        let depths: Vec<_> = from_leaf.ancestors.iter().map(|n| n.depth).collect();
        assert_eq!(depths, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_rejects_cycles_self_links_and_duplicates() {
        let ctx = context();
        let a = ingest(&ctx, 1).await;
        let b = ingest(&ctx, 2).await;
        let c = ingest(&ctx, 3).await;
        let service = ProvenanceService::new(ctx);

        service.link(&underwriter(), link(&a, &b)).unwrap();
        service.link(&underwriter(), link(&b, &c)).unwrap();

        let cycle = service.link(&underwriter(), link(&c, &a)).unwrap_err();
        assert_eq!(cycle.code(), "conflict");

        let own = service.link(&underwriter(), link(&a, &a)).unwrap_err();
        assert_eq!(own.code(), "validation_error");

        let again = service.link(&underwriter(), link(&a, &b)).unwrap_err();
        assert_eq!(again.code(), "conflict");
    }

    #[tokio::test]
    async fn test_viewer_cannot_link() {
        let ctx = context();
        let a = ingest(&ctx, 1).await;
        let b = ingest(&ctx, 2).await;
        let err = ProvenanceService::new(ctx)
            .link(&Principal::new("v", Role::Viewer), link(&a, &b))
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }
}
