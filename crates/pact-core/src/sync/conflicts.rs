//! Active conflict set: detection, storage and resolution.

use crate::error::{Error, Result};
use crate::models::{
    ConflictContext, ConflictId, ConflictPriority, ConflictResolution, ConflictVersions,
    DataConflict, GlobalResolutionStrategy, NewConflict, ResolutionResult, ResolvedConflict,
};
use crate::services::LocalStore;
use crate::util::now_millis;

use super::gate::RemoteDivergence;
use super::resolver::resolve_versions;

/// Owns the session user's rows of the conflicts table. Resolved-count
/// metrics are credited to the same user.
#[derive(Clone)]
pub struct ConflictManager {
    store: LocalStore,
    user_id: String,
}

impl ConflictManager {
    pub fn new(store: LocalStore, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }

    /// Store a newly detected divergence as an active conflict.
    ///
    /// An entity has at most one active conflict per relationship scope: a
    /// repeated detection refreshes the existing conflict's versions and
    /// keeps its id and detection time.
    pub async fn register(&self, conflict: NewConflict) -> Result<DataConflict> {
        if conflict.entity_id.trim().is_empty() {
            return Err(Error::InvalidInput("conflict entity id cannot be empty".into()));
        }

        let mut conflict = DataConflict::detect(conflict, now_millis());
        let existing = self
            .store
            .find_conflict_for_entity(
                &self.user_id,
                conflict.entity_kind,
                &conflict.entity_id,
                conflict.context.relationship_id.as_deref(),
            )
            .await?;

        if let Some(existing) = existing {
            conflict.id = existing.id;
            conflict.detected_at = existing.detected_at;
            if self.store.replace_conflict(&self.user_id, &conflict).await? {
                tracing::debug!(
                    "Refreshed {} conflict {} on {} {}",
                    conflict.conflict_type,
                    conflict.id,
                    conflict.entity_kind,
                    conflict.entity_id
                );
                return Ok(conflict);
            }
            // Resolved in the meantime; store the new detection on its own.
            conflict.id = ConflictId::new();
            conflict.detected_at = now_millis();
        }

        self.store.insert_conflict(&self.user_id, &conflict).await?;

        tracing::info!(
            "Detected {} conflict {} on {} {} (priority {}, strategy {})",
            conflict.conflict_type,
            conflict.id,
            conflict.entity_kind,
            conflict.entity_id,
            conflict.priority,
            conflict.strategy
        );
        Ok(conflict)
    }

    /// Register every divergence a remote sync reported.
    pub async fn register_divergences(
        &self,
        relationship_id: Option<&str>,
        divergences: &[RemoteDivergence],
    ) -> Result<Vec<DataConflict>> {
        let mut registered = Vec::with_capacity(divergences.len());
        for divergence in divergences {
            let mut context = ConflictContext::for_user(&self.user_id)
                .with_reason("remote version diverged during sync");
            if let Some(relationship_id) = relationship_id {
                context = context.with_relationship(relationship_id);
            }
            context.last_modified_by.clone_from(&divergence.last_modified_by);

            let mut versions =
                ConflictVersions::new(divergence.local.clone(), divergence.remote.clone());
            if let Some(keyholder) = &divergence.keyholder {
                versions = versions.with_keyholder(keyholder.clone());
            }

            let conflict = NewConflict::new(
                divergence.conflict_type,
                divergence.entity_kind,
                &divergence.entity_id,
                versions,
                context,
            );
            registered.push(self.register(conflict).await?);
        }
        Ok(registered)
    }

    pub async fn get(&self, id: &ConflictId) -> Result<DataConflict> {
        self.store
            .get_conflict(&self.user_id, id)
            .await?
            .ok_or_else(|| Error::ConflictNotFound(*id))
    }

    pub async fn list(&self) -> Result<Vec<DataConflict>> {
        self.store.list_conflicts(&self.user_id).await
    }

    pub async fn list_for_relationship(&self, relationship_id: &str) -> Result<Vec<DataConflict>> {
        self.store
            .list_conflicts_for_relationship(&self.user_id, relationship_id)
            .await
    }

    pub async fn active_count(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }

    /// Apply a resolution and retire the conflict.
    ///
    /// The resolved value is returned to the caller; writing it back to the
    /// remote side is a new queued mutation.
    pub async fn resolve(
        &self,
        id: &ConflictId,
        resolution: &ConflictResolution,
    ) -> Result<ResolvedConflict> {
        let conflict = self.get(id).await?;
        let resolved = resolve_versions(resolution.strategy, &conflict.versions)?;

        // A concurrent resolve may have won the race since the read above.
        if !self.store.delete_conflict(&self.user_id, id).await? {
            return Err(Error::ConflictNotFound(*id));
        }
        self.store
            .update_metrics(&self.user_id, |metrics| metrics.record_resolved(1))
            .await?;

        tracing::info!(
            "Resolved conflict {id} on {} {} with {}{}",
            conflict.entity_kind,
            conflict.entity_id,
            resolution.strategy,
            resolution
                .resolved_by
                .as_deref()
                .map(|by| format!(" (by {by})"))
                .unwrap_or_default()
        );

        Ok(ResolvedConflict {
            conflict_id: conflict.id,
            entity_kind: conflict.entity_kind,
            entity_id: conflict.entity_id,
            strategy: resolution.strategy,
            resolved,
            resolved_at: now_millis(),
        })
    }

    /// Resolve every active conflict, isolating per-conflict failures.
    pub async fn resolve_all(
        &self,
        strategy: &GlobalResolutionStrategy,
    ) -> Result<Vec<ResolutionResult>> {
        let conflicts = self.list().await?;
        let mut results = Vec::with_capacity(conflicts.len());

        for conflict in conflicts {
            let chosen = strategy.select(conflict.conflict_type);
            let result = match self.resolve(&conflict.id, &ConflictResolution::new(chosen)).await {
                Ok(resolved) => ResolutionResult {
                    conflict_id: conflict.id,
                    success: true,
                    strategy: chosen,
                    resulting_data: Some(resolved.resolved),
                    error: None,
                },
                Err(error) => {
                    tracing::warn!("Could not resolve conflict {}: {error}", conflict.id);
                    ResolutionResult {
                        conflict_id: conflict.id,
                        success: false,
                        strategy: chosen,
                        resulting_data: None,
                        error: Some(error.to_string()),
                    }
                }
            };
            results.push(result);
        }

        Ok(results)
    }

    /// Resolve conflicts below `High` priority with their assigned strategy.
    ///
    /// Returns the resolutions that succeeded; the rest stay active.
    pub async fn auto_resolve(&self, conflicts: &[DataConflict]) -> Vec<ResolvedConflict> {
        let mut resolved = Vec::new();
        for conflict in conflicts {
            if conflict.priority >= ConflictPriority::High || !conflict.strategy.is_automatic() {
                continue;
            }
            match self
                .resolve(&conflict.id, &ConflictResolution::new(conflict.strategy))
                .await
            {
                Ok(outcome) => resolved.push(outcome),
                Err(error) => {
                    tracing::warn!("Automatic resolution of {} failed: {error}", conflict.id);
                }
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictType, EntityKind, ResolutionStrategy};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn manager() -> ConflictManager {
        let store = LocalStore::open_in_memory().await.unwrap();
        ConflictManager::new(store, "u1")
    }

    fn modified(entity_id: &str) -> NewConflict {
        NewConflict::new(
            ConflictType::DataModified,
            EntityKind::Task,
            entity_id,
            ConflictVersions::new(json!({"title": "A", "ts": 10}), json!({"title": "B", "ts": 20})),
            ConflictContext::for_user("u1"),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn register_assigns_default_strategy_and_priority() {
        let manager = manager().await;
        let conflict = manager.register(modified("t1")).await.unwrap();

        assert_eq!(conflict.strategy, ResolutionStrategy::MergeIntelligent);
        assert_eq!(conflict.priority, ConflictPriority::Low);
        assert_eq!(manager.active_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_removes_conflict_and_counts_it() {
        let manager = manager().await;
        let conflict = manager.register(modified("t1")).await.unwrap();

        let resolved = manager
            .resolve(&conflict.id, &ConflictResolution::new(ResolutionStrategy::LatestTimestamp))
            .await
            .unwrap();

        assert_eq!(resolved.resolved, json!({"title": "B", "ts": 20}));
        assert_eq!(manager.active_count().await.unwrap(), 0);
        assert_eq!(manager.store.load_metrics("u1").await.unwrap().conflicts_resolved, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolving_twice_fails_with_not_found() {
        let manager = manager().await;
        let conflict = manager.register(modified("t1")).await.unwrap();
        let resolution = ConflictResolution::new(ResolutionStrategy::RemoteWins);

        manager.resolve(&conflict.id, &resolution).await.unwrap();
        let second = manager.resolve(&conflict.id, &resolution).await;

        assert!(matches!(second, Err(Error::ConflictNotFound(id)) if id == conflict.id));
        assert_eq!(manager.store.load_metrics("u1").await.unwrap().conflicts_resolved, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unsupported_strategy_keeps_conflict_active() {
        let manager = manager().await;
        let conflict = manager.register(modified("t1")).await.unwrap();

        let result = manager
            .resolve(&conflict.id, &ConflictResolution::new(ResolutionStrategy::Manual))
            .await;

        assert!(matches!(result, Err(Error::UnsupportedStrategy(_))));
        assert_eq!(manager.active_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_all_isolates_failures() {
        let manager = manager().await;
        let good = manager.register(modified("t1")).await.unwrap();
        let bad = manager
            .register(NewConflict::new(
                ConflictType::DataDeleted,
                EntityKind::Goal,
                "g1",
                ConflictVersions::new(json!({"id": "g1"}), json!(null)),
                ConflictContext::for_user("u1"),
            ))
            .await
            .unwrap();

        let strategy = GlobalResolutionStrategy::new(ResolutionStrategy::MergeIntelligent)
            .with_type(ConflictType::DataDeleted, ResolutionStrategy::Manual);
        let results = manager.resolve_all(&strategy).await.unwrap();

        assert_eq!(results.len(), 2);
        let ok = results.iter().find(|r| r.conflict_id == good.id).unwrap();
        let failed = results.iter().find(|r| r.conflict_id == bad.id).unwrap();
        assert!(ok.success);
        assert_eq!(ok.resulting_data, Some(json!({"title": "B", "ts": 20})));
        assert!(!failed.success);
        assert_eq!(failed.strategy, ResolutionStrategy::Manual);
        assert!(failed.error.is_some());

        let remaining: Vec<_> = manager.list().await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(remaining, vec![bad.id]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn divergences_become_relationship_scoped_conflicts() {
        let manager = manager().await;
        let divergence = RemoteDivergence {
            conflict_type: ConflictType::PermissionConflict,
            entity_kind: EntityKind::Relationship,
            entity_id: "r1".into(),
            local: json!({"share": true}),
            remote: json!({"share": false}),
            keyholder: Some(json!({"share": false, "locked": true})),
            last_modified_by: Some("kh".into()),
        };

        let registered = manager
            .register_divergences(Some("rel-1"), &[divergence])
            .await
            .unwrap();

        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].priority, ConflictPriority::High);
        assert_eq!(registered[0].strategy, ResolutionStrategy::KeyholderWins);
        assert_eq!(registered[0].context.last_modified_by.as_deref(), Some("kh"));
        assert_eq!(manager.list_for_relationship("rel-1").await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn auto_resolve_skips_high_priority_and_manual() {
        let manager = manager().await;
        let low = manager.register(modified("t1")).await.unwrap();
        let high = manager
            .register(modified("t2").with_priority(ConflictPriority::High))
            .await
            .unwrap();
        let manual = manager
            .register(modified("t3").with_strategy(ResolutionStrategy::Manual))
            .await
            .unwrap();

        let resolved = manager
            .auto_resolve(&[low.clone(), high.clone(), manual.clone()])
            .await;

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].conflict_id, low.id);
        let mut remaining: Vec<_> = manager.list().await.unwrap().into_iter().map(|c| c.id).collect();
        remaining.sort_by_key(ToString::to_string);
        let mut expected = vec![high.id, manual.id];
        expected.sort_by_key(ToString::to_string);
        assert_eq!(remaining, expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_detection_refreshes_the_active_conflict() {
        let manager = manager().await;
        let first = manager.register(modified("t1")).await.unwrap();

        let mut again = modified("t1");
        again.versions = ConflictVersions::new(json!({"title": "A"}), json!({"title": "C"}));
        let second = manager.register(again).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.detected_at, first.detected_at);
        let active = manager.list().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].versions.remote, json!({"title": "C"}));

        // Same entity under a relationship is its own conflict
        let mut scoped = modified("t1");
        scoped.context = scoped.context.with_relationship("rel-1");
        let scoped = manager.register(scoped).await.unwrap();
        assert_ne!(scoped.id, first.id);
        assert_eq!(manager.active_count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detection_after_resolution_opens_a_new_conflict() {
        let manager = manager().await;
        let first = manager.register(modified("t1")).await.unwrap();
        manager
            .resolve(&first.id, &ConflictResolution::new(ResolutionStrategy::RemoteWins))
            .await
            .unwrap();

        let second = manager.register(modified("t1")).await.unwrap();

        assert_ne!(second.id, first.id);
        assert_eq!(manager.active_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflicts_are_private_to_their_owner() {
        let mine = manager().await;
        let theirs = ConflictManager::new(mine.store.clone(), "u2");
        let conflict = mine
            .register(modified("t1").with_priority(ConflictPriority::Critical))
            .await
            .unwrap();

        assert!(theirs.list().await.unwrap().is_empty());
        assert!(matches!(
            theirs.get(&conflict.id).await,
            Err(Error::ConflictNotFound(_))
        ));
        let results = theirs
            .resolve_all(&GlobalResolutionStrategy::new(ResolutionStrategy::RemoteWins))
            .await
            .unwrap();
        assert!(results.is_empty());

        // The same entity id seen by another owner is tracked separately
        let other = theirs.register(modified("t1")).await.unwrap();
        assert_ne!(other.id, conflict.id);
        assert_eq!(mine.active_count().await.unwrap(), 1);
        assert_eq!(mine.store.load_metrics("u2").await.unwrap().conflicts_resolved, 0);
    }
}
