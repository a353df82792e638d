//! Data conflict model

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// A unique identifier for a conflict, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What kind of divergence was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    DataModified,
    DataDeleted,
    SchemaMismatch,
    PermissionConflict,
    RelationshipConflict,
    PrivacyViolation,
}

impl ConflictType {
    pub const ALL: [Self; 6] = [
        Self::DataModified,
        Self::DataDeleted,
        Self::SchemaMismatch,
        Self::PermissionConflict,
        Self::RelationshipConflict,
        Self::PrivacyViolation,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataModified => "data_modified",
            Self::DataDeleted => "data_deleted",
            Self::SchemaMismatch => "schema_mismatch",
            Self::PermissionConflict => "permission_conflict",
            Self::RelationshipConflict => "relationship_conflict",
            Self::PrivacyViolation => "privacy_violation",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or_else(|| Error::InvalidInput(format!("unknown conflict type '{s}'")))
    }
}

/// Kind of record a conflict is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Session,
    Goal,
    Task,
    Event,
    Settings,
    Relationship,
    Achievement,
}

impl EntityKind {
    pub const ALL: [Self; 7] = [
        Self::Session,
        Self::Goal,
        Self::Task,
        Self::Event,
        Self::Settings,
        Self::Relationship,
        Self::Achievement,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Goal => "goal",
            Self::Task => "task",
            Self::Event => "event",
            Self::Settings => "settings",
            Self::Relationship => "relationship",
            Self::Achievement => "achievement",
        }
    }

    /// Entity kind stored in a named collection, if the collection is known.
    pub fn for_collection(collection: &str) -> Option<Self> {
        match collection {
            "sessions" => Some(Self::Session),
            "goals" => Some(Self::Goal),
            "tasks" => Some(Self::Task),
            "events" => Some(Self::Event),
            "settings" => Some(Self::Settings),
            "relationships" => Some(Self::Relationship),
            "achievements" => Some(Self::Achievement),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or_else(|| Error::InvalidInput(format!("unknown entity kind '{s}'")))
    }
}

/// How urgently a conflict needs attention
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPriority {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictPriority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Default priority for a newly detected conflict.
    ///
    /// Privacy violations always need a human. Permission and relationship
    /// conflicts change what the partner can see. Running sessions are the
    /// most time-sensitive tracked records.
    pub const fn for_conflict(conflict_type: ConflictType, entity_kind: EntityKind) -> Self {
        match conflict_type {
            ConflictType::PrivacyViolation => Self::Critical,
            ConflictType::PermissionConflict | ConflictType::RelationshipConflict => Self::High,
            ConflictType::DataDeleted | ConflictType::SchemaMismatch => Self::Medium,
            ConflictType::DataModified => match entity_kind {
                EntityKind::Session | EntityKind::Settings => Self::Medium,
                _ => Self::Low,
            },
        }
    }
}

impl fmt::Display for ConflictPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str() == needle)
            .ok_or_else(|| Error::InvalidInput(format!("unknown conflict priority '{s}'")))
    }
}

/// Policy used to collapse divergent versions into one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    LocalWins,
    RemoteWins,
    KeyholderWins,
    MergeIntelligent,
    LatestTimestamp,
    /// Escalated to a person; never applied automatically
    Manual,
}

impl ResolutionStrategy {
    pub const ALL: [Self; 6] = [
        Self::LocalWins,
        Self::RemoteWins,
        Self::KeyholderWins,
        Self::MergeIntelligent,
        Self::LatestTimestamp,
        Self::Manual,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
            Self::KeyholderWins => "keyholder_wins",
            Self::MergeIntelligent => "merge_intelligent",
            Self::LatestTimestamp => "latest_timestamp",
            Self::Manual => "manual",
        }
    }

    /// Strategy assigned to a newly detected conflict of the given type.
    pub const fn default_for(conflict_type: ConflictType) -> Self {
        match conflict_type {
            ConflictType::DataModified => Self::MergeIntelligent,
            ConflictType::SchemaMismatch => Self::RemoteWins,
            ConflictType::PermissionConflict | ConflictType::RelationshipConflict => {
                Self::KeyholderWins
            }
            ConflictType::DataDeleted | ConflictType::PrivacyViolation => Self::Manual,
        }
    }

    pub const fn is_automatic(self) -> bool {
        !matches!(self, Self::Manual)
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    /// Unknown names are a configuration error, not an input error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == needle)
            .ok_or_else(|| Error::UnsupportedStrategy(s.trim().to_string()))
    }
}

/// Who touched the record and why
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictContext {
    /// User acting when the conflict was detected
    pub user_id: String,
    pub relationship_id: Option<String>,
    pub session_id: Option<String>,
    pub last_modified_by: Option<String>,
    pub reason: Option<String>,
}

impl ConflictContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_relationship(mut self, relationship_id: impl Into<String>) -> Self {
        self.relationship_id = Some(relationship_id.into());
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// The competing versions of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictVersions {
    pub local: serde_json::Value,
    pub remote: serde_json::Value,
    /// Version written by the keyholder, when one exists
    pub keyholder: Option<serde_json::Value>,
}

impl ConflictVersions {
    pub const fn new(local: serde_json::Value, remote: serde_json::Value) -> Self {
        Self {
            local,
            remote,
            keyholder: None,
        }
    }

    #[must_use]
    pub fn with_keyholder(mut self, keyholder: serde_json::Value) -> Self {
        self.keyholder = Some(keyholder);
        self
    }
}

/// A divergence waiting to be detected and stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConflict {
    pub conflict_type: ConflictType,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub versions: ConflictVersions,
    pub context: ConflictContext,
    /// Overrides [`ResolutionStrategy::default_for`]
    pub strategy: Option<ResolutionStrategy>,
    /// Overrides [`ConflictPriority::for_conflict`]
    pub priority: Option<ConflictPriority>,
}

impl NewConflict {
    pub fn new(
        conflict_type: ConflictType,
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        versions: ConflictVersions,
        context: ConflictContext,
    ) -> Self {
        Self {
            conflict_type,
            entity_kind,
            entity_id: entity_id.into(),
            versions,
            context,
            strategy: None,
            priority: None,
        }
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: ConflictPriority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// An unresolved divergence on one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConflict {
    pub id: ConflictId,
    pub conflict_type: ConflictType,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub versions: ConflictVersions,
    /// Strategy assigned at detection time
    pub strategy: ResolutionStrategy,
    pub priority: ConflictPriority,
    /// Detection timestamp (Unix ms)
    pub detected_at: i64,
    pub context: ConflictContext,
}

impl DataConflict {
    /// Materialize a detected conflict with a fresh id.
    pub fn detect(new: NewConflict, detected_at: i64) -> Self {
        let strategy = new
            .strategy
            .unwrap_or_else(|| ResolutionStrategy::default_for(new.conflict_type));
        let priority = new
            .priority
            .unwrap_or_else(|| ConflictPriority::for_conflict(new.conflict_type, new.entity_kind));
        Self {
            id: ConflictId::new(),
            conflict_type: new.conflict_type,
            entity_kind: new.entity_kind,
            entity_id: new.entity_id,
            versions: new.versions,
            strategy,
            priority,
            detected_at,
            context: new.context,
        }
    }
}

/// A caller's decision for one conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub strategy: ResolutionStrategy,
    pub resolved_by: Option<String>,
}

impl ConflictResolution {
    pub const fn new(strategy: ResolutionStrategy) -> Self {
        Self {
            strategy,
            resolved_by: None,
        }
    }
}

/// Batch policy for `resolve_all`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalResolutionStrategy {
    pub default: ResolutionStrategy,
    #[serde(default)]
    pub by_type: HashMap<ConflictType, ResolutionStrategy>,
}

impl GlobalResolutionStrategy {
    pub fn new(default: ResolutionStrategy) -> Self {
        Self {
            default,
            by_type: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_type(mut self, conflict_type: ConflictType, strategy: ResolutionStrategy) -> Self {
        self.by_type.insert(conflict_type, strategy);
        self
    }

    /// Strategy for a conflict type: the per-type override, else the default.
    pub fn select(&self, conflict_type: ConflictType) -> ResolutionStrategy {
        self.by_type
            .get(&conflict_type)
            .copied()
            .unwrap_or(self.default)
    }
}

/// Outcome of a successful single resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub conflict_id: ConflictId,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub strategy: ResolutionStrategy,
    /// The value that should replace the divergent versions
    pub resolved: serde_json::Value,
    pub resolved_at: i64,
}

/// Per-conflict entry in a `resolve_all` batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub conflict_id: ConflictId,
    pub success: bool,
    pub strategy: ResolutionStrategy,
    pub resulting_data: Option<serde_json::Value>,
    pub error: Option<String>,
}
