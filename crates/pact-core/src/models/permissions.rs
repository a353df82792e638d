//! Per-user sharing policy

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Named collections known to the sync core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncCollection {
    Sessions,
    Goals,
    Tasks,
    Events,
    Settings,
    Achievements,
}

impl SyncCollection {
    /// Every collection owned by a user
    pub const ALL: [Self; 6] = [
        Self::Sessions,
        Self::Goals,
        Self::Tasks,
        Self::Events,
        Self::Settings,
        Self::Achievements,
    ];

    /// Collections that may be shared with a keyholder
    pub const SHAREABLE: [Self; 4] = [Self::Sessions, Self::Goals, Self::Tasks, Self::Events];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sessions => "sessions",
            Self::Goals => "goals",
            Self::Tasks => "tasks",
            Self::Events => "events",
            Self::Settings => "settings",
            Self::Achievements => "achievements",
        }
    }

    pub const fn is_shareable(self) -> bool {
        matches!(
            self,
            Self::Sessions | Self::Goals | Self::Tasks | Self::Events
        )
    }
}

impl fmt::Display for SyncCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncCollection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|collection| collection.as_str() == needle)
            .ok_or_else(|| Error::InvalidInput(format!("unknown collection '{s}'")))
    }
}

/// Who may see shared data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Public,
    #[default]
    RelationshipOnly,
    Private,
}

impl PrivacyLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::RelationshipOnly => "relationship_only",
            Self::Private => "private",
        }
    }
}

impl FromStr for PrivacyLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "public" => Ok(Self::Public),
            "relationship_only" => Ok(Self::RelationshipOnly),
            "private" => Ok(Self::Private),
            _ => Err(Error::InvalidInput(format!("unknown privacy level '{s}'"))),
        }
    }
}

/// How often background relationship sync runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncFrequency {
    Realtime,
    #[default]
    Frequent,
    Moderate,
    Minimal,
}

impl SyncFrequency {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Frequent => "frequent",
            Self::Moderate => "moderate",
            Self::Minimal => "minimal",
        }
    }

    /// Interval between recurring background syncs
    pub const fn interval(self) -> Duration {
        match self {
            Self::Realtime => Duration::from_secs(5),
            Self::Frequent => Duration::from_secs(30),
            Self::Moderate => Duration::from_secs(5 * 60),
            Self::Minimal => Duration::from_secs(60 * 60),
        }
    }
}

impl FromStr for SyncFrequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "realtime" => Ok(Self::Realtime),
            "frequent" => Ok(Self::Frequent),
            "moderate" => Ok(Self::Moderate),
            "minimal" => Ok(Self::Minimal),
            _ => Err(Error::InvalidInput(format!("unknown sync frequency '{s}'"))),
        }
    }
}

/// Sharing policy for one user; read before every relationship sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPermissions {
    pub user_id: String,
    pub privacy_level: PrivacyLevel,
    pub frequency: SyncFrequency,
    /// Recurring background sync at `frequency`
    pub realtime_enabled: bool,
    pub share_session_data: bool,
    pub share_goal_data: bool,
    pub share_task_data: bool,
    pub share_event_data: bool,
    /// Resolve newly found low/medium conflicts with their assigned strategy
    pub auto_resolve_conflicts: bool,
    /// Last explicit change (Unix ms)
    pub updated_at: i64,
}

impl SyncPermissions {
    /// Defaults for a user who has not changed anything yet
    pub fn defaults_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            privacy_level: PrivacyLevel::RelationshipOnly,
            frequency: SyncFrequency::Frequent,
            realtime_enabled: false,
            share_session_data: true,
            share_goal_data: true,
            share_task_data: true,
            share_event_data: false,
            auto_resolve_conflicts: true,
            updated_at: 0,
        }
    }

    /// Whether relationship sync may touch this collection
    pub const fn allows(&self, collection: SyncCollection) -> bool {
        if matches!(self.privacy_level, PrivacyLevel::Private) {
            return false;
        }
        match collection {
            SyncCollection::Sessions => self.share_session_data,
            SyncCollection::Goals => self.share_goal_data,
            SyncCollection::Tasks => self.share_task_data,
            SyncCollection::Events => self.share_event_data,
            SyncCollection::Settings | SyncCollection::Achievements => false,
        }
    }

    /// Filter requested collections down to what may be shared, keeping order
    pub fn filter_shared(&self, requested: &[SyncCollection]) -> Vec<SyncCollection> {
        requested
            .iter()
            .copied()
            .filter(|collection| self.allows(*collection))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_data_excluded_unless_shared() {
        let mut permissions = SyncPermissions::defaults_for("u1");
        let shared = permissions.filter_shared(&SyncCollection::SHAREABLE);
        assert_eq!(
            shared,
            vec![
                SyncCollection::Sessions,
                SyncCollection::Goals,
                SyncCollection::Tasks
            ]
        );

        permissions.share_event_data = true;
        assert!(permissions.allows(SyncCollection::Events));
    }

    #[test]
    fn private_level_shares_nothing() {
        let permissions = SyncPermissions {
            privacy_level: PrivacyLevel::Private,
            ..SyncPermissions::defaults_for("u1")
        };
        assert!(permissions
            .filter_shared(&SyncCollection::SHAREABLE)
            .is_empty());
    }

    #[test]
    fn settings_are_never_shared() {
        let permissions = SyncPermissions::defaults_for("u1");
        assert!(!permissions.allows(SyncCollection::Settings));
        assert!(!SyncCollection::Achievements.is_shareable());
    }

    #[test]
    fn frequency_intervals() {
        assert_eq!(SyncFrequency::Realtime.interval(), Duration::from_secs(5));
        assert_eq!(SyncFrequency::Frequent.interval(), Duration::from_secs(30));
        assert_eq!(SyncFrequency::Moderate.interval(), Duration::from_secs(300));
        assert_eq!(SyncFrequency::Minimal.interval(), Duration::from_secs(3600));
    }
}
