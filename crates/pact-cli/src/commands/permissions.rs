use pact_core::models::{PrivacyLevel, SyncFrequency, SyncPermissions};

use crate::commands::common::{open_session, print_json, SessionArgs};
use crate::error::CliError;

/// Requested permission changes; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct PermissionChanges {
    pub privacy: Option<String>,
    pub frequency: Option<String>,
    pub realtime: Option<bool>,
    pub share_sessions: Option<bool>,
    pub share_goals: Option<bool>,
    pub share_tasks: Option<bool>,
    pub share_events: Option<bool>,
    pub auto_resolve: Option<bool>,
}

impl PermissionChanges {
    pub fn apply(self, mut permissions: SyncPermissions) -> Result<SyncPermissions, CliError> {
        if let Some(privacy) = self.privacy {
            permissions.privacy_level = privacy.parse::<PrivacyLevel>()?;
        }
        if let Some(frequency) = self.frequency {
            permissions.frequency = frequency.parse::<SyncFrequency>()?;
        }
        if let Some(value) = self.realtime {
            permissions.realtime_enabled = value;
        }
        if let Some(value) = self.share_sessions {
            permissions.share_session_data = value;
        }
        if let Some(value) = self.share_goals {
            permissions.share_goal_data = value;
        }
        if let Some(value) = self.share_tasks {
            permissions.share_task_data = value;
        }
        if let Some(value) = self.share_events {
            permissions.share_event_data = value;
        }
        if let Some(value) = self.auto_resolve {
            permissions.auto_resolve_conflicts = value;
        }
        Ok(permissions)
    }
}

pub async fn run_permissions_show(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let permissions = session.permissions().await?;

    if as_json {
        return print_json(&permissions);
    }
    for line in format_permission_lines(&permissions) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_permissions_set(
    changes: PermissionChanges,
    args: &SessionArgs,
) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let permissions = changes.apply(session.permissions().await?)?;
    let saved = session.update_permissions(permissions).await?;
    session.shutdown();

    for line in format_permission_lines(&saved) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_permission_lines(permissions: &SyncPermissions) -> Vec<String> {
    vec![
        format!("privacy:        {}", permissions.privacy_level.as_str()),
        format!(
            "frequency:      {} ({}s)",
            permissions.frequency.as_str(),
            permissions.frequency.interval().as_secs()
        ),
        format!("realtime:       {}", permissions.realtime_enabled),
        format!("share sessions: {}", permissions.share_session_data),
        format!("share goals:    {}", permissions.share_goal_data),
        format!("share tasks:    {}", permissions.share_task_data),
        format!("share events:   {}", permissions.share_event_data),
        format!("auto resolve:   {}", permissions.auto_resolve_conflicts),
    ]
}
