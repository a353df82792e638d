//! Pure conflict resolution strategies.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{ConflictVersions, ResolutionStrategy};

/// Keys checked, in order, for a version's last-modified time.
const TIMESTAMP_KEYS: [&str; 6] = [
    "updated_at",
    "updatedAt",
    "last_modified",
    "lastModified",
    "ts",
    "timestamp",
];

/// Collapse divergent versions into one value.
///
/// `Manual` is never applied automatically and fails with
/// [`Error::UnsupportedStrategy`].
pub fn resolve_versions(strategy: ResolutionStrategy, versions: &ConflictVersions) -> Result<Value> {
    match strategy {
        ResolutionStrategy::LocalWins => Ok(versions.local.clone()),
        ResolutionStrategy::RemoteWins => Ok(versions.remote.clone()),
        ResolutionStrategy::KeyholderWins => Ok(versions
            .keyholder
            .clone()
            .unwrap_or_else(|| versions.remote.clone())),
        ResolutionStrategy::MergeIntelligent => {
            Ok(merge_intelligent(&versions.local, &versions.remote))
        }
        ResolutionStrategy::LatestTimestamp => {
            Ok(latest_timestamp(&versions.local, &versions.remote).clone())
        }
        ResolutionStrategy::Manual => Err(Error::UnsupportedStrategy(format!(
            "'{}' requires a person to pick a version",
            strategy.as_str()
        ))),
    }
}

/// Field-wise merge of two objects.
///
/// Remote wins on conflicting scalars and arrays, nested objects merge
/// recursively, fields present on one side only are kept. If either side is
/// not an object the remote value wins outright.
pub fn merge_intelligent(local: &Value, remote: &Value) -> Value {
    match (local, remote) {
        (Value::Object(local), Value::Object(remote)) => {
            let mut merged: Map<String, Value> = local.clone();
            for (key, remote_value) in remote {
                let value = match merged.get(key) {
                    Some(local_value) => merge_intelligent(local_value, remote_value),
                    None => remote_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Object(merged)
        }
        _ => remote.clone(),
    }
}

/// The version with the later last-modified time; remote on a tie.
///
/// A version without a readable timestamp counts as the oldest.
pub fn latest_timestamp<'a>(local: &'a Value, remote: &'a Value) -> &'a Value {
    if version_timestamp(local) > version_timestamp(remote) {
        local
    } else {
        remote
    }
}

/// Last-modified time of a version in Unix ms, if it carries one.
pub fn version_timestamp(value: &Value) -> Option<i64> {
    let object = value.as_object()?;
    TIMESTAMP_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(parse_timestamp))
}

#[allow(clippy::cast_possible_truncation)]
fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|n| n as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|at| at.timestamp_millis())
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn versions(local: Value, remote: Value) -> ConflictVersions {
        ConflictVersions::new(local, remote)
    }

    #[test]
    fn latest_timestamp_picks_newer_remote() {
        let v = versions(json!({"name": "A", "ts": 10}), json!({"name": "B", "ts": 20}));
        let resolved = resolve_versions(ResolutionStrategy::LatestTimestamp, &v).unwrap();
        assert_eq!(resolved, json!({"name": "B", "ts": 20}));
    }

    #[test]
    fn latest_timestamp_picks_newer_local() {
        let v = versions(json!({"name": "A", "ts": 30}), json!({"name": "B", "ts": 20}));
        let resolved = resolve_versions(ResolutionStrategy::LatestTimestamp, &v).unwrap();
        assert_eq!(resolved["name"], "A");
    }

    #[test]
    fn latest_timestamp_tie_goes_to_remote() {
        let v = versions(json!({"name": "A", "ts": 10}), json!({"name": "B", "ts": 10}));
        let resolved = resolve_versions(ResolutionStrategy::LatestTimestamp, &v).unwrap();
        assert_eq!(resolved["name"], "B");
    }

    #[test]
    fn latest_timestamp_reads_rfc3339_and_treats_missing_as_oldest() {
        let local = json!({"updated_at": "2026-03-01T10:00:00Z"});
        let remote = json!({"updated_at": "2026-02-01T10:00:00+02:00"});
        assert_eq!(latest_timestamp(&local, &remote), &local);

        let undated = json!({"name": "x"});
        assert_eq!(latest_timestamp(&local, &undated), &local);
        assert_eq!(latest_timestamp(&undated, &remote), &remote);
    }

    #[test]
    fn merge_of_disjoint_fields_is_union() {
        let merged = merge_intelligent(&json!({"a": 1}), &json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_overlapping_scalar_remote_wins() {
        let merged = merge_intelligent(
            &json!({"title": "local", "done": false}),
            &json!({"title": "remote"}),
        );
        assert_eq!(merged, json!({"title": "remote", "done": false}));
    }

    #[test]
    fn merge_recurses_into_nested_objects() {
        let local = json!({"meta": {"color": "red", "tags": ["a"]}, "n": 1});
        let remote = json!({"meta": {"size": 3, "tags": ["b"]}});
        assert_eq!(
            merge_intelligent(&local, &remote),
            json!({"meta": {"color": "red", "size": 3, "tags": ["b"]}, "n": 1})
        );
    }

    #[test]
    fn keyholder_wins_falls_back_to_remote() {
        let v = versions(json!({"v": "local"}), json!({"v": "remote"}));
        assert_eq!(
            resolve_versions(ResolutionStrategy::KeyholderWins, &v).unwrap(),
            json!({"v": "remote"})
        );

        let v = v.with_keyholder(json!({"v": "keyholder"}));
        assert_eq!(
            resolve_versions(ResolutionStrategy::KeyholderWins, &v).unwrap(),
            json!({"v": "keyholder"})
        );
    }

    #[test]
    fn side_wins_return_versions_unchanged() {
        let v = versions(json!({"v": 1}), json!({"v": 2}));
        assert_eq!(resolve_versions(ResolutionStrategy::LocalWins, &v).unwrap(), json!({"v": 1}));
        assert_eq!(resolve_versions(ResolutionStrategy::RemoteWins, &v).unwrap(), json!({"v": 2}));
    }

    #[test]
    fn manual_is_unsupported() {
        let v = versions(json!({}), json!({}));
        assert!(matches!(
            resolve_versions(ResolutionStrategy::Manual, &v),
            Err(Error::UnsupportedStrategy(_))
        ));
    }
}
