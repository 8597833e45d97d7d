//! Session records: one per active agent interaction.
//!
//! A session is created on the first turn, patched once per turn and
//! eventually deleted or reaped by the stale sweep. The on-disk shape is the
//! serde form of [`Session`]; `schema_version` guards format changes.

use crate::bracket::Bracket;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// A persisted session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub uuid: String,

    pub schema_version: u32,

    #[serde(default = "Utc::now")]
    pub started: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub last_activity: DateTime<Utc>,

    /// Working directory the interaction was started from.
    #[serde(default)]
    pub cwd: String,

    /// Short human label (basename of `cwd`).
    #[serde(default)]
    pub label: String,

    /// Auto-generated title, set once.
    #[serde(default)]
    pub title: Option<String>,

    /// Turns processed so far. Invalid on-disk values read as 0.
    #[serde(default, deserialize_with = "lenient_count")]
    pub prompt_count: u64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub active_agent: ActiveAgent,

    #[serde(default)]
    pub active_workflow: Option<Activity>,

    #[serde(default)]
    pub active_squad: Option<Activity>,

    #[serde(default)]
    pub active_task: Option<Activity>,

    /// Snapshot of the previous turn's classification.
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: ContextSnapshot,

    #[serde(default, deserialize_with = "null_as_default")]
    pub overrides: BTreeMap<String, bool>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub history: SessionHistory,
}

/// The agent persona currently driving the interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveAgent {
    pub id: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub activation_quality: Option<String>,
}

/// An opaque reference to an active workflow, squad or task.
///
/// Only `id` is interpreted; everything else rides along untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    #[serde(flatten)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl Activity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            meta: serde_json::Map::new(),
        }
    }
}

/// Previous turn's classification, kept for transition detection and telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSnapshot {
    pub last_bracket: Bracket,
    pub last_tokens_used: u64,
    pub last_context_percent: f64,
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            last_bracket: Bracket::Fresh,
            last_tokens_used: 0,
            last_context_percent: 100.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    #[serde(default)]
    pub star_commands_used: Vec<String>,
    #[serde(default)]
    pub domains_loaded_last: Vec<String>,
    #[serde(default)]
    pub agents_activated: Vec<String>,
}

/// A partial update merged onto a loaded session.
///
/// `None` leaves a field alone. Activity fields use a nested option so a
/// patch can clear them (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub prompt_count: Option<u64>,
    pub active_agent: Option<ActiveAgent>,
    pub active_workflow: Option<Option<Activity>>,
    pub active_squad: Option<Option<Activity>>,
    pub active_task: Option<Option<Activity>>,
    pub context: Option<ContextSnapshot>,
    pub overrides: BTreeMap<String, bool>,
    pub history: HistoryPatch,
}

/// History additions. List fields are unioned, keeping first-seen order;
/// `domains_loaded_last` replaces the previous value.
#[derive(Debug, Clone, Default)]
pub struct HistoryPatch {
    pub star_commands_used: Vec<String>,
    pub domains_loaded_last: Option<Vec<String>>,
    pub agents_activated: Vec<String>,
}

impl Session {
    /// A fresh record: zero turns, no activity, current schema.
    pub fn new(uuid: impl Into<String>, cwd: &Path) -> Self {
        let now = Utc::now();
        let label = cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            uuid: uuid.into(),
            schema_version: SCHEMA_VERSION,
            started: now,
            last_activity: now,
            cwd: cwd.to_string_lossy().into_owned(),
            label,
            title: None,
            prompt_count: 0,
            active_agent: ActiveAgent::default(),
            active_workflow: None,
            active_squad: None,
            active_task: None,
            context: ContextSnapshot::default(),
            overrides: BTreeMap::new(),
            history: SessionHistory::default(),
        }
    }

    /// Id of the active agent, if one is set.
    pub fn agent_id(&self) -> Option<&str> {
        self.active_agent.id.as_deref()
    }

    /// Merge a patch onto this record and refresh `last_activity`.
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(title) = patch.title {
            self.title = Some(title);
        }

        if let Some(count) = patch.prompt_count {
            if count < self.prompt_count {
                warn!(
                    session = %self.uuid,
                    current = self.prompt_count,
                    requested = count,
                    "Ignoring prompt_count decrease"
                );
            } else {
                self.prompt_count = count;
            }
        }

        if let Some(agent) = patch.active_agent {
            if agent.id.is_some() {
                self.active_agent.id = agent.id;
            }
            if agent.activated_at.is_some() {
                self.active_agent.activated_at = agent.activated_at;
            }
            if agent.activation_quality.is_some() {
                self.active_agent.activation_quality = agent.activation_quality;
            }
        }

        if let Some(workflow) = patch.active_workflow {
            self.active_workflow = workflow;
        }
        if let Some(squad) = patch.active_squad {
            self.active_squad = squad;
        }
        if let Some(task) = patch.active_task {
            self.active_task = task;
        }

        if let Some(context) = patch.context {
            self.context = context;
        }

        self.overrides.extend(patch.overrides);

        union_into(
            &mut self.history.star_commands_used,
            patch.history.star_commands_used,
        );
        union_into(
            &mut self.history.agents_activated,
            patch.history.agents_activated,
        );
        if let Some(domains) = patch.history.domains_loaded_last {
            self.history.domains_loaded_last = domains;
        }

        self.last_activity = Utc::now();
    }
}

fn union_into(target: &mut Vec<String>, additions: Vec<String>) {
    for item in additions {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Normalise a raw prompt count: negatives, non-numbers and null become 0.
pub fn normalize_prompt_count(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f > 0.0 => f.floor() as u64,
                    _ => 0,
                }
            }
        }
        _ => 0,
    }
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(normalize_prompt_count(&value))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_session_defaults() {
        let s = Session::new("abc", Path::new("/work/my-project"));
        assert_eq!(s.uuid, "abc");
        assert_eq!(s.schema_version, SCHEMA_VERSION);
        assert_eq!(s.prompt_count, 0);
        assert_eq!(s.label, "my-project");
        assert!(s.title.is_none());
        assert!(s.agent_id().is_none());
        assert!(s.active_workflow.is_none());
        assert_eq!(s.context, ContextSnapshot::default());
        assert_eq!(s.context.last_bracket, Bracket::Fresh);
    }

    #[test]
    fn invalid_prompt_counts_read_as_zero() {
        assert_eq!(normalize_prompt_count(&json!(7)), 7);
        assert_eq!(normalize_prompt_count(&json!(-3)), 0);
        assert_eq!(normalize_prompt_count(&json!(2.9)), 2);
        assert_eq!(normalize_prompt_count(&json!("fifty")), 0);
        assert_eq!(normalize_prompt_count(&json!(null)), 0);

        let raw = json!({
            "uuid": "x",
            "schema_version": 2,
            "prompt_count": -4,
            "active_agent": null
        });
        let s: Session = serde_json::from_value(raw).unwrap();
        assert_eq!(s.prompt_count, 0);
        assert_eq!(s.active_agent, ActiveAgent::default());
    }

    #[test]
    fn activity_keeps_extra_metadata() {
        let raw = json!({ "id": "story-42", "phase": "review" });
        let activity: Activity = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(activity.id, "story-42");
        assert_eq!(serde_json::to_value(&activity).unwrap(), raw);
    }

    #[test]
    fn patch_merges_agent_fieldwise() {
        let mut s = Session::new("abc", Path::new("/work"));
        s.apply(SessionPatch {
            active_agent: Some(ActiveAgent {
                id: Some("dev".into()),
                activated_at: None,
                activation_quality: Some("full".into()),
            }),
            ..SessionPatch::default()
        });
        s.apply(SessionPatch {
            active_agent: Some(ActiveAgent {
                activation_quality: Some("partial".into()),
                ..ActiveAgent::default()
            }),
            ..SessionPatch::default()
        });
        assert_eq!(s.agent_id(), Some("dev"));
        assert_eq!(s.active_agent.activation_quality.as_deref(), Some("partial"));
    }

    #[test]
    fn history_lists_accumulate_unique_values() {
        let mut s = Session::new("abc", Path::new("/work"));
        s.apply(SessionPatch {
            history: HistoryPatch {
                agents_activated: vec!["dev".into()],
                ..HistoryPatch::default()
            },
            ..SessionPatch::default()
        });
        s.apply(SessionPatch {
            history: HistoryPatch {
                agents_activated: vec!["qa".into(), "dev".into()],
                domains_loaded_last: Some(vec!["global".into()]),
                ..HistoryPatch::default()
            },
            ..SessionPatch::default()
        });
        assert_eq!(s.history.agents_activated, vec!["dev", "qa"]);
        assert_eq!(s.history.domains_loaded_last, vec!["global"]);
    }

    #[test]
    fn prompt_count_never_decreases() {
        let mut s = Session::new("abc", Path::new("/work"));
        s.apply(SessionPatch {
            prompt_count: Some(5),
            ..SessionPatch::default()
        });
        s.apply(SessionPatch {
            prompt_count: Some(3),
            ..SessionPatch::default()
        });
        assert_eq!(s.prompt_count, 5);
    }

    #[test]
    fn activity_can_be_cleared() {
        let mut s = Session::new("abc", Path::new("/work"));
        s.apply(SessionPatch {
            active_task: Some(Some(Activity::new("t-1"))),
            ..SessionPatch::default()
        });
        assert_eq!(s.active_task.as_ref().map(|t| t.id.as_str()), Some("t-1"));
        s.apply(SessionPatch {
            active_task: Some(None),
            ..SessionPatch::default()
        });
        assert!(s.active_task.is_none());
    }

    #[test]
    fn overrides_merge_keywise() {
        let mut s = Session::new("abc", Path::new("/work"));
        for i in 1..=3 {
            let mut overrides = BTreeMap::new();
            overrides.insert(format!("DOMAIN_{i}"), true);
            s.apply(SessionPatch {
                overrides,
                ..SessionPatch::default()
            });
        }
        assert_eq!(s.overrides.len(), 3);
    }
}
