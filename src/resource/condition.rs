use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a [`Condition`]. Maps to the conventional Kubernetes tri-state
/// `Unknown | True | False` string enum used across the ecosystem.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConditionStatus {
    Unknown,
    True,
    False,
}

/// One entry in a `status.conditions` list.
///
/// Conditions are keyed by `type_`: a status object holds at most one
/// condition per type, and the engine never reorders existing entries when
/// updating one in place (see [`set_condition`]).
/// Never embedded directly in a schema: every `Vec<Condition>` field is
/// annotated `#[schemars(schema_with = "schemas::conditions")]`, so this
/// type itself does not need to implement `JsonSchema`.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(
        serialize_with = "condition_status_ser",
        deserialize_with = "condition_status_de"
    )]
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(type_: impl Into<String>, status: ConditionStatus, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Insert or update `new` in `conditions`, keyed by `type_`.
///
/// `last_transition_time` only advances when `status` actually changes,
/// matching the convention every `status.conditions` consumer (kubectl,
/// dashboards, `kubectl wait`) expects. Reason/message can be refreshed on
/// every call without disturbing the transition clock.
pub fn set_condition(conditions: &mut Vec<Condition>, mut new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == new.type_) {
        if existing.status == new.status {
            new.last_transition_time = existing.last_transition_time;
        }
        *existing = new;
    } else {
        conditions.push(new);
    }
}

fn condition_status_de<'de, D>(deserializer: D) -> Result<ConditionStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match String::deserialize(deserializer)?.as_ref() {
        "Unknown" => Ok(ConditionStatus::Unknown),
        "True" => Ok(ConditionStatus::True),
        "False" => Ok(ConditionStatus::False),
        other => Err(serde::de::Error::invalid_value(
            serde::de::Unexpected::Str(other),
            &"Unknown or True or False",
        )),
    }
}

fn condition_status_ser<S>(status: &ConditionStatus, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(match status {
        ConditionStatus::True => "True",
        ConditionStatus::False => "False",
        ConditionStatus::Unknown => "Unknown",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_condition_appends_new_type() {
        let mut conditions = vec![];
        set_condition(&mut conditions, Condition::new("Ready", ConditionStatus::True, "AllUp", ""));
        assert_eq!(conditions.len(), 1);
        set_condition(&mut conditions, Condition::new("Degraded", ConditionStatus::False, "None", ""));
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].type_, "Ready");
        assert_eq!(conditions[1].type_, "Degraded");
    }

    #[test]
    fn set_condition_preserves_transition_time_when_status_unchanged() {
        let mut conditions = vec![];
        set_condition(&mut conditions, Condition::new("Ready", ConditionStatus::True, "AllUp", "first"));
        let first_transition = conditions[0].last_transition_time;

        set_condition(&mut conditions, Condition::new("Ready", ConditionStatus::True, "StillUp", "second"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first_transition);
        assert_eq!(conditions[0].message, "second");
    }

    #[test]
    fn set_condition_bumps_transition_time_on_status_change() {
        let mut conditions = vec![Condition {
            last_transition_time: Utc::now() - chrono::Duration::hours(1),
            ..Condition::new("Ready", ConditionStatus::True, "AllUp", "")
        }];
        let before = conditions[0].last_transition_time;
        set_condition(&mut conditions, Condition::new("Ready", ConditionStatus::False, "Crashed", ""));
        assert!(conditions[0].last_transition_time > before);
    }
}
