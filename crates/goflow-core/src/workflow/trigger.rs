use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GoflowError, Result};

/// Namespace for deriving run IDs from trigger IDs.
const RUN_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a8e_4d3b_5e7f_9a0b_1c2d_3e4f_5a6b);

/// The closed set of events the engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "clerk/user.created")]
    UserCreated,
    #[serde(rename = "clerk/user.updated")]
    UserUpdated,
    #[serde(rename = "clerk/user.deleted")]
    UserDeleted,
    #[serde(rename = "clerk/organization.created")]
    OrganizationCreated,
    #[serde(rename = "clerk/organization.updated")]
    OrganizationUpdated,
    #[serde(rename = "clerk/organization.deleted")]
    OrganizationDeleted,
    #[serde(rename = "clerk/organizationInvitation.accepted")]
    InvitationAccepted,
    #[serde(rename = "app/task.assigned")]
    TaskAssigned,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        Self::UserCreated,
        Self::UserUpdated,
        Self::UserDeleted,
        Self::OrganizationCreated,
        Self::OrganizationUpdated,
        Self::OrganizationDeleted,
        Self::InvitationAccepted,
        Self::TaskAssigned,
    ];

    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreated => "clerk/user.created",
            Self::UserUpdated => "clerk/user.updated",
            Self::UserDeleted => "clerk/user.deleted",
            Self::OrganizationCreated => "clerk/organization.created",
            Self::OrganizationUpdated => "clerk/organization.updated",
            Self::OrganizationDeleted => "clerk/organization.deleted",
            Self::InvitationAccepted => "clerk/organizationInvitation.accepted",
            Self::TaskAssigned => "app/task.assigned",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = GoflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| GoflowError::UnknownEvent(s.to_string()))
    }
}

/// An event as delivered by an upstream source, before admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub trigger_id: String,
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl InboundEvent {
    pub fn new(
        trigger_id: impl Into<String>,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            event_type: event_type.as_str().to_string(),
            payload,
        }
    }
}

/// An admitted event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_id: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl Trigger {
    /// Validate the envelope of an inbound event.
    pub fn from_inbound(event: InboundEvent, received_at: DateTime<Utc>) -> Result<Self> {
        let trigger_id = event.trigger_id.trim();
        if trigger_id.is_empty() {
            return Err(GoflowError::Validation("triggerId must not be empty".into()));
        }
        let event_type: EventType = event.event_type.parse()?;
        if !event.payload.is_object() {
            return Err(GoflowError::Validation(format!(
                "payload for {} must be an object",
                event_type
            )));
        }

        Ok(Self {
            trigger_id: trigger_id.to_string(),
            event_type,
            payload: event.payload,
            received_at,
        })
    }

    /// Run ID for this trigger. Stable across redeliveries.
    pub fn run_id(&self) -> Uuid {
        run_id_for(&self.trigger_id)
    }

    /// Get the payload as a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| GoflowError::Validation(format!("invalid payload: {}", e)))
    }
}

/// Derive the run ID for a trigger ID.
pub fn run_id_for(trigger_id: &str) -> Uuid {
    Uuid::new_v5(&RUN_ID_NAMESPACE, trigger_id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip_names() {
        for event in EventType::ALL {
            assert_eq!(event.as_str().parse::<EventType>().unwrap(), event);
        }
        assert!(matches!(
            "clerk/session.created".parse::<EventType>(),
            Err(GoflowError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_event_type_serde_uses_wire_name() {
        let json = serde_json::to_string(&EventType::TaskAssigned).unwrap();
        assert_eq!(json, "\"app/task.assigned\"");
    }

    #[test]
    fn test_run_id_is_deterministic() {
        assert_eq!(run_id_for("evt_1"), run_id_for("evt_1"));
        assert_ne!(run_id_for("evt_1"), run_id_for("evt_2"));
    }

    #[test]
    fn test_trigger_from_inbound() {
        let inbound = InboundEvent::new(
            " evt_42 ",
            EventType::TaskAssigned,
            serde_json::json!({"taskId": "t1", "origin": "https://app"}),
        );
        let trigger = Trigger::from_inbound(inbound, Utc::now()).unwrap();
        assert_eq!(trigger.trigger_id, "evt_42");
        assert_eq!(trigger.event_type, EventType::TaskAssigned);
        assert_eq!(trigger.run_id(), run_id_for("evt_42"));
    }

    #[test]
    fn test_trigger_rejects_bad_envelope() {
        let empty_id = InboundEvent::new("", EventType::UserCreated, serde_json::json!({}));
        assert!(matches!(
            Trigger::from_inbound(empty_id, Utc::now()),
            Err(GoflowError::Validation(_))
        ));

        let not_object = InboundEvent::new("e1", EventType::UserCreated, serde_json::json!([1]));
        assert!(matches!(
            Trigger::from_inbound(not_object, Utc::now()),
            Err(GoflowError::Validation(_))
        ));
    }

    #[test]
    fn test_inbound_event_camel_case() {
        let inbound: InboundEvent = serde_json::from_value(serde_json::json!({
            "triggerId": "evt_1",
            "eventType": "clerk/user.deleted",
            "payload": {"id": "user_1"}
        }))
        .unwrap();
        assert_eq!(inbound.trigger_id, "evt_1");
        assert_eq!(inbound.event_type, "clerk/user.deleted");
    }
}
