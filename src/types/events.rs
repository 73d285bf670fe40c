use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entities::NotificationType;

/// Envelope for every message crossing the bus. `event_id` doubles as the
/// idempotency key: handlers must produce the same end state when the same id
/// is delivered twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub guild_id: i64,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", content = "payload")]
pub enum EventKind {
    #[serde(rename = "game.created")]
    GameCreated { game_id: Uuid },
    #[serde(rename = "game.updated")]
    GameUpdated { game_id: Uuid },
    #[serde(rename = "game.cancelled")]
    GameCancelled { game_id: Uuid },
    #[serde(rename = "game.started")]
    GameStarted { game_id: Uuid },
    #[serde(rename = "game.completed")]
    GameCompleted { game_id: Uuid },
    #[serde(rename = "participant.joined")]
    ParticipantJoined { game_id: Uuid, participant_id: Uuid },
    #[serde(rename = "participant.left")]
    ParticipantLeft { game_id: Uuid, participant_id: Uuid },
    #[serde(rename = "participant.removed")]
    ParticipantRemoved { game_id: Uuid, participant_id: Uuid },
    #[serde(rename = "participant.promoted")]
    ParticipantPromoted { game_id: Uuid, user_id: Uuid },
    #[serde(rename = "notification.due")]
    NotificationDue {
        game_id: Uuid,
        notification_type: NotificationType,
        #[serde(skip_serializing_if = "Option::is_none")]
        offset_minutes: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        participant_id: Option<Uuid>,
    },
}

impl Event {
    pub fn new(guild_id: i64, kind: EventKind) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            guild_id,
            kind,
        }
    }

    /// Topic routing key on the `events` exchange. Identical to the wire
    /// `event_type` tag.
    pub fn routing_key(&self) -> &'static str {
        match self.kind {
            EventKind::GameCreated { .. } => "game.created",
            EventKind::GameUpdated { .. } => "game.updated",
            EventKind::GameCancelled { .. } => "game.cancelled",
            EventKind::GameStarted { .. } => "game.started",
            EventKind::GameCompleted { .. } => "game.completed",
            EventKind::ParticipantJoined { .. } => "participant.joined",
            EventKind::ParticipantLeft { .. } => "participant.left",
            EventKind::ParticipantRemoved { .. } => "participant.removed",
            EventKind::ParticipantPromoted { .. } => "participant.promoted",
            EventKind::NotificationDue { .. } => "notification.due",
        }
    }

    pub fn game_id(&self) -> Uuid {
        match self.kind {
            EventKind::GameCreated { game_id }
            | EventKind::GameUpdated { game_id }
            | EventKind::GameCancelled { game_id }
            | EventKind::GameStarted { game_id }
            | EventKind::GameCompleted { game_id }
            | EventKind::ParticipantJoined { game_id, .. }
            | EventKind::ParticipantLeft { game_id, .. }
            | EventKind::ParticipantRemoved { game_id, .. }
            | EventKind::ParticipantPromoted { game_id, .. }
            | EventKind::NotificationDue { game_id, .. } => game_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_with_tagged_payload() {
        let event = Event::new(
            42,
            EventKind::ParticipantJoined {
                game_id: Uuid::new_v4(),
                participant_id: Uuid::new_v4(),
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "participant.joined");
        assert_eq!(json["guild_id"], 42);
        assert!(json["payload"]["game_id"].is_string());
        assert!(json["event_id"].is_string());

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, event.kind);
        assert_eq!(back.event_id, event.event_id);
    }

    #[test]
    fn routing_key_matches_wire_tag() {
        let event = Event::new(
            1,
            EventKind::NotificationDue {
                game_id: Uuid::new_v4(),
                notification_type: NotificationType::Reminder,
                offset_minutes: Some(60),
                participant_id: None,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], event.routing_key());
        assert_eq!(json["payload"]["offset_minutes"], 60);
        // absent, not null; reminder payloads carry no participant
        assert!(json["payload"].get("participant_id").is_none());
    }
}
