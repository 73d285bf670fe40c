use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::entities::{Participant, ParticipantWithUser, PositionType};

/// Anything that occupies a seat in a game. Implemented for both the bare
/// participant row and the user-joined projection so rendering and mutation
/// paths partition through the same code.
pub trait Seat {
    fn position_type(&self) -> PositionType;
    fn position(&self) -> i32;
    fn joined_at(&self) -> DateTime<Utc>;
    fn seat_user_id(&self) -> Option<Uuid>;
}

impl Seat for Participant {
    fn position_type(&self) -> PositionType {
        self.position_type
    }
    fn position(&self) -> i32 {
        self.position
    }
    fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }
    fn seat_user_id(&self) -> Option<Uuid> {
        self.user_id
    }
}

impl Seat for ParticipantWithUser {
    fn position_type(&self) -> PositionType {
        self.position_type
    }
    fn position(&self) -> i32 {
        self.position
    }
    fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }
    fn seat_user_id(&self) -> Option<Uuid> {
        self.user_id
    }
}

/// The single source of truth for participant ordering. Everything downstream
/// (embed rendering, API responses, notification targeting, promotion
/// detection) reads the split from here and nowhere else.
#[derive(Debug, Clone)]
pub struct Partition<T> {
    pub sorted: Vec<T>,
    split: usize,
    pub confirmed_user_ids: Vec<Uuid>,
    pub overflow_user_ids: Vec<Uuid>,
}

impl<T> Partition<T> {
    pub fn confirmed(&self) -> &[T] {
        &self.sorted[..self.split]
    }

    pub fn overflow(&self) -> &[T] {
        &self.sorted[self.split..]
    }
}

/// Sort stable by (position_type, position, joined_at) and split at
/// `max_players`. Placeholders count toward the confirmed cap: excluding
/// them silently shifted real users across the split and broke promotion
/// detection, so the cap is over seats, not over users.
pub fn partition<T: Seat + Clone>(participants: &[T], max_players: i32) -> Partition<T> {
    let mut sorted: Vec<T> = participants.to_vec();
    sorted.sort_by_key(|p| (p.position_type() as i32, p.position(), p.joined_at()));

    let split = (max_players.max(0) as usize).min(sorted.len());

    let confirmed_user_ids = sorted[..split]
        .iter()
        .filter_map(|p| p.seat_user_id())
        .collect();
    let overflow_user_ids = sorted[split..]
        .iter()
        .filter_map(|p| p.seat_user_id())
        .collect();

    Partition {
        sorted,
        split,
        confirmed_user_ids,
        overflow_user_ids,
    }
}

/// Real users who crossed from the waitlist into the confirmed set. Each of
/// these gets a `participant.promoted` event after the mutation commits.
pub fn promotions<T>(old: &Partition<T>, new: &Partition<T>) -> Vec<Uuid> {
    new.confirmed_user_ids
        .iter()
        .filter(|id| old.overflow_user_ids.contains(id))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seat(
        user: Option<Uuid>,
        position_type: PositionType,
        position: i32,
        joined_offset_secs: i64,
    ) -> Participant {
        Participant {
            id: Uuid::now_v7(),
            game_id: Uuid::nil(),
            guild_id: 1,
            user_id: user,
            mention: None,
            position_type,
            position,
            joined_at: DateTime::<Utc>::from_timestamp(1_700_000_000 + joined_offset_secs, 0)
                .unwrap(),
        }
    }

    #[test]
    fn sorts_host_before_cohost_before_regular_before_placeholder() {
        let host = Uuid::new_v4();
        let cohost = Uuid::new_v4();
        let regular = Uuid::new_v4();
        let rows = vec![
            seat(None, PositionType::Placeholder, 0, 0),
            seat(Some(regular), PositionType::Regular, 0, 0),
            seat(Some(host), PositionType::Host, 0, 0),
            seat(Some(cohost), PositionType::Cohost, 0, 0),
        ];

        let p = partition(&rows, 10);
        let order: Vec<PositionType> = p.sorted.iter().map(|s| s.position_type).collect();
        assert_eq!(
            order,
            vec![
                PositionType::Host,
                PositionType::Cohost,
                PositionType::Regular,
                PositionType::Placeholder,
            ]
        );
    }

    #[test]
    fn ties_break_by_position_then_join_time() {
        let early = Uuid::new_v4();
        let late = Uuid::new_v4();
        let rows = vec![
            seat(Some(late), PositionType::Regular, 0, 100),
            seat(Some(early), PositionType::Regular, 0, 5),
        ];

        let p = partition(&rows, 1);
        assert_eq!(p.confirmed_user_ids, vec![early]);
        assert_eq!(p.overflow_user_ids, vec![late]);
    }

    #[test]
    fn placeholders_count_toward_the_confirmed_cap() {
        let alice = Uuid::new_v4();
        let rows = vec![
            seat(None, PositionType::Host, 0, 0),
            seat(None, PositionType::Placeholder, 0, 1),
            seat(Some(alice), PositionType::Regular, 0, 2),
        ];

        // Two seats: host + placeholder fill them; Alice waits.
        let p = partition(&rows, 2);
        assert_eq!(p.confirmed().len(), 2);
        assert_eq!(p.overflow_user_ids, vec![alice]);
        assert!(p.confirmed_user_ids.is_empty());
    }

    #[test]
    fn removing_a_placeholder_promotes_the_user_behind_it() {
        let host = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let before = vec![
            seat(Some(host), PositionType::Host, 0, 0),
            seat(None, PositionType::Placeholder, 0, 1),
            seat(Some(alice), PositionType::Regular, 0, 2),
        ];
        let after = vec![before[0].clone(), before[2].clone()];

        let old = partition(&before, 2);
        let new = partition(&after, 2);
        assert_eq!(promotions(&old, &new), vec![alice]);
    }

    #[test]
    fn placeholder_at_the_front_with_cap_one_yields_one_promotion() {
        let alice = Uuid::new_v4();
        let before = vec![
            seat(None, PositionType::Placeholder, 0, 0),
            seat(Some(alice), PositionType::Regular, 0, 1),
        ];
        let after = vec![before[1].clone()];

        let old = partition(&before, 1);
        let new = partition(&after, 1);
        assert_eq!(promotions(&old, &new), vec![alice]);
    }

    #[test]
    fn raising_max_players_promotes_overflow_users() {
        let host = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let rows = vec![
            seat(Some(host), PositionType::Host, 0, 0),
            seat(None, PositionType::Placeholder, 0, 1),
            seat(Some(alice), PositionType::Regular, 0, 2),
        ];

        let old = partition(&rows, 2);
        let new = partition(&rows, 3);
        assert_eq!(promotions(&old, &new), vec![alice]);
        assert!(new.overflow_user_ids.is_empty());
    }

    #[test]
    fn confirmed_users_never_count_as_promoted() {
        let host = Uuid::new_v4();
        let rows = vec![seat(Some(host), PositionType::Host, 0, 0)];
        let old = partition(&rows, 2);
        let new = partition(&rows, 5);
        assert!(promotions(&old, &new).is_empty());
    }

    #[test]
    fn zero_or_negative_cap_puts_everyone_on_the_waitlist() {
        let alice = Uuid::new_v4();
        let rows = vec![seat(Some(alice), PositionType::Regular, 0, 0)];
        let p = partition(&rows, 0);
        assert!(p.confirmed().is_empty());
        assert_eq!(p.overflow_user_ids, vec![alice]);
    }
}
