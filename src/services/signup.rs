use sqlx::PgPool;
use uuid::Uuid;

use crate::bus::Publisher;
use crate::db::{queries, GuildScope};
use crate::error::ApiError;
use crate::services::{ordering, schedule};
use crate::types::entities::{GameStatus, Participant, PositionType, SignupMethod, User};
use crate::types::events::{Event, EventKind};

/// Self-signup join. One code path for the HTTP endpoint and the chat
/// button; both get the same conflict semantics. A full game still accepts
/// the join; the seat lands on the waitlist.
pub async fn join_game(
    db: &PgPool,
    publisher: &Publisher,
    guild_id: i64,
    game_id: Uuid,
    user: &User,
) -> Result<Participant, ApiError> {
    let mut scope = GuildScope::begin(db, guild_id).await?;

    let game = queries::get_game(scope.conn(), game_id)
        .await?
        .ok_or(ApiError::NotFound("Game"))?;

    if game.status != GameStatus::Scheduled {
        return Err(ApiError::conflict("signup_closed", "This game is no longer open"));
    }
    if game.signup_method == SignupMethod::HostSelected {
        return Err(ApiError::conflict(
            "signup_closed",
            "The host picks players for this game",
        ));
    }
    if queries::get_participant_for_user(scope.conn(), game_id, user.id)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict("already_joined", "You already joined this game"));
    }

    let participant = queries::insert_participant(
        scope.conn(),
        Uuid::now_v7(),
        game_id,
        guild_id,
        Some(user.id),
        None,
        PositionType::Regular,
        0,
    )
    .await?;

    schedule::schedule_join_notification(scope.conn(), &game, participant.id).await?;
    scope.commit().await?;

    publisher
        .publish(&Event::new(
            guild_id,
            EventKind::ParticipantJoined {
                game_id,
                participant_id: participant.id,
            },
        ))
        .await?;

    Ok(participant)
}

pub async fn leave_game(
    db: &PgPool,
    publisher: &Publisher,
    guild_id: i64,
    game_id: Uuid,
    user: &User,
) -> Result<(), ApiError> {
    let mut scope = GuildScope::begin(db, guild_id).await?;

    let game = queries::get_game(scope.conn(), game_id)
        .await?
        .ok_or(ApiError::NotFound("Game"))?;
    let participant = queries::get_participant_for_user(scope.conn(), game_id, user.id)
        .await?
        .ok_or(ApiError::NotFound("Participant"))?;

    if participant.position_type == PositionType::Host {
        return Err(ApiError::conflict(
            "host_cannot_leave",
            "The host cannot leave their own game",
        ));
    }

    let before = queries::get_participants(scope.conn(), game_id).await?;
    queries::delete_participant(scope.conn(), participant.id).await?;
    let after = queries::get_participants(scope.conn(), game_id).await?;
    scope.commit().await?;

    publisher
        .publish(&Event::new(
            guild_id,
            EventKind::ParticipantLeft {
                game_id,
                participant_id: participant.id,
            },
        ))
        .await?;

    publish_promotions(publisher, guild_id, game_id, &before, &after, game.max_players, game.max_players)
        .await?;

    Ok(())
}

/// Host-side removal of any non-host seat, placeholder or real user.
pub async fn remove_participant(
    db: &PgPool,
    publisher: &Publisher,
    guild_id: i64,
    game_id: Uuid,
    participant_id: Uuid,
) -> Result<(), ApiError> {
    let mut scope = GuildScope::begin(db, guild_id).await?;

    let game = queries::get_game(scope.conn(), game_id)
        .await?
        .ok_or(ApiError::NotFound("Game"))?;
    let participant = queries::get_participant(scope.conn(), participant_id)
        .await?
        .filter(|p| p.game_id == game_id)
        .ok_or(ApiError::NotFound("Participant"))?;

    if participant.position_type == PositionType::Host {
        return Err(ApiError::conflict(
            "host_cannot_leave",
            "Transfer the host seat before removing it",
        ));
    }

    let before = queries::get_participants(scope.conn(), game_id).await?;
    queries::delete_participant(scope.conn(), participant_id).await?;
    let after = queries::get_participants(scope.conn(), game_id).await?;
    scope.commit().await?;

    publisher
        .publish(&Event::new(
            guild_id,
            EventKind::ParticipantRemoved {
                game_id,
                participant_id,
            },
        ))
        .await?;

    publish_promotions(publisher, guild_id, game_id, &before, &after, game.max_players, game.max_players)
        .await?;

    Ok(())
}

/// Compare the partition before and after a mutation and publish one
/// `participant.promoted` per user who crossed into the confirmed set. The
/// callers pass the raw row lists; the partition function is the only place
/// that decides who sits where.
pub async fn publish_promotions(
    publisher: &Publisher,
    guild_id: i64,
    game_id: Uuid,
    before: &[Participant],
    after: &[Participant],
    old_max_players: i32,
    new_max_players: i32,
) -> Result<(), ApiError> {
    let old = ordering::partition(before, old_max_players);
    let new = ordering::partition(after, new_max_players);

    for user_id in ordering::promotions(&old, &new) {
        publisher
            .publish(&Event::new(
                guild_id,
                EventKind::ParticipantPromoted { game_id, user_id },
            ))
            .await?;
    }
    Ok(())
}
