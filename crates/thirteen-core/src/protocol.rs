//! Wire protocol: inbound commands, outbound messages, and the error
//! taxonomy.
//!
//! Everything on the wire is JSON with a `type` discriminator.  Outbound
//! `game_state` messages are personalized: the recipient sees their own
//! hand in full and everyone else's hand as a count.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cards::{Card, Rank};
use crate::game::{GameState, Phase, TurnPhase};

/// Hard cap on lobby size; larger tables are not supported.
pub const MAX_PLAYERS: usize = 8;

/// Longest accepted display name, after trimming.
pub const MAX_NAME_LEN: usize = 20;

/// Where a draw takes its card from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawSource {
    Pile,
    Discard,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Take a seat in the room's lobby under a display name.
    JoinLobby { room_id: String, player_name: String },

    /// Give up the lobby seat.
    LeaveLobby { room_id: String },

    /// Start a game with everyone currently in the lobby.
    StartGame { room_id: String },

    /// Draw from the face-down pile or the discard pile.
    DrawCard { room_id: String, source: DrawSource },

    /// Discard a card and end the turn.
    DiscardCard { room_id: String, card_id: String },

    /// Discard a card and lay the rest of the hand down.
    GoOut { room_id: String, card_id: String },

    /// Confirm the posted scores and ask for the next deal.
    NextRound { room_id: String },

    /// Tear the game down and reset the room.
    EndGame { room_id: String },
}

/// Derived room status shown in the global lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Empty,
    Gathering,
    InGame,
}

/// One row of the global lobby view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: String,
    pub room_name: String,
    pub status: RoomStatus,
    pub player_count: usize,
    pub max_players: usize,
}

/// A lobby seat: who is waiting for the game to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub id: String,
    pub name: String,
}

/// Public view of a seated player; hands are reduced to a count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPublic {
    pub id: String,
    pub name: String,
    pub cumulative_score: u32,
    pub has_gone_out: bool,
    pub hand_count: usize,
}

/// Personalized snapshot of a running game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateView {
    pub round_number: u8,
    pub wild_rank: Rank,
    pub phase: Phase,
    pub turn_phase: TurnPhase,
    pub current_player_index: usize,
    pub draw_pile_count: usize,
    pub discard_top: Option<Card>,
    pub players: Vec<PlayerPublic>,
    pub your_hand: Vec<Card>,
}

impl GameStateView {
    /// Snapshot `game` as seen by `viewer_id`.
    ///
    /// Copies everything so the message can sit in an outbound queue
    /// without referencing live state.
    pub fn for_player(game: &GameState, viewer_id: &str) -> Self {
        Self {
            round_number: game.round_number,
            wild_rank: game.wild_rank(),
            phase: game.phase,
            turn_phase: game.turn_phase,
            current_player_index: game.current_player_index,
            draw_pile_count: game.draw_pile.len(),
            discard_top: game.discard_pile.last().cloned(),
            players: game
                .players
                .iter()
                .map(|p| PlayerPublic {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    cumulative_score: p.cumulative_score,
                    has_gone_out: p.has_gone_out_this_round,
                    hand_count: p.hand.len(),
                })
                .collect(),
            your_hand: game
                .players
                .iter()
                .find(|p| p.id == viewer_id)
                .map(|p| p.hand.clone())
                .unwrap_or_default(),
        }
    }
}

/// One player's line in the end-of-round results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResultEntry {
    pub player_id: String,
    pub player_name: String,
    pub round_points: u32,
    pub cumulative_score: u32,
    pub penalty_cards: Vec<Card>,
}

/// One row of the final leaderboard, lowest score first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub score: u32,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Fresh summary of every room, pushed to lobby subscribers.
    RoomsUpdate { rooms: Vec<RoomSummary> },

    /// Current roster and status of one room.
    LobbyUpdate {
        players: Vec<LobbyPlayer>,
        status: RoomStatus,
    },

    /// Personalized game snapshot.
    GameState(GameStateView),

    /// Somebody laid their hand down.
    PlayerWentOut { player_name: String },

    /// Scores for the round that just ended.
    RoundOver {
        round_number: u8,
        results: Vec<RoundResultEntry>,
    },

    /// Final standings after round eleven.
    GameFinished { leaderboard: Vec<LeaderboardEntry> },

    /// The game was torn down; clients should return to the lobby view.
    LobbyReset,

    /// Command rejection, sent to the originator only.
    Error { message: String },
}

/// Everything a command can be rejected with.
///
/// Each kind maps onto a stable prefix of the `error.message` field so
/// clients can match on it without a second discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("RoomBusy: a game is already in progress in this room")]
    RoomBusy,

    #[error("RoomFull: the lobby already has the maximum number of players")]
    RoomFull,

    #[error("DuplicateName: that name is already taken in this room")]
    DuplicateName,

    #[error("NotInLobby: you are not part of this room")]
    NotInLobby,

    #[error("NotYourTurn: it is not your turn")]
    NotYourTurn,

    #[error("WrongPhase: {0}")]
    WrongPhase(&'static str),

    #[error("UnknownCard: that card is not in your hand")]
    UnknownCard,

    #[error("InvalidGoOut: the hand does not split into valid sets and runs")]
    InvalidGoOut,

    #[error("EmptyDiscard: the discard pile is empty")]
    EmptyDiscard,

    #[error("MalformedCommand: {0}")]
    MalformedCommand(String),

    /// An invariant broke inside an operation.  Logged server-side; the
    /// room stays usable.
    #[error("Internal: {0}")]
    Internal(String),
}

/// Validate and normalize a display name: trimmed, 1 to 20 characters.
pub fn validate_player_name(name: &str) -> Result<String, GameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(GameError::MalformedCommand(format!(
            "player_name must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}
