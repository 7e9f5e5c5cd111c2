//! WebSocket handlers for the Three Thirteen server.
//!
//! Two kinds of sockets exist:
//!
//! 1. `/ws/lobby` — a read-only feed.  The server sends one `rooms_update`
//!    on open and a fresh one whenever any room changes; inbound frames
//!    are ignored.
//! 2. `/ws/room/{room_id}?player_id=…` — a game connection.  Inbound
//!    frames are decoded into [`ClientCommand`]s and applied under the
//!    room lock; outbound messages drain through a bounded per-connection
//!    queue.  A second connect under the same player id replaces (and
//!    closes) the first.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use thirteen_core::game::{NextRoundOutcome, TurnFlow};
use thirteen_core::protocol::{ClientCommand, GameError, ServerMessage};
use tokio::sync::{Mutex, mpsc};

use crate::AppState;
use crate::room::{OUTBOUND_QUEUE, Room, RoomManager};

/// `GET /ws/lobby` — upgrade into the read-only room-list feed.
pub async fn lobby_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_lobby_socket(socket, state.rooms))
}

async fn handle_lobby_socket(socket: WebSocket, manager: Arc<RoomManager>) {
    let (mut sink, mut stream) = socket.split();
    let (sub_id, mut rx) = manager.lobby.subscribe().await;

    let initial = ServerMessage::RoomsUpdate {
        rooms: manager.summaries().await,
    };
    if send_json(&mut sink, &initial).await.is_err() {
        manager.lobby.unsubscribe(sub_id).await;
        return;
    }

    loop {
        tokio::select! {
            update = rx.recv() => {
                match update {
                    Some(msg) => {
                        if send_json(&mut sink, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            frame = stream.next() => {
                // The lobby feed accepts no client messages.
                match frame {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
    manager.lobby.unsubscribe(sub_id).await;
}

/// Query half of the room socket URL.
#[derive(Deserialize)]
pub struct RoomWsParams {
    pub player_id: String,
}

/// `GET /ws/room/{room_id}?player_id={id}` — upgrade and bind to a room.
pub async fn room_ws(
    Path(room_id): Path<String>,
    Query(params): Query<RoomWsParams>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(room) = state.rooms.room(&room_id) else {
        return (StatusCode::NOT_FOUND, "unknown room").into_response();
    };
    if params.player_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "player_id is required").into_response();
    }
    ws.on_upgrade(move |socket| {
        handle_room_socket(socket, state.rooms, room, room_id, params.player_id)
    })
    .into_response()
}

/// Drive a single room connection from registration to teardown.
async fn handle_room_socket(
    socket: WebSocket,
    manager: Arc<RoomManager>,
    room_arc: Arc<Mutex<Room>>,
    room_id: String,
    player_id: String,
) {
    let conn_id = manager.next_conn_id();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);
    {
        let mut room = room_arc.lock().await;
        if room.register(&player_id, conn_id, tx) {
            tracing::info!(room = %room_id, player = %player_id, "replaced existing connection");
        }
    }
    tracing::info!(room = %room_id, player = %player_id, "connected");

    let (mut sink, mut stream) = socket.split();

    // Writer: drain the bounded queue into the socket.  The queue closes
    // when the registry entry is dropped (replacement or teardown), which
    // in turn closes the socket.
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Reader: decode commands and run them against the room.
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let command: ClientCommand = match serde_json::from_str(&text) {
                    Ok(command) => command,
                    Err(err) => {
                        let error = GameError::MalformedCommand(err.to_string());
                        let mut room = room_arc.lock().await;
                        room.send_to_conn(
                            &player_id,
                            conn_id,
                            ServerMessage::Error {
                                message: error.to_string(),
                            },
                        );
                        continue;
                    }
                };
                if !process_command(&manager, &room_arc, &player_id, conn_id, command).await {
                    // This socket was replaced; stop reading from it.
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    write_handle.abort();
    let roster_changed = {
        let mut room = room_arc.lock().await;
        let before = (room.status(), room.player_count());
        let removed = room.disconnect(&player_id, conn_id);
        removed && before != (room.status(), room.player_count())
    };
    if roster_changed {
        manager.publish_rooms().await;
    }
    tracing::info!(room = %room_id, player = %player_id, "disconnected");
}

/// Run one command under the room lock and fan out the results.
///
/// Returns false when this connection is no longer the active socket for
/// its player id, telling the reader to stop.
async fn process_command(
    manager: &Arc<RoomManager>,
    room_arc: &Arc<Mutex<Room>>,
    player_id: &str,
    conn_id: u64,
    command: ClientCommand,
) -> bool {
    let mut room = room_arc.lock().await;
    if !room.is_active_conn(player_id, conn_id) {
        return false;
    }
    let before = (room.status(), room.player_count());

    if let Err(error) = apply_command(&mut room, player_id, command) {
        if let GameError::Internal(detail) = &error {
            tracing::error!(room = %room.room_id, player = %player_id, %detail, "command aborted");
        }
        room.send_to_conn(
            player_id,
            conn_id,
            ServerMessage::Error {
                message: error.to_string(),
            },
        );
    }

    let dirty = before != (room.status(), room.player_count());
    drop(room);
    if dirty {
        // Locks every room; must run with this room's lock released.
        manager.publish_rooms().await;
    }
    true
}

/// Apply one command to the room.  Rejections leave the room untouched
/// and are reported to the originator only; successes enqueue the
/// resulting broadcasts before the lock is released.
fn apply_command(
    room: &mut Room,
    player_id: &str,
    command: ClientCommand,
) -> Result<(), GameError> {
    match command {
        ClientCommand::JoinLobby { player_name, .. } => {
            room.join_lobby(player_id, &player_name)?;
            tracing::info!(room = %room.room_id, player = %player_id, "joined lobby");
            let update = room.lobby_update();
            room.broadcast(&update);
            Ok(())
        }

        ClientCommand::LeaveLobby { .. } => {
            room.leave_lobby(player_id)?;
            tracing::info!(room = %room.room_id, player = %player_id, "left lobby");
            let update = room.lobby_update();
            room.broadcast(&update);
            Ok(())
        }

        ClientCommand::StartGame { .. } => {
            room.start_game(player_id)?;
            let seats = room.player_count();
            tracing::info!(room = %room.room_id, players = seats, "game started");
            let update = room.lobby_update();
            room.broadcast(&update);
            room.broadcast_game_state();
            Ok(())
        }

        ClientCommand::DrawCard { source, .. } => {
            room.game_mut()?.draw(player_id, source)?;
            room.broadcast_game_state();
            Ok(())
        }

        ClientCommand::DiscardCard { card_id, .. } => {
            let flow = room.game_mut()?.discard(player_id, &card_id)?;
            room.broadcast_game_state();
            if flow == TurnFlow::RoundOver
                && let Some(game) = &room.game
            {
                let message = ServerMessage::RoundOver {
                    round_number: game.round_number,
                    results: game.round_results.clone(),
                };
                room.broadcast(&message);
            }
            Ok(())
        }

        ClientCommand::GoOut { card_id, .. } => {
            let game = room.game_mut()?;
            game.go_out(player_id, &card_id)?;
            let player_name = game
                .players
                .iter()
                .find(|p| p.id == player_id)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            tracing::info!(room = %room.room_id, player = %player_id, "went out");
            room.broadcast(&ServerMessage::PlayerWentOut { player_name });
            room.broadcast_game_state();
            Ok(())
        }

        ClientCommand::NextRound { .. } => {
            let outcome = room.game_mut()?.confirm_next_round(player_id)?;
            room.broadcast_game_state();
            if outcome == NextRoundOutcome::Finished
                && let Some(game) = &room.game
            {
                tracing::info!(room = %room.room_id, "game finished");
                let message = ServerMessage::GameFinished {
                    leaderboard: game.leaderboard.clone(),
                };
                room.broadcast(&message);
            }
            Ok(())
        }

        ClientCommand::EndGame { .. } => {
            room.end_game(player_id)?;
            tracing::info!(room = %room.room_id, player = %player_id, "game ended");
            room.broadcast(&ServerMessage::LobbyReset);
            let update = room.lobby_update();
            room.broadcast(&update);
            Ok(())
        }
    }
}

/// Send a single message directly on a raw socket sink (used by the lobby
/// feed, which has no per-connection queue).
async fn send_json(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(_) => Ok(()),
    }
}
