//! Rooms, the fixed room registry, and the lobby fan-out.
//!
//! Exactly ten rooms exist for the lifetime of the process.  Each room
//! owns one [`Mutex`] guarding its full state; every mutation goes through
//! the dispatcher while holding it.  Broadcasts are enqueued under the
//! lock into bounded per-connection queues and drained asynchronously by
//! the socket writers, so a slow client never stalls the room — its queue
//! fills up and the connection is dropped instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thirteen_core::game::GameState;
use thirteen_core::protocol::{
    GameError, GameStateView, LobbyPlayer, MAX_PLAYERS, RoomStatus, RoomSummary, ServerMessage,
    validate_player_name,
};
use tokio::sync::{Mutex, mpsc};

/// Rooms created at startup; the set never changes.
pub const ROOM_COUNT: usize = 10;

/// Outbound frames a connection may have in flight before it is dropped
/// as too slow.
pub const OUTBOUND_QUEUE: usize = 64;

/// Handle to one player's active socket.
///
/// `conn_id` distinguishes a replaced socket from its successor: teardown
/// of a stale connection must not touch the entry of the new one.
struct ConnHandle {
    conn_id: u64,
    tx: mpsc::Sender<ServerMessage>,
}

/// A single game room.
pub struct Room {
    pub room_id: String,
    pub room_name: String,
    /// Players who joined the lobby and are waiting for a game.
    pub lobby_players: Vec<LobbyPlayer>,
    /// Active sockets keyed by player id, one per player.
    connections: HashMap<String, ConnHandle>,
    /// Present exactly while the room status is `in_game`.
    pub game: Option<GameState>,
}

impl Room {
    fn new(index: usize) -> Self {
        Self {
            room_id: format!("room-{index}"),
            room_name: format!("Room {index}"),
            lobby_players: Vec::new(),
            connections: HashMap::new(),
            game: None,
        }
    }

    /// Status derived from roster and game presence.
    pub fn status(&self) -> RoomStatus {
        if self.game.is_some() {
            RoomStatus::InGame
        } else if self.lobby_players.is_empty() {
            RoomStatus::Empty
        } else {
            RoomStatus::Gathering
        }
    }

    /// Seated players during a game, lobby players otherwise.
    pub fn player_count(&self) -> usize {
        match &self.game {
            Some(game) => game.players.len(),
            None => self.lobby_players.len(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id.clone(),
            room_name: self.room_name.clone(),
            status: self.status(),
            player_count: self.player_count(),
            max_players: MAX_PLAYERS,
        }
    }

    /// The running game, or the error every in-game command shares.
    pub fn game_mut(&mut self) -> Result<&mut GameState, GameError> {
        self.game
            .as_mut()
            .ok_or(GameError::WrongPhase("no game in progress"))
    }

    // ── Lobby operations ─────────────────────────────────────────────────

    /// Take a lobby seat.  Joining again under the same player id just
    /// renames the existing seat.
    pub fn join_lobby(&mut self, player_id: &str, raw_name: &str) -> Result<(), GameError> {
        if self.game.is_some() {
            return Err(GameError::RoomBusy);
        }
        let name = validate_player_name(raw_name)?;
        if self
            .lobby_players
            .iter()
            .any(|p| p.id != player_id && p.name.eq_ignore_ascii_case(&name))
        {
            return Err(GameError::DuplicateName);
        }
        if let Some(entry) = self.lobby_players.iter_mut().find(|p| p.id == player_id) {
            entry.name = name;
            return Ok(());
        }
        if self.lobby_players.len() >= MAX_PLAYERS {
            return Err(GameError::RoomFull);
        }
        self.lobby_players.push(LobbyPlayer {
            id: player_id.to_string(),
            name,
        });
        Ok(())
    }

    pub fn leave_lobby(&mut self, player_id: &str) -> Result<(), GameError> {
        if self.game.is_some() {
            return Err(GameError::WrongPhase("the game has already started"));
        }
        let position = self
            .lobby_players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or(GameError::NotInLobby)?;
        self.lobby_players.remove(position);
        Ok(())
    }

    pub fn start_game(&mut self, player_id: &str) -> Result<(), GameError> {
        if self.game.is_some() {
            return Err(GameError::RoomBusy);
        }
        if !self.lobby_players.iter().any(|p| p.id == player_id) {
            return Err(GameError::NotInLobby);
        }
        self.game = Some(GameState::start(&self.lobby_players)?);
        Ok(())
    }

    /// Tear the game down and empty the room; players re-join from the
    /// main lobby.
    pub fn end_game(&mut self, player_id: &str) -> Result<(), GameError> {
        let game = self
            .game
            .as_ref()
            .ok_or(GameError::WrongPhase("no game to end"))?;
        if !game.players.iter().any(|p| p.id == player_id) {
            return Err(GameError::NotInLobby);
        }
        self.game = None;
        self.lobby_players.clear();
        Ok(())
    }

    // ── Connection registry ──────────────────────────────────────────────

    /// Bind a socket to a player id, replacing any previous one
    /// (last-writer-wins).  Dropping the old handle closes the old
    /// socket's writer.  Returns true when a connection was replaced.
    pub fn register(&mut self, player_id: &str, conn_id: u64, tx: mpsc::Sender<ServerMessage>) -> bool {
        self.connections
            .insert(player_id.to_string(), ConnHandle { conn_id, tx })
            .is_some()
    }

    /// Whether this conn id still owns the player's registry entry.
    pub fn is_active_conn(&self, player_id: &str, conn_id: u64) -> bool {
        self.connections
            .get(player_id)
            .is_some_and(|c| c.conn_id == conn_id)
    }

    /// Tear down a closed connection.  While the room is still gathering
    /// the player's lobby seat goes with it; in-game seats are never
    /// touched.  Returns true when the registry entry matched.
    pub fn disconnect(&mut self, player_id: &str, conn_id: u64) -> bool {
        if !self.is_active_conn(player_id, conn_id) {
            return false;
        }
        self.connections.remove(player_id);
        if self.game.is_none()
            && let Some(position) = self.lobby_players.iter().position(|p| p.id == player_id)
        {
            self.lobby_players.remove(position);
            let update = self.lobby_update();
            self.broadcast(&update);
        }
        true
    }

    // ── Messaging ────────────────────────────────────────────────────────

    /// Send to one connection, but only if it is still the active socket
    /// for the player.
    pub fn send_to_conn(&mut self, player_id: &str, conn_id: u64, msg: ServerMessage) {
        let dead = match self.connections.get(player_id) {
            Some(conn) if conn.conn_id == conn_id => conn.tx.try_send(msg).is_err(),
            _ => false,
        };
        if dead {
            self.drop_dead(vec![player_id.to_string()]);
        }
    }

    /// Enqueue a message for every connection in this room.
    pub fn broadcast(&mut self, msg: &ServerMessage) {
        let mut dead = Vec::new();
        for (player_id, conn) in &self.connections {
            if conn.tx.try_send(msg.clone()).is_err() {
                dead.push(player_id.clone());
            }
        }
        self.drop_dead(dead);
    }

    /// Enqueue a personalized `game_state` snapshot for every connection.
    pub fn broadcast_game_state(&mut self) {
        let Some(game) = &self.game else {
            return;
        };
        let mut dead = Vec::new();
        for (player_id, conn) in &self.connections {
            let view = GameStateView::for_player(game, player_id);
            if conn.tx.try_send(ServerMessage::GameState(view)).is_err() {
                dead.push(player_id.clone());
            }
        }
        self.drop_dead(dead);
    }

    pub fn lobby_update(&self) -> ServerMessage {
        ServerMessage::LobbyUpdate {
            players: self.lobby_players.clone(),
            status: self.status(),
        }
    }

    fn drop_dead(&mut self, dead: Vec<String>) {
        for player_id in dead {
            self.connections.remove(&player_id);
            tracing::warn!(room = %self.room_id, player = %player_id, "dropping unresponsive connection");
        }
    }
}

/// Registry of the ten fixed rooms plus the global lobby fan-out.
pub struct RoomManager {
    rooms: Vec<(String, Arc<Mutex<Room>>)>,
    pub lobby: LobbyHub,
    next_conn_id: AtomicU64,
}

impl RoomManager {
    pub fn new() -> Self {
        let rooms = (1..=ROOM_COUNT)
            .map(|index| {
                let room = Room::new(index);
                (room.room_id.clone(), Arc::new(Mutex::new(room)))
            })
            .collect();
        Self {
            rooms,
            lobby: LobbyHub::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn room(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms
            .iter()
            .find(|(id, _)| id == room_id)
            .map(|(_, room)| Arc::clone(room))
    }

    /// Snapshot every room's summary, in room order.
    pub async fn summaries(&self) -> Vec<RoomSummary> {
        let mut out = Vec::with_capacity(self.rooms.len());
        for (_, room) in &self.rooms {
            out.push(room.lock().await.summary());
        }
        out
    }

    /// Push a fresh `rooms_update` to every lobby subscriber.
    ///
    /// Locks each room in turn; callers must not hold any room lock.
    pub async fn publish_rooms(&self) {
        let rooms = self.summaries().await;
        self.lobby
            .publish(ServerMessage::RoomsUpdate { rooms })
            .await;
    }
}

/// Fan-out to `/ws/lobby` subscribers.
pub struct LobbyHub {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<ServerMessage>>>,
    next_id: AtomicU64,
}

impl LobbyHub {
    fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn subscribe(&self) -> (u64, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().await.insert(id, tx);
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().await.remove(&id);
    }

    /// Deliver to every subscriber, silently dropping the slow and the
    /// disconnected.
    pub async fn publish(&self, msg: ServerMessage) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|_, tx| tx.try_send(msg.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gathering_room() -> Room {
        let mut room = Room::new(1);
        room.join_lobby("p1", "Ada").unwrap();
        room.join_lobby("p2", "Bo").unwrap();
        room
    }

    #[test]
    fn status_is_derived() {
        let mut room = Room::new(1);
        assert_eq!(room.status(), RoomStatus::Empty);
        room.join_lobby("p1", "Ada").unwrap();
        assert_eq!(room.status(), RoomStatus::Gathering);
        room.join_lobby("p2", "Bo").unwrap();
        room.start_game("p1").unwrap();
        assert_eq!(room.status(), RoomStatus::InGame);
        assert_eq!(room.player_count(), 2);
        room.end_game("p1").unwrap();
        assert_eq!(room.status(), RoomStatus::Empty);
        assert!(room.lobby_players.is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let mut room = Room::new(1);
        room.join_lobby("p1", "Ada").unwrap();
        assert_eq!(room.join_lobby("p2", "ada"), Err(GameError::DuplicateName));
        assert_eq!(room.join_lobby("p2", " ADA "), Err(GameError::DuplicateName));
        room.join_lobby("p2", "Bo").unwrap();
        // Same player id may rename their own seat.
        room.join_lobby("p1", "Ada Lovelace").unwrap();
        assert_eq!(room.lobby_players[0].name, "Ada Lovelace");
        assert_eq!(room.lobby_players.len(), 2);
    }

    #[test]
    fn lobby_is_capped_at_eight() {
        let mut room = Room::new(1);
        for i in 0..MAX_PLAYERS {
            room.join_lobby(&format!("p{i}"), &format!("Player {i}")).unwrap();
        }
        assert_eq!(
            room.join_lobby("late", "Latecomer"),
            Err(GameError::RoomFull)
        );
    }

    #[test]
    fn start_needs_a_quorum_and_no_running_game() {
        let mut room = Room::new(1);
        room.join_lobby("p1", "Ada").unwrap();
        assert!(matches!(
            room.start_game("p1"),
            Err(GameError::WrongPhase(_))
        ));
        room.join_lobby("p2", "Bo").unwrap();
        assert_eq!(room.start_game("stranger"), Err(GameError::NotInLobby));
        room.start_game("p1").unwrap();
        assert_eq!(room.start_game("p2"), Err(GameError::RoomBusy));
        assert_eq!(room.join_lobby("p3", "Cy"), Err(GameError::RoomBusy));
    }

    #[test]
    fn second_connect_replaces_the_first() {
        let mut room = gathering_room();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        assert!(!room.register("p1", 1, tx_a));
        assert!(room.register("p1", 2, tx_b));
        assert!(!room.is_active_conn("p1", 1));
        assert!(room.is_active_conn("p1", 2));

        room.broadcast(&ServerMessage::LobbyReset);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), ServerMessage::LobbyReset);

        // Teardown of the stale socket must not disturb the new entry or
        // the lobby seat.
        assert!(!room.disconnect("p1", 1));
        assert!(room.is_active_conn("p1", 2));
        assert_eq!(room.lobby_players.len(), 2);
    }

    #[test]
    fn disconnect_while_gathering_frees_the_seat() {
        let mut room = gathering_room();
        let (tx, _rx) = mpsc::channel(4);
        room.register("p1", 1, tx);
        assert!(room.disconnect("p1", 1));
        assert_eq!(room.lobby_players.len(), 1);
        assert_eq!(room.lobby_players[0].id, "p2");
    }

    #[test]
    fn disconnect_during_game_keeps_the_seat() {
        let mut room = gathering_room();
        room.start_game("p1").unwrap();
        let (tx, _rx) = mpsc::channel(4);
        room.register("p1", 1, tx);
        assert!(room.disconnect("p1", 1));
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.players.len(), 2);
    }

    #[test]
    fn slow_connection_is_dropped_on_overflow() {
        let mut room = gathering_room();
        let (tx, _rx) = mpsc::channel(1);
        room.register("p1", 1, tx);
        room.broadcast(&ServerMessage::LobbyReset); // fills the queue
        assert!(room.is_active_conn("p1", 1));
        room.broadcast(&ServerMessage::LobbyReset); // overflows it
        assert!(!room.is_active_conn("p1", 1));
    }

    #[test]
    fn personalized_broadcast_reaches_every_connection() {
        let mut room = gathering_room();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        room.register("p1", 1, tx1);
        room.register("p2", 2, tx2);
        room.start_game("p1").unwrap();
        room.broadcast_game_state();

        for (rx, id) in [(&mut rx1, "p1"), (&mut rx2, "p2")] {
            let ServerMessage::GameState(view) = rx.try_recv().unwrap() else {
                panic!("expected a game_state message");
            };
            assert_eq!(view.your_hand.len(), 3);
            assert_eq!(view.players.iter().filter(|p| p.id == id).count(), 1);
        }
    }

    #[tokio::test]
    async fn ten_rooms_are_preseeded() {
        let manager = RoomManager::new();
        assert!(manager.room("room-1").is_some());
        assert!(manager.room("room-10").is_some());
        assert!(manager.room("room-11").is_none());
        assert!(manager.room("lobby").is_none());

        let summaries = manager.summaries().await;
        assert_eq!(summaries.len(), ROOM_COUNT);
        assert_eq!(summaries[0].room_id, "room-1");
        assert_eq!(summaries[9].room_id, "room-10");
        assert!(summaries.iter().all(|s| s.status == RoomStatus::Empty));
        assert!(summaries.iter().all(|s| s.max_players == MAX_PLAYERS));
    }

    #[tokio::test]
    async fn lobby_hub_delivers_and_prunes() {
        let hub = LobbyHub::new();
        let (id_a, mut rx_a) = hub.subscribe().await;
        let (_id_b, rx_b) = hub.subscribe().await;
        drop(rx_b); // subscriber went away without unsubscribing

        hub.publish(ServerMessage::LobbyReset).await;
        assert_eq!(rx_a.recv().await.unwrap(), ServerMessage::LobbyReset);

        hub.unsubscribe(id_a).await;
        hub.publish(ServerMessage::LobbyReset).await;
        assert!(rx_a.try_recv().is_err());
    }
}
