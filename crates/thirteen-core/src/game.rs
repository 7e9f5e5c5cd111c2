//! The per-room game state machine.
//!
//! This module is transport-agnostic — it knows nothing about sockets,
//! channels, or serialization.  The server invokes one operation per
//! accepted command while holding the room lock; an operation either fully
//! succeeds or returns a [`GameError`] without touching any state.

use rand::RngExt;
use rand::rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::cards::{self, Card, FINAL_ROUND, Rank};
use crate::meld;
use crate::protocol::{
    DrawSource, GameError, LeaderboardEntry, LobbyPlayer, MAX_PLAYERS, RoundResultEntry,
};

/// Fewest players a game can start with.
pub const MIN_PLAYERS: usize = 2;

/// A seated player.  Seating order is fixed at game start.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub hand: Vec<Card>,
    pub cumulative_score: u32,
    pub has_gone_out_this_round: bool,
    pub next_round_confirmed: bool,
}

impl Player {
    fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            hand: Vec::new(),
            cumulative_score: 0,
            has_gone_out_this_round: false,
            next_round_confirmed: false,
        }
    }
}

/// Hand phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Normal turns; nobody has gone out yet.
    Playing,
    /// Someone went out; the remaining players each get one last turn.
    FinalTurns,
    /// Scores are posted; waiting for every player to confirm.
    RoundOver,
    /// All eleven rounds played; the leaderboard is final.
    Finished,
}

/// Where the current player is within their turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Draw,
    Discard,
}

/// What a successful discard did to the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnFlow {
    /// Play moves on to the next player.
    Continue,
    /// The last final turn finished; scores are posted.
    RoundOver,
}

/// What a `next_round` confirmation did to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRoundOutcome {
    /// Recorded; other players still have to confirm.
    Waiting,
    /// Everyone confirmed; a fresh round was dealt.
    NewRound,
    /// Everyone confirmed after round eleven; the game is over.
    Finished,
}

/// Server-side state of one running game.
#[derive(Debug)]
pub struct GameState {
    pub round_number: u8,
    pub players: Vec<Player>,
    pub dealer_index: usize,
    pub current_player_index: usize,
    pub turn_phase: TurnPhase,
    pub draw_pile: Vec<Card>,
    /// Last element is the face-up top.
    pub discard_pile: Vec<Card>,
    pub phase: Phase,
    pub went_out_player_id: Option<String>,
    pub final_turns_remaining: usize,
    pub round_results: Vec<RoundResultEntry>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl GameState {
    /// Start a fresh game from a lobby roster.
    ///
    /// Seating order is randomized and the dealer drawn uniformly; round
    /// one is dealt immediately.
    pub fn start(roster: &[LobbyPlayer]) -> Result<Self, GameError> {
        if roster.len() < MIN_PLAYERS || roster.len() > MAX_PLAYERS {
            return Err(GameError::WrongPhase("a game needs 2 to 8 players"));
        }
        let mut players: Vec<Player> = roster
            .iter()
            .map(|entry| Player::new(&entry.id, &entry.name))
            .collect();
        let mut rng = rng();
        players.shuffle(&mut rng);
        let dealer_index = rng.random_range(0..players.len());

        let mut game = Self {
            round_number: 1,
            players,
            dealer_index,
            current_player_index: 0,
            turn_phase: TurnPhase::Draw,
            draw_pile: Vec::new(),
            discard_pile: Vec::new(),
            phase: Phase::Playing,
            went_out_player_id: None,
            final_turns_remaining: 0,
            round_results: Vec::new(),
            leaderboard: Vec::new(),
        };
        game.deal_round();
        Ok(game)
    }

    /// The wild rank of the current round.
    pub fn wild_rank(&self) -> Rank {
        cards::wild_rank(self.round_number)
    }

    /// Id of the player whose turn it is.
    pub fn current_player_id(&self) -> &str {
        &self.players[self.current_player_index].id
    }

    /// Total cards across hands and piles; always equals the composite
    /// deck size.
    pub fn total_cards(&self) -> usize {
        self.players.iter().map(|p| p.hand.len()).sum::<usize>()
            + self.draw_pile.len()
            + self.discard_pile.len()
    }

    /// Draw one card from the chosen source into the current player's hand.
    pub fn draw(&mut self, player_id: &str, source: DrawSource) -> Result<(), GameError> {
        let seat = self.ensure_turn(player_id, TurnPhase::Draw)?;
        let card = match source {
            DrawSource::Pile => {
                if self.draw_pile.is_empty() {
                    self.recycle_discard()?;
                }
                self.draw_pile
                    .pop()
                    .ok_or_else(|| GameError::Internal("draw pile empty after recycling".into()))?
            }
            DrawSource::Discard => self.discard_pile.pop().ok_or(GameError::EmptyDiscard)?,
        };
        self.players[seat].hand.push(card);
        self.turn_phase = TurnPhase::Discard;
        Ok(())
    }

    /// Discard a card and end the current player's turn.
    ///
    /// During final turns a hand that fully melds after the discard scores
    /// zero for the round, without taking over `went_out_player_id`.
    pub fn discard(&mut self, player_id: &str, card_id: &str) -> Result<TurnFlow, GameError> {
        let seat = self.ensure_turn(player_id, TurnPhase::Discard)?;
        let hand = &mut self.players[seat].hand;
        let index = hand
            .iter()
            .position(|c| c.id == card_id)
            .ok_or(GameError::UnknownCard)?;
        let card = hand.remove(index);
        self.discard_pile.push(card);

        if self.phase == Phase::FinalTurns {
            let wild = self.wild_rank();
            let player = &mut self.players[seat];
            if !player.has_gone_out_this_round && meld::can_go_out(&player.hand, wild) {
                player.has_gone_out_this_round = true;
            }
            self.final_turns_remaining -= 1;
            if self.final_turns_remaining == 0 {
                self.score_round();
                return Ok(TurnFlow::RoundOver);
            }
        }
        self.advance_turn();
        Ok(TurnFlow::Continue)
    }

    /// Go out: discard the nominated card and lay down the rest.
    ///
    /// On a failed validation nothing changes — the player stays in the
    /// discard phase and may retry or discard normally.
    pub fn go_out(&mut self, player_id: &str, card_id: &str) -> Result<(), GameError> {
        let seat = self.ensure_turn(player_id, TurnPhase::Discard)?;
        if self.phase != Phase::Playing {
            return Err(GameError::WrongPhase("someone has already gone out"));
        }
        let hand = &self.players[seat].hand;
        let index = hand
            .iter()
            .position(|c| c.id == card_id)
            .ok_or(GameError::UnknownCard)?;
        let mut rest = hand.clone();
        rest.remove(index);
        if !meld::can_go_out(&rest, self.wild_rank()) {
            return Err(GameError::InvalidGoOut);
        }

        let card = self.players[seat].hand.remove(index);
        self.discard_pile.push(card);
        let player = &mut self.players[seat];
        player.has_gone_out_this_round = true;
        self.went_out_player_id = Some(player.id.clone());
        self.final_turns_remaining = self.players.len() - 1;
        self.phase = Phase::FinalTurns;
        self.advance_turn();
        Ok(())
    }

    /// Record one player's confirmation to continue past `round_over`.
    pub fn confirm_next_round(&mut self, player_id: &str) -> Result<NextRoundOutcome, GameError> {
        if self.phase != Phase::RoundOver {
            return Err(GameError::WrongPhase("the round is still in progress"));
        }
        let seat = self.seat_of(player_id)?;
        self.players[seat].next_round_confirmed = true;
        if self.players.iter().any(|p| !p.next_round_confirmed) {
            return Ok(NextRoundOutcome::Waiting);
        }

        if self.round_number >= FINAL_ROUND {
            self.phase = Phase::Finished;
            self.leaderboard = self.build_leaderboard();
            return Ok(NextRoundOutcome::Finished);
        }
        self.round_number += 1;
        self.dealer_index = (self.dealer_index + 1) % self.players.len();
        self.deal_round();
        Ok(NextRoundOutcome::NewRound)
    }

    /// Deal the current round from a fresh composite deck.
    fn deal_round(&mut self) {
        let n = self.players.len();
        let deal = cards::deal_size(self.round_number);
        let mut deck = cards::shuffled_deck(n);

        for player in &mut self.players {
            player.hand.clear();
            player.has_gone_out_this_round = false;
            player.next_round_confirmed = false;
        }
        // One card at a time, clockwise from the dealer's left.
        for _ in 0..deal {
            for offset in 1..=n {
                let seat = (self.dealer_index + offset) % n;
                self.players[seat].hand.push(deck.pop().unwrap());
            }
        }
        self.discard_pile = vec![deck.pop().unwrap()];
        self.draw_pile = deck;
        self.current_player_index = (self.dealer_index + 1) % n;
        self.turn_phase = TurnPhase::Draw;
        self.phase = Phase::Playing;
        self.went_out_player_id = None;
        self.final_turns_remaining = 0;
        self.round_results.clear();
    }

    /// Shuffle everything but the top discard back into the draw pile.
    fn recycle_discard(&mut self) -> Result<(), GameError> {
        let Some(top) = self.discard_pile.pop() else {
            return Err(GameError::Internal(
                "draw and discard piles are both exhausted".into(),
            ));
        };
        self.draw_pile.append(&mut self.discard_pile);
        self.discard_pile.push(top);
        let mut rng = rng();
        self.draw_pile.shuffle(&mut rng);
        Ok(())
    }

    /// Post scores and move to `round_over`.
    fn score_round(&mut self) {
        self.phase = Phase::RoundOver;
        let wild = self.wild_rank();
        let mut results = Vec::with_capacity(self.players.len());
        for player in &mut self.players {
            let (round_points, penalty_cards) = if player.has_gone_out_this_round {
                (0, Vec::new())
            } else {
                let partition = meld::penalty_partition(&player.hand, wild);
                (partition.points, partition.penalty_cards)
            };
            player.cumulative_score += round_points;
            results.push(RoundResultEntry {
                player_id: player.id.clone(),
                player_name: player.name.clone(),
                round_points,
                cumulative_score: player.cumulative_score,
                penalty_cards,
            });
        }
        self.round_results = results;
    }

    /// Final standings, lowest score first; ties keep seating order.
    fn build_leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .players
            .iter()
            .map(|p| LeaderboardEntry {
                id: p.id.clone(),
                name: p.name.clone(),
                score: p.cumulative_score,
            })
            .collect();
        entries.sort_by_key(|e| e.score);
        entries
    }

    fn advance_turn(&mut self) {
        self.current_player_index = (self.current_player_index + 1) % self.players.len();
        self.turn_phase = TurnPhase::Draw;
    }

    fn seat_of(&self, player_id: &str) -> Result<usize, GameError> {
        self.players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or(GameError::NotInLobby)
    }

    /// Common guards for in-turn commands.
    fn ensure_turn(&self, player_id: &str, want: TurnPhase) -> Result<usize, GameError> {
        if !matches!(self.phase, Phase::Playing | Phase::FinalTurns) {
            return Err(GameError::WrongPhase("no hand is in progress"));
        }
        let seat = self.seat_of(player_id)?;
        if seat != self.current_player_index {
            return Err(GameError::NotYourTurn);
        }
        if self.turn_phase != want {
            return Err(match want {
                TurnPhase::Draw => GameError::WrongPhase("you have already drawn this turn"),
                TurnPhase::Discard => GameError::WrongPhase("draw a card first"),
            });
        }
        Ok(seat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::Suit;

    fn roster(n: usize) -> Vec<LobbyPlayer> {
        (1..=n)
            .map(|i| LobbyPlayer {
                id: format!("p{i}"),
                name: format!("Player {i}"),
            })
            .collect()
    }

    fn card(id: &str, rank: Rank, suit: Suit) -> Card {
        Card {
            id: id.into(),
            suit,
            rank,
        }
    }

    /// A hand of `n` wild cards for the given wild rank.
    fn wild_hand(n: usize, wild: Rank) -> Vec<Card> {
        (0..n)
            .map(|i| Card {
                id: format!("w-{i}"),
                suit: Suit::ALL[i % 4],
                rank: wild,
            })
            .collect()
    }

    /// First `n` cards of a 13-card spread that can never form a set or a
    /// run: all ranks distinct, per-suit rank gaps of four, at most one
    /// wild whatever the round.  Its penalty is always the raw sum.
    fn stuck_hand(n: usize) -> Vec<Card> {
        let suits = [Suit::Hearts, Suit::Clubs, Suit::Diamonds, Suit::Spades];
        Rank::ALL[..n]
            .iter()
            .enumerate()
            .map(|(i, &rank)| Card {
                id: format!("s-{i}"),
                suit: suits[i % 4],
                rank,
            })
            .collect()
    }

    fn stuck_penalty(n: usize) -> u32 {
        Rank::ALL[..n].iter().map(|r| r.penalty_points()).sum()
    }

    fn set_hand(game: &mut GameState, player_id: &str, hand: Vec<Card>) {
        let seat = game.players.iter().position(|p| p.id == player_id).unwrap();
        game.players[seat].hand = hand;
    }

    fn hand_len(game: &GameState, player_id: &str) -> usize {
        game.players
            .iter()
            .find(|p| p.id == player_id)
            .unwrap()
            .hand
            .len()
    }

    #[test]
    fn start_deals_round_one() {
        let game = GameState::start(&roster(2)).unwrap();
        assert_eq!(game.round_number, 1);
        assert_eq!(game.wild_rank(), Rank::Three);
        assert_eq!(game.phase, Phase::Playing);
        assert_eq!(game.turn_phase, TurnPhase::Draw);
        assert_eq!(
            game.current_player_index,
            (game.dealer_index + 1) % game.players.len()
        );
        for player in &game.players {
            assert_eq!(player.hand.len(), 3);
        }
        assert_eq!(game.discard_pile.len(), 1);
        assert_eq!(game.draw_pile.len(), 52 - 6 - 1);
        assert_eq!(game.total_cards(), 52);
    }

    #[test]
    fn start_rejects_bad_table_sizes() {
        assert!(GameState::start(&roster(1)).is_err());
        assert!(GameState::start(&roster(9)).is_err());
    }

    #[test]
    fn draw_then_discard_advances_turn() {
        let mut game = GameState::start(&roster(2)).unwrap();
        let first = game.current_player_id().to_string();
        let other = game.players[(game.current_player_index + 1) % 2].id.clone();

        assert_eq!(
            game.draw(&other, DrawSource::Pile),
            Err(GameError::NotYourTurn)
        );
        game.draw(&first, DrawSource::Pile).unwrap();
        assert_eq!(hand_len(&game, &first), 4);
        assert_eq!(game.turn_phase, TurnPhase::Discard);
        assert!(matches!(
            game.draw(&first, DrawSource::Pile),
            Err(GameError::WrongPhase(_))
        ));

        assert_eq!(
            game.discard(&first, "not-a-card"),
            Err(GameError::UnknownCard)
        );
        let card_id = game.players[game.current_player_index].hand[0].id.clone();
        assert_eq!(game.discard(&first, &card_id), Ok(TurnFlow::Continue));
        assert_eq!(hand_len(&game, &first), 3);
        assert_eq!(game.current_player_id(), other);
        assert_eq!(game.turn_phase, TurnPhase::Draw);
        assert_eq!(game.total_cards(), 52);
    }

    #[test]
    fn discard_before_drawing_is_rejected() {
        let mut game = GameState::start(&roster(2)).unwrap();
        let first = game.current_player_id().to_string();
        let card_id = game.players[game.current_player_index].hand[0].id.clone();
        assert!(matches!(
            game.discard(&first, &card_id),
            Err(GameError::WrongPhase(_))
        ));
    }

    #[test]
    fn draw_from_discard_takes_top() {
        let mut game = GameState::start(&roster(2)).unwrap();
        let first = game.current_player_id().to_string();
        let top = game.discard_pile.last().unwrap().id.clone();
        game.draw(&first, DrawSource::Discard).unwrap();
        let hand = &game.players[game.current_player_index].hand;
        assert_eq!(hand.last().unwrap().id, top);
        assert!(game.discard_pile.is_empty());
    }

    #[test]
    fn draw_from_empty_discard_is_rejected() {
        let mut game = GameState::start(&roster(2)).unwrap();
        let first = game.current_player_id().to_string();
        game.discard_pile.clear();
        assert_eq!(
            game.draw(&first, DrawSource::Discard),
            Err(GameError::EmptyDiscard)
        );
        assert_eq!(game.turn_phase, TurnPhase::Draw);
    }

    #[test]
    fn empty_draw_pile_recycles_discard() {
        let mut game = GameState::start(&roster(4)).unwrap();
        game.round_number = 3;
        game.deal_round();

        // Drain the draw pile into the discard pile.
        let mut drained = std::mem::take(&mut game.draw_pile);
        game.discard_pile.append(&mut drained);
        let top = game.discard_pile.last().unwrap().id.clone();
        let buried = game.discard_pile.len() - 1;

        let first = game.current_player_id().to_string();
        game.draw(&first, DrawSource::Pile).unwrap();

        assert_eq!(game.discard_pile.len(), 1);
        assert_eq!(game.discard_pile[0].id, top);
        assert_eq!(game.draw_pile.len(), buried - 1);
        assert_eq!(hand_len(&game, &first), 6);
        assert_eq!(game.total_cards(), 2 * 52);
    }

    #[test]
    fn invalid_go_out_leaves_state_unchanged() {
        let mut game = GameState::start(&roster(2)).unwrap();
        game.round_number = 3;
        game.deal_round();
        let first = game.current_player_id().to_string();
        set_hand(
            &mut game,
            &first,
            vec![
                card("h1", Rank::Three, Suit::Spades),
                card("h2", Rank::Three, Suit::Hearts),
                card("h3", Rank::Three, Suit::Diamonds),
                card("h4", Rank::Seven, Suit::Clubs),
                card("h5", Rank::Nine, Suit::Clubs),
            ],
        );
        game.turn_phase = TurnPhase::Discard;
        let discard_before = game.discard_pile.len();

        assert_eq!(game.go_out(&first, "h5"), Err(GameError::InvalidGoOut));
        assert_eq!(game.turn_phase, TurnPhase::Discard);
        assert_eq!(game.phase, Phase::Playing);
        assert_eq!(hand_len(&game, &first), 5);
        assert_eq!(game.discard_pile.len(), discard_before);

        // A normal discard of the same card still works.
        assert_eq!(game.discard(&first, "h5"), Ok(TurnFlow::Continue));
        assert_eq!(hand_len(&game, &first), 4);
    }

    #[test]
    fn all_wild_go_out_enters_final_turns() {
        let mut game = GameState::start(&roster(2)).unwrap();
        game.round_number = 3;
        game.deal_round();
        let first = game.current_player_id().to_string();
        let mut hand = wild_hand(4, Rank::Five);
        hand.push(card("h5", Rank::Three, Suit::Hearts));
        set_hand(&mut game, &first, hand);
        game.turn_phase = TurnPhase::Discard;

        game.go_out(&first, "h5").unwrap();
        assert_eq!(game.phase, Phase::FinalTurns);
        assert_eq!(game.went_out_player_id.as_deref(), Some(first.as_str()));
        assert_eq!(game.final_turns_remaining, 1);
        assert_eq!(game.turn_phase, TurnPhase::Draw);
        assert_ne!(game.current_player_id(), first);
    }

    #[test]
    fn go_out_rejected_during_final_turns() {
        let mut game = GameState::start(&roster(3)).unwrap();
        let first = game.current_player_id().to_string();
        set_hand(&mut game, &first, wild_hand(4, Rank::Three));
        game.turn_phase = TurnPhase::Discard;
        game.go_out(&first, "w-0").unwrap();

        let second = game.current_player_id().to_string();
        set_hand(&mut game, &second, wild_hand(4, Rank::Three));
        game.turn_phase = TurnPhase::Discard;
        assert!(matches!(
            game.go_out(&second, "w-0"),
            Err(GameError::WrongPhase(_))
        ));
    }

    #[test]
    fn final_turn_meld_scores_zero_without_taking_over() {
        let mut game = GameState::start(&roster(2)).unwrap();
        let first = game.current_player_id().to_string();
        let second = game.players[(game.current_player_index + 1) % 2].id.clone();

        set_hand(&mut game, &first, wild_hand(4, Rank::Three));
        game.turn_phase = TurnPhase::Discard;
        game.go_out(&first, "w-0").unwrap();

        // The second player's final turn leaves a hand that fully melds.
        set_hand(
            &mut game,
            &second,
            vec![
                card("n1", Rank::Nine, Suit::Spades),
                card("n2", Rank::Nine, Suit::Hearts),
                card("n3", Rank::Nine, Suit::Diamonds),
            ],
        );
        let drawn = game.draw_pile.last().unwrap().id.clone();
        game.draw(&second, DrawSource::Pile).unwrap();
        assert_eq!(game.discard(&second, &drawn), Ok(TurnFlow::RoundOver));

        assert_eq!(game.phase, Phase::RoundOver);
        assert_eq!(game.went_out_player_id.as_deref(), Some(first.as_str()));
        for result in &game.round_results {
            assert_eq!(result.round_points, 0);
        }
    }

    #[test]
    fn round_over_scores_penalties() {
        let mut game = GameState::start(&roster(2)).unwrap();
        let first = game.current_player_id().to_string();
        let second = game.players[(game.current_player_index + 1) % 2].id.clone();

        set_hand(&mut game, &first, wild_hand(4, Rank::Three));
        game.turn_phase = TurnPhase::Discard;
        game.go_out(&first, "w-0").unwrap();

        set_hand(&mut game, &second, stuck_hand(3));
        let drawn = game.draw_pile.last().unwrap().id.clone();
        game.draw(&second, DrawSource::Pile).unwrap();
        game.discard(&second, &drawn).unwrap();

        assert_eq!(game.phase, Phase::RoundOver);
        let loser = game
            .round_results
            .iter()
            .find(|r| r.player_id == second)
            .unwrap();
        assert_eq!(loser.round_points, stuck_penalty(3));
        assert_eq!(loser.cumulative_score, stuck_penalty(3));
        assert_eq!(loser.penalty_cards.len(), 3);
        let winner = game
            .round_results
            .iter()
            .find(|r| r.player_id == first)
            .unwrap();
        assert_eq!(winner.round_points, 0);
    }

    #[test]
    fn next_round_waits_for_everyone() {
        let mut game = GameState::start(&roster(2)).unwrap();
        let first = game.current_player_id().to_string();
        let second = game.players[(game.current_player_index + 1) % 2].id.clone();

        set_hand(&mut game, &first, wild_hand(4, Rank::Three));
        game.turn_phase = TurnPhase::Discard;
        game.go_out(&first, "w-0").unwrap();
        let drawn = game.draw_pile.last().unwrap().id.clone();
        game.draw(&second, DrawSource::Pile).unwrap();
        game.discard(&second, &drawn).unwrap();

        assert!(matches!(
            game.draw(&first, DrawSource::Pile),
            Err(GameError::WrongPhase(_))
        ));
        let dealer_before = game.dealer_index;
        assert_eq!(
            game.confirm_next_round(&first),
            Ok(NextRoundOutcome::Waiting)
        );
        assert_eq!(
            game.confirm_next_round(&second),
            Ok(NextRoundOutcome::NewRound)
        );
        assert_eq!(game.round_number, 2);
        assert_eq!(game.dealer_index, (dealer_before + 1) % 2);
        assert_eq!(game.phase, Phase::Playing);
        for player in &game.players {
            assert_eq!(player.hand.len(), 4);
            assert!(!player.next_round_confirmed);
            assert!(!player.has_gone_out_this_round);
        }
    }

    #[test]
    fn leaderboard_ties_keep_seating_order() {
        let mut game = GameState::start(&roster(3)).unwrap();
        game.round_number = 11;
        game.phase = Phase::RoundOver;
        game.players[0].cumulative_score = 5;
        game.players[1].cumulative_score = 5;
        game.players[2].cumulative_score = 3;
        let ids: Vec<String> = game.players.iter().map(|p| p.id.clone()).collect();

        for (i, id) in ids.iter().enumerate() {
            let outcome = game.confirm_next_round(id).unwrap();
            if i + 1 == ids.len() {
                assert_eq!(outcome, NextRoundOutcome::Finished);
            } else {
                assert_eq!(outcome, NextRoundOutcome::Waiting);
            }
        }
        assert_eq!(game.phase, Phase::Finished);
        assert_eq!(game.leaderboard[0].id, ids[2]);
        assert_eq!(game.leaderboard[1].id, ids[0]);
        assert_eq!(game.leaderboard[2].id, ids[1]);
    }

    #[test]
    fn commands_from_unseated_player_are_rejected() {
        let mut game = GameState::start(&roster(2)).unwrap();
        assert_eq!(
            game.draw("stranger", DrawSource::Pile),
            Err(GameError::NotInLobby)
        );
    }

    #[test]
    fn card_conservation_over_random_play() {
        let mut game = GameState::start(&roster(3)).unwrap();
        let mut rng = rng();
        for _ in 0..150 {
            let current = game.current_player_id().to_string();
            let source = if rng.random_bool(0.75) {
                DrawSource::Pile
            } else {
                DrawSource::Discard
            };
            game.draw(&current, source).unwrap();
            assert_eq!(game.total_cards(), 52);

            let seat = game.current_player_index;
            let pick = rng.random_range(0..game.players[seat].hand.len());
            let card_id = game.players[seat].hand[pick].id.clone();
            game.discard(&current, &card_id).unwrap();
            assert_eq!(game.total_cards(), 52);
        }
    }

    /// Scripted full game: the same player goes out in every round while
    /// the other player's hand never melds, so the final leaderboard is
    /// exactly computable.
    #[test]
    fn full_game_ends_with_one_leader() {
        let mut game = GameState::start(&roster(2)).unwrap();
        let out_id = game.players[0].id.clone();
        let other_id = game.players[1].id.clone();

        for round in 1..=11u8 {
            assert_eq!(game.round_number, round);
            assert_eq!(game.phase, Phase::Playing);
            let deal = cards::deal_size(round);
            let wild = game.wild_rank();

            // If the other player leads the round, play out a plain turn.
            if game.current_player_id() == other_id {
                set_hand(&mut game, &other_id, stuck_hand(deal));
                let drawn = game.draw_pile.last().unwrap().id.clone();
                game.draw(&other_id, DrawSource::Pile).unwrap();
                game.discard(&other_id, &drawn).unwrap();
            }

            assert_eq!(game.current_player_id(), out_id);
            set_hand(&mut game, &out_id, wild_hand(deal, wild));
            let drawn = game.draw_pile.last().unwrap().id.clone();
            game.draw(&out_id, DrawSource::Pile).unwrap();
            game.go_out(&out_id, &drawn).unwrap();

            // Final turn for the other player.
            set_hand(&mut game, &other_id, stuck_hand(deal));
            let drawn = game.draw_pile.last().unwrap().id.clone();
            game.draw(&other_id, DrawSource::Pile).unwrap();
            assert_eq!(game.discard(&other_id, &drawn), Ok(TurnFlow::RoundOver));

            let outcome_a = game.confirm_next_round(&out_id).unwrap();
            let outcome_b = game.confirm_next_round(&other_id).unwrap();
            assert_eq!(outcome_a, NextRoundOutcome::Waiting);
            if round < 11 {
                assert_eq!(outcome_b, NextRoundOutcome::NewRound);
            } else {
                assert_eq!(outcome_b, NextRoundOutcome::Finished);
            }
        }

        let expected: u32 = (1..=11u8).map(|r| stuck_penalty(cards::deal_size(r))).sum();
        assert_eq!(expected, 595);
        assert_eq!(game.phase, Phase::Finished);
        assert_eq!(game.leaderboard.len(), 2);
        assert_eq!(game.leaderboard[0].id, out_id);
        assert_eq!(game.leaderboard[0].score, 0);
        assert_eq!(game.leaderboard[1].id, other_id);
        assert_eq!(game.leaderboard[1].score, expected);
    }
}
