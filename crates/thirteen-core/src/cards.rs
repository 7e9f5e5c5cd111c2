//! Card identity, multi-deck composition, and the fixed round table.
//!
//! Three Thirteen is played over eleven rounds.  Round *r* deals `r + 2`
//! cards to each player and makes the rank with face value `r + 2` wild
//! (3s in round 1 up to Kings in round 11).  Larger tables shuffle several
//! complete 52-card decks together, so every card carries a synthetic id
//! that stays unique across the composite deck.

use std::fmt;

use rand::rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Number of rounds in a full game.
pub const FINAL_ROUND: u8 = 11;

/// Represents a card suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    /// All suits in standard order
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    /// Returns the suit as a display symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Suit::Hearts => "♥",
            Suit::Diamonds => "♦",
            Suit::Clubs => "♣",
            Suit::Spades => "♠",
        }
    }

    /// Lowercase name used in card ids.
    pub fn key(&self) -> &'static str {
        match self {
            Suit::Hearts => "hearts",
            Suit::Diamonds => "diamonds",
            Suit::Clubs => "clubs",
            Suit::Spades => "spades",
        }
    }
}

/// Represents a card rank.  Aces are always low in this game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Ace = 1,
    Two = 2,
    Three = 3,
    Four = 4,
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
    Nine = 9,
    Ten = 10,
    Jack = 11,
    Queen = 12,
    King = 13,
}

impl Rank {
    /// All ranks in ascending order (ace low).
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    /// Face value: ace = 1, pips at pip value, jack/queen/king = 11/12/13.
    pub fn face_value(&self) -> u8 {
        *self as u8
    }

    /// Penalty points for a card left out of any combination.
    ///
    /// Aces count 15, face cards 10, everything else at pip value.  A wild
    /// card that stays unmatched also counts through this table (its rank
    /// is never an ace, so the 15 never applies to wilds).
    pub fn penalty_points(&self) -> u32 {
        match self {
            Rank::Ace => 15,
            Rank::Jack | Rank::Queen | Rank::King => 10,
            other => other.face_value() as u32,
        }
    }

    /// Returns the rank as a display character
    pub fn symbol(&self) -> &'static str {
        match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "T",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        }
    }

    /// Lowercase name used in card ids.
    pub fn key(&self) -> &'static str {
        match self {
            Rank::Ace => "ace",
            Rank::Two => "two",
            Rank::Three => "three",
            Rank::Four => "four",
            Rank::Five => "five",
            Rank::Six => "six",
            Rank::Seven => "seven",
            Rank::Eight => "eight",
            Rank::Nine => "nine",
            Rank::Ten => "ten",
            Rank::Jack => "jack",
            Rank::Queen => "queen",
            Rank::King => "king",
        }
    }
}

/// A single card of the composite deck.
///
/// The `id` is stable for the lifetime of one shuffled deck and unique
/// across all copies of the same rank/suit, so clients can nominate cards
/// unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub suit: Suit,
    pub rank: Rank,
}

impl Card {
    /// Whether this card is wild for the given round wild rank.
    pub fn is_wild(&self, wild_rank: Rank) -> bool {
        self.rank == wild_rank
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.symbol(), self.suit.symbol())
    }
}

/// Number of cards dealt to each player in the given round.
pub fn deal_size(round: u8) -> usize {
    round as usize + 2
}

/// The wild rank for the given round: face value `round + 2`.
pub fn wild_rank(round: u8) -> Rank {
    debug_assert!((1..=FINAL_ROUND).contains(&round));
    Rank::ALL[round as usize + 1]
}

/// How many complete 52-card decks are shuffled together for a table size.
pub fn decks_for(n_players: usize) -> usize {
    match n_players {
        0..=3 => 1,
        4..=5 => 2,
        _ => 3,
    }
}

/// Build and shuffle the composite deck for a table of `n_players`.
///
/// Fisher–Yates via [`SliceRandom::shuffle`] over the full composite deck;
/// the engine pops from the end when dealing and drawing.
pub fn shuffled_deck(n_players: usize) -> Vec<Card> {
    let mut deck = Vec::with_capacity(decks_for(n_players) * 52);
    for deck_index in 0..decks_for(n_players) {
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                deck.push(Card {
                    id: format!("{deck_index}-{}-{}", suit.key(), rank.key()),
                    suit,
                    rank,
                });
            }
        }
    }
    let mut rng = rng();
    deck.shuffle(&mut rng);
    deck
}
