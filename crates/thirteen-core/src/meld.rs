//! Meld evaluation: the go-out test and minimum-penalty scoring.
//!
//! A combination is either a *set* (three or more cards of one rank) or a
//! *run* (three or more consecutive ranks in one suit, aces low only).
//! Wild cards substitute for any card.  Hands are small (at most 13 cards)
//! so both questions are answered by a bounded exhaustive search, memoized
//! on the shape of the remaining cards.

use std::collections::HashMap;

use crate::cards::{Card, Rank};

/// Smallest legal set or run.
const MIN_GROUP: usize = 3;

/// A natural (non-wild) card reduced to (face value, suit index).  Copies
/// of the same rank and suit are interchangeable for the search.
type Nat = (u8, u8);

/// Result of the minimum-penalty search over a full hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PenaltyPartition {
    /// Total points of the cards left out of every combination.
    pub points: u32,
    /// The leftover cards themselves, in hand order.
    pub penalty_cards: Vec<Card>,
}

/// Can `hand` be partitioned completely into valid sets and runs?
///
/// `hand` is the player's cards *after* removing the nominated discard, so
/// a full partition here means the player may go out.
pub fn can_go_out(hand: &[Card], wild_rank: Rank) -> bool {
    let (naturals, wilds) = split(hand, wild_rank);
    can_partition(&naturals, wilds, &mut HashMap::new())
}

/// Find the partition of `hand` that minimizes penalty points.
///
/// Cards assigned to no combination count through the penalty table; an
/// unmatched wild counts at its own rank's value.
pub fn penalty_partition(hand: &[Card], wild_rank: Rank) -> PenaltyPartition {
    let (naturals, wilds) = split(hand, wild_rank);
    let (points, leftover, leftover_wilds) =
        min_penalty(&naturals, wilds, wild_rank, &mut HashMap::new());
    PenaltyPartition {
        points,
        penalty_cards: pick_penalty_cards(hand, &leftover, leftover_wilds, wild_rank),
    }
}

/// Split a hand into sorted natural shapes and a wild count.
fn split(hand: &[Card], wild_rank: Rank) -> (Vec<Nat>, u8) {
    let mut naturals: Vec<Nat> = hand
        .iter()
        .filter(|c| !c.is_wild(wild_rank))
        .map(|c| (c.rank as u8, c.suit as u8))
        .collect();
    naturals.sort_unstable();
    let wilds = (hand.len() - naturals.len()) as u8;
    (naturals, wilds)
}

/// True when the naturals plus wilds split completely into combinations.
///
/// Leftover wilds succeed on their own only as a set of three or more;
/// one or two stragglers must have been absorbed into an earlier group.
fn can_partition(naturals: &[Nat], wilds: u8, memo: &mut HashMap<(Vec<Nat>, u8), bool>) -> bool {
    if naturals.is_empty() {
        return wilds == 0 || wilds as usize >= MIN_GROUP;
    }
    let key = (naturals.to_vec(), wilds);
    if let Some(&known) = memo.get(&key) {
        return known;
    }

    let anchor = naturals[0];
    let mut ok = false;
    for (used, used_wilds) in group_choices(naturals, anchor, wilds) {
        let rest = remove_used(naturals, &used);
        if can_partition(&rest, wilds - used_wilds, memo) {
            ok = true;
            break;
        }
    }
    memo.insert(key, ok);
    ok
}

/// Minimum penalty over all partitions of the given shape.
///
/// Returns (points, leftover naturals, leftover wilds) so the caller can
/// reconstruct which concrete cards went unmatched.
fn min_penalty(
    naturals: &[Nat],
    wilds: u8,
    wild_rank: Rank,
    memo: &mut HashMap<(Vec<Nat>, u8), (u32, Vec<Nat>, u8)>,
) -> (u32, Vec<Nat>, u8) {
    if naturals.is_empty() {
        if wilds == 0 || wilds as usize >= MIN_GROUP {
            return (0, Vec::new(), 0);
        }
        return (wilds as u32 * wild_rank.penalty_points(), Vec::new(), wilds);
    }
    let key = (naturals.to_vec(), wilds);
    if let Some(cached) = memo.get(&key) {
        return cached.clone();
    }

    let anchor = naturals[0];

    // Leave the anchor unmatched.
    let (points, mut leftover, leftover_wilds) =
        min_penalty(&naturals[1..], wilds, wild_rank, memo);
    leftover.insert(0, anchor);
    let mut best = (points + rank_penalty(anchor.0), leftover, leftover_wilds);

    if best.0 > 0 {
        for (used, used_wilds) in group_choices(naturals, anchor, wilds) {
            let rest = remove_used(naturals, &used);
            let candidate = min_penalty(&rest, wilds - used_wilds, wild_rank, memo);
            if candidate.0 < best.0 {
                best = candidate;
            }
            if best.0 == 0 {
                break;
            }
        }
    }
    memo.insert(key, best.clone());
    best
}

/// Every set or run that consumes the anchor card, as (used naturals
/// including the anchor, wilds consumed).
fn group_choices(naturals: &[Nat], anchor: Nat, wilds: u8) -> Vec<(Vec<Nat>, u8)> {
    let mut choices = set_choices(naturals, anchor, wilds);
    choices.extend(run_choices(naturals, anchor, wilds));
    choices.sort_unstable();
    choices.dedup();
    choices
}

/// Sets through the anchor: further same-rank naturals plus wilds,
/// totalling at least three cards.  Extra wilds may pad any set.
fn set_choices(naturals: &[Nat], anchor: Nat, wilds: u8) -> Vec<(Vec<Nat>, u8)> {
    let (rank, anchor_suit) = anchor;
    // Same-rank copies available per suit, minus the anchor itself.
    let mut counts = [0u8; 4];
    for &(r, s) in naturals {
        if r == rank {
            counts[s as usize] += 1;
        }
    }
    counts[anchor_suit as usize] -= 1;

    let mut out = Vec::new();
    for t0 in 0..=counts[0] {
        for t1 in 0..=counts[1] {
            for t2 in 0..=counts[2] {
                for t3 in 0..=counts[3] {
                    let takes = [t0, t1, t2, t3];
                    let k = 1 + (t0 + t1 + t2 + t3) as usize;
                    for w in 0..=wilds {
                        if k + (w as usize) < MIN_GROUP {
                            continue;
                        }
                        let mut used = vec![anchor];
                        for (suit, &take) in takes.iter().enumerate() {
                            for _ in 0..take {
                                used.push((rank, suit as u8));
                            }
                        }
                        out.push((used, w));
                    }
                }
            }
        }
    }
    out
}

/// Runs through the anchor: each contiguous span of ranks in the anchor's
/// suit that contains the anchor, with every other position filled by a
/// natural of that rank and suit or by a wild.  Spans never wrap: the low
/// end stops at the ace and the high end at the king.
fn run_choices(naturals: &[Nat], anchor: Nat, wilds: u8) -> Vec<(Vec<Nat>, u8)> {
    let (rank, suit) = anchor;
    let mut avail = [0u8; 14];
    for &(r, s) in naturals {
        if s == suit {
            avail[r as usize] += 1;
        }
    }

    let mut out = Vec::new();
    let available = naturals.len() + wilds as usize;
    for lo in 1..=rank {
        for hi in rank..=13 {
            let len = (hi - lo + 1) as usize;
            if len < MIN_GROUP || len > available {
                continue;
            }
            // Expand position by position; each partial tracks the
            // naturals taken so far and the wilds spent.
            let mut partial: Vec<(Vec<Nat>, u8)> = vec![(vec![anchor], 0)];
            for pos in lo..=hi {
                if pos == rank {
                    continue;
                }
                let mut next = Vec::new();
                for (used, spent) in partial {
                    if avail[pos as usize] > 0 {
                        let mut with_nat = used.clone();
                        with_nat.push((pos, suit));
                        next.push((with_nat, spent));
                    }
                    if spent < wilds {
                        next.push((used, spent + 1));
                    }
                }
                partial = next;
                if partial.is_empty() {
                    break;
                }
            }
            out.extend(partial);
        }
    }
    out
}

fn remove_used(naturals: &[Nat], used: &[Nat]) -> Vec<Nat> {
    let mut rest = naturals.to_vec();
    for u in used {
        if let Some(pos) = rest.iter().position(|n| n == u) {
            rest.remove(pos);
        }
    }
    rest
}

fn rank_penalty(face: u8) -> u32 {
    Rank::ALL[(face - 1) as usize].penalty_points()
}

/// Map the leftover shapes back onto concrete cards of the hand.
fn pick_penalty_cards(
    hand: &[Card],
    leftover: &[Nat],
    mut leftover_wilds: u8,
    wild_rank: Rank,
) -> Vec<Card> {
    let mut need: Vec<Nat> = leftover.to_vec();
    let mut cards = Vec::new();
    for card in hand {
        if card.is_wild(wild_rank) {
            if leftover_wilds > 0 {
                leftover_wilds -= 1;
                cards.push(card.clone());
            }
        } else if let Some(pos) = need
            .iter()
            .position(|&n| n == (card.rank as u8, card.suit as u8))
        {
            need.remove(pos);
            cards.push(card.clone());
        }
    }
    cards
}
