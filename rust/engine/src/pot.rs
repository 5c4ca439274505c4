use serde::{Deserialize, Serialize};

use crate::hand::HandStrength;
use crate::player::{PlayerId, Seat};

/// A main or side pot: an amount of chips and the seats that can win it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pot {
    pub amount: u32,
    pub eligible: Vec<PlayerId>,
    pub is_main: bool,
}

/// One seat's share of one pot at distribution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotAward {
    pub player_id: PlayerId,
    pub amount: u32,
    /// Index into the pot list this award came from (0 = main)
    pub pot_index: usize,
}

/// Builds the main pot and side pots from every seat's total-hand wager.
///
/// Distinct wager levels are walked ascending; each level forms a pot of
/// `(level - previous) * seats_at_or_above`, eligible to the non-folded
/// seats at or above it. Adjacent pots with identical eligibility (a
/// level introduced only by a folded seat's wager) are merged so side
/// pots always shrink strictly in eligibility.
pub fn build_pots(seats: &[Seat]) -> Vec<Pot> {
    let mut levels: Vec<u32> = seats
        .iter()
        .filter(|s| s.in_hand && s.hand_wager > 0)
        .map(|s| s.hand_wager)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    let mut pots: Vec<Pot> = Vec::new();
    let mut prev_level = 0u32;
    for &level in &levels {
        let contributors = seats
            .iter()
            .filter(|s| s.in_hand && s.hand_wager >= level)
            .count() as u32;
        let amount = (level - prev_level) * contributors;
        let eligible: Vec<PlayerId> = seats
            .iter()
            .filter(|s| s.contesting() && s.hand_wager >= level)
            .map(|s| s.player_id.clone())
            .collect();
        prev_level = level;

        match pots.last_mut() {
            Some(last) if last.eligible == eligible => last.amount += amount,
            _ => pots.push(Pot {
                amount,
                eligible,
                is_main: pots.is_empty(),
            }),
        }
    }
    pots
}

/// Distributes every pot to the best hand(s) among its eligible seats.
///
/// `strengths` maps the seats that reached showdown to their evaluated
/// strength; `clockwise_from_dealer` lists seats in turn order starting
/// one past the dealer and decides who receives odd chips on a split.
pub fn distribute_pots(
    pots: &[Pot],
    strengths: &[(PlayerId, HandStrength)],
    clockwise_from_dealer: &[PlayerId],
) -> Vec<PotAward> {
    let mut awards = Vec::new();
    for (pot_index, pot) in pots.iter().enumerate() {
        let best = pot
            .eligible
            .iter()
            .filter_map(|id| strengths.iter().find(|(sid, _)| sid == id))
            .map(|(_, s)| s)
            .max();
        let Some(best) = best else { continue };

        let mut winners: Vec<PlayerId> = pot
            .eligible
            .iter()
            .filter(|id| {
                strengths
                    .iter()
                    .any(|(sid, s)| sid == *id && s == best)
            })
            .cloned()
            .collect();
        // odd chips go to winners nearest clockwise from the dealer
        winners.sort_by_key(|id| {
            clockwise_from_dealer
                .iter()
                .position(|p| p == id)
                .unwrap_or(usize::MAX)
        });

        let share = pot.amount / winners.len() as u32;
        let remainder = (pot.amount % winners.len() as u32) as usize;
        for (i, winner) in winners.iter().enumerate() {
            let amount = share + u32::from(i < remainder);
            if amount > 0 {
                awards.push(PotAward {
                    player_id: winner.clone(),
                    amount,
                    pot_index,
                });
            }
        }
    }
    awards
}
