//! Time-window queries over the round schedule.
//!
//! The schedule is a table of `(start, stop)` ledger timestamps, one entry per
//! round. Round `r` (1-based) lives at table position `r - 1`. Every query is a
//! pure function of the table, a timestamp and a round number; a round outside
//! the table is never open and never overdue.

use soroban_sdk::{contracttype, Vec};

/// Minting stops this many seconds before round 1 is scheduled to stop.
pub const MINT_CUTOFF_SECS: u64 = 60 * 60;

/// Predictions stop this many seconds before the round is scheduled to stop,
/// leaving a buffer before results can be pulled.
pub const PREDICTION_CUTOFF_SECS: u64 = 5 * 60;

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundWindow {
    pub start: u64,
    pub stop: u64,
}

pub fn window_for(schedule: &Vec<RoundWindow>, round: u32) -> Option<RoundWindow> {
    if round == 0 {
        return None;
    }
    schedule.get(round - 1)
}

/// Independent of the round cursor: only round 1's stop time matters.
pub fn is_minting_open(schedule: &Vec<RoundWindow>, now: u64) -> bool {
    match schedule.get(0) {
        Some(first) => now.saturating_add(MINT_CUTOFF_SECS) < first.stop,
        None => false,
    }
}

pub fn is_prediction_window_open(schedule: &Vec<RoundWindow>, now: u64, round: u32) -> bool {
    match window_for(schedule, round) {
        Some(window) => {
            now >= window.start && now.saturating_add(PREDICTION_CUTOFF_SECS) < window.stop
        }
        None => false,
    }
}

pub fn is_round_overdue(schedule: &Vec<RoundWindow>, now: u64, round: u32) -> bool {
    match window_for(schedule, round) {
        Some(window) => now > window.stop,
        None => false,
    }
}
