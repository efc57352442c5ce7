//! Interfaces shared between the predictor contracts.
//!
//! The prediction game never links against a concrete oracle. It talks to
//! whatever contract address the admin configured through the client generated
//! from [`ResultsOracle`], so any contract exposing these two functions can
//! serve as the results source.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{contractclient, Env, Vec};

/// Narrow view of a round-results source.
///
/// `get_results` returns one non-negative point value per selectable option,
/// indexed by option. Implementations decide how results are produced; callers
/// only rely on `results_ready(round)` implying `get_results(round)` succeeds.
#[contractclient(name = "ResultsOracleClient")]
pub trait ResultsOracle {
    fn results_ready(env: Env, round: u32) -> bool;

    fn get_results(env: Env, round: u32) -> Vec<u32>;
}
