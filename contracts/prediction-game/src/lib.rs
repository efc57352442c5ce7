//! Predictor Round Game Contract
//!
//! A season of prediction rounds played with minted entries. Each entry is a
//! token id owned by an address; its owner submits one set of option picks per
//! round, an external oracle reports how many points every option was worth,
//! and the contract accumulates points per entry. After the last round the
//! admin names the winning entries and the collected entry fees are split
//! between their owners.
//!
//! ## Round Lifecycle
//! 1. Minting is open until one hour before round 1 is scheduled to stop.
//! 2. While round `r` is current, predictions are accepted from `start(r)`
//!    until five minutes before `stop(r)`.
//! 3. Once `stop(r)` has passed and the oracle reports results for `r`, anyone
//!    may call `perform_upkeep`. It scores every entry that predicted in `r`
//!    and advances the cursor to `r + 1`.
//! 4. After the last round closes the game is finished: no predictions, no
//!    closures, and the admin may set winners and pay them.
//!
//! `check_upkeep` is the dry-run of step 3 for keepers. `perform_upkeep`
//! re-evaluates eligibility on its own and never trusts an earlier check.
//!
//! ## Round Numbering
//! Rounds are 1-based everywhere: the cursor, prediction records, the per-round
//! entry index, oracle queries and events. Schedule entry `r` sits at table
//! position `r - 1`.
//!
//! ## Storage Strategy
//! - `instance()`: Admin, Config, Schedule, Oracle, PaymentToken, CurrentRound,
//!   TotalSupply, Winners, PrizePaid, Locked.
//! - `persistent()`: per-token owner and score, per-(token, round) picks and
//!   the per-round entry index. TTL is bumped on every write, and the owner
//!   record also when a submission or the winners list reads it.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, log, token::TokenClient,
    Address, Env, Vec,
};

use predictor_shared::ResultsOracleClient;

mod schedule;
mod scoring;

pub use schedule::{RoundWindow, MINT_CUTOFF_SECS, PREDICTION_CUTOFF_SECS};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Persistent storage TTL in ledgers (~30 days at 5 s/ledger).
pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized     = 2,
    NotAuthorized      = 3,
    InvalidConfig      = 4,
    /// Schedule length does not match `num_rounds`.
    InvalidSchedule    = 5,
    InvalidAmount      = 6,
    MintingClosed      = 7,
    TokenNotFound      = 8,
    NotOwner           = 9,
    WindowClosed       = 10,
    /// Picks length differs from `predictions_per_round`.
    BadCardinality     = 11,
    GameFinished       = 12,
    RoundNotOverdue    = 13,
    ResultsNotReady    = 14,
    GameNotFinished    = 15,
    WinnersAlreadySet  = 16,
    InvalidWinners     = 17,
    WinnersNotSet      = 18,
    PrizeAlreadyPaid   = 19,
    EmptyPrizePool     = 20,
    /// An operation making an external call is already in progress. Backs up
    /// the host's own re-entry rejection, so it is not expected in practice.
    Reentrant          = 21,
    Overflow           = 22,
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    // --- instance() ---
    Admin,
    Config,
    Schedule,
    Oracle,
    PaymentToken,
    CurrentRound,
    TotalSupply,
    Winners,
    PrizePaid,
    Locked,
    // --- persistent() ---
    Owner(u32),
    /// Picks of `token_id` for `round`.
    Predictions(u32, u32),
    /// Token ids that predicted in `round`, in first-submission order.
    RoundEntries(u32),
    Score(u32),
}

/// Fixed at `init`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GameConfig {
    pub num_rounds: u32,
    pub predictions_per_round: u32,
    pub num_winners: u32,
    /// Payment-token price of one entry; zero makes minting free.
    pub mint_price: i128,
}

/// Observable phase of the game.
///
/// A round is closed and the next one opened in the same invocation, so a
/// closed-but-not-advanced round is never visible from outside.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GamePhase {
    /// Entries can still be minted; round 1 may already accept predictions.
    Minting,
    Open(u32),
    Finished,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct Initialized {
    #[topic]
    pub admin: Address,
    pub oracle: Address,
    pub num_rounds: u32,
}

#[contractevent]
pub struct EntryMinted {
    #[topic]
    pub token_id: u32,
    #[topic]
    pub owner: Address,
}

#[contractevent]
pub struct PredictionRecorded {
    #[topic]
    pub token_id: u32,
    #[topic]
    pub round: u32,
    pub selections: Vec<u32>,
}

#[contractevent]
pub struct ResultsObtained {
    #[topic]
    pub round: u32,
    pub results: Vec<u32>,
}

#[contractevent]
pub struct PointsEarned {
    #[topic]
    pub round: u32,
    #[topic]
    pub token_id: u32,
    pub points: u64,
}

#[contractevent]
pub struct RoundClosed {
    #[topic]
    pub round: u32,
    pub next_round: u32,
}

#[contractevent]
pub struct OracleUpdated {
    pub oracle: Address,
}

#[contractevent]
pub struct WinnersSet {
    pub winners: Vec<u32>,
}

#[contractevent]
pub struct PrizePaid {
    #[topic]
    pub token_id: u32,
    #[topic]
    pub to: Address,
    pub amount: i128,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct PredictionGame;

#[contractimpl]
impl PredictionGame {
    // -----------------------------------------------------------------------
    // init
    // -----------------------------------------------------------------------

    /// Initialize the game. May only be called once.
    ///
    /// `schedule` must hold exactly one window per round. Windows are taken as
    /// given; their order and overlap are the deployer's responsibility.
    pub fn init(
        env: Env,
        admin: Address,
        oracle: Address,
        payment_token: Address,
        config: GameConfig,
        schedule: Vec<RoundWindow>,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }

        admin.require_auth();

        if config.num_rounds == 0
            || config.predictions_per_round == 0
            || config.num_winners == 0
            || config.mint_price < 0
        {
            return Err(Error::InvalidConfig);
        }
        if schedule.len() != config.num_rounds {
            return Err(Error::InvalidSchedule);
        }

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Config, &config);
        env.storage().instance().set(&DataKey::Schedule, &schedule);
        env.storage().instance().set(&DataKey::Oracle, &oracle);
        env.storage().instance().set(&DataKey::PaymentToken, &payment_token);
        env.storage().instance().set(&DataKey::CurrentRound, &1u32);
        env.storage().instance().set(&DataKey::TotalSupply, &0u32);

        Initialized {
            admin,
            oracle,
            num_rounds: config.num_rounds,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // mint
    // -----------------------------------------------------------------------

    /// Mint `amount` entries to `to`, charging `mint_price` each in the payment
    /// token. Returns the first new token id; ids are sequential from 0.
    pub fn mint(env: Env, to: Address, amount: u32) -> Result<u32, Error> {
        require_initialized(&env)?;
        to.require_auth();

        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        if !schedule::is_minting_open(&get_schedule(&env)?, env.ledger().timestamp()) {
            return Err(Error::MintingClosed);
        }

        let config = get_config(&env)?;
        let cost = config
            .mint_price
            .checked_mul(amount as i128)
            .ok_or(Error::Overflow)?;

        let first_id = get_total_supply(&env);
        let new_supply = first_id.checked_add(amount).ok_or(Error::Overflow)?;

        for token_id in first_id..new_supply {
            set_persistent(&env, &DataKey::Owner(token_id), &to);
            EntryMinted {
                token_id,
                owner: to.clone(),
            }
            .publish(&env);
        }
        env.storage()
            .instance()
            .set(&DataKey::TotalSupply, &new_supply);

        if cost > 0 {
            with_lock(&env, || {
                let token = get_payment_token(&env)?;
                TokenClient::new(&env, &token).transfer(
                    &to,
                    env.current_contract_address(),
                    &cost,
                );
                Ok(())
            })?;
        }

        Ok(first_id)
    }

    // -----------------------------------------------------------------------
    // submit_predictions
    // -----------------------------------------------------------------------

    /// Record `owner`'s picks for `token_id` in the current round.
    ///
    /// Submitting again inside the same window replaces the earlier picks. The
    /// token is listed once in the round's entry index either way, so it is
    /// scored once.
    pub fn submit_predictions(
        env: Env,
        owner: Address,
        token_id: u32,
        predictions: Vec<u32>,
    ) -> Result<(), Error> {
        require_initialized(&env)?;
        owner.require_auth();

        if owner_of_internal(&env, token_id)? != owner {
            return Err(Error::NotOwner);
        }
        bump_owner_ttl(&env, token_id);

        let config = get_config(&env)?;
        let round = get_current_round(&env);
        if round > config.num_rounds
            || !schedule::is_prediction_window_open(
                &get_schedule(&env)?,
                env.ledger().timestamp(),
                round,
            )
        {
            return Err(Error::WindowClosed);
        }

        if predictions.len() != config.predictions_per_round {
            return Err(Error::BadCardinality);
        }

        let record_key = DataKey::Predictions(token_id, round);
        let first_submission = !env.storage().persistent().has(&record_key);
        set_persistent(&env, &record_key, &predictions);

        if first_submission {
            let mut entries = round_entries(&env, round);
            entries.push_back(token_id);
            set_persistent(&env, &DataKey::RoundEntries(round), &entries);
        }

        PredictionRecorded {
            token_id,
            round,
            selections: predictions,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // check_upkeep / perform_upkeep
    // -----------------------------------------------------------------------

    /// True when `perform_upkeep` would close the current round right now.
    pub fn check_upkeep(env: Env) -> bool {
        if require_initialized(&env).is_err() {
            return false;
        }
        closable_round(&env).is_ok()
    }

    /// Close the current round: pull its results, credit every entry that
    /// predicted in it, and advance the cursor by one.
    ///
    /// Anyone may call this. When the round is not closable it fails with the
    /// first unmet condition and changes nothing.
    pub fn perform_upkeep(env: Env) -> Result<u32, Error> {
        require_initialized(&env)?;
        with_lock(&env, || close_round(&env))
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    pub fn set_oracle(env: Env, admin: Address, oracle: Address) -> Result<(), Error> {
        require_admin(&env, &admin)?;
        env.storage().instance().set(&DataKey::Oracle, &oracle);
        OracleUpdated { oracle }.publish(&env);
        Ok(())
    }

    /// Name the winning entries once the game is finished. Selection happens
    /// off-chain; this only checks that the set is well formed.
    pub fn set_winners(env: Env, admin: Address, winners: Vec<u32>) -> Result<(), Error> {
        require_admin(&env, &admin)?;

        let config = get_config(&env)?;
        if get_current_round(&env) <= config.num_rounds {
            return Err(Error::GameNotFinished);
        }
        if env.storage().instance().has(&DataKey::Winners) {
            return Err(Error::WinnersAlreadySet);
        }
        if winners.len() != config.num_winners {
            return Err(Error::InvalidWinners);
        }

        for (i, token_id) in winners.iter().enumerate() {
            owner_of_internal(&env, token_id)?;
            bump_owner_ttl(&env, token_id);
            if winners.first_index_of(token_id) != Some(i as u32) {
                return Err(Error::InvalidWinners);
            }
        }

        env.storage().instance().set(&DataKey::Winners, &winners);
        WinnersSet { winners }.publish(&env);
        Ok(())
    }

    /// Split the contract's payment-token balance equally between the current
    /// owners of the winning entries. Returns the amount paid per winner; any
    /// remainder from the division stays in the contract.
    ///
    /// A failed transfer aborts the whole payout.
    pub fn payout_winners(env: Env, admin: Address) -> Result<i128, Error> {
        require_admin(&env, &admin)?;

        let winners: Vec<u32> = env
            .storage()
            .instance()
            .get(&DataKey::Winners)
            .ok_or(Error::WinnersNotSet)?;
        if env
            .storage()
            .instance()
            .get(&DataKey::PrizePaid)
            .unwrap_or(false)
        {
            return Err(Error::PrizeAlreadyPaid);
        }

        let token = TokenClient::new(&env, &get_payment_token(&env)?);
        let pool = token.balance(&env.current_contract_address());
        let share = pool
            .checked_div(winners.len() as i128)
            .ok_or(Error::Overflow)?;
        if share <= 0 {
            return Err(Error::EmptyPrizePool);
        }

        // Marked before any transfer leaves the contract.
        env.storage().instance().set(&DataKey::PrizePaid, &true);

        with_lock(&env, || {
            for token_id in winners.iter() {
                let to = owner_of_internal(&env, token_id)?;
                token.transfer(&env.current_contract_address(), &to, &share);
                PrizePaid {
                    token_id,
                    to,
                    amount: share,
                }
                .publish(&env);
            }
            Ok(())
        })?;

        Ok(share)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn get_config(env: Env) -> Result<GameConfig, Error> {
        get_config(&env)
    }

    pub fn get_schedule(env: Env) -> Result<Vec<RoundWindow>, Error> {
        get_schedule(&env)
    }

    pub fn get_oracle(env: Env) -> Result<Address, Error> {
        get_oracle(&env)
    }

    /// 1-based. Equals `num_rounds + 1` once the game is finished.
    pub fn current_round(env: Env) -> Result<u32, Error> {
        require_initialized(&env)?;
        Ok(get_current_round(&env))
    }

    pub fn is_finished(env: Env) -> Result<bool, Error> {
        let config = get_config(&env)?;
        Ok(get_current_round(&env) > config.num_rounds)
    }

    pub fn game_phase(env: Env) -> Result<GamePhase, Error> {
        let config = get_config(&env)?;
        let round = get_current_round(&env);
        if round > config.num_rounds {
            return Ok(GamePhase::Finished);
        }
        if schedule::is_minting_open(&get_schedule(&env)?, env.ledger().timestamp()) {
            return Ok(GamePhase::Minting);
        }
        Ok(GamePhase::Open(round))
    }

    pub fn is_minting_open(env: Env) -> bool {
        match get_schedule(&env) {
            Ok(schedule) => schedule::is_minting_open(&schedule, env.ledger().timestamp()),
            Err(_) => false,
        }
    }

    /// Whether predictions for the current round are being accepted.
    pub fn is_prediction_window_open(env: Env) -> bool {
        match get_schedule(&env) {
            Ok(schedule) => schedule::is_prediction_window_open(
                &schedule,
                env.ledger().timestamp(),
                get_current_round(&env),
            ),
            Err(_) => false,
        }
    }

    pub fn owner_of(env: Env, token_id: u32) -> Result<Address, Error> {
        owner_of_internal(&env, token_id)
    }

    pub fn total_supply(env: Env) -> u32 {
        get_total_supply(&env)
    }

    pub fn get_predictions(env: Env, token_id: u32, round: u32) -> Option<Vec<u32>> {
        env.storage()
            .persistent()
            .get(&DataKey::Predictions(token_id, round))
    }

    pub fn get_round_entries(env: Env, round: u32) -> Vec<u32> {
        round_entries(&env, round)
    }

    pub fn get_score(env: Env, token_id: u32) -> u64 {
        get_score(&env, token_id)
    }

    /// Cumulative score of every minted entry, indexed by token id.
    pub fn cumulative_scores(env: Env) -> Vec<u64> {
        let mut scores = Vec::new(&env);
        for token_id in 0..get_total_supply(&env) {
            scores.push_back(get_score(&env, token_id));
        }
        scores
    }

    pub fn get_winners(env: Env) -> Option<Vec<u32>> {
        env.storage().instance().get(&DataKey::Winners)
    }
}

// ---------------------------------------------------------------------------
// Round closing
// ---------------------------------------------------------------------------

/// Current round if it can be closed now, otherwise the first unmet condition.
fn closable_round(env: &Env) -> Result<u32, Error> {
    let config = get_config(env)?;
    let round = get_current_round(env);
    if round > config.num_rounds {
        return Err(Error::GameFinished);
    }
    if !schedule::is_round_overdue(&get_schedule(env)?, env.ledger().timestamp(), round) {
        return Err(Error::RoundNotOverdue);
    }
    if !ResultsOracleClient::new(env, &get_oracle(env)?).results_ready(&round) {
        return Err(Error::ResultsNotReady);
    }
    Ok(round)
}

fn close_round(env: &Env) -> Result<u32, Error> {
    let round = closable_round(env)?;

    let results = ResultsOracleClient::new(env, &get_oracle(env)?).get_results(&round);
    ResultsObtained {
        round,
        results: results.clone(),
    }
    .publish(env);

    let entries = round_entries(env, round);
    for token_id in entries.iter() {
        let selections: Vec<u32> = env
            .storage()
            .persistent()
            .get(&DataKey::Predictions(token_id, round))
            .unwrap_or(Vec::new(env));
        let points = scoring::points_for(&results, &selections).ok_or(Error::Overflow)?;
        if points > 0 {
            credit(env, token_id, points)?;
            PointsEarned {
                round,
                token_id,
                points,
            }
            .publish(env);
        }
    }

    let next_round = round.checked_add(1).ok_or(Error::Overflow)?;
    env.storage()
        .instance()
        .set(&DataKey::CurrentRound, &next_round);

    log!(env, "round closed", round, entries.len());
    RoundClosed { round, next_round }.publish(env);

    Ok(next_round)
}

/// Scores only ever grow.
fn credit(env: &Env, token_id: u32, amount: u64) -> Result<u64, Error> {
    let total = get_score(env, token_id)
        .checked_add(amount)
        .ok_or(Error::Overflow)?;
    set_persistent(env, &DataKey::Score(token_id), &total);
    Ok(total)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Runs `f` holding the execution lock. Nested entry into another locked
/// operation fails with `Reentrant`; the lock is cleared whatever `f` returns.
/// The Soroban host already refuses contract re-entry; this is the backup.
fn with_lock<T>(env: &Env, f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    let locked: bool = env
        .storage()
        .instance()
        .get(&DataKey::Locked)
        .unwrap_or(false);
    if locked {
        return Err(Error::Reentrant);
    }
    env.storage().instance().set(&DataKey::Locked, &true);
    let result = f();
    env.storage().instance().set(&DataKey::Locked, &false);
    result
}

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Admin) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn require_admin(env: &Env, caller: &Address) -> Result<(), Error> {
    let admin: Address = env
        .storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if caller != &admin {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn get_config(env: &Env) -> Result<GameConfig, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .ok_or(Error::NotInitialized)
}

fn get_schedule(env: &Env) -> Result<Vec<RoundWindow>, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Schedule)
        .ok_or(Error::NotInitialized)
}

fn get_oracle(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Oracle)
        .ok_or(Error::NotInitialized)
}

fn get_payment_token(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::PaymentToken)
        .ok_or(Error::NotInitialized)
}

fn get_current_round(env: &Env) -> u32 {
    env.storage()
        .instance()
        .get(&DataKey::CurrentRound)
        .unwrap_or(1)
}

fn get_total_supply(env: &Env) -> u32 {
    env.storage()
        .instance()
        .get(&DataKey::TotalSupply)
        .unwrap_or(0)
}

fn owner_of_internal(env: &Env, token_id: u32) -> Result<Address, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Owner(token_id))
        .ok_or(Error::TokenNotFound)
}

/// Keeps an entry's owner record alive while the entry is in play.
fn bump_owner_ttl(env: &Env, token_id: u32) {
    env.storage().persistent().extend_ttl(
        &DataKey::Owner(token_id),
        PERSISTENT_BUMP_LEDGERS,
        PERSISTENT_BUMP_LEDGERS,
    );
}

fn round_entries(env: &Env, round: u32) -> Vec<u32> {
    env.storage()
        .persistent()
        .get(&DataKey::RoundEntries(round))
        .unwrap_or(Vec::new(env))
}

fn get_score(env: &Env, token_id: u32) -> u64 {
    env.storage()
        .persistent()
        .get(&DataKey::Score(token_id))
        .unwrap_or(0)
}

/// Write to persistent storage and extend its TTL in one step.
fn set_persistent<V>(env: &Env, key: &DataKey, value: &V)
where
    V: soroban_sdk::IntoVal<Env, soroban_sdk::Val>,
{
    env.storage().persistent().set(key, value);
    env.storage()
        .persistent()
        .extend_ttl(key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
