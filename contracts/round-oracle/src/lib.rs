//! Round results oracle.
//!
//! Whitelisted reporters publish the per-option point values of a finished
//! round exactly once. The prediction game reads them back through the
//! `ResultsOracle` interface from `predictor-shared`.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, panic_with_error, Address,
    Env, Vec,
};

use predictor_shared::ResultsOracle;

#[contract]
pub struct RoundOracle;

//
// ─────────────────────────────────────────────
// STORAGE
// ─────────────────────────────────────────────
//

#[derive(Clone)]
#[contracttype]
pub enum DataKey {
    Admin,
    Reporters,
    Results(u32),
}

//
// ─────────────────────────────────────────────
// EVENTS
// ─────────────────────────────────────────────
//

#[contractevent]
pub struct Initialized {
    pub admin: Address,
}

#[contractevent]
pub struct ReporterUpdated {
    #[topic]
    pub reporter: Address,
    pub allowed: bool,
}

#[contractevent]
pub struct ResultsReported {
    #[topic]
    pub round: u32,
    pub reporter: Address,
    pub results: Vec<u32>,
}

//
// ─────────────────────────────────────────────
// ERRORS
// ─────────────────────────────────────────────
//

#[contracterror]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAuthorized = 3,
    InvalidInput = 4,
    ReporterNotWhitelisted = 5,
    AlreadyReported = 6,
    ResultsNotFound = 7,
    Overflow = 8,
}

//
// ─────────────────────────────────────────────
// TTL CONFIG
// ─────────────────────────────────────────────
//

const TTL_RENEW_WINDOW: u32 = 1_000;

fn renew_persistent_ttl(env: &Env, key: &DataKey) -> Result<(), Error> {
    let max_ttl = env.storage().max_ttl();

    let threshold = max_ttl
        .checked_sub(TTL_RENEW_WINDOW)
        .ok_or(Error::Overflow)?;

    env.storage()
        .persistent()
        .extend_ttl(key, threshold, max_ttl);

    Ok(())
}

//
// ─────────────────────────────────────────────
// CONTRACT IMPLEMENTATION
// ─────────────────────────────────────────────
//

#[contractimpl]
impl RoundOracle {

    // ───────── INIT ─────────

    pub fn init(env: Env, admin: Address, reporters: Vec<Address>) -> Result<(), Error> {
        admin.require_auth();

        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }

        if reporters.is_empty() {
            return Err(Error::InvalidInput);
        }

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Reporters, &reporters);

        Initialized { admin }.publish(&env);

        Ok(())
    }

    // ───────── REPORTER WHITELIST ─────────

    pub fn set_reporter(
        env: Env,
        admin: Address,
        reporter: Address,
        allowed: bool,
    ) -> Result<(), Error> {
        require_admin(&env, &admin)?;

        let mut reporters = get_reporters(&env)?;
        let position = reporters.first_index_of(&reporter);

        match (allowed, position) {
            (true, None) => reporters.push_back(reporter.clone()),
            (false, Some(idx)) => {
                reporters.remove(idx);
            }
            _ => {}
        }

        env.storage().instance().set(&DataKey::Reporters, &reporters);

        ReporterUpdated { reporter, allowed }.publish(&env);

        Ok(())
    }

    // ───────── REPORT RESULTS ─────────

    /// Publish the point value of every option for `round`. Each round can be
    /// reported once; a wrong report cannot be corrected afterwards.
    pub fn report_results(
        env: Env,
        reporter: Address,
        round: u32,
        results: Vec<u32>,
    ) -> Result<(), Error> {
        reporter.require_auth();

        if round == 0 || results.is_empty() {
            return Err(Error::InvalidInput);
        }

        let reporters = get_reporters(&env)?;
        if !reporters.contains(&reporter) {
            return Err(Error::ReporterNotWhitelisted);
        }

        let key = DataKey::Results(round);
        if env.storage().persistent().has(&key) {
            return Err(Error::AlreadyReported);
        }

        env.storage().persistent().set(&key, &results);
        renew_persistent_ttl(&env, &key)?;

        ResultsReported {
            round,
            reporter,
            results,
        }
        .publish(&env);

        Ok(())
    }

    // ───────── READ METHODS ─────────

    pub fn get_reporters(env: Env) -> Result<Vec<Address>, Error> {
        get_reporters(&env)
    }
}

#[contractimpl]
impl ResultsOracle for RoundOracle {
    fn results_ready(env: Env, round: u32) -> bool {
        env.storage().persistent().has(&DataKey::Results(round))
    }

    fn get_results(env: Env, round: u32) -> Vec<u32> {
        let key = DataKey::Results(round);
        let results: Vec<u32> = env
            .storage()
            .persistent()
            .get(&key)
            .unwrap_or_else(|| panic_with_error!(&env, Error::ResultsNotFound));

        if let Err(e) = renew_persistent_ttl(&env, &key) {
            panic_with_error!(&env, e)
        }

        results
    }
}

//
// ─────────────────────────────────────────────
// INTERNAL HELPERS
// ─────────────────────────────────────────────
//

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

fn get_reporters(env: &Env) -> Result<Vec<Address>, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Reporters)
        .ok_or(Error::NotInitialized)
}
