#![no_std]

mod account;
mod accrual;

use soroban_sdk::{contract, contractimpl, contracttype, symbol_short, token, Address, Env};

pub use account::{StreamAccount, StreamStatus, Transfer};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Revision of the persisted `StreamAccount` layout. Bumped on every schema
/// change; a stored account carrying any other revision is refused with
/// `CorruptState` until migrated.
pub const SCHEMA_VERSION: u32 = 1;

const TTL_THRESHOLD: u32 = 17280;
const TTL_EXTEND_TO: u32 = 120960;

/// Global configuration, written once by `init`.
#[contracttype]
#[derive(Clone, Debug)]
pub struct Config {
    pub token: Address,
    pub cancel_policy: CancelPolicy,
}

/// Who may cancel the stream.
///
/// `Either` preserves the bilateral-exit guarantee: both parties keep a
/// unilateral way out, with earned and unearned funds split at the
/// cancellation instant.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancelPolicy {
    SenderOnly = 0,
    ReceiverOnly = 1,
    Either = 2,
}

#[soroban_sdk::contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ContractError {
    AlreadyInitialized = 1,
    NotActive = 2,
    Unauthorized = 3,
    InvalidParameters = 4,
    InsufficientAccrued = 5,
    CorruptState = 6,
}

/// Namespace for all contract storage keys.
#[contracttype]
pub enum DataKey {
    Config,        // Instance storage for token/cancel-policy settings.
    Account,       // Persistent storage for the single stream account.
    SchemaVersion, // Persistent storage revision of the account layout.
}

// ---------------------------------------------------------------------------
// Storage helpers
// ---------------------------------------------------------------------------

fn get_config(env: &Env) -> Result<Config, ContractError> {
    // Operations on an instance whose config cell is absent fail closed.
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .ok_or(ContractError::CorruptState)
}

/// Load the stream account, distinguishing a never-created instance
/// (`Ok(None)`) from an unreadable one (`CorruptState`).
///
/// The account and its schema revision are written together; one without the
/// other, or a revision this build does not understand, is refused rather
/// than defaulted.
fn try_load_account(env: &Env) -> Result<Option<StreamAccount>, ContractError> {
    let storage = env.storage().persistent();
    let account: Option<StreamAccount> = storage.get(&DataKey::Account);
    let version: Option<u32> = storage.get(&DataKey::SchemaVersion);
    match (account, version) {
        (None, None) => Ok(None),
        (Some(account), Some(version)) if version == SCHEMA_VERSION => Ok(Some(account)),
        _ => Err(ContractError::CorruptState),
    }
}

fn save_account(env: &Env, account: &StreamAccount) {
    let storage = env.storage().persistent();
    storage.set(&DataKey::Account, account);
    storage.set(&DataKey::SchemaVersion, &SCHEMA_VERSION);

    storage.extend_ttl(&DataKey::Account, TTL_THRESHOLD, TTL_EXTEND_TO);
    storage.extend_ttl(&DataKey::SchemaVersion, TTL_THRESHOLD, TTL_EXTEND_TO);
}

// ---------------------------------------------------------------------------
// Contract Implementation
// ---------------------------------------------------------------------------

#[contract]
pub struct Streaming;

#[contractimpl]
impl Streaming {
    /// Initialise the contract with the streaming token and cancellation
    /// policy.
    ///
    /// Must be called exactly once before any other operation. The token
    /// address is used for every transfer in and out of the stream; the
    /// policy decides which party may cancel it.
    ///
    /// # Errors
    /// - `AlreadyInitialized` if called more than once
    pub fn init(env: Env, token: Address, cancel_policy: CancelPolicy) -> Result<(), ContractError> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(ContractError::AlreadyInitialized);
        }
        let config = Config {
            token,
            cancel_policy,
        };
        env.storage().instance().set(&DataKey::Config, &config);

        // Ensure instance storage doesn't expire quickly
        env.storage().instance().extend_ttl(TTL_THRESHOLD, TTL_EXTEND_TO);
        Ok(())
    }

    /// Create the stream this instance manages.
    ///
    /// One instance holds exactly one stream. The initial deposit is
    /// transferred from the sender before the account is persisted, so a
    /// failed transfer creates no state. With `stop_time = None` the stream
    /// is open-ended and pays out until its pool is exhausted or it is
    /// cancelled.
    ///
    /// Accrual begins at `max(now, start_time)`: a backdated `start_time`
    /// does not grant the receiver elapsed time from before the stream
    /// existed.
    ///
    /// # Authorization
    /// - Requires authorization from `sender`
    ///
    /// # Errors
    /// - `AlreadyInitialized` if the stream was already created
    /// - `InvalidParameters` if `rate_per_second < 0`, `initial_deposit < 0`,
    ///   or `stop_time < start_time`
    ///
    /// # Events
    /// - Publishes `created` with the initial deposit on success
    pub fn create(
        env: Env,
        sender: Address,
        receiver: Address,
        rate_per_second: i128,
        start_time: u64,
        stop_time: Option<u64>,
        initial_deposit: i128,
    ) -> Result<(), ContractError> {
        sender.require_auth();

        let config = get_config(&env)?;
        if try_load_account(&env)?.is_some() {
            return Err(ContractError::AlreadyInitialized);
        }

        let account = StreamAccount::create(
            sender.clone(),
            receiver,
            rate_per_second,
            start_time,
            stop_time,
            initial_deposit,
            env.ledger().timestamp(),
        )?;

        // If the transfer fails nothing is persisted (atomic transaction).
        if initial_deposit > 0 {
            let token_client = token::Client::new(&env, &config.token);
            token_client.transfer(&sender, &env.current_contract_address(), &initial_deposit);
        }
        save_account(&env, &account);

        env.events()
            .publish((symbol_short!("created"),), initial_deposit);
        Ok(())
    }

    /// Top up the stream's pool.
    ///
    /// Any funder may deposit; they authorize the call and pay. The elapsed
    /// window is settled under the pre-deposit pool first, so the larger pool
    /// only feeds accrual from this point forward; deposits are not
    /// retroactive.
    ///
    /// # Errors
    /// - `NotActive` unless the stream is `Active`
    /// - `InvalidParameters` unless `amount > 0`
    ///
    /// # Events
    /// - Publishes `deposited` with the amount on success
    pub fn deposit(env: Env, from: Address, amount: i128) -> Result<(), ContractError> {
        from.require_auth();

        let config = get_config(&env)?;
        let mut account = try_load_account(&env)?.ok_or(ContractError::NotActive)?;
        account.deposit(amount, env.ledger().timestamp())?;

        let token_client = token::Client::new(&env, &config.token);
        token_client.transfer(&from, &env.current_contract_address(), &amount);
        save_account(&env, &account);

        env.events().publish((symbol_short!("deposited"),), amount);
        Ok(())
    }

    /// Withdraw a receiver-chosen amount of accrued funds.
    ///
    /// The receiver picks the amount so withdrawals can be batched to
    /// amortise transaction cost. Requests exceeding the unwithdrawn accrual
    /// are rejected outright, never clamped. Works while `Active` and, as
    /// settlement, after cancellation.
    ///
    /// # Returns
    /// - The amount transferred to the receiver
    ///
    /// # Errors
    /// - `NotActive` if the stream was never created
    /// - `Unauthorized` if `requestor` is not the receiver
    /// - `InvalidParameters` unless `amount > 0`
    /// - `InsufficientAccrued` if `amount` exceeds the unwithdrawn accrual
    ///
    /// # Events
    /// - Publishes `withdrew` with the amount on success
    pub fn withdraw(env: Env, requestor: Address, amount: i128) -> Result<i128, ContractError> {
        requestor.require_auth();

        let config = get_config(&env)?;
        let mut account = try_load_account(&env)?.ok_or(ContractError::NotActive)?;
        let transfer = account.withdraw(&requestor, amount, env.ledger().timestamp())?;

        // CEI: update state before the external token transfer.
        save_account(&env, &account);

        let token_client = token::Client::new(&env, &config.token);
        token_client.transfer(&env.current_contract_address(), &transfer.to, &transfer.amount);

        env.events()
            .publish((symbol_short!("withdrew"),), transfer.amount);
        Ok(transfer.amount)
    }

    /// Cancel the stream and refund the never-to-be-earned remainder to the
    /// sender.
    ///
    /// Accrual freezes at the cancellation instant. What the receiver already
    /// earned stays in the contract for later settlement withdrawals; what
    /// they were never going to earn goes back to the sender immediately.
    /// Irreversible.
    ///
    /// # Returns
    /// - The refund transferred to the sender (0 if fully accrued)
    ///
    /// # Authorization
    /// - `requestor` must be admitted by the configured `CancelPolicy`
    ///
    /// # Errors
    /// - `NotActive` unless the stream is `Active`
    /// - `Unauthorized` if the policy does not admit `requestor`
    ///
    /// # Events
    /// - Publishes `cancelled` with the refund on success
    pub fn cancel(env: Env, requestor: Address) -> Result<i128, ContractError> {
        requestor.require_auth();

        let config = get_config(&env)?;
        let mut account = try_load_account(&env)?.ok_or(ContractError::NotActive)?;
        let refund = account.cancel(&requestor, config.cancel_policy, env.ledger().timestamp())?;

        // CEI: update state before the external token transfer.
        save_account(&env, &account);

        let refunded = match refund {
            Some(transfer) => {
                let token_client = token::Client::new(&env, &config.token);
                token_client.transfer(
                    &env.current_contract_address(),
                    &transfer.to,
                    &transfer.amount,
                );
                transfer.amount
            }
            None => 0,
        };

        env.events().publish((symbol_short!("cancelled"),), refunded);
        Ok(refunded)
    }

    /// Change the streaming rate for future accrual.
    ///
    /// The elapsed window is settled under the old rate first, so nothing the
    /// receiver already earned changes. A new rate of 0 suspends accrual
    /// without ending the stream.
    ///
    /// # Authorization
    /// - Only the sender may adjust the rate
    ///
    /// # Errors
    /// - `NotActive` unless the stream is `Active`
    /// - `Unauthorized` if `requestor` is not the sender
    /// - `InvalidParameters` if `new_rate < 0`
    ///
    /// # Events
    /// - Publishes `adjusted` with the new rate on success
    pub fn adjust_rate(env: Env, requestor: Address, new_rate: i128) -> Result<(), ContractError> {
        requestor.require_auth();

        let mut account = try_load_account(&env)?.ok_or(ContractError::NotActive)?;
        account.adjust_rate(&requestor, new_rate, env.ledger().timestamp())?;
        save_account(&env, &account);

        env.events().publish((symbol_short!("adjusted"),), new_rate);
        Ok(())
    }

    /// Accrued-but-unwithdrawn amount at the current ledger timestamp.
    ///
    /// View function: no state change, no authorization, callable at any
    /// status. Returns 0 before the stream is created; frozen forever after
    /// cancellation.
    pub fn withdrawable(env: Env) -> Result<i128, ContractError> {
        match try_load_account(&env)? {
            Some(account) => Ok(account.withdrawable(env.ledger().timestamp())),
            None => Ok(0),
        }
    }

    /// Current lifecycle status; `Uninitialized` before the stream is created.
    pub fn status(env: Env) -> Result<StreamStatus, ContractError> {
        Ok(try_load_account(&env)?
            .map(|account| account.status)
            .unwrap_or(StreamStatus::Uninitialized))
    }

    /// Complete stored state of the stream account.
    pub fn get_account(env: Env) -> Result<StreamAccount, ContractError> {
        try_load_account(&env)?.ok_or(ContractError::NotActive)
    }

    /// The global contract configuration.
    pub fn get_config(env: Env) -> Result<Config, ContractError> {
        get_config(&env)
    }
}
