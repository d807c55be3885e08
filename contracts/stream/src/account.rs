//! Stream account state machine.
//!
//! Transitions here are pure: each takes the loaded account, the message
//! fields and the invocation timestamp, and either mutates the in-memory copy
//! and returns the transfers the contract owes, or fails with a
//! [`ContractError`] before anything is persisted. The contract layer in
//! `lib.rs` saves the copy and executes the returned transfers only on
//! success, so a rejected message leaves the stored account untouched.

use soroban_sdk::{contracttype, Address};

use crate::{accrual, CancelPolicy, ContractError};

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamStatus {
    Uninitialized = 0,
    Active = 1,
    Cancelled = 2,
}

/// Outbound value transfer owed by a transition.
///
/// Never performed inside the state machine; the contract layer executes it
/// after the new account state is saved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transfer {
    pub to: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamAccount {
    pub sender: Address,
    pub receiver: Address,
    pub rate_per_second: i128,
    pub start_time: u64,
    /// Accrual stops here; `None` means the stream is open-ended.
    pub stop_time: Option<u64>,
    /// Cumulative deposits, monotonically non-decreasing.
    pub deposited: i128,
    /// Cumulative withdrawals, monotonically non-decreasing.
    pub withdrawn: i128,
    /// Accrual settled as of `last_accrual_time`. Deposits and rate changes
    /// settle before mutating, so this prefix is never recomputed under the
    /// new parameters.
    pub accrued: i128,
    pub last_accrual_time: u64,
    pub status: StreamStatus,
}

impl StreamAccount {
    /// Validate creation parameters and build the initial `Active` account.
    pub fn create(
        sender: Address,
        receiver: Address,
        rate_per_second: i128,
        start_time: u64,
        stop_time: Option<u64>,
        initial_deposit: i128,
        now: u64,
    ) -> Result<Self, ContractError> {
        if rate_per_second < 0 || initial_deposit < 0 {
            return Err(ContractError::InvalidParameters);
        }
        if let Some(stop) = stop_time {
            if stop < start_time {
                return Err(ContractError::InvalidParameters);
            }
        }

        Ok(StreamAccount {
            sender,
            receiver,
            rate_per_second,
            start_time,
            stop_time,
            deposited: initial_deposit,
            withdrawn: 0,
            accrued: 0,
            last_accrual_time: now.max(start_time),
            status: StreamStatus::Active,
        })
    }

    /// Settle accrual up to `now` and advance `last_accrual_time`.
    ///
    /// Every mutating operation settles first, so elapsed time is charged
    /// exactly once and always under the parameters that were live while it
    /// elapsed.
    fn settle(&mut self, now: u64) {
        let delta = accrual::accrual_delta(
            self.start_time,
            self.stop_time,
            self.last_accrual_time,
            self.rate_per_second,
            now,
        );
        let headroom = self.deposited - self.accrued;
        self.accrued += delta.min(headroom);
        if now > self.last_accrual_time {
            self.last_accrual_time = now;
        }
    }

    /// Top up the pool. Accrual forfeited while the old pool was exhausted is
    /// not revived: the elapsed window is settled under the pre-deposit pool
    /// before the new funds are counted.
    pub fn deposit(&mut self, amount: i128, now: u64) -> Result<(), ContractError> {
        if self.status != StreamStatus::Active {
            return Err(ContractError::NotActive);
        }
        if amount <= 0 {
            return Err(ContractError::InvalidParameters);
        }

        self.settle(now);
        self.deposited = self
            .deposited
            .checked_add(amount)
            .ok_or(ContractError::InvalidParameters)?;
        Ok(())
    }

    /// Withdraw a receiver-chosen amount of settled accrual.
    ///
    /// Valid while `Active` and, for settlement, after cancellation. The
    /// amount is never clamped: a request exceeding the unwithdrawn accrual
    /// is rejected outright.
    pub fn withdraw(
        &mut self,
        requestor: &Address,
        amount: i128,
        now: u64,
    ) -> Result<Transfer, ContractError> {
        if self.status == StreamStatus::Uninitialized {
            return Err(ContractError::NotActive);
        }
        if *requestor != self.receiver {
            return Err(ContractError::Unauthorized);
        }
        if amount <= 0 {
            return Err(ContractError::InvalidParameters);
        }

        self.settle(now);
        if amount > self.accrued - self.withdrawn {
            return Err(ContractError::InsufficientAccrued);
        }

        self.withdrawn += amount;
        Ok(Transfer {
            to: self.receiver.clone(),
            amount,
        })
    }

    /// Cancel the stream, freezing accrual at `now`.
    ///
    /// Returns the refund of the never-to-be-earned remainder owed to the
    /// sender, if any. Accrual already earned stays withdrawable by the
    /// receiver: neither party can seize what the other side's clock has
    /// decided.
    pub fn cancel(
        &mut self,
        requestor: &Address,
        policy: CancelPolicy,
        now: u64,
    ) -> Result<Option<Transfer>, ContractError> {
        if self.status != StreamStatus::Active {
            return Err(ContractError::NotActive);
        }
        let allowed = match policy {
            CancelPolicy::SenderOnly => *requestor == self.sender,
            CancelPolicy::ReceiverOnly => *requestor == self.receiver,
            CancelPolicy::Either => *requestor == self.sender || *requestor == self.receiver,
        };
        if !allowed {
            return Err(ContractError::Unauthorized);
        }

        self.settle(now);

        // Cap the window at the cancellation instant, keeping it no earlier
        // than start_time and no later than an already-passed stop_time.
        let freeze_at = match self.stop_time {
            Some(stop) => now.min(stop),
            None => now,
        }
        .max(self.start_time);
        self.stop_time = Some(freeze_at);
        self.status = StreamStatus::Cancelled;

        let refund = self.deposited - self.accrued;
        if refund > 0 {
            Ok(Some(Transfer {
                to: self.sender.clone(),
                amount: refund,
            }))
        } else {
            Ok(None)
        }
    }

    /// Install a new rate, settling the elapsed window under the old one
    /// first so already-earned amounts are unaffected.
    pub fn adjust_rate(
        &mut self,
        requestor: &Address,
        new_rate: i128,
        now: u64,
    ) -> Result<(), ContractError> {
        if self.status != StreamStatus::Active {
            return Err(ContractError::NotActive);
        }
        if *requestor != self.sender {
            return Err(ContractError::Unauthorized);
        }
        if new_rate < 0 {
            return Err(ContractError::InvalidParameters);
        }

        self.settle(now);
        self.rate_per_second = new_rate;
        Ok(())
    }

    /// Withdrawable amount at `now`, without mutating the account.
    ///
    /// Projects the settled accrual forward over the unsettled window. After
    /// cancellation the window is capped at the cancellation instant, so the
    /// projection is frozen for all later timestamps.
    pub fn withdrawable(&self, now: u64) -> i128 {
        let delta = accrual::accrual_delta(
            self.start_time,
            self.stop_time,
            self.last_accrual_time,
            self.rate_per_second,
            now,
        );
        let headroom = self.deposited - self.accrued;
        self.accrued + delta.min(headroom) - self.withdrawn
    }
}
