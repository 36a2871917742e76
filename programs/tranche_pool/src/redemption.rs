// programs/tranche_pool/src/redemption.rs
//
// Redemption Ledger
// =================
// Tranche-level summaries are written once per epoch at close. Lender
// records are reconciled against them lazily: the first interaction after
// one or more epochs close replays those epochs' summaries in order, so
// closing an epoch never touches individual lenders.

use anchor_lang::prelude::*;
use credit_core::math::{mul_div, mul_div_ceil};

use crate::errors::PoolError;

// =============================================================================
// TRANCHE SUMMARY
// =============================================================================

/// One tranche's redemption demand and fulfillment for one epoch
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Default, PartialEq, Eq, Debug, InitSpace)]
pub struct RedemptionSummary {
    pub epoch_id: u64,
    pub shares_requested: u64,
    pub shares_processed: u64,
    pub amount_processed: u64,
}

impl RedemptionSummary {
    pub fn open(epoch_id: u64, carried_shares: u64) -> Self {
        Self {
            epoch_id,
            shares_requested: carried_shares,
            shares_processed: 0,
            amount_processed: 0,
        }
    }

    pub fn outstanding_shares(&self) -> u64 {
        self.shares_requested.saturating_sub(self.shares_processed)
    }

    pub fn is_fully_processed(&self) -> bool {
        self.shares_processed >= self.shares_requested
    }

    /// Open the summary for `epoch_id`, carrying unfulfilled shares forward.
    /// Does nothing if this summary already belongs to `epoch_id`.
    pub fn roll_to(&mut self, epoch_id: u64) {
        if self.epoch_id < epoch_id {
            *self = Self::open(epoch_id, self.outstanding_shares());
        }
    }

    pub fn record_processing(&mut self, shares_processed: u64, amount_processed: u64) {
        self.shares_processed = shares_processed.min(self.shares_requested);
        self.amount_processed = amount_processed;
    }
}

// =============================================================================
// LENDER RECORD
// =============================================================================

/// One lender's cumulative redemption position in a tranche
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Default, PartialEq, Eq, Debug, InitSpace)]
pub struct LenderRedemptionRecord {
    /// First epoch not yet reconciled into this record
    pub last_updated_epoch_id: u64,

    /// Unfulfilled shares still waiting for an epoch close
    pub shares_requested: u64,

    /// Principal behind `shares_requested`
    pub principal_requested: u64,

    /// Cumulative redemption proceeds
    pub amount_processed: u64,

    /// Cumulative proceeds already paid out
    pub amount_withdrawn: u64,
}

impl LenderRedemptionRecord {
    pub fn withdrawable_assets(&self) -> u64 {
        self.amount_processed.saturating_sub(self.amount_withdrawn)
    }

    pub fn is_reconciled(&self, current_epoch_id: u64) -> bool {
        self.last_updated_epoch_id >= current_epoch_id
    }

    pub fn add_request(&mut self, shares: u64, principal: u64, current_epoch_id: u64) -> Result<()> {
        require!(
            self.is_reconciled(current_epoch_id) || self.shares_requested == 0,
            PoolError::RedemptionLedgerStale
        );
        self.shares_requested = self.shares_requested.saturating_add(shares);
        self.principal_requested = self.principal_requested.saturating_add(principal);
        self.last_updated_epoch_id = current_epoch_id;
        Ok(())
    }

    /// Withdraw `shares` from the open epoch's request, returning the
    /// principal that goes back to the spendable balance
    pub fn cancel_request(&mut self, shares: u64, current_epoch_id: u64) -> Result<u64> {
        require!(
            self.is_reconciled(current_epoch_id),
            PoolError::RedemptionLedgerStale
        );
        require!(
            shares > 0 && shares <= self.shares_requested,
            PoolError::InvalidCancellation
        );

        let principal = if shares == self.shares_requested {
            self.principal_requested
        } else {
            mul_div(self.principal_requested, shares, self.shares_requested)
        };
        self.shares_requested -= shares;
        self.principal_requested -= principal;
        Ok(principal)
    }

    /// Mark everything processed as paid, returning the amount to transfer
    pub fn mark_withdrawn(&mut self) -> u64 {
        let amount = self.withdrawable_assets();
        self.amount_withdrawn = self.amount_processed;
        amount
    }
}

// =============================================================================
// REPLAY
// =============================================================================

/// One closed epoch as seen by the replay: its persisted summary, or `None`
/// when the tranche had no demand and nothing was processed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochSlot {
    pub epoch_id: u64,
    pub summary: Option<RedemptionSummary>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub from_epoch_id: u64,
    pub to_epoch_id: u64,
    pub epochs_replayed: u32,
    pub shares_processed: u64,
    pub principal_processed: u64,
    pub amount_processed: u64,
}

/// Replays closed-epoch summaries into a lender record, oldest first
pub struct RedemptionReplay<'r> {
    record: &'r mut LenderRedemptionRecord,
    current_epoch_id: u64,
    report: ReplayReport,
}

impl<'r> RedemptionReplay<'r> {
    pub fn new(record: &'r mut LenderRedemptionRecord, current_epoch_id: u64) -> Self {
        let from_epoch_id = record.last_updated_epoch_id;
        Self {
            record,
            current_epoch_id,
            report: ReplayReport {
                from_epoch_id,
                to_epoch_id: from_epoch_id,
                ..Default::default()
            },
        }
    }

    /// Nothing left to replay: caught up, or no outstanding shares
    pub fn is_complete(&self) -> bool {
        self.record.is_reconciled(self.current_epoch_id) || self.record.shares_requested == 0
    }

    /// Epoch the next slot must describe
    pub fn next_epoch_id(&self) -> Option<u64> {
        if self.is_complete() {
            None
        } else {
            Some(self.record.last_updated_epoch_id)
        }
    }

    pub fn apply(&mut self, slot: EpochSlot) -> Result<()> {
        require!(
            self.next_epoch_id() == Some(slot.epoch_id),
            PoolError::RedemptionSummaryMismatch
        );

        if let Some(summary) = slot.summary {
            require!(
                summary.epoch_id == slot.epoch_id,
                PoolError::RedemptionSummaryMismatch
            );
            self.apply_summary(&summary);
        }

        self.record.last_updated_epoch_id = slot.epoch_id + 1;
        self.report.epochs_replayed += 1;
        Ok(())
    }

    // Apply the tranche-wide fulfillment ratio to the lender's outstanding
    // shares. An epoch that served all demand serves every lender in full.
    // Shares round up and amounts round down, so lenders never hold more
    // outstanding shares, or receive more funds, than the tranche recorded.
    fn apply_summary(&mut self, summary: &RedemptionSummary) {
        if summary.shares_requested == 0 || summary.shares_processed == 0 {
            return;
        }

        let remaining = self.record.shares_requested;
        let shares = if summary.is_fully_processed() {
            remaining
        } else {
            mul_div_ceil(remaining, summary.shares_processed, summary.shares_requested)
                .min(remaining)
        };
        let amount = mul_div(
            remaining.min(summary.shares_requested),
            summary.amount_processed,
            summary.shares_requested,
        );
        let principal = if shares == remaining {
            self.record.principal_requested
        } else {
            mul_div(self.record.principal_requested, shares, remaining)
        };

        self.record.shares_requested -= shares;
        self.record.principal_requested -= principal;
        self.record.amount_processed = self.record.amount_processed.saturating_add(amount);

        self.report.shares_processed = self.report.shares_processed.saturating_add(shares);
        self.report.principal_processed = self.report.principal_processed.saturating_add(principal);
        self.report.amount_processed = self.report.amount_processed.saturating_add(amount);
    }

    /// Stop replaying. A record with no outstanding shares jumps straight to
    /// the current epoch; otherwise progress stops at the last slot applied.
    pub fn finish(self) -> ReplayReport {
        if self.record.shares_requested == 0
            && self.record.last_updated_epoch_id < self.current_epoch_id
        {
            self.record.last_updated_epoch_id = self.current_epoch_id;
        }
        ReplayReport {
            to_epoch_id: self.record.last_updated_epoch_id,
            ..self.report
        }
    }
}

/// Replay as many slots as the record needs; extra slots are ignored
pub fn replay_epochs<I>(
    record: &mut LenderRedemptionRecord,
    current_epoch_id: u64,
    slots: I,
) -> Result<ReplayReport>
where
    I: IntoIterator<Item = EpochSlot>,
{
    let mut replay = RedemptionReplay::new(record, current_epoch_id);
    for slot in slots {
        if replay.is_complete() {
            break;
        }
        replay.apply(slot)?;
    }
    Ok(replay.finish())
}
