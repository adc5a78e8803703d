// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fee schedule for provider-facing money movements.
//!
//! Rates live as [`Decimal`] percentages and are applied to the minor-unit
//! amount with a single half-up rounding at the end, so a fee is never the
//! sum of two independently rounded parts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::error::LedgerError;
use crate::storage::records::{PayMethod, TxKind};

/// Fee components for one movement, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    /// Share forwarded to the payment provider.
    pub provider_cents: i64,
    /// Platform margin.
    pub platform_cents: i64,
}

impl FeeBreakdown {
    pub fn total_cents(&self) -> i64 {
        self.provider_cents + self.platform_cents
    }
}

/// Percentage-plus-fixed fee rule for one (method, direction) pair.
#[derive(Debug, Clone, Copy)]
struct FeeRule {
    provider_pct: Decimal,
    fixed_cents: i64,
}

/// Fee schedule keyed by payment method and movement direction.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    card_deposit: FeeRule,
    card_withdrawal: FeeRule,
    mobile_deposit: FeeRule,
    mobile_withdrawal: FeeRule,
    platform_pct: Decimal,
}

impl FeeSchedule {
    /// Production rates: card charges 2.9% + 30 minor units, card payouts 1%,
    /// mobile money 1% in and 1.5% out, plus a 0.5% platform margin on all
    /// four.
    pub fn standard() -> Self {
        Self {
            card_deposit: FeeRule {
                provider_pct: Decimal::new(29, 1), // 2.9
                fixed_cents: 30,
            },
            card_withdrawal: FeeRule {
                provider_pct: Decimal::ONE,
                fixed_cents: 0,
            },
            mobile_deposit: FeeRule {
                provider_pct: Decimal::ONE,
                fixed_cents: 0,
            },
            mobile_withdrawal: FeeRule {
                provider_pct: Decimal::new(15, 1), // 1.5
                fixed_cents: 0,
            },
            platform_pct: Decimal::new(5, 1), // 0.5
        }
    }

    fn rule(&self, method: PayMethod, kind: TxKind) -> Result<FeeRule, LedgerError> {
        match (method, kind) {
            (PayMethod::Card, TxKind::Deposit) => Ok(self.card_deposit),
            (PayMethod::Card, TxKind::Withdrawal) => Ok(self.card_withdrawal),
            (PayMethod::MobileMoney, TxKind::Deposit) => Ok(self.mobile_deposit),
            (PayMethod::MobileMoney, TxKind::Withdrawal) => Ok(self.mobile_withdrawal),
            // Escrow movements never touch a provider and carry no fee;
            // asking for a rule for them is a caller bug surfaced as an error.
            _ => Err(LedgerError::UnsupportedMethod(format!(
                "{} for {kind:?}",
                method.as_str()
            ))),
        }
    }

    /// Compute the fee for `amount_cents`, split into provider and platform
    /// shares. Each share is rounded half-up independently of the other but
    /// only once.
    pub fn breakdown(
        &self,
        method: PayMethod,
        kind: TxKind,
        amount_cents: i64,
    ) -> Result<FeeBreakdown, LedgerError> {
        if amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount(amount_cents));
        }
        let rule = self.rule(method, kind)?;
        let amount = Decimal::from(amount_cents);
        let hundred = Decimal::ONE_HUNDRED;

        let provider = (amount * rule.provider_pct / hundred)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(LedgerError::InvalidAmount(amount_cents))?
            + rule.fixed_cents;
        let platform = (amount * self.platform_pct / hundred)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(LedgerError::InvalidAmount(amount_cents))?;

        Ok(FeeBreakdown {
            provider_cents: provider,
            platform_cents: platform,
        })
    }

    /// Total fee for `amount_cents`, the figure quoted to clients and debited
    /// alongside withdrawals.
    pub fn estimate(
        &self,
        method: PayMethod,
        kind: TxKind,
        amount_cents: i64,
    ) -> Result<i64, LedgerError> {
        Ok(self.breakdown(method, kind, amount_cents)?.total_cents())
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_deposit_fee_includes_fixed_part() {
        let fees = FeeSchedule::standard();
        // 10000 * 2.9% = 290, + 30 fixed, + 10000 * 0.5% = 50
        let fee = fees
            .breakdown(PayMethod::Card, TxKind::Deposit, 10_000)
            .unwrap();
        assert_eq!(fee.provider_cents, 320);
        assert_eq!(fee.platform_cents, 50);
        assert_eq!(fee.total_cents(), 370);
    }

    #[test]
    fn mobile_withdrawal_fee() {
        let fees = FeeSchedule::standard();
        // 5000 * 1.5% = 75, + 5000 * 0.5% = 25
        assert_eq!(
            fees.estimate(PayMethod::MobileMoney, TxKind::Withdrawal, 5_000)
                .unwrap(),
            100
        );
    }

    #[test]
    fn rounding_is_half_up() {
        let fees = FeeSchedule::standard();
        // 50 * 2.9% = 1.45 -> 1; 50 * 0.5% = 0.25 -> 0; + 30 fixed
        assert_eq!(
            fees.estimate(PayMethod::Card, TxKind::Deposit, 50).unwrap(),
            31
        );
        // 100 * 1.5% = 1.5 -> rounds away from zero to 2; 100 * 0.5% = 0.5 -> 1
        assert_eq!(
            fees.estimate(PayMethod::MobileMoney, TxKind::Withdrawal, 100)
                .unwrap(),
            3
        );
    }

    #[test]
    fn non_positive_amounts_rejected() {
        let fees = FeeSchedule::standard();
        assert!(matches!(
            fees.estimate(PayMethod::Card, TxKind::Deposit, 0),
            Err(LedgerError::InvalidAmount(0))
        ));
        assert!(matches!(
            fees.estimate(PayMethod::Card, TxKind::Withdrawal, -5),
            Err(LedgerError::InvalidAmount(-5))
        ));
    }

    #[test]
    fn escrow_kinds_have_no_fee_rule() {
        let fees = FeeSchedule::standard();
        assert!(matches!(
            fees.estimate(PayMethod::Card, TxKind::EscrowLock, 1_000),
            Err(LedgerError::UnsupportedMethod(_))
        ));
    }
}
