// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use rust_decimal::Decimal;
use serde::Serialize;

/// Display amounts are base-unit amounts shifted down by this many digits.
pub const BASE_UNIT_EXPONENT: u32 = 9;

const BASE_UNITS_PER_DISPLAY_UNIT: u64 = 1_000_000_000;

/// Gas pricing used to turn gas counts into base-unit fees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    pub gas_price: Decimal,
    pub transfer_gas: u64,
    pub change_ownership_gas: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            gas_price: Decimal::from(10_u64),
            transfer_gas: 100_000,
            change_ownership_gas: 200_000,
        }
    }
}

impl FeeSchedule {
    pub fn gas_fee(&self, gas: u64) -> Decimal {
        Decimal::from(gas) * self.gas_price
    }

    /// Reserved for the ownership transfer that may follow a registration.
    pub fn transfer_allowance(&self) -> Decimal {
        self.gas_fee(self.change_ownership_gas)
    }

    /// Reserved for the token send that pays for an archive upload.
    pub fn send_allowance(&self) -> Decimal {
        self.gas_fee(self.transfer_gas)
    }
}

/// Fee breakdown in base units. `total_amount` is always the sum of the parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub record_fee_amount: Decimal,
    pub gas_fee_amount: Decimal,
    pub transfer_allowance_amount: Decimal,
    pub total_amount: Decimal,
}

impl FeeQuote {
    pub fn new(
        record_fee_amount: Decimal,
        gas_fee_amount: Decimal,
        transfer_allowance_amount: Decimal,
    ) -> Self {
        Self {
            record_fee_amount,
            gas_fee_amount,
            transfer_allowance_amount,
            total_amount: record_fee_amount + gas_fee_amount + transfer_allowance_amount,
        }
    }

    pub fn total_display(&self) -> Decimal {
        to_display(self.total_amount)
    }
}

pub fn to_display(amount: Decimal) -> Decimal {
    let mut shifted = amount;
    if shifted.set_scale(shifted.scale() + BASE_UNIT_EXPONENT).is_err() {
        return (amount / Decimal::from(BASE_UNITS_PER_DISPLAY_UNIT)).normalize();
    }
    shifted.normalize()
}

/// Rounds up so a payment never falls short of the quoted price. `None`
/// when the amount does not fit in base units.
pub fn to_base_units(display: Decimal) -> Option<Decimal> {
    display
        .checked_mul(Decimal::from(BASE_UNITS_PER_DISPLAY_UNIT))
        .map(|amount| amount.ceil().normalize())
}
