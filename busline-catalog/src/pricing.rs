use busline_shared::PriceBreakdown;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Convenience fee on the fare, in basis points (500 = 5%)
    pub convenience_fee_bps: u32,

    /// Bank charge on the fare, in basis points (200 = 2%)
    pub bank_charge_bps: u32,

    /// Every amount is rounded half-up to a multiple of this (minor units)
    pub rounding_unit: i64,

    /// Floor applied to the final total after rounding
    pub minimum_total: i64,

    pub currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            convenience_fee_bps: 500,
            bank_charge_bps: 200,
            rounding_unit: 1000,
            minimum_total: 0,
            currency: "VND".to_string(),
        }
    }
}

/// Fare calculator for seat bookings.
///
/// Order of operations: the fare is rounded first, both fees are computed from the rounded
/// fare and rounded on their own, the total is their sum (already a multiple of the unit)
/// and is finally clamped up to `minimum_total`. All arithmetic is integer.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn calculate(&self, price_per_seat: i64, seat_count: u32) -> PriceBreakdown {
        let raw_fare = i128::from(price_per_seat) * i128::from(seat_count);
        let fare = self.round_ratio(raw_fare, 1);

        let fare_wide = i128::from(fare);
        let convenience_fee = self.round_ratio(fare_wide * i128::from(self.config.convenience_fee_bps), 10_000);
        let bank_charge = self.round_ratio(fare_wide * i128::from(self.config.bank_charge_bps), 10_000);

        let total = fare
            .saturating_add(convenience_fee)
            .saturating_add(bank_charge)
            .max(self.config.minimum_total);

        PriceBreakdown {
            fare,
            convenience_fee,
            bank_charge,
            total,
            currency: self.config.currency.clone(),
        }
    }

    /// Round `numerator / denominator` half-up to the nearest rounding unit.
    /// Saturates at `i64::MAX`.
    fn round_ratio(&self, numerator: i128, denominator: i128) -> i64 {
        let unit = i128::from(self.config.rounding_unit.max(1));
        let step = denominator * unit;
        let units = (2 * numerator.max(0) + step) / (2 * step);
        i64::try_from(units * unit).unwrap_or(i64::MAX)
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}
