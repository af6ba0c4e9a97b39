//! Price quote returned by the pricing engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::apartment::RentalMode;

/// Result of pricing a stay
///
/// `final_price == base_price + service_fee` for every quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub mode: RentalMode,
    pub duration: i32,
    /// Tariff times hours, before discount
    pub gross_price: Decimal,
    /// Package discount applied, in percent
    pub discount_percent: u32,
    pub base_price: Decimal,
    /// Percent used for the fee; `None` for the flat daily fee
    pub fee_percent: Option<u32>,
    pub service_fee: Decimal,
    pub final_price: Decimal,
}
