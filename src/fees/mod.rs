/// Buyer cost computation.
/// One formula serves both the pricing endpoint and the client-side
/// fallback estimate, so the two can only diverge in the rates they are
/// given, never in the arithmetic.
// region:    --- Imports
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Rates

/// Platform buyer-premium rate charged on every sale (5%).
pub const PLATFORM_PREMIUM_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Tax rate applied when the caller's region is unknown (GST + QST).
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(14975, 0, 0, false, 5);

/// Jurisdiction tax rate lookup. Unknown regions fall back to the default.
pub fn tax_rate_for_region(region: &str) -> Decimal {
    match region {
        "QC" => Decimal::from_parts(14975, 0, 0, false, 5), // 14.975%
        "ON" => Decimal::from_parts(13, 0, 0, false, 2),    // 13%
        "AB" => Decimal::from_parts(5, 0, 0, false, 2),     // 5%
        _ => DEFAULT_TAX_RATE,
    }
}

// endregion: --- Rates

// region:    --- Cost Breakdown

/// Itemized buyer cost for a single hammer price. Derived on demand,
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub hammer_price: Decimal,
    pub buyer_premium: Decimal,
    pub tax_on_hammer: Decimal,
    pub tax_on_premium: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub tax_savings: Decimal,
}

/// Round a display amount to the cent, half-up.
fn to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the itemized buyer cost for a hammer price.
///
/// Intermediates are kept at full precision; every displayed field is then
/// rounded to the cent, and `tax`/`total` are sums of the rounded fields so
/// the breakdown always adds up exactly as shown.
///
/// Tax on the hammer price applies only to business sellers. Tax on the
/// buyer premium is always charged: the premium is a platform fee, not a
/// sale of the underlying item. For private sales `tax_savings` reports
/// the hammer tax the buyer avoided.
pub fn compute(
    hammer_price: Decimal,
    premium_rate: Decimal,
    tax_rate: Decimal,
    seller_is_business: bool,
) -> CostBreakdown {
    let raw_premium = hammer_price * premium_rate;
    let raw_hammer_tax = hammer_price * tax_rate;
    let raw_premium_tax = raw_premium * tax_rate;

    let hammer_price = to_cents(hammer_price);
    let buyer_premium = to_cents(raw_premium);
    let tax_on_premium = to_cents(raw_premium_tax);
    let (tax_on_hammer, tax_savings) = if seller_is_business {
        (to_cents(raw_hammer_tax), Decimal::ZERO)
    } else {
        (Decimal::ZERO, to_cents(raw_hammer_tax))
    };

    let tax = tax_on_hammer + tax_on_premium;
    let total = hammer_price + buyer_premium + tax;

    CostBreakdown {
        hammer_price,
        buyer_premium,
        tax_on_hammer,
        tax_on_premium,
        tax,
        total,
        tax_savings,
    }
}

/// Breakdown for a region, using the platform premium rate.
pub fn compute_for_region(
    hammer_price: Decimal,
    region: &str,
    seller_is_business: bool,
) -> CostBreakdown {
    compute(
        hammer_price,
        PLATFORM_PREMIUM_RATE,
        tax_rate_for_region(region),
        seller_is_business,
    )
}

// endregion: --- Cost Breakdown

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn business_seller_breakdown_matches_posted_rates() {
        let b = compute(dec("100"), dec("0.05"), dec("0.14975"), true);
        assert_eq!(b.buyer_premium, dec("5.00"));
        assert_eq!(b.tax_on_hammer, dec("14.98"));
        assert_eq!(b.tax_on_premium, dec("0.75"));
        assert_eq!(b.tax, dec("15.73"));
        assert_eq!(b.total, dec("120.73"));
        assert_eq!(b.tax_savings, dec("0"));
    }

    #[test]
    fn private_sale_exempts_hammer_tax_and_reports_savings() {
        let b = compute(dec("100"), dec("0.05"), dec("0.14975"), false);
        assert_eq!(b.tax_on_hammer, dec("0"));
        assert_eq!(b.tax_savings, dec("14.98"));
        assert_eq!(b.tax_on_premium, dec("0.75"));
        assert_eq!(b.total, dec("105.75"));
    }

    #[test]
    fn displayed_total_equals_sum_of_displayed_lines() {
        // Prices picked so per-line rounding disagrees with rounding the
        // unrounded grand total.
        for raw in ["33.33", "99.99", "0.01", "123.45", "7777.77"] {
            for business in [true, false] {
                let b = compute(dec(raw), dec("0.05"), dec("0.14975"), business);
                assert_eq!(
                    b.total,
                    b.hammer_price + b.buyer_premium + b.tax,
                    "total must be the sum of rounded lines for {raw}"
                );
                assert_eq!(b.tax, b.tax_on_hammer + b.tax_on_premium);
            }
        }
    }

    #[test]
    fn rounding_is_half_up() {
        // 14.975 sits exactly on the midpoint and must round away from zero.
        let b = compute(dec("100"), dec("0.05"), dec("0.14975"), true);
        assert_eq!(b.tax_on_hammer, dec("14.98"));
    }

    #[test]
    fn compute_is_deterministic() {
        let a = compute(dec("250.50"), dec("0.05"), dec("0.14975"), true);
        let b = compute(dec("250.50"), dec("0.05"), dec("0.14975"), true);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_hammer_price_yields_zero_everything() {
        let b = compute(dec("0"), dec("0.05"), dec("0.14975"), true);
        assert_eq!(b.total, dec("0"));
        assert_eq!(b.tax, dec("0"));
    }

    #[test]
    fn region_lookup_falls_back_to_default() {
        assert_eq!(tax_rate_for_region("QC"), dec("0.14975"));
        assert_eq!(tax_rate_for_region("ON"), dec("0.13"));
        assert_eq!(tax_rate_for_region("XX"), DEFAULT_TAX_RATE);
    }

    #[test]
    fn platform_rate_constants_are_well_formed() {
        assert_eq!(PLATFORM_PREMIUM_RATE, dec("0.05"));
        assert_eq!(DEFAULT_TAX_RATE, dec("0.14975"));
    }
}
// endregion: --- Tests
