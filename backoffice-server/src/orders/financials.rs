//! Financial reconciler
//!
//! Pure computation of cost of goods, gateway fee and net margin for an
//! order at the moment it becomes PAID. The result is a historical
//! snapshot: it is written once onto the order and never recomputed on
//! later reads. The only sanctioned recompute path is the explicit
//! migration backfill ([`recompute_for_migration`]).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::gateway::PaymentMethod;
use shared::models::{FinancialSnapshot, OrderItem};

/// Colombian VAT applied on top of gateway processing fees
const FEE_VAT_RATE: Decimal = Decimal::from_parts(19, 0, 0, false, 2); // 0.19

/// Gateway fee schedule, keyed by payment method
///
/// Each entry is `fee = (gross * rate + fixed) * (1 + VAT)`. Rates differ
/// per gateway; bank transfer, cash and COD carry no processing fee.
pub fn gateway_fee(method: PaymentMethod, gross: Decimal) -> Decimal {
    let (rate, fixed) = match method {
        // percent expressed as fraction, fixed fee in currency units
        PaymentMethod::WompiCard => (Decimal::new(265, 4), Decimal::from(700)), // 2.65% + 700
        PaymentMethod::PayuCard => (Decimal::new(349, 4), Decimal::from(900)), // 3.49% + 900
        PaymentMethod::Pse => (Decimal::new(200, 4), Decimal::from(500)),      // 2.00% + 500
        PaymentMethod::BankTransfer
        | PaymentMethod::Cash
        | PaymentMethod::CashOnDelivery
        | PaymentMethod::Other => return Decimal::ZERO,
    };
    let base_fee = gross * rate + fixed;
    (base_fee * (Decimal::ONE + FEE_VAT_RATE)).round_dp(2)
}

/// Compute the financial snapshot for an order.
///
/// `cost_lookup` resolves a product id to its acquisition cost at
/// movement time; items with no resolvable cost contribute zero to
/// `total_product_cost` (manual line items, deleted products).
pub fn compute_financials<F>(
    items: &[OrderItem],
    total_paid: Decimal,
    method: PaymentMethod,
    shipping_cost: Decimal,
    cost_lookup: F,
    paid_at: DateTime<Utc>,
) -> FinancialSnapshot
where
    F: Fn(&str) -> Option<Decimal>,
{
    let total_product_cost: Decimal = items
        .iter()
        .map(|item| {
            let unit_cost = item
                .product_id
                .as_deref()
                .and_then(&cost_lookup)
                .unwrap_or(Decimal::ZERO);
            unit_cost * Decimal::from(item.quantity)
        })
        .sum();

    let fee = gateway_fee(method, total_paid);
    let net_profit = total_paid - total_product_cost - fee - shipping_cost;
    let profit_margin_pct = if total_paid.is_zero() {
        Decimal::ZERO
    } else {
        (net_profit / total_paid * Decimal::from(100)).round_dp(2)
    };

    FinancialSnapshot {
        total_product_cost,
        gateway_fee: fee,
        shipping_cost,
        net_profit,
        profit_margin_pct,
        paid_at,
    }
}

/// Recompute a snapshot for historical migration/backfill.
///
/// This is deliberately a separate entry point: live code paths must
/// never replace an existing snapshot, and callers of this function are
/// expected to be one-off migration jobs.
pub fn recompute_for_migration<F>(
    items: &[OrderItem],
    total_paid: Decimal,
    method: PaymentMethod,
    shipping_cost: Decimal,
    cost_lookup: F,
    paid_at: DateTime<Utc>,
) -> FinancialSnapshot
where
    F: Fn(&str) -> Option<Decimal>,
{
    compute_financials(items, total_paid, method, shipping_cost, cost_lookup, paid_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: Option<&str>, quantity: i64, price: i64) -> OrderItem {
        OrderItem {
            product_id: product_id.map(str::to_string),
            quantity,
            price: Decimal::from(price),
            sku: None,
            name: "item".to_string(),
        }
    }

    #[test]
    fn fee_schedule_applies_vat() {
        // 100000 * 2.65% + 700 = 3350; * 1.19 = 3986.50
        let fee = gateway_fee(PaymentMethod::WompiCard, Decimal::from(100_000));
        assert_eq!(fee, Decimal::new(398_650, 2));
    }

    #[test]
    fn zero_fee_methods() {
        for method in [
            PaymentMethod::BankTransfer,
            PaymentMethod::Cash,
            PaymentMethod::CashOnDelivery,
        ] {
            assert_eq!(gateway_fee(method, Decimal::from(50_000)), Decimal::ZERO);
        }
    }

    #[test]
    fn snapshot_sums_costs_and_margin() {
        let items = [item(Some("p1"), 2, 30_000), item(None, 1, 5_000)];
        let snapshot = compute_financials(
            &items,
            Decimal::from(100_000),
            PaymentMethod::BankTransfer,
            Decimal::from(12_000),
            |id| (id == "p1").then(|| Decimal::from(10_000)),
            Utc::now(),
        );

        // manual line item contributes zero cost
        assert_eq!(snapshot.total_product_cost, Decimal::from(20_000));
        assert_eq!(snapshot.gateway_fee, Decimal::ZERO);
        assert_eq!(snapshot.net_profit, Decimal::from(68_000));
        assert_eq!(snapshot.profit_margin_pct, Decimal::from(68));
    }

    #[test]
    fn zero_total_guards_division() {
        let snapshot = compute_financials(
            &[],
            Decimal::ZERO,
            PaymentMethod::Cash,
            Decimal::ZERO,
            |_| None,
            Utc::now(),
        );
        assert_eq!(snapshot.profit_margin_pct, Decimal::ZERO);
    }
}
