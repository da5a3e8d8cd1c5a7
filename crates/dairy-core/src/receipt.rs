//! # Receipt Formatter
//!
//! Renders a settlement as plain text for a 58mm thermal printer
//! (32 columns). Pure: identical input gives byte-identical output.
//!
//! ## Layout
//! ```text
//!     DIARY MANAGEMENT SYSTEM
//!        Settlement Receipt
//! --------------------------------
//! Date: 11/01/2024 09:00
//! Code: C001
//! Name: Ramesh Patil
//! Period: 01/01 - 10/01
//! --------------------------------
//! Date  Description            Amt
//! --------------------------------
//! 10/01 Milk Amount (10 da   1,000
//! ................................
//! 03/01 Cattle Feed - 4.00    -200
//! ================================
//! Milk Total:          Rs.1,000.00
//! Deductions:            Rs.200.00
//! --------------------------------
//! Net Payable:           Rs.800.00
//! --------------------------------
//!          Payment: Cash
//!
//!           Thank You!
//! ```
//!
//! Line columns: date (6) | description (18, truncated) | amount (8, right).

use rust_decimal::Decimal;

use crate::money::format_grouped;
use crate::settlement::{Settlement, SettlementDetail};
use crate::types::DateRange;
use crate::RECEIPT_WIDTH;

const DATE_WIDTH: usize = 6;
const AMOUNT_WIDTH: usize = 8;
const DESCRIPTION_WIDTH: usize = RECEIPT_WIDTH - DATE_WIDTH - AMOUNT_WIDTH;

/// Fixed text printed at the top of every receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHeader {
    pub business_name: String,
    pub title: String,
    /// Printed before every total, e.g. `"Rs."`.
    pub currency_prefix: String,
}

impl Default for ReceiptHeader {
    fn default() -> Self {
        ReceiptHeader {
            business_name: "DIARY MANAGEMENT SYSTEM".to_string(),
            title: "Settlement Receipt".to_string(),
            currency_prefix: "Rs.".to_string(),
        }
    }
}

/// Renders `settlement` as receipt text.
///
/// `customer_code`, `customer_name` and `period` come from the customer and
/// cycle the settlement belongs to.
pub fn format_settlement_receipt(
    settlement: &Settlement,
    customer_code: &str,
    customer_name: &str,
    period: DateRange,
    header: &ReceiptHeader,
) -> String {
    let mut out = Receipt::default();

    out.line(&center(&header.business_name));
    out.line(&center(&header.title));
    out.rule('-');

    out.line(&format!(
        "Date: {}",
        settlement.settled_at().format("%d/%m/%Y %H:%M")
    ));
    out.line(&format!("Code: {customer_code}"));
    out.line(&format!("Name: {customer_name}"));
    out.line(&format!(
        "Period: {} - {}",
        period.start().format("%d/%m"),
        period.end().format("%d/%m")
    ));
    out.rule('-');

    out.line(&columns("Date", "Description", "Amt"));
    out.rule('-');

    for detail in settlement.credits() {
        out.line(&detail_line(detail));
    }

    let mut debits = settlement.debits().peekable();
    if debits.peek().is_some() {
        out.rule('.');
        for detail in debits {
            out.line(&detail_line(detail));
        }
    }
    out.rule('=');

    let prefix = header.currency_prefix.as_str();
    out.line(&total("Milk Total:", prefix, settlement.milk_amount().amount()));
    out.line(&total(
        "Deductions:",
        prefix,
        settlement.total_deductions().amount(),
    ));
    out.rule('-');

    let payable_label = if settlement.customer_owes_money() {
        "Amt Owed:"
    } else {
        "Net Payable:"
    };
    out.line(&total(
        payable_label,
        prefix,
        settlement.final_payable().abs().amount(),
    ));

    out.rule('-');
    out.line(&center(&format!("Payment: {}", settlement.payment_mode())));
    if settlement.is_paid() {
        out.line(&center("PAID"));
    }
    out.line("");
    out.line(&center("Thank You!"));
    // tear-off margin
    out.line("\n\n\n");

    out.finish()
}

#[derive(Default)]
struct Receipt(String);

impl Receipt {
    fn line(&mut self, text: &str) {
        self.0.push_str(text);
        self.0.push('\n');
    }

    fn rule(&mut self, ch: char) {
        let rule: String = std::iter::repeat(ch).take(RECEIPT_WIDTH).collect();
        self.line(&rule);
    }

    fn finish(self) -> String {
        self.0
    }
}

fn center(text: &str) -> String {
    let len = text.chars().count();
    if len >= RECEIPT_WIDTH {
        return text.chars().take(RECEIPT_WIDTH).collect();
    }
    let pad = (RECEIPT_WIDTH - len) / 2;
    format!("{:pad$}{text}", "")
}

fn columns(date: &str, description: &str, amount: &str) -> String {
    format!(
        "{date:<dw$}{description:<ww$.ww$}{amount:>aw$}",
        dw = DATE_WIDTH,
        ww = DESCRIPTION_WIDTH,
        aw = AMOUNT_WIDTH,
    )
}

fn detail_line(detail: &SettlementDetail) -> String {
    let amount = format_grouped(detail.amount.amount(), 0);
    let amount = if detail.is_debit() {
        format!("-{amount}")
    } else {
        amount
    };
    columns(
        &detail.transaction_date.format("%d/%m").to_string(),
        &detail.description,
        &amount,
    )
}

fn total(label: &str, prefix: &str, amount: Decimal) -> String {
    let amount_text = format!("{prefix}{}", format_grouped(amount, 2));
    let width = RECEIPT_WIDTH.saturating_sub(amount_text.chars().count());
    format!("{label:<width$}{amount_text}")
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Actor;
    use crate::cycle::tests::{actor, at, cash_advance, open_cycle, sale, stocked_feed};
    use crate::settlement::settle;
    use rust_decimal_macros::dec;

    fn basic_settlement() -> (Settlement, DateRange) {
        let mut cycle = open_cycle("cust-1");
        let mut product = stocked_feed(dec!(10), dec!(50));
        cycle
            .record_product_sale(&mut product, sale("cust-1", dec!(4)), &actor(), at(3, 8))
            .unwrap();
        cycle
            .record_advance_payment(cash_advance("cust-1", dec!(100)), &actor(), at(5, 8))
            .unwrap();
        cycle.set_milk_amount(dec!(1000), &actor(), at(10, 20)).unwrap();
        let settlement = settle(&mut cycle, "Cash", None, &actor(), at(11, 9)).unwrap();
        (settlement, cycle.period())
    }

    #[test]
    fn test_golden_receipt() {
        let (settlement, period) = basic_settlement();
        let receipt = format_settlement_receipt(
            &settlement,
            "C001",
            "Ramesh Patil",
            period,
            &ReceiptHeader::default(),
        );

        let expected = [
            "    DIARY MANAGEMENT SYSTEM",
            "       Settlement Receipt",
            "--------------------------------",
            "Date: 11/01/2024 09:00",
            "Code: C001",
            "Name: Ramesh Patil",
            "Period: 01/01 - 10/01",
            "--------------------------------",
            "Date  Description            Amt",
            "--------------------------------",
            "10/01 Milk Amount (10 da   1,000",
            "................................",
            "03/01 Cattle Feed - 4.00    -200",
            "05/01 Advance on 05/01/2    -100",
            "================================",
            "Milk Total:          Rs.1,000.00",
            "Deductions:            Rs.300.00",
            "--------------------------------",
            "Net Payable:           Rs.700.00",
            "--------------------------------",
            "         Payment: Cash",
            "",
            "           Thank You!",
            "\n\n\n",
        ]
        .map(|line| format!("{line}\n"))
        .concat();

        assert_eq!(receipt, expected);
    }

    #[test]
    fn test_receipt_is_deterministic() {
        let (settlement, period) = basic_settlement();
        let header = ReceiptHeader::default();
        let first = format_settlement_receipt(&settlement, "C001", "Ramesh", period, &header);
        let second = format_settlement_receipt(&settlement, "C001", "Ramesh", period, &header);
        assert_eq!(first, second);
    }

    #[test]
    fn test_owed_amount_and_paid_marker() {
        let mut cycle = open_cycle("cust-1");
        let mut product = stocked_feed(dec!(10), dec!(100));
        cycle
            .record_product_sale(&mut product, sale("cust-1", dec!(4)), &actor(), at(2, 8))
            .unwrap();
        cycle
            .record_advance_payment(cash_advance("cust-1", dec!(200)), &actor(), at(3, 8))
            .unwrap();
        cycle.set_milk_amount(dec!(500), &actor(), at(10, 20)).unwrap();
        let mut settlement = settle(&mut cycle, "upi", None, &actor(), at(11, 9)).unwrap();
        settlement
            .mark_as_paid(Some("UPI-1"), &Actor::new("cashier").unwrap(), at(11, 10))
            .unwrap();

        let receipt = format_settlement_receipt(
            &settlement,
            "C002",
            "Sunita",
            cycle.period(),
            &ReceiptHeader::default(),
        );
        assert!(receipt.contains("Amt Owed:              Rs.100.00\n"));
        assert!(!receipt.contains("Net Payable:"));
        assert!(receipt.contains("          Payment: UPI\n"));
        assert!(receipt.contains("              PAID\n"));
    }

    #[test]
    fn test_no_debit_divider_without_debits() {
        let mut cycle = open_cycle("cust-1");
        cycle.set_milk_amount(dec!(1234.5), &actor(), at(10, 20)).unwrap();
        let settlement = settle(&mut cycle, "Cash", None, &actor(), at(11, 9)).unwrap();

        let receipt = format_settlement_receipt(
            &settlement,
            "C003",
            "Mohan",
            cycle.period(),
            &ReceiptHeader::default(),
        );
        assert!(!receipt.contains("...."));
        assert!(receipt.contains("10/01 Milk Amount (10 da   1,235\n"));
        assert!(receipt.contains("Milk Total:          Rs.1,234.50\n"));
    }

    #[test]
    fn test_long_header_is_truncated() {
        let header = ReceiptHeader {
            business_name: "SHREE GANESH SAHAKARI DUDH UTPADAK SANGH".to_string(),
            ..ReceiptHeader::default()
        };
        let (settlement, period) = basic_settlement();
        let receipt = format_settlement_receipt(&settlement, "C001", "R", period, &header);
        let first = receipt.lines().next().unwrap();
        assert_eq!(first.chars().count(), RECEIPT_WIDTH);
        assert!(receipt.lines().all(|l| l.chars().count() <= RECEIPT_WIDTH));
    }
}
