//! Pure billing-cycle calculations: anchor extraction, month-end clamping,
//! due dates, amounts and invoice numbering. No I/O happens here; the
//! billing service composes these with the repository.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::contract::model::{BillingMonth, SkipReason};

/// Contract anchor: the day of month (1..=31) a member's billing cycle starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AnchorDay(u32);

impl AnchorDay {
    pub fn new(day: u32) -> Option<Self> {
        (1..=31).contains(&day).then_some(Self(day))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

static JAPANESE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日").expect("static regex")
});

static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})").expect("static regex"));

/// Extract the anchor day from a free-text contract date.
///
/// Accepts `2026年1月15日`, `2026-01-15` and `2026/01/15`. Anything else,
/// including an out-of-range day, yields `None`.
pub fn extract_anchor_day(text: &str) -> Option<AnchorDay> {
    let caps = JAPANESE_DATE
        .captures(text)
        .or_else(|| NUMERIC_DATE.captures(text))?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    let day: u32 = caps.get(3)?.as_str().parse().ok()?;
    AnchorDay::new(day)
}

/// Invoice date within `month`: the anchor day, clamped to the month's last day.
pub fn compute_invoice_date_for_month(anchor: AnchorDay, month: BillingMonth) -> NaiveDate {
    month.day(anchor.get().min(month.days_in_month()))
}

/// Due date is the last calendar day of the invoice date's month.
pub fn compute_due_date(invoice_date: NaiveDate) -> NaiveDate {
    BillingMonth::of(invoice_date).last_day()
}

/// Payment date shown to members. Weekends move back to the preceding Friday.
/// Never used for persisted dates.
pub fn display_payment_date(date: NaiveDate) -> NaiveDate {
    let back = match date.weekday() {
        Weekday::Sat => 1,
        Weekday::Sun => 2,
        _ => 0,
    };
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amounts {
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
}

/// Largest monthly fee a member profile may carry, in yen.
pub const MAX_MONTHLY_FEE: i64 = 100_000_000;

/// `tax = floor(subtotal * rate / 100)` on non-negative integer yen.
/// `None` when the amounts do not fit in `i64`.
pub fn compute_amounts(subtotal: i64, tax_rate_percent: u32) -> Option<Amounts> {
    let tax = subtotal.max(0).checked_mul(i64::from(tax_rate_percent))? / 100;
    Some(Amounts {
        subtotal,
        tax,
        total: subtotal.checked_add(tax)?,
    })
}

/// `INV-{YYYY}{MM}-{first 6 chars of user id, uppercased}`.
pub fn generate_invoice_number(month: BillingMonth, user_id: &str) -> String {
    let prefix: String = user_id.chars().take(6).collect::<String>().to_uppercase();
    format!("INV-{}{:02}-{}", month.year(), month.month(), prefix)
}

/// Dates of the invoice a member is due for in the current month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledInvoice {
    pub billing_month: BillingMonth,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Date part of the generate/skip decision: anchor presence and whether the
/// clamped invoice date of `today`'s month has been reached. The duplicate
/// check against storage happens afterwards in the service.
pub fn schedule_for(contract_date_text: Option<&str>, today: NaiveDate) -> Result<ScheduledInvoice, SkipReason> {
    let anchor = contract_date_text
        .and_then(extract_anchor_day)
        .ok_or(SkipReason::NoAnchor)?;
    let billing_month = BillingMonth::of(today);
    let invoice_date = compute_invoice_date_for_month(anchor, billing_month);
    if today < invoice_date {
        return Err(SkipReason::AnchorNotReached);
    }
    Ok(ScheduledInvoice {
        billing_month,
        invoice_date,
        due_date: compute_due_date(invoice_date),
    })
}
