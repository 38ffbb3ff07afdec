//! Currency formatting, the masked currency input and the payment
//! tolerance policy.
//!
//! Amounts are shown in pt-BR (`R$ 1.234,56`). The input widget keeps the
//! numeric value as its source of truth and treats every keystroke as a
//! masked integer-cents entry.

use crate::error::{AppError, AppResult};

/// Upper-bound slack for "payment must not exceed the balance" checks.
/// Absorbs floating-point drift so a full settlement is never rejected.
pub const PAYMENT_EPSILON: f64 = 0.01;

/// More digits than this cannot be represented exactly as cents in an f64.
const MAX_INPUT_DIGITS: usize = 15;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format as Brazilian currency, e.g. `R$ 1.234,56` or `-R$ 0,50`.
pub fn format_currency(value: f64) -> String {
    let cents = (value * 100.0).round() as i64;
    let negative = cents < 0;
    let cents = cents.unsigned_abs();
    let units = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, ch) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!(
        "{}R$ {grouped},{frac:02}",
        if negative { "-" } else { "" }
    )
}

/// Parse a pt-BR currency string back into a number.
///
/// Accepts an optional `R$` prefix, `.` thousands separators and `,` as the
/// decimal mark. Returns `None` for anything that is not valid currency
/// syntax.
pub fn parse_currency(input: &str) -> Option<f64> {
    let cleaned: String = input
        .trim()
        .trim_start_matches('-')
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let negative = input.trim().starts_with('-');

    let (int_part, frac_part) = match cleaned.split_once(',') {
        Some((i, f)) => (i, Some(f)),
        None => (cleaned.as_str(), None),
    };

    let groups: Vec<&str> = int_part.split('.').collect();
    if groups.iter().any(|g| g.is_empty() || !g.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }
    if groups.len() > 1 && (groups[0].len() > 3 || groups[1..].iter().any(|g| g.len() != 3)) {
        return None;
    }
    let digits: String = groups.concat();

    let frac = match frac_part {
        Some(f) if f.len() <= 2 && !f.is_empty() && f.chars().all(|c| c.is_ascii_digit()) => f,
        Some(_) => return None,
        None => "0",
    };

    let value: f64 = format!("{digits}.{frac}").parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Validate a payment against the backend-computed ceiling.
///
/// `max_allowed` is the outstanding balance as last read from the backend
/// (plus the payment's own amount when editing it).
pub fn validate_payment_amount(amount: f64, max_allowed: f64) -> AppResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::validation("O valor deve ser maior que zero"));
    }
    if amount > max_allowed + PAYMENT_EPSILON {
        return Err(AppError::validation(format!(
            "O valor não pode exceder o saldo de {}",
            format_currency(max_allowed)
        )));
    }
    Ok(())
}

/// State of a masked currency field.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyInput {
    value: f64,
    display: String,
}

impl Default for CurrencyInput {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl CurrencyInput {
    pub fn new(value: f64) -> Self {
        let value = round2(value);
        Self {
            value,
            display: format_currency(value),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    /// Controlled update from the owner of the value.
    pub fn set_value(&mut self, value: f64) {
        *self = Self::new(value);
    }

    /// Handle a keystroke: every non-digit is dropped and the digits are read
    /// as cents. Returns the new value for the parent's `on_change`.
    pub fn on_input(&mut self, raw: &str) -> f64 {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        let digits = digits.trim_start_matches('0');
        if digits.len() > MAX_INPUT_DIGITS {
            return self.value;
        }
        let cents: u64 = if digits.is_empty() {
            0
        } else {
            digits.parse().unwrap_or(0)
        };
        self.value = cents as f64 / 100.0;
        self.display = format_currency(self.value);
        self.value
    }

    /// Overwrite the displayed text without reformatting, as a paste or an
    /// external edit would.
    pub fn set_display(&mut self, text: &str) {
        self.display = text.to_string();
    }

    /// Re-normalise on blur. Invalid text falls back to zero.
    pub fn on_blur(&mut self) -> f64 {
        self.value = parse_currency(&self.display).map(round2).unwrap_or(0.0);
        self.display = format_currency(self.value);
        self.value
    }
}
