use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::FieldValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberFormat {
    pub decimal_separator: String,
    pub thousands_separator: String,
    /// Prepended to money values. Empty by default because templates usually
    /// carry the symbol themselves (`€{{line_total}}`).
    pub currency_symbol: String,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal_separator: ".".to_string(),
            thousands_separator: String::new(),
            currency_symbol: String::new(),
        }
    }
}

impl NumberFormat {
    pub fn dutch() -> Self {
        Self {
            decimal_separator: ",".to_string(),
            thousands_separator: ".".to_string(),
            currency_symbol: String::new(),
        }
    }

    /// Money always carries two decimals.
    pub fn money(&self, amount: f64) -> String {
        let fixed = format!("{:.2}", round2(amount));
        format!("{}{}", self.currency_symbol, self.localize(&fixed))
    }

    /// Plain numbers are rounded to two decimals and printed in shortest form.
    pub fn number(&self, value: f64) -> String {
        let rounded = round2(value);
        let plain = if rounded == 0.0 {
            "0".to_string()
        } else {
            format!("{rounded}")
        };
        self.localize(&plain)
    }

    fn localize(&self, plain: &str) -> String {
        let (sign, digits) = match plain.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", plain),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((int_part, frac)) => (int_part, Some(frac)),
            None => (digits, None),
        };

        let mut grouped = String::new();
        let len = int_part.len();
        for (idx, ch) in int_part.chars().enumerate() {
            if idx > 0 && (len - idx) % 3 == 0 {
                grouped.push_str(&self.thousands_separator);
            }
            grouped.push(ch);
        }

        match frac_part {
            Some(frac) => format!("{sign}{grouped}{}{frac}", self.decimal_separator),
            None => format!("{sign}{grouped}"),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Calendar date display style, a chrono `strftime` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateStyle(pub String);

impl Default for DateStyle {
    /// Day-month-year without padding, as Dutch locales print dates.
    fn default() -> Self {
        Self("%-d-%-m-%Y".to_string())
    }
}

impl DateStyle {
    pub fn format(&self, date: NaiveDate) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        // An invalid pattern makes chrono's Display fail; fall back to ISO.
        if write!(out, "{}", date.format(&self.0)).is_err() {
            return date.format("%Y-%m-%d").to_string();
        }
        out
    }
}

pub fn display_field(value: &FieldValue, numbers: &NumberFormat, dates: &DateStyle) -> String {
    match value {
        FieldValue::Text(text) => text.clone(),
        FieldValue::Number(number) => numbers.number(*number),
        FieldValue::Money { amount } => numbers.money(*amount),
        FieldValue::Date(date) => dates.format(*date),
        FieldValue::Flag(true) => "true".to_string(),
        FieldValue::Flag(false) | FieldValue::Empty => String::new(),
    }
}
