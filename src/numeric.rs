// 💰 Numeric Coercion
// Best-effort monetary parsing: spreadsheets routinely hold blank or placeholder
// cells in month columns, so coercion never fails and always yields a finite value.

use crate::table::CellValue;
use serde::{Deserialize, Serialize};

/// Separator convention of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    /// Infer the decimal separator from the string itself
    #[default]
    Auto,
    /// "1.234,56": dot groups thousands, comma is the decimal separator
    Brazilian,
}

/// Coerce a raw cell to a finite number; anything unparseable is 0
pub fn to_number(raw: &CellValue) -> f64 {
    to_number_with(raw, NumberFormat::Auto)
}

/// Coerce with an explicit separator convention
pub fn to_number_with(raw: &CellValue, format: NumberFormat) -> f64 {
    let value = match raw {
        CellValue::Number(n) => Some(*n),
        CellValue::Text(s) => parse_amount_with(s, format),
        CellValue::Bool(_) | CellValue::Empty => None,
    };

    match value {
        Some(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// Strict parse of a monetary string, `None` when it does not look numeric
pub fn parse_amount(text: &str) -> Option<f64> {
    parse_amount_with(text, NumberFormat::Auto)
}

pub fn parse_amount_with(text: &str, format: NumberFormat) -> Option<f64> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    let compact = compact.strip_prefix("R$").unwrap_or(&compact);
    // "-R$ 10,00" keeps its sign
    let (negative, digits) = match compact.strip_prefix('-') {
        Some(rest) => (true, rest.strip_prefix("R$").unwrap_or(rest)),
        None => (false, compact),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }

    let normalized = match format {
        NumberFormat::Brazilian => digits.replace('.', "").replace(',', "."),
        NumberFormat::Auto => normalize_separators(digits),
    };

    let parsed: f64 = normalized.parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }
    Some(if negative { -parsed } else { parsed })
}

// Decide which separator is the decimal one, drop the other
fn normalize_separators(digits: &str) -> String {
    let dots = digits.matches('.').count();
    let commas = digits.matches(',').count();

    match (dots, commas) {
        (0, 0) => digits.to_string(),
        (_, 0) if dots > 1 => digits.replace('.', ""),
        (_, 0) => digits.to_string(),
        (0, 1) => digits.replace(',', "."),
        (0, _) => digits.replace(',', ""),
        _ => {
            let last_dot = digits.rfind('.').unwrap_or(0);
            let last_comma = digits.rfind(',').unwrap_or(0);
            if last_comma > last_dot {
                digits.replace('.', "").replace(',', ".")
            } else {
                digits.replace(',', "")
            }
        }
    }
}

/// Format a value as Brazilian currency: "R$ 1.234,56"
pub fn format_brl(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    format!("{}R$ {},{:02}", if negative { "-" } else { "" }, grouped, frac)
}
