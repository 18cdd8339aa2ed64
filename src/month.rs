// 📅 Month Normalizer
// Free-text Portuguese month labels → canonical 3-letter tokens (JAN..DEC)

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Canonical month token. Ordering is chronological, JAN first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonthToken {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
    /// Fragment that matched no known month name; callers filter these out
    Unrecognized,
}

pub const ALL_MONTHS: [MonthToken; 12] = [
    MonthToken::Jan,
    MonthToken::Feb,
    MonthToken::Mar,
    MonthToken::Apr,
    MonthToken::May,
    MonthToken::Jun,
    MonthToken::Jul,
    MonthToken::Aug,
    MonthToken::Sep,
    MonthToken::Oct,
    MonthToken::Nov,
    MonthToken::Dec,
];

// Abbreviated + full Portuguese names (accented and plain), plus the canonical
// English tokens so normalization is idempotent.
const MONTH_TABLE: &[(&str, MonthToken)] = &[
    ("JAN", MonthToken::Jan),
    ("JANEIRO", MonthToken::Jan),
    ("FEV", MonthToken::Feb),
    ("FEVEREIRO", MonthToken::Feb),
    ("FEB", MonthToken::Feb),
    ("MAR", MonthToken::Mar),
    ("MARÇO", MonthToken::Mar),
    ("MARCO", MonthToken::Mar),
    ("ABR", MonthToken::Apr),
    ("ABRIL", MonthToken::Apr),
    ("APR", MonthToken::Apr),
    ("MAI", MonthToken::May),
    ("MAIO", MonthToken::May),
    ("MAY", MonthToken::May),
    ("JUN", MonthToken::Jun),
    ("JUNHO", MonthToken::Jun),
    ("JUL", MonthToken::Jul),
    ("JULHO", MonthToken::Jul),
    ("AGO", MonthToken::Aug),
    ("AGOSTO", MonthToken::Aug),
    ("AUG", MonthToken::Aug),
    ("SET", MonthToken::Sep),
    ("SETEMBRO", MonthToken::Sep),
    ("SEP", MonthToken::Sep),
    ("OUT", MonthToken::Oct),
    ("OUTUBRO", MonthToken::Oct),
    ("OCT", MonthToken::Oct),
    ("NOV", MonthToken::Nov),
    ("NOVEMBRO", MonthToken::Nov),
    ("DEZ", MonthToken::Dec),
    ("DEZEMBRO", MonthToken::Dec),
    ("DEC", MonthToken::Dec),
];

impl MonthToken {
    /// Canonical code for display and serialization
    pub fn code(&self) -> &'static str {
        match self {
            MonthToken::Jan => "JAN",
            MonthToken::Feb => "FEB",
            MonthToken::Mar => "MAR",
            MonthToken::Apr => "APR",
            MonthToken::May => "MAY",
            MonthToken::Jun => "JUN",
            MonthToken::Jul => "JUL",
            MonthToken::Aug => "AUG",
            MonthToken::Sep => "SEP",
            MonthToken::Oct => "OCT",
            MonthToken::Nov => "NOV",
            MonthToken::Dec => "DEC",
            MonthToken::Unrecognized => "",
        }
    }

    /// Chronological index, JAN=0 .. DEC=11. Unrecognized sorts last.
    pub fn index(&self) -> usize {
        match self {
            MonthToken::Unrecognized => 12,
            month => ALL_MONTHS.iter().position(|m| m == month).unwrap_or(12),
        }
    }

    pub fn is_recognized(&self) -> bool {
        *self != MonthToken::Unrecognized
    }

    /// 1-based calendar month number (chrono convention)
    pub fn from_number(month: u32) -> MonthToken {
        match month {
            1..=12 => ALL_MONTHS[(month - 1) as usize],
            _ => MonthToken::Unrecognized,
        }
    }

    /// Token of today's local month
    pub fn current() -> MonthToken {
        MonthToken::from_number(Local::now().month())
    }

    /// Look up a single fragment (already free of whitespace)
    pub fn lookup(fragment: &str) -> MonthToken {
        let upper = fragment.to_uppercase();
        MONTH_TABLE
            .iter()
            .find(|(name, _)| *name == upper)
            .map(|(_, token)| *token)
            .unwrap_or(MonthToken::Unrecognized)
    }

    /// Resolve a month-column header to a token.
    ///
    /// Accepts bare names ("Jan", "Janeiro"), month/year headers ("Jan/25",
    /// "Fev / 2025") and date-shaped headers ("2025-01-01", "01/01/2025").
    pub fn from_column_label(label: &str) -> Option<MonthToken> {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(month) = parse_date_label(trimmed) {
            return Some(month);
        }

        let fragments = split_fragments(trimmed);
        let (first, rest) = fragments.split_first()?;
        let token = MonthToken::lookup(first);
        if !token.is_recognized() {
            return None;
        }

        // Anything after the month must be a year, otherwise it is a multi-month label
        if rest
            .iter()
            .all(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_digit()))
        {
            Some(token)
        } else {
            None
        }
    }
}

impl std::fmt::Display for MonthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonthToken::Unrecognized => write!(f, "UNRECOGNIZED"),
            month => write!(f, "{}", month.code()),
        }
    }
}

impl std::str::FromStr for MonthToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match MonthToken::lookup(s.trim()) {
            MonthToken::Unrecognized => Err(format!("unknown month: {}", s)),
            month => Ok(month),
        }
    }
}

fn split_fragments(text: &str) -> Vec<String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    compact.split('/').map(|s| s.to_string()).collect()
}

fn parse_date_label(label: &str) -> Option<MonthToken> {
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(label, fmt) {
            return Some(MonthToken::from_number(dt.month()));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(label, fmt) {
            return Some(MonthToken::from_number(date.month()));
        }
    }
    None
}

/// Normalize free text into one token per `/`-separated fragment.
///
/// Whitespace anywhere is ignored, case is ignored, unknown fragments become
/// `MonthToken::Unrecognized`. Never fails.
pub fn normalize(text: &str) -> Vec<MonthToken> {
    split_fragments(text)
        .iter()
        .map(|fragment| MonthToken::lookup(fragment))
        .collect()
}

/// Same as `normalize`, with unrecognized fragments removed
pub fn recognized_months(text: &str) -> Vec<MonthToken> {
    normalize(text)
        .into_iter()
        .filter(MonthToken::is_recognized)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviated_and_full_names_agree() {
        assert_eq!(normalize("jan"), vec![MonthToken::Jan]);
        assert_eq!(normalize("JANEIRO"), vec![MonthToken::Jan]);
        assert_eq!(normalize("Fevereiro"), vec![MonthToken::Feb]);
        assert_eq!(normalize("dez"), vec![MonthToken::Dec]);
    }

    #[test]
    fn test_accented_and_plain_march() {
        assert_eq!(normalize("Março"), vec![MonthToken::Mar]);
        assert_eq!(normalize("marco"), vec![MonthToken::Mar]);
    }

    #[test]
    fn test_slash_separated_fragments() {
        assert_eq!(normalize("Jan/Fev"), vec![MonthToken::Jan, MonthToken::Feb]);
        assert_eq!(
            normalize(" set / OUT / novembro "),
            vec![MonthToken::Sep, MonthToken::Oct, MonthToken::Nov]
        );
    }

    #[test]
    fn test_output_length_matches_fragments() {
        for text in ["Jan", "Jan/Fev", "Jan/xyz/Dez", "a/b/c/d", "/"] {
            let expected = text.split('/').count();
            assert_eq!(normalize(text).len(), expected, "text: {:?}", text);
        }
    }

    #[test]
    fn test_unknown_fragment_is_unrecognized() {
        assert_eq!(
            normalize("Jan/Primavera"),
            vec![MonthToken::Jan, MonthToken::Unrecognized]
        );
        assert_eq!(normalize(""), vec![MonthToken::Unrecognized]);
        assert_eq!(recognized_months("Jan/Primavera"), vec![MonthToken::Jan]);
    }

    #[test]
    fn test_idempotent_on_canonical_tokens() {
        for month in ALL_MONTHS {
            assert_eq!(normalize(month.code()), vec![month]);
        }
    }

    #[test]
    fn test_index_is_chronological() {
        assert_eq!(MonthToken::Jan.index(), 0);
        assert_eq!(MonthToken::Dec.index(), 11);
        assert!(MonthToken::Feb < MonthToken::Oct);
        assert!(MonthToken::Dec < MonthToken::Unrecognized);
    }

    #[test]
    fn test_column_label_month_year() {
        assert_eq!(MonthToken::from_column_label("Jan/25"), Some(MonthToken::Jan));
        assert_eq!(MonthToken::from_column_label("Fev / 2025"), Some(MonthToken::Feb));
        assert_eq!(MonthToken::from_column_label("Dezembro"), Some(MonthToken::Dec));
    }

    #[test]
    fn test_column_label_dates() {
        assert_eq!(MonthToken::from_column_label("2025-03-01"), Some(MonthToken::Mar));
        assert_eq!(
            MonthToken::from_column_label("2025-11-01 00:00:00"),
            Some(MonthToken::Nov)
        );
        assert_eq!(MonthToken::from_column_label("01/07/2025"), Some(MonthToken::Jul));
    }

    #[test]
    fn test_column_label_rejects_non_months() {
        assert_eq!(MonthToken::from_column_label("TOTAL"), None);
        assert_eq!(MonthToken::from_column_label("Observações"), None);
        assert_eq!(MonthToken::from_column_label("Jan/Fev"), None);
        assert_eq!(MonthToken::from_column_label(""), None);
    }

    #[test]
    fn test_from_str_and_display() {
        let month: MonthToken = "abril".parse().unwrap();
        assert_eq!(month, MonthToken::Apr);
        assert_eq!(month.to_string(), "APR");
        assert!("verão".parse::<MonthToken>().is_err());
        assert_eq!(MonthToken::Unrecognized.to_string(), "UNRECOGNIZED");
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn one_token_per_fragment(text in any::<String>()) {
            let fragments = text.chars().filter(|c| *c == '/').count() + 1;
            prop_assert_eq!(normalize(&text).len(), fragments);
        }

        #[test]
        fn month_lists_keep_order(indices in prop::collection::vec(0usize..12, 1..6)) {
            let text: Vec<&str> = indices.iter().map(|i| ALL_MONTHS[*i].code()).collect();
            let expected: Vec<MonthToken> = indices.iter().map(|i| ALL_MONTHS[*i]).collect();
            prop_assert_eq!(normalize(&text.join(" / ")), expected);
        }
    }

    #[test]
    fn canonical_codes_normalize_to_themselves() {
        for month in ALL_MONTHS {
            assert_eq!(normalize(month.code()), vec![month]);
        }
    }
}
