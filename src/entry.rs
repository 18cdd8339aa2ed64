// Canonical model - the fact table every aggregate and comparison runs on
//
// CanonicalRow: one entity (project line) in wide form, month cells still raw
// CanonicalEntry: one (entity, month) fact, immutable once created

use crate::month::MonthToken;
use crate::table::CellValue;
use serde::{Deserialize, Serialize};

// ============================================================================
// CANONICAL FIELDS
// ============================================================================

/// Identity fields every source maps onto, in their usual sheet order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Project,
    Category,
    Type,
    CostCenter,
    Brand,
    Pillar,
    CostKind,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::Project,
        CanonicalField::Category,
        CanonicalField::Type,
        CanonicalField::CostCenter,
        CanonicalField::Brand,
        CanonicalField::Pillar,
        CanonicalField::CostKind,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::Project => "project",
            CanonicalField::Category => "category",
            CanonicalField::Type => "type",
            CanonicalField::CostCenter => "cost_center",
            CanonicalField::Brand => "brand",
            CanonicalField::Pillar => "pillar",
            CanonicalField::CostKind => "cost_kind",
        }
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// COST KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostKind {
    Fixed,
    Variable,
}

impl CostKind {
    /// Parse the free-text "Fixo/Variável" column, accents and case ignored
    pub fn parse(text: &str) -> Option<CostKind> {
        let folded: String = text
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'á' | 'à' | 'â' | 'ã' => 'a',
                'é' | 'ê' => 'e',
                'í' => 'i',
                c => c,
            })
            .collect();

        match folded.as_str() {
            "fixo" | "fixa" | "fixed" | "fixos" => Some(CostKind::Fixed),
            "variavel" | "variable" | "variaveis" => Some(CostKind::Variable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CostKind::Fixed => "Fixed",
            CostKind::Variable => "Variable",
        }
    }
}

impl std::fmt::Display for CostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// WIDE ROW
// ============================================================================

/// Identity attributes of one row; empty string = not populated
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub project: String,
    pub category: String,
    pub kind: String,
    pub cost_center: String,
    pub brand: String,
    pub pillar: String,
    pub cost_kind: String,
}

impl Identity {
    pub fn get(&self, field: CanonicalField) -> &str {
        match field {
            CanonicalField::Project => &self.project,
            CanonicalField::Category => &self.category,
            CanonicalField::Type => &self.kind,
            CanonicalField::CostCenter => &self.cost_center,
            CanonicalField::Brand => &self.brand,
            CanonicalField::Pillar => &self.pillar,
            CanonicalField::CostKind => &self.cost_kind,
        }
    }

    pub fn set(&mut self, field: CanonicalField, value: String) {
        let slot = match field {
            CanonicalField::Project => &mut self.project,
            CanonicalField::Category => &mut self.category,
            CanonicalField::Type => &mut self.kind,
            CanonicalField::CostCenter => &mut self.cost_center,
            CanonicalField::Brand => &mut self.brand,
            CanonicalField::Pillar => &mut self.pillar,
            CanonicalField::CostKind => &mut self.cost_kind,
        };
        *slot = value;
    }

    pub fn is_blank(&self) -> bool {
        CanonicalField::ALL.iter().all(|f| self.get(*f).is_empty())
    }

    /// Required fields that are empty
    pub fn missing_fields(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| self.get(*f).is_empty())
            .collect()
    }
}

/// One raw month cell, header label kept for provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthCell {
    pub label: String,
    pub month: MonthToken,
    pub value: CellValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub source_area: String,
    pub identity: Identity,
    pub months: Vec<MonthCell>,
    /// 1-based row number in the source, for diagnostics
    pub line_number: usize,
}

// ============================================================================
// FACT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub project: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub cost_center: String,
    pub brand: String,
    pub pillar: String,
    pub cost_kind: CostKind,
    pub source_area: String,
    pub month: MonthToken,
    pub month_label: String,
    pub amount: f64,
}

impl CanonicalEntry {
    /// Build a fact from a validated identity. `None` when a required field is
    /// empty or the cost kind is not Fixed/Variable.
    pub fn from_identity(
        identity: &Identity,
        source_area: &str,
        month: MonthToken,
        month_label: &str,
        amount: f64,
    ) -> Option<CanonicalEntry> {
        if !identity.missing_fields().is_empty() {
            return None;
        }
        let cost_kind = CostKind::parse(&identity.cost_kind)?;

        Some(CanonicalEntry {
            project: identity.project.clone(),
            category: identity.category.clone(),
            kind: identity.kind.clone(),
            cost_center: identity.cost_center.clone(),
            brand: identity.brand.clone(),
            pillar: identity.pillar.clone(),
            cost_kind,
            source_area: source_area.to_string(),
            month,
            month_label: month_label.to_string(),
            amount,
        })
    }

    pub fn field(&self, field: CanonicalField) -> &str {
        match field {
            CanonicalField::Project => &self.project,
            CanonicalField::Category => &self.category,
            CanonicalField::Type => &self.kind,
            CanonicalField::CostCenter => &self.cost_center,
            CanonicalField::Brand => &self.brand,
            CanonicalField::Pillar => &self.pillar,
            CanonicalField::CostKind => self.cost_kind.as_str(),
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Why a row could not contribute facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowIssue {
    MissingFields(Vec<CanonicalField>),
    UnknownCostKind(String),
}

impl std::fmt::Display for RowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowIssue::MissingFields(fields) => {
                let names: Vec<&str> = fields.iter().map(|f| f.name()).collect();
                write!(f, "missing {}", names.join(", "))
            }
            RowIssue::UnknownCostKind(value) => write!(f, "unknown cost kind '{}'", value),
        }
    }
}

/// Check a row's identity before melting; `Ok` rows produce facts
pub fn validate_identity(identity: &Identity) -> Result<CostKind, RowIssue> {
    let missing = identity.missing_fields();
    if !missing.is_empty() {
        return Err(RowIssue::MissingFields(missing));
    }
    CostKind::parse(&identity.cost_kind)
        .ok_or_else(|| RowIssue::UnknownCostKind(identity.cost_kind.clone()))
}
