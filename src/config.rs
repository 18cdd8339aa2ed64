// ⚙️ Pipeline Configuration
// Source layouts live in a TOML file, validated at load time:
//
//   tolerance = 0.005
//
//   [[sources]]
//   path = "Orcamento 2025.xlsx"
//   sheets = [{ name = " 2025 - Growth" }, { name = "2025 - CX", header_row = 2 }]
//   budgets = [{ sheet = "BUDGET FIXOS", cost_kind = "Fixed", type_column = 1, category_column = 0, value_start = 2 }]
//   calendar = { sheet = "Calendario" }
//
//   [[remotes]]
//   dir = "dumps"
//   role = "realized"
//   datasets = [{ dataset = "Realizado 2025", source_area = "Todos" }]

use crate::budget::BudgetSchema;
use crate::calendar::CalendarSchema;
use crate::entry::CanonicalField;
use crate::error::{PipelineError, Result};
use crate::numeric::NumberFormat;
use crate::remote::RemoteSchema;
use crate::schema::SourceSchema;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// |variance| up to this counts as on budget
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Size of the project ranking
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default)]
    pub sources: Vec<SheetSourceConfig>,

    #[serde(default)]
    pub remotes: Vec<RemoteSourceConfig>,
}

fn default_tolerance() -> f64 {
    0.005
}

fn default_top_n() -> usize {
    crate::aggregate::DEFAULT_TOP_N
}

/// Whether a source holds planned or realized spend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    #[default]
    Planned,
    Realized,
}

// ============================================================================
// SHEET SOURCES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSourceConfig {
    /// Workbook, CSV file, or directory of `<sheet>.csv` files
    pub path: PathBuf,

    #[serde(default)]
    pub role: SourceRole,

    /// CSV field delimiter (ignored for workbooks)
    #[serde(default)]
    pub delimiter: Option<char>,

    #[serde(default)]
    pub sheets: Vec<SheetConfig>,

    #[serde(default)]
    pub budgets: Vec<BudgetSchema>,

    #[serde(default)]
    pub calendar: Option<CalendarSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetConfig {
    pub name: String,

    /// Defaults to the trimmed sheet name
    #[serde(default)]
    pub source_area: Option<String>,

    #[serde(default = "default_header_row")]
    pub header_row: usize,

    #[serde(default)]
    pub id_column: usize,

    #[serde(default = "default_fields")]
    pub fields: Vec<CanonicalField>,

    #[serde(default)]
    pub number_format: NumberFormat,
}

fn default_header_row() -> usize {
    1
}

fn default_fields() -> Vec<CanonicalField> {
    CanonicalField::ALL.to_vec()
}

impl SheetConfig {
    pub fn new(name: &str) -> Self {
        SheetConfig {
            name: name.to_string(),
            source_area: None,
            header_row: default_header_row(),
            id_column: 0,
            fields: default_fields(),
            number_format: NumberFormat::Auto,
        }
    }

    /// Column-mapper descriptor for this sheet
    pub fn schema(&self) -> SourceSchema {
        let area = self.source_area.as_deref().unwrap_or(&self.name);
        SourceSchema {
            source_area: area.trim().to_string(),
            header_row: self.header_row,
            id_column: self.id_column,
            fields: self.fields.clone(),
            number_format: self.number_format,
        }
    }
}

// ============================================================================
// REMOTE SOURCES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSourceConfig {
    /// Directory of dumped query responses (`<dataset>.json`)
    pub dir: PathBuf,

    #[serde(default)]
    pub role: SourceRole,

    #[serde(default)]
    pub datasets: Vec<RemoteSchema>,
}

// ============================================================================
// LOADING + VALIDATION
// ============================================================================

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            tolerance: default_tolerance(),
            top_n: default_top_n(),
            sources: Vec::new(),
            remotes: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(input).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file. Relative source paths are
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config = Self::from_toml(&input)
            .with_context(|| format!("Invalid config: {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Config for one file whose listed sheets all use the standard layout
    pub fn for_path(path: &Path, sheets: &[String]) -> Self {
        PipelineConfig {
            sources: vec![SheetSourceConfig {
                path: path.to_path_buf(),
                role: SourceRole::Planned,
                delimiter: None,
                sheets: sheets.iter().map(|s| SheetConfig::new(s)).collect(),
                budgets: Vec::new(),
                calendar: None,
            }],
            ..Default::default()
        }
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        for source in &mut self.sources {
            if source.path.is_relative() {
                source.path = base.join(&source.path);
            }
        }
        for remote in &mut self.remotes {
            if remote.dir.is_relative() {
                remote.dir = base.join(&remote.dir);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() && self.remotes.is_empty() {
            return Err(PipelineError::Config("no sources configured".to_string()));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(PipelineError::Config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.top_n == 0 {
            return Err(PipelineError::Config("top_n must be at least 1".to_string()));
        }

        for source in &self.sources {
            if source.delimiter.is_some_and(|d| !d.is_ascii()) {
                return Err(PipelineError::Config(format!(
                    "{}: delimiter must be a single ASCII character",
                    source.path.display()
                )));
            }
            for sheet in &source.sheets {
                if sheet.name.trim().is_empty() {
                    return Err(PipelineError::Config(format!(
                        "{}: sheet with empty name",
                        source.path.display()
                    )));
                }
                validate_fields(&sheet.name, &sheet.fields)?;
            }
            for budget in &source.budgets {
                if budget.value_start <= budget.type_column {
                    return Err(PipelineError::Config(format!(
                        "budget sheet '{}': value columns must come after the type column",
                        budget.sheet
                    )));
                }
            }
        }

        for remote in &self.remotes {
            for dataset in &remote.datasets {
                if dataset.dataset.trim().is_empty() {
                    return Err(PipelineError::Config(format!(
                        "{}: dataset with empty name",
                        remote.dir.display()
                    )));
                }
                let fields: Vec<CanonicalField> = dataset.fields.iter().map(|m| m.field).collect();
                validate_fields(&dataset.dataset, &fields)?;
            }
        }

        Ok(())
    }
}

fn validate_fields(name: &str, fields: &[CanonicalField]) -> Result<()> {
    if fields.is_empty() {
        return Err(PipelineError::Config(format!("'{}': no canonical fields listed", name)));
    }
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field) {
            return Err(PipelineError::Config(format!(
                "'{}': field {} listed twice",
                name, field
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CostKind;

    const CONFIG: &str = r#"
        tolerance = 0.01

        [[sources]]
        path = "orcamento.xlsx"
        sheets = [
            { name = " 2025 - Growth " },
            { name = "2025 - CX", header_row = 2, number_format = "brazilian" },
        ]
        budgets = [
            { sheet = "BUDGET FIXOS", cost_kind = "Fixed", type_column = 1, category_column = 0, value_start = 2 },
            { sheet = "BUDGET VARIÁVEIS", cost_kind = "Variable", type_column = 0, value_start = 1 },
        ]
        calendar = { sheet = "Calendario" }

        [[remotes]]
        dir = "dumps"
        role = "realized"
        datasets = [{ dataset = "Realizado 2025", source_area = "Todos" }]
    "#;

    #[test]
    fn parse_full_config() {
        let config = PipelineConfig::from_toml(CONFIG).unwrap();
        assert_eq!(config.tolerance, 0.01);
        assert_eq!(config.top_n, 10);

        let source = &config.sources[0];
        assert_eq!(source.role, SourceRole::Planned);
        assert_eq!(source.sheets.len(), 2);

        let growth = source.sheets[0].schema();
        assert_eq!(growth.source_area, "2025 - Growth");
        assert_eq!(growth.header_row, 1);
        assert_eq!(growth.fields.len(), 7);

        let cx = source.sheets[1].schema();
        assert_eq!(cx.header_row, 2);
        assert_eq!(cx.number_format, NumberFormat::Brazilian);

        assert_eq!(source.budgets[1].cost_kind, CostKind::Variable);
        assert_eq!(source.budgets[0].header_row, 1);
        assert_eq!(source.calendar.as_ref().unwrap().project_column, 1);

        let remote = &config.remotes[0];
        assert_eq!(remote.role, SourceRole::Realized);
        assert_eq!(remote.datasets[0].fields.len(), 7);
    }

    #[test]
    fn reject_empty_config() {
        let err = PipelineConfig::from_toml("tolerance = 0.01").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn reject_duplicate_fields() {
        let input = r#"
            [[sources]]
            path = "a.csv"
            sheets = [{ name = "a", fields = ["project", "project"] }]
        "#;
        let err = PipelineConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn reject_negative_tolerance() {
        let input = r#"
            tolerance = -1.0
            [[sources]]
            path = "a.csv"
        "#;
        assert!(PipelineConfig::from_toml(input).is_err());
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, CONFIG).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.sources[0].path, dir.path().join("orcamento.xlsx"));
        assert_eq!(config.remotes[0].dir, dir.path().join("dumps"));
    }

    #[test]
    fn for_path_uses_standard_layout() {
        let config = PipelineConfig::for_path(Path::new("a.xlsx"), &["CX".to_string()]);
        assert!(config.validate().is_ok());
        assert_eq!(config.sources[0].sheets[0].schema().source_area, "CX");
    }
}
