// 🌐 Remote Paginated Records
// Notes-database query responses: typed property values, cursor pagination.
//
// Response shape:
//   { "results": [ { "id": "...", "properties": { "<name>": { "type": "...", ... } } } ],
//     "has_more": true, "next_cursor": "..." }
// Error shape:
//   { "object": "error", "status": 401, "code": "...", "message": "..." }
//
// The HTTP client itself is a collaborator behind `PagedRecordSource`; this
// module owns decoding, exhaustive pagination and the positional layout that
// lets remote records go through the regular column mapper.

use crate::entry::CanonicalField;
use crate::error::{PipelineError, Result};
use crate::month::MonthToken;
use crate::numeric::NumberFormat;
use crate::schema::SourceSchema;
use crate::sources::fingerprint_bytes;
use crate::table::{CellValue, RawTable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

// ============================================================================
// PROPERTY VALUES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub plain_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub content: String,
}

impl TextFragment {
    fn content(&self) -> &str {
        self.text
            .as_ref()
            .map(|t| t.content.as_str())
            .or(self.plain_text.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedOption {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateValue {
    #[serde(default)]
    pub start: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormulaValue {
    String {
        #[serde(default)]
        string: Option<String>,
    },
    Number {
        #[serde(default)]
        number: Option<f64>,
    },
    Boolean {
        #[serde(default)]
        boolean: Option<bool>,
    },
    Date {
        #[serde(default)]
        date: Option<DateValue>,
    },
}

/// One typed property of a remote record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title {
        #[serde(default)]
        title: Vec<TextFragment>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<TextFragment>,
    },
    Select {
        #[serde(default)]
        select: Option<NamedOption>,
    },
    MultiSelect {
        #[serde(default)]
        multi_select: Vec<NamedOption>,
    },
    Formula {
        #[serde(default)]
        formula: Option<FormulaValue>,
    },
    Number {
        #[serde(default)]
        number: Option<f64>,
    },
    Date {
        #[serde(default)]
        date: Option<DateValue>,
    },
    /// Property types the pipeline never reads (people, files, relation...)
    #[serde(other)]
    Unsupported,
}

fn text_cell(text: String) -> CellValue {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        CellValue::Empty
    } else {
        CellValue::text(trimmed)
    }
}

fn join_fragments(fragments: &[TextFragment]) -> CellValue {
    let parts: Vec<&str> = fragments.iter().map(TextFragment::content).collect();
    text_cell(parts.join(" "))
}

impl PropertyValue {
    /// Decode to a raw cell; a null value is a declared-empty cell
    pub fn to_cell(&self) -> CellValue {
        match self {
            PropertyValue::Title { title } => join_fragments(title),
            PropertyValue::RichText { rich_text } => join_fragments(rich_text),
            PropertyValue::Select { select } => select
                .as_ref()
                .map(|s| text_cell(s.name.clone()))
                .unwrap_or(CellValue::Empty),
            PropertyValue::MultiSelect { multi_select } => {
                let names: Vec<&str> = multi_select.iter().map(|o| o.name.as_str()).collect();
                text_cell(names.join(", "))
            }
            PropertyValue::Formula { formula } => match formula {
                Some(FormulaValue::String { string: Some(s) }) => text_cell(s.clone()),
                Some(FormulaValue::Number { number: Some(n) }) => CellValue::Number(*n),
                Some(FormulaValue::Boolean { boolean: Some(b) }) => CellValue::text(b.to_string()),
                Some(FormulaValue::Date { date: Some(d) }) => {
                    d.start.clone().map(text_cell).unwrap_or(CellValue::Empty)
                }
                _ => CellValue::Empty,
            },
            PropertyValue::Number { number } => {
                number.map(CellValue::Number).unwrap_or(CellValue::Empty)
            }
            PropertyValue::Date { date } => date
                .as_ref()
                .and_then(|d| d.start.clone())
                .map(text_cell)
                .unwrap_or(CellValue::Empty),
            PropertyValue::Unsupported => CellValue::Empty,
        }
    }
}

// ============================================================================
// PAGES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

impl RemoteRecord {
    pub fn cell(&self, property: &str) -> CellValue {
        self.properties
            .get(property)
            .map(PropertyValue::to_cell)
            .unwrap_or(CellValue::Empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub results: Vec<RemoteRecord>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    object: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

/// Decode one query response body. An error object becomes `RemoteFetch`.
pub fn parse_query_response(source_id: &str, body: &str) -> Result<RecordPage> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::remote_fetch(source_id, 200, format!("invalid JSON: {}", e)))?;
    parse_page_value(source_id, value)
}

fn parse_page_value(source_id: &str, value: serde_json::Value) -> Result<RecordPage> {
    if value.get("object").and_then(|o| o.as_str()) == Some("error") {
        let error: ErrorBody = serde_json::from_value(value).unwrap_or(ErrorBody {
            object: None,
            status: None,
            message: None,
        });
        tracing::debug!(source = %source_id, object = ?error.object, "remote error object");
        return Err(PipelineError::remote_fetch(
            source_id,
            error.status.unwrap_or(500),
            error.message.unwrap_or_else(|| "remote error".to_string()),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| PipelineError::remote_fetch(source_id, 200, format!("malformed page: {}", e)))
}

// ============================================================================
// SOURCE TRAIT + PAGINATION
// ============================================================================

pub trait PagedRecordSource: Send + Sync {
    fn source_id(&self) -> &str;

    /// One page of a dataset query; `cursor` is the previous page's `next_cursor`
    fn query(&self, dataset: &str, cursor: Option<&str>) -> Result<RecordPage>;

    /// Content hash of a dataset, when the source can provide one
    fn fingerprint(&self, _dataset: &str) -> Option<String> {
        None
    }
}

/// Follow `has_more`/`next_cursor` until the dataset is exhausted.
///
/// Any failing page fails the whole fetch: a partial dataset would silently
/// understate totals.
pub fn fetch_all(source: &dyn PagedRecordSource, dataset: &str) -> Result<Vec<RemoteRecord>> {
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;
    let mut seen_cursors: BTreeSet<String> = BTreeSet::new();
    let mut pages = 0usize;

    loop {
        let page = source.query(dataset, cursor.as_deref())?;
        pages += 1;
        records.extend(page.results);
        tracing::debug!(source = %source.source_id(), dataset, pages, total = records.len(), "page fetched");

        if !page.has_more {
            break;
        }
        let next = page.next_cursor.ok_or_else(|| {
            PipelineError::remote_fetch(
                source.source_id(),
                200,
                format!("page {} of '{}' has more results but no cursor", pages, dataset),
            )
        })?;
        if !seen_cursors.insert(next.clone()) {
            return Err(PipelineError::remote_fetch(
                source.source_id(),
                200,
                format!("cursor '{}' repeated while paging '{}'", next, dataset),
            ));
        }
        cursor = Some(next);
    }

    tracing::info!(source = %source.source_id(), dataset, pages, records = records.len(), "remote dataset fetched");
    Ok(records)
}

// ============================================================================
// DUMPED PAGES
// ============================================================================

/// Serves query responses previously saved to disk.
///
/// `<dir>/<dataset>.json` holds either one response object or an array of
/// responses in page order; a cursor selects the page after the one that
/// announced it.
pub struct JsonPagesSource {
    id: String,
    dir: PathBuf,
}

impl JsonPagesSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        JsonPagesSource {
            id: dir.display().to_string(),
            dir,
        }
    }

    fn dataset_path(&self, dataset: &str) -> PathBuf {
        self.dir.join(format!("{}.json", dataset.trim()))
    }

    fn load_pages(&self, dataset: &str) -> Result<Vec<serde_json::Value>> {
        let path = self.dataset_path(dataset);
        let body = fs::read_to_string(&path)
            .map_err(|e| PipelineError::source_read(&self.id, format!("{}: {}", path.display(), e)))?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| PipelineError::remote_fetch(&self.id, 200, format!("invalid JSON: {}", e)))?;

        Ok(match value {
            serde_json::Value::Array(pages) => pages,
            single => vec![single],
        })
    }
}

impl PagedRecordSource for JsonPagesSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn query(&self, dataset: &str, cursor: Option<&str>) -> Result<RecordPage> {
        let pages = self.load_pages(dataset)?;

        let index = match cursor {
            None => 0,
            Some(cursor) => {
                let announced = pages.iter().position(|p| {
                    p.get("next_cursor").and_then(|c| c.as_str()) == Some(cursor)
                });
                match announced {
                    Some(pos) => pos + 1,
                    None => {
                        return Err(PipelineError::remote_fetch(
                            &self.id,
                            400,
                            format!("unknown cursor '{}'", cursor),
                        ))
                    }
                }
            }
        };

        let page = pages.into_iter().nth(index).ok_or_else(|| {
            PipelineError::remote_fetch(&self.id, 404, format!("no page {} in '{}'", index + 1, dataset))
        })?;
        parse_page_value(&self.id, page)
    }

    fn fingerprint(&self, dataset: &str) -> Option<String> {
        fs::read(self.dataset_path(dataset))
            .ok()
            .map(|bytes| fingerprint_bytes(&bytes))
    }
}

// ============================================================================
// POSITIONAL LAYOUT
// ============================================================================

/// Which record properties feed one canonical field; first non-empty wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMapping {
    pub field: CanonicalField,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSchema {
    pub dataset: String,
    pub source_area: String,
    #[serde(default = "default_property_mappings")]
    pub fields: Vec<PropertyMapping>,
    /// Month properties in column order; empty = every property named like a month
    #[serde(default)]
    pub months: Vec<String>,
    #[serde(default)]
    pub number_format: NumberFormat,
}

/// Property names used by the budget databases
pub fn default_property_mappings() -> Vec<PropertyMapping> {
    let mapping = |field, names: &[&str]| PropertyMapping {
        field,
        properties: names.iter().map(|n| n.to_string()).collect(),
    };
    vec![
        mapping(CanonicalField::Project, &["Name", "PROJETOS 2025"]),
        mapping(CanonicalField::Category, &["CATEGORIA"]),
        mapping(CanonicalField::Type, &["TIPO"]),
        mapping(CanonicalField::CostCenter, &["CENTRO DE CUSTOS"]),
        mapping(CanonicalField::Brand, &["MARCA"]),
        mapping(CanonicalField::Pillar, &["PILARES"]),
        mapping(CanonicalField::CostKind, &["FIXO/VARIÁVEL"]),
    ]
}

impl RemoteSchema {
    pub fn new(dataset: &str, source_area: &str) -> Self {
        RemoteSchema {
            dataset: dataset.to_string(),
            source_area: source_area.to_string(),
            fields: default_property_mappings(),
            months: Vec::new(),
            number_format: NumberFormat::Auto,
        }
    }

    fn month_properties(&self, records: &[RemoteRecord]) -> Vec<String> {
        if !self.months.is_empty() {
            return self.months.clone();
        }
        let mut found: Vec<(MonthToken, String)> = records
            .iter()
            .flat_map(|r| r.properties.keys())
            .filter_map(|name| MonthToken::from_column_label(name).map(|m| (m, name.clone())))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        found.sort_by_key(|(month, _)| *month);
        found.into_iter().map(|(_, name)| name).collect()
    }
}

/// Lay records out as `[id] [fields...] [months...]` with the header on row 0,
/// and return the matching column-mapper schema.
pub fn records_to_table(
    source: &str,
    records: &[RemoteRecord],
    schema: &RemoteSchema,
) -> (RawTable, SourceSchema) {
    let months = schema.month_properties(records);

    let mut header = vec![CellValue::text("id")];
    header.extend(schema.fields.iter().map(|m| CellValue::text(m.field.name())));
    header.extend(months.iter().map(|m| CellValue::text(m.as_str())));

    let mut rows = vec![header];
    for (index, record) in records.iter().enumerate() {
        let mut row = vec![CellValue::Number((index + 1) as f64)];
        for mapping in &schema.fields {
            let value = mapping
                .properties
                .iter()
                .map(|p| record.cell(p))
                .find(|c| !c.is_blank())
                .unwrap_or(CellValue::Empty);
            row.push(value);
        }
        row.extend(months.iter().map(|m| record.cell(m)));
        rows.push(row);
    }

    let table_schema = SourceSchema {
        source_area: schema.source_area.trim().to_string(),
        header_row: 0,
        id_column: 0,
        fields: schema.fields.iter().map(|m| m.field).collect(),
        number_format: schema.number_format,
    };

    (RawTable::new(source, rows), table_schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::map_columns;
    use std::sync::Mutex;

    const PAGE: &str = r#"{
        "object": "list",
        "results": [
            {
                "id": "p1",
                "properties": {
                    "Name": {"type": "title", "title": [{"text": {"content": "Podcast"}}]},
                    "CATEGORIA": {"type": "select", "select": {"name": "Conteúdo"}},
                    "TIPO": {"type": "rich_text", "rich_text": [{"text": {"content": "Produção"}}, {"text": {"content": "Áudio"}}]},
                    "CENTRO DE CUSTOS": {"type": "number", "number": 3300},
                    "MARCA": {"type": "multi_select", "multi_select": [{"name": "A"}, {"name": "B"}]},
                    "PILARES": {"type": "formula", "formula": {"type": "string", "string": "Marca"}},
                    "FIXO/VARIÁVEL": {"type": "select", "select": {"name": "Fixo"}},
                    "Jan/25": {"type": "number", "number": 100.5},
                    "Fev/25": {"type": "number", "number": null},
                    "Responsável": {"type": "people", "people": []}
                }
            }
        ],
        "has_more": false,
        "next_cursor": null
    }"#;

    struct ScriptedSource {
        pages: Vec<Result<RecordPage>>,
        calls: Mutex<Vec<Option<String>>>,
    }

    impl PagedRecordSource for ScriptedSource {
        fn source_id(&self) -> &str {
            "scripted"
        }

        fn query(&self, _dataset: &str, cursor: Option<&str>) -> Result<RecordPage> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(cursor.map(String::from));
            match &self.pages[calls.len() - 1] {
                Ok(page) => Ok(page.clone()),
                Err(_) => Err(PipelineError::remote_fetch("scripted", 500, "boom")),
            }
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> RecordPage {
        RecordPage {
            results: ids
                .iter()
                .map(|id| RemoteRecord {
                    id: id.to_string(),
                    properties: HashMap::new(),
                })
                .collect(),
            has_more: next.is_some(),
            next_cursor: next.map(String::from),
        }
    }

    #[test]
    fn test_property_decoding() {
        let page = parse_query_response("db", PAGE).unwrap();
        let record = &page.results[0];

        assert_eq!(record.cell("Name"), CellValue::text("Podcast"));
        assert_eq!(record.cell("TIPO"), CellValue::text("Produção Áudio"));
        assert_eq!(record.cell("MARCA"), CellValue::text("A, B"));
        assert_eq!(record.cell("PILARES"), CellValue::text("Marca"));
        assert_eq!(record.cell("CENTRO DE CUSTOS"), CellValue::Number(3300.0));
        assert_eq!(record.cell("Fev/25"), CellValue::Empty);
        assert_eq!(record.cell("Responsável"), CellValue::Empty);
        assert_eq!(record.cell("Missing"), CellValue::Empty);
    }

    #[test]
    fn test_error_object_is_remote_fetch() {
        let body = r#"{"object": "error", "status": 401, "code": "unauthorized", "message": "API token is invalid."}"#;
        match parse_query_response("db", body) {
            Err(PipelineError::RemoteFetch { status, detail, .. }) => {
                assert_eq!(status, 401);
                assert!(detail.contains("invalid"));
            }
            other => panic!("expected RemoteFetch, got {:?}", other),
        }
    }

    #[test]
    fn test_fetch_all_follows_cursors() {
        let source = ScriptedSource {
            pages: vec![
                Ok(page(&["a", "b"], Some("c1"))),
                Ok(page(&["c"], Some("c2"))),
                Ok(page(&["d"], None)),
            ],
            calls: Mutex::new(Vec::new()),
        };

        let records = fetch_all(&source, "db").unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(
            *source.calls.lock().unwrap(),
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[test]
    fn test_failing_page_fails_fetch() {
        let source = ScriptedSource {
            pages: vec![
                Ok(page(&["a"], Some("c1"))),
                Err(PipelineError::remote_fetch("scripted", 500, "boom")),
            ],
            calls: Mutex::new(Vec::new()),
        };
        assert!(matches!(
            fetch_all(&source, "db"),
            Err(PipelineError::RemoteFetch { status: 500, .. })
        ));
    }

    #[test]
    fn test_has_more_without_cursor_fails() {
        let mut broken = page(&["a"], None);
        broken.has_more = true;
        let source = ScriptedSource {
            pages: vec![Ok(broken)],
            calls: Mutex::new(Vec::new()),
        };
        assert!(matches!(
            fetch_all(&source, "db"),
            Err(PipelineError::RemoteFetch { .. })
        ));
    }

    #[test]
    fn test_records_map_like_a_sheet() {
        let page = parse_query_response("db", PAGE).unwrap();
        let schema = RemoteSchema::new("Tabela A", "Conteúdo");
        let (table, source_schema) = records_to_table("Tabela A", &page.results, &schema);

        let mapped = map_columns(&table, &source_schema).unwrap();
        assert_eq!(mapped.rows.len(), 1);
        assert_eq!(mapped.month_columns.len(), 2);
        assert_eq!(mapped.month_columns[0].month, MonthToken::Jan);
        let row = &mapped.rows[0];
        assert_eq!(row.identity.project, "Podcast");
        assert_eq!(row.identity.cost_center, "3300");
        assert_eq!(row.source_area, "Conteúdo");
    }

    #[test]
    fn test_json_pages_source_serves_dumped_pages() {
        let dir = tempfile::tempdir().unwrap();
        let pages = serde_json::json!([
            {"results": [{"id": "1", "properties": {}}], "has_more": true, "next_cursor": "abc"},
            {"results": [{"id": "2", "properties": {}}], "has_more": false, "next_cursor": null}
        ]);
        fs::write(dir.path().join("Tabela B.json"), pages.to_string()).unwrap();

        let source = JsonPagesSource::new(dir.path());
        let records = fetch_all(&source, "Tabela B").unwrap();
        assert_eq!(records.len(), 2);
        assert!(source.fingerprint("Tabela B").is_some());
        assert!(matches!(
            source.query("Tabela B", Some("zzz")),
            Err(PipelineError::RemoteFetch { status: 400, .. })
        ));
        assert!(source.query("Tabela X", None).is_err());
    }
}
