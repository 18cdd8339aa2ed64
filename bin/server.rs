// Budget Pipeline - Web Server
// REST API with Axum over the same pipeline the CLI runs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use budget_pipeline::{
    aggregate, distinct_values, split_by_cost_kind, top_n, CostKind, EntryFilter, GroupField,
    MonthToken, Pipeline, PipelineConfig, PipelineOutcome, TableCache,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    cache: Arc<Mutex<TableCache>>,
}

impl AppState {
    /// Re-run the pipeline; unchanged sources are served from the cache
    fn outcome(&self) -> PipelineOutcome {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.pipeline.run(&mut cache)
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse {
            success: false,
            data: (),
            error: Some(message),
        }),
    )
        .into_response()
}

/// Query parameters shared by the fact endpoints.
/// Multi-valued filters are comma-separated: `?area=Growth,CX&month=JAN,FEV`
#[derive(Debug, Default)]
struct FilterQuery {
    fields: HashMap<String, String>,
}

impl FilterQuery {
    fn new(fields: HashMap<String, String>) -> Self {
        FilterQuery { fields }
    }

    fn to_filter(&self) -> Result<EntryFilter, String> {
        let mut filter = EntryFilter::new();
        for (name, raw) in &self.fields {
            if name == "top" {
                continue;
            }
            let values: Vec<String> = raw
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            if name == "month" {
                let months = values
                    .iter()
                    .map(|v| v.parse::<MonthToken>())
                    .collect::<Result<Vec<_>, _>>()?;
                filter = filter.with_months(months);
                continue;
            }
            if name == "cost_kind" {
                let kinds = values
                    .iter()
                    .map(|v| {
                        CostKind::parse(v)
                            .map(|k| k.as_str().to_string())
                            .ok_or_else(|| format!("invalid cost_kind: {}", v))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                filter = filter.with_values(GroupField::CostKind, kinds);
                continue;
            }
            let field =
                GroupField::parse(name).ok_or_else(|| format!("unknown filter: {}", name))?;
            filter = filter.with_values(field, values);
        }
        Ok(filter)
    }

    fn top(&self) -> Result<Option<usize>, String> {
        self.fields
            .get("top")
            .map(|v| v.parse::<usize>().map_err(|_| format!("invalid top: {}", v)))
            .transpose()
    }

    /// Budget side of /compare: split by cost kind only when exactly one is given
    fn cost_kind(&self) -> Result<Option<CostKind>, String> {
        let Some(raw) = self.fields.get("cost_kind") else {
            return Ok(None);
        };
        let kinds: Vec<&str> = raw.split(',').map(str::trim).filter(|v| !v.is_empty()).collect();
        match kinds.as_slice() {
            [one] => CostKind::parse(one)
                .map(Some)
                .ok_or_else(|| format!("invalid cost_kind: {}", one)),
            _ => Ok(None),
        }
    }
}

/// Summary response
#[derive(Serialize)]
struct SummaryResponse {
    entries: usize,
    total: f64,
    fixed: f64,
    variable: f64,
    by_area: Vec<AreaStat>,
}

#[derive(Serialize)]
struct AreaStat {
    area: String,
    count: usize,
    total: f64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/facts - Filtered fact table
async fn get_facts(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let query = FilterQuery::new(params);
    let filter = match query.to_filter() {
        Ok(filter) => filter,
        Err(e) => return bad_request(e),
    };
    let outcome = state.outcome();
    let facts = filter.apply(&outcome.facts);
    (StatusCode::OK, Json(ApiResponse::ok(facts))).into_response()
}

/// GET /api/summary - Totals and per-area breakdown
async fn get_summary(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let query = FilterQuery::new(params);
    let filter = match query.to_filter() {
        Ok(filter) => filter,
        Err(e) => return bad_request(e),
    };
    let outcome = state.outcome();
    let facts = filter.apply(&outcome.facts);
    let split = split_by_cost_kind(&facts, None);

    let by_area = aggregate(&facts, &[GroupField::SourceArea])
        .into_iter()
        .map(|row| AreaStat {
            area: row.key.join(""),
            count: row.count,
            total: row.total,
        })
        .collect();

    let summary = SummaryResponse {
        entries: facts.len(),
        total: split.total,
        fixed: split.fixed,
        variable: split.variable,
        by_area,
    };
    (StatusCode::OK, Json(ApiResponse::ok(summary))).into_response()
}

/// GET /api/ranking - Top projects by planned spend
async fn get_ranking(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let query = FilterQuery::new(params);
    let (filter, top) = match (query.to_filter(), query.top()) {
        (Ok(filter), Ok(top)) => (filter, top),
        (Err(e), _) | (_, Err(e)) => return bad_request(e),
    };
    let n = top.unwrap_or(state.pipeline.config().top_n);
    let outcome = state.outcome();
    let facts = filter.apply(&outcome.facts);
    let rows = top_n(
        aggregate(&facts, &[GroupField::Project, GroupField::SourceArea]),
        n,
    );
    (StatusCode::OK, Json(ApiResponse::ok(rows))).into_response()
}

/// GET /api/compare - Planned spend per type against budget
async fn get_compare(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let query = FilterQuery::new(params);
    let (filter, cost_kind) = match (query.to_filter(), query.cost_kind()) {
        (Ok(filter), Ok(kind)) => (filter, kind),
        (Err(e), _) | (_, Err(e)) => return bad_request(e),
    };
    let outcome = state.outcome();
    let report = outcome.compare_budget(
        &state.pipeline.engine(),
        cost_kind,
        &filter.months,
        &filter,
    );
    (StatusCode::OK, Json(ApiResponse::ok(report))).into_response()
}

/// GET /api/burn - Burn rate of the current month (or ?month=)
async fn get_burn(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let query = FilterQuery::new(params);
    let month = match query.fields.get("month").map(|m| m.parse::<MonthToken>()) {
        None => MonthToken::current(),
        Some(Ok(month)) => month,
        Some(Err(e)) => return bad_request(e),
    };
    let outcome = state.outcome();
    let burn = if outcome.realized.is_empty() {
        outcome.budget_burn(month)
    } else {
        outcome.realized_burn(month)
    };
    (StatusCode::OK, Json(ApiResponse::ok(burn))).into_response()
}

/// GET /api/calendar - Project calendar
async fn get_calendar(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.outcome();
    (StatusCode::OK, Json(ApiResponse::ok(outcome.calendar)))
}

/// GET /api/filters - Distinct values per filterable field
async fn get_filters(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.outcome();
    let filters: HashMap<String, Vec<String>> = [
        ("area", GroupField::SourceArea),
        ("project", GroupField::Project),
        ("category", GroupField::Category),
        ("brand", GroupField::Brand),
        ("cost_center", GroupField::CostCenter),
        ("pillar", GroupField::Pillar),
        ("month", GroupField::Month),
    ]
    .into_iter()
    .map(|(name, field)| (name.to_string(), distinct_values(&outcome.facts, field)))
    .collect();
    (StatusCode::OK, Json(ApiResponse::ok(filters)))
}

/// GET /api/diagnostics - Load warnings and run statistics
async fn get_diagnostics(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.outcome();
    let body = serde_json::json!({
        "stats": outcome.stats,
        "diagnostics": outcome.diagnostics,
    });
    (StatusCode::OK, Json(ApiResponse::ok(body)))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    println!("🌐 Budget Pipeline - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BUDGET_PIPELINE_CONFIG").ok())
        .unwrap_or_else(|| "budget-pipeline.toml".to_string());

    let config = match PipelineConfig::load(std::path::Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Could not load config {}: {:#}", config_path, e);
            eprintln!("   Pass the config path as the first argument");
            eprintln!("   or set BUDGET_PIPELINE_CONFIG.");
            std::process::exit(1);
        }
    };
    println!("✓ Config loaded: {}", config_path);

    let state = AppState {
        pipeline: Arc::new(Pipeline::new(config)),
        cache: Arc::new(Mutex::new(TableCache::new())),
    };

    // Warm the cache so the first request is fast
    let warm = state.outcome();
    println!(
        "✓ {} entries from {} source(s), {} diagnostic(s)",
        warm.facts.len(),
        warm.stats.sources_loaded,
        warm.diagnostics.len()
    );

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/facts", get(get_facts))
        .route("/summary", get(get_summary))
        .route("/ranking", get(get_ranking))
        .route("/compare", get(get_compare))
        .route("/burn", get(get_burn))
        .route("/calendar", get(get_calendar))
        .route("/filters", get(get_filters))
        .route("/diagnostics", get(get_diagnostics))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("BUDGET_PIPELINE_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/summary", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
