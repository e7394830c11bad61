//! API Service - JSON backend for the Monitor Provincial dashboard
//!
//! Endpoints:
//! - GET /health - Sheet and boundary availability
//! - GET /provinces - Provinces of the annual sheet
//! - GET /variables?evolution= - Variable catalog
//! - GET /series?province=&variable= - One province's time series
//! - GET /ficha?province= - Province fact sheet (KPIs, summary, composition)
//! - GET /map/indicator?variable= - Indicator map and ranking
//! - GET /map/sector?sector=&branch= - Sector or branch share map and ranking
//! - GET /compare?variable=&provinces=a,b - Up to four provinces side by side
//! - GET /boundaries - Province boundaries as GeoJSON

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use monitor_collector::{BoundaryCache, BoundaryLoader, BoundarySourcesConfig, LoadedBoundaries};
use monitor_parser::composition::{self, CompositionTable};
use monitor_parser::format::{fmt_decimal_es, fmt_int_es, fmt_pct_plain, truncate_label};
use monitor_parser::ranking::{self, MapAndRank, MapRow, ValueKind};
use monitor_parser::roles::{self, IndicatorRoles};
use monitor_parser::{
    Compositions, LoadCache, Point, SeriesStore, SheetState, Source, SourceConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

const MAX_COMPARED: usize = 4;
const TOP_LIMIT: usize = 10;
const LABEL_CHARS: usize = 26;
/// Branch selector value meaning "the whole industry".
const ALL_BRANCHES: &str = "Total industria";

// ============================================================================
// State
// ============================================================================

struct AppState {
    config: SourceConfig,
    store: SeriesStore,
    compositions: Compositions,
    roles: IndicatorRoles,
    boundaries: BoundaryCache,
}

type SharedState = Arc<AppState>;

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn unavailable(sheet: &str, reason: &str) -> Response {
    error(
        StatusCode::SERVICE_UNAVAILABLE,
        format!("sheet '{}' unavailable: {}", sheet, reason),
    )
}

#[derive(Serialize)]
struct SheetStatus {
    sheet: String,
    available: bool,
    error: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
    sheets: Vec<SheetStatus>,
    /// "loaded", "unavailable" or "pending"
    boundaries: &'static str,
    boundaries_loaded_at: Option<String>,
}

#[derive(Serialize)]
struct ProvincesResponse {
    provinces: Vec<String>,
}

#[derive(Serialize)]
struct VariablesResponse {
    variables: Vec<String>,
    annual: Vec<String>,
    quarterly: Vec<String>,
    rate: Vec<String>,
    map_indicators: Vec<String>,
}

#[derive(Serialize)]
struct LastValue {
    period: String,
    value: f64,
    display: String,
}

#[derive(Serialize)]
struct SeriesResponse {
    province: String,
    variable: String,
    source: Source,
    points: Vec<Point>,
    last: Option<LastValue>,
}

#[derive(Serialize)]
struct Kpi {
    label: String,
    value: Option<f64>,
    period: Option<String>,
    display: String,
}

#[derive(Serialize)]
struct ShareItem {
    category: String,
    label: String,
    pct: f64,
    display: String,
}

#[derive(Serialize)]
struct FichaResponse {
    province: String,
    kpis: Vec<Kpi>,
    summary: Option<String>,
    top_sectors: Vec<ShareItem>,
    top_branches: Vec<ShareItem>,
    sectors_period: Option<String>,
    branches_period: Option<String>,
}

#[derive(Serialize)]
struct MapResponse {
    title: String,
    kind: ValueKind,
    #[serde(flatten)]
    map: MapAndRank,
}

#[derive(Serialize)]
struct CompareRow {
    period: String,
    values: Vec<Option<f64>>,
    display: Vec<String>,
}

#[derive(Serialize)]
struct CompareResponse {
    variable: String,
    percentage: bool,
    provinces: Vec<String>,
    rows: Vec<CompareRow>,
}

// ============================================================================
// Query params
// ============================================================================

#[derive(Deserialize)]
struct VariablesQuery {
    #[serde(default)]
    evolution: bool,
}

#[derive(Deserialize)]
struct SeriesQuery {
    province: String,
    variable: String,
}

#[derive(Deserialize)]
struct FichaQuery {
    province: String,
}

#[derive(Deserialize)]
struct IndicatorMapQuery {
    variable: String,
}

#[derive(Deserialize)]
struct SectorMapQuery {
    sector: String,
    branch: Option<String>,
}

#[derive(Deserialize)]
struct CompareQuery {
    variable: String,
    /// Comma-separated
    provinces: String,
}

// ============================================================================
// Validation helpers
// ============================================================================

/// The annual sheet defines the province list; without it nothing can be validated.
fn check_province(state: &AppState, province: &str) -> Result<(), Response> {
    if let Some(reason) = state.store.partition(Source::Annual).error() {
        return Err(unavailable(&state.config.sheet_annual, reason));
    }
    if !state.store.has_province(province) {
        return Err(error(
            StatusCode::NOT_FOUND,
            format!("unknown province '{}'", province),
        ));
    }
    Ok(())
}

fn sheet_name(state: &AppState, source: Source) -> &str {
    match source {
        Source::Annual => &state.config.sheet_annual,
        Source::Quarterly => &state.config.sheet_quarterly,
        Source::Rate => &state.config.sheet_rate,
    }
}

fn check_variable(state: &AppState, variable: &str) -> Result<Source, Response> {
    if let Some(source) = state.store.catalog().source_of(variable) {
        return Ok(source);
    }
    let down: Vec<String> = [Source::Annual, Source::Quarterly, Source::Rate]
        .into_iter()
        .filter(|s| !state.store.partition(*s).is_ready())
        .map(|s| sheet_name(state, s).to_string())
        .collect();
    if down.is_empty() {
        Err(error(
            StatusCode::NOT_FOUND,
            format!("unknown variable '{}'", variable),
        ))
    } else {
        Err(error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "variable '{}' not found; unavailable sheets: {}",
                variable,
                down.join(", ")
            ),
        ))
    }
}

fn ready_table<'a>(
    state: &'a SheetState<CompositionTable>,
    sheet: &str,
) -> Result<&'a CompositionTable, Response> {
    match state {
        SheetState::Ready(table) => Ok(table),
        SheetState::Unavailable(reason) => Err(unavailable(sheet, reason)),
    }
}

async fn boundaries_or_503(state: &AppState) -> Result<Arc<LoadedBoundaries>, Response> {
    state.boundaries.get().await.ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "map unavailable: province boundaries could not be loaded",
        )
    })
}

fn share_items(shares: Vec<composition::Share>) -> Vec<ShareItem> {
    shares
        .into_iter()
        .map(|s| ShareItem {
            label: truncate_label(&s.category, LABEL_CHARS),
            display: fmt_pct_plain(Some(s.pct), 1),
            category: s.category,
            pct: s.pct,
        })
        .collect()
}

fn kpi_from_series(state: &AppState, province: &str, label: &str, variable: Option<&str>) -> Kpi {
    let last = variable.and_then(|v| {
        state
            .store
            .get_series(province, v)
            .last()
            .map(|(period, value)| (period.to_string(), value))
    });
    Kpi {
        label: label.to_string(),
        display: fmt_int_es(last.as_ref().map(|(_, v)| *v)),
        value: last.as_ref().map(|(_, v)| *v),
        period: last.map(|(p, _)| p),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let mut sheets: Vec<SheetStatus> = [Source::Annual, Source::Quarterly, Source::Rate]
        .into_iter()
        .map(|source| {
            let partition = state.store.partition(source);
            SheetStatus {
                sheet: sheet_name(&state, source).to_string(),
                available: partition.is_ready(),
                error: partition.error().map(str::to_string),
            }
        })
        .collect();
    for (sheet, table) in [
        (&state.config.sheet_sectors, &state.compositions.sectors),
        (&state.config.sheet_branches, &state.compositions.branches),
    ] {
        sheets.push(SheetStatus {
            sheet: sheet.clone(),
            available: table.is_ready(),
            error: table.error().map(str::to_string),
        });
    }

    let peeked = state.boundaries.peek();
    let boundaries = match &peeked {
        None => "pending",
        Some(Some(_)) => "loaded",
        Some(None) => "unavailable",
    };
    let boundaries_loaded_at = peeked.flatten().map(|b| b.loaded_at.to_rfc3339());

    Json(HealthResponse {
        ok: sheets.iter().all(|s| s.available),
        version: env!("CARGO_PKG_VERSION"),
        sheets,
        boundaries,
        boundaries_loaded_at,
    })
}

async fn provinces_handler(State(state): State<SharedState>) -> Response {
    if let Some(reason) = state.store.partition(Source::Annual).error() {
        return unavailable(&state.config.sheet_annual, reason);
    }
    Json(ProvincesResponse {
        provinces: state.store.provinces().to_vec(),
    })
    .into_response()
}

async fn variables_handler(
    State(state): State<SharedState>,
    Query(params): Query<VariablesQuery>,
) -> Json<VariablesResponse> {
    let catalog = state.store.catalog();
    let variables = if params.evolution {
        catalog.evolution()
    } else {
        catalog.all()
    };
    Json(VariablesResponse {
        variables,
        annual: catalog.annual().to_vec(),
        quarterly: catalog.quarterly().to_vec(),
        rate: catalog.rate().to_vec(),
        map_indicators: state.roles.map_indicators.clone(),
    })
}

async fn series_handler(
    State(state): State<SharedState>,
    Query(params): Query<SeriesQuery>,
) -> Response {
    if let Err(resp) = check_province(&state, &params.province) {
        return resp;
    }
    let source = match check_variable(&state, &params.variable) {
        Ok(source) => source,
        Err(resp) => return resp,
    };

    let series = state.store.get_series(&params.province, &params.variable);
    let last = series.last().map(|(period, value)| LastValue {
        period: period.to_string(),
        value,
        display: fmt_decimal_es(Some(value)),
    });

    Json(SeriesResponse {
        province: params.province,
        variable: params.variable,
        source,
        points: series.points().to_vec(),
        last,
    })
    .into_response()
}

async fn ficha_handler(
    State(state): State<SharedState>,
    Query(params): Query<FichaQuery>,
) -> Response {
    if let Err(resp) = check_province(&state, &params.province) {
        return resp;
    }
    let province = params.province.as_str();
    let sectors = state.compositions.sectors.data();
    let branches = state.compositions.branches.data();

    let industry_share = match (sectors, state.roles.target_sector.as_deref()) {
        (Some(table), Some(target)) => composition::share_of(table, province, target),
        _ => None,
    };
    let mut kpis = vec![Kpi {
        label: "Industria en el VAB".to_string(),
        value: industry_share,
        period: sectors.and_then(|t| t.last_period()).map(str::to_string),
        display: fmt_pct_plain(industry_share, 1),
    }];
    kpis.push(kpi_from_series(&state, province, "Empresas industriales", state.roles.firms.as_deref()));
    kpis.push(kpi_from_series(&state, province, "Empleo industrial", state.roles.employment.as_deref()));
    kpis.push(kpi_from_series(&state, province, "Exportaciones MOA+MOI (M u$s)", state.roles.exports.as_deref()));

    let summary = match (sectors, state.roles.target_sector.as_deref()) {
        (Some(table), Some(target)) => composition::summarize(table, branches, province, target),
        _ => None,
    };

    Json(FichaResponse {
        province: province.to_string(),
        kpis,
        summary,
        top_sectors: sectors
            .map(|t| share_items(composition::top_categories(t, province, TOP_LIMIT)))
            .unwrap_or_default(),
        top_branches: branches
            .map(|t| share_items(composition::top_categories(t, province, TOP_LIMIT)))
            .unwrap_or_default(),
        sectors_period: sectors.and_then(|t| t.last_period()).map(str::to_string),
        branches_period: branches.and_then(|t| t.last_period()).map(str::to_string),
    })
    .into_response()
}

async fn indicator_map_handler(
    State(state): State<SharedState>,
    Query(params): Query<IndicatorMapQuery>,
) -> Response {
    let Some(kind) = roles::map_indicator_kind(&params.variable) else {
        return error(
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a map indicator", params.variable),
        );
    };
    if let Err(resp) = check_variable(&state, &params.variable) {
        return resp;
    }
    let boundaries = match boundaries_or_503(&state).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let rows = state.store.latest_by_province(&params.variable);
    Json(MapResponse {
        title: params.variable,
        kind,
        map: ranking::build(&rows, &boundaries.set, kind),
    })
    .into_response()
}

fn find_category(table: &CompositionTable, wanted: &str) -> Option<String> {
    let wanted = wanted.trim().to_lowercase();
    table
        .categories()
        .into_iter()
        .find(|c| c.to_lowercase() == wanted)
}

async fn sector_map_handler(
    State(state): State<SharedState>,
    Query(params): Query<SectorMapQuery>,
) -> Response {
    let sectors = match ready_table(&state.compositions.sectors, &state.config.sheet_sectors) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let Some(sector) = find_category(sectors, &params.sector) else {
        return error(
            StatusCode::NOT_FOUND,
            format!("unknown sector '{}'", params.sector),
        );
    };
    let branch = params
        .branch
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty() && !b.eq_ignore_ascii_case(ALL_BRANCHES));

    let (title, rows) = match branch {
        None => {
            let rows = composition::share_by_province(sectors, &sectors.provinces(), &sector);
            let period = sectors.last_period().unwrap_or_default();
            (format!("{} · % del VAB ({})", sector, period), rows)
        }
        Some(branch) => {
            let is_target = state
                .roles
                .target_sector
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(&sector));
            if !is_target {
                return error(
                    StatusCode::BAD_REQUEST,
                    format!("branches only apply to '{}'", roles::TARGET_SECTOR),
                );
            }
            let branches =
                match ready_table(&state.compositions.branches, &state.config.sheet_branches) {
                    Ok(t) => t,
                    Err(resp) => return resp,
                };
            let Some(branch) = find_category(branches, branch) else {
                return error(
                    StatusCode::NOT_FOUND,
                    format!("unknown branch '{}'", branch),
                );
            };
            let rows = composition::share_by_province(branches, &branches.provinces(), &branch);
            let period = branches.last_period().unwrap_or_default();
            (
                format!("{} · % del VAB industrial de cada pcia ({})", branch, period),
                rows,
            )
        }
    };

    let boundaries = match boundaries_or_503(&state).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    Json(MapResponse {
        title,
        kind: ValueKind::Share,
        map: ranking::build(&rows, &boundaries.set, ValueKind::Share),
    })
    .into_response()
}

async fn compare_handler(
    State(state): State<SharedState>,
    Query(params): Query<CompareQuery>,
) -> Response {
    let provinces: Vec<String> = params
        .provinces
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if provinces.is_empty() || provinces.len() > MAX_COMPARED {
        return error(
            StatusCode::BAD_REQUEST,
            format!("select between 1 and {} provinces", MAX_COMPARED),
        );
    }
    for province in &provinces {
        if let Err(resp) = check_province(&state, province) {
            return resp;
        }
    }
    if let Err(resp) = check_variable(&state, &params.variable) {
        return resp;
    }

    let table = state.store.comparison(&params.variable, &provinces);
    let rows = table
        .periods
        .into_iter()
        .zip(table.cells)
        .map(|(period, values)| CompareRow {
            display: values.iter().map(|v| fmt_decimal_es(*v)).collect(),
            period,
            values,
        })
        .collect();

    Json(CompareResponse {
        percentage: roles::map_indicator_kind(&params.variable) == Some(ValueKind::Percentage),
        variable: params.variable,
        provinces: table.provinces,
        rows,
    })
    .into_response()
}

async fn boundaries_handler(State(state): State<SharedState>) -> Response {
    match boundaries_or_503(&state).await {
        Ok(b) => Json(b.set.raw().clone()).into_response(),
        Err(resp) => resp,
    }
}

fn app(state: SharedState) -> Router {
    // CORS for web frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/provinces", get(provinces_handler))
        .route("/variables", get(variables_handler))
        .route("/series", get(series_handler))
        .route("/ficha", get(ficha_handler))
        .route("/map/indicator", get(indicator_map_handler))
        .route("/map/sector", get(sector_map_handler))
        .route("/compare", get(compare_handler))
        .route("/boundaries", get(boundaries_handler))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bind = std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let config = SourceConfig::from_env().context("Invalid source configuration")?;
    let boundary_config = BoundarySourcesConfig::from_env()
        .await
        .context("Invalid boundary configuration")?;

    println!("=== Monitor Provincial API ===");
    println!("Loading workbook {}...", config.workbook_path.display());

    let (config, store, compositions) = tokio::task::spawn_blocking(move || {
        let cache = LoadCache::new();
        let store = SeriesStore::load(&config, &cache);
        let compositions = Compositions::load(&config, &cache);
        (config, store, compositions)
    })
    .await
    .context("Workbook loading task failed")?;

    let roles = IndicatorRoles::resolve(&store, &compositions.sectors)
        .context("Indicator labels do not match the workbook")?;
    println!("Workbook loaded: {} provinces", store.provinces().len());

    let loader = BoundaryLoader::new(boundary_config).context("Failed to build HTTP client")?;
    let state = Arc::new(AppState {
        config,
        store,
        compositions,
        roles,
        boundaries: BoundaryCache::new(loader),
    });

    // warm the boundary cache without delaying startup
    let warm = Arc::clone(&state);
    tokio::spawn(async move {
        warm.boundaries.get().await;
    });

    println!("API listening on http://{}", bind);
    println!("\nEndpoints:");
    println!("  GET /health");
    println!("  GET /provinces");
    println!("  GET /variables?evolution=");
    println!("  GET /series?province=&variable=");
    println!("  GET /ficha?province=");
    println!("  GET /map/indicator?variable=");
    println!("  GET /map/sector?sector=&branch=");
    println!("  GET /compare?variable=&provinces=a,b");
    println!("  GET /boundaries");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use monitor_parser::{CompositionRow, Observation};
    use serde_json::Value;
    use std::path::PathBuf;
    use tower::ServiceExt;

    const GEOJSON: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"id":"14","nombre":"Córdoba"},"geometry":null},
        {"type":"Feature","properties":{"id":"66","nombre":"Salta"},"geometry":null}
    ]}"#;

    fn obs(province: &str, variable: &str, period: &str, period_num: i64, value: f64) -> Observation {
        Observation {
            province: province.to_string(),
            variable: variable.to_string(),
            period: period.to_string(),
            period_num,
            value: Some(value),
        }
    }

    fn table(rows: &[(&str, &str, f64)]) -> SheetState<CompositionTable> {
        SheetState::Ready(CompositionTable {
            periods: vec!["2022".to_string()],
            rows: rows
                .iter()
                .map(|(province, category, value)| CompositionRow {
                    province: province.to_string(),
                    category: category.to_string(),
                    values: vec![Some(*value)],
                })
                .collect(),
        })
    }

    fn annual() -> Vec<Observation> {
        vec![
            obs("Córdoba", roles::KPI_FIRMS, "2023", 2023, 9800.0),
            obs("Córdoba", roles::KPI_EXPORTS, "2023", 2023, 4200.7),
            obs("Córdoba", "Industria / VAB Total", "2023", 2023, 0.2),
            obs("Córdoba", "VAB por 1000 habitantes", "2023", 2023, 1500.0),
            obs("Salta", roles::KPI_FIRMS, "2023", 2023, 900.0),
            obs("Salta", roles::KPI_EXPORTS, "2023", 2023, 310.0),
            obs("Salta", "Industria / VAB Total", "2023", 2023, 0.1),
        ]
    }

    fn quarterly() -> Vec<Observation> {
        vec![
            obs("Córdoba", "Empleo industrial privado", "II-23", 20232, 101.0),
            obs("Córdoba", "Empleo industrial privado", "I-23", 20231, 100.0),
            obs("Salta", "Empleo industrial privado", "I-24", 20241, 21.0),
        ]
    }

    fn build_state(
        quarterly: SheetState<Vec<Observation>>,
        boundary_paths: Vec<PathBuf>,
    ) -> SharedState {
        let store = SeriesStore::from_parts(
            SheetState::Ready(annual()),
            quarterly,
            SheetState::Ready(vec![obs("Córdoba", roles::RATE_LABEL, "nov-20", 202011, 2.1)]),
            roles::RATE_LABEL,
        );
        let compositions = Compositions {
            sectors: table(&[
                ("Córdoba", "Industria manufacturera", 30.0),
                ("Córdoba", "Agro", 25.0),
                ("Córdoba", "Comercio", 25.0),
                ("Córdoba", "Servicios", 20.0),
                ("Salta", "Industria manufacturera", 1.0),
                ("Salta", "Agro", 99.0),
            ]),
            branches: table(&[
                ("Córdoba", "Alimentos", 60.0),
                ("Córdoba", "Automotriz", 40.0),
                ("Salta", "Alimentos", 100.0),
            ]),
        };
        let roles = IndicatorRoles::resolve(&store, &compositions.sectors).unwrap();
        let boundary_config = BoundarySourcesConfig {
            local_paths: boundary_paths,
            remote_urls: Vec::new(),
            ..BoundarySourcesConfig::default()
        };
        Arc::new(AppState {
            config: SourceConfig::default(),
            store,
            compositions,
            roles,
            boundaries: BoundaryCache::new(BoundaryLoader::new(boundary_config).unwrap()),
        })
    }

    /// State with boundaries on disk; keep the returned dir alive.
    fn state_with_map() -> (SharedState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provincias.geojson");
        std::fs::write(&path, GEOJSON).unwrap();
        (build_state(SheetState::Ready(quarterly()), vec![path]), dir)
    }

    fn enc(s: &str) -> String {
        s.bytes()
            .map(|b| {
                if b.is_ascii_alphanumeric() || b"-_.~".contains(&b) {
                    (b as char).to_string()
                } else {
                    format!("%{:02X}", b)
                }
            })
            .collect()
    }

    async fn get(state: SharedState, uri: &str) -> (StatusCode, Value) {
        let response = app(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    // ------------------------------------------------------------------
    // catalog endpoints
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_health_reports_every_sheet() {
        let state = build_state(SheetState::Unavailable("sheet 'trim' not found".into()), vec![]);
        let (status, body) = get(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], false);
        assert_eq!(body["sheets"].as_array().unwrap().len(), 5);
        assert_eq!(body["sheets"][1]["sheet"], "trim");
        assert_eq!(body["sheets"][1]["available"], false);
        assert_eq!(body["boundaries"], "pending");
    }

    #[tokio::test]
    async fn test_provinces() {
        let (state, _dir) = state_with_map();
        let (status, body) = get(state, "/provinces").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["provinces"], serde_json::json!(["Córdoba", "Salta"]));
    }

    #[tokio::test]
    async fn test_variables_evolution_filter() {
        let (state, _dir) = state_with_map();
        let (_, all) = get(Arc::clone(&state), "/variables").await;
        let (_, evolution) = get(state, "/variables?evolution=true").await;
        let has = |body: &Value, name: &str| {
            body["variables"]
                .as_array()
                .unwrap()
                .iter()
                .any(|v| v == name)
        };
        assert!(has(&all, "VAB por 1000 habitantes"));
        assert!(!has(&evolution, "VAB por 1000 habitantes"));
        assert!(has(&evolution, roles::RATE_LABEL));
        assert_eq!(all["quarterly"], serde_json::json!(["Empleo industrial privado"]));
    }

    // ------------------------------------------------------------------
    // series
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_series_sorted_with_last() {
        let (state, _dir) = state_with_map();
        let uri = format!(
            "/series?province={}&variable={}",
            enc("Córdoba"),
            enc("Empleo industrial privado")
        );
        let (status, body) = get(state, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "quarterly");
        assert_eq!(body["points"][0]["period"], "I-23");
        assert_eq!(body["last"]["period"], "II-23");
        assert_eq!(body["last"]["display"], "101,00");
    }

    #[tokio::test]
    async fn test_series_unknown_names_are_404() {
        let (state, _dir) = state_with_map();
        let (status, body) = get(Arc::clone(&state), "/series?province=Atlantida&variable=Salta").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("Atlantida"));

        let (status, _) = get(state, "/series?province=Salta&variable=Inexistente").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_series_from_unavailable_sheet_is_503() {
        let state = build_state(SheetState::Unavailable("sheet 'trim' not found".into()), vec![]);
        let uri = format!("/series?province=Salta&variable={}", enc("Empleo industrial privado"));
        let (status, body) = get(state, &uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("trim"));
    }

    // ------------------------------------------------------------------
    // fact sheet
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_ficha() {
        let (state, _dir) = state_with_map();
        let (status, body) = get(state, &format!("/ficha?province={}", enc("Córdoba"))).await;
        assert_eq!(status, StatusCode::OK);

        let kpis = body["kpis"].as_array().unwrap();
        assert_eq!(kpis.len(), 4);
        assert_eq!(kpis[0]["display"], "30,0%");
        assert_eq!(kpis[0]["period"], "2022");
        assert_eq!(kpis[1]["display"], "9.800");
        assert_eq!(kpis[2]["display"], "101");
        assert_eq!(kpis[2]["period"], "II-23");
        assert_eq!(kpis[3]["display"], "4.201");

        assert_eq!(
            body["summary"],
            "Sus principales sectores son Industria manufacturera (30,0% del VAB) y Agro (25,0%). \
             Las principales ramas industriales son Alimentos (60,0% del VAB industrial) y Automotriz (40,0%)."
        );
        assert_eq!(body["top_sectors"].as_array().unwrap().len(), 4);
        assert_eq!(body["top_branches"][0]["category"], "Alimentos");
    }

    #[tokio::test]
    async fn test_ficha_degrades_without_quarterly() {
        let state = build_state(SheetState::Unavailable("gone".into()), vec![]);
        let (status, body) = get(state, "/ficha?province=Salta").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kpis"][2]["display"], "—");
        assert_eq!(body["kpis"][2]["value"], Value::Null);
        assert_eq!(body["kpis"][0]["display"], "1,0%");
    }

    // ------------------------------------------------------------------
    // maps
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_indicator_map_and_ranking() {
        let (state, _dir) = state_with_map();
        let uri = format!("/map/indicator?variable={}", enc("Industria / VAB Total"));
        let (status, body) = get(state, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "percentage");
        assert_eq!(body["feature_id_key"], "properties.id");
        assert_eq!(body["plot"].as_array().unwrap().len(), 2);
        assert_eq!(body["ranking"][0]["province"], "Córdoba");
        assert_eq!(body["ranking"][0]["rank"], 1);
        assert_eq!(body["ranking"][0]["display"], "20,0%");
        assert_eq!(body["ranking"][0]["value"], 0.2);
        assert_eq!(body["plot"][1]["boundary_id"], "66");
    }

    #[tokio::test]
    async fn test_indicator_map_validation() {
        let (state, _dir) = state_with_map();
        let (status, _) = get(Arc::clone(&state), &format!("/map/indicator?variable={}", enc("Población"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // allow-listed but absent from the workbook
        let (status, _) = get(state, &format!("/map/indicator?variable={}", enc("MOA+MOI / Expo"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_map_without_boundaries_is_503() {
        let state = build_state(SheetState::Ready(quarterly()), vec![PathBuf::from("no/such.geojson")]);
        let uri = format!("/map/indicator?variable={}", enc("Industria / VAB Total"));
        let (status, body) = get(Arc::clone(&state), &uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().starts_with("map unavailable"));

        let (_, health) = get(state, "/health").await;
        assert_eq!(health["boundaries"], "unavailable");
        assert_eq!(health["boundaries_loaded_at"], Value::Null);
    }

    #[tokio::test]
    async fn test_sector_map_shares() {
        let (state, _dir) = state_with_map();
        let uri = format!("/map/sector?sector={}", enc("industria manufacturera"));
        let (status, body) = get(state, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Industria manufacturera · % del VAB (2022)");
        assert_eq!(body["ranking"][0]["province"], "Córdoba");
        assert_eq!(body["kind"], "share");
        assert_eq!(body["ranking"][0]["display"], "30,0%");
        assert_eq!(body["ranking"][1]["display"], "1,0%");
        // same number as the ficha's share
        assert_eq!(body["ranking"][0]["value"], 30.0);
        assert_eq!(body["plot"][1]["value"], 1.0);
    }

    #[tokio::test]
    async fn test_branch_map_uses_industrial_total() {
        let (state, _dir) = state_with_map();
        let uri = format!(
            "/map/sector?sector={}&branch=Alimentos",
            enc("Industria manufacturera")
        );
        let (status, body) = get(Arc::clone(&state), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ranking"][0]["province"], "Salta");
        assert_eq!(body["ranking"][0]["display"], "100,0%");
        assert_eq!(body["ranking"][0]["value"], 100.0);
        assert_eq!(body["ranking"][1]["display"], "60,0%");

        // "Total industria" falls back to the sector map
        let uri = format!(
            "/map/sector?sector={}&branch={}",
            enc("Industria manufacturera"),
            enc("Total industria")
        );
        let (_, body) = get(state, &uri).await;
        assert_eq!(body["ranking"][0]["display"], "30,0%");
    }

    #[tokio::test]
    async fn test_sector_map_validation() {
        let (state, _dir) = state_with_map();
        let (status, _) = get(Arc::clone(&state), "/map/sector?sector=Pesca").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(Arc::clone(&state), "/map/sector?sector=Agro&branch=Alimentos").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/map/sector?sector={}&branch=Textil", enc("Industria manufacturera"));
        let (status, _) = get(state, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // ------------------------------------------------------------------
    // comparison and boundaries
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_compare() {
        let (state, _dir) = state_with_map();
        let uri = format!(
            "/compare?variable={}&provinces={},Salta",
            enc("Empleo industrial privado"),
            enc("Córdoba")
        );
        let (status, body) = get(state, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["percentage"], false);
        assert_eq!(body["provinces"], serde_json::json!(["Córdoba", "Salta"]));
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["period"], "I-23");
        assert_eq!(rows[0]["display"], serde_json::json!(["100,00", "—"]));
        assert_eq!(rows[2]["period"], "I-24");
        assert_eq!(rows[2]["values"], serde_json::json!([null, 21.0]));
    }

    #[tokio::test]
    async fn test_compare_province_count() {
        let (state, _dir) = state_with_map();
        let (status, _) = get(Arc::clone(&state), "/compare?variable=x&provinces=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!(
            "/compare?variable={}&provinces=Salta,Salta,Salta,Salta,Salta",
            enc(roles::KPI_FIRMS)
        );
        let (status, _) = get(state, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_boundaries_served_raw() {
        let (state, _dir) = state_with_map();
        let (status, body) = get(Arc::clone(&state), "/boundaries").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["features"].as_array().unwrap().len(), 2);

        let (_, health) = get(state, "/health").await;
        assert_eq!(health["boundaries"], "loaded");
        assert!(health["boundaries_loaded_at"].is_string());
    }
}
