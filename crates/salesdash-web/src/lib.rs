//! Axum + Askama dashboard UI over the aggregation pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use salesdash_core::{
    AggregationRequest, BarOrder, MetricMode, Quarter, OTHER_MANAGERS_LABEL,
};
use salesdash_data::Dataset;
use salesdash_pipeline::{
    AgentBars, BarTable, DashboardService, Headline, Outcome, QuarterRevenue, RevenueSplit,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "salesdash-web";

const NOT_AVAILABLE: &str = "n/a";

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8050,
        }
    }
}

impl WebConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: std::env::var("SALESDASH_BIND").unwrap_or(defaults.bind),
            port: std::env::var("SALESDASH_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: DashboardService,
    pub workspace_root: PathBuf,
    pub drop_earliest_year: bool,
}

impl AppState {
    pub fn new(dataset: Arc<Dataset>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            service: DashboardService::new(dataset),
            workspace_root: workspace_root.into(),
            drop_earliest_year: true,
        }
    }

    pub fn with_drop_earliest_year(mut self, drop_earliest_year: bool) -> Self {
        self.drop_earliest_year = drop_earliest_year;
        self
    }

    fn dataset(&self) -> &Dataset {
        self.service.dataset()
    }
}

/// Raw control values as sent by the page. Blank strings mean "unselected".
#[derive(Debug, Deserialize, Default)]
struct DashboardQuery {
    manager: Option<String>,
    year: Option<String>,
    quarter: Option<String>,
    mode: Option<String>,
    order: Option<String>,
}

impl DashboardQuery {
    fn to_request(&self) -> Result<AggregationRequest, String> {
        let fiscal_year = match blank_to_none(&self.year) {
            None => None,
            Some(raw) => Some(
                raw.parse::<i32>()
                    .map_err(|_| format!("invalid fiscal year `{raw}`"))?,
            ),
        };
        let quarter = match blank_to_none(&self.quarter) {
            None => Quarter::Q1,
            Some(raw) => raw.parse().map_err(|e| format!("{e}"))?,
        };
        let metric_mode = match blank_to_none(&self.mode) {
            None => MetricMode::default(),
            Some(raw) => raw.parse().map_err(|e| format!("{e}"))?,
        };
        let bar_order = match blank_to_none(&self.order) {
            None => BarOrder::default(),
            Some(raw) => raw.parse().map_err(|e| format!("{e}"))?,
        };
        Ok(AggregationRequest {
            manager: blank_to_none(&self.manager).map(ToString::to_string),
            fiscal_year,
            quarter,
            metric_mode,
            bar_order,
        })
    }
}

fn blank_to_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
struct OptionRow {
    value: String,
    label: String,
    selected: bool,
}

impl OptionRow {
    fn new(value: impl Into<String>, label: impl Into<String>, selected: bool) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            selected,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    managers: Vec<OptionRow>,
    years: Vec<OptionRow>,
    quarters: Vec<OptionRow>,
    modes: Vec<OptionRow>,
    orders: Vec<OptionRow>,
    total_deals: usize,
    fingerprint: String,
}

#[derive(Template)]
#[template(path = "summary_partial.html")]
struct SummaryPartialTemplate {
    header: String,
    top_product: String,
    product_price: String,
    top_revenue_product: String,
    product_revenue: String,
    top_client: String,
}

impl SummaryPartialTemplate {
    fn from_headline(headline: &Headline) -> Self {
        Self {
            header: text_or(&headline.header, NOT_AVAILABLE),
            top_product: text_or(&headline.top_product, NOT_AVAILABLE),
            product_price: text_or(&headline.product_price, "Unit price unavailable"),
            top_revenue_product: text_or(&headline.top_revenue_product, NOT_AVAILABLE),
            product_revenue: text_or(&headline.product_revenue, NOT_AVAILABLE),
            top_client: text_or(&headline.top_client, NOT_AVAILABLE),
        }
    }
}

fn text_or(outcome: &Outcome<String>, placeholder: &str) -> String {
    outcome
        .value()
        .cloned()
        .unwrap_or_else(|| placeholder.to_string())
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/dashboard/summary", get(summary_handler))
        .route("/charts/revenue-split", get(revenue_split_chart_handler))
        .route("/charts/agent-bars", get(agent_bars_chart_handler))
        .route("/charts/quarter-trend", get(quarter_trend_chart_handler))
        .route("/api/dashboard", get(dashboard_json_handler))
        .route("/api/options", get(options_handler))
        .route("/assets/static/app.css", get(app_css_handler))
        .layer(middleware::from_fn(trace_request))
        .with_state(Arc::new(state))
}

pub async fn serve(config: WebConfig, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;
    info!(bind = %config.bind, port = config.port, "dashboard listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn trace_request(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "http_request",
        %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );
    let mut resp = next.run(req).instrument(span.clone()).await;
    span.in_scope(|| info!(status = resp.status().as_u16(), "request served"));
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        resp.headers_mut()
            .insert(header::HeaderName::from_static("x-request-id"), value);
    }
    resp
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let dataset = state.dataset();
    let options = dataset.options(state.drop_earliest_year);
    let default_year = options.fiscal_years.last().copied();

    let mut managers = vec![OptionRow::new("", "Choose Manager", true)];
    managers.extend(options.managers.iter().map(|m| OptionRow::new(m.as_str(), m.as_str(), false)));

    let tpl = IndexTemplate {
        managers,
        years: options
            .fiscal_years
            .iter()
            .map(|y| OptionRow::new(y.to_string(), y.to_string(), Some(*y) == default_year))
            .collect(),
        quarters: options
            .quarters
            .iter()
            .map(|q| OptionRow::new(q.as_str(), q.as_str(), *q == Quarter::Q1))
            .collect(),
        modes: vec![
            OptionRow::new("won_counts", "'won' closed deals", true),
            OptionRow::new("revenue_duration", "revenue | deal duration", false),
        ],
        orders: vec![
            OptionRow::new("top_to_bottom", "top to bottom", true),
            OptionRow::new("bottom_to_top", "bottom to top", false),
        ],
        total_deals: dataset.deals().len(),
        fingerprint: dataset.fingerprint().chars().take(12).collect(),
    };
    render_html(tpl)
}

async fn summary_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    let request = match query.to_request() {
        Ok(request) => request,
        Err(msg) => return bad_request(msg),
    };
    let headline = state.service.headline(&request);
    if headline.header.is_incomplete() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let mut resp = render_html(SummaryPartialTemplate::from_headline(&headline));
    resp.headers_mut().insert(
        header::HeaderName::from_static("hx-trigger"),
        HeaderValue::from_static("dashboardSummaryLoaded"),
    );
    resp
}

async fn revenue_split_chart_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
    headers: HeaderMap,
) -> Response {
    match query.to_request() {
        Ok(request) => chart_response(
            &state,
            &headers,
            &state.service.revenue_split(&request),
            revenue_split_figure,
        ),
        Err(msg) => bad_request(msg),
    }
}

async fn agent_bars_chart_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
    headers: HeaderMap,
) -> Response {
    match query.to_request() {
        Ok(request) => chart_response(
            &state,
            &headers,
            &state.service.agent_bars(&request),
            agent_bars_figures,
        ),
        Err(msg) => bad_request(msg),
    }
}

async fn quarter_trend_chart_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
    headers: HeaderMap,
) -> Response {
    match query.to_request() {
        Ok(request) => chart_response(
            &state,
            &headers,
            &state.service.quarter_trend(&request),
            |trend: &Vec<QuarterRevenue>| quarter_trend_figure(trend),
        ),
        Err(msg) => bad_request(msg),
    }
}

async fn dashboard_json_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    match query.to_request() {
        Ok(request) => Json(state.service.build(&request)).into_response(),
        Err(msg) => bad_request(msg),
    }
}

async fn options_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.dataset().options(state.drop_earliest_year)).into_response()
}

async fn app_css_handler(State(state): State<Arc<AppState>>) -> Response {
    let css_path = state.workspace_root.join("assets/static/app.css");
    match tokio::fs::read_to_string(&css_path).await {
        Ok(css) => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Html("/* missing app.css */".to_string())).into_response(),
    }
}

/// Incomplete selections answer 204 so the page keeps its previous chart.
/// Results are a pure function of dataset and query, so the dataset
/// fingerprint doubles as the ETag.
fn chart_response<T>(
    state: &AppState,
    headers: &HeaderMap,
    outcome: &Outcome<T>,
    figure: impl FnOnce(&T) -> Value,
) -> Response {
    let etag = format!("\"{}\"", state.dataset().fingerprint());
    let body = match outcome {
        Outcome::Incomplete { .. } => return StatusCode::NO_CONTENT.into_response(),
        Outcome::Empty { reason } => placeholder_figure(reason),
        Outcome::Ok { value } => {
            let fresh = headers
                .get(header::IF_NONE_MATCH)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| etag_matches(v, &etag));
            if fresh {
                return StatusCode::NOT_MODIFIED.into_response();
            }
            figure(value)
        }
    };
    let mut resp = Json(body).into_response();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        resp.headers_mut().insert(header::ETAG, value);
    }
    resp
}

/// Weak comparison against an `If-None-Match` list; `*` matches anything.
fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

pub fn revenue_split_figure(split: &RevenueSplit) -> Value {
    json!({
        "data": [{
            "type": "pie",
            "values": [split.manager_revenue, split.other_revenue],
            "labels": [split.manager_name, OTHER_MANAGERS_LABEL],
            "hole": 0.6
        }],
        "layout": {"title": "Revenue Generated in Quarter"}
    })
}

fn bar_figure(table: &BarTable) -> Value {
    let x = table.bars.iter().map(|b| b.sales_agent.as_str()).collect::<Vec<_>>();
    let y = table.bars.iter().map(|b| b.value).collect::<Vec<_>>();
    json!({
        "data": [{"type": "bar", "x": x, "y": y}],
        "layout": {
            "title": table.title,
            "showlegend": false,
            "xaxis": {"title": table.x_label},
            "yaxis": {"title": table.y_label}
        }
    })
}

pub fn agent_bars_figures(bars: &AgentBars) -> Value {
    json!({
        "primary": bar_figure(&bars.primary),
        "secondary": bar_figure(&bars.secondary),
    })
}

pub fn quarter_trend_figure(trend: &[QuarterRevenue]) -> Value {
    let x = trend.iter().map(|q| q.quarter.as_str()).collect::<Vec<_>>();
    let y = trend.iter().map(|q| q.revenue).collect::<Vec<_>>();
    json!({
        "data": [{"type": "scatter", "mode": "lines", "x": x, "y": y}],
        "layout": {
            "title": "Quarter on Quarter Revenue",
            "showlegend": false,
            "xaxis": {"title": "Quarter"},
            "yaxis": {"title": "Revenue"}
        }
    })
}

fn placeholder_figure(reason: &str) -> Value {
    json!({
        "data": [],
        "layout": {
            "annotations": [{"text": reason, "showarrow": false}],
            "xaxis": {"visible": false},
            "yaxis": {"visible": false}
        }
    })
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn bad_request(msg: String) -> Response {
    (StatusCode::BAD_REQUEST, Html(format!("Bad request: {msg}"))).into_response()
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}
