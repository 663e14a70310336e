mod format;

use axum::{
    Router,
    extract::{
        Json, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::core::{
    BracketKind, BreakEvenConfig, BreakEvenResult, PolicyInputs, PopulationModel,
    SimulationError, SimulationResult, UbiTarget, run_simulation, solve_break_even_ubi,
};

pub use format::{
    DisplayBlock, DisplayMetric, DisplayRow, balance_delta, build_display, format_count,
    format_currency, format_ratio,
};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

/// Bounds and step of one slider on the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LeverRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl LeverRange {
    /// NaN is passed through untouched so the engine can reject it.
    fn clamp(self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

pub const VAT_RANGE: LeverRange = LeverRange {
    min: 0.0,
    max: 30.0,
    step: 0.5,
};
pub const LUXURY_TAX_RANGE: LeverRange = LeverRange {
    min: 0.0,
    max: 40.0,
    step: 0.5,
};
pub const INCOME_TAX_RANGE: LeverRange = LeverRange {
    min: 0.0,
    max: 40.0,
    step: 0.5,
};
pub const UBI_MONTHLY_RANGE: LeverRange = LeverRange {
    min: 0.0,
    max: 2000.0,
    step: 50.0,
};

/// Slider state as the page holds it: tax rates in percent, UBI per month.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyLevers {
    pub vat_rate: f64,
    pub luxury_tax_rate: f64,
    pub income_tax_rate: f64,
    pub ubi_monthly: f64,
    pub ubi_target: UbiTarget,
}

impl Default for PolicyLevers {
    fn default() -> Self {
        Self {
            vat_rate: 10.0,
            luxury_tax_rate: 10.0,
            income_tax_rate: 15.0,
            ubi_monthly: 800.0,
            ubi_target: UbiTarget::Everyone,
        }
    }
}

impl PolicyLevers {
    pub fn clamp_to_ranges(self) -> Self {
        Self {
            vat_rate: VAT_RANGE.clamp(self.vat_rate),
            luxury_tax_rate: LUXURY_TAX_RANGE.clamp(self.luxury_tax_rate),
            income_tax_rate: INCOME_TAX_RANGE.clamp(self.income_tax_rate),
            ubi_monthly: UBI_MONTHLY_RANGE.clamp(self.ubi_monthly),
            ubi_target: self.ubi_target,
        }
    }

    pub fn to_policy_inputs(&self) -> PolicyInputs {
        PolicyInputs {
            vat_rate: self.vat_rate / 100.0,
            luxury_tax_rate: self.luxury_tax_rate / 100.0,
            income_tax_rate: self.income_tax_rate / 100.0,
            ubi_monthly_amount: self.ubi_monthly,
            ubi_target: self.ubi_target,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    #[serde(alias = "vat")]
    vat_rate: Option<f64>,
    #[serde(alias = "luxuryTax")]
    luxury_tax_rate: Option<f64>,
    #[serde(alias = "incomeTax")]
    income_tax_rate: Option<f64>,
    #[serde(alias = "ubiMonthlyAmount")]
    ubi_monthly: Option<f64>,
    /// Any spelling `UbiTarget::from_str` accepts.
    ubi_target: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    levers: PolicyLevers,
    ubi_target_label: &'static str,
    result: SimulationResult,
    display: DisplayBlock,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BreakEvenResponse {
    levers: PolicyLevers,
    ubi_target_label: &'static str,
    break_even: BreakEvenResult,
    solved_monthly_display: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PopulationBracketResponse {
    kind: BracketKind,
    population_share: f64,
    average_income: f64,
    mpc: f64,
    basic_consumption_share: f64,
    luxury_consumption_share: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PopulationResponse {
    total_population: u64,
    brackets: Vec<PopulationBracketResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LeversResponse {
    defaults: PolicyLevers,
    vat_rate: LeverRange,
    luxury_tax_rate: LeverRange,
    income_tax_rate: LeverRange,
    ubi_monthly: LeverRange,
    ubi_targets: Vec<UbiTargetOption>,
}

#[derive(Debug, Serialize)]
struct UbiTargetOption {
    value: UbiTarget,
    label: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type SharedModel = Arc<PopulationModel>;

pub fn build_router(model: PopulationModel) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/levers", get(levers_handler))
        .route("/api/population", get(population_handler))
        .route("/api/break-even", get(break_even_handler))
        .fallback(not_found_handler)
        .with_state(Arc::new(model))
}

pub async fn run_http_server(addr: SocketAddr, model: PopulationModel) -> std::io::Result<()> {
    let app = build_router(model);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("UBI policy sandbox listening on http://{addr}");
    tracing::info!("Local access: http://127.0.0.1:{}/", addr.port());

    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(
    State(model): State<SharedModel>,
    payload: Result<Query<SimulatePayload>, QueryRejection>,
) -> Response {
    match payload {
        Ok(Query(payload)) => simulate_handler_impl(&model, payload),
        Err(rejection) => rejection_response(rejection.body_text()),
    }
}

async fn simulate_post_handler(
    State(model): State<SharedModel>,
    payload: Result<Json<SimulatePayload>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(payload)) => simulate_handler_impl(&model, payload),
        Err(rejection) => rejection_response(rejection.body_text()),
    }
}

async fn break_even_handler(
    State(model): State<SharedModel>,
    payload: Result<Query<SimulatePayload>, QueryRejection>,
) -> Response {
    match payload {
        Ok(Query(payload)) => break_even_handler_impl(&model, payload),
        Err(rejection) => rejection_response(rejection.body_text()),
    }
}

async fn levers_handler() -> Response {
    json_response(StatusCode::OK, levers_response())
}

async fn population_handler(State(model): State<SharedModel>) -> Response {
    json_response(StatusCode::OK, population_response(&model))
}

fn simulate_handler_impl(model: &PopulationModel, payload: SimulatePayload) -> Response {
    let simulated = levers_from_payload(payload).and_then(|levers| {
        run_simulation(&levers.to_policy_inputs(), model).map(|result| (levers, result))
    });
    let (levers, result) = match simulated {
        Ok(simulated) => simulated,
        Err(e) => return invalid_input_response(&e, "simulation"),
    };

    tracing::debug!(
        ubi_target = levers.ubi_target.label(),
        total_tax_revenue = result.total_tax_revenue,
        total_ubi_cost = result.total_ubi_cost,
        budget_balance = result.budget_balance,
        "simulation complete"
    );

    json_response(StatusCode::OK, build_simulate_response(levers, result))
}

fn break_even_handler_impl(model: &PopulationModel, payload: SimulatePayload) -> Response {
    let config = BreakEvenConfig {
        search_min: UBI_MONTHLY_RANGE.min,
        search_max: UBI_MONTHLY_RANGE.max,
        ..BreakEvenConfig::default()
    };
    let solved = levers_from_payload(payload).and_then(|levers| {
        solve_break_even_ubi(&levers.to_policy_inputs(), model, config)
            .map(|break_even| (levers, break_even))
    });
    match solved {
        Ok((levers, break_even)) => {
            let solved_monthly_display = break_even.solved_monthly_amount.map(format_currency);
            json_response(
                StatusCode::OK,
                BreakEvenResponse {
                    ubi_target_label: levers.ubi_target.label(),
                    levers,
                    break_even,
                    solved_monthly_display,
                },
            )
        }
        Err(e) => invalid_input_response(&e, "break-even"),
    }
}

fn levers_from_payload(payload: SimulatePayload) -> Result<PolicyLevers, SimulationError> {
    let mut levers = PolicyLevers::default();

    if let Some(v) = payload.vat_rate {
        levers.vat_rate = v;
    }
    if let Some(v) = payload.luxury_tax_rate {
        levers.luxury_tax_rate = v;
    }
    if let Some(v) = payload.income_tax_rate {
        levers.income_tax_rate = v;
    }
    if let Some(v) = payload.ubi_monthly {
        levers.ubi_monthly = v;
    }
    if let Some(v) = payload.ubi_target {
        levers.ubi_target = v.parse()?;
    }

    Ok(levers.clamp_to_ranges())
}

fn build_simulate_response(levers: PolicyLevers, result: SimulationResult) -> SimulateResponse {
    SimulateResponse {
        ubi_target_label: levers.ubi_target.label(),
        display: build_display(&result),
        levers,
        result,
    }
}

fn levers_response() -> LeversResponse {
    LeversResponse {
        defaults: PolicyLevers::default(),
        vat_rate: VAT_RANGE,
        luxury_tax_rate: LUXURY_TAX_RANGE,
        income_tax_rate: INCOME_TAX_RANGE,
        ubi_monthly: UBI_MONTHLY_RANGE,
        ubi_targets: [UbiTarget::Everyone, UbiTarget::Bottom50, UbiTarget::Bottom20]
            .into_iter()
            .map(|value| UbiTargetOption {
                value,
                label: value.label(),
            })
            .collect(),
    }
}

fn population_response(model: &PopulationModel) -> PopulationResponse {
    PopulationResponse {
        total_population: model.total_population(),
        brackets: model
            .brackets()
            .iter()
            .map(|bracket| {
                let split = bracket.consumption_split();
                PopulationBracketResponse {
                    kind: bracket.kind,
                    population_share: bracket.population_share,
                    average_income: bracket.average_income,
                    mpc: bracket.mpc,
                    basic_consumption_share: split.basic,
                    luxury_consumption_share: split.luxury,
                }
            })
            .collect(),
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn invalid_input_response(e: &SimulationError, request: &str) -> Response {
    tracing::warn!(error = %e, "rejected {request} request");
    error_response(StatusCode::BAD_REQUEST, &e.to_string())
}

fn rejection_response(detail: String) -> Response {
    tracing::warn!(%detail, "undecodable request payload");
    error_response(
        StatusCode::BAD_REQUEST,
        &format!("Invalid request payload: {detail}"),
    )
}

#[cfg(test)]
fn payload_from_json(json: &str) -> Result<SimulatePayload, String> {
    serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))
}
