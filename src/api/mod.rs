use axum::{
    Router,
    extract::{Json, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    AssetClassAssumption, AssetKind, EngineConfig, ParameterSweep, ScenarioInput,
    SensitivityParameter, SensitivityResult, SimulationEngine, validate_scenario,
};

const DEFAULT_SIMULATIONS: u32 = 2_000;
const DEFAULT_SEED: u64 = 42;

#[derive(Parser, Debug)]
#[command(
    name = "runway",
    about = "Monte Carlo retirement-sustainability simulator (success rate, wealth bands, risk ratings, sensitivity)"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Engine configuration file (TOML)")]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Log level when RUST_LOG is unset"
    )]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API over HTTP
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run one simulation and print the result with risk ratings
    Simulate(ScenarioArgs),
    /// Sweep the default parameter set and print the impact curves
    Sensitivity(ScenarioArgs),
}

#[derive(clap::Args, Debug)]
pub struct ScenarioArgs {
    #[arg(
        long,
        help = "Scenario JSON file (API payload format, rates in percent); defaults to a balanced 60/30/10 plan"
    )]
    scenario: Option<PathBuf>,
    #[arg(long)]
    simulations: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetClassPayload {
    name: String,
    kind: AssetKind,
    expected_return: f64,
    volatility: f64,
    allocation: f64,
}

// Rates and allocation in percent.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenarioPayload {
    initial_portfolio_value: Option<f64>,
    time_horizon_years: Option<u32>,
    annual_withdrawal: Option<f64>,
    withdrawal_growth: Option<f64>,
    withdrawal_start_year: Option<u32>,
    current_age: Option<u32>,
    inflation_mean: Option<f64>,
    inflation_vol: Option<f64>,
    asset_classes: Option<Vec<AssetClassPayload>>,
    simulations: Option<u32>,
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SweepPayload {
    parameter: SensitivityParameter,
    min: f64,
    max: f64,
    steps: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SensitivityPayload {
    #[serde(flatten)]
    scenario: ScenarioPayload,
    parameters: Option<Vec<SweepPayload>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SensitivityResponse {
    seed: Option<u64>,
    results: Vec<SensitivityResult>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let engine = SimulationEngine::new(config)?;

    match cli.command {
        Command::Serve { port } => run_http_server(engine, port).await?,
        Command::Simulate(args) => {
            let scenario = scenario_from_args(&args)?;
            let assessment = engine.assess(&scenario)?;
            print_json(&assessment, args.pretty)?;
        }
        Command::Sensitivity(args) => {
            let scenario = scenario_from_args(&args)?;
            let sweeps = default_sweeps(&scenario);
            let results = engine.analyze_sensitivity(&scenario, &sweeps)?;
            print_json(&sensitivity_response(&scenario, results), args.pretty)?;
        }
    }
    Ok(())
}

fn scenario_from_args(args: &ScenarioArgs) -> Result<ScenarioInput, Box<dyn Error>> {
    let mut payload = match &args.scenario {
        Some(path) => read_payload(path)?,
        None => ScenarioPayload::default(),
    };
    if args.simulations.is_some() {
        payload.simulations = args.simulations;
    }
    if args.seed.is_some() {
        payload.seed = args.seed;
    }
    Ok(scenario_from_payload(payload)?)
}

fn read_payload(path: &Path) -> Result<ScenarioPayload, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| format!("Invalid scenario JSON: {e}").into())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), serde_json::Error> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

pub async fn run_http_server(engine: SimulationEngine, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(Arc::new(engine));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "runway HTTP API listening");

    axum::serve(listener, app).await
}

fn router(engine: Arc<SimulationEngine>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/sensitivity", post(sensitivity_handler))
        .fallback(not_found_handler)
        .with_state(engine)
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(
    State(engine): State<Arc<SimulationEngine>>,
    Json(payload): Json<ScenarioPayload>,
) -> Response {
    let scenario = match scenario_from_payload(payload) {
        Ok(scenario) => scenario,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match tokio::task::spawn_blocking(move || engine.assess(&scenario)).await {
        Ok(Ok(assessment)) => json_response(StatusCode::OK, assessment),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn sensitivity_handler(
    State(engine): State<Arc<SimulationEngine>>,
    Json(payload): Json<SensitivityPayload>,
) -> Response {
    let scenario = match scenario_from_payload(payload.scenario) {
        Ok(scenario) => scenario,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let sweeps = match payload.parameters {
        Some(parameters) => parameters.iter().map(sweep_from_payload).collect(),
        None => default_sweeps(&scenario),
    };

    let task_scenario = scenario.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        engine.analyze_sensitivity(&task_scenario, &sweeps)
    })
    .await;
    match outcome {
        Ok(Ok(results)) => json_response(StatusCode::OK, sensitivity_response(&scenario, results)),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn default_asset_classes() -> Vec<AssetClassPayload> {
    vec![
        AssetClassPayload {
            name: "Global equity".to_string(),
            kind: AssetKind::Equity,
            expected_return: 7.5,
            volatility: 16.0,
            allocation: 60.0,
        },
        AssetClassPayload {
            name: "Investment-grade bonds".to_string(),
            kind: AssetKind::Bond,
            expected_return: 3.5,
            volatility: 6.0,
            allocation: 30.0,
        },
        AssetClassPayload {
            name: "Cash".to_string(),
            kind: AssetKind::Cash,
            expected_return: 1.5,
            volatility: 1.0,
            allocation: 10.0,
        },
    ]
}

fn scenario_from_payload(payload: ScenarioPayload) -> Result<ScenarioInput, String> {
    let asset_classes = payload
        .asset_classes
        .unwrap_or_else(default_asset_classes)
        .into_iter()
        .map(|a| AssetClassAssumption {
            name: a.name,
            kind: a.kind,
            expected_return: a.expected_return / 100.0,
            volatility: a.volatility / 100.0,
            weight: a.allocation / 100.0,
        })
        .collect();

    let scenario = ScenarioInput {
        initial_portfolio_value: payload.initial_portfolio_value.unwrap_or(1_000_000.0),
        time_horizon_years: payload.time_horizon_years.unwrap_or(30),
        annual_withdrawal: payload.annual_withdrawal.unwrap_or(40_000.0),
        withdrawal_growth_rate: payload.withdrawal_growth.unwrap_or(0.0) / 100.0,
        withdrawal_start_year: payload.withdrawal_start_year.unwrap_or(0),
        current_age: payload.current_age,
        inflation_rate_mean: payload.inflation_mean.unwrap_or(2.5) / 100.0,
        inflation_rate_volatility: payload.inflation_vol.unwrap_or(1.0) / 100.0,
        asset_classes,
        simulation_count: payload.simulations.unwrap_or(DEFAULT_SIMULATIONS),
        random_seed: Some(payload.seed.unwrap_or(DEFAULT_SEED)),
    };
    validate_scenario(&scenario).map_err(|e| e.to_string())?;
    Ok(scenario)
}

fn is_rate(parameter: SensitivityParameter) -> bool {
    !matches!(parameter, SensitivityParameter::RetirementAge)
}

fn sweep_from_payload(payload: &SweepPayload) -> ParameterSweep {
    let scale = if is_rate(payload.parameter) { 100.0 } else { 1.0 };
    ParameterSweep {
        parameter: payload.parameter,
        min: payload.min / scale,
        max: payload.max / scale,
        steps: payload.steps.unwrap_or(0),
    }
}

// Retirement age is only swept when the client's age is known.
fn default_sweeps(scenario: &ScenarioInput) -> Vec<ParameterSweep> {
    let sweep = |parameter, min, max| ParameterSweep {
        parameter,
        min,
        max,
        steps: 0,
    };
    let mut sweeps = vec![
        sweep(SensitivityParameter::InflationRate, 0.01, 0.05),
        sweep(SensitivityParameter::EquityReturn, 0.03, 0.10),
        sweep(SensitivityParameter::WithdrawalRate, 0.02, 0.07),
        sweep(SensitivityParameter::ExpenseGrowth, 0.0, 0.03),
    ];
    if let Some(age) = scenario.current_age {
        let latest = (age + scenario.time_horizon_years.saturating_sub(1)).min(age + 10);
        sweeps.insert(
            3,
            sweep(SensitivityParameter::RetirementAge, age as f64, latest as f64),
        );
    }
    if !scenario
        .asset_classes
        .iter()
        .any(|a| a.kind == AssetKind::Equity)
    {
        sweeps.retain(|s| s.parameter != SensitivityParameter::EquityReturn);
    }
    sweeps
}

fn sensitivity_response(
    scenario: &ScenarioInput,
    mut results: Vec<SensitivityResult>,
) -> SensitivityResponse {
    for result in &mut results {
        if !is_rate(result.parameter_id) {
            continue;
        }
        result.baseline_value = result.baseline_value.map(|v| v * 100.0);
        for sample in &mut result.samples {
            sample.value *= 100.0;
        }
    }
    SensitivityResponse {
        seed: scenario.random_seed,
        results,
    }
}
