//! game-sdk - weather worker demo
//!
//! Runs a single worker against the hosted planner. The task is taken from
//! the command line: `game-sdk "What's the weather in NYC?"`.

use std::sync::Arc;

use game_sdk::{
    function::from_fn, ArgType, Argument, Arguments, CapabilityError, Config, Function,
    FunctionOutput, FunctionResult, FunctionStatus, HttpPlanner, State, Task, Worker,
    WorkerConfig,
};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_sdk=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: base_url={} worker_max_steps={}",
        config.base_url, config.worker_max_steps
    );

    let task = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let task = if task.trim().is_empty() {
        Task::new("What's the weather in New York?")
    } else {
        Task::new(task)
    };

    let planner = Arc::new(HttpPlanner::new(&config)?);
    let worker_config = WorkerConfig::new(
        "weather_reporter",
        "Reports current weather conditions for any city",
        weather_state,
        vec![get_weather()?],
    )?
    .with_instruction("Use get_weather for each city the user mentions, then finish.");
    let mut worker = Worker::new(worker_config, planner, &config)?;

    let stop = worker.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested");
            stop.stop();
        }
    });

    let outcome = worker.run(task).await?;
    info!(
        "Worker finished: {} ({}) after {} steps: {}",
        outcome.status, outcome.terminal_reason, outcome.steps, outcome.message
    );
    println!("{}", serde_json::to_string_pretty(worker.state())?);

    Ok(())
}

fn get_weather() -> game_sdk::Result<Function> {
    Function::new(
        "get_weather",
        "Get the current weather for a city",
        vec![
            Argument::new("city", ArgType::String, "City name"),
            Argument::new("units", ArgType::String, "celsius or fahrenheit").with_default("celsius"),
        ],
        from_fn(|args: Arguments| {
            let city = args.get("city").and_then(Value::as_str).unwrap_or_default();
            let units = args
                .get("units")
                .and_then(Value::as_str)
                .unwrap_or("celsius");

            let (condition, celsius) = match city.to_lowercase().as_str() {
                "new york" | "nyc" => ("sunny", 22.0),
                "london" => ("rainy", 14.0),
                "singapore" => ("humid", 31.0),
                _ => return Err(CapabilityError::failed(format!("no station for {}", city))),
            };
            let temperature = if units == "fahrenheit" {
                celsius * 9.0 / 5.0 + 32.0
            } else {
                celsius
            };

            Ok(
                FunctionOutput::new(format!("{} is {} at {}° {}", city, condition, temperature, units))
                    .with_info("city", city)
                    .with_info("condition", condition)
                    .with_info("temperature", temperature),
            )
        }),
    )
    .map(|f| f.with_hint("Use the city name exactly as the user wrote it"))
}

/// Keeps the latest report per city.
fn weather_state(event: Option<&FunctionResult>, previous: &State) -> anyhow::Result<State> {
    let mut next = previous.clone();
    let Some(result) = event else {
        next.insert("reports".to_string(), json!({}));
        return Ok(next);
    };
    if result.status() == FunctionStatus::Done {
        let city = result
            .info()
            .get("city")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let mut reports = next
            .get("reports")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        reports.insert(city, Value::Object(result.info().clone()));
        next.insert("reports".to_string(), Value::Object(reports));
    }
    Ok(next)
}
