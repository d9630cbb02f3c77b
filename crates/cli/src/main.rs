//! Cadence CLI - Command-line interface for the Cadence scheduler daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9537";

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence scheduler CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "CADENCE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a scheduled task
    Add {
        /// Owning application id
        #[arg(short, long)]
        application: String,

        /// Webhook URL that receives due-task events
        #[arg(short, long)]
        reply_address: String,

        /// Cron expression (5 or 6 fields). Makes the task recurring.
        #[arg(short, long)]
        cron: Option<String>,

        /// Minutes east of UTC the cron expression is evaluated in
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        utc_offset: i32,

        /// RFC 3339 start time (one-off trigger, or search start for cron)
        #[arg(long)]
        at: Option<String>,

        /// Extra key=value pairs echoed back in every event
        #[arg(short = 'x', long = "extra", value_parser = parse_extra)]
        extra: Vec<(String, String)>,
    },

    /// Show a scheduled task
    Get {
        /// Task ID
        task_id: String,
    },

    /// Dispatch due tasks now
    Sweep,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct AddResult {
    task_id: String,
    next_trigger_time: String,
    is_recurring: bool,
}

#[derive(Deserialize, Tabled)]
struct FailureRow {
    task_id: String,
    kind: String,
    message: String,
}

fn parse_extra(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

fn add_params(
    application: String,
    reply_address: String,
    cron: Option<String>,
    utc_offset: i32,
    at: Option<String>,
    extra: Vec<(String, String)>,
) -> serde_json::Value {
    let extra_values: BTreeMap<String, String> = extra.into_iter().collect();
    let is_recurring = cron.is_some();

    json!({
        "application_id": application,
        "reply_address": reply_address,
        "start_time": at,
        "is_recurring": is_recurring,
        "cron_expression": cron,
        "utc_offset_minutes": if is_recurring { Some(utc_offset) } else { None },
        "extra_values": extra_values,
    })
}

fn display_time(value: &serde_json::Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| "never".to_string())
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Add {
            application,
            reply_address,
            cron,
            utc_offset,
            at,
            extra,
        } => {
            let params = add_params(application, reply_address, cron, utc_offset, at, extra);

            let result = call_rpc(&cli.rpc_url, "schedule.add.v1", params).await?;
            let add_result: AddResult = serde_json::from_value(result)?;

            println!("{}", "✓ Task scheduled".green().bold());
            println!();
            println!("{}", Table::new(vec![add_result]));
        }

        Commands::Get { task_id } => {
            let task = call_rpc(&cli.rpc_url, "schedule.get.v1", json!({ "task_id": task_id }))
                .await?;

            println!("{}", format!("Task {}", task_id).cyan().bold());
            println!();
            println!("  {} {}", "Application:".bold(), task["application_id"]);
            println!("  {} {}", "Reply to:".bold(), task["reply_address"]);
            println!("  {} {}", "State:".bold(), task["state"]);
            if task["is_recurring"].as_bool().unwrap_or(false) {
                println!(
                    "  {} {} (UTC{:+} min)",
                    "Cron:".bold(),
                    task["cron_expression"],
                    task["utc_offset_minutes"].as_i64().unwrap_or(0)
                );
            }
            println!(
                "  {} {}",
                "Next trigger:".bold(),
                display_time(&task["next_trigger_time"])
            );
            println!(
                "  {} {}",
                "Last trigger:".bold(),
                display_time(&task["previous_triggered_time"])
            );
            println!();
            println!(
                "  {} {} total, {} consecutive",
                "Successes:".bold(),
                task["total_success_count"],
                task["consecutive_success_count"]
            );
            println!(
                "  {} {} total, {} consecutive",
                "Failures:".bold(),
                task["total_failure_count"],
                task["consecutive_failure_count"]
            );
            if let Some(error) = task["previous_error"].as_str() {
                println!("  {} {}", "Last error:".bold(), error.red());
            }
        }

        Commands::Sweep => {
            println!("{}", "Running sweep...".cyan().bold());
            println!();

            let result = call_rpc(&cli.rpc_url, "sweep.run.v1", json!({})).await?;
            println!("  {} {}", "Attempted:".bold(), result["attempted"]);
            println!("  {} {}", "Succeeded:".bold(), result["succeeded"].to_string().green());
            println!("  {} {}", "Failed:".bold(), result["failed"].to_string().red());

            let failures: Vec<FailureRow> =
                serde_json::from_value(result["failures"].clone()).unwrap_or_default();
            if !failures.is_empty() {
                println!();
                println!("{}", Table::new(failures));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extra() {
        assert_eq!(
            parse_extra("tenant=acme").unwrap(),
            ("tenant".to_string(), "acme".to_string())
        );
        assert_eq!(
            parse_extra("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_extra("tenant").is_err());
        assert!(parse_extra("=acme").is_err());
    }

    #[test]
    fn test_one_off_params_omit_offset() {
        let params = add_params(
            "billing".to_string(),
            "http://billing/hooks".to_string(),
            None,
            120,
            Some("2022-09-01T00:00:00Z".to_string()),
            vec![],
        );

        assert_eq!(params["is_recurring"], false);
        assert!(params["cron_expression"].is_null());
        assert!(params["utc_offset_minutes"].is_null());
        assert_eq!(params["start_time"], "2022-09-01T00:00:00Z");
    }

    #[test]
    fn test_recurring_params() {
        let params = add_params(
            "billing".to_string(),
            "http://billing/hooks".to_string(),
            Some("*/5 * * * *".to_string()),
            -300,
            None,
            vec![("tenant".to_string(), "acme".to_string())],
        );

        assert_eq!(params["is_recurring"], true);
        assert_eq!(params["utc_offset_minutes"], -300);
        assert_eq!(params["extra_values"]["tenant"], "acme");
        assert!(params["start_time"].is_null());
    }

    #[test]
    fn test_display_time_never() {
        assert_eq!(display_time(&serde_json::Value::Null), "never");
        assert_eq!(display_time(&json!("2022-09-01T00:00:00Z")), "2022-09-01T00:00:00Z");
    }

    #[test]
    fn test_cli_parses_add() {
        let cli = Cli::try_parse_from([
            "cadence",
            "add",
            "-a",
            "billing",
            "-r",
            "http://billing/hooks",
            "--cron",
            "0 0 * * MON-FRI",
            "--utc-offset",
            "-60",
            "-x",
            "tenant=acme",
        ])
        .unwrap();

        match cli.command {
            Commands::Add {
                cron, utc_offset, extra, ..
            } => {
                assert_eq!(cron.as_deref(), Some("0 0 * * MON-FRI"));
                assert_eq!(utc_offset, -60);
                assert_eq!(extra.len(), 1);
            }
            _ => panic!("expected add"),
        }
        assert_eq!(cli.rpc_url, DEFAULT_RPC_URL);
    }
}
