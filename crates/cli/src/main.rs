mod cli;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use wakebell_alarm::AlarmRuntime;
use wakebell_core::config::{load_dotenv, Config};
use wakebell_core::{AlarmPayload, AlarmRequest};
use wakebell_platform::SimHost;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let args = CliArgs::parse();
    let config = match args.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let host = SimHost::new();
    match args.command {
        Command::Launch {
            title,
            body,
            ring_for,
        } => launch(&host, config, AlarmPayload::new(title, body), ring_for).await,
        Command::Schedule {
            at,
            in_secs,
            title,
            body,
            deny_exact,
        } => {
            let fire_at = match (at, in_secs) {
                (Some(at), _) => at,
                (None, Some(secs)) => fire_in(secs),
                (None, None) => bail!("either --at or --in is required"),
            };
            if deny_exact {
                host.set_exact_alarms_allowed(false);
            }
            schedule(&host, config, AlarmRequest::new(AlarmPayload::new(title, body), fire_at)).await
        }
        Command::Serve => serve(&host, config).await,
    }
}

async fn launch(host: &SimHost, config: Config, payload: AlarmPayload, ring_for: u64) -> Result<()> {
    let runtime = AlarmRuntime::start(config, host.platform());
    runtime
        .scheduler()
        .launch_immediate(AlarmRequest::immediate(payload));

    if let Some(presenter) = runtime.presenters().current() {
        let view = presenter.view();
        println!("[{}] {} / {}", view.action_label, view.title, view.body);
    }

    tokio::time::sleep(Duration::from_secs(ring_for)).await;
    if !runtime.dismiss() {
        info!("alarm was no longer on screen");
    }
    runtime.shutdown().await.context("delivery worker failed")?;
    print_events(host);
    Ok(())
}

async fn schedule(host: &SimHost, config: Config, request: AlarmRequest) -> Result<()> {
    let grace = config.delivery.grace_period();
    let runtime = AlarmRuntime::start(config, host.platform());
    let fire_at = request.fire_at_epoch_millis.unwrap_or_default();

    match runtime.scheduler().schedule_alarm(request).await {
        Ok(ack) => println!("{}", serde_json::json!({ "ok": true, "requestCode": ack.request_code.map(|c| c.0) })),
        Err(e) => {
            println!("{}", serde_json::json!({ "error": e.code(), "message": e.to_string() }));
            runtime.shutdown().await.context("delivery worker failed")?;
            bail!("alarm not scheduled: {e}");
        }
    }

    // Follow the delivery until the session has had time to end on its own.
    let until_fire = fire_at.saturating_sub(Utc::now().timestamp_millis()).max(0) as u64;
    let wait = Duration::from_millis(until_fire) + grace + Duration::from_millis(500);
    info!(wait_ms = wait.as_millis() as u64, "waiting for delivery");
    tokio::time::sleep(wait).await;

    runtime.shutdown().await.context("delivery worker failed")?;
    print_events(host);
    Ok(())
}

async fn serve(host: &SimHost, config: Config) -> Result<()> {
    let runtime = AlarmRuntime::start(config, host.platform());
    let handler = runtime.command_handler();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("serving JSON commands on stdin");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                println!("{}", handler.handle_json(&line).await);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    runtime.shutdown().await.context("delivery worker failed")?;
    Ok(())
}

/// Epoch millis `secs` from now, clamped instead of overflowing.
fn fire_in(secs: u64) -> i64 {
    let millis = i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000);
    Utc::now().timestamp_millis().saturating_add(millis)
}

fn print_events(host: &SimHost) {
    for event in host.events() {
        println!("  {event:?}");
    }
}
