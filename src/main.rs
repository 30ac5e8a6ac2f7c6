use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use throttle::config::{LoggingConfig, ThrottleConfig};
use throttle::throttle::{Code, InMemoryStateStore, Throttler};

/// Replay a burst of requests for one identity against a configured rule.
#[derive(Parser, Debug)]
#[command(name = "throttle", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Name of the rule to evaluate
    #[arg(short, long)]
    rule: String,

    /// Identity being throttled (client id, API key, IP)
    #[arg(short, long)]
    key: String,

    /// Number of requests to send
    #[arg(short = 'n', long, default_value_t = 10)]
    requests: u32,

    /// Pause between requests, in milliseconds
    #[arg(short, long, default_value_t = 0)]
    interval_ms: u64,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ThrottleConfig::load(&args.config)?;
    init_tracing(&config.logging, args.json_logs);

    info!(
        path = %args.config.display(),
        rules = config.rules.len(),
        "Configuration loaded"
    );

    let store = Arc::new(InMemoryStateStore::with_min_ttl(config.store.min_ttl()));
    let throttler = Throttler::new(config.rule_set(), store);
    let interval = Duration::from_millis(args.interval_ms);

    let mut admitted = 0u32;
    for i in 1..=args.requests {
        let status = throttler.check(&args.rule, &args.key).await?;
        if status.code == Code::Ok {
            admitted += 1;
        }

        println!(
            "{:>4} {} {:<9} volume={:.3} ttl={:.3}s",
            i,
            status.key,
            match status.code {
                Code::Ok => "ok",
                Code::OverLimit => "throttled",
            },
            status.state.volume,
            status.ttl.as_secs_f64()
        );

        if i < args.requests && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    info!(
        admitted,
        throttled = args.requests - admitted,
        "Replay finished"
    );
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if json || logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}
