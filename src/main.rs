use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use daylog_guard::config::DaylogConfig;
use daylog_guard::csrf::generate_token;
use daylog_guard::ratelimit::{LimiterKind, LimiterSet, RateLimitHeaders};
use daylog_guard::totp::TotpEngine;

/// Operator tooling for the Daylog request guard.
#[derive(Parser, Debug)]
#[command(name = "daylog-guard", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// TOTP enrollment and code checks
    #[command(subcommand)]
    Totp(TotpCommand),
    /// Print a fresh CSRF token
    CsrfToken,
    /// Print the effective rate limiter configuration
    Limits,
    /// Send requests through a limiter and print each decision
    Probe(ProbeArgs),
}

#[derive(Subcommand, Debug)]
enum TotpCommand {
    /// Generate a new secret and its provisioning URI
    Secret {
        /// Account label shown in the authenticator app
        #[arg(long, default_value = "user")]
        account: String,
    },
    /// Print the current code for a secret
    Code {
        #[arg(long)]
        secret: String,
    },
    /// Check a code against a secret; exits non-zero when it does not match
    Verify {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        code: String,
        /// Steps of drift to accept on either side (defaults to the configured skew)
        #[arg(long)]
        window: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Limiter to drive: auth, api or upload
    #[arg(long, default_value = "auth")]
    preset: LimiterKind,
    /// Limiter key, usually "<client ip>:<route>"
    #[arg(long, default_value = "unknown:/login")]
    key: String,
    /// Number of requests to send
    #[arg(long, default_value_t = 10)]
    count: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    debug!(version = env!("CARGO_PKG_VERSION"), "Starting daylog-guard");

    let config = DaylogConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Totp(command) => run_totp(&config, command),
        Command::CsrfToken => {
            println!("{}", generate_token());
            Ok(ExitCode::SUCCESS)
        }
        Command::Limits => {
            println!("{}", config.limits_json()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Probe(args) => run_probe(&config, args),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_totp(config: &DaylogConfig, command: TotpCommand) -> anyhow::Result<ExitCode> {
    let engine = TotpEngine::new(&config.totp);

    match command {
        TotpCommand::Secret { account } => {
            let secret = engine.generate_secret();
            println!("secret: {}", secret);
            println!("uri:    {}", engine.provisioning_uri(&secret, &account)?);
        }
        TotpCommand::Code { secret } => {
            println!("{}", engine.generate_code(&secret, None)?);
        }
        TotpCommand::Verify {
            secret,
            code,
            window,
        } => {
            if engine.validate_code(&secret, &code, window)? {
                println!("valid");
            } else {
                println!("invalid");
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_probe(config: &DaylogConfig, args: ProbeArgs) -> anyhow::Result<ExitCode> {
    let limiters = LimiterSet::from_config(&config.rate_limiting);
    let limiter = limiters.get(args.preset);

    info!(
        limiter = %limiter.name(),
        key = %args.key,
        count = args.count,
        "Probing rate limiter"
    );

    for attempt in 1..=args.count {
        let decision = limiter.is_allowed(&args.key);
        let headers = RateLimitHeaders::from_decision(&decision, chrono::Utc::now());
        let line = json!({
            "attempt": attempt,
            "decision": decision,
            "headers": headers,
        });
        println!("{}", serde_json::to_string(&line)?);
    }

    limiters.shutdown();
    Ok(ExitCode::SUCCESS)
}
