//! Binary executable for the TPP HTTP gateway.

use std::env;
use std::process;
use tpp_http::event::{EventLoggerConfig, LogDestination};
use tpp_http::{TppHttpConfig, TppHttpServer};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// For command line argument parsing
struct Args {
    config: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    switch_endpoint: Option<String>,
    timeout: Option<u64>,
    include_cause_extension: bool,
    truncate_extensions: bool,
    log_file: Option<String>,
    structured_logs: bool,
    verbose: bool,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut args = pico_args::Arguments::from_env();

        if args.contains("--help") {
            print_help();
            process::exit(0);
        }

        if args.contains("--version") {
            println!("tpp-http {}", env!("CARGO_PKG_VERSION"));
            process::exit(0);
        }

        let result = Args {
            config: args
                .opt_value_from_str(["-c", "--config"])?
                .or_else(|| env::var("TPP_HTTP_CONFIG").ok()),
            host: args
                .opt_value_from_str(["-h", "--host"])?
                .or_else(|| env::var("TPP_HTTP_HOST").ok()),
            port: args.opt_value_from_str(["-p", "--port"])?.or_else(|| {
                env::var("TPP_HTTP_PORT")
                    .ok()
                    .and_then(|p| p.parse::<u16>().ok())
            }),
            switch_endpoint: args
                .opt_value_from_str(["-s", "--switch-endpoint"])?
                .or_else(|| env::var("TPP_SWITCH_ENDPOINT").ok()),
            timeout: args.opt_value_from_str(["-t", "--timeout"])?.or_else(|| {
                env::var("TPP_HTTP_TIMEOUT")
                    .ok()
                    .and_then(|t| t.parse::<u64>().ok())
            }),
            include_cause_extension: args.contains("--include-cause-extension"),
            truncate_extensions: args.contains("--truncate-extensions"),
            log_file: args
                .opt_value_from_str("--log-file")?
                .or_else(|| env::var("TPP_HTTP_LOG_FILE").ok()),
            structured_logs: args.contains("--structured-logs")
                || env::var("TPP_STRUCTURED_LOGS").is_ok(),
            verbose: args.contains(["-v", "--verbose"]),
        };

        // Check for any remaining arguments (which would be invalid)
        let remaining = args.finish();
        if !remaining.is_empty() {
            anyhow::bail!("Unknown arguments: {:?}", remaining);
        }

        Ok(result)
    }
}

fn print_help() {
    println!("TPP HTTP Gateway");
    println!("----------------");
    println!("Relays third-party account requests between participants");
    println!();
    println!("USAGE:");
    println!("    tpp-http [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>              JSON configuration file");
    println!("    -h, --host <HOST>                Host to bind to [default: 127.0.0.1]");
    println!("    -p, --port <PORT>                Port to listen on [default: 4003]");
    println!("    -s, --switch-endpoint <URL>      Switch participant directory [default: http://localhost:3001]");
    println!("    -t, --timeout <SECONDS>          Outbound request timeout in seconds [default: 30]");
    println!("    --include-cause-extension        Add the failure cause to error envelopes");
    println!("    --truncate-extensions            Truncate error envelope extensions");
    println!("    --log-file <PATH>                Write gateway events to a file");
    println!("    --structured-logs                Write gateway events as JSON");
    println!("    -v, --verbose                    Enable verbose logging");
    println!("    --help                           Print help information");
    println!("    --version                        Print version information");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    TPP_HTTP_CONFIG                  JSON configuration file");
    println!("    TPP_HTTP_HOST                    Host to bind to");
    println!("    TPP_HTTP_PORT                    Port to listen on");
    println!("    TPP_SWITCH_ENDPOINT              Switch participant directory");
    println!("    TPP_HTTP_TIMEOUT                 Outbound request timeout in seconds");
    println!("    TPP_HTTP_LOG_FILE                Write gateway events to a file");
    println!("    TPP_STRUCTURED_LOGS              Write gateway events as JSON");
    println!("    RUST_LOG                         Log filter [default: tpp_http=info,tpp_relay=info]");
}

fn build_config(args: &Args) -> anyhow::Result<TppHttpConfig> {
    let mut config = match &args.config {
        Some(path) => TppHttpConfig::from_file(path)?,
        None => TppHttpConfig::default(),
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(endpoint) = &args.switch_endpoint {
        config.relay.switch_endpoint = endpoint.clone();
    }
    if let Some(timeout) = args.timeout {
        config.relay.request_timeout_secs = timeout;
    }
    if args.include_cause_extension {
        config.relay.error_handling.include_cause_extension = true;
    }
    if args.truncate_extensions {
        config.relay.error_handling.truncate_extensions = true;
    }
    if let Some(path) = &args.log_file {
        config.event_logger = Some(EventLoggerConfig {
            destination: LogDestination::File { path: path.clone() },
            structured: args.structured_logs,
            log_level: tracing::Level::INFO,
        });
    } else if let Some(logger) = config.event_logger.as_mut() {
        logger.structured |= args.structured_logs;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments first (to check for --verbose)
    let args = Args::parse().unwrap_or_else(|e| {
        eprintln!("Error parsing arguments: {}", e);
        process::exit(1);
    });

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tpp_http={},tpp_relay={}", level, level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TPP HTTP gateway");

    let config = build_config(&args)?;

    info!("Server configuration:");
    info!("  Host: {}", config.host);
    info!("  Port: {}", config.port);
    info!("  Switch endpoint: {}", config.relay.switch_endpoint);
    info!(
        "  Request timeout: {} seconds",
        config.relay.request_timeout_secs
    );
    debug!(
        "  Include cause extension: {}",
        config.relay.error_handling.include_cause_extension
    );
    debug!("  Static endpoints: {}", config.relay.endpoints.len());

    let mut server = match TppHttpServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = server.start().await {
        error!("Failed to start server: {}", e);
        process::exit(1);
    }

    // Wait for Ctrl-C to shut down
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");

    if let Err(e) = server.stop().await {
        error!("Error during shutdown: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}
