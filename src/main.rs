//! seismomap - styled earthquake map layers from your terminal.
//!
//! Fetches USGS GeoJSON feeds, styles every event as a map marker, and hands
//! the result to a terminal, a pipe, or any HTTP map front-end.

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use seismomap::client::{FeedClient, RetryConfig};
use seismomap::config::{self, ConfigFile, ConfigOverrides, RenderConfig};
use seismomap::output::{self, Format};
use seismomap::pipeline::Pipeline;
use seismomap::scale::build_legend_entries;
use seismomap::server;

mod cli;

use cli::{Cli, Command, FetchArgs};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Render(args) => cmd_render(config_path, args),
        Command::Legend(args) => cmd_legend(config_path, args),
        Command::Serve(args) => cmd_serve(config_path, args),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Merge the optional config file with command-line overrides.
fn load_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<RenderConfig> {
    let file = match path {
        Some(p) => ConfigFile::load(p)?,
        None => ConfigFile::default(),
    };
    Ok(config::resolve(file, overrides)?)
}

fn build_client(args: &FetchArgs) -> Result<FeedClient> {
    let retry = RetryConfig {
        max_retries: args.retries,
        ..RetryConfig::default()
    };
    FeedClient::with_options(Duration::from_secs(args.timeout), retry)
        .context("failed to create feed client")
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to create tokio runtime")
}

/// Execute the `render` command - one pass over every layer.
fn cmd_render(config_path: Option<&Path>, args: cli::RenderArgs) -> Result<()> {
    let config = load_config(config_path, args.style.overrides())?;
    let client = build_client(&args.fetch)?;

    tracing::info!(
        "rendering {} layers (scale {}, factor {})",
        config.layers.len(),
        config.scale_name(),
        config.scale_factor
    );

    let pipeline = Pipeline::new(client, config);
    let doc = runtime()?.block_on(pipeline.render());

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if args.union && matches!(args.format, Format::Human | Format::Json) {
        tracing::warn!("--union only applies to geojson and ndjson output");
    }
    output::write_document(&mut handle, &doc, args.format, args.union)?;
    handle.flush()?;

    if doc.layers.is_empty() {
        anyhow::bail!("no layer could be fetched");
    }
    Ok(())
}

/// Execute the `legend` command.
fn cmd_legend(config_path: Option<&Path>, args: cli::LegendArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        preset: args.preset,
        ..ConfigOverrides::default()
    };
    let config = load_config(config_path, overrides)?;
    let legend = build_legend_entries(&config.scale);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if args.json {
        writeln!(handle, "{}", serde_json::to_string_pretty(&legend)?)?;
    } else {
        writeln!(handle, "Magnitude ({})", config.scale_name())?;
        output::write_legend(&mut handle, &legend)?;
    }
    Ok(())
}

/// Execute the `serve` command - start the HTTP API.
fn cmd_serve(config_path: Option<&Path>, args: cli::ServeArgs) -> Result<()> {
    let config = load_config(config_path, args.style.overrides())?;
    let client = build_client(&args.fetch)?;

    let server_config = server::ServerConfig {
        port: args.port,
        host: args.host.clone(),
        refresh_interval: args.refresh,
    };
    if args.refresh < server::MIN_REFRESH_SECS {
        tracing::warn!(
            "refresh interval clamped to minimum of {} seconds",
            server::MIN_REFRESH_SECS
        );
    }

    // Print startup message
    let url = format!("http://{}:{}", args.host, args.port);
    println!("\x1b[1m🌍 seismomap API\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Render:  \x1b[96m{url}/api/render\x1b[0m");
    println!("  Legend:  {url}/api/legend");
    println!("  Union:   {url}/api/union");
    println!("  Stream:  {url}/stream");
    for layer in &config.layers {
        println!("  Layer:   {}", layer.name);
    }
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    let pipeline = Pipeline::new(client, config);
    runtime()?.block_on(server::run_server(server_config, pipeline))
}
