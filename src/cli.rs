//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use seismomap::config::{ConfigOverrides, LayerSpec};
use seismomap::output::Format;
use seismomap::scale::Preset;

/// Styled earthquake map layers from USGS GeoJSON feeds.
#[derive(Parser, Debug)]
#[command(name = "seismomap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch all layers once and print the styled result
    Render(RenderArgs),

    /// Print the color legend
    Legend(LegendArgs),

    /// Serve render documents over HTTP
    Serve(ServeArgs),
}

/// Styling and layer options shared by every command.
#[derive(Args, Debug, Default)]
pub struct StyleArgs {
    /// Overlay layer as [NAME=]SOURCE, SOURCE being a summary feed
    /// (e.g. 4.5_month) or an http(s) URL. Repeatable.
    #[arg(long = "layer", short = 'l', value_parser = parse_layer)]
    pub layers: Vec<LayerSpec>,

    /// Marker radius per unit of magnitude
    #[arg(long)]
    pub scale_factor: Option<f64>,

    /// Color preset: classic or severity
    #[arg(long, value_parser = parse_preset)]
    pub preset: Option<Preset>,

    /// Base map tile URL template (passed through untouched)
    #[arg(long)]
    pub tile_url: Option<String>,

    /// Base URL for summary feeds
    #[arg(long)]
    pub base_url: Option<String>,
}

impl StyleArgs {
    #[must_use]
    pub fn overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            layers: self.layers,
            base_url: self.base_url,
            scale_factor: self.scale_factor,
            preset: self.preset,
            tile_url: self.tile_url,
        }
    }
}

/// HTTP client options.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Retries for transient failures (timeouts, 429, 502-504)
    #[arg(long, default_value = "2")]
    pub retries: u32,
}

/// Arguments for the `render` command.
#[derive(Parser, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub style: StyleArgs,

    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,

    /// Collapse events listed by several layers into one marker
    /// (geojson and ndjson only)
    #[arg(long)]
    pub union: bool,
}

/// Arguments for the `legend` command.
#[derive(Parser, Debug)]
pub struct LegendArgs {
    /// Color preset: classic or severity
    #[arg(long, value_parser = parse_preset)]
    pub preset: Option<Preset>,

    /// Print JSON instead of swatches
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub style: StyleArgs,

    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Refresh interval in seconds (minimum 30)
    #[arg(long, default_value = "60")]
    pub refresh: u64,
}

/// Parse a layer spec from string.
fn parse_layer(s: &str) -> Result<LayerSpec, String> {
    s.parse()
}

/// Parse a color preset from string.
fn parse_preset(s: &str) -> Result<Preset, String> {
    s.parse()
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}
