use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use salesdash_core::{AggregationRequest, BarOrder, MetricMode, Quarter};
use salesdash_data::{DataConfig, Dataset};
use salesdash_pipeline::DashboardService;
use salesdash_web::{AppState, WebConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "salesdash")]
#[command(about = "Sales pipeline dashboard")]
struct Cli {
    /// Directory holding sales_pipeline.csv, sales_teams.csv and products.csv
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the dashboard over HTTP
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the aggregated dashboard for one selection as JSON
    Summary {
        #[arg(long)]
        manager: String,
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "Q1", value_parser = parse_quarter)]
        quarter: Quarter,
        #[arg(long, default_value = "won_counts", value_parser = parse_mode)]
        mode: MetricMode,
        #[arg(long, default_value = "top_to_bottom", value_parser = parse_order)]
        order: BarOrder,
    },
    /// Print selector options (managers, fiscal years, quarters) as JSON
    Options,
}

fn parse_quarter(raw: &str) -> Result<Quarter, String> {
    raw.parse().map_err(|e| format!("{e}"))
}

fn parse_mode(raw: &str) -> Result<MetricMode, String> {
    raw.parse().map_err(|e| format!("{e}"))
}

fn parse_order(raw: &str) -> Result<BarOrder, String> {
    raw.parse().map_err(|e| format!("{e}"))
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut data_config = DataConfig::from_env();
    if let Some(dir) = cli.data_dir {
        data_config.data_dir = dir;
    }
    debug!(?data_config, "configuration resolved");

    let dataset = Arc::new(
        Dataset::load_dir(&data_config.data_dir)
            .with_context(|| format!("loading dataset from {}", data_config.data_dir.display()))?,
    );

    match cli.command.unwrap_or(Commands::Serve {
        port: None,
        bind: None,
    }) {
        Commands::Serve { port, bind } => {
            let mut web_config = WebConfig::from_env();
            if let Some(port) = port {
                web_config.port = port;
            }
            if let Some(bind) = bind {
                web_config.bind = bind;
            }
            let state = AppState::new(dataset, ".")
                .with_drop_earliest_year(data_config.drop_earliest_year);
            salesdash_web::serve(web_config, state).await?;
        }
        Commands::Summary {
            manager,
            year,
            quarter,
            mode,
            order,
        } => {
            let request = AggregationRequest::new(manager, year, quarter)
                .with_metric_mode(mode)
                .with_bar_order(order);
            let dashboard = DashboardService::new(dataset).build(&request);
            println!("{}", serde_json::to_string_pretty(&dashboard)?);
        }
        Commands::Options => {
            let options = dataset.options(data_config.drop_earliest_year);
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
    }

    Ok(())
}
