use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use aqi_forecast::config::Config;
use aqi_forecast::pipeline::{self, AppContext};
use aqi_forecast::serve;

#[derive(Parser, Debug)]
#[command(name = "aqi_forecast")]
#[command(about = "Air-quality forecasting pipeline", long_about = None)]
struct Args {
    /// Fetch yesterday's observations and update the history table
    #[arg(long)]
    ingest: bool,

    /// Run the quality gate over the history table
    #[arg(long)]
    check_quality: bool,

    /// Engineer features (incremental unless --rebuild)
    #[arg(long)]
    build_features: bool,

    /// Force a full feature rebuild instead of the incremental update
    #[arg(long)]
    rebuild: bool,

    /// Advance the feature-selection snapshot
    #[arg(long)]
    select_features: bool,

    /// Train, select and persist a model, then forecast the next horizon
    #[arg(long)]
    train: bool,

    /// Run stages 1-5 in order
    #[arg(long)]
    all: bool,

    /// Start the forecast HTTP service
    #[arg(long)]
    serve: bool,

    /// Bind host for --serve
    #[arg(long, env = "AQI_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port for --serve
    #[arg(long, env = "AQI_PORT", default_value = "3000")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aqi_forecast=info".parse()?),
        )
        .init();

    dotenv::dotenv().ok();

    let args = Args::parse();
    let config = Config::from_env()?;
    let ctx = AppContext::from_config(config)?;

    if args.serve {
        let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
        return serve::run(
            &ctx.store,
            &ctx.config.paths.model_name,
            ctx.metrics.clone(),
            addr,
        )
        .await;
    }

    if args.all {
        return pipeline::run_all(&ctx).await;
    }

    let mut ran_any = false;
    if args.ingest {
        pipeline::run_ingestion(&ctx).await?;
        ran_any = true;
    }
    if args.check_quality {
        pipeline::run_quality_gate(&ctx)?;
        ran_any = true;
    }
    if args.build_features {
        pipeline::run_feature_engineering(&ctx, args.rebuild)?;
        ran_any = true;
    }
    if args.select_features {
        pipeline::run_feature_selection(&ctx)?;
        ran_any = true;
    }
    if args.train {
        pipeline::run_training(&ctx).await?;
        ran_any = true;
    }

    if !ran_any {
        info!("No stage selected; try --all, --serve, or a single stage flag");
    }

    Ok(())
}
