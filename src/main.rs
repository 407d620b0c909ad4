use chrono::{Duration, Local};
use clap::Parser;
use release_rating::{
    args::Args,
    constants::{default_constants, RatingConstants},
    database::db::DbClient,
    error::ReleaseError,
    messaging::{RabbitMqConfig, RabbitMqPublisher},
    model::release_calculator::ReleaseCalculator,
    processor::{load_seed, ReleaseProcessor}
};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log_level);

    match run(args).await {
        Ok(count) => {
            info!("Processing complete, {} releases calculated", count);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Release processing failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_level: &str) {
    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

async fn run(args: Args) -> Result<usize, ReleaseError> {
    let constants = match &args.constants {
        Some(path) => {
            info!("Reading rating constants from {}", path.display());
            RatingConstants::from_file(path)?
        }
        None => default_constants()
    };

    let seed = match &args.seed {
        Some(path) => Some(load_seed(path)?),
        None => None
    };

    let first = args
        .first_release
        .unwrap_or(constants.last_old_release + Duration::days(constants.release_interval_days));
    let last = args.last_release.unwrap_or_else(|| Local::now().date_naive());

    let calculator = ReleaseCalculator::new(constants)?;

    let db = match DbClient::connect(&args.connection_string, &args.schema).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            error!("Application cannot start without a valid database connection");
            return Err(e.into());
        }
    };

    let publisher = if args.publish {
        let config = RabbitMqConfig::from_env().unwrap_or_else(|e| {
            warn!("Incomplete RabbitMQ configuration ({}), using defaults", e);
            RabbitMqConfig::default()
        });

        Some(RabbitMqPublisher::connect_from_config(&config).await?)
    } else {
        None
    };

    let processor = ReleaseProcessor::new(db, calculator, publisher, seed);
    let result = processor.calc_all_releases(first, last).await;
    processor.close().await?;

    result
}
