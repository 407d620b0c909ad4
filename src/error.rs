use chrono::NaiveDate;
use thiserror::Error;

use crate::messaging::PublisherError;

/// Invalid rating configuration. Raised before any release is computed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive slot count, got {value}")]
    InvalidSlotCount { name: &'static str, value: usize },

    #[error("decay_base must lie strictly between 0 and 1, got {0}")]
    InvalidDecayBase(f64),

    #[error("{name} must lie in (0, 1], got {value}")]
    InvalidCoefficient { name: &'static str, value: f64 },

    #[error("max_bonus must be positive, got {0}")]
    InvalidMaxBonus(f64),

    #[error("release_interval_days must be positive, got {0}")]
    InvalidReleaseInterval(i64),

    #[error("Failed to read rating constants: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse rating constants: {0}")]
    Parse(#[from] serde_json::Error)
}

/// Failure of a whole release computation. Nothing of the release is persisted.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("No committed release precedes {0}")]
    MissingPreviousRelease(NaiveDate),

    #[error("Release {requested} cannot follow release {previous}")]
    OutOfOrder { previous: NaiveDate, requested: NaiveDate },

    #[error("Release {requested} does not follow release {previous}, expected {expected}")]
    SequenceGap {
        previous: NaiveDate,
        requested: NaiveDate,
        expected: NaiveDate
    },

    #[error("Tournament {tournament_id} ended on {end_date}, outside the release window [{since}, {until})")]
    ResultOutsideWindow {
        tournament_id: i32,
        end_date: NaiveDate,
        since: NaiveDate,
        until: NaiveDate
    },

    #[error("Roster reference date {roster_date} is earlier than the previous release {previous}")]
    RosterDateBeforePrevious { roster_date: NaiveDate, previous: NaiveDate },

    #[error("Release {0} follows the last old-format release but no legacy bonuses were supplied")]
    MissingLegacyData(NaiveDate),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Failed to publish release: {0}")]
    Publish(#[from] PublisherError)
}
