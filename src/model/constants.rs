use chrono::NaiveDate;

// Model constants
pub const DECAY_BASE: f64 = 0.987;
pub const BEST_TOURNAMENTS_FOR_PLAYER_RATING: usize = 7;
pub const TECHNICAL_RATING_SLOTS: usize = 6;
pub const TOP_TEAMS_FOR_Q_CALCULATION: usize = 100;
pub const PLAYERS_IN_TEAM_FOR_Q_CALCULATION: usize = 6;
pub const TEAMS_COUNT_FOR_BONUS_POINTS: usize = 15;
pub const MAX_BONUS: f64 = 2300.0;
pub const NEW_TEAMS_LOWERING_COEFFICIENT: f64 = 0.8;
pub const RELEASE_INTERVAL_DAYS: i64 = 7;
pub const DEFAULT_Q: f64 = 1.0;
pub const DAYS_IN_WEEK: i64 = 7;

/// The last release computed in the old per-tournament format.
/// The release right after it reads bonuses from the frozen legacy table.
pub const LAST_OLD_RELEASE: NaiveDate = match NaiveDate::from_ymd_opt(2021, 9, 9) {
    Some(date) => date,
    None => panic!("invalid legacy release date")
};

// Rows per bulk INSERT statement
pub const INSERT_BATCH_SIZE: usize = 5000;
