use std::{fs, path::Path};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    model::{constants::*, technical_rating::TopWeighting}
};

/// Tunable parameters of the rating engine.
///
/// Every field has a default, so a constants file only needs to list
/// the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConstants {
    /// Weekly multiplier applied to every bonus
    pub decay_base: f64,
    /// Bonuses counted towards a player's rating
    pub best_tournaments: usize,
    /// Players counted in a technical rating
    pub technical_rating_slots: usize,
    /// Teams used to calibrate Q
    pub q_reference_teams: usize,
    /// Rated base-roster players a team needs to take part in Q calibration
    pub q_min_players: usize,
    /// Teams used to derive the bonus-point scale
    pub bonus_point_teams: usize,
    pub max_bonus: f64,
    /// Applied to technical ratings of new teams and teams with changed rosters
    pub lowering_coefficient: f64,
    pub last_old_release: NaiveDate,
    pub release_interval_days: i64
}

impl Default for RatingConstants {
    fn default() -> Self {
        default_constants()
    }
}

pub fn default_constants() -> RatingConstants {
    RatingConstants {
        decay_base: DECAY_BASE,
        best_tournaments: BEST_TOURNAMENTS_FOR_PLAYER_RATING,
        technical_rating_slots: TECHNICAL_RATING_SLOTS,
        q_reference_teams: TOP_TEAMS_FOR_Q_CALCULATION,
        q_min_players: PLAYERS_IN_TEAM_FOR_Q_CALCULATION,
        bonus_point_teams: TEAMS_COUNT_FOR_BONUS_POINTS,
        max_bonus: MAX_BONUS,
        lowering_coefficient: NEW_TEAMS_LOWERING_COEFFICIENT,
        last_old_release: LAST_OLD_RELEASE,
        release_interval_days: RELEASE_INTERVAL_DAYS
    }
}

impl RatingConstants {
    /// Reads constants from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let constants: RatingConstants = serde_json::from_str(&contents)?;
        constants.validate()?;

        Ok(constants)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.decay_base > 0.0 && self.decay_base < 1.0) {
            return Err(ConfigError::InvalidDecayBase(self.decay_base));
        }

        if !(self.lowering_coefficient > 0.0 && self.lowering_coefficient <= 1.0) {
            return Err(ConfigError::InvalidCoefficient {
                name: "lowering_coefficient",
                value: self.lowering_coefficient
            });
        }

        if !(self.max_bonus > 0.0) {
            return Err(ConfigError::InvalidMaxBonus(self.max_bonus));
        }

        if self.release_interval_days <= 0 {
            return Err(ConfigError::InvalidReleaseInterval(self.release_interval_days));
        }

        for (name, value) in [
            ("best_tournaments", self.best_tournaments),
            ("q_reference_teams", self.q_reference_teams),
            ("q_min_players", self.q_min_players)
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidSlotCount { name, value });
            }
        }

        self.technical_weighting()?;
        self.bonus_point_weighting()?;

        Ok(())
    }

    pub fn technical_weighting(&self) -> Result<TopWeighting, ConfigError> {
        TopWeighting::new("technical_rating_slots", self.technical_rating_slots)
    }

    pub fn bonus_point_weighting(&self) -> Result<TopWeighting, ConfigError> {
        TopWeighting::new("bonus_point_teams", self.bonus_point_teams)
    }
}
