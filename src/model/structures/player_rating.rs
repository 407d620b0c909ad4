use serde::{Deserialize, Serialize};

use crate::model::structures::bonus::Bonus;

/// A player's row in a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRatingRow {
    pub player_id: i32,
    pub rating: i32,
    /// Updated once the whole release is ranked
    pub place: Option<i32>,
    /// `None` when the player had no row in the previous release
    pub rating_change: Option<i32>,
    /// Positive when the player moved up
    pub place_change: Option<i32>,
    pub bonuses: Vec<Bonus>
}
