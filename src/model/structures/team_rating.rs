use serde::{Deserialize, Serialize};

/// A team's row in a release.
///
/// Ratings are kept unrounded in memory; the persistence layer stores them
/// rounded to integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRatingRow {
    pub team_id: i32,
    pub rating: f64,
    /// `None` when nobody is assigned to the team's base roster
    pub technical_rating: Option<f64>,
    pub place: Option<i32>,
    /// `None` for teams admitted in this release
    pub rating_change: Option<f64>,
    /// `None` for teams admitted in this release
    pub place_change: Option<i32>,
    /// Starting rating for the next release, set only when the rating was
    /// recalculated because the base roster changed
    pub pending_rating: Option<f64>,
    /// Base-roster players counted in the technical rating, strongest first.
    /// Not read back when a committed release is loaded.
    #[serde(default)]
    pub trb_contributions: Vec<TrbContribution>
}

/// A player's share of the team's technical rating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrbContribution {
    pub player_id: i32,
    /// 1 for the highest-rated player
    pub order: i32,
    /// Weighted rating times Q
    pub contribution: f64
}

impl TeamRatingRow {
    /// Rating the next release starts from
    pub fn starting_rating(&self) -> f64 {
        self.pending_rating.unwrap_or(self.rating)
    }
}

/// Initial team rating used when no release exists yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSeed {
    pub team_id: i32,
    pub rating: f64,
    #[serde(default)]
    pub place: Option<i32>,
    #[serde(default)]
    pub technical_rating: Option<f64>
}
