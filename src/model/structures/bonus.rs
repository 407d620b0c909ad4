use serde::{Deserialize, Serialize};

/// A player's decaying contribution from one counted tournament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bonus {
    pub tournament_id: i32,
    /// Absent for bonuses imported from the legacy format
    pub tournament_result_id: Option<i32>,
    /// Fixed when the tournament is counted
    pub initial_score: i32,
    /// 0 in the release the tournament was counted in
    pub weeks_since_tournament: i32,
    /// Unrounded contribution, used to pick the best bonuses
    pub raw_score: f64,
    /// Contribution to the player's rating in this release
    pub current_score: i32
}

impl Bonus {
    /// A bonus for a tournament counted in the current release.
    pub fn new(tournament_id: i32, tournament_result_id: Option<i32>, initial_score: i32) -> Bonus {
        Bonus {
            tournament_id,
            tournament_result_id,
            initial_score,
            weeks_since_tournament: 0,
            raw_score: initial_score as f64,
            current_score: initial_score
        }
    }

    /// A bonus read back from a committed release. The unrounded score is
    /// rebuilt from the initial score and the age.
    pub fn stored(
        tournament_id: i32,
        tournament_result_id: Option<i32>,
        initial_score: i32,
        weeks_since_tournament: i32,
        current_score: i32,
        decay_base: f64
    ) -> Bonus {
        Bonus {
            tournament_id,
            tournament_result_id,
            initial_score,
            weeks_since_tournament,
            raw_score: initial_score as f64 * decay_base.powi(weeks_since_tournament),
            current_score
        }
    }

    /// The same bonus one week older. Halves round to the even neighbour.
    pub fn decayed(&self, decay_base: f64) -> Bonus {
        let weeks_since_tournament = self.weeks_since_tournament + 1;
        let raw_score = self.initial_score as f64 * decay_base.powi(weeks_since_tournament);

        Bonus {
            weeks_since_tournament,
            raw_score,
            current_score: raw_score.round_ties_even() as i32,
            ..self.clone()
        }
    }
}
