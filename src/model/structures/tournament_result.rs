use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A team's scored result at a tournament counted in the release.
/// Scores are computed by the tournament-scoring subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentResult {
    pub tournament_id: i32,
    pub tournament_result_id: Option<i32>,
    pub team_id: i32,
    /// Bonus every player of the played roster receives
    pub initial_score: i32,
    /// Change of the team rating earned at the tournament
    pub rating_change: i32,
    pub end_date: NaiveDate,
    /// Players who played for the team
    pub player_ids: Vec<i32>,
    /// Declared base roster, used to seed teams without a rating
    pub base_team_members: Vec<i32>
}
