use crate::model::{
    constants::DECAY_BASE,
    structures::{
        bonus::Bonus, player_rating::PlayerRatingRow, release::ReleaseSnapshot, team_rating::TeamRatingRow,
        tournament_result::TournamentResult
    }
};
use chrono::NaiveDate;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// A bonus `weeks` old, decayed with the default decay base
pub fn generate_bonus(tournament_id: i32, initial_score: i32, weeks: i32) -> Bonus {
    let raw_score = initial_score as f64 * DECAY_BASE.powi(weeks);

    Bonus {
        tournament_id,
        tournament_result_id: Some(tournament_id),
        initial_score,
        weeks_since_tournament: weeks,
        raw_score,
        current_score: raw_score.round_ties_even() as i32
    }
}

/// Up to `max_bonuses` bonuses with random scores and ages.
/// Use a seeded RNG for reproducible results.
pub fn generate_random_bonuses(rng: &mut ChaCha8Rng, max_bonuses: usize) -> Vec<Bonus> {
    let count = rng.random_range(0..=max_bonuses);

    (0..count)
        .map(|i| {
            generate_bonus(
                i as i32 + 1,
                rng.random_range(0..=3000),
                rng.random_range(0..=100)
            )
        })
        .collect()
}

/// A player row whose rating is the sum of its bonuses
pub fn generate_player_row(player_id: i32, bonuses: Vec<Bonus>) -> PlayerRatingRow {
    PlayerRatingRow {
        player_id,
        rating: bonuses.iter().map(|b| b.current_score).sum(),
        place: None,
        rating_change: None,
        place_change: None,
        bonuses
    }
}

pub fn generate_team_row(team_id: i32, rating: f64) -> TeamRatingRow {
    TeamRatingRow {
        team_id,
        rating,
        technical_rating: None,
        place: None,
        rating_change: None,
        place_change: None,
        pending_rating: None,
        trb_contributions: Vec::new()
    }
}

/// A snapshot with Q = 1
pub fn generate_snapshot(date: NaiveDate, teams: Vec<TeamRatingRow>, players: Vec<PlayerRatingRow>) -> ReleaseSnapshot {
    ReleaseSnapshot::new(date, 1.0, None, teams, players)
}

/// A result without a team rating change, counted in the release of 2022-01-20
pub fn generate_tournament_result(
    tournament_id: i32,
    team_id: i32,
    initial_score: i32,
    player_ids: Vec<i32>,
    base_team_members: Vec<i32>
) -> TournamentResult {
    TournamentResult {
        tournament_id,
        tournament_result_id: None,
        team_id,
        initial_score,
        rating_change: 0,
        end_date: NaiveDate::from_ymd_opt(2022, 1, 16).unwrap(),
        player_ids,
        base_team_members
    }
}
