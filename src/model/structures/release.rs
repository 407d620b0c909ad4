use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{
    constants::DEFAULT_Q,
    structures::{
        legacy_bonus::LegacyBonuses,
        player_rating::PlayerRatingRow,
        q_calibration::QCalibration,
        team_rating::{TeamRatingRow, TeamSeed},
        tournament_result::TournamentResult
    }
};

/// Everything a release publishes. Snapshots are never modified once built;
/// the next release is computed into a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSnapshot {
    pub date: NaiveDate,
    pub q: f64,
    /// Bonus-point scale constant for the tournament-scoring subsystem
    pub bonus_scale: Option<f64>,
    pub hash: i32,
    pub teams: Vec<TeamRatingRow>,
    pub players: Vec<PlayerRatingRow>,
    /// Tournaments counted in this release, ascending
    #[serde(default)]
    pub tournament_ids: Vec<i32>
}

impl ReleaseSnapshot {
    pub fn new(
        date: NaiveDate,
        q: f64,
        bonus_scale: Option<f64>,
        teams: Vec<TeamRatingRow>,
        players: Vec<PlayerRatingRow>
    ) -> ReleaseSnapshot {
        let hash = content_hash(&teams, &players);

        ReleaseSnapshot {
            date,
            q,
            bonus_scale,
            hash,
            teams,
            players,
            tournament_ids: Vec::new()
        }
    }

    /// Records the tournaments counted in this release
    pub fn with_tournaments<I>(mut self, tournament_ids: I) -> ReleaseSnapshot
    where
        I: IntoIterator<Item = i32>
    {
        self.tournament_ids = tournament_ids.into_iter().sorted_unstable().dedup().collect();
        self
    }

    /// A release holding only seeded team ratings, used when no release exists yet.
    pub fn from_seed(date: NaiveDate, seeds: &[TeamSeed]) -> ReleaseSnapshot {
        let teams = seeds
            .iter()
            .map(|seed| TeamRatingRow {
                team_id: seed.team_id,
                rating: seed.rating,
                technical_rating: seed.technical_rating,
                place: seed.place,
                rating_change: None,
                place_change: None,
                pending_rating: None,
                trb_contributions: Vec::new()
            })
            .collect();

        ReleaseSnapshot::new(date, DEFAULT_Q, None, teams, Vec::new())
    }

    pub fn team(&self, team_id: i32) -> Option<&TeamRatingRow> {
        self.teams.iter().find(|t| t.team_id == team_id)
    }

    pub fn player(&self, player_id: i32) -> Option<&PlayerRatingRow> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn player_index(&self) -> HashMap<i32, &PlayerRatingRow> {
        self.players.iter().map(|p| (p.player_id, p)).collect()
    }
}

/// Checksum of the persisted (rounded) ratings of a release.
///
/// SHA-256 over the rows sorted by id, each id and rating little-endian,
/// every list prefixed with its length. The first four digest bytes are the hash.
fn content_hash(teams: &[TeamRatingRow], players: &[PlayerRatingRow]) -> i32 {
    let team_values = teams
        .iter()
        .map(|t| (t.team_id, t.rating.round_ties_even() as i64))
        .sorted_unstable()
        .collect_vec();
    let player_values = players.iter().map(|p| (p.player_id, p.rating)).sorted_unstable().collect_vec();

    let mut hasher = Sha256::new();

    hasher.update((team_values.len() as u32).to_le_bytes());
    for (team_id, rating) in &team_values {
        hasher.update(team_id.to_le_bytes());
        hasher.update(rating.to_le_bytes());
    }

    hasher.update((player_values.len() as u32).to_le_bytes());
    for (player_id, rating) in &player_values {
        hasher.update(player_id.to_le_bytes());
        hasher.update(rating.to_le_bytes());
    }

    let digest = hasher.finalize();
    i32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Data the release step consumes besides the previous snapshot
#[derive(Debug, Clone, Default)]
pub struct ReleaseInputs {
    pub release_date: NaiveDate,
    /// Date the base rosters are resolved at. May differ from the release date.
    pub roster_date: NaiveDate,
    /// player id → base team id
    pub base_roster: HashMap<i32, i32>,
    pub tournament_results: Vec<TournamentResult>,
    /// Teams whose base roster changed since the previous release
    pub changed_teams: HashSet<i32>,
    /// Only needed for the release following the last old-format release
    pub legacy_bonuses: Option<LegacyBonuses>
}

/// Result of one release step
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    pub snapshot: ReleaseSnapshot,
    pub q_calibration: QCalibration,
    /// Teams whose rating was raised to the heredity floor
    pub heredity_changes: Vec<(i32, f64)>,
    /// Teams that received a starting rating in this release
    pub admitted_teams: Vec<i32>
}
