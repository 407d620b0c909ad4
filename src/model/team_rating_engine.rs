use std::collections::HashSet;

use indexmap::IndexMap;
use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::{
    constants::RatingConstants,
    error::ConfigError,
    model::{
        player_rating_engine::PlayerRatingEngine,
        ranking::{competition_places, place_change},
        structures::{
            q_calibration::QCalibration,
            release::ReleaseSnapshot,
            team_rating::{TeamRatingRow, TrbContribution},
            tournament_result::TournamentResult
        },
        technical_rating::{bonus_scale, technical_rating, TopWeighting}
    }
};

#[derive(Debug, Clone)]
struct TeamState {
    rating: f64,
    technical_rating: Option<f64>,
    place: Option<i32>,
    /// Published rating of the previous release, `None` for new teams
    prev_rating: Option<f64>,
    prev_place: Option<i32>,
    trb_contributions: Vec<TrbContribution>
}

pub struct TeamRatingEngine {
    teams: IndexMap<i32, TeamState>,
    q: f64,
    q_reference_teams: usize,
    q_min_players: usize,
    lowering_coefficient: f64,
    max_bonus: f64,
    bonus_point_weighting: TopWeighting
}

impl TeamRatingEngine {
    /// Starts from the previous release. Teams whose rating was recalculated
    /// for the next release start from that pending rating.
    pub fn from_snapshot(previous: &ReleaseSnapshot, constants: &RatingConstants) -> Result<Self, ConfigError> {
        let teams = previous
            .teams
            .iter()
            .map(|t| {
                (
                    t.team_id,
                    TeamState {
                        rating: t.starting_rating(),
                        technical_rating: t.technical_rating,
                        place: t.place,
                        prev_rating: Some(t.rating),
                        prev_place: t.place,
                        trb_contributions: Vec::new()
                    }
                )
            })
            .collect();

        Self::with_teams(teams, previous.q, constants)
    }

    fn with_teams(teams: IndexMap<i32, TeamState>, q: f64, constants: &RatingConstants) -> Result<Self, ConfigError> {
        Ok(TeamRatingEngine {
            teams,
            q,
            q_reference_teams: constants.q_reference_teams,
            q_min_players: constants.q_min_players,
            lowering_coefficient: constants.lowering_coefficient,
            max_bonus: constants.max_bonus,
            bonus_point_weighting: constants.bonus_point_weighting()?
        })
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn contains(&self, team_id: i32) -> bool {
        self.teams.contains_key(&team_id)
    }

    /// Current rating of a team, 0 when unknown
    pub fn get_team_rating(&self, team_id: i32) -> f64 {
        self.teams.get(&team_id).map_or(0.0, |t| t.rating)
    }

    /// Technical rating by base roster, 0 when unknown
    pub fn get_trb(&self, team_id: i32) -> f64 {
        self.teams
            .get(&team_id)
            .and_then(|t| t.technical_rating)
            .unwrap_or(0.0)
    }

    pub fn place(&self, team_id: i32) -> Option<i32> {
        self.teams.get(&team_id).and_then(|t| t.place)
    }

    /// Q is the mean ratio of rating to raw technical rating (Q = 1) over the
    /// strongest teams that have enough rated players on their base roster.
    ///
    /// When no team qualifies the current Q is kept.
    pub fn calibrate_q(&mut self, players: &PlayerRatingEngine) -> QCalibration {
        let base_teams = players.base_team_ratings();

        let ratios = self
            .teams
            .iter()
            .sorted_by(|(_, a), (_, b)| b.rating.total_cmp(&a.rating))
            .take(self.q_reference_teams)
            .filter_map(|(team_id, team)| {
                let ratings = base_teams.get(team_id)?;
                if ratings.len() < self.q_min_players {
                    return None;
                }

                let raw = technical_rating(players.weighting(), ratings.iter().copied(), None);
                if raw > 0.0 {
                    Some(team.rating / raw)
                } else {
                    None
                }
            })
            .collect_vec();

        if ratios.is_empty() {
            warn!("No team qualifies for Q calibration, keeping Q = {}", self.q);
            return QCalibration::Stale { q: self.q };
        }

        self.q = ratios.iter().sum::<f64>() / ratios.len() as f64;
        info!("Calibrated Q = {:.5} from {} teams", self.q, ratios.len());

        QCalibration::Calibrated {
            q: self.q,
            teams: ratios.len()
        }
    }

    /// Bonus-point scale constant for the tournament-scoring subsystem
    pub fn calc_bonus_scale(&self) -> Option<f64> {
        let scale = bonus_scale(
            &self.bonus_point_weighting,
            self.teams.values().map(|t| t.rating),
            self.max_bonus
        );

        if scale.is_none() {
            warn!("No positive team ratings, bonus-point scale is undefined");
        }

        scale
    }

    /// Recomputes technical ratings of all teams from their base rosters with the current Q.
    /// Teams without assigned players get 0.
    pub fn calc_trb(&mut self, players: &PlayerRatingEngine) {
        let all_teams = players.calc_tech_rating_all_teams(Some(self.q));
        let mut contributions = players.calc_trb_contributions(Some(self.q));

        for (team_id, team) in self.teams.iter_mut() {
            team.technical_rating = Some(all_teams.get(team_id).copied().unwrap_or(0.0));
            team.trb_contributions = contributions.remove(team_id).unwrap_or_default();
        }
    }

    /// Raises the rating of every changed team to the technical rating of its
    /// current roster times the lowering coefficient. Ratings never go down.
    ///
    /// Returns the teams whose rating actually changed, with the new rating.
    pub fn update_ratings_for_changed_teams(&mut self, changed_teams: &HashSet<i32>) -> Vec<(i32, f64)> {
        let mut changes = Vec::new();

        for (team_id, team) in self.teams.iter_mut() {
            if !changed_teams.contains(team_id) {
                continue;
            }

            let floor = team.technical_rating.unwrap_or(0.0) * self.lowering_coefficient;
            if floor > team.rating {
                team.rating = floor;
                changes.push((*team_id, floor));
            }
        }

        debug!(
            "{} of {} teams with changed rosters raised to their floor",
            changes.len(),
            changed_teams.len()
        );

        changes
    }

    /// Gives teams without a rating a starting rating: the technical rating of
    /// their declared base roster (with the current Q) times the lowering coefficient.
    ///
    /// Returns the ids of the admitted teams.
    pub fn add_new_teams(&mut self, results: &[TournamentResult], players: &PlayerRatingEngine) -> Vec<i32> {
        let mut admitted = Vec::new();

        for result in results {
            if self.teams.contains_key(&result.team_id) {
                continue;
            }

            let trb = players.calc_rt(&result.base_team_members, Some(self.q));

            self.teams.insert(
                result.team_id,
                TeamState {
                    rating: trb * self.lowering_coefficient,
                    technical_rating: Some(trb),
                    place: None,
                    prev_rating: None,
                    prev_place: None,
                    trb_contributions: Vec::new()
                }
            );
            admitted.push(result.team_id);
        }

        if !admitted.is_empty() {
            info!("Admitted {} new teams", admitted.len());
        }

        admitted
    }

    /// Applies the rating changes earned at the counted tournaments
    pub fn apply_tournament_results(&mut self, results: &[TournamentResult]) {
        for result in results {
            match self.teams.get_mut(&result.team_id) {
                Some(team) => team.rating += result.rating_change as f64,
                None => warn!(
                    "Team {} has a result at tournament {} but no rating",
                    result.team_id, result.tournament_id
                )
            }
        }
    }

    pub fn update_places(&mut self) {
        let ratings: Vec<f64> = self.teams.values().map(|t| t.rating).collect();
        let places = competition_places(&ratings);

        for (team, place) in self.teams.values_mut().zip(places) {
            team.place = Some(place);
        }
    }

    pub fn rows(&self) -> Vec<TeamRatingRow> {
        self.teams
            .iter()
            .map(|(team_id, team)| TeamRatingRow {
                team_id: *team_id,
                rating: team.rating,
                technical_rating: team.technical_rating,
                place: team.place,
                rating_change: team.prev_rating.map(|p| team.rating - p),
                place_change: place_change(team.prev_place, team.place),
                pending_rating: None,
                trb_contributions: team.trb_contributions.clone()
            })
            .collect()
    }
}
