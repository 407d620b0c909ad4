use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    constants::RatingConstants,
    error::ConfigError,
    model::{
        bonus_loader::BonusLoader,
        constants::DEFAULT_Q,
        ranking::{competition_places, place_change},
        structures::{
            bonus::Bonus, player_rating::PlayerRatingRow, release::ReleaseSnapshot, team_rating::TrbContribution,
            tournament_result::TournamentResult
        },
        technical_rating::{technical_rating, TopWeighting}
    }
};

#[derive(Debug, Clone)]
struct PlayerState {
    rating: i32,
    place: Option<i32>,
    base_team_id: Option<i32>,
    bonuses: Vec<Bonus>
}

/// Player ratings of the release being computed.
///
/// A release goes through three phases in this order:
/// 1. load the bonuses of the previous release ([`PlayerRatingEngine::load`])
/// 2. age every bonus by one week ([`PlayerRatingEngine::reduce_rating`])
/// 3. keep the best bonuses and sum them up ([`PlayerRatingEngine::recalc_rating`])
///
/// Bonuses of tournaments counted in this release are added between 2 and 3.
pub struct PlayerRatingEngine {
    players: IndexMap<i32, PlayerState>,
    decay_base: f64,
    best_tournaments: usize,
    weighting: TopWeighting
}

impl PlayerRatingEngine {
    /// Builds the engine from the previous release. `base_roster` maps player ids
    /// to base teams as of the roster reference date.
    pub fn load(
        previous: &ReleaseSnapshot,
        loader: &dyn BonusLoader,
        base_roster: &HashMap<i32, i32>,
        constants: &RatingConstants
    ) -> Result<Self, ConfigError> {
        let mut bonuses = loader.load(previous);

        let players: IndexMap<i32, PlayerState> = previous
            .players
            .iter()
            .map(|p| {
                (
                    p.player_id,
                    PlayerState {
                        rating: p.rating,
                        place: p.place,
                        base_team_id: base_roster.get(&p.player_id).copied(),
                        bonuses: bonuses.remove(&p.player_id).unwrap_or_default()
                    }
                )
            })
            .collect();

        debug!(
            "Loaded {} players with the {} bonus loader",
            players.len(),
            loader.name()
        );

        Ok(PlayerRatingEngine {
            players,
            decay_base: constants.decay_base,
            best_tournaments: constants.best_tournaments,
            weighting: constants.technical_weighting()?
        })
    }

    /// Ages every bonus by one week.
    pub fn reduce_rating(&mut self) {
        let decay_base = self.decay_base;

        self.players.par_values_mut().for_each(|player| {
            player.bonuses = player.bonuses.iter().map(|b| b.decayed(decay_base)).collect();
        });
    }

    /// Gives every player of a played roster a fresh bonus for the tournament.
    /// Players without a rating row are added with rating 0.
    pub fn add_tournament_bonuses(&mut self, results: &[TournamentResult], base_roster: &HashMap<i32, i32>) {
        let mut counted: HashSet<(i32, i32)> = HashSet::new();
        let mut new_players = 0;

        for result in results {
            for player_id in &result.player_ids {
                if !counted.insert((*player_id, result.tournament_id)) {
                    warn!(
                        "Player {} has more than one result at tournament {}, keeping the first",
                        player_id, result.tournament_id
                    );
                    continue;
                }

                let player = self.players.entry(*player_id).or_insert_with(|| {
                    new_players += 1;
                    PlayerState {
                        rating: 0,
                        place: None,
                        base_team_id: base_roster.get(player_id).copied(),
                        bonuses: Vec::new()
                    }
                });

                player.bonuses.push(Bonus::new(
                    result.tournament_id,
                    result.tournament_result_id,
                    result.initial_score
                ));
            }
        }

        debug!("Added {} bonuses, {} new players", counted.len(), new_players);
    }

    /// Keeps the best `best_tournaments` bonuses of every player, sums them
    /// into the rating and updates places. Dropped bonuses are gone for good.
    pub fn recalc_rating(&mut self) {
        let best_tournaments = self.best_tournaments;

        self.players.par_values_mut().for_each(|player| {
            // Stable: equal scores keep their original order
            player.bonuses.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score));
            player.bonuses.truncate(best_tournaments);
            player.rating = player.bonuses.iter().map(|b| b.current_score).sum();
        });

        self.update_places();
    }

    pub fn update_places(&mut self) {
        let ratings: Vec<i32> = self.players.values().map(|p| p.rating).collect();
        let places = competition_places(&ratings);

        for (player, place) in self.players.values_mut().zip(places) {
            player.place = Some(place);
        }
    }

    /// Current rating of a player, 0 when unknown
    pub fn rating(&self, player_id: i32) -> i32 {
        self.players.get(&player_id).map_or(0, |p| p.rating)
    }

    pub fn place(&self, player_id: i32) -> Option<i32> {
        self.players.get(&player_id).and_then(|p| p.place)
    }

    pub fn bonuses(&self, player_id: i32) -> Option<&[Bonus]> {
        self.players.get(&player_id).map(|p| p.bonuses.as_slice())
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn weighting(&self) -> &TopWeighting {
        &self.weighting
    }

    /// Technical rating of an arbitrary list of players. Unknown players count as 0.
    pub fn calc_rt(&self, player_ids: &[i32], q: Option<f64>) -> f64 {
        technical_rating(&self.weighting, player_ids.iter().map(|id| self.rating(*id)), q)
    }

    /// `(player id, rating)` of rated players grouped by base team
    fn base_team_members(&self) -> HashMap<i32, Vec<(i32, i32)>> {
        let mut teams: HashMap<i32, Vec<(i32, i32)>> = HashMap::new();

        for (player_id, player) in self.players.iter() {
            if let Some(team_id) = player.base_team_id {
                teams.entry(team_id).or_default().push((*player_id, player.rating));
            }
        }

        teams
    }

    /// Ratings of rated players grouped by base team
    pub fn base_team_ratings(&self) -> HashMap<i32, Vec<i32>> {
        self.base_team_members()
            .into_iter()
            .map(|(team_id, members)| (team_id, members.into_iter().map(|(_, rating)| rating).collect()))
            .collect()
    }

    /// Technical rating of every team with at least one player assigned to its base roster.
    pub fn calc_tech_rating_all_teams(&self, q: Option<f64>) -> HashMap<i32, f64> {
        self.base_team_ratings()
            .into_iter()
            .map(|(team_id, ratings)| (team_id, technical_rating(&self.weighting, ratings, q)))
            .collect()
    }

    /// Every team's technical rating split by the players counted in it
    pub fn calc_trb_contributions(&self, q: Option<f64>) -> HashMap<i32, Vec<TrbContribution>> {
        let q = q.unwrap_or(DEFAULT_Q);

        self.base_team_members()
            .into_iter()
            .map(|(team_id, members)| {
                let contributions = self
                    .weighting
                    .contributions(members.into_iter().map(|(player_id, rating)| (player_id, f64::from(rating))))
                    .into_iter()
                    .enumerate()
                    .map(|(i, (player_id, weighted))| TrbContribution {
                        player_id,
                        order: i as i32 + 1,
                        contribution: q * weighted
                    })
                    .collect();

                (team_id, contributions)
            })
            .collect()
    }

    /// Rows of the new release with changes relative to `previous`
    pub fn rows(&self, previous: &ReleaseSnapshot) -> Vec<PlayerRatingRow> {
        let previous_players = previous.player_index();

        self.players
            .iter()
            .map(|(player_id, player)| {
                let before = previous_players.get(player_id);

                PlayerRatingRow {
                    player_id: *player_id,
                    rating: player.rating,
                    place: player.place,
                    rating_change: before.map(|b| player.rating - b.rating),
                    place_change: place_change(before.and_then(|b| b.place), player.place),
                    bonuses: player.bonuses.clone()
                }
            })
            .collect()
    }
}
