use std::collections::{hash_map::Entry, HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::model::{
    constants::DAYS_IN_WEEK,
    structures::{bonus::Bonus, legacy_bonus::LegacyBonuses, release::ReleaseSnapshot}
};

/// Produces every player's bonus list as of the previous release.
pub trait BonusLoader {
    fn load(&self, previous: &ReleaseSnapshot) -> HashMap<i32, Vec<Bonus>>;

    fn name(&self) -> &'static str;
}

/// Reads the bonuses stored with the previous release.
pub struct SnapshotBonusLoader;

impl BonusLoader for SnapshotBonusLoader {
    fn load(&self, previous: &ReleaseSnapshot) -> HashMap<i32, Vec<Bonus>> {
        previous
            .players
            .iter()
            .map(|p| (p.player_id, p.bonuses.clone()))
            .collect()
    }

    fn name(&self) -> &'static str {
        "snapshot"
    }
}

/// Reads the frozen old-format table. Used exactly once: for the release that
/// follows the last old-format release.
///
/// Tournament age is measured against the roster reference date rather than
/// the date of the release being loaded.
pub struct LegacyBonusLoader<'a> {
    legacy: &'a LegacyBonuses,
    roster_date: NaiveDate
}

impl<'a> LegacyBonusLoader<'a> {
    pub fn new(legacy: &'a LegacyBonuses, roster_date: NaiveDate) -> Self {
        LegacyBonusLoader { legacy, roster_date }
    }
}

impl BonusLoader for LegacyBonusLoader<'_> {
    fn load(&self, previous: &ReleaseSnapshot) -> HashMap<i32, Vec<Bonus>> {
        let known_players: HashSet<i32> = previous.players.iter().map(|p| p.player_id).collect();
        let mut weeks_by_tournament: HashMap<i32, i32> = HashMap::new();
        let mut bonuses: HashMap<i32, Vec<Bonus>> = HashMap::new();
        let mut skipped = 0;

        for row in &self.legacy.rows {
            if !known_players.contains(&row.player_id) {
                continue;
            }

            let weeks = match weeks_by_tournament.entry(row.tournament_id) {
                Entry::Occupied(e) => *e.get(),
                Entry::Vacant(e) => match self.legacy.tournament_end_dates.get(&row.tournament_id) {
                    Some(end_date) => *e.insert(age_in_weeks(*end_date, self.roster_date)),
                    None => {
                        skipped += 1;
                        continue;
                    }
                }
            };

            bonuses.entry(row.player_id).or_default().push(Bonus {
                tournament_id: row.tournament_id,
                tournament_result_id: None,
                initial_score: row.rating_original.unwrap_or(0),
                weeks_since_tournament: weeks,
                raw_score: row.rating_now as f64,
                current_score: row.rating_now
            });
        }

        if skipped > 0 {
            warn!("Skipped {} legacy bonuses of tournaments without an end date", skipped);
        }

        debug!(
            "Loaded legacy bonuses for {} players from {} tournaments",
            bonuses.len(),
            weeks_by_tournament.len()
        );

        bonuses
    }

    fn name(&self) -> &'static str {
        "legacy"
    }
}

/// Whole weeks between the end of a tournament and `date`
pub fn age_in_weeks(end_date: NaiveDate, date: NaiveDate) -> i32 {
    (date - end_date).num_days().div_euclid(DAYS_IN_WEEK) as i32
}
