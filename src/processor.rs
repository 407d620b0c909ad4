use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path
};

use chrono::{Duration, NaiveDate};
use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    database::db::DbClient,
    error::{ConfigError, ReleaseError},
    messaging::{RabbitMqPublisher, ReleaseCalculatedMessage},
    model::{
        release_calculator::ReleaseCalculator,
        structures::{
            release::{ReleaseInputs, ReleaseOutcome, ReleaseSnapshot},
            team_rating::TeamSeed,
            tournament_result::TournamentResult
        }
    },
    utils::progress_utils::progress_bar
};

/// Drives the release calculation against the database: one release at a
/// time, each loaded from the committed release before it.
pub struct ReleaseProcessor {
    db: DbClient,
    calculator: ReleaseCalculator,
    publisher: Option<RabbitMqPublisher>,
    seed: Option<Vec<TeamSeed>>
}

impl ReleaseProcessor {
    pub fn new(
        db: DbClient,
        calculator: ReleaseCalculator,
        publisher: Option<RabbitMqPublisher>,
        seed: Option<Vec<TeamSeed>>
    ) -> Self {
        ReleaseProcessor {
            db,
            calculator,
            publisher,
            seed
        }
    }

    /// Calculates and commits every release from `first` to `last`.
    /// Stops at the first failing release; the releases before it stay committed.
    pub async fn calc_all_releases(&self, first: NaiveDate, last: NaiveDate) -> Result<usize, ReleaseError> {
        let dates = release_dates(first, last, self.calculator.constants().release_interval_days);

        if dates.is_empty() {
            warn!("No releases between {} and {}", first, last);
            return Ok(0);
        }

        info!("Calculating {} releases from {} to {}", dates.len(), first, last);
        let p_bar = progress_bar(dates.len() as u64, "Calculating releases".to_string());

        for date in &dates {
            p_bar.set_message(format!("Calculating release {}", date));
            self.calc_release(*date).await?;
            p_bar.inc(1);
        }

        p_bar.finish_with_message("Releases calculated");
        Ok(dates.len())
    }

    pub async fn calc_release(&self, release_date: NaiveDate) -> Result<ReleaseOutcome, ReleaseError> {
        let constants = self.calculator.constants();
        let previous = self.starting_release(release_date).await?;

        let roster_date = release_date;
        let base_roster = self.db.get_base_roster(roster_date).await?;

        let mut tournament_results = self.db.get_tournament_results(previous.date, release_date).await?;
        attach_base_members(&mut tournament_results, &base_roster);

        let changed_teams = self.db.get_changed_teams(previous.date, release_date).await?;

        let legacy_bonuses = if previous.date == constants.last_old_release {
            Some(self.db.get_legacy_bonuses().await?)
        } else {
            None
        };

        let inputs = ReleaseInputs {
            release_date,
            roster_date,
            base_roster,
            tournament_results,
            changed_teams,
            legacy_bonuses
        };

        let outcome = self.calculator.calculate(&previous, &inputs)?;
        self.db.save_release(&outcome.snapshot).await?;

        if let Some(publisher) = &self.publisher {
            publisher
                .publish_release_calculated(ReleaseCalculatedMessage::from_outcome(&outcome))
                .await?;
        }

        info!(
            "Release {} done: Q = {:.5}, {} teams, {} players",
            release_date,
            outcome.snapshot.q,
            outcome.snapshot.teams.len(),
            outcome.snapshot.players.len()
        );

        Ok(outcome)
    }

    /// Closes the RabbitMQ connection, if any
    pub async fn close(self) -> Result<(), ReleaseError> {
        if let Some(mut publisher) = self.publisher {
            publisher.close().await?;
        }

        Ok(())
    }

    /// The committed release preceding `release_date`, or the seed when the
    /// database holds none.
    async fn starting_release(&self, release_date: NaiveDate) -> Result<ReleaseSnapshot, ReleaseError> {
        let constants = self.calculator.constants();

        match self.db.get_previous_release(release_date, constants.decay_base).await? {
            Some(previous) => Ok(previous),
            None => match &self.seed {
                Some(seeds) => {
                    info!("No release precedes {}, starting from {} seeded teams", release_date, seeds.len());
                    Ok(seed_release(release_date, seeds, constants.release_interval_days))
                }
                None => Err(ReleaseError::MissingPreviousRelease(release_date))
            }
        }
    }
}

/// Release dates from `first` to `last` inclusive, `interval_days` apart
pub fn release_dates(first: NaiveDate, last: NaiveDate, interval_days: i64) -> Vec<NaiveDate> {
    if interval_days <= 0 {
        return Vec::new();
    }

    first
        .iter_days()
        .step_by(interval_days as usize)
        .take_while(|date| *date <= last)
        .collect_vec()
}

/// Fills every result's declared base members from the resolved base roster.
pub fn attach_base_members(results: &mut [TournamentResult], base_roster: &HashMap<i32, i32>) {
    let team_ids: HashSet<i32> = results.iter().map(|r| r.team_id).collect();

    let mut members: HashMap<i32, Vec<i32>> = HashMap::new();
    for (player_id, team_id) in base_roster {
        if team_ids.contains(team_id) {
            members.entry(*team_id).or_default().push(*player_id);
        }
    }

    for result in results.iter_mut() {
        let mut team_members = members.get(&result.team_id).cloned().unwrap_or_default();
        team_members.sort_unstable();

        result.base_team_members = team_members;
    }
}

/// A release of seeded teams dated one interval before `release_date`
pub fn seed_release(release_date: NaiveDate, seeds: &[TeamSeed], interval_days: i64) -> ReleaseSnapshot {
    ReleaseSnapshot::from_seed(release_date - Duration::days(interval_days), seeds)
}

/// Reads a JSON list of team seeds
pub fn load_seed(path: &Path) -> Result<Vec<TeamSeed>, ConfigError> {
    let contents = fs::read_to_string(path)?;

    Ok(serde_json::from_str(&contents)?)
}
