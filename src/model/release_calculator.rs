use chrono::Duration;
use tracing::{debug, info, warn};

use crate::{
    constants::RatingConstants,
    error::{ConfigError, ReleaseError},
    model::{
        bonus_loader::{BonusLoader, LegacyBonusLoader, SnapshotBonusLoader},
        player_rating_engine::PlayerRatingEngine,
        structures::release::{ReleaseInputs, ReleaseOutcome, ReleaseSnapshot},
        team_rating_engine::TeamRatingEngine
    }
};

/// Computes a release from the previous one.
///
/// `calculate` never modifies the previous snapshot, so any release can be
/// recomputed from the same inputs.
pub struct ReleaseCalculator {
    constants: RatingConstants
}

impl ReleaseCalculator {
    pub fn new(constants: RatingConstants) -> Result<Self, ConfigError> {
        constants.validate()?;

        Ok(ReleaseCalculator { constants })
    }

    pub fn constants(&self) -> &RatingConstants {
        &self.constants
    }

    /// # Release step
    ///
    /// 1. Players: load the previous bonuses, age them, add bonuses of the
    ///    counted tournaments, keep the best ones and rank.
    /// 2. Teams: calibrate Q on the established teams, admit new teams, apply
    ///    tournament results, recompute technical ratings and rank. These are
    ///    the published team ratings.
    /// 3. Heredity: teams with changed base rosters are raised to their floor.
    ///    The raised rating is what the next release starts from.
    pub fn calculate(&self, previous: &ReleaseSnapshot, inputs: &ReleaseInputs) -> Result<ReleaseOutcome, ReleaseError> {
        if inputs.release_date <= previous.date {
            return Err(ReleaseError::OutOfOrder {
                previous: previous.date,
                requested: inputs.release_date
            });
        }

        let expected = previous.date + Duration::days(self.constants.release_interval_days);
        if inputs.release_date != expected {
            return Err(ReleaseError::SequenceGap {
                previous: previous.date,
                requested: inputs.release_date,
                expected
            });
        }

        if inputs.roster_date < previous.date {
            return Err(ReleaseError::RosterDateBeforePrevious {
                roster_date: inputs.roster_date,
                previous: previous.date
            });
        }

        // Results are counted in the release following the tournament's end
        if let Some(outside) = inputs
            .tournament_results
            .iter()
            .find(|r| r.end_date < previous.date || r.end_date >= inputs.release_date)
        {
            return Err(ReleaseError::ResultOutsideWindow {
                tournament_id: outside.tournament_id,
                end_date: outside.end_date,
                since: previous.date,
                until: inputs.release_date
            });
        }

        info!(
            "Calculating release {} from release {} ({} tournament results)",
            inputs.release_date,
            previous.date,
            inputs.tournament_results.len()
        );

        let loader = self.bonus_loader(previous, inputs)?;

        let mut players = PlayerRatingEngine::load(previous, loader.as_ref(), &inputs.base_roster, &self.constants)?;
        players.reduce_rating();
        players.add_tournament_bonuses(&inputs.tournament_results, &inputs.base_roster);
        players.recalc_rating();

        let mut teams = TeamRatingEngine::from_snapshot(previous, &self.constants)?;
        let q_calibration = teams.calibrate_q(&players);
        let admitted_teams = teams.add_new_teams(&inputs.tournament_results, &players);
        teams.apply_tournament_results(&inputs.tournament_results);
        teams.calc_trb(&players);
        teams.update_places();

        let mut team_rows = teams.rows();
        let bonus_scale = teams.calc_bonus_scale();

        let heredity_changes = teams.update_ratings_for_changed_teams(&inputs.changed_teams);
        for (team_id, rating) in &heredity_changes {
            if let Some(row) = team_rows.iter_mut().find(|r| r.team_id == *team_id) {
                row.pending_rating = Some(*rating);
            }
        }

        if q_calibration.is_stale() {
            warn!("Release {} keeps the previous Q = {}", inputs.release_date, q_calibration.q());
        }

        debug!(
            "Release {}: {} teams, {} players, {} heredity changes",
            inputs.release_date,
            team_rows.len(),
            players.len(),
            heredity_changes.len()
        );

        let snapshot = ReleaseSnapshot::new(
            inputs.release_date,
            teams.q(),
            bonus_scale,
            team_rows,
            players.rows(previous)
        )
        .with_tournaments(inputs.tournament_results.iter().map(|r| r.tournament_id));

        Ok(ReleaseOutcome {
            snapshot,
            q_calibration,
            heredity_changes,
            admitted_teams
        })
    }

    /// The legacy table is read only for the release right after the last
    /// old-format release.
    fn bonus_loader<'a>(
        &self,
        previous: &ReleaseSnapshot,
        inputs: &'a ReleaseInputs
    ) -> Result<Box<dyn BonusLoader + 'a>, ReleaseError> {
        if previous.date != self.constants.last_old_release {
            return Ok(Box::new(SnapshotBonusLoader));
        }

        match &inputs.legacy_bonuses {
            Some(legacy) => {
                info!("Loading bonuses of release {} from the legacy table", previous.date);
                Ok(Box::new(LegacyBonusLoader::new(legacy, inputs.roster_date)))
            }
            None => Err(ReleaseError::MissingLegacyData(inputs.release_date))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::default_constants,
        model::structures::{
            legacy_bonus::{LegacyBonusRow, LegacyBonuses},
            q_calibration::QCalibration,
            team_rating::TeamSeed
        },
        processor::seed_release,
        utils::test_utils::{
            generate_bonus, generate_player_row, generate_snapshot, generate_team_row, generate_tournament_result
        }
    };
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use std::collections::{HashMap, HashSet};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn calculator() -> ReleaseCalculator {
        ReleaseCalculator::new(RatingConstants {
            decay_base: 0.98,
            technical_rating_slots: 2,
            q_min_players: 2,
            lowering_coefficient: 0.5,
            last_old_release: date(2021, 9, 9),
            ..default_constants()
        })
        .unwrap()
    }

    fn inputs(release_date: NaiveDate) -> ReleaseInputs {
        ReleaseInputs {
            release_date,
            roster_date: release_date,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_constants_rejected() {
        let result = ReleaseCalculator::new(RatingConstants {
            technical_rating_slots: 0,
            ..default_constants()
        });

        assert!(result.is_err());
    }

    #[test]
    fn test_release_must_follow_previous() {
        let previous = generate_snapshot(date(2022, 1, 13), vec![], vec![]);

        for requested in [date(2022, 1, 13), date(2022, 1, 6)] {
            let result = calculator().calculate(&previous, &inputs(requested));
            assert!(matches!(result, Err(ReleaseError::OutOfOrder { .. })));
        }
    }

    #[test]
    fn test_release_must_be_next_in_sequence() {
        let previous = generate_snapshot(
            date(2022, 1, 13),
            vec![],
            vec![generate_player_row(1, vec![generate_bonus(1, 1000, 0)])]
        );

        // Four weeks later would age every bonus by a single week
        let result = calculator().calculate(&previous, &inputs(date(2022, 2, 10)));

        match result {
            Err(ReleaseError::SequenceGap {
                previous,
                requested,
                expected
            }) => {
                assert_eq!(previous, date(2022, 1, 13));
                assert_eq!(requested, date(2022, 2, 10));
                assert_eq!(expected, date(2022, 1, 20));
            }
            other => panic!("expected a sequence gap, got {:?}", other.map(|o| o.snapshot.date))
        }

        assert!(calculator().calculate(&previous, &inputs(date(2022, 1, 19))).is_err());
        assert!(calculator().calculate(&previous, &inputs(date(2022, 1, 20))).is_ok());
    }

    #[test]
    fn test_seeded_release_is_next_in_sequence() {
        let seeds = vec![TeamSeed {
            team_id: 1,
            rating: 1000.0,
            place: Some(1),
            technical_rating: None
        }];
        let previous = seed_release(date(2021, 9, 16), &seeds, 7);

        let outcome = calculator().calculate(&previous, &inputs(date(2021, 9, 16)));

        // The seed is dated on the last old-format release, which needs legacy data
        assert!(matches!(outcome, Err(ReleaseError::MissingLegacyData(_))));

        let previous = seed_release(date(2022, 1, 20), &seeds, 7);
        let outcome = calculator().calculate(&previous, &inputs(date(2022, 1, 20))).unwrap();
        assert_abs_diff_eq!(outcome.snapshot.team(1).unwrap().rating, 1000.0);
    }

    #[test]
    fn test_results_outside_window_rejected() {
        let previous = generate_snapshot(date(2022, 1, 13), vec![], vec![]);

        for end_date in [date(2022, 1, 12), date(2022, 1, 20)] {
            let mut release_inputs = inputs(date(2022, 1, 20));
            let mut result = generate_tournament_result(4, 1, 100, vec![1], vec![]);
            result.end_date = end_date;
            release_inputs.tournament_results = vec![result];

            let outcome = calculator().calculate(&previous, &release_inputs);

            assert!(matches!(
                outcome,
                Err(ReleaseError::ResultOutsideWindow { tournament_id: 4, .. })
            ));
        }

        // The previous release date itself is inside the window
        let mut release_inputs = inputs(date(2022, 1, 20));
        let mut result = generate_tournament_result(4, 1, 100, vec![1], vec![]);
        result.end_date = date(2022, 1, 13);
        release_inputs.tournament_results = vec![result];

        assert!(calculator().calculate(&previous, &release_inputs).is_ok());
    }

    #[test]
    fn test_roster_date_before_previous_rejected() {
        let previous = generate_snapshot(date(2022, 1, 13), vec![], vec![]);
        let mut release_inputs = inputs(date(2022, 1, 20));
        release_inputs.roster_date = date(2022, 1, 1);

        let result = calculator().calculate(&previous, &release_inputs);

        assert!(matches!(result, Err(ReleaseError::RosterDateBeforePrevious { .. })));
    }

    #[test]
    fn test_legacy_release_requires_legacy_data() {
        let previous = generate_snapshot(date(2021, 9, 9), vec![], vec![]);

        let result = calculator().calculate(&previous, &inputs(date(2021, 9, 16)));

        assert!(matches!(result, Err(ReleaseError::MissingLegacyData(_))));
    }

    #[test]
    fn test_legacy_release_reads_legacy_bonuses() {
        let previous = generate_snapshot(
            date(2021, 9, 9),
            vec![],
            vec![generate_player_row(1, vec![generate_bonus(99, 5000, 0)])]
        );
        let mut release_inputs = inputs(date(2021, 9, 16));
        release_inputs.legacy_bonuses = Some(LegacyBonuses {
            rows: vec![LegacyBonusRow {
                player_id: 1,
                tournament_id: 5,
                rating_original: Some(1000),
                rating_now: 900
            }],
            tournament_end_dates: HashMap::from([(5, date(2021, 9, 2))])
        });

        let outcome = calculator().calculate(&previous, &release_inputs).unwrap();
        let player = outcome.snapshot.player(1).unwrap();

        // Snapshot bonuses are ignored, the legacy one is two weeks old and then aged once
        assert_eq!(player.bonuses.len(), 1);
        assert_eq!(player.bonuses[0].tournament_id, 5);
        assert_eq!(player.bonuses[0].weeks_since_tournament, 3);
        assert_eq!(player.rating, (1000.0 * 0.98f64.powi(3)).round_ties_even() as i32);
    }

    #[test]
    fn test_full_release_step() {
        let previous = generate_snapshot(
            date(2022, 1, 13),
            vec![generate_team_row(1, 2000.0), generate_team_row(2, 500.0)],
            vec![
                generate_player_row(1, vec![generate_bonus(1, 1000, 0)]),
                generate_player_row(2, vec![generate_bonus(1, 1000, 0)]),
                generate_player_row(3, vec![generate_bonus(2, 500, 0)])
            ]
        );
        let previous_copy = previous.clone();

        let mut release_inputs = inputs(date(2022, 1, 20));
        release_inputs.base_roster = HashMap::from([(1, 1), (2, 1), (3, 2)]);
        let mut result = generate_tournament_result(10, 3, 400, vec![3, 4], vec![3, 4]);
        result.rating_change = 25;
        release_inputs.tournament_results = vec![result];
        release_inputs.changed_teams = HashSet::from([2]);

        let outcome = calculator().calculate(&previous, &release_inputs).unwrap();
        let snapshot = &outcome.snapshot;

        assert_eq!(previous, previous_copy);
        assert_eq!(snapshot.date, date(2022, 1, 20));

        // Players 1, 2: 980; player 3: 490 + 400; player 4: 400
        assert_eq!(snapshot.player(1).unwrap().rating, 980);
        assert_eq!(snapshot.player(3).unwrap().rating, 890);
        assert_eq!(snapshot.player(4).unwrap().rating, 400);
        assert_eq!(snapshot.player(4).unwrap().rating_change, None);
        assert_eq!(snapshot.player(3).unwrap().place, Some(3));

        // Team 1 alone qualifies: 2000 / (980 + 490)
        let expected_q = 2000.0 / 1470.0;
        assert_eq!(outcome.q_calibration, QCalibration::Calibrated { q: expected_q, teams: 1 });
        assert_abs_diff_eq!(snapshot.q, expected_q);

        // Team 3 is new: 0.5 * q * (890 + 400 / 2), then +25
        assert_eq!(outcome.admitted_teams, vec![3]);
        let team_3 = snapshot.team(3).unwrap();
        assert_abs_diff_eq!(team_3.technical_rating.unwrap(), 0.0);
        assert_abs_diff_eq!(team_3.rating, 0.5 * expected_q * 1090.0 + 25.0, epsilon = 1e-9);
        assert_eq!(team_3.rating_change, None);

        // Team 2 changed roster: floor 0.5 * q * 890 exceeds 500
        let team_2 = snapshot.team(2).unwrap();
        let floor = 0.5 * expected_q * 890.0;
        assert_abs_diff_eq!(team_2.rating, 500.0);
        assert_abs_diff_eq!(team_2.pending_rating.unwrap(), floor, epsilon = 1e-9);
        assert_eq!(outcome.heredity_changes.len(), 1);

        assert_eq!(snapshot.team(1).unwrap().place, Some(1));
        assert!(snapshot.team(1).unwrap().pending_rating.is_none());
        assert!(snapshot.bonus_scale.is_some());
        assert_eq!(snapshot.tournament_ids, vec![10]);

        // Team 1's technical rating split by player: 980 and 980 / 2, times Q
        let contributions = &snapshot.team(1).unwrap().trb_contributions;
        assert_eq!(contributions.iter().map(|c| c.order).collect::<Vec<_>>(), vec![1, 2]);
        assert_abs_diff_eq!(contributions[0].contribution, expected_q * 980.0, epsilon = 1e-9);
        assert_abs_diff_eq!(contributions[1].contribution, expected_q * 490.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stale_q_is_reported() {
        let mut previous = generate_snapshot(date(2022, 1, 13), vec![generate_team_row(1, 2000.0)], vec![]);
        previous.q = 1.25;

        let outcome = calculator().calculate(&previous, &inputs(date(2022, 1, 20))).unwrap();

        assert!(outcome.q_calibration.is_stale());
        assert_eq!(outcome.snapshot.q, 1.25);
    }
}
