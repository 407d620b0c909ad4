use approx::assert_abs_diff_eq;
use chrono::{Duration, NaiveDate};
use release_rating::{
    constants::{default_constants, RatingConstants},
    model::{
        release_calculator::ReleaseCalculator,
        structures::{
            legacy_bonus::{LegacyBonusRow, LegacyBonuses},
            release::{ReleaseInputs, ReleaseOutcome, ReleaseSnapshot},
            tournament_result::TournamentResult
        }
    },
    processor::{attach_base_members, release_dates}
};
use std::collections::{HashMap, HashSet};

use crate::common::{date, init_test_env};
use release_rating::utils::test_utils::{generate_bonus, generate_player_row, generate_snapshot, generate_team_row};

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

fn inputs(release_date: NaiveDate, base_roster: &HashMap<i32, i32>) -> ReleaseInputs {
    ReleaseInputs {
        release_date,
        roster_date: release_date,
        base_roster: base_roster.clone(),
        ..Default::default()
    }
}

/// Team 10 rated 1000 with players 1 (1000) and 2 (500) on its base roster
fn single_team_release(release_date: NaiveDate) -> ReleaseSnapshot {
    generate_snapshot(
        release_date,
        vec![generate_team_row(10, 1000.0)],
        vec![
            generate_player_row(1, vec![generate_bonus(1, 1000, 0)]),
            generate_player_row(2, vec![generate_bonus(2, 500, 0)])
        ]
    )
}

/// Computes one release per week after `previous`, feeding each outcome into the next step
fn fold_releases(
    calculator: &ReleaseCalculator,
    previous: ReleaseSnapshot,
    weeks: usize,
    make_inputs: impl Fn(NaiveDate) -> ReleaseInputs
) -> Vec<ReleaseOutcome> {
    let dates = release_dates(
        previous.date + Duration::days(7),
        previous.date + Duration::days(7 * weeks as i64),
        7
    );

    let mut outcomes: Vec<ReleaseOutcome> = Vec::new();
    let mut current = previous;

    for release_date in dates {
        let outcome = calculator.calculate(&current, &make_inputs(release_date)).unwrap();
        current = outcome.snapshot.clone();
        outcomes.push(outcome);
    }

    outcomes
}

#[test]
fn test_ratings_decay_without_tournaments() {
    init_test_env();
    let base_roster = HashMap::from([(1, 10), (2, 10)]);

    let outcomes = fold_releases(&calculator(), single_team_release(date(2022, 1, 13)), 3, |d| {
        inputs(d, &base_roster)
    });

    assert_eq!(outcomes.len(), 3);

    let last = &outcomes[2].snapshot;
    assert_eq!(last.date, date(2022, 2, 3));
    assert_eq!(last.player(1).unwrap().rating, (1000.0 * 0.98f64.powi(3)).round_ties_even() as i32);
    assert_eq!(last.player(2).unwrap().rating, (500.0 * 0.98f64.powi(3)).round_ties_even() as i32);
    assert_eq!(last.player(1).unwrap().place, Some(1));

    // Team rating is untouched, Q follows the decaying technical rating
    let team = last.team(10).unwrap();
    assert_abs_diff_eq!(team.rating, 1000.0, epsilon = 1e-9);
    assert_abs_diff_eq!(team.rating_change.unwrap(), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(last.q, 1000.0 / (941.0 + 0.5 * 471.0), epsilon = 1e-9);
    assert!(outcomes.iter().all(|o| !o.q_calibration.is_stale()));
}

#[test]
fn test_release_is_deterministic() {
    init_test_env();
    let previous = single_team_release(date(2022, 1, 13));
    let untouched = previous.clone();
    let mut release_inputs = inputs(date(2022, 1, 20), &HashMap::from([(1, 10), (2, 10), (3, 20)]));
    release_inputs.tournament_results = vec![TournamentResult {
        tournament_id: 5,
        tournament_result_id: Some(50),
        team_id: 20,
        initial_score: 300,
        rating_change: 50,
        end_date: date(2022, 1, 16),
        player_ids: vec![3],
        base_team_members: vec![3]
    }];

    let first = calculator().calculate(&previous, &release_inputs).unwrap();
    let second = calculator().calculate(&previous, &release_inputs).unwrap();

    assert_eq!(first.snapshot, second.snapshot);
    assert_eq!(first.snapshot.hash, second.snapshot.hash);
    assert_eq!(previous, untouched);
}

#[test]
fn test_new_team_admitted_then_established() {
    init_test_env();
    let base_roster = HashMap::from([(1, 10), (2, 10), (3, 20)]);
    let calculator = calculator();

    let mut first_inputs = inputs(date(2022, 1, 20), &base_roster);
    first_inputs.tournament_results = vec![TournamentResult {
        tournament_id: 5,
        tournament_result_id: Some(50),
        team_id: 20,
        initial_score: 300,
        rating_change: 50,
        end_date: date(2022, 1, 16),
        player_ids: vec![3],
        base_team_members: Vec::new()
    }];
    attach_base_members(&mut first_inputs.tournament_results, &base_roster);

    let first = calculator
        .calculate(&single_team_release(date(2022, 1, 13)), &first_inputs)
        .unwrap();

    assert_eq!(first.admitted_teams, vec![20]);
    assert_eq!(first.snapshot.tournament_ids, vec![5]);

    let q = 1000.0 / (980.0 + 0.5 * 490.0);
    let admitted = first.snapshot.team(20).unwrap();
    assert_abs_diff_eq!(admitted.technical_rating.unwrap(), q * 300.0, epsilon = 1e-9);
    assert_abs_diff_eq!(admitted.rating, 0.5 * q * 300.0 + 50.0, epsilon = 1e-9);
    assert_eq!(admitted.rating_change, None);
    assert_eq!(admitted.place_change, None);
    assert_eq!(admitted.place, Some(2));
    assert_eq!(first.snapshot.player(3).unwrap().rating, 300);
    assert_eq!(first.snapshot.player(3).unwrap().rating_change, None);

    let second = calculator
        .calculate(&first.snapshot, &inputs(date(2022, 1, 27), &base_roster))
        .unwrap();
    let established = second.snapshot.team(20).unwrap();

    assert!(second.admitted_teams.is_empty());
    assert!(second.snapshot.tournament_ids.is_empty());
    assert_abs_diff_eq!(established.rating, admitted.rating, epsilon = 1e-9);
    assert_abs_diff_eq!(established.rating_change.unwrap(), 0.0, epsilon = 1e-9);
    assert_eq!(established.place_change, Some(0));
    assert_eq!(second.snapshot.player(3).unwrap().rating, 294);
}

#[test]
fn test_heredity_floor_carries_into_next_release() {
    init_test_env();
    let calculator = ReleaseCalculator::new(RatingConstants {
        decay_base: 0.98,
        technical_rating_slots: 2,
        q_min_players: 2,
        q_reference_teams: 1,
        lowering_coefficient: 0.5,
        last_old_release: date(2021, 9, 9),
        ..default_constants()
    })
    .unwrap();

    let previous = generate_snapshot(
        date(2022, 1, 13),
        vec![generate_team_row(10, 100.0), generate_team_row(30, 2000.0)],
        vec![
            generate_player_row(1, vec![generate_bonus(1, 1000, 0)]),
            generate_player_row(2, vec![generate_bonus(2, 500, 0)]),
            generate_player_row(4, vec![generate_bonus(1, 1000, 0)]),
            generate_player_row(5, vec![generate_bonus(2, 500, 0)])
        ]
    );
    let base_roster = HashMap::from([(1, 10), (2, 10), (4, 30), (5, 30)]);

    let mut first_inputs = inputs(date(2022, 1, 20), &base_roster);
    first_inputs.changed_teams = HashSet::from([10]);

    let first = calculator.calculate(&previous, &first_inputs).unwrap();
    let team = first.snapshot.team(10).unwrap();

    // Published before the floor is applied
    assert_abs_diff_eq!(team.rating, 100.0, epsilon = 1e-9);
    assert_eq!(team.place, Some(2));
    assert_abs_diff_eq!(team.technical_rating.unwrap(), 2000.0, epsilon = 1e-6);
    assert_abs_diff_eq!(team.pending_rating.unwrap(), 1000.0, epsilon = 1e-6);
    assert_eq!(first.heredity_changes.len(), 1);
    assert_eq!(first.heredity_changes[0].0, 10);
    assert!(first.snapshot.team(30).unwrap().pending_rating.is_none());

    let second = calculator
        .calculate(&first.snapshot, &inputs(date(2022, 1, 27), &base_roster))
        .unwrap();
    let team = second.snapshot.team(10).unwrap();

    assert_abs_diff_eq!(team.rating, 1000.0, epsilon = 1e-6);
    assert_abs_diff_eq!(team.rating_change.unwrap(), 900.0, epsilon = 1e-6);
    assert!(team.pending_rating.is_none());
    assert!(second.heredity_changes.is_empty());
}

#[test]
fn test_legacy_cut_over_happens_once() {
    init_test_env();
    let legacy = LegacyBonuses {
        rows: vec![
            LegacyBonusRow {
                player_id: 1,
                tournament_id: 5,
                rating_original: Some(1000),
                rating_now: 900
            },
            // Not part of the last old-format release
            LegacyBonusRow {
                player_id: 7,
                tournament_id: 5,
                rating_original: Some(1000),
                rating_now: 900
            }
        ],
        tournament_end_dates: HashMap::from([(5, date(2021, 9, 2))])
    };
    let previous = generate_snapshot(
        date(2021, 9, 9),
        vec![],
        vec![generate_player_row(1, vec![generate_bonus(99, 5000, 0)])]
    );

    let outcomes = fold_releases(&calculator(), previous, 2, |d| {
        let mut release_inputs = inputs(d, &HashMap::new());
        // Supplied every week, read only after the last old-format release
        release_inputs.legacy_bonuses = Some(legacy.clone());
        release_inputs
    });

    let first = &outcomes[0].snapshot;
    assert_eq!(first.date, date(2021, 9, 16));
    assert_eq!(first.players.len(), 1);
    assert_eq!(first.player(1).unwrap().bonuses[0].tournament_id, 5);
    assert_eq!(first.player(1).unwrap().rating, (1000.0 * 0.98f64.powi(3)).round_ties_even() as i32);

    let second = &outcomes[1].snapshot;
    assert_eq!(second.player(1).unwrap().bonuses[0].weeks_since_tournament, 4);
    assert_eq!(second.player(1).unwrap().rating, (1000.0 * 0.98f64.powi(4)).round_ties_even() as i32);
}
