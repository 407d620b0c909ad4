use crate::{
    model::{
        constants::INSERT_BATCH_SIZE,
        structures::{
            bonus::Bonus,
            legacy_bonus::{LegacyBonusRow, LegacyBonuses},
            player_rating::PlayerRatingRow,
            release::ReleaseSnapshot,
            team_rating::TeamRatingRow,
            tournament_result::TournamentResult
        }
    },
    utils::progress_utils::progress_bar
};
use chrono::NaiveDate;
use itertools::Itertools;
use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    sync::Arc
};
use tokio_postgres::{Client, Error, NoTls, Row};
use tracing::{debug, error, info};

/// Schema holding the source data (seasons, rosters, tournaments)
const SOURCE_SCHEMA: &str = "public";

#[derive(Clone)]
pub struct DbClient {
    client: Arc<Client>,
    /// Schema the releases are written to
    schema: String
}

impl DbClient {
    // Connect to the database and return a DbClient instance
    pub async fn connect(connection_str: &str, schema: &str) -> Result<Self, Error> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        // Spawn the connection object to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("connection error: {}", e);
            }
        });

        Ok(DbClient {
            client: Arc::new(client),
            schema: schema.to_string()
        })
    }

    /// The most recent committed release strictly before `date`, with all
    /// team rows, player rows and bonuses.
    pub async fn get_previous_release(&self, date: NaiveDate, decay_base: f64) -> Result<Option<ReleaseSnapshot>, Error> {
        let query = format!(
            "SELECT id, date, hash, q::float8 AS q, bonus_scale FROM {}.release \
            WHERE date < $1 ORDER BY date DESC LIMIT 1",
            self.schema
        );

        let row = match self.client.query_opt(query.as_str(), &[&date]).await? {
            Some(row) => row,
            None => return Ok(None)
        };

        let release_id: i32 = row.get("id");
        let release_date: NaiveDate = row.get("date");
        info!("Loading release {} (id {})", release_date, release_id);

        let teams = self.get_team_ratings(release_id).await?;
        let players = self.get_player_ratings(release_id, decay_base).await?;
        let tournament_ids = self.get_release_tournaments(release_id).await?;

        info!(
            "Release {} loaded: {} teams, {} players",
            release_date,
            teams.len(),
            players.len()
        );

        Ok(Some(ReleaseSnapshot {
            date: release_date,
            q: row.get("q"),
            bonus_scale: row.get("bonus_scale"),
            hash: row.get("hash"),
            teams,
            players,
            tournament_ids
        }))
    }

    async fn get_release_tournaments(&self, release_id: i32) -> Result<Vec<i32>, Error> {
        let query = format!(
            "SELECT tournament_id FROM {}.tournament_in_release WHERE release_id = $1 ORDER BY tournament_id",
            self.schema
        );

        let rows = self.client.query(query.as_str(), &[&release_id]).await?;

        Ok(rows.iter().map(|row| row.get("tournament_id")).collect())
    }

    async fn get_team_ratings(&self, release_id: i32) -> Result<Vec<TeamRatingRow>, Error> {
        let query = format!(
            "SELECT team_id, rating, rating_for_next_release, trb, rating_change, \
            place::int4 AS place, place_change::int4 AS place_change \
            FROM {}.team_rating WHERE release_id = $1 ORDER BY team_id",
            self.schema
        );

        let rows = self.client.query(query.as_str(), &[&release_id]).await?;

        Ok(rows.iter().map(Self::team_rating_from_row).collect())
    }

    fn team_rating_from_row(row: &Row) -> TeamRatingRow {
        TeamRatingRow {
            team_id: row.get("team_id"),
            rating: row.get::<_, i32>("rating") as f64,
            technical_rating: row.get::<_, Option<i32>>("trb").map(|v| v as f64),
            place: row.get("place"),
            rating_change: row.get::<_, Option<i32>>("rating_change").map(|v| v as f64),
            place_change: row.get("place_change"),
            pending_rating: row.get::<_, Option<i32>>("rating_for_next_release").map(|v| v as f64),
            trb_contributions: Vec::new()
        }
    }

    async fn get_player_ratings(&self, release_id: i32, decay_base: f64) -> Result<Vec<PlayerRatingRow>, Error> {
        let query = format!(
            "SELECT player_id, rating, rating_change, place::int4 AS place, place_change::int4 AS place_change \
            FROM {}.player_rating WHERE release_id = $1 ORDER BY player_id",
            self.schema
        );
        let rows = self.client.query(query.as_str(), &[&release_id]).await?;

        let mut bonuses = self.get_player_bonuses(release_id, decay_base).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let player_id: i32 = row.get("player_id");

                PlayerRatingRow {
                    player_id,
                    rating: row.get("rating"),
                    place: row.get("place"),
                    rating_change: row.get("rating_change"),
                    place_change: row.get("place_change"),
                    bonuses: bonuses.remove(&player_id).unwrap_or_default()
                }
            })
            .collect())
    }

    async fn get_player_bonuses(&self, release_id: i32, decay_base: f64) -> Result<HashMap<i32, Vec<Bonus>>, Error> {
        let query = format!(
            "SELECT player_id, tournament_id, tournament_result_id, initial_score, \
            weeks_since_tournament, cur_score \
            FROM {}.player_rating_by_tournament WHERE release_id = $1 ORDER BY player_id, tournament_id",
            self.schema
        );

        let rows = self.client.query(query.as_str(), &[&release_id]).await?;
        let mut bonuses: HashMap<i32, Vec<Bonus>> = HashMap::new();

        for row in rows.iter() {
            let bonus = Bonus::stored(
                row.get("tournament_id"),
                row.get("tournament_result_id"),
                row.get::<_, Option<i32>>("initial_score").unwrap_or(0),
                row.get::<_, i16>("weeks_since_tournament") as i32,
                row.get("cur_score"),
                decay_base
            );

            bonuses.entry(row.get("player_id")).or_default().push(bonus);
        }

        debug!("Loaded bonuses of {} players", bonuses.len());
        Ok(bonuses)
    }

    /// Resolves every player's base team as of `as_of`. When a player has
    /// several open assignments the one that started last wins.
    pub async fn get_base_roster(&self, as_of: NaiveDate) -> Result<HashMap<i32, i32>, Error> {
        let query = format!(
            "SELECT DISTINCT ON (br.player_id) br.player_id, br.team_id \
            FROM {0}.base_rosters br JOIN {0}.seasons s ON s.id = br.season_id \
            WHERE s.start <= $1 AND s.\"end\" >= $1 \
              AND br.start_date <= $1 AND (br.end_date IS NULL OR br.end_date > $1) \
            ORDER BY br.player_id, br.start_date DESC",
            SOURCE_SCHEMA
        );

        let rows = self.client.query(query.as_str(), &[&as_of]).await?;

        info!("Resolved {} base roster assignments as of {}", rows.len(), as_of);
        Ok(rows
            .iter()
            .map(|row| (row.get::<_, i32>("player_id"), row.get::<_, i32>("team_id")))
            .collect())
    }

    /// Counted results of tournaments that ended in `[since, until)`, with the
    /// roster each team played with. Declared base members are left empty;
    /// they depend on the roster date of the release being computed.
    pub async fn get_tournament_results(
        &self,
        since: NaiveDate,
        until: NaiveDate
    ) -> Result<Vec<TournamentResult>, Error> {
        let query = format!(
            "SELECT tr.id, tr.tournament_id, tr.team_id, tr.rating, tr.rating_change, \
            t.end_datetime::date AS end_date \
            FROM {0}.tournament_result tr JOIN {1}.tournaments t ON t.id = tr.tournament_id \
            WHERE tr.is_in_maii_rating AND t.end_datetime::date >= $1 AND t.end_datetime::date < $2 \
            ORDER BY t.end_datetime, tr.tournament_id, tr.team_id",
            self.schema, SOURCE_SCHEMA
        );

        let rows = self.client.query(query.as_str(), &[&since, &until]).await?;

        let tournament_ids = rows
            .iter()
            .map(|row| row.get::<_, i32>("tournament_id"))
            .unique()
            .collect_vec();
        let mut rosters = self.get_tournament_rosters(&tournament_ids).await?;

        let results = rows
            .iter()
            .map(|row| {
                let tournament_id: i32 = row.get("tournament_id");
                let team_id: i32 = row.get("team_id");

                TournamentResult {
                    tournament_id,
                    tournament_result_id: Some(row.get("id")),
                    team_id,
                    initial_score: row.get("rating"),
                    rating_change: row.get("rating_change"),
                    end_date: row.get("end_date"),
                    player_ids: rosters.remove(&(tournament_id, team_id)).unwrap_or_default(),
                    base_team_members: Vec::new()
                }
            })
            .collect_vec();

        info!(
            "Fetched {} results of {} tournaments ending in [{}, {})",
            results.len(),
            tournament_ids.len(),
            since,
            until
        );

        Ok(results)
    }

    async fn get_tournament_rosters(&self, tournament_ids: &[i32]) -> Result<HashMap<(i32, i32), Vec<i32>>, Error> {
        if tournament_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query = format!(
            "SELECT tournament_id, team_id, player_id FROM {}.tournament_rosters \
            WHERE tournament_id = ANY($1) ORDER BY tournament_id, team_id, player_id",
            SOURCE_SCHEMA
        );
        let ids = tournament_ids.to_vec();
        let rows = self.client.query(query.as_str(), &[&ids]).await?;

        let mut rosters: HashMap<(i32, i32), Vec<i32>> = HashMap::new();
        for row in rows.iter() {
            rosters
                .entry((row.get("tournament_id"), row.get("team_id")))
                .or_default()
                .push(row.get("player_id"));
        }

        Ok(rosters)
    }

    /// Teams that gained a base-roster player in `(old, new]`
    pub async fn get_changed_teams(&self, old: NaiveDate, new: NaiveDate) -> Result<HashSet<i32>, Error> {
        let query = format!(
            "SELECT DISTINCT team_id FROM {}.base_rosters WHERE start_date > $1 AND start_date <= $2",
            SOURCE_SCHEMA
        );

        let rows = self.client.query(query.as_str(), &[&old, &new]).await?;

        debug!("{} teams changed their base roster in ({}, {}]", rows.len(), old, new);
        Ok(rows.iter().map(|row| row.get::<_, i32>("team_id")).collect())
    }

    /// The frozen old-format bonus table together with the end dates of the
    /// tournaments it references.
    pub async fn get_legacy_bonuses(&self) -> Result<LegacyBonuses, Error> {
        let query = format!(
            "SELECT player_id, tournament_id, rating_original, rating_now \
            FROM {}.rating_individual_old_details \
            WHERE player_id IS NOT NULL AND tournament_id IS NOT NULL",
            SOURCE_SCHEMA
        );
        let rows = self.client.query(query.as_str(), &[]).await?;

        let legacy_rows = rows
            .iter()
            .map(|row| LegacyBonusRow {
                player_id: row.get("player_id"),
                tournament_id: row.get("tournament_id"),
                rating_original: row.get("rating_original"),
                rating_now: row.get("rating_now")
            })
            .collect_vec();

        let dates_query = format!(
            "SELECT id, end_datetime::date AS end_date FROM {}.tournaments WHERE end_datetime IS NOT NULL",
            SOURCE_SCHEMA
        );
        let tournament_end_dates = self
            .client
            .query(dates_query.as_str(), &[])
            .await?
            .iter()
            .map(|row| (row.get::<_, i32>("id"), row.get::<_, NaiveDate>("end_date")))
            .collect();

        info!("Fetched {} legacy bonuses", legacy_rows.len());

        Ok(LegacyBonuses {
            rows: legacy_rows,
            tournament_end_dates
        })
    }

    /// Writes a release in a single transaction, replacing any release with
    /// the same date. Returns the id of the new release row.
    pub async fn save_release(&self, snapshot: &ReleaseSnapshot) -> Result<i32, Error> {
        self.client.batch_execute("BEGIN").await?;

        match self.write_release(snapshot).await {
            Ok(release_id) => {
                self.client.batch_execute("COMMIT").await?;
                info!("Release {} committed (id {})", snapshot.date, release_id);

                Ok(release_id)
            }
            Err(e) => {
                error!("Failed to save release {}, rolling back: {}", snapshot.date, e);
                if let Err(rollback) = self.client.batch_execute("ROLLBACK").await {
                    error!("Rollback failed: {}", rollback);
                }

                Err(e)
            }
        }
    }

    async fn write_release(&self, snapshot: &ReleaseSnapshot) -> Result<i32, Error> {
        self.delete_release(snapshot.date).await?;

        let query = format!(
            "INSERT INTO {}.release (title, date, updated_at, hash, q, bonus_scale) \
            VALUES ($1, $2, NOW(), $3, round($4::float8::numeric, 5), $5) RETURNING id",
            self.schema
        );
        let title = format!("Release {}", snapshot.date);
        let row = self
            .client
            .query_one(
                query.as_str(),
                &[&title, &snapshot.date, &snapshot.hash, &snapshot.q, &snapshot.bonus_scale]
            )
            .await?;
        let release_id: i32 = row.get("id");

        self.save_team_ratings(release_id, &snapshot.teams).await?;
        self.save_team_contributions(release_id, &snapshot.teams).await?;
        self.save_player_ratings(release_id, &snapshot.players).await?;
        self.save_player_bonuses(release_id, &snapshot.players).await?;
        self.save_release_tournaments(release_id, &snapshot.tournament_ids).await?;

        Ok(release_id)
    }

    async fn delete_release(&self, date: NaiveDate) -> Result<(), Error> {
        let existing = format!("SELECT id FROM {}.release WHERE date = $1", self.schema);
        let release_id = match self.client.query_opt(existing.as_str(), &[&date]).await? {
            Some(row) => row.get::<_, i32>("id"),
            None => return Ok(())
        };

        let query = format!(
            "DELETE FROM {0}.team_rating_by_player WHERE team_rating_id IN \
            (SELECT id FROM {0}.team_rating WHERE release_id = $1)",
            self.schema
        );
        self.client.execute(query.as_str(), &[&release_id]).await?;

        for table in [
            "tournament_in_release",
            "player_rating_by_tournament",
            "player_rating",
            "team_rating"
        ] {
            let query = format!("DELETE FROM {}.{} WHERE release_id = $1", self.schema, table);
            self.client.execute(query.as_str(), &[&release_id]).await?;
        }

        let query = format!("DELETE FROM {}.release WHERE id = $1", self.schema);
        self.client.execute(query.as_str(), &[&release_id]).await?;

        info!("Replaced the existing release {} (id {})", date, release_id);
        Ok(())
    }

    async fn save_team_ratings(&self, release_id: i32, teams: &[TeamRatingRow]) -> Result<(), Error> {
        self.fast_insert(
            "team_rating",
            "release_id, team_id, rating, rating_for_next_release, trb, rating_change, place, place_change",
            &team_rating_values(release_id, teams)
        )
        .await
    }

    /// Per-player split of every team's technical rating. Runs after the team
    /// rows are inserted, since it references their ids.
    async fn save_team_contributions(&self, release_id: i32, teams: &[TeamRatingRow]) -> Result<(), Error> {
        let query = format!("SELECT id, team_id FROM {}.team_rating WHERE release_id = $1", self.schema);
        let team_rating_ids: HashMap<i32, i32> = self
            .client
            .query(query.as_str(), &[&release_id])
            .await?
            .iter()
            .map(|row| (row.get::<_, i32>("team_id"), row.get::<_, i32>("id")))
            .collect();

        self.fast_insert(
            "team_rating_by_player",
            "team_rating_id, player_id, \"order\", contribution",
            &team_contribution_values(&team_rating_ids, teams)
        )
        .await
    }

    async fn save_release_tournaments(&self, release_id: i32, tournament_ids: &[i32]) -> Result<(), Error> {
        let values = tournament_ids
            .iter()
            .map(|tournament_id| format!("({}, {})", release_id, tournament_id))
            .collect_vec();

        self.fast_insert("tournament_in_release", "release_id, tournament_id", &values).await
    }

    async fn save_player_ratings(&self, release_id: i32, players: &[PlayerRatingRow]) -> Result<(), Error> {
        let values = players
            .iter()
            .map(|player| {
                format!(
                    "({}, {}, {}, {}, {}, {})",
                    release_id,
                    player.player_id,
                    player.rating,
                    sql_value(player.rating_change),
                    sql_value(player.place),
                    sql_value(player.place_change)
                )
            })
            .collect_vec();

        self.fast_insert(
            "player_rating",
            "release_id, player_id, rating, rating_change, place, place_change",
            &values
        )
        .await
    }

    async fn save_player_bonuses(&self, release_id: i32, players: &[PlayerRatingRow]) -> Result<(), Error> {
        let values = players
            .iter()
            .flat_map(|player| {
                player.bonuses.iter().map(move |bonus| {
                    format!(
                        "({}, {}, {}, {}, {}, {}, {})",
                        release_id,
                        player.player_id,
                        sql_value(bonus.tournament_result_id),
                        bonus.tournament_id,
                        bonus.initial_score,
                        bonus.weeks_since_tournament,
                        bonus.current_score
                    )
                })
            })
            .collect_vec();

        self.fast_insert(
            "player_rating_by_tournament",
            "release_id, player_id, tournament_result_id, tournament_id, initial_score, \
            weeks_since_tournament, cur_score",
            &values
        )
        .await
    }

    /// Inserts pre-formatted value tuples in batches of `INSERT_BATCH_SIZE`
    async fn fast_insert(&self, table: &str, columns: &str, values: &[String]) -> Result<(), Error> {
        if values.is_empty() {
            debug!("Nothing to insert into {}.{}", self.schema, table);
            return Ok(());
        }

        let p_bar = progress_bar(values.len() as u64, format!("Saving {}", table));

        for batch in values.chunks(INSERT_BATCH_SIZE) {
            let query = format!(
                "INSERT INTO {}.{} ({}) VALUES {}",
                self.schema,
                table,
                columns,
                batch.join(",\n")
            );
            self.client.batch_execute(query.as_str()).await?;

            p_bar.inc(batch.len() as u64);
        }

        p_bar.finish_and_clear();
        debug!("Inserted {} rows into {}.{}", values.len(), self.schema, table);

        Ok(())
    }
}

/// Literal for a nullable column in a bulk insert
fn sql_value<T: Display>(value: Option<T>) -> String {
    value.map_or("NULL".to_string(), |v| v.to_string())
}

/// Team ratings are stored as integers, halves rounded to even
fn stored_rating(value: f64) -> i64 {
    value.round_ties_even() as i64
}

fn team_rating_values(release_id: i32, teams: &[TeamRatingRow]) -> Vec<String> {
    teams
        .iter()
        .map(|team| {
            format!(
                "({}, {}, {}, {}, {}, {}, {}, {})",
                release_id,
                team.team_id,
                stored_rating(team.rating),
                sql_value(team.pending_rating.map(stored_rating)),
                sql_value(team.technical_rating.map(stored_rating)),
                sql_value(team.rating_change.map(stored_rating)),
                sql_value(team.place),
                sql_value(team.place_change)
            )
        })
        .collect_vec()
}

/// `team_rating_ids` maps team ids to the ids of their inserted rows
fn team_contribution_values(team_rating_ids: &HashMap<i32, i32>, teams: &[TeamRatingRow]) -> Vec<String> {
    teams
        .iter()
        .filter_map(|team| team_rating_ids.get(&team.team_id).map(|id| (*id, team)))
        .flat_map(|(team_rating_id, team)| {
            team.trb_contributions.iter().map(move |c| {
                format!(
                    "({}, {}, {}, {})",
                    team_rating_id,
                    c.player_id,
                    c.order,
                    stored_rating(c.contribution)
                )
            })
        })
        .collect_vec()
}
