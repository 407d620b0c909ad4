pub mod bonus;
pub mod legacy_bonus;
pub mod player_rating;
pub mod q_calibration;
pub mod release;
pub mod team_rating;
pub mod tournament_result;
