pub mod bonus_loader;
pub mod constants;
pub mod player_rating_engine;
pub mod ranking;
pub mod release_calculator;
pub mod structures;
pub mod team_rating_engine;
pub mod technical_rating;
