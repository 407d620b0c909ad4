pub mod args;
pub mod constants;
pub mod database;
pub mod error;
pub mod messaging;
pub mod model;
pub mod processor;
pub mod utils;
