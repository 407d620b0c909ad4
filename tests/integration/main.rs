#[path = "../common/mod.rs"]
mod common;

mod release_flow_tests;
