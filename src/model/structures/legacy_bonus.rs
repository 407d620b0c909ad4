use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Frozen per-tournament bonus from the old rating format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyBonusRow {
    pub player_id: i32,
    pub tournament_id: i32,
    pub rating_original: Option<i32>,
    pub rating_now: i32
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyBonuses {
    pub rows: Vec<LegacyBonusRow>,
    pub tournament_end_dates: HashMap<i32, NaiveDate>
}
