use crate::{error::ConfigError, model::constants::DEFAULT_Q};

/// Top-K geometrically weighted sum.
///
/// Values are sorted in descending order, the first one counts with weight 1 and
/// every following slot with half the weight of the previous one. Values beyond
/// `slots` are ignored; missing values count as 0.
///
/// Shared by the team technical rating (player ratings → team) and the
/// bonus-point scale (team ratings → tournament bonus points).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopWeighting {
    slots: usize
}

impl TopWeighting {
    pub fn new(name: &'static str, slots: usize) -> Result<Self, ConfigError> {
        if slots == 0 {
            return Err(ConfigError::InvalidSlotCount { name, value: slots });
        }

        Ok(TopWeighting { slots })
    }

    /// Weight of the slot at `index` (0-based)
    pub fn weight(&self, index: usize) -> f64 {
        if index >= self.slots {
            return 0.0;
        }

        0.5f64.powi(index as i32)
    }

    /// The counted values, strongest first, each with its weighted value.
    /// Equal values keep their input order.
    pub fn contributions<K, I>(&self, values: I) -> Vec<(K, f64)>
    where
        I: IntoIterator<Item = (K, f64)>
    {
        let mut values: Vec<(K, f64)> = values.into_iter().collect();
        values.sort_by(|(_, a), (_, b)| b.total_cmp(a));
        values.truncate(self.slots);

        values
            .into_iter()
            .enumerate()
            .map(|(i, (key, v))| (key, v * self.weight(i)))
            .collect()
    }

    pub fn weighted_sum<I>(&self, values: I) -> f64
    where
        I: IntoIterator<Item = f64>
    {
        self.contributions(values.into_iter().map(|v| ((), v)))
            .iter()
            .map(|(_, weighted)| weighted)
            .sum()
    }
}

/// Technical rating of a roster: the weighted sum of its player ratings
/// multiplied by the calibration coefficient Q (1 when unset).
pub fn technical_rating<I>(weighting: &TopWeighting, ratings: I, q: Option<f64>) -> f64
where
    I: IntoIterator<Item = i32>
{
    q.unwrap_or(DEFAULT_Q) * weighting.weighted_sum(ratings.into_iter().map(f64::from))
}

/// Constant C such that the strongest team of the release earns `max_bonus`
/// bonus points. `None` when there are no positive team ratings to scale against.
pub fn bonus_scale<I>(weighting: &TopWeighting, team_ratings: I, max_bonus: f64) -> Option<f64>
where
    I: IntoIterator<Item = f64>
{
    let weighted = weighting.weighted_sum(team_ratings);

    if weighted > 0.0 {
        Some(max_bonus / weighted)
    } else {
        None
    }
}
