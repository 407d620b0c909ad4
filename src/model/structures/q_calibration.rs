/// Outcome of calibrating the Q coefficient
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QCalibration {
    /// Q recomputed from `teams` reference teams
    Calibrated { q: f64, teams: usize },
    /// No team qualified; the previous Q is kept
    Stale { q: f64 }
}

impl QCalibration {
    pub fn q(&self) -> f64 {
        match self {
            QCalibration::Calibrated { q, .. } => *q,
            QCalibration::Stale { q } => *q
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, QCalibration::Stale { .. })
    }
}
