use crate::core::io::samples::EvSample;
use crate::core::models::structure::Structure;
use itertools::Itertools;
use nalgebra::Matrix3;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BracketError {
    #[error("bracket factors must be strictly increasing, got {0:?}")]
    NotIncreasing([f64; 3]),

    #[error("bracket factors must be positive, got {0:?}")]
    NonPositive([f64; 3]),
}

/// One completed volume trial: the scale factor it was run at and what the engine
/// reported back.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeEnergyPoint {
    pub scale_factor: f64,
    pub volume: f64,
    pub energy: f64,
    pub stress: Matrix3<f64>,
    pub structure: Structure,
}

impl VolumeEnergyPoint {
    pub fn pressure(&self) -> f64 {
        self.stress.trace() / 3.0
    }

    pub fn as_sample(&self) -> EvSample {
        EvSample {
            scale_factor: self.scale_factor,
            volume: self.volume,
            energy: self.energy,
            pressure: self.pressure(),
        }
    }
}

/// Three strictly increasing, positive volume scale factors sampled in one round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    factors: [f64; 3],
}

impl Default for Bracket {
    fn default() -> Self {
        Self {
            factors: [0.8, 1.0, 1.2],
        }
    }
}

impl Bracket {
    pub fn new(factors: [f64; 3]) -> Result<Self, BracketError> {
        if factors.iter().any(|&f| !(f > 0.0)) {
            return Err(BracketError::NonPositive(factors));
        }
        if !factors.iter().tuple_windows().all(|(a, b)| a < b) {
            return Err(BracketError::NotIncreasing(factors));
        }
        Ok(Self { factors })
    }

    pub fn factors(&self) -> [f64; 3] {
        self.factors
    }

    pub fn span(&self) -> f64 {
        self.factors[2] - self.factors[0]
    }

    /// Builds the next round's bracket around an escaped fit minimum.
    ///
    /// The new bracket is centred on `center` (the fitted minimum as a scale factor)
    /// with the previous bracket's full span on each side, so the covered range
    /// doubles every round and a distant minimum is reached in logarithmically many
    /// rounds. If the lower edge would be non-positive it is pulled up to half the
    /// center instead.
    pub fn recentered(&self, center: f64) -> Result<Self, BracketError> {
        let width = self.span();
        let low = if center - width > 0.0 {
            center - width
        } else {
            center / 2.0
        };
        Self::new([low, center, center + width])
    }
}

/// Mutable bookkeeping of the equilibrium-volume search across rounds.
#[derive(Debug)]
pub struct RecursionState {
    pub round: usize,
    pub bracket: Bracket,
    pub points: Vec<VolumeEnergyPoint>,
    pub previous_v0: Option<f64>,
}

impl RecursionState {
    pub fn new(bracket: Bracket) -> Self {
        Self {
            round: 1,
            bracket,
            points: Vec::new(),
            previous_v0: None,
        }
    }

    /// Snapshot attached to search errors so a failed run still reports everything
    /// it sampled.
    pub fn into_diagnostics(self) -> SearchDiagnostics {
        SearchDiagnostics {
            rounds_completed: self.round - 1,
            samples: self.points.iter().map(VolumeEnergyPoint::as_sample).collect(),
        }
    }
}

/// What the search had accumulated when it stopped, successfully or not.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDiagnostics {
    pub rounds_completed: usize,
    pub samples: Vec<EvSample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bracket_straddles_unity() {
        assert_eq!(Bracket::default().factors(), [0.8, 1.0, 1.2]);
    }

    #[test]
    fn rejects_unordered_factors() {
        assert_eq!(
            Bracket::new([1.2, 1.0, 0.8]),
            Err(BracketError::NotIncreasing([1.2, 1.0, 0.8]))
        );
        assert_eq!(
            Bracket::new([0.8, 0.8, 1.2]),
            Err(BracketError::NotIncreasing([0.8, 0.8, 1.2]))
        );
    }

    #[test]
    fn rejects_non_positive_factors() {
        assert_eq!(
            Bracket::new([-0.5, 1.0, 1.2]),
            Err(BracketError::NonPositive([-0.5, 1.0, 1.2]))
        );
    }

    #[test]
    fn recentering_doubles_the_span() {
        let next = Bracket::default().recentered(2.0).unwrap();
        assert_eq!(next.factors(), [1.6, 2.0, 2.4]);
        assert!((next.span() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn recentering_clamps_the_lower_edge_to_half_center() {
        let next = Bracket::default().recentered(0.3).unwrap();
        let factors = next.factors();
        assert!((factors[0] - 0.15).abs() < 1e-12);
        assert!((factors[1] - 0.3).abs() < 1e-12);
        assert!((factors[2] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn diagnostics_report_completed_rounds() {
        let mut state = RecursionState::new(Bracket::default());
        state.round = 3;
        let diagnostics = state.into_diagnostics();
        assert_eq!(diagnostics.rounds_completed, 2);
        assert!(diagnostics.samples.is_empty());
    }
}
