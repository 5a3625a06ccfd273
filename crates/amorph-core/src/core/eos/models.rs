use serde::{Deserialize, Serialize};
use std::fmt;

/// Fitted parameters shared by every supported model: reference energy `e0` (eV),
/// bulk modulus `b0` (eV/Å³), its pressure derivative `b1` (dimensionless), and
/// equilibrium volume `v0` (Å³).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EosParams {
    pub e0: f64,
    pub b0: f64,
    pub b1: f64,
    pub v0: f64,
}

/// The supported equation-of-state families, in default preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EosModel {
    BirchMurnaghan,
    Murnaghan,
    Vinet,
}

impl EosModel {
    /// Default preference order used by the equilibrium-volume search: the first
    /// model that fits successfully supplies V0.
    pub const PREFERENCE_ORDER: [EosModel; 3] =
        [EosModel::BirchMurnaghan, EosModel::Murnaghan, EosModel::Vinet];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "birch_murnaghan" => Some(Self::BirchMurnaghan),
            "murnaghan" => Some(Self::Murnaghan),
            "vinet" => Some(Self::Vinet),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BirchMurnaghan => "birch_murnaghan",
            Self::Murnaghan => "murnaghan",
            Self::Vinet => "vinet",
        }
    }

    /// Evaluates the model's closed-form energy at `volume` (Å³).
    pub fn energy(&self, p: &EosParams, volume: f64) -> f64 {
        match self {
            Self::BirchMurnaghan => {
                let eta = (p.v0 / volume).powf(2.0 / 3.0);
                p.e0
                    + 9.0 * p.v0 * p.b0 / 16.0
                        * ((eta - 1.0).powi(3) * p.b1
                            + (eta - 1.0).powi(2) * (6.0 - 4.0 * eta))
            }
            Self::Murnaghan => {
                p.e0 + p.b0 * volume / p.b1 * ((p.v0 / volume).powf(p.b1) / (p.b1 - 1.0) + 1.0)
                    - p.v0 * p.b0 / (p.b1 - 1.0)
            }
            Self::Vinet => {
                let eta = (volume / p.v0).powf(1.0 / 3.0);
                p.e0
                    + 2.0 * p.b0 * p.v0 / (p.b1 - 1.0).powi(2)
                        * (2.0
                            - (5.0 + 3.0 * p.b1 * (eta - 1.0) - 3.0 * eta)
                                * (-1.5 * (p.b1 - 1.0) * (eta - 1.0)).exp())
            }
        }
    }
}

impl fmt::Display for EosModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> EosParams {
        EosParams {
            e0: -40.0,
            b0: 0.48,
            b1: 4.6,
            v0: 171.5,
        }
    }

    #[test]
    fn every_model_attains_e0_at_v0() {
        let p = params();
        for model in EosModel::PREFERENCE_ORDER {
            assert!((model.energy(&p, p.v0) - p.e0).abs() < 1e-12, "{model}");
        }
    }

    #[test]
    fn every_model_is_convex_around_v0() {
        let p = params();
        for model in EosModel::PREFERENCE_ORDER {
            let below = model.energy(&p, p.v0 * 0.95);
            let above = model.energy(&p, p.v0 * 1.05);
            assert!(below > p.e0, "{model} below");
            assert!(above > p.e0, "{model} above");
        }
    }

    #[test]
    fn names_round_trip() {
        for model in EosModel::PREFERENCE_ORDER {
            assert_eq!(EosModel::from_name(model.name()), Some(model));
        }
        assert_eq!(EosModel::from_name("pourier_tarantola"), None);
    }
}
