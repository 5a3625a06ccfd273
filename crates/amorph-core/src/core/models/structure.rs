use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructureError {
    #[error("structure must contain at least one site")]
    EmptyStructure,

    #[error("lattice is singular or inverted (signed volume {0})")]
    DegenerateLattice(f64),

    #[error("volume scale factor must be positive, got {0}")]
    NonPositiveScaleFactor(f64),

    #[error("target volume must be positive, got {0}")]
    NonPositiveVolume(f64),
}

/// Periodic cell described by three lattice vectors (rows of the matrix), in Å.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    matrix: Matrix3<f64>,
}

impl Lattice {
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn cubic(a: f64) -> Self {
        Self {
            matrix: Matrix3::from_diagonal(&Vector3::new(a, a, a)),
        }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Signed cell volume in Å³; negative for a left-handed vector set.
    pub fn volume(&self) -> f64 {
        self.matrix.determinant()
    }

    /// Multiplies every lattice vector by `linear`, scaling the volume by `linear³`.
    pub fn scaled(&self, linear: f64) -> Self {
        Self {
            matrix: self.matrix * linear,
        }
    }
}

/// A single atomic site: element symbol, Cartesian position (Å), optional velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub species: String,
    pub position: Point3<f64>,
    pub velocity: Option<Vector3<f64>>,
}

impl Site {
    pub fn new(species: impl Into<String>, position: Point3<f64>) -> Self {
        Self {
            species: species.into(),
            position,
            velocity: None,
        }
    }

    pub fn with_velocity(mut self, velocity: Vector3<f64>) -> Self {
        self.velocity = Some(velocity);
        self
    }
}

/// An immutable periodic atomic structure.
///
/// Workflow stages never mutate a structure in place; every transformation returns a
/// new value. Construction validates the two contract requirements of the workflow
/// layers: a non-empty site list and a strictly positive cell volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    lattice: Lattice,
    sites: Vec<Site>,
}

impl Structure {
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Result<Self, StructureError> {
        if sites.is_empty() {
            return Err(StructureError::EmptyStructure);
        }
        let volume = lattice.volume();
        if !(volume > 0.0) || !volume.is_finite() {
            return Err(StructureError::DegenerateLattice(volume));
        }
        Ok(Self { lattice, sites })
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    pub fn volume(&self) -> f64 {
        self.lattice.volume()
    }

    /// Isotropically scales the cell volume by `factor`.
    ///
    /// Each lattice vector and each Cartesian position is multiplied by
    /// `factor.cbrt()`, so fractional coordinates are preserved exactly. Velocities
    /// are carried over unchanged. Scaling by `factor` and then `1/factor` restores
    /// the original structure to floating-point tolerance.
    pub fn scaled_by(&self, factor: f64) -> Result<Self, StructureError> {
        if !(factor > 0.0) || !factor.is_finite() {
            return Err(StructureError::NonPositiveScaleFactor(factor));
        }
        let linear = factor.cbrt();
        let sites = self
            .sites
            .iter()
            .map(|site| Site {
                species: site.species.clone(),
                position: Point3::from(site.position.coords * linear),
                velocity: site.velocity,
            })
            .collect();
        Ok(Self {
            lattice: self.lattice.scaled(linear),
            sites,
        })
    }

    /// Scales the structure so its cell volume becomes `target` Å³.
    pub fn scaled_to_volume(&self, target: f64) -> Result<Self, StructureError> {
        if !(target > 0.0) || !target.is_finite() {
            return Err(StructureError::NonPositiveVolume(target));
        }
        self.scaled_by(target / self.volume())
    }
}
