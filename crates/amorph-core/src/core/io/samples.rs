use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleIoError {
    #[error("I/O error accessing sample file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed sample record: {0}")]
    Csv(#[from] csv::Error),
}

/// One energy-volume sample as recorded on disk: the volume scale factor relative to
/// the reference structure, the resulting cell volume (Å³), the final potential
/// energy (eV), and the hydrostatic pressure (eV/Å³).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvSample {
    pub scale_factor: f64,
    pub volume: f64,
    pub energy: f64,
    pub pressure: f64,
}

/// Writes the full sample set to `path`, replacing any previous contents.
///
/// The search rewrites the whole table after each round rather than appending, so the
/// file always reflects exactly the points the fit saw.
pub fn write_samples(path: &Path, samples: &[EvSample]) -> Result<(), SampleIoError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a sample table previously written by [`write_samples`].
pub fn read_samples(path: &Path) -> Result<Vec<EvSample>, SampleIoError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut samples = Vec::new();
    for record in reader.deserialize() {
        samples.push(record?);
    }
    Ok(samples)
}
