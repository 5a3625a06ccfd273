//! The equilibrium-volume search state machine.
//!
//! Each round samples the three bracket volumes with trial MD, fits the accumulated
//! energy-volume points with the configured EOS models, and checks whether the fitted
//! minimum lies strictly inside the volume range sampled this round. A contained
//! minimum ends the search; an escaped one re-centres the bracket on the minimum and
//! tries again, up to the configured round limit. Points are never discarded, so each
//! round fits a richer data set than the last.

use super::config::SearchConfig;
use super::error::SearchError;
use super::progress::{Progress, ProgressReporter};
use super::runner::MdEngine;
use super::state::{Bracket, RecursionState, VolumeEnergyPoint};
use super::tasks::trial;
use crate::core::eos::fit::{self, EosFitResult};
use crate::core::io::samples;
use crate::core::models::structure::Structure;
use std::path::Path;
use tracing::{info, instrument, warn};

/// A converged search: the reference structure scaled to the fitted equilibrium
/// volume, the winning fit, and everything sampled along the way.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub structure: Structure,
    pub fit: EosFitResult,
    pub rounds: usize,
    pub points: Vec<VolumeEnergyPoint>,
}

#[instrument(skip_all, name = "volume_search")]
pub fn run(
    engine: &dyn MdEngine,
    reference: &Structure,
    config: &SearchConfig,
    workdir: &Path,
    reporter: &ProgressReporter,
) -> Result<SearchOutcome, SearchError> {
    let reference_volume = reference.volume();
    let model_names: Vec<&str> = config.eos_models.iter().map(String::as_str).collect();
    let mut state = RecursionState::new(Bracket::new(config.initial_scale_factors)?);

    loop {
        let round = state.round;
        reporter.report(Progress::RoundStart {
            round,
            max_rounds: config.max_rounds,
        });
        info!(
            round,
            factors = ?state.bracket.factors(),
            "Sampling volume bracket."
        );

        // A failed trial invalidates the whole round; only complete rounds are
        // ever fed to the fit, so the round's points stay local until then.
        let mut round_points = Vec::with_capacity(3);
        for (index, factor) in state.bracket.factors().into_iter().enumerate() {
            let trial_dir = workdir.join(format!("round_{round}")).join(format!("trial_{index}"));
            let point = match trial::run(engine, reference, factor, &config.md, &trial_dir) {
                Ok(point) => point,
                Err(source) => {
                    return Err(SearchError::Trial {
                        scale_factor: factor,
                        round,
                        source,
                        diagnostics: state.into_diagnostics(),
                    });
                }
            };
            reporter.report(Progress::TrialFinish {
                scale_factor: point.scale_factor,
                volume: point.volume,
                energy: point.energy,
            });
            round_points.push(point);
        }

        let (round_v_min, round_v_max) = round_points
            .iter()
            .map(|p| p.volume)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

        state.points.extend(round_points);
        state
            .points
            .sort_by(|a, b| a.volume.total_cmp(&b.volume));
        let table: Vec<_> = state.points.iter().map(VolumeEnergyPoint::as_sample).collect();
        samples::write_samples(&workdir.join("ev_samples.csv"), &table)?;

        let volumes: Vec<f64> = state.points.iter().map(|p| p.volume).collect();
        let energies: Vec<f64> = state.points.iter().map(|p| p.energy).collect();
        let outcomes = fit::fit(&volumes, &energies, &model_names)?;
        let selected = outcomes
            .iter()
            .find_map(|(name, outcome)| outcome.as_ref().ok().map(|fit| (name.clone(), *fit)));
        let Some((model_name, fit)) = selected else {
            let failures = outcomes
                .into_iter()
                .filter_map(|(name, outcome)| outcome.err().map(|e| (name, e)))
                .collect();
            return Err(SearchError::EosNonConvergence {
                failures,
                diagnostics: state.into_diagnostics(),
            });
        };
        reporter.report(Progress::FitSelected {
            model: model_name.clone(),
            v0: fit.v0,
        });
        info!(
            round,
            model = %model_name,
            v0 = fit.v0,
            b0_gpa = fit.b0_gpa(),
            "EOS fit selected."
        );

        if round_v_min < fit.v0 && fit.v0 < round_v_max {
            let structure = reference.scaled_to_volume(fit.v0)?;
            return Ok(SearchOutcome {
                structure,
                fit,
                rounds: round,
                points: state.points,
            });
        }

        if round >= config.max_rounds {
            return Err(SearchError::BracketNonConvergence {
                v0: fit.v0,
                rounds: round,
                diagnostics: state.into_diagnostics(),
            });
        }

        warn!(
            round,
            v0 = fit.v0,
            sampled_min = round_v_min,
            sampled_max = round_v_max,
            "Fitted minimum escaped the sampled bracket; re-centring."
        );
        state.bracket = state.bracket.recentered(fit.v0 / reference_volume)?;
        state.previous_v0 = Some(fit.v0);
        state.round += 1;
    }
}
