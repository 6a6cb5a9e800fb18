use crate::vecmath::Vec3;
use serde::{Deserialize, Serialize};

/// How a particle came to exist in the run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Present from the start of the run, not produced by an impact.
    Seed,
    /// Emitted from a wall after another electron's impact.
    Secondary,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Seed => "seed",
            SourceKind::Secondary => "secondary",
        }
    }
}

/// One point of the electron-count-versus-time series.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationPoint {
    /// Time in ns.
    pub time: f64,
    /// Number of particles alive at that time.
    pub count: u32,
}

/// Scalar outputs of the exponential growth fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthMetrics {
    /// Exponential rate coefficient in 1/ns. Positive means the
    /// population is growing (the primary multipactor indicator).
    pub rate: f64,
    /// ln(N_0) intercept of the log-space fit.
    pub intercept: f64,
    /// Root-mean-square residual of ln(count) against the fit; small
    /// values mean the exponential model describes the data well.
    pub residual: f64,
    /// Start and end time of the auto-detected growth region (ns).
    pub region: (f64, f64),
    /// Detected multipactor order (ratio of discharge period to RF
    /// half-period), or None when the series shows no periodic
    /// resonance.
    pub order: Option<u32>,
}

/// One trajectory's point sequence, kept for external visualization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryTrace {
    pub particle_id: u64,
    pub points: Vec<Vec3>,
}

/// Bookkeeping counts of how every particle in the run was classified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticleCounts {
    pub total: u32,
    pub seeds: u32,
    pub secondaries: u32,
    pub collided: u32,
    pub escaped: u32,
    pub alive_at_end: u32,
}

/// Read-only aggregate of a complete analysis run, consumed by the
/// external visualization layer. Distributions are sorted ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Fitted growth rate in 1/ns; None when no growth region was found
    /// (population decayed immediately, "no multipactor").
    pub growth_rate: Option<f64>,
    /// RMS residual of the fit, when a fit succeeded.
    pub fit_residual: Option<f64>,
    /// Detected multipactor order; None when undefined.
    pub multipactor_order: Option<u32>,
    /// True when a growth region with a positive rate was found.
    pub multipactor_detected: bool,
    /// Impact energies in eV of all collided particles.
    pub impact_energies_ev: Vec<f64>,
    /// Impact angles in degrees, measured from the surface normal.
    pub impact_angles_deg: Vec<f64>,
    /// Emission energies in eV of secondary particles.
    pub emission_energies_ev: Vec<f64>,
    /// Number of recorded impacts on each mesh triangle, indexed like
    /// the mesh.
    pub impacts_per_triangle: Vec<u32>,
    /// Electron count versus time.
    pub population: Vec<PopulationPoint>,
    pub counts: ParticleCounts,
    #[serde(skip_serializing_if = "Option::is_none")] // Don't write "trajectories": null
    pub trajectories: Option<Vec<TrajectoryTrace>>,
}
