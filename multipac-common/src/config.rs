use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Input file locations for the batch run
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InputConfig {
    /// CSV file of normalized particle records (id, time, position, velocity).
    pub records: String,
    /// CSV file of mesh triangles (nine floats per row, three vertices).
    pub mesh: String,
}

// Parameters of the exponential growth fit and order detection
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FitConfig {
    /// RF period in ns. Order detection and running-mean smoothing both
    /// need it; the discharge resonates at integer multiples of the
    /// half-period.
    pub rf_period_ns: f64,
    /// Tolerance on the local slope of ln(count) when detecting the
    /// growth region. A point extends the region while its slope stays
    /// above -slope_tolerance (1/ns).
    #[serde(default = "default_slope_tolerance")]
    pub slope_tolerance: f64,
    /// Minimum number of population points the growth region must span.
    #[serde(default = "default_min_window")]
    pub min_window: usize,
    /// Average the population over one RF period before fitting.
    /// Strongly recommended; the per-period oscillation otherwise
    /// leaks into the fitted rate.
    #[serde(default = "default_running_mean")]
    pub running_mean: bool,
    /// Remove trailing points where the population is zero before
    /// fitting (decayed discharges record long zero tails).
    #[serde(default = "default_trim_trailing")]
    pub trim_trailing: bool,
    /// Largest multipactor order considered by the periodicity search.
    #[serde(default = "default_max_order")]
    pub max_order: u32,
    /// Autocorrelation level above which a periodicity peak counts as
    /// a resonance.
    #[serde(default = "default_order_threshold")]
    pub order_threshold: f64,
}

fn default_slope_tolerance() -> f64 {
    0.1 // 1/ns; permissive enough to ride through one-period dips
}

fn default_min_window() -> usize {
    8
}

fn default_running_mean() -> bool {
    true
}

fn default_trim_trailing() -> bool {
    true
}

fn default_max_order() -> u32 {
    8
}

fn default_order_threshold() -> f64 {
    0.5
}

// Parameters of the segment-triangle intersection tests
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GeometryConfig {
    /// Tolerance of the intersection test. Hits within epsilon of a
    /// triangle edge are accepted; determinants below epsilon are
    /// treated as parallel (no intersection).
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Two sample times closer than this are considered simultaneous
    /// (alive-at-end detection, seed classification).
    #[serde(default = "default_time_tolerance")]
    pub time_tolerance: f64,
}

fn default_epsilon() -> f64 {
    1e-6
}

fn default_time_tolerance() -> f64 {
    1e-6
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    /// Output format: "json", "bincode", "messagepack"
    pub format: Option<String>,
    /// Include per-particle trajectory point sequences in the report
    /// (can be very large).
    #[serde(default)]
    pub save_trajectories: bool,
    /// Also write the energy/angle distributions as flat CSV files.
    #[serde(default = "default_save_distributions")]
    pub save_distributions: bool,
}

fn default_save_distributions() -> bool {
    true
}

// Main analysis configuration structure, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AnalysisConfig {
    pub input: InputConfig,
    pub fit: FitConfig,
    #[serde(default)]
    pub geometry: GeometryConfig,
    pub output: OutputConfig,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        GeometryConfig {
            epsilon: default_epsilon(),
            time_tolerance: default_time_tolerance(),
        }
    }
}

impl AnalysisConfig {
    /// Loads the analysis configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config: AnalysisConfig = toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the numeric parameters for obvious misconfiguration.
    pub fn validate(&self) -> Result<()> {
        if self.fit.rf_period_ns <= 0.0 {
            anyhow::bail!("rf_period_ns must be positive.");
        }
        if self.fit.slope_tolerance < 0.0 {
            anyhow::bail!("slope_tolerance must be non-negative.");
        }
        if self.fit.min_window < 2 {
            anyhow::bail!("min_window must be at least 2 (a slope needs two points).");
        }
        if self.geometry.epsilon <= 0.0 {
            anyhow::bail!("geometry epsilon must be positive.");
        }
        if self.fit.max_order == 0 {
            anyhow::bail!("max_order must be at least 1.");
        }
        Ok(())
    }
}
