pub mod config;
pub mod constants;
pub mod error;
pub mod report;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{AnalysisConfig, FitConfig, GeometryConfig, InputConfig, OutputConfig};
pub use error::{AnalysisError, AnalysisResult};
pub use report::{
    AnalysisReport, GrowthMetrics, ParticleCounts, PopulationPoint, SourceKind, TrajectoryTrace,
};
pub use vecmath::Vec3;
