use thiserror::Error;

/// Error taxonomy of the analysis engine.
///
/// Loader and geometry-construction errors are fatal to the call that
/// raised them and surface immediately; per-particle anomalies (grazing
/// incidence, escaped particles) are recorded as classification flags
/// instead and never abort a run.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("malformed record for particle {id}: time {time} does not increase past {previous}")]
    MalformedRecord { id: u64, previous: f64, time: f64 },

    #[error("duplicate particle {id}: identity class changed between loads ({existing} vs {incoming})")]
    DuplicateParticle {
        id: u64,
        existing: &'static str,
        incoming: &'static str,
    },

    #[error("degenerate triangle at index {index}: area {area:.3e} is below tolerance")]
    DegenerateTriangle { index: usize, area: f64 },

    #[error("insufficient data for growth fit: {reason}")]
    InsufficientData { reason: String },

    // Tie at identical parametric t is resolved deterministically by
    // lowest triangle index; this variant documents the rule and is
    // never constructed in normal operation.
    #[error("ambiguous intersection at t = {t}: triangles {first} and {second}")]
    GeometryAmbiguity { t: f64, first: usize, second: usize },
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
