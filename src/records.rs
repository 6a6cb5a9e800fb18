use anyhow::{Context, Result};
use multipac_common::Vec3;
use serde::Deserialize;
use std::path::Path;

/// One normalized particle record, the shape every external loader
/// produces. The engine never sees the simulation tools' native export
/// formats, only this tuple.
///
/// Times are in ns, positions in mm, velocities in mm/ns.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    pub particle_id: u64,
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    /// 0 = seed electron, 1 = emitted secondary. Optional: the
    /// frequency-domain tool does not export it and the engine then
    /// derives the class from the first sample time.
    #[serde(default)]
    pub source_id: Option<u8>,
    /// Per-sample state flag: "alive" (default), "emitted", "collided".
    #[serde(default)]
    pub flag: Option<String>,
}

impl RawRecord {
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::new(self.vx, self.vy, self.vz)
    }
}

/// Reads normalized records from a headered CSV file.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<RawRecord>> {
    let path_ref = path.as_ref();
    let mut reader = csv::Reader::from_path(path_ref)
        .with_context(|| format!("Failed to open records file '{}'", path_ref.display()))?;

    let mut records = Vec::new();
    for (line, row) in reader.deserialize().enumerate() {
        let record: RawRecord = row
            .with_context(|| format!("Bad record at line {} of '{}'", line + 2, path_ref.display()))?;
        records.push(record);
    }
    Ok(records)
}

/// Reads mesh triangles from a headerless CSV file, nine floats per
/// row (three vertices). Mesh-file ingestion proper (STL and friends)
/// is an external collaborator; this is only the hand-off shape.
pub fn read_mesh<P: AsRef<Path>>(path: P) -> Result<Vec<[Vec3; 3]>> {
    let path_ref = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path_ref)
        .with_context(|| format!("Failed to open mesh file '{}'", path_ref.display()))?;

    let mut triangles = Vec::new();
    for (line, row) in reader.deserialize().enumerate() {
        let v: [f64; 9] = row
            .with_context(|| format!("Bad triangle at line {} of '{}'", line + 1, path_ref.display()))?;
        triangles.push([
            Vec3::new(v[0], v[1], v[2]),
            Vec3::new(v[3], v[4], v[5]),
            Vec3::new(v[6], v[7], v[8]),
        ]);
    }
    Ok(triangles)
}
