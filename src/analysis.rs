//! Final aggregation of a run into the read-only report consumed by
//! the external visualization layer. Pure bookkeeping, no new
//! numerics; failures can only propagate from upstream stages.

use crate::classify::Classification;
use crate::population::PopulationSeries;
use crate::store::TrajectoryStore;
use multipac_common::{
    AnalysisReport, GrowthMetrics, ParticleCounts, SourceKind, TrajectoryTrace,
};

/// Builds the aggregate report. `metrics` is None when the growth fit
/// found no region ("no multipactor"); the report then carries the
/// distributions with an undefined growth rate.
pub fn build_report(
    store: &TrajectoryStore,
    series: &PopulationSeries,
    metrics: Option<&GrowthMetrics>,
    classification: &Classification,
    mesh_len: usize,
    save_trajectories: bool,
) -> AnalysisReport {
    let mut impact_energies_ev: Vec<f64> = classification
        .collisions
        .iter()
        .map(|c| c.impact_energy_ev)
        .collect();
    let mut impact_angles_deg: Vec<f64> = classification
        .collisions
        .iter()
        .map(|c| c.impact_angle_deg)
        .collect();
    let mut emission_energies_ev: Vec<f64> = classification
        .emissions
        .iter()
        .map(|e| e.energy_ev)
        .collect();
    impact_energies_ev.sort_by(f64::total_cmp);
    impact_angles_deg.sort_by(f64::total_cmp);
    emission_energies_ev.sort_by(f64::total_cmp);

    let mut impacts_per_triangle = vec![0u32; mesh_len];
    for collision in &classification.collisions {
        impacts_per_triangle[collision.triangle_index] += 1;
    }

    let counts = ParticleCounts {
        total: store.len() as u32,
        seeds: store
            .particles()
            .filter(|p| p.source() == SourceKind::Seed)
            .count() as u32,
        secondaries: store
            .particles()
            .filter(|p| p.source() == SourceKind::Secondary)
            .count() as u32,
        collided: classification.collisions.len() as u32,
        escaped: classification.escaped.len() as u32,
        alive_at_end: classification.alive_at_end.len() as u32,
    };

    let trajectories = save_trajectories.then(|| {
        store
            .particles()
            .map(|p| TrajectoryTrace {
                particle_id: p.id(),
                points: p.samples().iter().map(|s| s.position).collect(),
            })
            .collect()
    });

    AnalysisReport {
        growth_rate: metrics.map(|m| m.rate),
        fit_residual: metrics.map(|m| m.residual),
        multipactor_order: metrics.and_then(|m| m.order),
        multipactor_detected: metrics.map_or(false, |m| m.rate > 0.0),
        impact_energies_ev,
        impact_angles_deg,
        emission_energies_ev,
        impacts_per_triangle,
        population: series.points().to_vec(),
        counts,
        trajectories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify, Classification};
    use crate::geometry::CollisionGeometry;
    use crate::records::RawRecord;
    use multipac_common::Vec3;

    fn record(id: u64, time: f64, pos: [f64; 3], vel: [f64; 3]) -> RawRecord {
        RawRecord {
            particle_id: id,
            time,
            x: pos[0],
            y: pos[1],
            z: pos[2],
            vx: vel[0],
            vy: vel[1],
            vz: vel[2],
            source_id: None,
            flag: None,
        }
    }

    fn small_run() -> (TrajectoryStore, CollisionGeometry, Classification) {
        let records = vec![
            record(1, 0.0, [0.5, 0.5, 1.0], [0.0, 0.0, -1.0]),
            record(1, 2.0, [0.5, 0.5, -1.0], [0.0, 0.0, -1.0]),
            record(2, 0.0, [0.2, 0.2, 1.0], [0.0, 0.0, 1.0]),
            record(2, 2.0, [0.2, 0.2, 3.0], [0.0, 0.0, 1.0]),
        ];
        let store = TrajectoryStore::load(&records, 1e-6).unwrap();
        let geometry = CollisionGeometry::build(
            &[[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ]],
            1e-6,
        )
        .unwrap();
        let classification = classify(&store, &geometry);
        (store, geometry, classification)
    }

    #[test]
    fn report_aggregates_counts_and_distributions() {
        let (store, geometry, classification) = small_run();
        let series = PopulationSeries::from_store(&store);
        let report = build_report(&store, &series, None, &classification, geometry.len(), false);

        assert_eq!(report.counts.total, 2);
        assert_eq!(report.counts.seeds, 2);
        assert_eq!(report.counts.collided, 1);
        assert_eq!(report.impact_energies_ev.len(), 1);
        assert_eq!(report.impacts_per_triangle, vec![1]);
        assert!(!report.multipactor_detected);
        assert!(report.growth_rate.is_none());
        assert!(report.trajectories.is_none());
    }

    #[test]
    fn trajectories_are_included_on_request() {
        let (store, geometry, classification) = small_run();
        let series = PopulationSeries::from_store(&store);
        let report = build_report(&store, &series, None, &classification, geometry.len(), true);

        let traces = report.trajectories.unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].particle_id, 1);
        assert_eq!(traces[0].points.len(), 2);
    }

    #[test]
    fn distributions_are_sorted() {
        let (store, geometry, mut classification) = small_run();
        // Force an out-of-order second collision entry.
        let mut extra = classification.collisions[0].clone();
        extra.impact_energy_ev = classification.collisions[0].impact_energy_ev / 2.0;
        extra.impact_angle_deg = 10.0;
        classification.collisions.push(extra);

        let series = PopulationSeries::from_store(&store);
        let report = build_report(&store, &series, None, &classification, geometry.len(), false);
        assert!(report.impact_energies_ev[0] <= report.impact_energies_ev[1]);
        assert!(report.impact_angles_deg[0] <= report.impact_angles_deg[1]);
    }
}
