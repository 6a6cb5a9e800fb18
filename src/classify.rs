//! Collision classification: walks every trajectory against the wall
//! mesh and produces per-particle collision and emission events.

use crate::geometry::{CollisionGeometry, Segment};
use crate::store::{Particle, TrajectoryStore};
use log::{debug, warn};
use multipac_common::constants::electron_kinetic_energy_ev;
use multipac_common::{SourceKind, Vec3};
use rayon::prelude::*;

/// Velocity directions with |v̂ · n̂| below this are treated as exactly
/// tangential (impact angle 90°, low confidence).
const GRAZING_COS: f64 = 1e-6;

/// A wall impact of one particle.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionEvent {
    pub particle_id: u64,
    /// Impact time in ns, interpolated along the hit segment.
    pub time: f64,
    /// Impact point on the mesh, in mm.
    pub point: Vec3,
    pub triangle_index: usize,
    /// Angle between the incoming velocity and the surface normal,
    /// in [0°, 90°].
    pub impact_angle_deg: f64,
    /// Kinetic energy in eV at the pre-collision sample. The velocity
    /// is not interpolated to the exact collision instant; the last
    /// sample before the wall is close enough at simulation timesteps.
    pub impact_energy_ev: f64,
    /// True for tangential (grazing) incidence; the angle is then a
    /// low-confidence 90°.
    pub grazing: bool,
}

/// Birth record of a secondary particle, taken from its first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionEvent {
    pub particle_id: u64,
    pub time: f64,
    pub position: Vec3,
    pub energy_ev: f64,
}

/// Aggregate outcome of a classification pass. Event vectors are
/// sorted by particle id, so re-running on the same inputs yields an
/// identical result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub collisions: Vec<CollisionEvent>,
    pub emissions: Vec<EmissionEvent>,
    /// Particles that left the domain without striking the mesh.
    pub escaped: Vec<u64>,
    /// Particles still alive when the simulation ended.
    pub alive_at_end: Vec<u64>,
}

enum Outcome {
    Collided(CollisionEvent),
    Escaped(u64),
    AliveAtEnd(u64),
}

/// Classifies every trajectory of the store against the mesh.
///
/// Particles are independent, so the walk runs in parallel; the store
/// and the geometry are immutable and shared read-only.
pub fn classify(store: &TrajectoryStore, geometry: &CollisionGeometry) -> Classification {
    let particles: Vec<&Particle> = store.particles().collect();

    let per_particle: Vec<(Outcome, Option<EmissionEvent>)> = particles
        .par_iter()
        .map(|particle| {
            let outcome = walk_trajectory(particle, store, geometry);
            let emission = match particle.source() {
                SourceKind::Secondary => particle.samples().first().map(|first| EmissionEvent {
                    particle_id: particle.id(),
                    time: first.time,
                    position: first.position,
                    energy_ev: particle.emission_energy_ev(),
                }),
                SourceKind::Seed => None,
            };
            (outcome, emission)
        })
        .collect();

    let mut result = Classification::default();
    for (outcome, emission) in per_particle {
        match outcome {
            Outcome::Collided(event) => result.collisions.push(event),
            Outcome::Escaped(id) => result.escaped.push(id),
            Outcome::AliveAtEnd(id) => result.alive_at_end.push(id),
        }
        if let Some(event) = emission {
            result.emissions.push(event);
        }
    }

    debug!(
        "Classified {} particles: {} collided, {} escaped, {} alive at end, {} emissions",
        particles.len(),
        result.collisions.len(),
        result.escaped.len(),
        result.alive_at_end.len(),
        result.emissions.len()
    );
    result
}

/// Walks one trajectory pairwise as segments; the first segment that
/// crosses the mesh terminates the particle there. Later samples (if
/// any, residual noise past the wall) are ignored.
fn walk_trajectory(
    particle: &Particle,
    store: &TrajectoryStore,
    geometry: &CollisionGeometry,
) -> Outcome {
    let samples = particle.samples();

    for pair in samples.windows(2) {
        let segment = Segment::new(pair[0].position, pair[1].position);
        if let Some(hit) = geometry.first_intersection(&segment) {
            let velocity = pair[0].velocity;
            let normal = geometry.triangles()[hit.triangle_index].normal;
            let cosine = velocity.normalize_or_zero().dot(normal).abs();
            let grazing = cosine < GRAZING_COS;
            if grazing {
                warn!(
                    "Particle {}: tangential incidence on triangle {}, angle reported as 90° with low confidence",
                    particle.id(),
                    hit.triangle_index
                );
            }

            let impact_angle_deg = cosine.clamp(0.0, 1.0).acos().to_degrees();
            let time = pair[0].time + hit.t * (pair[1].time - pair[0].time);
            return Outcome::Collided(CollisionEvent {
                particle_id: particle.id(),
                time,
                point: hit.point,
                triangle_index: hit.triangle_index,
                impact_angle_deg,
                impact_energy_ev: electron_kinetic_energy_ev(velocity.length()),
                grazing,
            });
        }
    }

    // A trajectory with a single sample has no segment and can never
    // collide.
    if store.is_alive_at_end(particle) {
        Outcome::AliveAtEnd(particle.id())
    } else {
        Outcome::Escaped(particle.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RawRecord;
    use approx::assert_relative_eq;
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

    fn unit_wall() -> CollisionGeometry {
        // [0,1]x[0,1] wall at z = 0.
        CollisionGeometry::build(
            &[
                [
                    Vec3::new(0.0, 0.0, 0.0),
                    Vec3::new(1.0, 0.0, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                ],
                [
                    Vec3::new(1.0, 0.0, 0.0),
                    Vec3::new(1.0, 1.0, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                ],
            ],
            1e-6,
        )
        .unwrap()
    }

    #[test]
    fn normal_incidence_has_zero_impact_angle() {
        let records = vec![
            record(7, 0.0, [0.5, 0.5, 1.0], [0.0, 0.0, -1.0]),
            record(7, 2.0, [0.5, 0.5, -1.0], [0.0, 0.0, -1.0]),
        ];
        let store = TrajectoryStore::load(&records, 1e-6).unwrap();
        let result = classify(&store, &unit_wall());

        assert_eq!(result.collisions.len(), 1);
        let event = &result.collisions[0];
        assert_eq!(event.particle_id, 7);
        assert_relative_eq!(event.impact_angle_deg, 0.0, epsilon = 1e-9);
        assert_relative_eq!(event.point.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(event.point.y, 0.5, epsilon = 1e-9);
        assert_relative_eq!(event.point.z, 0.0, epsilon = 1e-9);
        assert_relative_eq!(event.time, 1.0, epsilon = 1e-9);
        assert_relative_eq!(
            event.impact_energy_ev,
            electron_kinetic_energy_ev(1.0),
            max_relative = 1e-12
        );
        assert!(!event.grazing);
    }

    #[test]
    fn oblique_incidence_angle_is_measured_from_the_normal() {
        // 45° in the x-z plane.
        let records = vec![
            record(1, 0.0, [0.2, 0.5, 0.5], [1.0, 0.0, -1.0]),
            record(1, 1.0, [0.7, 0.5, 0.0], [1.0, 0.0, -1.0]),
            record(1, 2.0, [1.2, 0.5, -0.5], [1.0, 0.0, -1.0]),
        ];
        let store = TrajectoryStore::load(&records, 1e-6).unwrap();
        let result = classify(&store, &unit_wall());

        assert_eq!(result.collisions.len(), 1);
        assert_relative_eq!(result.collisions[0].impact_angle_deg, 45.0, epsilon = 1e-6);
    }

    #[test]
    fn tangential_incidence_is_reported_as_grazing_at_90_degrees() {
        // Velocity lies in the wall plane while the sampled positions
        // dip through it: the impact is kept, flagged, and reported at
        // the 90° limit.
        let records = vec![
            record(4, 0.0, [0.4, 0.5, 0.5], [1.0, 0.0, 0.0]),
            record(4, 1.0, [0.5, 0.5, -0.5], [1.0, 0.0, 0.0]),
        ];
        let store = TrajectoryStore::load(&records, 1e-6).unwrap();
        let result = classify(&store, &unit_wall());

        assert_eq!(result.collisions.len(), 1);
        let event = &result.collisions[0];
        assert!(event.grazing);
        assert_relative_eq!(event.impact_angle_deg, 90.0, epsilon = 1e-9);
        assert_relative_eq!(event.point.z, 0.0, epsilon = 1e-9);
        assert_relative_eq!(
            event.impact_energy_ev,
            electron_kinetic_energy_ev(1.0),
            max_relative = 1e-12
        );
    }

    #[test]
    fn single_sample_particle_never_collides() {
        let records = vec![record(3, 0.0, [0.5, 0.5, 0.5], [0.0, 0.0, -1.0])];
        let store = TrajectoryStore::load(&records, 1e-6).unwrap();
        let result = classify(&store, &unit_wall());

        assert!(result.collisions.is_empty());
        assert_eq!(result.alive_at_end, vec![3]);
    }

    #[test]
    fn interior_ending_trajectory_is_escaped() {
        let records = vec![
            // Moves away from the wall and stops before the run ends.
            record(1, 0.0, [0.5, 0.5, 0.5], [0.0, 0.0, 1.0]),
            record(1, 1.0, [0.5, 0.5, 1.5], [0.0, 0.0, 1.0]),
            // A second particle defines the end of the run.
            record(2, 0.0, [5.0, 5.0, 5.0], [0.0, 0.0, 0.0]),
            record(2, 10.0, [5.0, 5.0, 5.0], [0.0, 0.0, 0.0]),
        ];
        let store = TrajectoryStore::load(&records, 1e-6).unwrap();
        let result = classify(&store, &unit_wall());

        assert!(result.collisions.is_empty());
        assert_eq!(result.escaped, vec![1]);
        assert_eq!(result.alive_at_end, vec![2]);
    }

    #[test]
    fn secondary_particles_carry_an_emission_event() {
        let mut first = record(9, 4.0, [0.5, 0.5, 0.8], [0.0, 0.0, -2.0]);
        first.source_id = Some(1);
        let mut second = record(9, 5.0, [0.5, 0.5, -1.2], [0.0, 0.0, -2.0]);
        second.source_id = Some(1);
        let records = vec![
            record(1, 0.0, [5.0, 5.0, 5.0], [0.0, 0.0, 0.0]),
            record(1, 5.0, [5.0, 5.0, 5.0], [0.0, 0.0, 0.0]),
            first,
            second,
        ];
        let store = TrajectoryStore::load(&records, 1e-6).unwrap();
        let result = classify(&store, &unit_wall());

        assert_eq!(result.emissions.len(), 1);
        let emission = &result.emissions[0];
        assert_eq!(emission.particle_id, 9);
        assert_relative_eq!(emission.time, 4.0, epsilon = 1e-12);
        assert_relative_eq!(
            emission.energy_ev,
            electron_kinetic_energy_ev(2.0),
            max_relative = 1e-12
        );
        // The secondary also strikes the wall.
        assert_eq!(result.collisions.len(), 1);
        assert_eq!(result.collisions[0].particle_id, 9);
    }

    #[test]
    fn classification_is_idempotent() {
        let records = vec![
            record(1, 0.0, [0.5, 0.5, 1.0], [0.0, 0.0, -1.0]),
            record(1, 2.0, [0.5, 0.5, -1.0], [0.0, 0.0, -1.0]),
            record(2, 0.0, [0.2, 0.2, 2.0], [0.1, 0.0, -1.0]),
            record(2, 1.0, [0.3, 0.2, 1.0], [0.1, 0.0, -1.0]),
            record(2, 2.0, [0.4, 0.2, 0.0], [0.1, 0.0, -1.0]),
        ];
        let store = TrajectoryStore::load(&records, 1e-6).unwrap();
        let geometry = unit_wall();

        let first = classify(&store, &geometry);
        let second = classify(&store, &geometry);
        assert_eq!(first, second);
    }
}
