use crate::records::RawRecord;
use log::debug;
use multipac_common::constants::electron_kinetic_energy_ev;
use multipac_common::{AnalysisError, AnalysisResult, SourceKind, Vec3};
use std::collections::BTreeMap;

/// Per-sample state recorded by the position monitor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleFlag {
    Alive,
    /// The particle was spawned at this sample (secondary emission).
    Emitted,
    /// The particle struck a wall at this sample; its alive interval
    /// ends here even if noise samples follow.
    Collided,
}

/// One time-position-velocity sample of a particle trajectory.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sample {
    /// Time in ns, non-negative, strictly increasing per particle.
    pub time: f64,
    /// Position in mm.
    pub position: Vec3,
    /// Velocity in mm/ns.
    pub velocity: Vec3,
    pub flag: SampleFlag,
}

/// A particle's identity and its ordered sample sequence. Immutable
/// once the store is finalized.
#[derive(Debug, Clone)]
pub struct Particle {
    id: u64,
    /// Identity class declared by the loader, when the source tool
    /// exports one.
    declared: Option<SourceKind>,
    /// Resolved identity class (declared, or derived from the first
    /// sample time at finalization).
    source: SourceKind,
    samples: Vec<Sample>,
}

impl Particle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn first_time(&self) -> f64 {
        self.samples.first().map(|s| s.time).unwrap_or(0.0)
    }

    pub fn last_time(&self) -> f64 {
        self.samples.last().map(|s| s.time).unwrap_or(0.0)
    }

    /// End of the alive interval: the first sample explicitly flagged
    /// as collided, else the last sample time.
    pub fn terminal_time(&self) -> f64 {
        self.samples
            .iter()
            .find(|s| s.flag == SampleFlag::Collided)
            .map(|s| s.time)
            .unwrap_or_else(|| self.last_time())
    }

    /// Kinetic energy in eV at the first sample.
    pub fn emission_energy_ev(&self) -> f64 {
        let speed = self
            .samples
            .first()
            .map(|s| s.velocity.length())
            .unwrap_or(0.0);
        electron_kinetic_energy_ev(speed)
    }
}

/// In-memory indexed collection of all particle trajectories of a run.
/// Built once from loader records; read-only afterwards.
#[derive(Debug)]
pub struct TrajectoryStore {
    particles: BTreeMap<u64, Particle>,
    /// Earliest sample time of the run.
    run_start: f64,
    /// Latest sample time of the run (end of simulation).
    max_time: f64,
    /// Two times closer than this are considered simultaneous.
    time_tolerance: f64,
    // Sorted alive-interval bounds, rebuilt at finalization, so that
    // count_alive_at is a pair of binary searches.
    alive_starts: Vec<f64>,
    alive_ends: Vec<f64>,
}

impl TrajectoryStore {
    /// Builds a store from a batch of normalized loader records.
    pub fn load(records: &[RawRecord], time_tolerance: f64) -> AnalysisResult<Self> {
        let mut store = TrajectoryStore {
            particles: BTreeMap::new(),
            run_start: 0.0,
            max_time: 0.0,
            time_tolerance,
            alive_starts: Vec::new(),
            alive_ends: Vec::new(),
        };
        store.extend(records)?;
        Ok(store)
    }

    /// Merges another batch of records, e.g. the second simulation
    /// tool's export for the same run. A failed extend leaves the
    /// prior state untouched.
    pub fn extend(&mut self, records: &[RawRecord]) -> AnalysisResult<()> {
        let mut staged = self.particles.clone();

        for record in records {
            let incoming = record.source_id.map(|s| match s {
                0 => SourceKind::Seed,
                _ => SourceKind::Secondary,
            });
            let sample = Sample {
                time: record.time,
                position: record.position(),
                velocity: record.velocity(),
                flag: parse_flag(record.flag.as_deref()),
            };

            match staged.get_mut(&record.particle_id) {
                Some(particle) => {
                    // Two loads must agree on the identity class of a
                    // shared id.
                    if let (Some(existing), Some(new)) = (particle.declared, incoming) {
                        if existing != new {
                            return Err(AnalysisError::DuplicateParticle {
                                id: record.particle_id,
                                existing: existing.as_str(),
                                incoming: new.as_str(),
                            });
                        }
                    }
                    if particle.declared.is_none() {
                        particle.declared = incoming;
                    }
                    particle.samples.push(sample);
                }
                None => {
                    staged.insert(
                        record.particle_id,
                        Particle {
                            id: record.particle_id,
                            declared: incoming,
                            source: incoming.unwrap_or(SourceKind::Seed),
                            samples: vec![sample],
                        },
                    );
                }
            }
        }

        // Per-particle monotonic-time invariant.
        for particle in staged.values() {
            for pair in particle.samples.windows(2) {
                if pair[1].time <= pair[0].time {
                    return Err(AnalysisError::MalformedRecord {
                        id: particle.id,
                        previous: pair[0].time,
                        time: pair[1].time,
                    });
                }
            }
        }

        self.particles = staged;
        self.finalize();
        Ok(())
    }

    /// Recomputes run bounds, resolves seed/secondary classes and
    /// rebuilds the sorted alive-interval arrays.
    fn finalize(&mut self) {
        self.run_start = self
            .particles
            .values()
            .map(|p| p.first_time())
            .fold(f64::INFINITY, f64::min);
        if !self.run_start.is_finite() {
            self.run_start = 0.0;
        }
        self.max_time = self
            .particles
            .values()
            .map(|p| p.last_time())
            .fold(0.0, f64::max);

        let run_start = self.run_start;
        let tol = self.time_tolerance;
        for particle in self.particles.values_mut() {
            particle.source = particle.declared.unwrap_or({
                if particle.first_time() <= run_start + tol {
                    SourceKind::Seed
                } else {
                    SourceKind::Secondary
                }
            });
        }

        self.alive_starts = self.particles.values().map(|p| p.first_time()).collect();
        self.alive_ends = self.particles.values().map(|p| p.terminal_time()).collect();
        self.alive_starts.sort_by(f64::total_cmp);
        self.alive_ends.sort_by(f64::total_cmp);

        debug!(
            "Store finalized: {} particles, run [{:.3}, {:.3}] ns",
            self.particles.len(),
            self.run_start,
            self.max_time
        );
    }

    pub fn samples_for(&self, id: u64) -> Option<&[Sample]> {
        self.particles.get(&id).map(|p| p.samples())
    }

    pub fn all_ids(&self) -> Vec<u64> {
        self.particles.keys().copied().collect()
    }

    pub fn particles(&self) -> impl Iterator<Item = &Particle> {
        self.particles.values()
    }

    pub fn get(&self, id: u64) -> Option<&Particle> {
        self.particles.get(&id)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn run_start(&self) -> f64 {
        self.run_start
    }

    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    pub fn time_tolerance(&self) -> f64 {
        self.time_tolerance
    }

    /// Number of particles alive at time `t`: those whose alive
    /// interval `[first sample, terminal event]` contains `t`.
    pub fn count_alive_at(&self, t: f64) -> u32 {
        let started = self.alive_starts.partition_point(|&s| s <= t);
        let ended = self.alive_ends.partition_point(|&e| e < t);
        (started - ended) as u32
    }

    /// True when the particle survived to the end of the run (its last
    /// sample is within tolerance of the run end and it never collided).
    pub fn is_alive_at_end(&self, particle: &Particle) -> bool {
        (self.max_time - particle.last_time()).abs() < self.time_tolerance
            && !particle
                .samples()
                .iter()
                .any(|s| s.flag == SampleFlag::Collided)
    }
}

fn parse_flag(flag: Option<&str>) -> SampleFlag {
    match flag {
        Some("emitted") => SampleFlag::Emitted,
        Some("collided") => SampleFlag::Collided,
        _ => SampleFlag::Alive,
    }
}
