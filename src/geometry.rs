use multipac_common::{AnalysisError, AnalysisResult, Vec3};

/// Triangle area below this is considered degenerate regardless of the
/// configured intersection epsilon.
const MIN_TRIANGLE_AREA: f64 = 1e-12;

/// One triangular cell of the device-wall mesh, with its derived
/// outward unit normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub normal: Vec3,
}

/// A directed line segment, one sub-step of a particle trajectory.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Segment {
    pub start: Vec3,
    pub end: Vec3,
}

impl Segment {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Segment { start, end }
    }

    pub fn direction(&self) -> Vec3 {
        self.end - self.start
    }
}

/// Result of a segment-mesh intersection query.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Hit {
    pub triangle_index: usize,
    pub point: Vec3,
    /// Parametric position of the hit along the segment, in [0, 1].
    pub t: f64,
}

/// Immutable triangulated boundary mesh plus the precomputed data the
/// intersection test needs. Shared read-only across all trajectory
/// queries, safe to use from parallel workers.
#[derive(Debug)]
pub struct CollisionGeometry {
    triangles: Vec<Triangle>,
    edges1: Vec<Vec3>,
    edges2: Vec<Vec3>,
    epsilon: f64,
}

impl CollisionGeometry {
    /// Validates triangle non-degeneracy and precomputes normals and
    /// edge vectors. Fails on the first zero-area triangle.
    pub fn build(vertices: &[[Vec3; 3]], epsilon: f64) -> AnalysisResult<Self> {
        let mut triangles = Vec::with_capacity(vertices.len());
        let mut edges1 = Vec::with_capacity(vertices.len());
        let mut edges2 = Vec::with_capacity(vertices.len());

        for (index, [v0, v1, v2]) in vertices.iter().copied().enumerate() {
            let edge1 = v1 - v0;
            let edge2 = v2 - v0;
            let cross = edge1.cross(edge2);
            let area = 0.5 * cross.length();
            if area < MIN_TRIANGLE_AREA {
                return Err(AnalysisError::DegenerateTriangle { index, area });
            }
            triangles.push(Triangle {
                v0,
                v1,
                v2,
                normal: cross.normalize_or_zero(),
            });
            edges1.push(edge1);
            edges2.push(edge2);
        }

        Ok(CollisionGeometry {
            triangles,
            edges1,
            edges2,
            epsilon,
        })
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Finds the earliest intersection of the segment with the mesh,
    /// i.e. the hit with the smallest parametric t in [0, 1].
    ///
    /// Möller–Trumbore test per triangle. Barycentric coordinates
    /// within epsilon of an edge are accepted to avoid false negatives
    /// from floating-point boundary cases; determinants below epsilon
    /// (segment parallel to the triangle plane) count as no
    /// intersection. Ties at identical t keep the lowest triangle
    /// index: the scan replaces the best hit only on strictly smaller t.
    pub fn first_intersection(&self, segment: &Segment) -> Option<Hit> {
        let direction = segment.direction();
        let eps = self.epsilon;
        let mut best: Option<Hit> = None;

        for index in 0..self.triangles.len() {
            let edge1 = self.edges1[index];
            let edge2 = self.edges2[index];
            let v0 = self.triangles[index].v0;

            let pvec = direction.cross(edge2);
            let det = edge1.dot(pvec);
            if det.abs() < eps {
                continue;
            }
            let inv_det = 1.0 / det;

            let tvec = segment.start - v0;
            let u = tvec.dot(pvec) * inv_det;
            if u < -eps || u > 1.0 + eps {
                continue;
            }

            let qvec = tvec.cross(edge1);
            let v = direction.dot(qvec) * inv_det;
            if v < -eps || u + v > 1.0 + eps {
                continue;
            }

            let t = edge2.dot(qvec) * inv_det;
            if t < -eps || t > 1.0 + eps {
                continue;
            }
            let t = t.clamp(0.0, 1.0);

            if best.map_or(true, |hit| t < hit.t) {
                best = Some(Hit {
                    triangle_index: index,
                    point: segment.start + direction * t,
                    t,
                });
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_triangle_at_z0() -> [Vec3; 3] {
        [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]
    }

    fn quad_at_z0() -> Vec<[Vec3; 3]> {
        // [0,1]x[0,1] plane at z = 0 split into two triangles.
        vec![
            unit_triangle_at_z0(),
            [
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
        ]
    }

    #[test]
    fn analytic_crossing_is_reported_exactly() {
        let geometry = CollisionGeometry::build(&[unit_triangle_at_z0()], 1e-6).unwrap();
        let segment = Segment::new(Vec3::new(0.25, 0.25, 1.0), Vec3::new(0.25, 0.25, -1.0));

        let hit = geometry.first_intersection(&segment).unwrap();
        assert_eq!(hit.triangle_index, 0);
        assert_relative_eq!(hit.t, 0.5, epsilon = 1e-9);
        assert_relative_eq!(hit.point.x, 0.25, epsilon = 1e-9);
        assert_relative_eq!(hit.point.y, 0.25, epsilon = 1e-9);
        assert_relative_eq!(hit.point.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn segment_on_one_side_misses() {
        let geometry = CollisionGeometry::build(&[unit_triangle_at_z0()], 1e-6).unwrap();
        let above = Segment::new(Vec3::new(0.25, 0.25, 2.0), Vec3::new(0.25, 0.25, 0.5));
        assert!(geometry.first_intersection(&above).is_none());
    }

    #[test]
    fn parallel_segment_is_no_intersection() {
        let geometry = CollisionGeometry::build(&[unit_triangle_at_z0()], 1e-6).unwrap();
        let parallel = Segment::new(Vec3::new(0.0, 0.0, 0.5), Vec3::new(1.0, 1.0, 0.5));
        assert!(geometry.first_intersection(&parallel).is_none());
    }

    #[test]
    fn earliest_hit_wins_with_two_walls() {
        // Two parallel walls; the segment crosses the z=0 wall first.
        let near = unit_triangle_at_z0();
        let far = [
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(0.0, 1.0, -1.0),
        ];
        let geometry = CollisionGeometry::build(&[far, near], 1e-6).unwrap();
        let segment = Segment::new(Vec3::new(0.25, 0.25, 1.0), Vec3::new(0.25, 0.25, -2.0));

        let hit = geometry.first_intersection(&segment).unwrap();
        assert_eq!(hit.triangle_index, 1);
        assert_relative_eq!(hit.point.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn edge_hit_within_epsilon_is_accepted() {
        let geometry = CollisionGeometry::build(&quad_at_z0(), 1e-6).unwrap();
        // Straight down the shared diagonal of the two triangles.
        let segment = Segment::new(Vec3::new(0.5, 0.5, 1.0), Vec3::new(0.5, 0.5, -1.0));

        let hit = geometry.first_intersection(&segment).unwrap();
        // Identical t on both triangles: lowest index wins.
        assert_eq!(hit.triangle_index, 0);
        assert_relative_eq!(hit.t, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_triangle_fails_at_build_time() {
        let degenerate = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(2.0, 2.0, 2.0), // Collinear
        ];
        let err = CollisionGeometry::build(&[unit_triangle_at_z0(), degenerate], 1e-6).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateTriangle { index: 1, .. }));
    }

    #[test]
    fn normals_are_unit_length() {
        let geometry = CollisionGeometry::build(&quad_at_z0(), 1e-6).unwrap();
        for triangle in geometry.triangles() {
            assert_relative_eq!(triangle.normal.length(), 1.0, epsilon = 1e-12);
        }
    }
}
