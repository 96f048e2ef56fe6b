//! Local minimal-edge (LME) simplification
//!
//! Greedy quadric edge collapse over a single partition. Anchored vertices
//! (partition border vertices) are never moved or removed, so partitions
//! simplified independently still agree along their seams.

use crate::partition::Submesh;
use crate::quadric::{collapse_cost, triangle_plane, Quadric, QuadricWeighting};
use crate::MeshSimplifier;
use itertools::Itertools;
use log::trace;
use mddlme_core::{Error, Point3f, Result, TriangleMesh};
use nalgebra::Vector3;
use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Relative slack before a queued cost counts as stale on pop.
const STALE_COST_TOLERANCE: f64 = 1e-9;

/// Parameters of the local simplifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmeConfig {
    /// Plane quadric weighting, applied uniformly to every face
    pub weighting: QuadricWeighting,
    /// Largest allowed rotation of a surviving face normal, in degrees
    pub max_normal_deviation_degrees: f64,
    /// Reject collapses that violate the link condition
    pub check_link_condition: bool,
    /// Also anchor vertices on open mesh boundaries
    pub preserve_mesh_boundary: bool,
    /// Stop once the cheapest candidate costs more than this
    pub error_threshold: Option<f64>,
}

impl Default for LmeConfig {
    fn default() -> Self {
        Self {
            weighting: QuadricWeighting::Area,
            max_normal_deviation_degrees: 90.0,
            check_link_condition: true,
            preserve_mesh_boundary: false,
            error_threshold: None,
        }
    }
}

impl LmeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weighting(mut self, weighting: QuadricWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_max_normal_deviation(mut self, degrees: f64) -> Self {
        self.max_normal_deviation_degrees = degrees;
        self
    }

    pub fn with_link_condition(mut self, check: bool) -> Self {
        self.check_link_condition = check;
        self
    }

    pub fn with_preserve_mesh_boundary(mut self, preserve: bool) -> Self {
        self.preserve_mesh_boundary = preserve;
        self
    }

    pub fn with_error_threshold(mut self, threshold: Option<f64>) -> Self {
        self.error_threshold = threshold;
        self
    }

    fn min_normal_dot(&self) -> f64 {
        self.max_normal_deviation_degrees
            .clamp(0.0, 180.0)
            .to_radians()
            .cos()
    }
}

/// Result of simplifying one partition, in compacted local index space.
#[derive(Debug, Clone)]
pub struct SimplifiedSubmesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    /// Pre-simplification local index of every surviving vertex
    pub source: Vec<usize>,
    /// Number of edge collapses performed
    pub collapses: usize,
    /// Whether the vertex target was met before candidates ran out
    pub target_reached: bool,
}

impl SimplifiedSubmesh {
    fn unchanged(vertices: &[Point3f], faces: &[[usize; 3]], target_reached: bool) -> Self {
        Self {
            vertices: vertices.to_vec(),
            faces: faces.to_vec(),
            source: (0..vertices.len()).collect(),
            collapses: 0,
            target_reached,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

// ============================================================
// Edge Cost for Priority Queue
// ============================================================

#[derive(Debug, Clone, Copy)]
struct EdgeCost {
    cost: f64,
    edge: (usize, usize),
}

impl PartialEq for EdgeCost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for EdgeCost {}

impl PartialOrd for EdgeCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-queue popping the smallest cost, then the smallest index pair
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.edge.cmp(&self.edge))
    }
}

#[inline]
fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

fn sorted_face(mut f: [usize; 3]) -> [usize; 3] {
    f.sort_unstable();
    f
}

fn face_normal(p0: &Point3f, p1: &Point3f, p2: &Point3f) -> Option<Vector3<f64>> {
    triangle_plane(p0, p1, p2).map(|(plane, _)| Vector3::new(plane[0], plane[1], plane[2]))
}

// ============================================================
// Collapse State
// ============================================================

/// Indexed face soup with per-vertex incidence lists. Faces are never
/// renumbered while collapsing; dead faces and orphaned vertices are
/// dropped by `compact`.
struct CollapseState {
    positions: Vec<Point3f>,
    faces: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<usize>>,
    quadrics: Vec<Quadric>,
    anchored: Vec<bool>,
    active_vertices: usize,
    weighting: QuadricWeighting,
}

impl CollapseState {
    fn new(
        vertices: &[Point3f],
        faces: &[[usize; 3]],
        anchored: Vec<bool>,
        weighting: QuadricWeighting,
    ) -> Self {
        let mut vertex_faces = vec![Vec::new(); vertices.len()];
        for (fi, face) in faces.iter().enumerate() {
            for &v in face {
                vertex_faces[v].push(fi);
            }
        }
        let active_vertices = vertex_faces.iter().filter(|f| !f.is_empty()).count();

        let mut state = Self {
            positions: vertices.to_vec(),
            faces: faces.to_vec(),
            face_alive: vec![true; faces.len()],
            vertex_faces,
            quadrics: vec![Quadric::zero(); vertices.len()],
            anchored,
            active_vertices,
            weighting,
        };
        for v in 0..state.positions.len() {
            state.recompute_quadric(v);
        }
        state
    }

    /// Anchor both endpoints of every edge used by a single face.
    fn anchor_open_boundary(&mut self) {
        let mut edge_use: HashMap<(usize, usize), usize> = HashMap::new();
        for face in &self.faces {
            for (&a, &b) in face.iter().circular_tuple_windows() {
                *edge_use.entry(edge_key(a, b)).or_insert(0) += 1;
            }
        }
        for ((a, b), count) in edge_use {
            if count == 1 {
                self.anchored[a] = true;
                self.anchored[b] = true;
            }
        }
    }

    #[inline]
    fn is_active(&self, v: usize) -> bool {
        !self.vertex_faces[v].is_empty()
    }

    fn face_quadric(&self, f: usize) -> Quadric {
        let [a, b, c] = self.faces[f];
        Quadric::from_triangle(
            &self.positions[a],
            &self.positions[b],
            &self.positions[c],
            self.weighting,
        )
    }

    fn recompute_quadric(&mut self, v: usize) {
        self.quadrics[v] = self.vertex_faces[v]
            .iter()
            .map(|&f| self.face_quadric(f))
            .sum();
    }

    /// Sorted one-ring of `v`
    fn neighbors(&self, v: usize) -> Vec<usize> {
        self.vertex_faces[v]
            .iter()
            .flat_map(|&f| self.faces[f])
            .filter(|&u| u != v)
            .sorted_unstable()
            .dedup()
            .collect()
    }

    fn edge_faces(&self, a: usize, b: usize) -> Vec<usize> {
        self.vertex_faces[a]
            .iter()
            .copied()
            .filter(|&f| self.faces[f].contains(&b))
            .collect()
    }

    fn cost(&self, a: usize, b: usize) -> (Point3f, f64) {
        collapse_cost(
            &self.quadrics[a],
            &self.quadrics[b],
            &self.positions[a],
            &self.positions[b],
        )
    }

    /// Common neighbors must be exactly the apices of the faces on the edge.
    fn link_condition_holds(&self, a: usize, b: usize) -> bool {
        let na = self.neighbors(a);
        let nb: HashSet<usize> = self.neighbors(b).into_iter().collect();
        let common = na.iter().filter(|v| nb.contains(v)).count();
        common == self.edge_faces(a, b).len()
    }

    /// Whether merging `remove` into `keep` at `target` leaves a valid
    /// neighborhood: no duplicated faces, no orphaned anchored vertex and no
    /// surviving face rotated past `min_dot`.
    fn collapse_is_valid(&self, keep: usize, remove: usize, target: &Point3f, min_dot: f64) -> bool {
        let dying = self.edge_faces(keep, remove);
        if dying.is_empty() {
            return false;
        }

        for &f in &dying {
            for u in self.faces[f] {
                if u == keep || u == remove || !self.anchored[u] {
                    continue;
                }
                let lost = self.vertex_faces[u].iter().filter(|g| dying.contains(g)).count();
                if lost == self.vertex_faces[u].len() {
                    return false;
                }
            }
        }

        let mut seen: HashSet<[usize; 3]> = HashSet::new();
        let surviving = self.vertex_faces[keep]
            .iter()
            .chain(&self.vertex_faces[remove])
            .copied()
            .filter(|f| !dying.contains(f));

        for f in surviving {
            let old = self.faces[f];
            let new = old.map(|v| if v == remove { keep } else { v });
            if !seen.insert(sorted_face(new)) {
                return false;
            }

            let old_normal = face_normal(
                &self.positions[old[0]],
                &self.positions[old[1]],
                &self.positions[old[2]],
            );
            let moved = new.map(|v| if v == keep { *target } else { self.positions[v] });
            let new_normal = face_normal(&moved[0], &moved[1], &moved[2]);

            match (old_normal, new_normal) {
                (Some(n0), Some(n1)) => {
                    if n0.dot(&n1) < min_dot {
                        return false;
                    }
                }
                (Some(_), None) => return false,
                _ => {}
            }
        }
        true
    }

    /// Merge `remove` into `keep` at `target`, dropping the faces that
    /// become degenerate.
    fn collapse(&mut self, keep: usize, remove: usize, target: Point3f) {
        let incident = std::mem::take(&mut self.vertex_faces[remove]);
        for f in incident {
            if self.faces[f].contains(&keep) {
                self.face_alive[f] = false;
                for u in self.faces[f] {
                    if u == remove {
                        continue;
                    }
                    self.vertex_faces[u].retain(|&g| g != f);
                    if u != keep && self.vertex_faces[u].is_empty() {
                        self.active_vertices -= 1;
                    }
                }
            } else {
                for v in self.faces[f].iter_mut() {
                    if *v == remove {
                        *v = keep;
                    }
                }
                self.vertex_faces[keep].push(f);
            }
        }
        self.vertex_faces[keep].sort_unstable();
        self.active_vertices -= 1;
        if self.vertex_faces[keep].is_empty() {
            self.active_vertices -= 1;
        }
        self.positions[keep] = target;
    }

    /// Drop dead faces and unreferenced vertices, renumbering densely.
    fn compact(self, collapses: usize, target_reached: bool) -> SimplifiedSubmesh {
        let mut remap = vec![usize::MAX; self.positions.len()];
        let mut vertices = Vec::with_capacity(self.active_vertices);
        let mut source = Vec::with_capacity(self.active_vertices);
        for v in 0..self.positions.len() {
            if self.is_active(v) {
                remap[v] = vertices.len();
                vertices.push(self.positions[v]);
                source.push(v);
            }
        }

        let faces = self
            .faces
            .iter()
            .zip(&self.face_alive)
            .filter(|(_, &alive)| alive)
            .map(|(face, _)| face.map(|v| remap[v]))
            .collect();

        SimplifiedSubmesh {
            vertices,
            faces,
            source,
            collapses,
            target_reached,
        }
    }
}

// ============================================================
// LME Simplifier
// ============================================================

/// Border-preserving greedy edge-collapse simplifier.
///
/// Candidate edges are kept in a mutable priority queue keyed by vertex
/// pair. After each collapse only the quadrics around the surviving vertex
/// and the costs of its incident edges are refreshed; stale entries are
/// re-validated when popped.
#[derive(Debug, Clone, Default)]
pub struct LmeSimplifier {
    pub config: LmeConfig,
}

impl LmeSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LmeConfig) -> Self {
        Self { config }
    }

    /// Simplify an extracted partition, anchoring its border vertices.
    ///
    /// The face scan of [`simplify_anchored`](Self::simplify_anchored) is
    /// skipped: a submesh taken from a validated mesh's partitioning only
    /// holds in-range, non-repeating local indices.
    pub fn simplify_submesh(&self, submesh: &Submesh, target_ratio: f32) -> Result<SimplifiedSubmesh> {
        check_ratio(target_ratio)?;
        check_anchor_len(&submesh.vertices, &submesh.anchored)?;
        debug_assert!(find_invalid_face(&submesh.vertices, &submesh.faces).is_none());
        Ok(self.collapse_to_target(&submesh.vertices, &submesh.faces, &submesh.anchored, target_ratio))
    }

    /// Reduce the referenced vertex count toward
    /// [`vertex_target`]`(target_ratio, n)` without ever collapsing an edge
    /// with an anchored endpoint.
    pub fn simplify_anchored(
        &self,
        vertices: &[Point3f],
        faces: &[[usize; 3]],
        anchored: &[bool],
        target_ratio: f32,
    ) -> Result<SimplifiedSubmesh> {
        check_ratio(target_ratio)?;
        check_anchor_len(vertices, anchored)?;
        if let Some(face) = find_invalid_face(vertices, faces) {
            return Err(Error::InvalidData(format!("Invalid face {:?}", face)));
        }
        Ok(self.collapse_to_target(vertices, faces, anchored, target_ratio))
    }

    fn collapse_to_target(
        &self,
        vertices: &[Point3f],
        faces: &[[usize; 3]],
        anchored: &[bool],
        target_ratio: f32,
    ) -> SimplifiedSubmesh {
        if target_ratio >= 1.0 {
            return SimplifiedSubmesh::unchanged(vertices, faces, true);
        }

        let mut state = CollapseState::new(vertices, faces, anchored.to_vec(), self.config.weighting);
        if self.config.preserve_mesh_boundary {
            state.anchor_open_boundary();
        }

        let target = vertex_target(target_ratio, state.active_vertices);
        let min_dot = self.config.min_normal_dot();

        let mut queue: PriorityQueue<(usize, usize), EdgeCost> = PriorityQueue::new();
        for face in &state.faces {
            for (&a, &b) in face.iter().circular_tuple_windows() {
                if state.anchored[a] || state.anchored[b] {
                    continue;
                }
                let key = edge_key(a, b);
                if queue.get(&key).is_none() {
                    let (_, cost) = state.cost(key.0, key.1);
                    queue.push(key, EdgeCost { cost, edge: key });
                }
            }
        }

        let mut collapses = 0usize;
        while state.active_vertices > target {
            let ((keep, remove), queued) = match queue.pop() {
                Some(item) => item,
                None => break,
            };

            if let Some(threshold) = self.config.error_threshold {
                if queued.cost > threshold {
                    break;
                }
            }

            if !state.is_active(keep) || !state.is_active(remove) {
                continue;
            }

            let (position, cost) = state.cost(keep, remove);
            if cost > queued.cost + STALE_COST_TOLERANCE * (1.0 + queued.cost.abs()) {
                queue.push((keep, remove), EdgeCost { cost, edge: (keep, remove) });
                continue;
            }

            if self.config.check_link_condition && !state.link_condition_holds(keep, remove) {
                continue;
            }
            if !state.collapse_is_valid(keep, remove, &position, min_dot) {
                continue;
            }

            let removed_ring = state.neighbors(remove);
            state.collapse(keep, remove, position);
            collapses += 1;
            trace!("collapsed {} into {} (cost {:.3e})", remove, keep, cost);

            for n in removed_ring {
                queue.remove(&edge_key(remove, n));
            }

            let ring = state.neighbors(keep);
            state.recompute_quadric(keep);
            for &n in &ring {
                state.recompute_quadric(n);
            }
            for &n in &ring {
                if state.anchored[n] {
                    continue;
                }
                let key = edge_key(keep, n);
                let (_, cost) = state.cost(key.0, key.1);
                queue.push(key, EdgeCost { cost, edge: key });
            }
        }

        let target_reached = state.active_vertices <= target;
        if collapses == 0 {
            return SimplifiedSubmesh::unchanged(vertices, faces, target_reached);
        }
        state.compact(collapses, target_reached)
    }
}

/// Number of vertices to stop at: `ceil(target_ratio * count)`.
///
/// The ratio arrives as `f32`, so a decimal like `0.4` is really
/// `0.4000000059...`. The product is shrunk by one `f32` epsilon before
/// rounding up, otherwise whole products such as `0.4 * 25` would round to 11.
pub fn vertex_target(target_ratio: f32, count: usize) -> usize {
    let exact = target_ratio as f64 * count as f64;
    (exact * (1.0 - f32::EPSILON as f64)).ceil() as usize
}

fn check_ratio(target_ratio: f32) -> Result<()> {
    if target_ratio.is_nan() || target_ratio <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "Target ratio must be in (0, 1], got {}",
            target_ratio
        )));
    }
    Ok(())
}

fn check_anchor_len(vertices: &[Point3f], anchored: &[bool]) -> Result<()> {
    if anchored.len() != vertices.len() {
        return Err(Error::InvalidData(format!(
            "Anchor flags cover {} vertices but the mesh has {}",
            anchored.len(),
            vertices.len()
        )));
    }
    Ok(())
}

fn find_invalid_face<'f>(vertices: &[Point3f], faces: &'f [[usize; 3]]) -> Option<&'f [usize; 3]> {
    faces
        .iter()
        .find(|f| f.iter().any(|&v| v >= vertices.len()) || f[0] == f[1] || f[1] == f[2] || f[0] == f[2])
}

impl MeshSimplifier for LmeSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, target_ratio: f32) -> Result<TriangleMesh> {
        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }
        mesh.validate()?;
        let anchored = vec![false; mesh.vertex_count()];
        let out = self.simplify_anchored(&mesh.vertices, &mesh.faces, &anchored, target_ratio)?;
        Ok(TriangleMesh::from_vertices_and_faces(out.vertices, out.faces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::MeshPartitioner;

    fn make_tetrahedron() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(0.5, 0.5, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    fn make_plane_grid(size: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        for y in 0..size {
            for x in 0..size {
                vertices.push(Point3f::new(x as f32, y as f32, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..(size - 1) {
            for x in 0..(size - 1) {
                let tl = y * size + x;
                let tr = tl + 1;
                let bl = (y + 1) * size + x;
                let br = bl + 1;
                faces.push([tl, bl, tr]);
                faces.push([tr, bl, br]);
            }
        }
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    fn grid_boundary(size: usize) -> Vec<bool> {
        (0..size * size)
            .map(|i| {
                let (x, y) = (i % size, i / size);
                x == 0 || y == 0 || x == size - 1 || y == size - 1
            })
            .collect()
    }

    #[test]
    fn test_config_builder() {
        let c = LmeConfig::new()
            .with_weighting(QuadricWeighting::Uniform)
            .with_max_normal_deviation(45.0)
            .with_link_condition(false)
            .with_preserve_mesh_boundary(true)
            .with_error_threshold(Some(0.5));
        assert_eq!(c.weighting, QuadricWeighting::Uniform);
        assert!(!c.check_link_condition);
        assert!(c.preserve_mesh_boundary);
        assert_eq!(c.error_threshold, Some(0.5));
        assert!((c.min_normal_dot() - 45f64.to_radians().cos()).abs() < 1e-12);
    }

    #[test]
    fn test_edge_cost_ordering() {
        let cheap = EdgeCost { cost: 0.1, edge: (5, 9) };
        let dear = EdgeCost { cost: 0.2, edge: (0, 1) };
        let tie = EdgeCost { cost: 0.1, edge: (2, 3) };
        assert!(cheap > dear);
        assert!(tie > cheap);
        let mut queue = PriorityQueue::new();
        queue.push(cheap.edge, cheap);
        queue.push(dear.edge, dear);
        queue.push(tie.edge, tie);
        assert_eq!(queue.pop().map(|(k, _)| k), Some((2, 3)));
        assert_eq!(queue.pop().map(|(k, _)| k), Some((5, 9)));
    }

    #[test]
    fn test_invalid_ratio() {
        let s = LmeSimplifier::new();
        let mesh = make_plane_grid(4);
        assert!(matches!(s.simplify(&mesh, 0.0), Err(Error::InvalidParameter(_))));
        assert!(matches!(s.simplify(&mesh, -0.5), Err(Error::InvalidParameter(_))));
        assert!(matches!(s.simplify(&mesh, f32::NAN), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_empty_mesh() {
        let s = LmeSimplifier::new();
        assert!(s.simplify(&TriangleMesh::new(), 0.5).is_err());
    }

    #[test]
    fn test_anchor_length_mismatch() {
        let s = LmeSimplifier::new();
        let mesh = make_plane_grid(3);
        let result = s.simplify_anchored(&mesh.vertices, &mesh.faces, &[false; 2], 0.5);
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_full_ratio_is_noop() {
        let s = LmeSimplifier::new();
        let mesh = make_plane_grid(5);
        let result = s.simplify(&mesh, 1.0).unwrap();
        assert_eq!(result, mesh);
    }

    #[test]
    fn test_fully_anchored_is_noop() {
        let s = LmeSimplifier::new();
        let mesh = make_plane_grid(5);
        let anchored = vec![true; mesh.vertex_count()];
        let out = s.simplify_anchored(&mesh.vertices, &mesh.faces, &anchored, 0.2).unwrap();
        assert_eq!(out.collapses, 0);
        assert_eq!(out.vertices, mesh.vertices);
        assert_eq!(out.faces, mesh.faces);
        assert!(!out.target_reached);
    }

    #[test]
    fn test_tetrahedron_refuses_duplicate_faces() {
        let s = LmeSimplifier::new();
        let mesh = make_tetrahedron();
        let anchored = vec![false; 4];
        let out = s.simplify_anchored(&mesh.vertices, &mesh.faces, &anchored, 0.5).unwrap();
        assert_eq!(out.collapses, 0);
        assert_eq!(out.face_count(), 4);
    }

    #[test]
    fn test_anchored_vertices_never_move() {
        let size = 11;
        let s = LmeSimplifier::new();
        let mesh = make_plane_grid(size);
        let anchored = grid_boundary(size);
        let out = s.simplify_anchored(&mesh.vertices, &mesh.faces, &anchored, 0.5).unwrap();

        assert!(out.collapses > 0);
        assert!(out.vertex_count() < mesh.vertex_count());
        let anchored_count = anchored.iter().filter(|&&a| a).count();
        assert!(out.vertex_count() >= anchored_count);

        let surviving: Vec<usize> = out
            .source
            .iter()
            .copied()
            .filter(|&src| anchored[src])
            .collect();
        assert_eq!(surviving.len(), anchored_count);
        for (local, &src) in out.source.iter().enumerate() {
            if anchored[src] {
                assert_eq!(out.vertices[local], mesh.vertices[src]);
            }
        }
    }

    #[test]
    fn test_reaches_moderate_target() {
        let size = 11;
        let s = LmeSimplifier::new();
        let mesh = make_plane_grid(size);
        let anchored = grid_boundary(size);
        let out = s.simplify_anchored(&mesh.vertices, &mesh.faces, &anchored, 0.7).unwrap();
        let target = vertex_target(0.7, 121);
        assert!(out.target_reached);
        assert!(out.vertex_count() <= target);
        for face in &out.faces {
            assert!(face.iter().all(|&v| v < out.vertex_count()));
            assert!(face[0] != face[1] && face[1] != face[2] && face[0] != face[2]);
        }
    }

    #[test]
    fn test_deterministic() {
        let s = LmeSimplifier::new();
        let mesh = make_plane_grid(9);
        let a = s.simplify(&mesh, 0.4).unwrap();
        let b = s.simplify(&mesh, 0.4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_preserve_mesh_boundary() {
        let size = 8;
        let s = LmeSimplifier::with_config(LmeConfig::new().with_preserve_mesh_boundary(true));
        let mesh = make_plane_grid(size);
        let anchored = vec![false; mesh.vertex_count()];
        let out = s.simplify_anchored(&mesh.vertices, &mesh.faces, &anchored, 0.5).unwrap();
        let boundary = grid_boundary(size);
        let kept = out.source.iter().filter(|&&src| boundary[src]).count();
        assert_eq!(kept, boundary.iter().filter(|&&b| b).count());
    }

    #[test]
    fn test_error_threshold_stops_early() {
        // A tent: two planes meeting along a ridge, so ridge collapses cost more.
        let mut vertices = Vec::new();
        for y in 0..7 {
            for x in 0..7 {
                let z = 3.0 - (x as f32 - 3.0).abs();
                vertices.push(Point3f::new(x as f32, y as f32, z));
            }
        }
        let mut mesh = make_plane_grid(7);
        mesh.vertices = vertices;
        let strict = LmeSimplifier::with_config(LmeConfig::new().with_error_threshold(Some(-1.0)));
        let out = strict
            .simplify_anchored(&mesh.vertices, &mesh.faces, &vec![false; 49], 0.3)
            .unwrap();
        assert_eq!(out.collapses, 0);
    }

    #[test]
    fn test_flip_rejected() {
        let vertices = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(2.0, 1.0, 0.0),
            Point3f::new(2.0, -1.0, 0.0),
            Point3f::new(0.5, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 4], [1, 3, 2]];
        let state = CollapseState::new(&vertices, &faces, vec![false; 5], QuadricWeighting::Area);
        let min_dot = LmeConfig::default().min_normal_dot();
        assert!(!state.collapse_is_valid(0, 1, &Point3f::new(3.0, 0.0, 0.0), min_dot));
        assert!(state.collapse_is_valid(0, 1, &Point3f::new(1.0, 0.0, 0.0), min_dot));
    }

    #[test]
    fn test_collapse_bookkeeping() {
        let mesh = make_plane_grid(3);
        let mut state =
            CollapseState::new(&mesh.vertices, &mesh.faces, vec![false; 9], QuadricWeighting::Area);
        assert_eq!(state.active_vertices, 9);
        assert!(state.link_condition_holds(4, 5));
        let dying = state.edge_faces(4, 5).len();
        state.collapse(4, 5, Point3f::new(1.5, 1.0, 0.0));
        assert_eq!(state.active_vertices, 8);
        assert!(!state.is_active(5));
        assert_eq!(state.face_alive.iter().filter(|&&a| !a).count(), dying);
        let out = state.compact(1, true);
        assert_eq!(out.vertex_count(), 8);
        assert!(!out.source.contains(&5));
        assert_eq!(out.face_count(), 8 - dying);
    }

    #[test]
    fn test_vertex_target_decimal_ratios() {
        assert_eq!(vertex_target(0.4, 25), 10);
        assert_eq!(vertex_target(0.2, 25), 5);
        assert_eq!(vertex_target(0.3, 900), 270);
        assert_eq!(vertex_target(0.7, 10), 7);
        assert_eq!(vertex_target(0.5, 25), 13);
        assert_eq!(vertex_target(0.36, 25), 9);
        assert_eq!(vertex_target(0.01, 3), 1);
    }

    #[test]
    fn test_exact_target_count_on_free_grid() {
        let s = LmeSimplifier::new();
        let mesh = make_plane_grid(5);
        let anchored = vec![false; mesh.vertex_count()];
        let out = s.simplify_anchored(&mesh.vertices, &mesh.faces, &anchored, 0.4).unwrap();
        assert!(out.target_reached);
        assert_eq!(out.vertex_count(), 10);
    }

    #[test]
    fn test_submesh_path_matches_anchored_path() {
        let mesh = make_plane_grid(9);
        let partitioning = MeshPartitioner::new(&mesh, 8).unwrap().partition();
        let s = LmeSimplifier::new();
        for submesh in partitioning.submeshes() {
            let via_submesh = s.simplify_submesh(&submesh, 0.5).unwrap();
            let via_slices = s
                .simplify_anchored(&submesh.vertices, &submesh.faces, &submesh.anchored, 0.5)
                .unwrap();
            assert_eq!(via_submesh.vertices, via_slices.vertices);
            assert_eq!(via_submesh.faces, via_slices.faces);
            assert_eq!(via_submesh.source, via_slices.source);
        }
    }

    #[test]
    fn test_submesh_path_checks_ratio_and_anchors() {
        let mesh = make_plane_grid(4);
        let partitioning = MeshPartitioner::new(&mesh, 1).unwrap().partition();
        let mut submesh = partitioning.submeshes().remove(0);
        let s = LmeSimplifier::new();
        assert!(matches!(s.simplify_submesh(&submesh, 0.0), Err(Error::InvalidParameter(_))));
        submesh.anchored.pop();
        assert!(matches!(s.simplify_submesh(&submesh, 0.5), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_anchored_path_rejects_bad_faces() {
        let s = LmeSimplifier::new();
        let mesh = make_plane_grid(3);
        let anchored = vec![false; 9];
        let out_of_range = [[0, 1, 9]];
        let repeated = [[0, 4, 4]];
        assert!(matches!(
            s.simplify_anchored(&mesh.vertices, &out_of_range, &anchored, 0.5),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            s.simplify_anchored(&mesh.vertices, &repeated, &anchored, 0.5),
            Err(Error::InvalidData(_))
        ));
    }
}
