//! MockKernel: a deterministic test double implementing BrepKernel.
//!
//! Builds synthetic shapes out of quad faces (boxes, open plates, fins) and
//! open cylinder bands, with predictable triangulations, boundary chains and
//! hashes. Faults can be injected per face, per edge, or per meshing call so
//! the mesher's recoverable and fatal paths can be exercised.

use crate::traits::BrepKernel;
use crate::types::*;
use nalgebra::Isometry3;
use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;

type EdgeKey = (u64, [i64; 3], [i64; 3]);

/// Curve carried by a mock edge.
#[derive(Debug, Clone)]
enum MockCurve {
    Line { start: [f64; 3], end: [f64; 3] },
    /// Full circle in a plane of constant z, starting at angle 0.
    Circle { center: [f64; 3], radius: f64 },
}

#[derive(Debug, Clone)]
struct MockEdge {
    curve: MockCurve,
    hashable: bool,
    parametrizable: bool,
}

/// Parametric surface carried by a mock face.
#[derive(Debug, Clone)]
enum MockSurface {
    /// `origin + u * u_axis + v * v_axis`, axes unit length.
    Plane {
        origin: [f64; 3],
        u_axis: [f64; 3],
        v_axis: [f64; 3],
    },
    /// `(r cos u, r sin u, z0 + v)`.
    Cylinder { radius: f64, z0: f64 },
}

impl MockSurface {
    fn d0(&self, u: f64, v: f64) -> [f64; 3] {
        match self {
            MockSurface::Plane {
                origin,
                u_axis,
                v_axis,
            } => [
                origin[0] + u * u_axis[0] + v * v_axis[0],
                origin[1] + u * u_axis[1] + v * v_axis[1],
                origin[2] + u * u_axis[2] + v * v_axis[2],
            ],
            MockSurface::Cylinder { radius, z0 } => [radius * u.cos(), radius * u.sin(), z0 + v],
        }
    }

    fn normal(&self, u: f64) -> [f64; 3] {
        match self {
            MockSurface::Plane { u_axis, v_axis, .. } => cross(*u_axis, *v_axis),
            MockSurface::Cylinder { .. } => [u.cos(), u.sin(), 0.0],
        }
    }

    fn kind(&self) -> SurfaceKind {
        match self {
            MockSurface::Plane { .. } => SurfaceKind::Plane,
            MockSurface::Cylinder { .. } => SurfaceKind::Revolved,
        }
    }
}

#[derive(Debug, Clone)]
struct MockFace {
    surface: MockSurface,
    u_range: (f64, f64),
    v_range: (f64, f64),
    orientation: Orientation,
    /// Boundary edges in loop order (seams appear twice) with their node chains.
    boundary: Vec<(KernelId, Vec<u32>)>,
    location: Isometry3<f64>,
    triangulates: bool,
    has_uv: bool,
}

#[derive(Debug, Clone, Default)]
struct MockShape {
    faces: Vec<KernelId>,
    /// Edges bounding no face.
    construction_edges: Vec<KernelId>,
}

/// Deterministic test double for the B-rep kernel.
pub struct MockKernel {
    next_id: u64,
    next_handle: u64,
    subdivisions: u32,
    shapes: HashMap<u64, MockShape>,
    faces: HashMap<KernelId, MockFace>,
    edges: HashMap<KernelId, MockEdge>,
    /// Edge lookup by quantized endpoints so adjacent quads share edges.
    edge_keys: HashMap<EdgeKey, KernelId>,
    /// Grid resolution of faces not triangulated at `subdivisions`.
    band_grids: HashMap<KernelId, (u32, u32)>,
    meshed: HashSet<u64>,
    mesh_failure: Option<String>,
    mesh_calls: usize,
    release_calls: usize,
}

impl MockKernel {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            next_handle: 1,
            subdivisions: 1,
            shapes: HashMap::new(),
            faces: HashMap::new(),
            edges: HashMap::new(),
            edge_keys: HashMap::new(),
            band_grids: HashMap::new(),
            meshed: HashSet::new(),
            mesh_failure: None,
            mesh_calls: 0,
            release_calls: 0,
        }
    }

    /// Quad faces are triangulated on an `n x n` grid (`2 n^2` triangles).
    pub fn with_subdivisions(mut self, n: u32) -> Self {
        self.subdivisions = n.max(1);
        self
    }

    fn alloc_id(&mut self) -> KernelId {
        let id = KernelId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Start an empty shape; populate it with `add_quad_face` and friends.
    pub fn begin_shape(&mut self) -> ShapeHandle {
        let h = ShapeHandle(self.next_handle);
        self.next_handle += 1;
        self.shapes.insert(h.id(), MockShape::default());
        h
    }

    /// Axis-aligned box from (0,0,0) to (w,h,d): 6 faces, 12 edges.
    pub fn make_box(&mut self, w: f64, h: f64, d: f64) -> ShapeHandle {
        self.make_box_with(w, h, d, |_| Orientation::Forward)
    }

    /// Box whose faces take their orientation from `orient(face_number)`.
    /// Reversed faces are stored on an inward-pointing surface, so the solid
    /// is geometrically identical to `make_box`.
    pub fn make_box_with(
        &mut self,
        w: f64,
        h: f64,
        d: f64,
        orient: impl Fn(usize) -> Orientation,
    ) -> ShapeHandle {
        let p = [
            [0.0, 0.0, 0.0],
            [w, 0.0, 0.0],
            [w, h, 0.0],
            [0.0, h, 0.0],
            [0.0, 0.0, d],
            [w, 0.0, d],
            [w, h, d],
            [0.0, h, d],
        ];
        // Corners counter-clockwise seen from outside.
        let quads = [
            [0, 3, 2, 1], // bottom (z = 0)
            [4, 5, 6, 7], // top    (z = d)
            [0, 1, 5, 4], // front  (y = 0)
            [3, 7, 6, 2], // back   (y = h)
            [0, 4, 7, 3], // left   (x = 0)
            [1, 2, 6, 5], // right  (x = w)
        ];

        let shape = self.begin_shape();
        for (i, q) in quads.iter().enumerate() {
            let corners = [p[q[0]], p[q[1]], p[q[2]], p[q[3]]];
            self.add_quad_face(&shape, corners, orient(i));
        }
        shape
    }

    /// A single open planar face in the XY plane: 1 face, 4 free edges.
    pub fn make_plate(&mut self, w: f64, h: f64) -> ShapeHandle {
        let shape = self.begin_shape();
        self.add_quad_face(
            &shape,
            [[0.0, 0.0, 0.0], [w, 0.0, 0.0], [w, h, 0.0], [0.0, h, 0.0]],
            Orientation::Forward,
        );
        shape
    }

    /// Three quads sharing the edge (0,0,0)-(0,0,1): a non-manifold fin.
    pub fn make_fin(&mut self) -> ShapeHandle {
        let shape = self.begin_shape();
        let a = [0.0, 0.0, 0.0];
        let b = [0.0, 0.0, 1.0];
        for dir in [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-1.0, -1.0, 0.0]] {
            self.add_quad_face(
                &shape,
                [a, dir, [dir[0], dir[1], 1.0], b],
                Orientation::Forward,
            );
        }
        shape
    }

    /// Open cylindrical band (no caps) around +Z: 1 face, two circles and a
    /// seam edge that the face references twice.
    pub fn make_cylinder_band(&mut self, radius: f64, height: f64, segments: u32) -> ShapeHandle {
        let shape = self.begin_shape();
        let nu = segments.max(3);
        let nv = 1u32;

        let bottom = self.alloc_id();
        let top = self.alloc_id();
        let seam = self.alloc_id();
        self.edges.insert(
            bottom,
            MockEdge::new(MockCurve::Circle {
                center: [0.0, 0.0, 0.0],
                radius,
            }),
        );
        self.edges.insert(
            top,
            MockEdge::new(MockCurve::Circle {
                center: [0.0, 0.0, height],
                radius,
            }),
        );
        self.edges.insert(
            seam,
            MockEdge::new(MockCurve::Line {
                start: [radius, 0.0, 0.0],
                end: [radius, 0.0, height],
            }),
        );

        let row = |j: u32| -> Vec<u32> { (0..=nu).map(|i| j * (nu + 1) + i).collect() };
        let column = |i: u32| -> Vec<u32> { (0..=nv).map(|j| j * (nu + 1) + i).collect() };

        let face_id = self.alloc_id();
        self.faces.insert(
            face_id,
            MockFace {
                surface: MockSurface::Cylinder { radius, z0: 0.0 },
                u_range: (0.0, TAU),
                v_range: (0.0, height),
                orientation: Orientation::Forward,
                boundary: vec![
                    (bottom, row(0)),
                    (seam, column(nu)),
                    (top, row(nv)),
                    (seam, column(0)),
                ],
                location: Isometry3::identity(),
                triangulates: true,
                has_uv: true,
            },
        );
        self.band_grids.insert(face_id, (nu, nv));
        if let Some(s) = self.shapes.get_mut(&shape.id()) {
            s.faces.push(face_id);
        }
        shape
    }

    /// Add a planar parallelogram with corners counter-clockwise seen from its
    /// outer side. Edges are shared with earlier quads of the same shape that have the
    /// same endpoints.
    pub fn add_quad_face(
        &mut self,
        shape: &ShapeHandle,
        corners: [[f64; 3]; 4],
        orientation: Orientation,
    ) -> KernelId {
        let a = sub(corners[1], corners[0]);
        let b = sub(corners[3], corners[0]);
        let (len_u, len_v) = (norm(a), norm(b));
        let (a, b) = (scale(a, 1.0 / len_u), scale(b, 1.0 / len_v));

        // A reversed face lives on the surface with the opposite normal: run U
        // backwards from the second corner.
        let surface = match orientation {
            Orientation::Forward => MockSurface::Plane {
                origin: corners[0],
                u_axis: a,
                v_axis: b,
            },
            Orientation::Reversed => MockSurface::Plane {
                origin: corners[1],
                u_axis: scale(a, -1.0),
                v_axis: b,
            },
        };

        let n = self.subdivisions;
        let node_pos = |i: u32, j: u32| -> [f64; 3] {
            surface.d0(
                len_u * f64::from(i) / f64::from(n),
                len_v * f64::from(j) / f64::from(n),
            )
        };
        let mut sides: Vec<Vec<u32>> = vec![
            (0..=n).collect(),
            (0..=n).map(|j| j * (n + 1) + n).collect(),
            (0..=n).map(|i| n * (n + 1) + i).collect(),
            (0..=n).map(|j| j * (n + 1)).collect(),
        ];

        let mut boundary = Vec::with_capacity(4);
        for k in 0..4 {
            let start = corners[k];
            let end = corners[(k + 1) % 4];
            let edge = self.edge_between(shape, start, end);
            let MockCurve::Line { start: e0, .. } = self.edges[&edge].curve else {
                continue;
            };
            // Pick the grid side whose end nodes match this edge, in curve order.
            let Some(pos) = sides.iter().position(|side| {
                let first = node_pos(side[0] % (n + 1), side[0] / (n + 1));
                let last = node_pos(side[n as usize] % (n + 1), side[n as usize] / (n + 1));
                let same = |p: [f64; 3], q: [f64; 3]| norm(sub(p, q)) < 1e-9;
                (same(first, start) && same(last, end)) || (same(first, end) && same(last, start))
            }) else {
                continue;
            };
            let mut chain = sides.remove(pos);
            let first = node_pos(chain[0] % (n + 1), chain[0] / (n + 1));
            if norm(sub(first, e0)) > 1e-9 {
                chain.reverse();
            }
            boundary.push((edge, chain));
        }

        let face_id = self.alloc_id();
        self.faces.insert(
            face_id,
            MockFace {
                surface,
                u_range: (0.0, len_u),
                v_range: (0.0, len_v),
                orientation,
                boundary,
                location: Isometry3::identity(),
                triangulates: true,
                has_uv: true,
            },
        );
        if let Some(s) = self.shapes.get_mut(&shape.id()) {
            s.faces.push(face_id);
        }
        face_id
    }

    /// Straight edge belonging to the shape but bounding no face.
    pub fn add_construction_edge(
        &mut self,
        shape: &ShapeHandle,
        start: [f64; 3],
        end: [f64; 3],
    ) -> KernelId {
        let edge = self.alloc_id();
        self.edges
            .insert(edge, MockEdge::new(MockCurve::Line { start, end }));
        if let Some(s) = self.shapes.get_mut(&shape.id()) {
            s.construction_edges.push(edge);
        }
        edge
    }

    fn edge_between(&mut self, shape: &ShapeHandle, start: [f64; 3], end: [f64; 3]) -> KernelId {
        let (ks, ke) = (quantize(start), quantize(end));
        let key = if ks <= ke {
            (shape.id(), ks, ke)
        } else {
            (shape.id(), ke, ks)
        };
        if let Some(&id) = self.edge_keys.get(&key) {
            return id;
        }
        let id = self.alloc_id();
        self.edges
            .insert(id, MockEdge::new(MockCurve::Line { start, end }));
        self.edge_keys.insert(key, id);
        id
    }

    // ── Fault injection ────────────────────────────────────────────────

    /// Meshing yields no triangulation for this face.
    pub fn set_face_untriangulated(&mut self, face: KernelId) {
        if let Some(f) = self.faces.get_mut(&face) {
            f.triangulates = false;
        }
    }

    /// The face's triangulation carries no UV nodes.
    pub fn set_face_without_uv(&mut self, face: KernelId) {
        if let Some(f) = self.faces.get_mut(&face) {
            f.has_uv = false;
        }
    }

    pub fn set_face_location(&mut self, face: KernelId, location: Isometry3<f64>) {
        if let Some(f) = self.faces.get_mut(&face) {
            f.location = location;
        }
    }

    pub fn set_edge_unhashable(&mut self, edge: KernelId) {
        if let Some(e) = self.edges.get_mut(&edge) {
            e.hashable = false;
        }
    }

    /// Adaptive tessellation of this edge fails.
    pub fn set_edge_unparametrizable(&mut self, edge: KernelId) {
        if let Some(e) = self.edges.get_mut(&edge) {
            e.parametrizable = false;
        }
    }

    /// The next `incremental_mesh` call fails with a kernel error.
    pub fn fail_next_mesh(&mut self, reason: &str) {
        self.mesh_failure = Some(reason.to_string());
    }

    // ── Observation ────────────────────────────────────────────────────

    /// Whether triangulations for this shape are currently held.
    pub fn is_meshed(&self, shape: &ShapeHandle) -> bool {
        self.meshed.contains(&shape.id())
    }

    pub fn mesh_calls(&self) -> usize {
        self.mesh_calls
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls
    }

    fn shape(&self, shape: &ShapeHandle) -> Result<&MockShape, KernelError> {
        self.shapes
            .get(&shape.id())
            .ok_or_else(|| KernelError::ShapeNotFound(shape.clone()))
    }

    fn face(&self, face: KernelId) -> Result<&MockFace, KernelError> {
        self.faces
            .get(&face)
            .ok_or(KernelError::EntityNotFound { id: face })
    }

    fn owning_shape(&self, face: KernelId) -> Option<u64> {
        self.shapes
            .iter()
            .find(|(_, s)| s.faces.contains(&face))
            .map(|(&id, _)| id)
    }

    fn grid_of(&self, face_id: KernelId) -> (u32, u32) {
        self.band_grids
            .get(&face_id)
            .copied()
            .unwrap_or((self.subdivisions, self.subdivisions))
    }

    fn triangulate(&self, face_id: KernelId, face: &MockFace) -> Triangulation {
        let (nu, nv) = self.grid_of(face_id);
        let (u0, u1) = face.u_range;
        let (v0, v1) = face.v_range;
        let flip = if face.orientation.is_reversed() { -1.0 } else { 1.0 };

        let mut nodes = Vec::new();
        let mut uv_nodes = Vec::new();
        let mut normals = Vec::new();
        for j in 0..=nv {
            for i in 0..=nu {
                let u = u0 + (u1 - u0) * f64::from(i) / f64::from(nu);
                let v = v0 + (v1 - v0) * f64::from(j) / f64::from(nv);
                nodes.push(face.surface.d0(u, v));
                uv_nodes.push([u, v]);
                normals.push(scale(face.surface.normal(u), flip));
            }
        }

        let mut triangles = Vec::new();
        for j in 0..nv {
            for i in 0..nu {
                let n00 = j * (nu + 1) + i;
                let n10 = n00 + 1;
                let n01 = n00 + nu + 1;
                let n11 = n01 + 1;
                triangles.push([n00, n10, n11]);
                triangles.push([n00, n11, n01]);
            }
        }

        Triangulation {
            nodes,
            uv_nodes: face.has_uv.then_some(uv_nodes),
            normals,
            triangles,
            location: face.location,
        }
    }
}

impl Default for MockKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEdge {
    fn new(curve: MockCurve) -> Self {
        Self {
            curve,
            hashable: true,
            parametrizable: true,
        }
    }
}

impl BrepKernel for MockKernel {
    fn faces(&self, shape: &ShapeHandle) -> Result<Vec<KernelId>, KernelError> {
        Ok(self.shape(shape)?.faces.clone())
    }

    fn edges(&self, shape: &ShapeHandle) -> Result<Vec<KernelId>, KernelError> {
        let s = self.shape(shape)?;
        let mut edges = Vec::new();
        for face in &s.faces {
            edges.extend(self.face(*face)?.boundary.iter().map(|(e, _)| *e));
        }
        edges.extend(s.construction_edges.iter().copied());
        Ok(edges)
    }

    fn face_edges(&self, face: KernelId) -> Result<Vec<KernelId>, KernelError> {
        Ok(self.face(face)?.boundary.iter().map(|(e, _)| *e).collect())
    }

    fn hash_code(&self, entity: KernelId, upper: u64) -> Result<TopoHash, KernelError> {
        if let Some(edge) = self.edges.get(&entity) {
            if !edge.hashable {
                return Err(KernelError::HashFailed {
                    id: entity,
                    reason: "edge has no shape".to_string(),
                });
            }
        } else if !self.faces.contains_key(&entity) {
            return Err(KernelError::EntityNotFound { id: entity });
        }
        Ok(TopoHash(entity.0 % upper.max(1)))
    }

    fn incremental_mesh(
        &mut self,
        shape: &ShapeHandle,
        deviation: &Deviation,
    ) -> Result<(), KernelError> {
        self.shape(shape)?;
        self.mesh_calls += 1;
        if let Some(reason) = self.mesh_failure.take() {
            return Err(KernelError::TriangulationFailed { reason });
        }
        if deviation.linear.is_nan() || deviation.linear <= 0.0 {
            return Err(KernelError::TriangulationFailed {
                reason: format!("non-positive deviation {}", deviation.linear),
            });
        }
        self.meshed.insert(shape.id());
        Ok(())
    }

    fn release_triangulations(&mut self, shape: &ShapeHandle) {
        self.release_calls += 1;
        self.meshed.remove(&shape.id());
    }

    fn triangulation(&self, face: KernelId) -> Option<Triangulation> {
        let f = self.faces.get(&face)?;
        let shape = self.owning_shape(face)?;
        if !self.meshed.contains(&shape) || !f.triangulates {
            return None;
        }
        Some(self.triangulate(face, f))
    }

    fn polygon_on_triangulation(&self, edge: KernelId, face: KernelId) -> Option<Vec<u32>> {
        let f = self.faces.get(&face)?;
        if !f.triangulates {
            return None;
        }
        f.boundary
            .iter()
            .find(|(e, _)| *e == edge)
            .map(|(_, chain)| chain.clone())
    }

    fn face_orientation(&self, face: KernelId) -> Result<Orientation, KernelError> {
        Ok(self.face(face)?.orientation)
    }

    fn surface_kind(&self, face: KernelId) -> Result<SurfaceKind, KernelError> {
        Ok(self.face(face)?.surface.kind())
    }

    fn surface_d0(&self, face: KernelId, u: f64, v: f64) -> Result<[f64; 3], KernelError> {
        let f = self.face(face)?;
        let [x, y, z] = f.surface.d0(u, v);
        let p = f
            .location
            .transform_point(&nalgebra::Point3::new(x, y, z));
        Ok([p.x, p.y, p.z])
    }

    fn tessellate_edge(
        &self,
        edge: KernelId,
        deviation: &Deviation,
    ) -> Result<Vec<[f64; 3]>, KernelError> {
        let e = self
            .edges
            .get(&edge)
            .ok_or(KernelError::EntityNotFound { id: edge })?;
        if !e.parametrizable {
            return Err(KernelError::CurveEvaluation {
                id: edge,
                reason: "curve has no parametrization".to_string(),
            });
        }
        match e.curve {
            MockCurve::Line { start, end } => Ok(vec![start, end]),
            MockCurve::Circle { center, radius } => {
                // Sagitta under the linear deviation, turn under the angular one.
                let ratio = (1.0 - deviation.linear / radius).clamp(-1.0, 1.0);
                let step = (2.0 * ratio.acos()).min(deviation.angular).max(1e-3);
                let segments = ((TAU / step).ceil() as usize).max(8);
                Ok((0..=segments)
                    .map(|k| {
                        let t = TAU * k as f64 / segments as f64;
                        [
                            center[0] + radius * t.cos(),
                            center[1] + radius * t.sin(),
                            center[2],
                        ]
                    })
                    .collect())
            }
        }
    }
}

fn quantize(p: [f64; 3]) -> [i64; 3] {
    [
        (p[0] * 1e9).round() as i64,
        (p[1] * 1e9).round() as i64,
        (p[2] * 1e9).round() as i64,
    ]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn norm(a: [f64; 3]) -> f64 {
    (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt()
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
