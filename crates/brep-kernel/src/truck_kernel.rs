//! TruckKernel: a BrepKernel backed by the truck B-rep crates.

use crate::tessellation;
use crate::traits::BrepKernel;
use crate::types::*;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, instrument};

use truck_meshalgo::tessellation::MeshableShape;
use truck_modeling::geometry::{Curve, Surface};
use truck_modeling::topology::{Edge, Face, Shell, Solid};
use truck_modeling::{BoundedCurve, InnerSpace, ParameterDivision1D, ParametricCurve, ParametricSurface};
use truck_topology::EdgeID;

/// Per-face meshing result, held only between `incremental_mesh` and
/// `release_triangulations`.
struct MeshedFace {
    triangulation: Option<Triangulation>,
    chains: HashMap<KernelId, Vec<u32>>,
}

struct StoredShape {
    shells: Vec<Shell>,
    faces: Vec<KernelId>,
    meshed: bool,
}

struct FaceEntry {
    shape: u64,
    face: Face,
    boundary: Vec<KernelId>,
    mesh: Option<MeshedFace>,
}

/// Real geometry kernel backed by the truck BREP library.
pub struct TruckKernel {
    next_handle: u64,
    next_id: u64,
    shapes: HashMap<u64, StoredShape>,
    faces: HashMap<KernelId, FaceEntry>,
    edges: HashMap<KernelId, Edge>,
    edge_ids: HashMap<EdgeID<Curve>, KernelId>,
}

impl TruckKernel {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            next_id: 1,
            shapes: HashMap::new(),
            faces: HashMap::new(),
            edges: HashMap::new(),
            edge_ids: HashMap::new(),
        }
    }

    fn alloc_handle(&mut self) -> ShapeHandle {
        let h = ShapeHandle(self.next_handle);
        self.next_handle += 1;
        h
    }

    fn alloc_id(&mut self) -> KernelId {
        let id = KernelId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Register a solid; its shells are meshed in boundary order.
    pub fn store_solid(&mut self, solid: &Solid) -> ShapeHandle {
        self.store_shells(solid.boundaries().clone())
    }

    /// Register an open shell (sheet body).
    pub fn store_shell(&mut self, shell: Shell) -> ShapeHandle {
        self.store_shells(vec![shell])
    }

    fn store_shells(&mut self, shells: Vec<Shell>) -> ShapeHandle {
        let handle = self.alloc_handle();
        let mut faces = Vec::new();

        for shell in &shells {
            for face in shell.face_iter() {
                let face_id = self.alloc_id();
                let mut boundary = Vec::new();
                for wire in face.boundaries() {
                    for edge in wire.edge_iter() {
                        boundary.push(self.register_edge(edge));
                    }
                }
                self.faces.insert(
                    face_id,
                    FaceEntry {
                        shape: handle.id(),
                        face: face.clone(),
                        boundary,
                        mesh: None,
                    },
                );
                faces.push(face_id);
            }
        }

        self.shapes.insert(
            handle.id(),
            StoredShape {
                shells,
                faces,
                meshed: false,
            },
        );
        handle
    }

    fn register_edge(&mut self, edge: &Edge) -> KernelId {
        if let Some(&id) = self.edge_ids.get(&edge.id()) {
            return id;
        }
        let id = self.alloc_id();
        self.edge_ids.insert(edge.id(), id);
        self.edges.insert(id, edge.clone());
        id
    }

    fn shape(&self, shape: &ShapeHandle) -> Result<&StoredShape, KernelError> {
        self.shapes
            .get(&shape.id())
            .ok_or_else(|| KernelError::ShapeNotFound(shape.clone()))
    }

    fn face(&self, face: KernelId) -> Result<&FaceEntry, KernelError> {
        self.faces
            .get(&face)
            .ok_or(KernelError::EntityNotFound { id: face })
    }

    fn edge(&self, edge: KernelId) -> Result<&Edge, KernelError> {
        self.edges
            .get(&edge)
            .ok_or(KernelError::EntityNotFound { id: edge })
    }

    /// Mesh one shell, pairing each stored face with its meshed counterpart.
    fn mesh_shell(
        &self,
        shell: &Shell,
        face_ids: &[KernelId],
        tolerance: f64,
    ) -> Result<Vec<(KernelId, MeshedFace)>, KernelError> {
        // truck signals unmeshable geometry by panicking.
        let meshed = panic::catch_unwind(AssertUnwindSafe(|| shell.triangulation(tolerance)))
            .map_err(|_| KernelError::TriangulationFailed {
                reason: "truck triangulation panicked".to_string(),
            })?;

        let mut out = Vec::with_capacity(face_ids.len());
        for ((face, meshed_face), &face_id) in shell
            .face_iter()
            .zip(meshed.face_iter())
            .zip(face_ids.iter())
        {
            let triangulation = meshed_face.surface().map(|mesh| {
                tessellation::flatten_face_mesh(&mesh, &face.surface(), !face.orientation())
            });

            let mut chains = HashMap::new();
            if let Some(tri) = &triangulation {
                for (wire, meshed_wire) in face.boundaries().iter().zip(meshed_face.boundaries().iter()) {
                    for (edge, meshed_edge) in wire.edge_iter().zip(meshed_wire.edge_iter()) {
                        let Some(&edge_id) = self.edge_ids.get(&edge.id()) else {
                            continue;
                        };
                        let polyline = meshed_edge.curve().0;
                        match tessellation::chain_on_nodes(&polyline, &tri.nodes) {
                            Some(chain) => {
                                chains.entry(edge_id).or_insert(chain);
                            }
                            None => debug!(?face_id, ?edge_id, "edge polyline not on face nodes"),
                        }
                    }
                }
            }

            out.push((
                face_id,
                MeshedFace {
                    triangulation,
                    chains,
                },
            ));
        }
        Ok(out)
    }
}

impl Default for TruckKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl BrepKernel for TruckKernel {
    fn faces(&self, shape: &ShapeHandle) -> Result<Vec<KernelId>, KernelError> {
        Ok(self.shape(shape)?.faces.clone())
    }

    fn edges(&self, shape: &ShapeHandle) -> Result<Vec<KernelId>, KernelError> {
        let mut edges = Vec::new();
        for face in &self.shape(shape)?.faces {
            edges.extend(self.face(*face)?.boundary.iter().copied());
        }
        Ok(edges)
    }

    fn face_edges(&self, face: KernelId) -> Result<Vec<KernelId>, KernelError> {
        Ok(self.face(face)?.boundary.clone())
    }

    fn hash_code(&self, entity: KernelId, upper: u64) -> Result<TopoHash, KernelError> {
        let mut hasher = DefaultHasher::new();
        if let Some(edge) = self.edges.get(&entity) {
            edge.id().hash(&mut hasher);
        } else if let Some(entry) = self.faces.get(&entity) {
            entry.face.id().hash(&mut hasher);
        } else {
            return Err(KernelError::EntityNotFound { id: entity });
        }
        Ok(TopoHash(hasher.finish() % upper.max(1)))
    }

    #[instrument(skip(self))]
    fn incremental_mesh(
        &mut self,
        shape: &ShapeHandle,
        deviation: &Deviation,
    ) -> Result<(), KernelError> {
        if deviation.linear.is_nan() || deviation.linear <= 0.0 {
            return Err(KernelError::TriangulationFailed {
                reason: format!("non-positive deviation {}", deviation.linear),
            });
        }

        let stored = self.shape(shape)?;
        let mut meshed = Vec::new();
        let mut offset = 0;
        for shell in &stored.shells {
            let count = shell.face_iter().count();
            let ids = &stored.faces[offset..offset + count];
            meshed.extend(self.mesh_shell(shell, ids, deviation.linear)?);
            offset += count;
        }

        debug!(faces = meshed.len(), "truck shape meshed");
        for (face_id, mesh) in meshed {
            if let Some(entry) = self.faces.get_mut(&face_id) {
                entry.mesh = Some(mesh);
            }
        }
        if let Some(stored) = self.shapes.get_mut(&shape.id()) {
            stored.meshed = true;
        }
        Ok(())
    }

    fn release_triangulations(&mut self, shape: &ShapeHandle) {
        let Some(stored) = self.shapes.get_mut(&shape.id()) else {
            return;
        };
        stored.meshed = false;
        for face_id in &stored.faces {
            if let Some(entry) = self.faces.get_mut(face_id) {
                entry.mesh = None;
            }
        }
    }

    fn triangulation(&self, face: KernelId) -> Option<Triangulation> {
        let entry = self.faces.get(&face)?;
        if !self.shapes.get(&entry.shape)?.meshed {
            return None;
        }
        entry.mesh.as_ref()?.triangulation.clone()
    }

    fn polygon_on_triangulation(&self, edge: KernelId, face: KernelId) -> Option<Vec<u32>> {
        self.faces
            .get(&face)?
            .mesh
            .as_ref()?
            .chains
            .get(&edge)
            .cloned()
    }

    fn face_orientation(&self, face: KernelId) -> Result<Orientation, KernelError> {
        Ok(if self.face(face)?.face.orientation() {
            Orientation::Forward
        } else {
            Orientation::Reversed
        })
    }

    fn surface_kind(&self, face: KernelId) -> Result<SurfaceKind, KernelError> {
        Ok(match self.face(face)?.face.surface() {
            Surface::Plane(_) => SurfaceKind::Plane,
            Surface::RevolutedCurve(_) => SurfaceKind::Revolved,
            _ => SurfaceKind::Freeform,
        })
    }

    fn surface_d0(&self, face: KernelId, u: f64, v: f64) -> Result<[f64; 3], KernelError> {
        let p = self.face(face)?.face.surface().subs(u, v);
        Ok([p[0], p[1], p[2]])
    }

    fn tessellate_edge(
        &self,
        edge: KernelId,
        deviation: &Deviation,
    ) -> Result<Vec<[f64; 3]>, KernelError> {
        let curve = self.edge(edge)?.curve();
        let range = curve.range_tuple();
        let (params, _points) = curve.parameter_division(range, deviation.linear);
        if params.len() < 2 {
            return Err(KernelError::CurveEvaluation {
                id: edge,
                reason: format!("division produced {} points", params.len()),
            });
        }
        let params = refine_by_angle(&curve, &params, deviation.angular);
        Ok(params
            .iter()
            .map(|&t| {
                let p = curve.subs(t);
                [p[0], p[1], p[2]]
            })
            .collect())
    }
}

/// Split every span of `params` whose end tangents turn by more than
/// `angular` radians into equal parameter steps. truck's division only
/// bounds the chordal distance.
fn refine_by_angle(curve: &Curve, params: &[f64], angular: f64) -> Vec<f64> {
    let mut refined = Vec::with_capacity(params.len());
    for pair in params.windows(2) {
        let (t0, t1) = (pair[0], pair[1]);
        refined.push(t0);
        let (d0, d1) = (curve.der(t0), curve.der(t1));
        let lengths = d0.magnitude() * d1.magnitude();
        if lengths <= f64::EPSILON || angular <= 0.0 {
            continue;
        }
        let turn = (d0.dot(d1) / lengths).clamp(-1.0, 1.0).acos();
        let pieces = (turn / angular).ceil() as usize;
        for k in 1..pieces {
            refined.push(t0 + (t1 - t0) * k as f64 / pieces as f64);
        }
    }
    refined.extend(params.last().copied());
    refined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use approx::assert_relative_eq;
    use std::collections::HashSet;

    fn deviation() -> Deviation {
        Deviation::new(0.05, 0.25)
    }

    #[test]
    fn test_store_box_registers_shared_edges_once() {
        let mut kernel = TruckKernel::new();
        let handle = kernel.store_solid(&primitives::make_box(1.0, 1.0, 1.0));

        let faces = kernel.faces(&handle).unwrap();
        assert_eq!(faces.len(), 6);
        let edges: HashSet<_> = kernel.edges(&handle).unwrap().into_iter().collect();
        assert_eq!(edges.len(), 12, "Box should have 12 unique edges");
    }

    #[test]
    fn test_mesh_and_release_box() {
        let mut kernel = TruckKernel::new();
        let handle = kernel.store_solid(&primitives::make_box(1.0, 1.0, 1.0));
        let faces = kernel.faces(&handle).unwrap();
        assert!(kernel.triangulation(faces[0]).is_none());

        kernel.incremental_mesh(&handle, &deviation()).unwrap();
        for &face in &faces {
            let tri = kernel.triangulation(face).expect("box face should mesh");
            assert!(tri.triangle_count() >= 2);
            assert_eq!(kernel.surface_kind(face).unwrap(), SurfaceKind::Plane);
            for edge in kernel.face_edges(face).unwrap() {
                let chain = kernel
                    .polygon_on_triangulation(edge, face)
                    .expect("straight boundary edges lie on mesh nodes");
                assert!(chain.len() >= 2);
            }
        }

        kernel.release_triangulations(&handle);
        assert!(kernel.triangulation(faces[0]).is_none());
        assert!(kernel.polygon_on_triangulation(kernel.face_edges(faces[0]).unwrap()[0], faces[0]).is_none());
    }

    #[test]
    fn test_hash_code_is_stable_and_bounded() {
        let mut kernel = TruckKernel::new();
        let handle = kernel.store_solid(&primitives::make_box(1.0, 1.0, 1.0));
        for edge in kernel.edges(&handle).unwrap() {
            let a = kernel.hash_code(edge, 1000).unwrap();
            let b = kernel.hash_code(edge, 1000).unwrap();
            assert_eq!(a, b);
            assert!(a.0 < 1000);
        }
    }

    #[test]
    fn test_tessellate_straight_edge() {
        let mut kernel = TruckKernel::new();
        let handle = kernel.store_shell(primitives::make_plate(2.0, 1.0));
        for edge in kernel.edges(&handle).unwrap() {
            let points = kernel.tessellate_edge(edge, &deviation()).unwrap();
            assert!(points.len() >= 2);
        }
    }

    #[test]
    fn test_angular_deviation_refines_curved_edges() {
        let mut kernel = TruckKernel::new();
        let cylinder = primitives::make_cylinder(1.0, 1.0).unwrap();
        let handle = kernel.store_solid(&cylinder);
        let coarse = Deviation::new(0.5, std::f64::consts::PI);
        let fine = Deviation::new(0.5, 0.05);

        let mut refined_any = false;
        for edge in kernel.edges(&handle).unwrap() {
            let a = kernel.tessellate_edge(edge, &coarse).unwrap();
            let b = kernel.tessellate_edge(edge, &fine).unwrap();
            assert!(b.len() >= a.len());
            // Refinement only inserts points; the ends stay put.
            assert_relative_eq!(a[0][0], b[0][0], epsilon = 1e-12);
            assert_relative_eq!(a[a.len() - 1][2], b[b.len() - 1][2], epsilon = 1e-12);
            refined_any |= b.len() > a.len();
        }
        assert!(refined_any, "circular edges should gain points");

        // Straight edges are unaffected.
        let plate = kernel.store_shell(primitives::make_plate(2.0, 1.0));
        for edge in kernel.edges(&plate).unwrap() {
            assert_eq!(
                kernel.tessellate_edge(edge, &coarse).unwrap().len(),
                kernel.tessellate_edge(edge, &fine).unwrap().len()
            );
        }
    }

    #[test]
    fn test_missing_shape_is_an_error() {
        let mut kernel = TruckKernel::new();
        let handle = kernel.store_solid(&primitives::make_box(1.0, 1.0, 1.0));
        let mut other = TruckKernel::new();
        assert!(matches!(
            other.incremental_mesh(&handle, &deviation()),
            Err(KernelError::ShapeNotFound(_))
        ));
        assert!(kernel.incremental_mesh(&handle, &Deviation::new(0.0, 0.1)).is_err());
    }
}
