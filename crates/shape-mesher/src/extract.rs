//! Triangulation extraction: kernel face triangulations into flat per-face
//! buffers with corrected winding and normalized UVs.

use std::collections::HashSet;
use std::ops::Deref;

use brep_kernel::{BrepKernel, Deviation, KernelError, KernelId, ShapeHandle, Triangulation};
use nalgebra::Vector3;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Diagnostic, MeshError};
use crate::index::ShapeIndex;

/// Native parametric extent of a face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UvBounds {
    pub u_min: f64,
    pub u_max: f64,
    pub v_min: f64,
    pub v_max: f64,
}

impl UvBounds {
    fn of(uv_nodes: &[[f64; 2]]) -> Option<Self> {
        let first = uv_nodes.first()?;
        let mut bounds = UvBounds {
            u_min: first[0],
            u_max: first[0],
            v_min: first[1],
            v_max: first[1],
        };
        for [u, v] in uv_nodes {
            bounds.u_min = bounds.u_min.min(*u);
            bounds.u_max = bounds.u_max.max(*u);
            bounds.v_min = bounds.v_min.min(*v);
            bounds.v_max = bounds.v_max.max(*v);
        }
        Some(bounds)
    }

    pub fn u_mid(&self) -> f64 {
        0.5 * (self.u_min + self.u_max)
    }

    pub fn v_mid(&self) -> f64 {
        0.5 * (self.v_min + self.v_max)
    }

    fn is_degenerate(&self) -> bool {
        self.u_max <= self.u_min || self.v_max <= self.v_min
    }
}

/// One triangulated face, world placed, ready for packing and assembly.
#[derive(Debug, Clone)]
pub struct FaceRecord {
    pub face_index: usize,
    /// Kernel entity, kept for surface evaluation while packing.
    pub face_id: KernelId,
    /// Flat xyz triples.
    pub vertices: Vec<f64>,
    /// Flat unit xyz triples, one per vertex, pointing out of the solid.
    pub normals: Vec<f64>,
    /// Flat uv pairs in [0,1]², one per vertex. Empty without a parametrization.
    /// Normalized per face at extraction, moved into atlas space by packing.
    pub uvs: Vec<f64>,
    /// The face's own normalized uv pairs, left untouched by packing.
    pub face_uvs: Vec<f64>,
    /// Stride 3, counter-clockwise seen from outside.
    pub triangle_indices: Vec<u32>,
    pub uv_bounds: Option<UvBounds>,
    pub is_planar: bool,
    pub average_point: [f64; 3],
}

impl FaceRecord {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_indices.len() / 3
    }

    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty()
    }

    pub fn vertex(&self, i: usize) -> Option<[f64; 3]> {
        let v = self.vertices.get(3 * i..3 * i + 3)?;
        Some([v[0], v[1], v[2]])
    }

    /// First vertex normal, or zero for an empty face.
    pub fn first_normal(&self) -> [f64; 3] {
        match self.normals.get(0..3) {
            Some(n) => [n[0], n[1], n[2]],
            None => [0.0; 3],
        }
    }
}

/// A boundary edge of a face with its node chain on that face's triangulation.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryEdge {
    pub edge_index: usize,
    pub chain: Option<Vec<u32>>,
}

/// Result of extraction. `boundaries[i]` belongs to `faces[i]`.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub faces: Vec<FaceRecord>,
    pub boundaries: Vec<Vec<BoundaryEdge>>,
}

impl Extraction {
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.faces.iter().map(FaceRecord::triangle_count).sum()
    }
}

/// Holds a shape's kernel triangulations for the length of a scope and
/// releases them on drop, whatever path the scope exits by.
pub struct TriangulationScope<'k, K: BrepKernel> {
    kernel: &'k mut K,
    shape: ShapeHandle,
}

impl<'k, K: BrepKernel> TriangulationScope<'k, K> {
    /// Mesh `shape` to `deviation`. On failure any partial triangulation is
    /// released before the error is returned.
    pub fn acquire(
        kernel: &'k mut K,
        shape: &ShapeHandle,
        deviation: &Deviation,
    ) -> Result<Self, KernelError> {
        if let Err(e) = kernel.incremental_mesh(shape, deviation) {
            kernel.release_triangulations(shape);
            return Err(e);
        }
        Ok(Self {
            kernel,
            shape: shape.clone(),
        })
    }

    pub fn shape(&self) -> &ShapeHandle {
        &self.shape
    }
}

impl<K: BrepKernel> Deref for TriangulationScope<'_, K> {
    type Target = K;

    fn deref(&self) -> &K {
        self.kernel
    }
}

impl<K: BrepKernel> Drop for TriangulationScope<'_, K> {
    fn drop(&mut self) {
        self.kernel.release_triangulations(&self.shape);
        debug!(shape = ?self.shape, "triangulations released");
    }
}

/// Read every triangulated face of a meshed shape.
///
/// Faces without a triangulation, or with one that does not hold together,
/// are skipped and recorded. Kernel query failures are fatal.
pub fn extract_faces<K: BrepKernel + ?Sized>(
    kernel: &K,
    shape: &ShapeHandle,
    index: &ShapeIndex,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Extraction, MeshError> {
    let mut extraction = Extraction::default();
    let mut seen = HashSet::new();

    for face in kernel.faces(shape)? {
        let hash = kernel.hash_code(face, index.upper())?;
        let face_index = index.face_index(hash).ok_or_else(|| MeshError::Internal {
            reason: format!("face {} missing from the shape index", face.0),
        })?;
        if !seen.insert(face_index) {
            continue;
        }

        let Some(triangulation) = kernel.triangulation(face) else {
            warn!(face_index, "face has no triangulation; skipped");
            diagnostics.push(Diagnostic::FaceSkipped {
                face_index,
                reason: "no triangulation".to_string(),
            });
            continue;
        };
        if let Err(reason) = check_triangulation(&triangulation) {
            warn!(face_index, %reason, "malformed triangulation; face skipped");
            diagnostics.push(Diagnostic::FaceSkipped { face_index, reason });
            continue;
        }

        let reversed = kernel.face_orientation(face)?.is_reversed();
        let is_planar = kernel.surface_kind(face)?.is_planar();
        let record = face_record(face, face_index, &triangulation, reversed, is_planar, diagnostics);
        let boundary = boundary_edges(kernel, face, index, triangulation.node_count())?;

        debug!(
            face_index,
            vertices = record.vertex_count(),
            triangles = record.triangle_count(),
            reversed,
            boundary_edges = boundary.len(),
            "face extracted"
        );
        extraction.faces.push(record);
        extraction.boundaries.push(boundary);
    }

    Ok(extraction)
}

fn check_triangulation(t: &Triangulation) -> Result<(), String> {
    let n = t.node_count();
    if t.normals.len() != n {
        return Err(format!("{} normals for {n} nodes", t.normals.len()));
    }
    if let Some(uv) = &t.uv_nodes {
        if uv.len() != n {
            return Err(format!("{} uv nodes for {n} nodes", uv.len()));
        }
    }
    if let Some(bad) = t.triangles.iter().flatten().find(|&&i| i as usize >= n) {
        return Err(format!("triangle index {bad} out of range for {n} nodes"));
    }
    Ok(())
}

fn face_record(
    face: KernelId,
    face_index: usize,
    t: &Triangulation,
    reversed: bool,
    is_planar: bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> FaceRecord {
    let n = t.node_count();
    let mut vertices = Vec::with_capacity(3 * n);
    let mut normals = Vec::with_capacity(3 * n);
    let mut sum = Vector3::zeros();
    for i in 0..n {
        let p = t.world_node(i);
        sum += Vector3::from(p);
        vertices.extend_from_slice(&p);
        normals.extend_from_slice(&unit(t.world_normal(i)));
    }
    let average_point = if n > 0 {
        let mean = sum / n as f64;
        [mean.x, mean.y, mean.z]
    } else {
        [0.0; 3]
    };

    let mut triangle_indices = Vec::with_capacity(3 * t.triangle_count());
    for &[a, b, c] in &t.triangles {
        if reversed {
            triangle_indices.extend_from_slice(&[b, a, c]);
        } else {
            triangle_indices.extend_from_slice(&[a, b, c]);
        }
    }

    let parametrized = t
        .uv_nodes
        .as_deref()
        .and_then(|uv| Some((uv, UvBounds::of(uv)?)));
    let (uvs, uv_bounds) = match parametrized {
        Some((uv_nodes, bounds)) => {
            if bounds.is_degenerate() {
                warn!(face_index, ?bounds, "zero-width parametric range");
                diagnostics.push(Diagnostic::DegenerateUvRange { face_index });
            }
            (normalize_uvs(uv_nodes, &bounds, reversed), Some(bounds))
        }
        None => {
            debug!(face_index, "face has no parametrization");
            diagnostics.push(Diagnostic::FaceWithoutUv { face_index });
            (Vec::new(), None)
        }
    };

    FaceRecord {
        face_index,
        face_id: face,
        vertices,
        normals,
        face_uvs: uvs.clone(),
        uvs,
        triangle_indices,
        uv_bounds,
        is_planar,
        average_point,
    }
}

/// Map native UVs into [0,1]² over `bounds`, mirroring U on reversed faces.
/// An axis with zero extent maps to 0.
pub fn normalize_uvs(uv_nodes: &[[f64; 2]], bounds: &UvBounds, reversed: bool) -> Vec<f64> {
    let du = bounds.u_max - bounds.u_min;
    let dv = bounds.v_max - bounds.v_min;
    let mut uvs = Vec::with_capacity(2 * uv_nodes.len());
    for [u, v] in uv_nodes {
        let mut s = if du > 0.0 { (u - bounds.u_min) / du } else { 0.0 };
        let t = if dv > 0.0 { (v - bounds.v_min) / dv } else { 0.0 };
        if reversed && du > 0.0 {
            s = 1.0 - s;
        }
        uvs.push(s);
        uvs.push(t);
    }
    uvs
}

fn unit(n: [f64; 3]) -> [f64; 3] {
    let v = Vector3::from(n);
    match v.try_normalize(f64::EPSILON) {
        Some(u) => [u.x, u.y, u.z],
        None => n,
    }
}

/// Boundary edges of one face, each listed once, with validated chains.
fn boundary_edges<K: BrepKernel + ?Sized>(
    kernel: &K,
    face: KernelId,
    index: &ShapeIndex,
    node_count: usize,
) -> Result<Vec<BoundaryEdge>, MeshError> {
    let mut seen = HashSet::new();
    let mut boundary = Vec::new();
    for edge in kernel.face_edges(face)? {
        // Unhashable edges were reported while indexing.
        let Some(edge_index) = index.lookup_edge(kernel, edge) else {
            continue;
        };
        if !seen.insert(edge_index) {
            continue;
        }
        let chain = kernel
            .polygon_on_triangulation(edge, face)
            .filter(|c| c.len() >= 2 && c.iter().all(|&i| (i as usize) < node_count));
        boundary.push(BoundaryEdge { edge_index, chain });
    }
    Ok(boundary)
}
