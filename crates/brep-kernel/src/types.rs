use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Opaque handle to a shape registered with a kernel.
/// NEVER persisted. Valid only for the current kernel session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeHandle(pub(crate) u64);

impl ShapeHandle {
    pub(crate) fn id(&self) -> u64 {
        self.0
    }
}

/// Transient kernel-internal entity identifier (face or edge).
/// Stable within a single kernel session but NOT across shape versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(pub u64);

/// Topological hash of a face or edge, bounded by the caller's table size.
///
/// Two references to the same topological entity always hash equal within one
/// traversal of a shape, whatever face they were reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopoHash(pub u64);

/// Orientation of a face relative to its underlying surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Forward,
    Reversed,
}

impl Orientation {
    pub fn is_reversed(self) -> bool {
        self == Orientation::Reversed
    }
}

/// Coarse classification of a face's underlying surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceKind {
    Plane,
    Revolved,
    Freeform,
}

impl SurfaceKind {
    pub fn is_planar(self) -> bool {
        self == SurfaceKind::Plane
    }
}

/// Meshing density: maximum chordal deviation and maximum angular deviation (radians).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub linear: f64,
    pub angular: f64,
}

impl Deviation {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

/// A face's native triangulation as produced by the kernel's mesher.
///
/// Node positions and shading normals are in the face's local frame; apply
/// `location` to bring them into world space. Triangles index `nodes` and are
/// wound counter-clockwise with respect to the *surface* normal, not the face
/// orientation. Shading normals already account for the face orientation.
#[derive(Debug, Clone)]
pub struct Triangulation {
    pub nodes: Vec<[f64; 3]>,
    /// Parametric coordinates, one per node, when the face has a parametrization.
    pub uv_nodes: Option<Vec<[f64; 2]>>,
    /// Shading normals, one per node.
    pub normals: Vec<[f64; 3]>,
    pub triangles: Vec<[u32; 3]>,
    /// Local-to-world placement of the face.
    pub location: Isometry3<f64>,
}

impl Triangulation {
    pub fn has_uv_nodes(&self) -> bool {
        self.uv_nodes.is_some()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Node `i` transformed into world space.
    pub fn world_node(&self, i: usize) -> [f64; 3] {
        let [x, y, z] = self.nodes[i];
        let p = self.location.transform_point(&Point3::new(x, y, z));
        [p.x, p.y, p.z]
    }

    /// Shading normal `i` rotated into world space.
    pub fn world_normal(&self, i: usize) -> [f64; 3] {
        let [x, y, z] = self.normals[i];
        let n = self.location.transform_vector(&Vector3::new(x, y, z));
        [n.x, n.y, n.z]
    }
}

/// Errors from kernel queries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KernelError {
    #[error("triangulation failed: {reason}")]
    TriangulationFailed { reason: String },

    #[error("entity not found: {id:?}")]
    EntityNotFound { id: KernelId },

    #[error("shape not found: {0:?}")]
    ShapeNotFound(ShapeHandle),

    #[error("shape {0:?} has no triangulation; call incremental_mesh first")]
    NotMeshed(ShapeHandle),

    #[error("curve evaluation failed for {id:?}: {reason}")]
    CurveEvaluation { id: KernelId, reason: String },

    #[error("hash failed for {id:?}: {reason}")]
    HashFailed { id: KernelId, reason: String },

    #[error("kernel error: {message}")]
    Other { message: String },
}
