//! Pass-level errors and recoverable per-entity diagnostics.

use brep_kernel::KernelError;
use serde::Serialize;

/// A pass-level failure. No partial bundle accompanies any of these.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MeshError {
    /// The kernel raised while meshing or querying the shape.
    #[error("internal kernel failure during mesh generation: {0}")]
    Kernel(#[from] KernelError),

    /// An edge bounds more than two triangulated faces.
    #[error("edge {edge_index} bounds {faces} faces; the shape is not manifold")]
    NonManifoldEdge { edge_index: usize, faces: usize },

    /// Two distinct entities of one shape hashed to the same slot.
    #[error("entities {first} and {second} both hash to {hash} below {upper}; raise hash_upper_bound")]
    HashCollision {
        hash: u64,
        first: u64,
        second: u64,
        upper: u64,
    },

    #[error("invalid mesh options: {reason}")]
    InvalidOptions { reason: String },

    /// A broken invariant inside the mesher itself.
    #[error("internal mesher error: {reason}")]
    Internal { reason: String },
}

impl MeshError {
    /// The failure came from the kernel rather than from the mesher.
    pub fn is_kernel_failure(&self) -> bool {
        matches!(self, MeshError::Kernel(_))
    }

    /// The mesher could not keep its own bookkeeping consistent.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            MeshError::Internal { .. } | MeshError::HashCollision { .. }
        )
    }

    /// The caller handed over a shape or options the mesher cannot accept.
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            MeshError::NonManifoldEdge { .. } | MeshError::InvalidOptions { .. }
        )
    }
}

/// A recoverable condition met during a pass. The affected face or edge is
/// left out (or left without UVs) and the pass carries on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    /// The face has no usable triangulation and is excluded from all buffers.
    FaceSkipped { face_index: usize, reason: String },
    /// The face has no parametrization; it is drawn but not packed in the atlas.
    FaceWithoutUv { face_index: usize },
    /// One parametric axis of the face has zero extent; that axis maps to 0.
    DegenerateUvRange { face_index: usize },
    /// The kernel could not hash the edge; it is not drawn.
    EdgeUnhashable { edge: u64, reason: String },
    /// The edge could not be turned into a polyline; it is not drawn.
    EdgeDropped { edge_index: usize, reason: String },
}
