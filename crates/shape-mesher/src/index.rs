//! Per-pass topological index: hash tables mapping faces and edges of one
//! shape to dense global indices.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use brep_kernel::{BrepKernel, KernelId, ShapeHandle, TopoHash};
use tracing::{debug, warn};

use crate::error::{Diagnostic, MeshError};

/// Face and edge numbering for one shape, built before meshing and dropped
/// with the pass.
///
/// Indices are assigned on first sighting in kernel exploration order, so two
/// references to the same topological edge (reached through different faces,
/// or a seam reached twice) share one index. Each slot remembers the entity
/// that claimed it, so a different entity landing on the same hash is caught
/// as a collision instead of being merged.
#[derive(Debug, Clone, Default)]
pub struct ShapeIndex {
    upper: u64,
    faces: HashMap<TopoHash, (KernelId, usize)>,
    edges: HashMap<TopoHash, (KernelId, usize)>,
    /// Representative kernel entity per edge index.
    edge_ids: Vec<KernelId>,
    face_count: usize,
}

impl ShapeIndex {
    /// Hash every face and edge of `shape`.
    ///
    /// A face that cannot be hashed is fatal, as is a hash shared by two
    /// distinct entities. An edge that cannot be hashed is left out of the
    /// index and recorded once as a diagnostic.
    pub fn build<K: BrepKernel + ?Sized>(
        kernel: &K,
        shape: &ShapeHandle,
        upper: u64,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Self, MeshError> {
        let mut index = ShapeIndex {
            upper,
            ..Self::default()
        };

        for face in kernel.faces(shape)? {
            let hash = kernel.hash_code(face, upper)?;
            if claim(&mut index.faces, hash, face, index.face_count, upper)? {
                index.face_count += 1;
            }
        }

        let mut unhashable = HashSet::new();
        for edge in kernel.edges(shape)? {
            let hash = match kernel.hash_code(edge, upper) {
                Ok(hash) => hash,
                Err(e) => {
                    if unhashable.insert(edge) {
                        warn!(edge = edge.0, error = %e, "edge cannot be hashed; not drawn");
                        diagnostics.push(Diagnostic::EdgeUnhashable {
                            edge: edge.0,
                            reason: e.to_string(),
                        });
                    }
                    continue;
                }
            };
            if claim(&mut index.edges, hash, edge, index.edge_ids.len(), upper)? {
                index.edge_ids.push(edge);
            }
        }

        debug!(
            faces = index.face_count,
            edges = index.edge_ids.len(),
            "shape index built"
        );
        Ok(index)
    }

    /// The table size hashes were computed against.
    pub fn upper(&self) -> u64 {
        self.upper
    }

    pub fn face_count(&self) -> usize {
        self.face_count
    }

    pub fn edge_count(&self) -> usize {
        self.edge_ids.len()
    }

    pub fn face_index(&self, hash: TopoHash) -> Option<usize> {
        self.faces.get(&hash).map(|&(_, i)| i)
    }

    pub fn edge_index(&self, hash: TopoHash) -> Option<usize> {
        self.edges.get(&hash).map(|&(_, i)| i)
    }

    /// Kernel entity standing for `edge_index`.
    pub fn edge_id(&self, edge_index: usize) -> Option<KernelId> {
        self.edge_ids.get(edge_index).copied()
    }

    /// Global index of a kernel edge, `None` when it is not indexed.
    pub fn lookup_edge<K: BrepKernel + ?Sized>(&self, kernel: &K, edge: KernelId) -> Option<usize> {
        kernel
            .hash_code(edge, self.upper)
            .ok()
            .and_then(|hash| self.edge_index(hash))
    }
}

/// Give `entity` slot `next` unless its hash is taken. Returns whether a new
/// slot was used.
fn claim(
    slots: &mut HashMap<TopoHash, (KernelId, usize)>,
    hash: TopoHash,
    entity: KernelId,
    next: usize,
    upper: u64,
) -> Result<bool, MeshError> {
    match slots.entry(hash) {
        Entry::Occupied(slot) => {
            let (owner, _) = *slot.get();
            if owner == entity {
                return Ok(false);
            }
            warn!(hash = hash.0, first = owner.0, second = entity.0, upper, "topological hash collision");
            Err(MeshError::HashCollision {
                hash: hash.0,
                first: owner.0,
                second: entity.0,
                upper,
            })
        }
        Entry::Vacant(slot) => {
            slot.insert((entity, next));
            Ok(true)
        }
    }
}
