//! One mesh pass end to end: shape in, [`MeshBundle`] out.

use brep_kernel::{BrepKernel, ShapeHandle};
use serde::Serialize;
use tracing::{info, instrument};

use crate::assemble::{assemble_edges, assemble_mesh, DrawableMesh, EdgeBatch};
use crate::atlas::{build_atlas, PackingStats};
use crate::config::MeshOptions;
use crate::edges::build_edges;
use crate::error::{Diagnostic, MeshError};
use crate::extract::{extract_faces, TriangulationScope};
use crate::index::ShapeIndex;

/// Everything a renderer needs to draw and pick one shape version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshBundle {
    pub shape_version: u64,
    pub mesh: DrawableMesh,
    pub edges: EdgeBatch,
    pub atlas: PackingStats,
    /// Recoverable conditions met during the pass, in the order they occurred.
    pub diagnostics: Vec<Diagnostic>,
}

impl MeshBundle {
    pub fn to_json(&self) -> Result<String, MeshError> {
        serde_json::to_string(self).map_err(|e| MeshError::Internal {
            reason: format!("bundle serialization failed: {e}"),
        })
    }
}

/// Convert one shape into a drawable, pickable mesh with a packed UV atlas.
///
/// Runs index, extract, edges, atlas and assemble in that order. Kernel
/// triangulations are released before this returns, on success and on every
/// error. A failed pass yields no partial output.
#[instrument(skip(kernel, options), fields(max_deviation = options.max_deviation))]
pub fn shape_to_mesh<K: BrepKernel>(
    kernel: &mut K,
    shape: &ShapeHandle,
    options: &MeshOptions,
    shape_version: u64,
) -> Result<MeshBundle, MeshError> {
    options.validate()?;
    let mut diagnostics = Vec::new();

    let index = ShapeIndex::build(&*kernel, shape, options.hash_upper_bound, &mut diagnostics)?;

    let (mut extraction, edges) = {
        let scope = TriangulationScope::acquire(kernel, shape, &options.deviation())?;
        let extraction = extract_faces(&*scope, shape, &index, &mut diagnostics)?;
        let edges = build_edges(
            &*scope,
            &index,
            &extraction,
            &options.free_edge_deviation(),
            &mut diagnostics,
        )?;
        (extraction, edges)
    };

    let atlas = build_atlas(&*kernel, &mut extraction.faces, options)?;
    let mesh = assemble_mesh(&extraction.faces)?;
    let edge_batch = assemble_edges(&edges)?;

    info!(
        faces = mesh.face_metadata.len(),
        triangles = mesh.triangle_count(),
        edges = edge_batch.edge_metadata.len(),
        segments = edge_batch.segment_count(),
        atlas_side = atlas.side(),
        diagnostics = diagnostics.len(),
        "shape meshed"
    );

    Ok(MeshBundle {
        shape_version,
        mesh,
        edges: edge_batch,
        atlas,
        diagnostics,
    })
}
