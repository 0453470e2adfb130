//! Merge per-face and per-edge records into renderer buffers plus the
//! metadata tables used for picking.

use serde::Serialize;
use tracing::debug;

use crate::edges::EdgeRecord;
use crate::error::MeshError;
use crate::extract::{FaceRecord, UvBounds};

/// Triangle range and shading facts for one face of the merged mesh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMetadata {
    /// First triangle of the face in the merged index buffer (triangle units).
    pub start_triangle: u32,
    /// One past the last triangle of the face.
    pub end_triangle: u32,
    pub face_index: u32,
    pub is_planar: bool,
    pub average_point: [f32; 3],
    /// Normal of the face's first vertex.
    pub normal: [f32; 3],
    pub uv_bounds: Option<UvBounds>,
}

impl FaceMetadata {
    pub fn triangle_count(&self) -> u32 {
        self.end_triangle - self.start_triangle
    }

    pub fn contains_triangle(&self, triangle: u32) -> bool {
        (self.start_triangle..self.end_triangle).contains(&triangle)
    }
}

/// All faces in one vertex/index buffer set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrawableMesh {
    /// Flat xyz triples.
    pub positions: Vec<f32>,
    /// Flat xyz triples.
    pub normals: Vec<f32>,
    /// Flat atlas uv pairs, one per vertex; zero for faces outside the atlas.
    pub uvs: Vec<f32>,
    /// Second uv channel: each face's own parametric uvs in [0,1]², for
    /// per-face bump or shading maps. Zero for faces without a parametrization.
    pub face_uvs: Vec<f32>,
    pub indices: Vec<u32>,
    /// Sorted by `start_triangle`.
    pub face_metadata: Vec<FaceMetadata>,
}

/// Segment range for one edge of the merged line batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeMetadata {
    /// `None` only for [`EdgeMetadata::NONE`].
    pub edge_index: Option<u32>,
    pub start_segment: u32,
    /// One past the last segment of the edge.
    pub end_segment: u32,
}

impl EdgeMetadata {
    /// Returned when a pick hits no edge.
    pub const NONE: EdgeMetadata = EdgeMetadata {
        edge_index: None,
        start_segment: 0,
        end_segment: 0,
    };

    pub fn is_none(&self) -> bool {
        self.edge_index.is_none()
    }

    pub fn segment_count(&self) -> u32 {
        self.end_segment - self.start_segment
    }
}

/// All edge polylines as disjoint segments, two points per segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EdgeBatch {
    /// Flat xyz triples, six floats per segment.
    pub positions: Vec<f32>,
    /// Edge index of each segment.
    pub segment_edges: Vec<u32>,
    /// Sorted by `edge_index`; dropped edges leave gaps.
    pub edge_metadata: Vec<EdgeMetadata>,
}

fn to_u32(n: usize, what: &str) -> Result<u32, MeshError> {
    u32::try_from(n).map_err(|_| MeshError::Internal {
        reason: format!("{what} {n} exceeds the 32-bit index range"),
    })
}

fn narrow(v: [f64; 3]) -> [f32; 3] {
    [v[0] as f32, v[1] as f32, v[2] as f32]
}

/// Append one face's uv pairs, or zeros when they do not cover every vertex.
fn extend_uvs(buffer: &mut Vec<f32>, uvs: &[f64], vertex_count: usize) {
    if uvs.len() == 2 * vertex_count {
        buffer.extend(uvs.iter().map(|&x| x as f32));
    } else {
        buffer.extend(std::iter::repeat(0.0).take(2 * vertex_count));
    }
}

/// Merge faces in `face_index` order into one mesh.
pub fn assemble_mesh(faces: &[FaceRecord]) -> Result<DrawableMesh, MeshError> {
    let mut ordered: Vec<&FaceRecord> = faces.iter().collect();
    ordered.sort_by_key(|f| f.face_index);

    let vertex_total: usize = ordered.iter().map(|f| f.vertex_count()).sum();
    let index_total: usize = ordered.iter().map(|f| f.triangle_indices.len()).sum();
    to_u32(vertex_total, "vertex count")?;
    to_u32(index_total / 3, "triangle count")?;

    let mut mesh = DrawableMesh {
        positions: Vec::with_capacity(3 * vertex_total),
        normals: Vec::with_capacity(3 * vertex_total),
        uvs: Vec::with_capacity(2 * vertex_total),
        face_uvs: Vec::with_capacity(2 * vertex_total),
        indices: Vec::with_capacity(index_total),
        face_metadata: Vec::with_capacity(ordered.len()),
    };

    for face in ordered {
        let base = to_u32(mesh.positions.len() / 3, "vertex offset")?;
        let start_triangle = to_u32(mesh.indices.len() / 3, "triangle offset")?;
        let vertex_count = face.vertex_count();

        if let Some(&bad) = face
            .triangle_indices
            .iter()
            .find(|&&i| i as usize >= vertex_count)
        {
            return Err(MeshError::Internal {
                reason: format!(
                    "face {} references vertex {bad} of {vertex_count}",
                    face.face_index
                ),
            });
        }

        mesh.positions.extend(face.vertices.iter().map(|&x| x as f32));
        mesh.normals.extend(face.normals.iter().map(|&x| x as f32));
        extend_uvs(&mut mesh.uvs, &face.uvs, vertex_count);
        extend_uvs(&mut mesh.face_uvs, &face.face_uvs, vertex_count);
        mesh.indices
            .extend(face.triangle_indices.iter().map(|&i| i + base));

        mesh.face_metadata.push(FaceMetadata {
            start_triangle,
            end_triangle: start_triangle + to_u32(face.triangle_count(), "triangle count")?,
            face_index: to_u32(face.face_index, "face index")?,
            is_planar: face.is_planar,
            average_point: narrow(face.average_point),
            normal: narrow(face.first_normal()),
            uv_bounds: face.uv_bounds,
        });
    }

    debug!(
        vertices = mesh.positions.len() / 3,
        triangles = mesh.indices.len() / 3,
        faces = mesh.face_metadata.len(),
        "mesh assembled"
    );
    Ok(mesh)
}

/// Expand polylines in `edge_index` order into disjoint segments.
pub fn assemble_edges(edges: &[EdgeRecord]) -> Result<EdgeBatch, MeshError> {
    let mut ordered: Vec<&EdgeRecord> = edges.iter().collect();
    ordered.sort_by_key(|e| e.edge_index);

    let segment_total: usize = ordered.iter().map(|e| e.segment_count()).sum();
    to_u32(segment_total, "segment count")?;

    let mut batch = EdgeBatch {
        positions: Vec::with_capacity(6 * segment_total),
        segment_edges: Vec::with_capacity(segment_total),
        edge_metadata: Vec::with_capacity(ordered.len()),
    };

    for edge in ordered {
        let edge_index = to_u32(edge.edge_index, "edge index")?;
        let start_segment = to_u32(batch.segment_edges.len(), "segment offset")?;
        for pair in edge.polyline.windows(2) {
            batch.positions.extend_from_slice(&narrow(pair[0]));
            batch.positions.extend_from_slice(&narrow(pair[1]));
            batch.segment_edges.push(edge_index);
        }
        batch.edge_metadata.push(EdgeMetadata {
            edge_index: Some(edge_index),
            start_segment,
            end_segment: to_u32(batch.segment_edges.len(), "segment offset")?,
        });
    }

    debug!(
        segments = batch.segment_edges.len(),
        edges = batch.edge_metadata.len(),
        "edge batch assembled"
    );
    Ok(batch)
}
