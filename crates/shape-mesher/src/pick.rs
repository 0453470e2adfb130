//! Pick queries: map a picked triangle or line segment back to its face or
//! edge through the assembled metadata tables.

use crate::assemble::{DrawableMesh, EdgeBatch, EdgeMetadata, FaceMetadata};

impl DrawableMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Face owning merged triangle `triangle`. O(log F).
    pub fn face_at_triangle(&self, triangle: u32) -> Option<&FaceMetadata> {
        let after = self
            .face_metadata
            .partition_point(|f| f.start_triangle <= triangle);
        let face = self.face_metadata.get(after.checked_sub(1)?)?;
        face.contains_triangle(triangle).then_some(face)
    }

    /// Face owning the triangle that starts at index-buffer offset `offset`.
    pub fn face_at_index_offset(&self, offset: u32) -> Option<&FaceMetadata> {
        self.face_at_triangle(offset / 3)
    }

    /// Metadata of the face with global index `face_index`.
    pub fn face(&self, face_index: u32) -> Option<&FaceMetadata> {
        self.face_metadata.iter().find(|f| f.face_index == face_index)
    }
}

impl EdgeBatch {
    pub fn segment_count(&self) -> usize {
        self.segment_edges.len()
    }

    /// Edge owning `segment`; [`EdgeMetadata::NONE`] when nothing was hit or
    /// the segment is out of range.
    pub fn edge_at_segment(&self, segment: Option<u32>) -> &EdgeMetadata {
        segment
            .and_then(|s| self.segment_edges.get(s as usize))
            .and_then(|&edge_index| self.edge(edge_index))
            .unwrap_or(&EdgeMetadata::NONE)
    }

    /// Metadata of the edge with global index `edge_index`.
    pub fn edge(&self, edge_index: u32) -> Option<&EdgeMetadata> {
        let at = self
            .edge_metadata
            .binary_search_by_key(&Some(edge_index), |e| e.edge_index)
            .ok()?;
        self.edge_metadata.get(at)
    }

    /// Line-buffer floats of an edge's segments, for highlighting.
    pub fn segment_points(&self, edge: &EdgeMetadata) -> &[f32] {
        let start = 6 * edge.start_segment as usize;
        let end = 6 * edge.end_segment as usize;
        self.positions.get(start..end).unwrap_or(&[])
    }
}
