//! Edge polylines: one per topological edge, shared boundaries taken from a
//! face triangulation and free edges tessellated by the kernel.

use brep_kernel::{BrepKernel, Deviation};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Diagnostic, MeshError};
use crate::extract::{Extraction, FaceRecord};
use crate::index::ShapeIndex;

/// Where an edge polyline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EdgeSource {
    /// Boundary nodes of an adjacent face's triangulation.
    SharedBoundary,
    /// Adaptive sampling of the edge curve.
    FreeTessellation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub edge_index: usize,
    /// At least two connected points.
    pub polyline: Vec<[f64; 3]>,
    pub source: EdgeSource,
}

impl EdgeRecord {
    pub fn segment_count(&self) -> usize {
        self.polyline.len().saturating_sub(1)
    }
}

/// Build one polyline per indexed edge, in `edge_index` order.
///
/// Pass one counts the triangulated faces adjacent to each edge; more than two
/// aborts with [`MeshError::NonManifoldEdge`]. Pass two takes an edge with two
/// adjacent faces from the later face's boundary chain (or the earlier one's
/// when the later has none) and hands everything else to the kernel's adaptive
/// tessellation. Edges that yield no usable polyline are dropped and recorded.
pub fn build_edges<K: BrepKernel + ?Sized>(
    kernel: &K,
    index: &ShapeIndex,
    extraction: &Extraction,
    deviation: &Deviation,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<EdgeRecord>, MeshError> {
    let adjacency = adjacency(index.edge_count(), extraction)?;

    let mut records = Vec::with_capacity(index.edge_count());
    for (edge_index, faces) in adjacency.iter().enumerate() {
        let shared = if faces.len() == 2 {
            faces
                .iter()
                .rev()
                .find_map(|&slot| boundary_polyline(extraction, slot, edge_index))
        } else {
            None
        };

        if let Some(polyline) = shared {
            records.push(EdgeRecord {
                edge_index,
                polyline,
                source: EdgeSource::SharedBoundary,
            });
            continue;
        }

        let Some(edge) = index.edge_id(edge_index) else {
            return Err(MeshError::Internal {
                reason: format!("edge index {edge_index} has no kernel entity"),
            });
        };
        match kernel.tessellate_edge(edge, deviation) {
            Ok(points) if points.len() >= 2 => {
                debug!(edge_index, points = points.len(), adjacent = faces.len(), "free edge tessellated");
                records.push(EdgeRecord {
                    edge_index,
                    polyline: points,
                    source: EdgeSource::FreeTessellation,
                });
            }
            Ok(points) => {
                let reason = format!("tessellation produced {} point(s)", points.len());
                warn!(edge_index, %reason, "edge dropped");
                diagnostics.push(Diagnostic::EdgeDropped { edge_index, reason });
            }
            Err(e) => {
                warn!(edge_index, error = %e, "edge cannot be tessellated; dropped");
                diagnostics.push(Diagnostic::EdgeDropped {
                    edge_index,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(records)
}

/// Positions into `extraction.faces` of the faces bounded by each edge, in
/// exploration order.
fn adjacency(edge_count: usize, extraction: &Extraction) -> Result<Vec<Vec<usize>>, MeshError> {
    let mut adjacency = vec![Vec::new(); edge_count];
    for (slot, boundary) in extraction.boundaries.iter().enumerate() {
        for b in boundary {
            let Some(faces) = adjacency.get_mut(b.edge_index) else {
                return Err(MeshError::Internal {
                    reason: format!("boundary edge {} outside the shape index", b.edge_index),
                });
            };
            faces.push(slot);
            if faces.len() > 2 {
                return Err(MeshError::NonManifoldEdge {
                    edge_index: b.edge_index,
                    faces: faces.len(),
                });
            }
        }
    }
    Ok(adjacency)
}

/// The edge's chain on face `slot`, mapped into that face's vertex buffer.
fn boundary_polyline(extraction: &Extraction, slot: usize, edge_index: usize) -> Option<Vec<[f64; 3]>> {
    let face: &FaceRecord = extraction.faces.get(slot)?;
    let chain = extraction
        .boundaries
        .get(slot)?
        .iter()
        .find(|b| b.edge_index == edge_index)?
        .chain
        .as_ref()?;
    chain.iter().map(|&i| face.vertex(i as usize)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_faces, TriangulationScope};
    use brep_kernel::{MockKernel, ShapeHandle};

    const DEV: Deviation = Deviation {
        linear: 0.1,
        angular: 0.1,
    };

    fn run(kernel: &mut MockKernel, shape: &ShapeHandle) -> (Result<Vec<EdgeRecord>, MeshError>, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let index = ShapeIndex::build(&*kernel, shape, 100_000_000, &mut diagnostics).unwrap();
        let scope = TriangulationScope::acquire(kernel, shape, &DEV).unwrap();
        let extraction = extract_faces(&*scope, shape, &index, &mut diagnostics).unwrap();
        let edges = build_edges(&*scope, &index, &extraction, &DEV, &mut diagnostics);
        (edges, diagnostics)
    }

    #[test]
    fn cube_edges_all_shared_once() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_box(1.0, 1.0, 1.0);
        let (edges, diagnostics) = run(&mut kernel, &shape);
        let edges = edges.unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(edges.len(), 12);
        for (i, e) in edges.iter().enumerate() {
            assert_eq!(e.edge_index, i);
            assert_eq!(e.polyline.len(), 2);
            assert_eq!(e.source, EdgeSource::SharedBoundary);
        }
    }

    #[test]
    fn plate_edges_are_free() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_plate(2.0, 1.0);
        let (edges, _) = run(&mut kernel, &shape);
        let edges = edges.unwrap();
        assert_eq!(edges.len(), 4);
        assert!(edges.iter().all(|e| e.source == EdgeSource::FreeTessellation));
    }

    #[test]
    fn fin_is_not_manifold() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_fin();
        let (edges, _) = run(&mut kernel, &shape);
        assert!(matches!(
            edges,
            Err(MeshError::NonManifoldEdge { faces: 3, .. })
        ));
    }

    #[test]
    fn seam_and_circles_are_free() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_cylinder_band(1.0, 1.0, 12);
        let (edges, _) = run(&mut kernel, &shape);
        let edges = edges.unwrap();
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().all(|e| e.source == EdgeSource::FreeTessellation));
        // Both circles close on themselves.
        for e in edges.iter().filter(|e| e.polyline.len() > 2) {
            let (a, b) = (e.polyline[0], e.polyline[e.polyline.len() - 1]);
            assert!((a[0] - b[0]).abs() < 1e-9 && (a[1] - b[1]).abs() < 1e-9);
        }
    }

    #[test]
    fn skipped_face_turns_its_edges_free() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_box(1.0, 1.0, 1.0);
        let top = kernel.faces(&shape).unwrap()[1];
        kernel.set_face_untriangulated(top);

        let (edges, _) = run(&mut kernel, &shape);
        let edges = edges.unwrap();
        assert_eq!(edges.len(), 12);
        let free = edges
            .iter()
            .filter(|e| e.source == EdgeSource::FreeTessellation)
            .count();
        assert_eq!(free, 4);
    }

    #[test]
    fn unparametrizable_free_edge_dropped() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_plate(1.0, 1.0);
        let face = kernel.faces(&shape).unwrap()[0];
        let edge = kernel.face_edges(face).unwrap()[2];
        kernel.set_edge_unparametrizable(edge);

        let (edges, diagnostics) = run(&mut kernel, &shape);
        let edges = edges.unwrap();
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().all(|e| e.edge_index != 2));
        assert!(matches!(
            diagnostics.as_slice(),
            [Diagnostic::EdgeDropped { edge_index: 2, .. }]
        ));
    }

    #[test]
    fn construction_edge_is_free() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_box(1.0, 1.0, 1.0);
        kernel.add_construction_edge(&shape, [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);

        let (edges, _) = run(&mut kernel, &shape);
        let edges = edges.unwrap();
        assert_eq!(edges.len(), 13);
        assert_eq!(edges[12].source, EdgeSource::FreeTessellation);
        assert_eq!(edges[12].polyline, vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
    }
}
