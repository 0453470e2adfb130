//! Conversion of truck face meshes into kernel `Triangulation`s.
//!
//! truck stores positions, UVs and normals as separate attribute arrays with
//! per-corner indices. The mesher wants one node per distinct corner, so
//! corners are re-indexed into flat node arrays here, and boundary polylines
//! are located on those nodes to recover polygon-on-triangulation chains.

use crate::types::Triangulation;
use nalgebra::Isometry3;
use std::collections::HashMap;
use truck_meshalgo::prelude::*;
use truck_modeling::geometry::Surface;
use truck_modeling::{InnerSpace, ParametricSurface3D, Point3, Vector3};

/// Boundary polyline points closer than this to a node land on that node.
const NODE_MATCH_TOLERANCE: f64 = 1e-6;

type CornerKey = (usize, Option<usize>, Option<usize>);

/// Flatten a meshed face into a `Triangulation`.
///
/// Triangles keep truck's winding, which follows the surface normal. Shading
/// normals are flipped for reversed faces so they always face outward. Corners
/// without a stored normal fall back to the surface normal at their UV, or the
/// triangle normal when the mesh carries no UVs.
pub fn flatten_face_mesh(mesh: &PolygonMesh, surface: &Surface, reversed: bool) -> Triangulation {
    let positions = mesh.positions();
    let uv_coords = mesh.uv_coords();
    let normals = mesh.normals();
    let sign = if reversed { -1.0 } else { 1.0 };

    // Quads split along their first diagonal.
    let mut corner_triangles = Vec::new();
    for tri in mesh.tri_faces() {
        corner_triangles.push([tri[0], tri[1], tri[2]]);
    }
    for quad in mesh.quad_faces() {
        corner_triangles.push([quad[0], quad[1], quad[2]]);
        corner_triangles.push([quad[0], quad[2], quad[3]]);
    }

    let has_uv = !uv_coords.is_empty()
        && corner_triangles
            .iter()
            .all(|tri| tri.iter().all(|v| v.uv.is_some()));

    let mut slots: HashMap<CornerKey, u32> = HashMap::new();
    let mut nodes: Vec<[f64; 3]> = Vec::new();
    let mut uv_nodes: Vec<[f64; 2]> = Vec::new();
    let mut node_normals: Vec<[f64; 3]> = Vec::new();
    let mut triangles: Vec<[u32; 3]> = Vec::with_capacity(corner_triangles.len());

    for tri in &corner_triangles {
        let p0 = positions[tri[0].pos];
        let p1 = positions[tri[1].pos];
        let p2 = positions[tri[2].pos];
        let flat = (p1 - p0).cross(p2 - p0);
        let flat = if flat.magnitude2() > 0.0 {
            flat.normalize()
        } else {
            Vector3::new(0.0, 0.0, 1.0)
        };

        let mut out = [0u32; 3];
        for (k, v) in tri.iter().enumerate() {
            let key = (v.pos, v.uv, v.nor);
            if let Some(&idx) = slots.get(&key) {
                out[k] = idx;
                continue;
            }

            let p = positions[v.pos];
            let uv = v.uv.map(|i| uv_coords[i]);
            let n = match (v.nor, uv) {
                (Some(i), _) => normals[i] * sign,
                (None, Some(uv)) => surface.normal(uv[0], uv[1]) * sign,
                (None, None) => flat * sign,
            };

            let idx = nodes.len() as u32;
            nodes.push([p[0], p[1], p[2]]);
            if let Some(uv) = uv {
                uv_nodes.push([uv[0], uv[1]]);
            }
            node_normals.push([n[0], n[1], n[2]]);
            slots.insert(key, idx);
            out[k] = idx;
        }
        triangles.push(out);
    }

    Triangulation {
        nodes,
        uv_nodes: has_uv.then_some(uv_nodes),
        normals: node_normals,
        triangles,
        location: Isometry3::identity(),
    }
}

/// Locate every polyline point on a node, returning the node chain in
/// polyline order. `None` if any point has no node under it.
pub fn chain_on_nodes(polyline: &[Point3], nodes: &[[f64; 3]]) -> Option<Vec<u32>> {
    if polyline.len() < 2 {
        return None;
    }
    polyline
        .iter()
        .map(|p| {
            let mut best: Option<(u32, f64)> = None;
            for (i, n) in nodes.iter().enumerate() {
                let d2 = (n[0] - p[0]).powi(2) + (n[1] - p[1]).powi(2) + (n[2] - p[2]).powi(2);
                if best.map_or(true, |(_, b)| d2 < b) {
                    best = Some((i as u32, d2));
                }
            }
            best.filter(|(_, d2)| d2.sqrt() <= NODE_MATCH_TOLERANCE)
                .map(|(i, _)| i)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use truck_meshalgo::tessellation::MeshableShape;

    #[test]
    fn test_flatten_box_faces() {
        let solid = primitives::make_box(1.0, 1.0, 1.0);
        let meshed = solid.triangulation(0.1);

        let mut faces = 0;
        for (shell, meshed_shell) in solid.boundaries().iter().zip(meshed.boundaries().iter()) {
            for (face, meshed_face) in shell.face_iter().zip(meshed_shell.face_iter()) {
                let Some(mesh) = meshed_face.surface() else {
                    continue;
                };
                let tri = flatten_face_mesh(&mesh, &face.surface(), !face.orientation());
                assert!(tri.triangle_count() >= 2);
                assert_eq!(tri.normals.len(), tri.node_count());
                for t in &tri.triangles {
                    assert!(t.iter().all(|&i| (i as usize) < tri.node_count()));
                }
                if let Some(uv) = &tri.uv_nodes {
                    assert_eq!(uv.len(), tri.node_count());
                }
                faces += 1;
            }
        }
        assert_eq!(faces, 6);
    }

    #[test]
    fn test_chain_on_nodes() {
        let nodes = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]];
        let line = [Point3::new(1.0, 1.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        assert_eq!(chain_on_nodes(&line, &nodes), Some(vec![2, 1]));

        let off = [Point3::new(0.5, 0.5, 0.0), Point3::new(1.0, 0.0, 0.0)];
        assert_eq!(chain_on_nodes(&off, &nodes), None);
    }
}
