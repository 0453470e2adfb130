//! Property-based tests for packing and assembly invariants using `proptest`.

use proptest::prelude::*;

use brep_kernel::{MockKernel, Orientation};
use shape_mesher::atlas::{pack, remap_uvs, PackingBox};
use shape_mesher::{shape_to_mesh, MeshOptions};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

/// Inner (unpadded) box extents.
fn arb_extents() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.01f64..50.0, 0.01f64..50.0), 1..40)
}

fn arb_padding() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), Just(2.0), 0.0f64..5.0]
}

fn arb_dim() -> impl Strategy<Value = f64> {
    0.1f64..10.0
}

fn padded(extents: &[(f64, f64)], padding: f64) -> Vec<PackingBox> {
    extents
        .iter()
        .enumerate()
        .map(|(face_index, &(w, h))| PackingBox {
            width: w + padding,
            height: h + padding,
            face_index,
        })
        .collect()
}

const TOL: f64 = 1e-9;

// ---------------------------------------------------------------------------
// 1. Packed boxes never overlap and stay inside the reported extent
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn packed_boxes_do_not_overlap(extents in arb_extents(), padding in arb_padding()) {
        let boxes = padded(&extents, padding);
        let (placed, stats) = pack(&boxes);

        prop_assert_eq!(placed.len(), boxes.len());
        for (p, b) in placed.iter().zip(&boxes) {
            prop_assert_eq!(p.packing_box, *b);
            prop_assert!(p.x >= 0.0 && p.y >= 0.0);
            prop_assert!(p.x + b.width <= stats.w + TOL);
            prop_assert!(p.y + b.height <= stats.h + TOL);
        }
        for i in 0..placed.len() {
            for j in i + 1..placed.len() {
                let (a, b) = (&placed[i], &placed[j]);
                let overlap_x = a.x < b.x + b.packing_box.width - TOL
                    && b.x < a.x + a.packing_box.width - TOL;
                let overlap_y = a.y < b.y + b.packing_box.height - TOL
                    && b.y < a.y + a.packing_box.height - TOL;
                prop_assert!(!(overlap_x && overlap_y), "boxes {} and {} overlap", i, j);
            }
        }
        prop_assert!(stats.fill > 0.0 && stats.fill <= 1.0 + TOL);
    }
}

// ---------------------------------------------------------------------------
// 2. Remapped UVs of every packed face land in [0,1]²
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn remapped_uvs_stay_in_unit_square(
        extents in arb_extents(),
        padding in arb_padding(),
        corner in (0.0f64..=1.0, 0.0f64..=1.0),
    ) {
        let boxes = padded(&extents, padding);
        let (placed, stats) = pack(&boxes);
        let side = stats.side();

        for p in &placed {
            let mut uvs = vec![0.0, 0.0, 1.0, 1.0, corner.0, corner.1];
            remap_uvs(&mut uvs, p, padding, side);
            for x in uvs {
                prop_assert!((-TOL..=1.0 + TOL).contains(&x), "uv {} outside the atlas", x);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Whole-pass invariants on arbitrary boxes
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn mesh_pass_invariants(
        w in arb_dim(),
        h in arb_dim(),
        d in arb_dim(),
        subdivisions in 1u32..4,
        reversed_mask in 0u8..64,
    ) {
        let mut kernel = MockKernel::new().with_subdivisions(subdivisions);
        let shape = kernel.make_box_with(w, h, d, |i| {
            if reversed_mask & (1 << i) != 0 {
                Orientation::Reversed
            } else {
                Orientation::Forward
            }
        });
        let bundle = shape_to_mesh(&mut kernel, &shape, &MeshOptions::default(), 1).unwrap();
        let mesh = &bundle.mesh;
        let n = subdivisions as usize;

        // Indices in range, buffers vertex-aligned.
        let vertices = mesh.vertex_count();
        prop_assert!(mesh.indices.iter().all(|&i| (i as usize) < vertices));
        prop_assert_eq!(mesh.uvs.len() / 2, vertices);
        prop_assert!(mesh.uvs.iter().all(|&x| (-1e-6..=1.0 + 1e-6).contains(&x)));

        // Face ranges sorted, contiguous, sized by triangle count.
        prop_assert_eq!(mesh.face_metadata.len(), 6);
        let mut next = 0;
        for (i, face) in mesh.face_metadata.iter().enumerate() {
            prop_assert_eq!(face.face_index as usize, i);
            prop_assert_eq!(face.start_triangle, next);
            prop_assert_eq!(face.triangle_count() as usize, 2 * n * n);
            next = face.end_triangle;
        }

        // Every box edge shared, drawn once, one segment per boundary node gap.
        prop_assert_eq!(bundle.edges.edge_metadata.len(), 12);
        prop_assert_eq!(bundle.edges.segment_count(), 12 * n);
        prop_assert!(bundle.diagnostics.is_empty());
        prop_assert!(!kernel.is_meshed(&shape));
    }
}
