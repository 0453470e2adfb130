//! UV atlas: arc-length sized boxes per parametrized face, packed into one
//! square and used to rewrite face UVs into a shared [0,1]² texture space.

use brep_kernel::{BrepKernel, KernelError, KernelId};
use nalgebra::Point3;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::MeshOptions;
use crate::error::MeshError;
use crate::extract::FaceRecord;

/// Packer target fill used to size the initial shelf width.
const TARGET_FILL: f64 = 0.95;

/// A padded rectangle to place, sized in arc-length units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackingBox {
    pub width: f64,
    pub height: f64,
    pub face_index: usize,
}

/// A box and the position of its lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedBox {
    pub packing_box: PackingBox,
    pub x: f64,
    pub y: f64,
}

/// Extent of a packed layout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PackingStats {
    pub w: f64,
    pub h: f64,
    /// Total box area over `w * h`; 0 for an empty layout.
    pub fill: f64,
}

impl PackingStats {
    /// Side of the square the layout is normalized by.
    pub fn side(&self) -> f64 {
        self.w.max(self.h)
    }
}

#[derive(Debug, Clone, Copy)]
struct Space {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

/// Shelf/skyline packing. Boxes go tallest first into the most recently
/// created free space that fits; `placements[i]` belongs to `boxes[i]`.
pub fn pack(boxes: &[PackingBox]) -> (Vec<PlacedBox>, PackingStats) {
    if boxes.is_empty() {
        return (Vec::new(), PackingStats::default());
    }

    let mut area = 0.0;
    let mut max_width: f64 = 0.0;
    for b in boxes {
        area += b.width * b.height;
        max_width = max_width.max(b.width);
    }

    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| boxes[b].height.total_cmp(&boxes[a].height));

    let start_width = (area / TARGET_FILL).sqrt().ceil().max(max_width);
    // The first space always keeps the full start width and unbounded height,
    // so every box finds a place.
    let mut spaces = vec![Space {
        x: 0.0,
        y: 0.0,
        w: start_width,
        h: f64::INFINITY,
    }];

    let mut placements: Vec<PlacedBox> = boxes
        .iter()
        .map(|&packing_box| PlacedBox {
            packing_box,
            x: 0.0,
            y: 0.0,
        })
        .collect();
    let (mut width, mut height): (f64, f64) = (0.0, 0.0);

    for &i in &order {
        let b = boxes[i];
        for s in (0..spaces.len()).rev() {
            let space = spaces[s];
            if b.width > space.w || b.height > space.h {
                continue;
            }

            placements[i].x = space.x;
            placements[i].y = space.y;
            width = width.max(space.x + b.width);
            height = height.max(space.y + b.height);

            if b.width == space.w && b.height == space.h {
                spaces.swap_remove(s);
            } else if b.height == space.h {
                spaces[s].x += b.width;
                spaces[s].w -= b.width;
            } else if b.width == space.w {
                spaces[s].y += b.height;
                spaces[s].h -= b.height;
            } else {
                spaces.push(Space {
                    x: space.x + b.width,
                    y: space.y,
                    w: space.w - b.width,
                    h: b.height,
                });
                spaces[s].y += b.height;
                spaces[s].h -= b.height;
            }
            break;
        }
    }

    let fill = if width > 0.0 && height > 0.0 {
        area / (width * height)
    } else {
        0.0
    };
    (
        placements,
        PackingStats {
            w: width,
            h: height,
            fill,
        },
    )
}

/// Length of `curve` over `[t0, t1]` as the sum of `segments` equal-step chords.
pub fn sampled_arc_length(
    mut curve: impl FnMut(f64) -> Result<[f64; 3], KernelError>,
    t0: f64,
    t1: f64,
    segments: u32,
) -> Result<f64, KernelError> {
    let segments = segments.max(1);
    let mut previous = Point3::from(curve(t0)?);
    let mut length = 0.0;
    for k in 1..=segments {
        let t = t0 + (t1 - t0) * f64::from(k) / f64::from(segments);
        let p = Point3::from(curve(t)?);
        length += nalgebra::distance(&previous, &p);
        previous = p;
    }
    Ok(length)
}

/// Box for a face with UVs: arc length of the mid-V curve along U by the
/// mid-U curve along V, each grown by `padding`. `None` without UVs.
pub fn face_box<K: BrepKernel + ?Sized>(
    kernel: &K,
    face: &FaceRecord,
    options: &MeshOptions,
) -> Result<Option<PackingBox>, MeshError> {
    let Some(bounds) = face.uv_bounds.filter(|_| face.has_uvs()) else {
        return Ok(None);
    };
    let id: KernelId = face.face_id;
    let segments = options.arc_length_segments;

    let (u_mid, v_mid) = (bounds.u_mid(), bounds.v_mid());
    let w = sampled_arc_length(
        |u| kernel.surface_d0(id, u, v_mid),
        bounds.u_min,
        bounds.u_max,
        segments,
    )?;
    let h = sampled_arc_length(
        |v| kernel.surface_d0(id, u_mid, v),
        bounds.v_min,
        bounds.v_max,
        segments,
    )?;

    Ok(Some(PackingBox {
        width: w + options.atlas_padding,
        height: h + options.atlas_padding,
        face_index: face.face_index,
    }))
}

/// Size, pack and remap every face with UVs. Vertices and normals are not
/// touched; faces without UVs are left out of the layout.
#[instrument(skip(kernel, faces, options), fields(faces = faces.len()))]
pub fn build_atlas<K: BrepKernel + ?Sized>(
    kernel: &K,
    faces: &mut [FaceRecord],
    options: &MeshOptions,
) -> Result<PackingStats, MeshError> {
    let mut boxes = Vec::new();
    let mut slots = Vec::new();
    for (slot, face) in faces.iter().enumerate() {
        if let Some(b) = face_box(kernel, face, options)? {
            debug!(face_index = b.face_index, width = b.width, height = b.height, "atlas box");
            boxes.push(b);
            slots.push(slot);
        }
    }

    let (placements, stats) = pack(&boxes);
    let side = stats.side();
    if side > 0.0 {
        for (placed, &slot) in placements.iter().zip(&slots) {
            remap_uvs(&mut faces[slot].uvs, placed, options.atlas_padding, side);
        }
    }

    info!(
        boxes = boxes.len(),
        w = stats.w,
        h = stats.h,
        fill = stats.fill,
        "uv atlas packed"
    );
    Ok(stats)
}

/// Move normalized face UVs into the placed box, inset by half the padding on
/// every side, then scale by the atlas side.
pub fn remap_uvs(uvs: &mut [f64], placed: &PlacedBox, padding: f64, side: f64) {
    let inner_w = placed.packing_box.width - padding;
    let inner_h = placed.packing_box.height - padding;
    for uv in uvs.chunks_exact_mut(2) {
        uv[0] = (uv[0] * inner_w + placed.x + padding / 2.0) / side;
        uv[1] = (uv[1] * inner_h + placed.y + padding / 2.0) / side;
    }
}
