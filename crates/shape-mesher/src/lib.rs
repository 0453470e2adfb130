//! shape-mesher: converts a B-rep shape held by a [`brep_kernel::BrepKernel`]
//! into one merged triangle mesh, a deduplicated edge line batch, pick
//! metadata for both, and a packed UV atlas.
//!
//! A pass runs [`index`] → [`extract`] → [`edges`] → [`atlas`] → [`assemble`],
//! driven by [`pipeline::shape_to_mesh`]. [`worker`] moves a pass off the
//! interactive thread.

pub mod assemble;
pub mod atlas;
pub mod config;
pub mod edges;
pub mod error;
pub mod extract;
pub mod index;
pub mod pick;
pub mod pipeline;
pub mod worker;

pub use assemble::{DrawableMesh, EdgeBatch, EdgeMetadata, FaceMetadata};
pub use atlas::PackingStats;
pub use config::MeshOptions;
pub use edges::{EdgeRecord, EdgeSource};
pub use error::{Diagnostic, MeshError};
pub use extract::{FaceRecord, UvBounds};
pub use pipeline::{shape_to_mesh, MeshBundle};
pub use worker::{spawn_regeneration, MeshSlot, Regeneration, SlotUpdate};
