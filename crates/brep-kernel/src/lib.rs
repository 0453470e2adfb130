//! B-rep kernel seam for the shape mesher.
//!
//! `BrepKernel` is everything the mesher asks of a CAD kernel: topology
//! exploration, topological hashes, per-face triangulations, surface and curve
//! evaluation. `TruckKernel` answers with truck, `MockKernel` with synthetic
//! shapes for tests.

pub mod mock_kernel;
pub mod primitives;
pub mod tessellation;
pub mod traits;
pub mod truck_kernel;
pub mod types;

pub use mock_kernel::MockKernel;
pub use traits::*;
pub use truck_kernel::TruckKernel;
pub use types::*;
