use crate::types::*;

/// The B-rep kernel as seen by the mesher.
///
/// Implemented by `TruckKernel` (wraps real truck) and `MockKernel`
/// (deterministic test double). Exploration order of `faces` and `edges` must
/// be stable for an unchanged shape.
pub trait BrepKernel {
    /// All faces of a shape, in the kernel's native exploration order.
    fn faces(&self, shape: &ShapeHandle) -> Result<Vec<KernelId>, KernelError>;

    /// All edges of a shape in exploration order. An edge shared by several
    /// faces may be listed more than once.
    fn edges(&self, shape: &ShapeHandle) -> Result<Vec<KernelId>, KernelError>;

    /// Boundary edges of a face. Seam edges may be listed twice.
    fn face_edges(&self, face: KernelId) -> Result<Vec<KernelId>, KernelError>;

    /// Topological hash of a face or edge in `[0, upper)`.
    fn hash_code(&self, entity: KernelId, upper: u64) -> Result<TopoHash, KernelError>;

    /// Compute (or refine) the triangulation of every face of a shape.
    fn incremental_mesh(
        &mut self,
        shape: &ShapeHandle,
        deviation: &Deviation,
    ) -> Result<(), KernelError>;

    /// Drop every triangulation computed for a shape.
    fn release_triangulations(&mut self, shape: &ShapeHandle);

    /// The face's current triangulation, or `None` when meshing produced nothing.
    fn triangulation(&self, face: KernelId) -> Option<Triangulation>;

    /// Node indices of the face triangulation lying on the given boundary edge,
    /// in curve order.
    fn polygon_on_triangulation(&self, edge: KernelId, face: KernelId) -> Option<Vec<u32>>;

    fn face_orientation(&self, face: KernelId) -> Result<Orientation, KernelError>;

    fn surface_kind(&self, face: KernelId) -> Result<SurfaceKind, KernelError>;

    /// Evaluate the face's underlying surface at native parameters `(u, v)`.
    fn surface_d0(&self, face: KernelId, u: f64, v: f64) -> Result<[f64; 3], KernelError>;

    /// Adaptive point sampling of an edge curve to the given deviation.
    fn tessellate_edge(
        &self,
        edge: KernelId,
        deviation: &Deviation,
    ) -> Result<Vec<[f64; 3]>, KernelError>;
}
