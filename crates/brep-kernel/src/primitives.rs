//! Shape builders on top of truck's sweep API, used to feed `TruckKernel`.
//!
//! truck has no built-in box or cylinder; everything is built from successive sweeps.

use std::f64::consts::PI;
use truck_modeling::builder;
use truck_modeling::topology::{Shell, Solid};
use truck_modeling::{EuclideanSpace, Point3, Rad, Vector3};

/// Create a box solid via successive translational sweeps.
/// Origin at (0,0,0), extends to (w,h,d).
pub fn make_box(w: f64, h: f64, d: f64) -> Solid {
    let v = builder::vertex(Point3::new(0.0, 0.0, 0.0));
    let edge = builder::tsweep(&v, Vector3::new(w, 0.0, 0.0));
    let face = builder::tsweep(&edge, Vector3::new(0.0, h, 0.0));
    builder::tsweep(&face, Vector3::new(0.0, 0.0, d))
}

/// Create a cylinder solid: circle wire → face → translational sweep.
/// Base centered at origin in XY plane, extending along +Z.
pub fn make_cylinder(radius: f64, height: f64) -> Option<Solid> {
    let v = builder::vertex(Point3::new(radius, 0.0, 0.0));
    let wire = builder::rsweep(&v, Point3::origin(), Vector3::unit_z(), Rad(2.0 * PI));
    let face = builder::try_attach_plane(&[wire]).ok()?;
    Some(builder::tsweep(&face, Vector3::new(0.0, 0.0, height)))
}

/// A single open rectangle in the XY plane, as a one-face shell.
pub fn make_plate(w: f64, h: f64) -> Shell {
    let v = builder::vertex(Point3::new(0.0, 0.0, 0.0));
    let edge = builder::tsweep(&v, Vector3::new(w, 0.0, 0.0));
    let face = builder::tsweep(&edge, Vector3::new(0.0, h, 0.0));
    vec![face].into()
}
