use super::roots::quadric_coeffs;
use crate::scene::{Surface, SurfaceKind};
use crate::simd::{Lanes, Mask, Vec3L};

/// Evaluate a bounding array's group quadric against the batch's local
/// `DFF`/`RAY` and report whether every lane misses it (spec §4.D step 4
/// "Bounding arrays"): when this returns `true`, the caller skips the
/// `count` surfaces this bound covers instead of testing each one.
pub fn bound_rejects_all<const W: usize>(bound: &Surface, dff: Vec3L<W>, ray: Vec3L<W>) -> bool {
	let (sci, scj, sci_w) = match &bound.kind {
		SurfaceKind::Quadric { sci, scj, sci_w } | SurfaceKind::TwoPlane { sci, scj, sci_w } => (*sci, *scj, *sci_w),
		SurfaceKind::Plane => return false, // a bound is always a closed volume; a plane bound never rejects.
	};

	let (a, b, c) = quadric_coeffs(sci, scj, sci_w, dff, ray);
	let d = b * b - a * c;
	let hits: Mask<W> = d.ge(Lanes::ZERO);
	hits.none()
}
