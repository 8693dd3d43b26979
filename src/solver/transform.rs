use crate::math::{Mat3, Vec3};
use crate::scene::Surface;
use crate::simd::{Lanes, Vec3L};

/// The per-surface local-space `DFF`/`RAY`, and whether this surface needed
/// an actual rotation (as opposed to the diagonal-only fastpath) to produce
/// them (spec §4.D step 3 "Transform").
pub struct LocalRay<const W: usize> {
	pub dff: Vec3L<W>,
	pub ray: Vec3L<W>,
}

/// Transform a world-space `DFF`/`RAY` pair into a surface's local frame.
///
/// Surfaces with `transform: None` or a diagonal transform only need a
/// component-wise scale (`Surface::has_diagonal_transform`, spec §4.D step 3
/// "fastpath"); anything else goes through the full 3x3 rotation.
pub fn to_local<const W: usize>(surface: &Surface, dff_world: Vec3L<W>, ray_world: Vec3L<W>) -> LocalRay<W> {
	if !surface.needs_transform() {
		return LocalRay { dff: dff_world, ray: ray_world };
	}

	if surface.has_diagonal_transform() {
		let scale = diagonal_scale(surface.transform.as_ref());
		return LocalRay {
			dff: scale_axes(dff_world, scale),
			ray: scale_axes(ray_world, scale),
		};
	}

	let m = surface.transform.expect("needs_transform implies a transform is set");
	LocalRay {
		dff: Vec3L::from_fn(|i| m.transform(dff_world.lane(i))),
		ray: Vec3L::from_fn(|i| m.transform(ray_world.lane(i))),
	}
}

/// The diagonal-only scale of a surface's transform (identity scale when
/// there is none), used both for the diagonal-transform intersection
/// fastpath above and as the scale term the conic-singularity snap sizes
/// its epsilon offset against (`solver::conic_singularity_adjust`).
pub(crate) fn diagonal_scale(transform: Option<&Mat3>) -> Vec3 {
	match transform {
		Some(m) => Vec3::new(m.rows[0].x, m.rows[1].y, m.rows[2].z),
		None => Vec3::ONE,
	}
}

fn scale_axes<const W: usize>(v: Vec3L<W>, scale: Vec3) -> Vec3L<W> {
	Vec3L {
		x: v.x * Lanes::splat(scale.x),
		y: v.y * Lanes::splat(scale.y),
		z: v.z * Lanes::splat(scale.z),
	}
}

/// A cached local-space transform shared by every surface in a trnode's
/// span (spec §4.D step 2, §4.E `TransformGroup`): the first surface that
/// needs it computes `to_local`, siblings with an identical position and
/// transform reuse the result instead of recomputing the rotation.
pub struct TrnodeCache<const W: usize> {
	position: Vec3,
	transform: Option<Mat3>,
	cached: Option<LocalRay<W>>,
}

impl<const W: usize> TrnodeCache<W> {
	pub fn new(position: Vec3, transform: Option<Mat3>) -> Self {
		Self { position, transform, cached: None }
	}

	/// Fetch or compute this trnode's local `DFF`/`RAY`, given the
	/// already-offset world-space ray (`dff_world = org - position` has
	/// already been applied by the caller, matching spec §4.D step 1's
	/// self-hit-shortcut ordering: offset first, then rotate).
	pub fn get_or_compute(&mut self, dff_world: Vec3L<W>, ray_world: Vec3L<W>) -> &LocalRay<W> {
		if self.cached.is_none() {
			let local = match self.transform {
				Some(m) => LocalRay {
					dff: Vec3L::from_fn(|i| m.transform(dff_world.lane(i))),
					ray: Vec3L::from_fn(|i| m.transform(ray_world.lane(i))),
				},
				None => LocalRay { dff: dff_world, ray: ray_world },
			};
			self.cached = Some(local);
		}
		self.cached.as_ref().unwrap()
	}

	pub fn position(&self) -> Vec3 {
		self.position
	}

	/// Whether a sibling trnode entry (same position, same transform by
	/// value) can share this cache instead of starting a new one.
	pub fn matches(&self, position: Vec3, transform: Option<Mat3>) -> bool {
		self.position == position && self.transform == transform
	}
}
