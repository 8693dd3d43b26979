use super::list::ClipList;
use crate::math::{Mat3, Vec3};

/// Per-axis min/max clipper with an enable flag (spec §3 "axis clippers").
#[derive(Clone, Copy, Debug)]
pub struct AxisClip {
	pub enabled: bool,
	pub min: f32,
	pub max: f32,
}

impl AxisClip {
	pub const DISABLED: Self = Self { enabled: false, min: f32::NEG_INFINITY, max: f32::INFINITY };

	pub fn enabled(min: f32, max: f32) -> Self {
		debug_assert!(min <= max, "axis clip min must not exceed max");
		Self { enabled: true, min, max }
	}

	pub fn contains(&self, value: f32) -> bool {
		!self.enabled || (value >= self.min && value <= self.max)
	}
}

/// Material assignment for one side of a closed surface.
#[derive(Clone, Copy, Debug, Default)]
pub struct SidedMaterial {
	pub outer: Option<u32>,
	pub inner: Option<u32>,
}

/// The primitive surface kinds the solver knows how to intersect (spec
/// §4.D). Per the design notes (spec §9) this is a tagged variant instead
/// of an integer-tag branch; bounding arrays and transform nodes are not
/// surfaces themselves, they are `ListElem` wrappers (see `list.rs`) that
/// reference one of these for the group-bounding test.
#[derive(Clone, Debug)]
pub enum SurfaceKind {
	/// `t = -DFF_k / RAY_k`, `k` the plane-normal axis (always the local Z
	/// axis after the axis permutation is applied).
	Plane,
	/// A general quadric: `a, b, c` derived from `sci` (diagonal), `scj`
	/// (offset) and `sci_w` (constant) per spec §4.D step 5.
	Quadric { sci: Vec3, scj: Vec3, sci_w: f32 },
	/// A variant formulation where the cross term is sign-sensitive and
	/// the discriminant must be forced non-negative (spec §4.D step 5).
	TwoPlane { sci: Vec3, scj: Vec3, sci_w: f32 },
}

/// A scene surface (spec §3).
#[derive(Clone, Debug)]
pub struct Surface {
	pub kind: SurfaceKind,
	pub position: Vec3,

	pub axis_clip: [AxisClip; 3],
	/// Axis permutation mapping local I/J/K to world X/Y/Z, plus the
	/// per-axis handedness sign.
	pub axis_map: [usize; 3],
	pub axis_sign: [f32; 3],

	pub transform: Option<Mat3>,

	pub material: SidedMaterial,
	pub custom_clip: Option<ClipList>,

	/// Flips the outer/inner-side normal base.
	pub sign_base: [f32; 2],

	pub d_eps: f32,
	pub t_eps: f32,

	/// Set for quadrics whose apex needs the conic-singularity snap (spec
	/// §4.D "Conic singularity adjustment").
	pub conic_singularity: bool,

	/// Derived tags recomputed by `update()`; `None` until the first call.
	derived: Option<DerivedTags>,
}

#[derive(Clone, Copy, Debug)]
struct DerivedTags {
	is_identity_transform: bool,
	is_diagonal_transform: bool,
	is_closed: bool,
}

impl Surface {
	pub fn new(
		kind: SurfaceKind,
		position: Vec3,
		axis_map: [usize; 3],
		axis_sign: [f32; 3],
		material: SidedMaterial,
	) -> Self {
		debug_assert!(is_bijection(axis_map), "axis_map must be a bijection on {{I,J,K}} -> {{X,Y,Z}}");
		let mut surface = Self {
			kind,
			position,
			axis_clip: [AxisClip::DISABLED; 3],
			axis_map,
			axis_sign,
			transform: None,
			material,
			custom_clip: None,
			sign_base: [1.0, -1.0],
			d_eps: 1e-6,
			t_eps: 1e-3,
			conic_singularity: false,
			derived: None,
		};
		surface.update();
		surface
	}

	/// Precompute derived tags for this surface (spec §6 `update(surface)`
	/// entry point). Must be called after constructing or mutating a
	/// surface and before it's placed in a scene list.
	pub fn update(&mut self) {
		let is_identity_transform = self.transform.map_or(true, |m| m == Mat3::IDENTITY);
		let is_diagonal_transform = self.transform.map_or(true, |m| m.is_diagonal());
		let is_closed = matches!(self.kind, SurfaceKind::Quadric { .. } | SurfaceKind::TwoPlane { .. });

		self.derived = Some(DerivedTags { is_identity_transform, is_diagonal_transform, is_closed });
	}

	fn derived(&self) -> DerivedTags {
		self.derived.expect("Surface::update must be called before use")
	}

	pub fn needs_transform(&self) -> bool {
		!self.derived().is_identity_transform
	}

	pub fn has_diagonal_transform(&self) -> bool {
		self.derived().is_diagonal_transform
	}

	/// Whether this surface has both an outer and inner root to test
	/// (spec §4.D step 8 "per-side loop").
	pub fn is_closed(&self) -> bool {
		self.derived().is_closed
	}

	pub fn material_for_side(&self, inner: bool) -> Option<u32> {
		if inner { self.material.inner } else { self.material.outer }
	}
}

fn is_bijection(map: [usize; 3]) -> bool {
	let mut seen = [false; 3];
	for &idx in &map {
		if idx >= 3 || seen[idx] {
			return false;
		}
		seen[idx] = true;
	}
	true
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn update_detects_identity_transform() {
		let mut surface = Surface::new(
			SurfaceKind::Plane,
			Vec3::ZERO,
			[0, 1, 2],
			[1.0, 1.0, 1.0],
			SidedMaterial { outer: Some(0), inner: None },
		);
		assert!(!surface.needs_transform());

		surface.transform = Some(Mat3::from_rows(Vec3::new(0.0, 1.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), Vec3::Z));
		surface.update();
		assert!(surface.needs_transform());
	}

	#[test]
	fn closed_surfaces_are_quadrics() {
		let plane = Surface::new(SurfaceKind::Plane, Vec3::ZERO, [0, 1, 2], [1.0; 3], SidedMaterial::default());
		assert!(!plane.is_closed());

		let sphere = Surface::new(
			SurfaceKind::Quadric { sci: Vec3::ONE, scj: Vec3::ZERO, sci_w: -1.0 },
			Vec3::ZERO,
			[0, 1, 2],
			[1.0; 3],
			SidedMaterial { outer: Some(0), inner: Some(0) },
		);
		assert!(sphere.is_closed());
	}

	#[test]
	#[should_panic]
	fn non_bijective_axis_map_panics() {
		Surface::new(SurfaceKind::Plane, Vec3::ZERO, [0, 0, 2], [1.0; 3], SidedMaterial::default());
	}
}
