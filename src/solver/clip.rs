use crate::scene::{AxisClip, ClipElem, ClipList, Surface, SurfaceArena, SurfaceKind};
use crate::simd::{Lanes, Mask, Vec3L};

/// Evaluate one custom-clip surface's signed implicit function at a local
/// hit point (spec §4.D "Custom clippers"): `F(p) >= 0` is the side kept.
/// Clip surfaces are evaluated in the same local frame as the subject
/// surface's own `HIT` (an Open Question resolution recorded in
/// DESIGN.md), so `clip.position`/`clip.transform` are nested offsets
/// within that frame rather than a second world-space transform.
pub fn evaluate_clip_surface<const W: usize>(clip: &Surface, hit_local: Vec3L<W>) -> Mask<W> {
	let p = Vec3L {
		x: hit_local.x - Lanes::splat(clip.position.x),
		y: hit_local.y - Lanes::splat(clip.position.y),
		z: hit_local.z - Lanes::splat(clip.position.z),
	};
	let p = match clip.transform {
		Some(m) => Vec3L::from_fn(|i| m.transform(p.lane(i))),
		None => p,
	};

	match &clip.kind {
		SurfaceKind::Plane => p.z.ge(Lanes::ZERO),
		SurfaceKind::Quadric { sci, scj, sci_w } | SurfaceKind::TwoPlane { sci, scj, sci_w } => {
			let value = p.x * p.x * Lanes::splat(sci.x)
				+ p.y * p.y * Lanes::splat(sci.y)
				+ p.z * p.z * Lanes::splat(sci.z)
				+ (p.x * Lanes::splat(scj.x) + p.y * Lanes::splat(scj.y) + p.z * Lanes::splat(scj.z)) * Lanes::splat(2.0)
				+ Lanes::splat(*sci_w);
			value.ge(Lanes::ZERO)
		}
	}
}

/// Axis min/max clipping (spec §4.D "Axis min/max"): `TMASK &= (min <=
/// HIT_axis <= max)` for every enabled axis.
pub fn apply_axis_clip<const W: usize>(axis_clip: &[AxisClip; 3], hit_local: Vec3L<W>) -> Mask<W> {
	let mut mask = Mask::ALL_TRUE;
	for (axis, clip) in axis_clip.iter().enumerate() {
		if !clip.enabled {
			continue;
		}
		let value = hit_local.axis(axis);
		let in_range = value.ge(Lanes::splat(clip.min)) & value.le(Lanes::splat(clip.max));
		mask = mask & in_range;
	}
	mask
}

/// Walk a surface's custom-clip list, applying each clipper and honoring
/// the `AccumEnter`/`AccumLeave` bracket (spec §4.D "Custom clippers",
/// §8 "well-formed pair" property): on `AccumEnter`, save the running mask
/// and reset to the subject surface's default (all lanes pass); on
/// `AccumLeave`, AND the scope's accumulated mask back into the saved one.
pub fn apply_custom_clips<const W: usize>(
	list: &ClipList,
	arena: &SurfaceArena,
	hit_local: Vec3L<W>,
	initial_mask: Mask<W>,
) -> Mask<W> {
	let mut current = initial_mask;
	let mut saved_stack: Vec<Mask<W>> = Vec::new();

	for elem in list {
		match elem {
			ClipElem::Clip(id) => {
				let clip_surface = arena.get(*id);
				current = current & evaluate_clip_surface(clip_surface, hit_local);
			}
			ClipElem::AccumEnter => {
				saved_stack.push(current);
				current = Mask::ALL_TRUE;
			}
			ClipElem::AccumLeave => {
				let saved = saved_stack.pop().expect("unmatched AccumLeave in clip list");
				current = saved & current;
			}
		}
	}

	debug_assert!(saved_stack.is_empty(), "unmatched AccumEnter in clip list");
	current
}

/// Snap the local hit point near a conic apex along the sign of `dff` and
/// the surface's scale, to keep the normal direction numerically stable
/// (spec §4.D "Conic singularity adjustment"). Coefficients here are the
/// tunables spec §9 calls out as empirically derived; only applied when
/// `near_degenerate` is set for a surface flagged `conic_singularity`.
pub fn conic_singularity_adjust<const W: usize>(
	dff_local: Vec3L<W>,
	scale: crate::math::Vec3,
	t_eps: f32,
	near_degenerate: Mask<W>,
) -> Vec3L<W> {
	let snap_axis = |dff_axis: Lanes<W>, scale_axis: f32| -> Lanes<W> {
		let snapped = dff_axis.sign() * Lanes::splat(t_eps * scale_axis.abs().max(1.0));
		Lanes::select(near_degenerate, snapped, dff_axis)
	};

	Vec3L {
		x: snap_axis(dff_local.x, scale.x),
		y: snap_axis(dff_local.y, scale.y),
		z: snap_axis(dff_local.z, scale.z),
	}
}
