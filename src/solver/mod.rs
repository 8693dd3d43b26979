//! Ray/scene intersection (spec §4.D, §4.E).
//!
//! `intersect` walks one surface list against the batch currently loaded
//! into a `Context`, resolving the nearest visible hit per lane into
//! `Context::t_buf`/`hit_surf`/`hit_inner`. Shading (`crate::shade`) and
//! recursion (`crate::recurse`) consume that result; this module only
//! ever narrows `t_buf`, it never reads or writes color.

pub mod bounds;
pub mod clip;
pub mod roots;
pub mod transform;

use crate::context::Context;
use crate::scene::{ClipElem, ClipList, SceneElem, SceneList, Surface, SurfaceArena, SurfaceId, SurfaceKind};
use crate::simd::{ILanes, Lanes, Mask, Vec3L};
use bounds::bound_rejects_all;
use clip::{apply_axis_clip, apply_custom_clips, conic_singularity_adjust};
use roots::{quadric_coeffs, solve_plane, solve_quadric};
use transform::{diagonal_scale, to_local, TrnodeCache};

/// Test every surface in `list` against the ray batch in `ctx`, narrowing
/// `ctx.t_buf`/`hit_surf`/`hit_inner` to the nearest hit per lane (spec
/// §4.D steps 1-8). Does not clear prior state — call
/// `Context::reset_for_bounce` first for a fresh bounce.
pub fn intersect<const W: usize>(ctx: &mut Context<W>, arena: &SurfaceArena, list: &SceneList) {
	let mut i = 0usize;
	let mut trnode: Option<TrnodeCache<W>> = None;
	let mut trnode_end = 0usize;

	while i < list.len() {
		if trnode.is_some() && i >= trnode_end {
			trnode = None;
		}

		match &list[i] {
			SceneElem::TransformGroup { transform, position, last_index } => {
				trnode = Some(TrnodeCache::new(*position, Some(*transform)));
				trnode_end = *last_index;
				i += 1;
			}
			SceneElem::BoundingArray { bound, count } => {
				let bound_surface = arena.get(*bound);
				let (dff, ray) = local_ray(ctx, bound_surface, &mut trnode);
				if bound_rejects_all(bound_surface, dff, ray) {
					i += 1 + count;
				} else {
					i += 1;
				}
			}
			SceneElem::Surface(id) => {
				let surface = arena.get(*id);
				let (dff, ray) = local_ray(ctx, surface, &mut trnode);
				intersect_surface(ctx, arena, *id, surface, dff, ray);
				i += 1;
			}
		}
	}
}

/// Self-hit shortcut (spec §4.D step 1): a single-sided surface can never
/// be re-hit along the outward ray it was just left from, so skip it
/// entirely. Closed surfaces still need testing — the opposite side may
/// be the exit point for a transmitted ray.
fn local_ray<const W: usize>(ctx: &Context<W>, surface: &Surface, trnode: &mut Option<TrnodeCache<W>>) -> (Vec3L<W>, Vec3L<W>) {
	match trnode {
		Some(cache) => {
			let dff_world = ctx.org - Vec3L::splat(cache.position());
			let local = cache.get_or_compute(dff_world, ctx.ray);
			(local.dff, local.ray)
		}
		None => {
			let dff_world = ctx.org - Vec3L::splat(surface.position);
			let local = to_local(surface, dff_world, ctx.ray);
			(local.dff, local.ray)
		}
	}
}

fn intersect_surface<const W: usize>(
	ctx: &mut Context<W>,
	arena: &SurfaceArena,
	id: SurfaceId,
	surface: &Surface,
	dff: Vec3L<W>,
	ray: Vec3L<W>,
) {
	if ctx.origin_surface == Some(id) && !surface.is_closed() {
		return;
	}

	match &surface.kind {
		SurfaceKind::Plane => {
			let (valid, t) = solve_plane(dff.z, ray.z);
			accept_side(ctx, arena, id, surface, dff, ray, t, valid, false, Mask::ALL_FALSE);
		}
		SurfaceKind::Quadric { sci, scj, sci_w } | SurfaceKind::TwoPlane { sci, scj, sci_w } => {
			let force_nonneg_d = matches!(&surface.kind, SurfaceKind::TwoPlane { .. });
			let (a, b, c) = quadric_coeffs(*sci, *scj, *sci_w, dff, ray);
			let solved = solve_quadric(a, b, c, Lanes::splat(surface.d_eps), Lanes::splat(surface.t_eps), force_nonneg_d);

			// Overdraw optimization (spec §4.D step 8): if the outer side
			// already covers every active lane, the inner (farther) root
			// can never win the depth test, so skip it.
			let outer_hits = accept_side(ctx, arena, id, surface, dff, ray, solved.outer, solved.valid, false, solved.near_degenerate);
			if (ctx.wmask & !outer_hits).any() {
				accept_side(ctx, arena, id, surface, dff, ray, solved.inner, solved.valid, true, solved.near_degenerate);
			}
		}
	}
}

/// Apply the near-plane test, clipping, and the depth race against
/// `ctx.t_buf` for one surface side. Returns the post-clip candidate mask
/// (before the depth race), which callers use to decide whether the
/// opposite side is still worth testing.
#[allow(clippy::too_many_arguments)]
fn accept_side<const W: usize>(
	ctx: &mut Context<W>,
	arena: &SurfaceArena,
	id: SurfaceId,
	surface: &Surface,
	dff: Vec3L<W>,
	ray: Vec3L<W>,
	t: Lanes<W>,
	valid: Mask<W>,
	inner: bool,
	near_degenerate: Mask<W>,
) -> Mask<W> {
	let in_range = valid & ctx.wmask & t.gt(ctx.t_min);
	if in_range.none() {
		return in_range;
	}

	let mut hit_local = dff + ray * t;
	if surface.conic_singularity && near_degenerate.any() {
		// Conic singularity adjustment (spec §4.D "Conic singularity
		// adjustment"): snap the apex-adjacent hit point away from the
		// degenerate root before axis/custom clipping sees it, so a
		// clipper boundary passing through the apex doesn't flicker.
		hit_local = conic_singularity_adjust(hit_local, diagonal_scale(surface.transform.as_ref()), surface.t_eps, near_degenerate);
	}
	let mut candidate = in_range & apply_axis_clip(&surface.axis_clip, hit_local);
	if let Some(custom) = &surface.custom_clip {
		candidate = apply_custom_clips(custom, arena, hit_local, candidate);
	}
	if candidate.none() {
		return candidate;
	}

	let closer = candidate & t.lt(ctx.t_buf);
	ctx.t_buf = Lanes::select(closer, t, ctx.t_buf);
	ctx.hit_surf = ILanes::select(closer, ILanes::splat(id.0 as i32), ctx.hit_surf);
	ctx.hit_inner = (ctx.hit_inner & !closer) | (Mask::splat(inner) & closer);
	ctx.tmask = ctx.tmask | closer;

	candidate
}

/// Trace a shadow ray against a light's flat occluder list (spec §4.F
/// "push a shadow recursion (returns only a mask)"). Each `ClipElem::Clip`
/// entry is tested as a full ray-surface intersection; any valid hit with
/// `t` inside `(t_min, t_max)` marks the ray blocked for that lane.
/// `AccumEnter`/`AccumLeave` brackets are no-ops here — they group
/// acceptance geometry for custom clipping (`apply_custom_clips`), not
/// occluder membership, so a shadow-caster list is just the flat set of
/// `Clip` entries regardless of bracketing (see DESIGN.md).
pub fn cast_shadow<const W: usize>(
	arena: &SurfaceArena,
	shadow_casters: &ClipList,
	org: Vec3L<W>,
	ray: Vec3L<W>,
	t_min: Lanes<W>,
	t_max: Lanes<W>,
	active: Mask<W>,
) -> Mask<W> {
	let mut occluded = Mask::ALL_FALSE;

	for elem in shadow_casters {
		let ClipElem::Clip(id) = elem else { continue };
		let surface = arena.get(*id);
		let dff_world = org - Vec3L::splat(surface.position);
		let local = to_local(surface, dff_world, ray);

		let hit = match &surface.kind {
			SurfaceKind::Plane => {
				let (valid, t) = solve_plane(local.dff.z, local.ray.z);
				valid & t.gt(t_min) & t.lt(t_max)
			}
			SurfaceKind::Quadric { sci, scj, sci_w } | SurfaceKind::TwoPlane { sci, scj, sci_w } => {
				let force_nonneg_d = matches!(&surface.kind, SurfaceKind::TwoPlane { .. });
				let (a, b, c) = quadric_coeffs(*sci, *scj, *sci_w, local.dff, local.ray);
				let solved = solve_quadric(a, b, c, Lanes::splat(surface.d_eps), Lanes::splat(surface.t_eps), force_nonneg_d);
				let outer_in = solved.valid & solved.outer.gt(t_min) & solved.outer.lt(t_max);
				let inner_in = solved.valid & solved.inner.gt(t_min) & solved.inner.lt(t_max);
				outer_in | inner_in
			}
		};

		occluded = occluded | hit;
	}

	occluded & active
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::math::Vec3;
	use crate::scene::SidedMaterial;

	fn unit_sphere(arena: &mut SurfaceArena) -> SurfaceId {
		arena.insert(Surface::new(
			SurfaceKind::Quadric { sci: Vec3::ONE, scj: Vec3::ZERO, sci_w: -1.0 },
			Vec3::ZERO,
			[0, 1, 2],
			[1.0; 3],
			SidedMaterial { outer: Some(0), inner: Some(0) },
		))
	}

	#[test]
	fn ray_from_outside_hits_outer_side_first() {
		let mut arena = SurfaceArena::new();
		let sphere = unit_sphere(&mut arena);
		let list: SceneList = vec![SceneElem::Surface(sphere)];

		let mut ctx = Context::<4>::new();
		ctx.org = Vec3L::splat(Vec3::new(0.0, 0.0, -3.0));
		ctx.ray = Vec3L::splat(Vec3::new(0.0, 0.0, 1.0));
		ctx.reset_for_bounce(Mask::ALL_TRUE);

		intersect(&mut ctx, &arena, &list);

		assert!(ctx.tmask.all());
		for i in 0..4 {
			assert!((ctx.t_buf.lane(i) - 2.0).abs() < 1e-3);
			assert_eq!(ctx.hit_surf.lane(i), sphere.0 as i32);
			assert!(!ctx.hit_inner.lane(i));
		}
	}

	#[test]
	fn ray_from_inside_hits_inner_side() {
		let mut arena = SurfaceArena::new();
		let sphere = unit_sphere(&mut arena);
		let list: SceneList = vec![SceneElem::Surface(sphere)];

		let mut ctx = Context::<4>::new();
		ctx.org = Vec3L::ZERO;
		ctx.ray = Vec3L::splat(Vec3::new(0.0, 0.0, 1.0));
		ctx.reset_for_bounce(Mask::ALL_TRUE);

		intersect(&mut ctx, &arena, &list);

		assert!(ctx.tmask.all());
		for i in 0..4 {
			assert!((ctx.t_buf.lane(i) - 1.0).abs() < 1e-3);
			assert!(ctx.hit_inner.lane(i));
		}
	}

	#[test]
	fn miss_leaves_tmask_clear() {
		let mut arena = SurfaceArena::new();
		let sphere = unit_sphere(&mut arena);
		let list: SceneList = vec![SceneElem::Surface(sphere)];

		let mut ctx = Context::<4>::new();
		ctx.org = Vec3L::splat(Vec3::new(5.0, 5.0, -3.0));
		ctx.ray = Vec3L::splat(Vec3::new(0.0, 0.0, 1.0));
		ctx.reset_for_bounce(Mask::ALL_TRUE);

		intersect(&mut ctx, &arena, &list);
		assert!(ctx.tmask.none());
	}

	#[test]
	fn bounding_array_skips_covered_surfaces_on_total_miss() {
		let mut arena = SurfaceArena::new();
		let bound = unit_sphere(&mut arena);
		// A surface inside the bound's span that would itself be hit if
		// tested; the bound rejection must skip it without evaluating it.
		let inner = arena.insert(Surface::new(
			SurfaceKind::Plane,
			Vec3::ZERO,
			[0, 1, 2],
			[1.0; 3],
			SidedMaterial { outer: Some(0), inner: None },
		));
		let list: SceneList = vec![SceneElem::BoundingArray { bound, count: 1 }, SceneElem::Surface(inner)];

		let mut ctx = Context::<4>::new();
		ctx.org = Vec3L::splat(Vec3::new(5.0, 5.0, -3.0));
		ctx.ray = Vec3L::splat(Vec3::new(0.0, 0.0, 1.0));
		ctx.reset_for_bounce(Mask::ALL_TRUE);

		intersect(&mut ctx, &arena, &list);
		assert!(ctx.tmask.none(), "the bound's rejection must have skipped the plane behind it too");
	}

	#[test]
	fn shadow_ray_blocked_by_intervening_sphere() {
		let mut arena = SurfaceArena::new();
		let occluder = unit_sphere(&mut arena);
		let shadow_casters = vec![ClipElem::Clip(occluder)];

		let org = Vec3L::<4>::splat(Vec3::new(0.0, 0.0, -5.0));
		let ray = Vec3L::<4>::splat(Vec3::new(0.0, 0.0, 1.0));
		let occluded = cast_shadow(&arena, &shadow_casters, org, ray, Lanes::splat(1e-4), Lanes::splat(100.0), Mask::ALL_TRUE);
		assert!(occluded.all());
	}

	#[test]
	fn shadow_ray_clear_of_occluder_behind_light() {
		let mut arena = SurfaceArena::new();
		let occluder = unit_sphere(&mut arena);
		let shadow_casters = vec![ClipElem::Clip(occluder)];

		let org = Vec3L::<4>::splat(Vec3::new(0.0, 0.0, -5.0));
		let ray = Vec3L::<4>::splat(Vec3::new(0.0, 0.0, 1.0));
		// Light sits at t=3, well short of the sphere's near side at t=4.
		let occluded = cast_shadow(&arena, &shadow_casters, org, ray, Lanes::splat(1e-4), Lanes::splat(3.0), Mask::ALL_TRUE);
		assert!(occluded.none());
	}
}
