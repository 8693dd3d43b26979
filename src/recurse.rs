//! Recursion dispatcher (spec §4.G): walks a ray batch through the solver,
//! groups the resulting hits by winning surface, shades each group, and
//! spawns shadow/reflection/transmission bounces up to the context stack's
//! configured depth. `crate::schedule` defers and reorders calls into this
//! module for efficiency; `trace` itself works correctly on a batch with a
//! heterogeneous mix of hit surfaces, since it groups internally before
//! calling into `crate::shade`.

use crate::context::{Context, ContextStack};
use crate::math::Vec3;
use crate::pathtrace::{self, FresnelBranch, PathState};
use crate::scene::{Scene, SurfaceId};
use crate::shade;
use crate::simd::{Lanes, Mask, Vec3L};
use crate::solver;

/// Trace one ray batch to a finished color, recursing into reflection and
/// transmission bounces as the material and remaining depth allow (spec
/// §4.G steps 1-4). `stack.current()` must already be the frame to render
/// into; callers of the primary ray set `org`/`ray`/`wmask` on it first.
pub fn trace<const W: usize>(stack: &mut ContextStack<W>, scene: &Scene, ambient: Vec3) -> Vec3L<W> {
	let wmask = stack.current().wmask;
	stack.current_mut().reset_for_bounce(wmask);

	solver::intersect(stack.current_mut(), &scene.surfaces, &scene.surface_list);

	shade_hits(stack, scene, ambient);

	stack.current().col
}

/// Group `ctx.tmask`'s active lanes by winning `(surface, side)` and shade
/// each group independently (spec §4.D step 8 "per-side loop" feeding into
/// §4.F). Lanes with no hit keep the zero color `reset_for_bounce` left in
/// place — callers that want a non-black background compose it themselves.
fn shade_hits<const W: usize>(stack: &mut ContextStack<W>, scene: &Scene, ambient: Vec3) {
	let mut remaining = stack.current().tmask;

	while let Some(rep) = first_set_lane(remaining) {
		let (surface_id, inner) = {
			let ctx = stack.current();
			(SurfaceId(ctx.hit_surf.lane(rep) as u32), ctx.hit_inner.lane(rep))
		};

		let group = {
			let ctx = stack.current();
			Mask::from_fn(|i| {
				remaining.lane(i) && ctx.hit_surf.lane(i) == surface_id.0 as i32 && ctx.hit_inner.lane(i) == inner
			})
		};

		shade_group(stack, scene, surface_id, inner, group, ambient);
		remaining = remaining & !group;
	}
}

fn first_set_lane<const W: usize>(mask: Mask<W>) -> Option<usize> {
	(0..W).find(|&i| mask.lane(i))
}

/// Shade one homogeneous group of lanes that all hit the same surface side
/// (spec §4.F steps 1-6), reading `ctx.org`/`ray`/`t_buf` for the group's
/// lanes. `shade_hits` calls this for the ungrouped path above; so does
/// `crate::schedule` directly once a row buffer fills with lanes that
/// already share a winning surface/side (spec §4.H "full-row shading
/// invocation") — the caller is responsible for ctx's ray fields matching
/// the row's packed lanes in that case.
pub(crate) fn shade_group<const W: usize>(
	stack: &mut ContextStack<W>,
	scene: &Scene,
	surface_id: SurfaceId,
	inner: bool,
	group: Mask<W>,
	ambient: Vec3,
) {
	let surface = scene.surfaces.get(surface_id);
	let material_index = surface.material_for_side(inner);

	let (org, ray, t) = {
		let ctx = stack.current();
		(ctx.org, ctx.ray, ctx.t_buf)
	};
	let (hit_world, normal) = shade::compute_hit_and_normal(surface, org, ray, t, Mask::splat(inner));

	{
		let ctx = stack.current_mut();
		ctx.hit = Vec3L::select(group, hit_world, ctx.hit);
		ctx.nrm = Vec3L::select(group, normal, ctx.nrm);
	}

	let Some(material_index) = material_index else {
		return;
	};
	let material = scene.material(material_index);

	if material.is_light() {
		let color = Vec3L::splat(material.emission);
		let ctx = stack.current_mut();
		ctx.col = Vec3L::select(group, color, ctx.col);
		return;
	}

	let dff_local_base = hit_world - Vec3L::splat(surface.position);
	let local = solver::transform::to_local(surface, dff_local_base, Vec3L::ZERO);
	let base_color = shade::sample_texture(material, local.dff);

	let view = Vec3L::ZERO - ray;
	let t_min = stack.current().t_min;

	let direct = shade::accumulate_lighting(&scene.lights, material, base_color, ambient, hit_world, normal, view, |_, light| {
		if !light.casts_shadows() {
			return Mask::ALL_TRUE;
		}
		let casters = light.shadow_casters.as_ref().unwrap();
		let to_light = Vec3L::splat(light.position) - hit_world;
		let dist = to_light.length();
		let dir = to_light.normalized();
		let occluded = solver::cast_shadow(&scene.surfaces, casters, hit_world, dir, t_min, dist, group);
		!occluded
	});

	let remaining_depth = stack.remaining_depth();
	let mut col = direct;

	if remaining_depth > 0 && (material.reflect > 0.0 || material.transmit > 0.0) {
		let cos_theta = (Vec3L::ZERO - ray).dot(normal).max(Lanes::ZERO);
		// Entering (outer side): eta = n_air/n_material = 1/refract_index;
		// exiting (inner side) reverses it. Used for both the Fresnel split
		// and the refraction direction so they stay consistent.
		let eta = if inner { material.refract_index } else { 1.0 / material.refract_index };
		let fresnel = if material.flags.contains(crate::scene::MaterialFlags::METAL) {
			shade::fresnel_metal(cos_theta, material.metal_ext_2)
		} else {
			shade::fresnel_schlick(cos_theta, eta)
		};

		if material.reflect > 0.0 {
			let reflect_dir = shade::reflect(ray, normal);
			let weight = fresnel * Lanes::splat(material.reflect);
			let bounce_color = recurse_bounce(stack, scene, ambient, hit_world, reflect_dir, surface_id, group);
			col = col + bounce_color * weight;
		}

		if material.transmit > 0.0 {
			let transmission = shade::refract(ray, normal, eta);
			let weight = (Lanes::ONE - fresnel) * Lanes::splat(material.transmit);
			let valid = group & !transmission.total_internal_reflection;
			if valid.any() {
				let bounce_color = recurse_bounce(stack, scene, ambient, hit_world, transmission.dir, surface_id, valid);
				col = col + bounce_color * weight;
			}
		}
	}

	let ctx = stack.current_mut();
	ctx.col = Vec3L::select(group, col, ctx.col);
}

/// Push a child frame, trace a secondary ray through it, and pop back. Does
/// nothing (returns black) if the stack is already at max depth — the
/// depth-zero terminator from spec §4.G step 4.
fn recurse_bounce<const W: usize>(
	stack: &mut ContextStack<W>,
	scene: &Scene,
	ambient: Vec3,
	origin: Vec3L<W>,
	dir: Vec3L<W>,
	origin_surface: SurfaceId,
	active: Mask<W>,
) -> Vec3L<W> {
	if !stack.push() {
		return Vec3L::ZERO;
	}

	{
		let child: &mut Context<W> = stack.current_mut();
		child.org = origin;
		child.ray = dir;
		child.wmask = active;
		child.origin_surface = Some(origin_surface);
	}

	let color = trace(stack, scene, ambient);
	stack.pop();
	color
}

/// Trace `paths.len()` independent Monte-Carlo paths, one per lane, through
/// the scene (spec §4.I). Unlike `trace`, which recurses through
/// `ContextStack` once per bounce depth for a tree of reflection/
/// transmission children, a path tracer follows exactly one direction per
/// lane per bounce, so lanes that terminate early (miss, hit a light,
/// Russian roulette) simply stop contributing while the rest continue in
/// the same context frame — no child frame is pushed. `stack.current()`'s
/// `org`/`ray` must already hold each lane's primary ray; callers seed a
/// fresh `Prng` per lane into `paths`.
///
/// This omits the self-hit-shortcut `ctx.origin_surface` uses for the
/// ray-traced path: after the first bounce, different lanes may have left
/// heterogeneous surfaces, so there is no single "surface we just left" to
/// exempt. Correctness instead relies on `ctx.t_min`, the same epsilon
/// every intersection test already applies.
pub fn trace_path<const W: usize>(
	stack: &mut ContextStack<W>,
	scene: &Scene,
	paths: &mut [PathState],
	max_bounces: u32,
) -> Vec3L<W> {
	debug_assert_eq!(paths.len(), W);

	for bounce_index in 0..max_bounces {
		let wmask = Mask::from_fn(|i| paths[i].alive);
		if wmask.none() {
			break;
		}

		stack.current_mut().reset_for_bounce(wmask);
		solver::intersect(stack.current_mut(), &scene.surfaces, &scene.surface_list);

		shade_hits_path(stack, scene, paths, bounce_index);
	}

	Vec3L::from_fn(|i| paths[i].radiance)
}

/// Group the batch's hits by winning `(surface, side)`, same as
/// `shade_hits`, but drive each lane's `PathState` instead of summing a
/// single `Vec3L` color. Lanes that were active but missed terminate here:
/// a path tracer contributes nothing further once a ray escapes the scene.
fn shade_hits_path<const W: usize>(stack: &mut ContextStack<W>, scene: &Scene, paths: &mut [PathState], bounce_index: u32) {
	let wmask = stack.current().wmask;
	let tmask = stack.current().tmask;

	for i in 0..W {
		if wmask.lane(i) && !tmask.lane(i) {
			paths[i].alive = false;
		}
	}

	let mut remaining = tmask;
	while let Some(rep) = first_set_lane(remaining) {
		let (surface_id, inner) = {
			let ctx = stack.current();
			(SurfaceId(ctx.hit_surf.lane(rep) as u32), ctx.hit_inner.lane(rep))
		};

		let group = {
			let ctx = stack.current();
			Mask::from_fn(|i| {
				remaining.lane(i) && ctx.hit_surf.lane(i) == surface_id.0 as i32 && ctx.hit_inner.lane(i) == inner
			})
		};

		shade_group_path(stack, scene, surface_id, inner, group, paths, bounce_index);
		remaining = remaining & !group;
	}
}

/// Shade one homogeneous group for the path tracer (spec §4.I steps 2-5):
/// emissive surfaces end the path with one emission add; transmissive
/// materials draw a Fresnel split and follow exactly one of
/// reflect/refract; everything else takes a cosine-weighted diffuse bounce
/// via `pathtrace::bounce`. Each lane advances its own `PathState` and, if
/// it survives, writes its next bounce's origin/direction into `ctx`.
fn shade_group_path<const W: usize>(
	stack: &mut ContextStack<W>,
	scene: &Scene,
	surface_id: SurfaceId,
	inner: bool,
	group: Mask<W>,
	paths: &mut [PathState],
	bounce_index: u32,
) {
	let surface = scene.surfaces.get(surface_id);
	let material_index = surface.material_for_side(inner);

	let (org, ray, t) = {
		let ctx = stack.current();
		(ctx.org, ctx.ray, ctx.t_buf)
	};
	let (hit_world, normal) = shade::compute_hit_and_normal(surface, org, ray, t, Mask::splat(inner));

	{
		let ctx = stack.current_mut();
		ctx.hit = Vec3L::select(group, hit_world, ctx.hit);
		ctx.nrm = Vec3L::select(group, normal, ctx.nrm);
	}

	let Some(material_index) = material_index else {
		for i in 0..W {
			if group.lane(i) {
				paths[i].alive = false;
			}
		}
		return;
	};
	let material = scene.material(material_index);

	if material.is_light() {
		for i in 0..W {
			if group.lane(i) {
				paths[i].radiance += paths[i].throughput.cmul(material.emission);
				paths[i].alive = false;
			}
		}
		return;
	}

	let dff_local_base = hit_world - Vec3L::splat(surface.position);
	let local = solver::transform::to_local(surface, dff_local_base, Vec3L::ZERO);
	let base_color = shade::sample_texture(material, local.dff);

	let specular = material.reflect > 0.0 || material.transmit > 0.0;

	for i in 0..W {
		if !group.lane(i) {
			continue;
		}

		let n = normal.lane(i);
		let hit_point = hit_world.lane(i);
		let incident = ray.lane(i);

		if specular {
			let cos_theta = (Vec3::ZERO - incident).dot(n).max(0.0);
			// Entering (outer side) vs. exiting (inner side), matching the
			// ray-traced path's eta convention in `shade_group` above.
			let eta = if inner { material.refract_index } else { 1.0 / material.refract_index };
			let fresnel = if material.flags.contains(crate::scene::MaterialFlags::METAL) {
				shade::fresnel_metal::<1>(Lanes::splat(cos_theta), material.metal_ext_2).lane(0)
			} else {
				shade::fresnel_schlick::<1>(Lanes::splat(cos_theta), eta).lane(0)
			};
			// A purely reflective material (no transmit) always takes the
			// reflect branch; only an actual dielectric/conductor split
			// between reflect and transmit needs the stochastic draw.
			let reflectance = if material.transmit > 0.0 { fresnel } else { 1.0 };
			let (branch, weight) = pathtrace::fresnel_split(&mut paths[i].rng, reflectance);

			let (new_dir, branch_strength) = match branch {
				FresnelBranch::Reflect => (shade::reflect::<1>(Vec3L::splat(incident), Vec3L::splat(n)).lane(0), material.reflect),
				FresnelBranch::Refract => {
					let transmission = shade::refract::<1>(Vec3L::splat(incident), Vec3L::splat(n), eta);
					if transmission.total_internal_reflection.lane(0) {
						paths[i].alive = false;
						continue;
					}
					(transmission.dir.lane(0), material.transmit)
				}
			};

			paths[i].throughput = paths[i].throughput * (branch_strength * weight);
			match pathtrace::russian_roulette(paths[i].throughput, &mut paths[i].rng, bounce_index >= 3) {
				Some(inv_p) => {
					paths[i].throughput = paths[i].throughput * inv_p;
					let ctx = stack.current_mut();
					ctx.org.set_lane(i, hit_point);
					ctx.ray.set_lane(i, new_dir);
				}
				None => paths[i].alive = false,
			}
		} else {
			// Tint the running throughput by this hit's sampled texture
			// color before the scalar diffuse decay `bounce` applies, so a
			// textured diffuse surface still colors indirect light the way
			// `shade::sample_texture` colors its direct contribution.
			paths[i].throughput = paths[i].throughput.cmul(base_color.lane(i));
			if let Some(new_dir) = pathtrace::bounce(&mut paths[i], n, material.emission, material.diffuse, bounce_index) {
				let ctx = stack.current_mut();
				ctx.org.set_lane(i, hit_point);
				ctx.ray.set_lane(i, new_dir);
			}
		}
	}
}
