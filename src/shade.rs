//! Shading: normal finalization, texturing, local lighting, transparency
//! and reflection (spec §4.F). By the time these functions run, the
//! scheduler (`crate::schedule`) has already regrouped lanes so every
//! lane in a `Context` shares the same winning surface and side — shade
//! never branches per lane on "which surface", only on light-list and
//! clip/shadow results.

use crate::context::ContextFlags;
use crate::math::Vec3;
use crate::scene::{Light, Material, Surface, SurfaceKind};
use crate::solver::transform::to_local;
use crate::simd::{Lanes, Mask, Vec3L};

/// Recompute the surface-local hit point and the finalized world-space
/// normal for the winning surface (spec §4.F step 1). Returns rather than
/// writes into `ctx`, since a batch with more than one winning surface is
/// shaded group-by-group (`crate::recurse::shade_hits`) and each group
/// only owns a subset of lanes.
pub fn compute_hit_and_normal<const W: usize>(surface: &Surface, org: Vec3L<W>, ray: Vec3L<W>, t: Lanes<W>, inner: Mask<W>) -> (Vec3L<W>, Vec3L<W>) {
	let dff_world = org - Vec3L::splat(surface.position);
	let local = to_local(surface, dff_world, ray);
	let hit_local = local.dff + local.ray * t;

	let hit_world = org + ray * t;
	let normal = finalize_normal(surface, hit_local, inner);
	(hit_world, normal)
}

fn finalize_normal<const W: usize>(surface: &Surface, hit_local: Vec3L<W>, inner: Mask<W>) -> Vec3L<W> {
	let local_normal = match &surface.kind {
		SurfaceKind::Plane => Vec3L::splat(Vec3::new(0.0, 0.0, surface.axis_sign[2])),
		SurfaceKind::Quadric { sci, scj, .. } | SurfaceKind::TwoPlane { sci, scj, .. } => {
			let gradient = Vec3L {
				x: hit_local.x * Lanes::splat(sci.x) + Lanes::splat(scj.x),
				y: hit_local.y * Lanes::splat(sci.y) + Lanes::splat(scj.y),
				z: hit_local.z * Lanes::splat(sci.z) + Lanes::splat(scj.z),
			};
			gradient.normalized()
		}
	};

	let world_normal = rotate_normal_to_world(surface, local_normal).normalized();
	let sign = Lanes::select(inner, Lanes::splat(surface.sign_base[1]), Lanes::splat(surface.sign_base[0]));
	world_normal * sign
}

/// Rotate a local-space normal into world space. Rotation-only transforms
/// are isometric, so the transpose is the inverse; a diagonal (scale-only)
/// transform instead needs the *reciprocal* scale — applying the forward
/// scale to a normal tilts it away from perpendicular.
fn rotate_normal_to_world<const W: usize>(surface: &Surface, local_normal: Vec3L<W>) -> Vec3L<W> {
	if !surface.needs_transform() {
		return local_normal;
	}
	let m = surface.transform.expect("needs_transform implies a transform is set");
	if surface.has_diagonal_transform() {
		let inv_scale = Vec3::new(1.0 / m.rows[0].x, 1.0 / m.rows[1].y, 1.0 / m.rows[2].z);
		Vec3L {
			x: local_normal.x * Lanes::splat(inv_scale.x),
			y: local_normal.y * Lanes::splat(inv_scale.y),
			z: local_normal.z * Lanes::splat(inv_scale.z),
		}
	} else {
		Vec3L::from_fn(|i| m.transform_transpose(local_normal.lane(i)))
	}
}

/// Sample a material's texture at a local hit point, decoding gamma if
/// the material's `GAMMA` flag is set (spec §4.F step 2). Materials
/// without a texture modulate by white (no-op).
pub fn sample_texture<const W: usize>(material: &Material, hit_local: Vec3L<W>) -> Vec3L<W> {
	let Some(texture) = &material.texture else {
		return Vec3L::splat(Vec3::ONE);
	};
	let t = &material.texture_transform;

	let u = hit_local.axis(t.axis_map[0]) * Lanes::splat(t.scale[0]) + Lanes::splat(t.offset[0]);
	let v = hit_local.axis(t.axis_map[1]) * Lanes::splat(t.scale[1]) + Lanes::splat(t.offset[1]);

	let u_int = u.to_int_trunc().and(crate::simd::ILanes::splat(t.xmask));
	let v_int = v.to_int_trunc().shl_dyn(t.yshift);
	let index = u_int.or(v_int);

	let mut color = Vec3L::ZERO;
	for i in 0..W {
		let texel = texture.sample_texel(index.lane(i) as u32);
		let r = (texel & 0xFF) as f32 / 255.0;
		let g = ((texel >> 8) & 0xFF) as f32 / 255.0;
		let b = ((texel >> 16) & 0xFF) as f32 / 255.0;
		color.set_lane(i, Vec3::new(r, g, b));
	}

	if material.flags.contains(crate::scene::MaterialFlags::GAMMA) {
		gamma_decode(color)
	} else {
		color
	}
}

/// Linear -> gamma encode (output stage, spec §4.J "gamma-out"): the
/// cheap `sqrt` approximation of a 2.2 gamma curve.
pub fn gamma_encode<const W: usize>(c: Vec3L<W>) -> Vec3L<W> {
	Vec3L { x: c.x.max(Lanes::ZERO).sqrt(), y: c.y.max(Lanes::ZERO).sqrt(), z: c.z.max(Lanes::ZERO).sqrt() }
}

/// Gamma -> linear decode, the inverse approximation used for `GAMMA`
/// flagged texture data (spec §4.F step 2).
pub fn gamma_decode<const W: usize>(c: Vec3L<W>) -> Vec3L<W> {
	c * c
}

fn lane_attenuation<const W: usize>(light: &Light, distance: Lanes<W>) -> Lanes<W> {
	let denom = distance * distance * Lanes::splat(light.attenuation_quadratic)
		+ distance * Lanes::splat(light.attenuation_linear)
		+ Lanes::splat(light.attenuation_constant);
	let valid = denom.gt(Lanes::ZERO);
	let safe_denom = Lanes::select(valid, denom, Lanes::ONE);
	Lanes::select(valid, safe_denom.rcp(), Lanes::ONE)
}

/// Accumulate ambient + per-light diffuse/specular contributions (spec
/// §4.F step 3). `shadow_mask(i)` reports, per lane, whether light `i` is
/// visible from `hit` — callers trace the actual shadow ray (via
/// `crate::recurse`) before calling this, since shade never recurses
/// itself.
pub fn accumulate_lighting<const W: usize>(
	lights: &[Light],
	material: &Material,
	base_color: Vec3L<W>,
	ambient: Vec3,
	hit: Vec3L<W>,
	normal: Vec3L<W>,
	view: Vec3L<W>,
	shadow_mask: impl Fn(usize, &Light) -> Mask<W>,
) -> Vec3L<W> {
	let mut out = base_color * Vec3L::splat(ambient);

	for (i, light) in lights.iter().enumerate() {
		let to_light = Vec3L::splat(light.position) - hit;
		let dist = to_light.length();
		let dir = to_light.normalized();

		let lit = shadow_mask(i, light);
		let atten = lane_attenuation(light, dist) * Lanes::splat(light.intensity);

		let ndotl = normal.dot(dir).max(Lanes::ZERO);
		let diffuse = (base_color * Vec3L::splat(light.color)) * (ndotl * Lanes::splat(material.diffuse) * atten);

		let half = (dir + view).normalized();
		let ndoth = normal.dot(half).max(Lanes::ZERO);
		let spec_term = ndoth.powf(Lanes::splat(material.specular_power())) * Lanes::splat(material.specular) * atten;
		let specular = Vec3L::splat(light.color) * spec_term;

		let contribution = diffuse + specular;
		let masked = Vec3L::select(lit, contribution, Vec3L::ZERO);
		out = out + masked;
	}

	out + base_color * Vec3L::splat(material.emission)
}

/// Mirror-reflect `incident` about `normal` (spec §4.F step 5): `R = I -
/// 2*(I.N)*N`, with `incident` pointing into the surface.
pub fn reflect<const W: usize>(incident: Vec3L<W>, normal: Vec3L<W>) -> Vec3L<W> {
	let idotn = incident.dot(normal);
	incident - normal * (idotn * Lanes::splat(2.0))
}

/// The outcome of attempting Snell's-law refraction through `normal` with
/// relative index `eta = n1/n2` (spec §4.F step 4).
pub struct Transmission<const W: usize> {
	pub dir: Vec3L<W>,
	/// Set where the angle exceeds the critical angle (total internal
	/// reflection) — those lanes must fall back to `reflect` instead.
	pub total_internal_reflection: Mask<W>,
}

pub fn refract<const W: usize>(incident: Vec3L<W>, normal: Vec3L<W>, eta: f32) -> Transmission<W> {
	let cos_i = Lanes::ZERO - incident.dot(normal);
	let sin_t2 = Lanes::splat(eta * eta) * (Lanes::ONE - cos_i * cos_i);
	let tir = sin_t2.gt(Lanes::ONE);

	let cos_t = (Lanes::ONE - sin_t2).max(Lanes::ZERO).sqrt();
	let dir = incident * Lanes::splat(eta) + normal * (Lanes::splat(eta) * cos_i - cos_t);

	Transmission { dir, total_internal_reflection: tir }
}

/// Schlick's approximation to the Fresnel reflectance at `cos_theta`
/// (spec §4.F step 4 "Fresnel splitting"), for a surface with relative
/// index `eta = n1/n2`.
pub fn fresnel_schlick<const W: usize>(cos_theta: Lanes<W>, eta: f32) -> Lanes<W> {
	let r0 = ((1.0 - eta) / (1.0 + eta)).powi(2);
	let one_minus_cos = Lanes::ONE - cos_theta;
	let p5 = one_minus_cos * one_minus_cos * one_minus_cos * one_minus_cos * one_minus_cos;
	Lanes::splat(r0) + (Lanes::ONE - Lanes::splat(r0)) * p5
}

/// Metal Fresnel reflectance using the material's extinction coefficient
/// (spec §4.F step 6 "Reflection"), vs. the dielectric Schlick form above.
/// Uses `metal_ext_2` (k^2) as a normal-incidence reflectance proxy
/// (`R0 = k^2/(k^2+1)`) with the same Schlick grazing falloff as the
/// dielectric case, rather than the full two-parameter conductor formula —
/// see DESIGN.md.
pub fn fresnel_metal<const W: usize>(cos_theta: Lanes<W>, metal_ext_2: f32) -> Lanes<W> {
	let r0 = Lanes::splat(metal_ext_2 / (metal_ext_2 + 1.0));
	let one_minus_c = (Lanes::ONE - cos_theta).max(Lanes::ZERO);
	r0 + (Lanes::ONE - r0) * one_minus_c.powf(Lanes::splat(5.0))
}

/// Whether a flags/context combination calls for the plain (non-metal)
/// diffuse+specular path vs. skipping straight to reflection (spec §4.F:
/// "metal vs plain branching").
pub fn uses_direct_lighting(ctx_flags: ContextFlags, material: &Material) -> bool {
	!ctx_flags.contains(ContextFlags::SHADOW) && !material.flags.contains(crate::scene::MaterialFlags::METAL)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scene::{SidedMaterial, SurfaceKind};

	fn unit_sphere() -> Surface {
		Surface::new(
			SurfaceKind::Quadric { sci: Vec3::ONE, scj: Vec3::ZERO, sci_w: -1.0 },
			Vec3::ZERO,
			[0, 1, 2],
			[1.0; 3],
			SidedMaterial { outer: Some(0), inner: Some(0) },
		)
	}

	#[test]
	fn normal_on_unit_sphere_points_outward() {
		let surface = unit_sphere();
		let hit_local = Vec3L::<4>::splat(Vec3::new(0.0, 0.0, 1.0));
		let normal = finalize_normal(&surface, hit_local, Mask::ALL_FALSE);
		for i in 0..4 {
			let n = normal.lane(i);
			assert!((n.z - 1.0).abs() < 1e-5, "got {n:?}");
		}
	}

	#[test]
	fn inner_side_flips_normal() {
		let surface = unit_sphere();
		let hit_local = Vec3L::<4>::splat(Vec3::new(0.0, 0.0, 1.0));
		let outer = finalize_normal(&surface, hit_local, Mask::ALL_FALSE);
		let inner = finalize_normal(&surface, hit_local, Mask::ALL_TRUE);
		for i in 0..4 {
			assert!((outer.lane(i).z + inner.lane(i).z).abs() < 1e-5);
		}
	}

	#[test]
	fn reflect_matches_mirror_formula() {
		let incident = Vec3L::<4>::splat(Vec3::new(1.0, -1.0, 0.0).normalized());
		let normal = Vec3L::<4>::splat(Vec3::Y);
		let r = reflect(incident, normal);
		for i in 0..4 {
			let v = r.lane(i);
			assert!((v.x - 1.0 / 2.0_f32.sqrt()).abs() < 1e-4);
			assert!((v.y - 1.0 / 2.0_f32.sqrt()).abs() < 1e-4);
		}
	}

	#[test]
	fn refract_straight_through_glass_is_undeviated_at_normal_incidence() {
		let incident = Vec3L::<4>::splat(Vec3::new(0.0, 0.0, -1.0));
		let normal = Vec3L::<4>::splat(Vec3::Z);
		let t = refract(incident, normal, 1.0 / 1.5);
		assert!(t.total_internal_reflection.none());
		for i in 0..4 {
			let d = t.dir.lane(i);
			assert!((d.z + 1.0).abs() < 1e-4, "got {d:?}");
		}
	}

	#[test]
	fn grazing_refraction_past_critical_angle_is_tir() {
		// Incident ray points mostly along +X with a small -Y component, so
		// it crosses a normal=+Y boundary at a near-grazing angle.
		let incident = Vec3L::<4>::splat(Vec3::new(0.999, -0.0447, 0.0).normalized());
		let normal = Vec3L::<4>::splat(Vec3::Y);
		// Going from dense (n=1.5) to sparse (n=1.0) medium at a grazing
		// angle exceeds the critical angle.
		let t = refract(incident, normal, 1.5 / 1.0);
		assert!(t.total_internal_reflection.any());
	}

	#[test]
	fn fresnel_schlick_is_near_zero_at_normal_incidence_for_matched_index() {
		let r = fresnel_schlick(Lanes::<4>::ONE, 1.0);
		for i in 0..4 {
			assert!(r.lane(i) < 1e-6);
		}
	}

	#[test]
	fn gamma_encode_decode_are_inverse_on_unit_interval() {
		let c = Vec3L::<4>::splat(Vec3::new(0.25, 0.5, 0.81));
		let roundtrip = gamma_decode(gamma_encode(c));
		for i in 0..4 {
			let v = roundtrip.lane(i);
			let orig = c.lane(i);
			assert!((v.x - orig.x).abs() < 1e-4);
			assert!((v.y - orig.y).abs() < 1e-4);
			assert!((v.z - orig.z).abs() < 1e-4);
		}
	}
}
