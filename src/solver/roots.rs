use crate::math::Vec3;
use crate::simd::{Lanes, Mask, Vec3L};

/// Ray-parametrized quadratic coefficients for `a*t^2 + 2*b*t + c = 0`,
/// evaluating the quadric `p -> sci.x*p.x^2 + sci.y*p.y^2 + sci.z*p.z^2 +
/// 2*scj.dot(p) + sci_w` along `p(t) = dff + ray*t` (spec §4.D step 5).
pub fn quadric_coeffs<const W: usize>(
	sci: Vec3,
	scj: Vec3,
	sci_w: f32,
	dff: Vec3L<W>,
	ray: Vec3L<W>,
) -> (Lanes<W>, Lanes<W>, Lanes<W>) {
	let sci_l = Vec3L::splat(sci);
	let a = ray.x * ray.x * sci_l.x + ray.y * ray.y * sci_l.y + ray.z * ray.z * sci_l.z;
	let b = (dff.x * ray.x * sci_l.x + dff.y * ray.y * sci_l.y + dff.z * ray.z * sci_l.z)
		+ (ray.x * Lanes::splat(scj.x) + ray.y * Lanes::splat(scj.y) + ray.z * Lanes::splat(scj.z));
	let c = dff.x * dff.x * sci_l.x + dff.y * dff.y * sci_l.y + dff.z * dff.z * sci_l.z
		+ (dff.x * Lanes::splat(scj.x) + dff.y * Lanes::splat(scj.y) + dff.z * Lanes::splat(scj.z)) * Lanes::splat(2.0)
		+ Lanes::splat(sci_w);
	(a, b, c)
}

/// The outer/inner roots of a per-lane quadratic, plus the mask of lanes
/// for which a root pair exists at all (spec §4.D steps 5-7).
pub struct QuadricRoots<const W: usize> {
	pub valid: Mask<W>,
	pub outer: Lanes<W>,
	pub inner: Lanes<W>,
	/// Lanes whose discriminant fell within `d_eps` of the tie-break band
	/// (spec §4.D step 7 and "Conic singularity adjustment"): the apex
	/// region where the root pair was pulled apart by `t_eps` rather than
	/// computed directly, and where a flagged surface's hit point needs the
	/// apex snap before clipping.
	pub near_degenerate: Mask<W>,
}

/// Solve `a*t^2 + 2*b*t + c = 0` per lane using the numerically stable
/// formulation from spec §4.D step 6: `t1 = (-b - sqrt(d)*sign(b)) / a`,
/// `t2 = c / (a*t1)`, with `d = b^2 - a*c`.
///
/// `force_nonneg_d` implements the two-plane quadric variant (spec §4.D
/// step 5 "Two-plane quadric"), whose discriminant is explicitly clamped
/// non-negative rather than disabling lanes where it would be negative.
pub fn solve_quadric<const W: usize>(
	a: Lanes<W>,
	b: Lanes<W>,
	c: Lanes<W>,
	d_eps: Lanes<W>,
	t_eps: Lanes<W>,
	force_nonneg_d: bool,
) -> QuadricRoots<W> {
	let d = b * b - a * c;

	let d_valid = if force_nonneg_d { Mask::ALL_TRUE } else { d.ge(Lanes::ZERO) };
	let d_clamped = if force_nonneg_d { d.max(Lanes::ZERO) } else { d };

	let a_nonzero = a.ne(Lanes::ZERO);

	let sqrt_d = d_clamped.max(Lanes::ZERO).sqrt();
	let sign_b = b.sign();

	let safe_a = Lanes::select(a_nonzero, a, Lanes::ONE);
	let mut t1 = (Lanes::ZERO - b - sqrt_d * sign_b) / safe_a;

	let t1_nonzero = t1.ne(Lanes::ZERO);
	let safe_t1 = Lanes::select(t1_nonzero, t1, Lanes::ONE);
	let mut t2 = c / (safe_a * safe_t1);

	// Force a sentinel (root = 0, mask bit cleared) when a denominator is
	// zero (spec §4.D step 6).
	t1 = Lanes::select(a_nonzero, t1, Lanes::ZERO);
	t2 = Lanes::select(a_nonzero & t1_nonzero, t2, Lanes::ZERO);

	// Tie-break near-degenerate discriminants (spec §4.D step 7): equate
	// the roots at the midpoint and separate by `t_eps * t1`, signed by
	// `sign(a)` so the outer root remains outer after perturbation.
	let near_degenerate = d_clamped.abs().lt(d_eps);
	let mid = (Lanes::ZERO - b) / safe_a;
	let sign_a = a.sign();
	let perturb = t_eps * mid.abs().max(t_eps) * sign_a;
	let t1_tied = mid - perturb;
	let t2_tied = mid + perturb;

	t1 = Lanes::select(near_degenerate, t1_tied, t1);
	t2 = Lanes::select(near_degenerate, t2_tied, t2);

	// Root ordering (spec §4.D step 7): `t1`'s numerically stable formula
	// picks `R_minus` when `b >= 0` and `R_plus` when `b < 0`; dividing by
	// `a` then preserves `R_minus < R_plus` when `a > 0` and flips it when
	// `a < 0`. Working through both cases shows `t1` is already the outer
	// (nearer, i.e. smaller) root exactly when `sign(a) == sign(b)` — so
	// swap whenever they differ. See DESIGN.md for the worked derivation.
	let a_neg = a.lt(Lanes::ZERO);
	let b_neg = b.lt(Lanes::ZERO);
	let swap = a_neg ^ b_neg;

	let outer = Lanes::select(swap, t2, t1);
	let inner = Lanes::select(swap, t1, t2);

	QuadricRoots { valid: d_valid & a_nonzero, outer, inner, near_degenerate }
}

/// `t = -DFF_k / RAY_k`, the plane intersection (spec §4.D step 5
/// "Plane"). Lanes with `RAY_k == 0` are disabled.
pub fn solve_plane<const W: usize>(dff_k: Lanes<W>, ray_k: Lanes<W>) -> (Mask<W>, Lanes<W>) {
	let valid = ray_k.ne(Lanes::ZERO);
	let safe_ray = Lanes::select(valid, ray_k, Lanes::ONE);
	let t = (Lanes::ZERO - dff_k) / safe_ray;
	(valid, t)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plane_root_matches_scalar() {
		let dff = Lanes::<4>::splat(2.0);
		let ray = Lanes::<4>::splat(-1.0);
		let (valid, t) = solve_plane(dff, ray);
		assert!(valid.all());
		for i in 0..4 {
			assert!((t.lane(i) - 2.0).abs() < 1e-6);
		}
	}

	#[test]
	fn plane_disables_zero_ray() {
		let dff = Lanes::<4>::splat(2.0);
		let ray = Lanes::<4>::ZERO;
		let (valid, _) = solve_plane(dff, ray);
		assert!(valid.none());
	}

	#[test]
	fn unit_sphere_hit_from_minus_z() {
		// Ray from (0,0,-3) toward +Z against a unit sphere at the origin:
		// dff=(0,0,-3), ray=(0,0,1) -> a=1, b=dff.dot(ray)=-3, c=|dff|^2-1=8,
		// entry at t=2 (outer) and exit at t=4 (inner).
		let a = Lanes::<4>::splat(1.0);
		let b = Lanes::<4>::splat(-3.0);
		let c = Lanes::<4>::splat(8.0);
		let roots = solve_quadric(a, b, c, Lanes::splat(1e-6), Lanes::splat(1e-3), false);
		assert!(roots.valid.all());
		for i in 0..4 {
			assert!((roots.outer.lane(i) - 2.0).abs() < 1e-3, "outer={}", roots.outer.lane(i));
			assert!((roots.inner.lane(i) - 4.0).abs() < 1e-3, "inner={}", roots.inner.lane(i));
		}
	}

	#[test]
	fn outer_is_always_the_nearer_root_regardless_of_sign_a() {
		// a<0 (b_neg matching a_neg, so no sign flip needed here) and a<0
		// with the opposite b sign (which does need the flip) both keep
		// `outer <= inner`.
		for (a, b, c) in [(1.0, -3.0, 8.0), (1.0, 3.0, -8.0), (-1.0, 3.0, 8.0), (-1.0, -3.0, -8.0)] {
			let roots = solve_quadric(
				Lanes::<4>::splat(a),
				Lanes::<4>::splat(b),
				Lanes::<4>::splat(c),
				Lanes::splat(1e-6),
				Lanes::splat(1e-3),
				false,
			);
			if !roots.valid.any() {
				continue;
			}
			for i in 0..4 {
				assert!(
					roots.outer.lane(i) <= roots.inner.lane(i) + 1e-4,
					"a={a} b={b} c={c}: outer={} inner={}",
					roots.outer.lane(i),
					roots.inner.lane(i)
				);
			}
		}
	}

	#[test]
	fn negative_discriminant_is_invalid() {
		let a = Lanes::<4>::splat(1.0);
		let b = Lanes::<4>::splat(0.0);
		let c = Lanes::<4>::splat(10.0);
		let roots = solve_quadric(a, b, c, Lanes::splat(1e-6), Lanes::splat(1e-3), false);
		assert!(roots.valid.none());
	}

	#[test]
	fn two_plane_forces_nonnegative_discriminant() {
		let a = Lanes::<4>::splat(1.0);
		let b = Lanes::<4>::splat(0.0);
		let c = Lanes::<4>::splat(10.0);
		let roots = solve_quadric(a, b, c, Lanes::splat(1e-6), Lanes::splat(1e-3), true);
		assert!(roots.valid.all());
	}
}
