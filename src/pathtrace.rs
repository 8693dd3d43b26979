//! Path-tracer stage (spec §4.I): tent-filtered pixel jitter, a
//! per-lane LCG PRNG, cosine-weighted hemisphere sampling for diffuse
//! bounces, Russian-roulette termination and in-place running-average
//! accumulation. Unlike the ray-traced path (`crate::recurse`), which
//! shares work across lanes by surface, the path tracer's bounce direction
//! and termination decision are inherently per-lane (each pixel carries
//! its own RNG stream), so this module operates lane-by-lane even where
//! its inputs are `Vec3L<W>` batches.

use crate::math::Vec3;

/// The original's default PRNG fraction width (`RT_PRNG`, spec §3): 24
/// bits of a 32-bit LCG state.
pub const DEFAULT_PRNG_BITS: u32 = 24;

/// A per-lane linear congruential generator (spec §4.I "per-pixel PRNG").
/// Deterministic and reproducible across runs for the same seed, which the
/// Monte-Carlo convergence tests in spec §8 scenario 5 rely on.
#[derive(Clone, Copy, Debug)]
pub struct Prng(u32);

impl Prng {
	// Numerical Recipes' LCG constants.
	const MULTIPLIER: u32 = 1_664_525;
	const INCREMENT: u32 = 1_013_904_223;

	pub fn new(seed: u32) -> Self {
		Self(seed)
	}

	pub fn next_u32(&mut self) -> u32 {
		self.0 = self.0.wrapping_mul(Self::MULTIPLIER).wrapping_add(Self::INCREMENT);
		self.0
	}

	/// A uniform sample in `[0, 1)`, built from the top `DEFAULT_PRNG_BITS`
	/// bits of the next LCG state (spec §3 "RT_PRNG = LCG24").
	pub fn next_f32(&mut self) -> f32 {
		let bits = self.next_u32() >> (32 - DEFAULT_PRNG_BITS);
		bits as f32 / (1u32 << DEFAULT_PRNG_BITS) as f32
	}
}

/// Map a uniform `[0, 1)` sample to a tent-distributed offset in `(-1, 1)`
/// (spec §4.I step 1 "tent-filter jittered sample generation"), used to
/// jitter a pixel's subsample position for antialiasing without the
/// box-filter's visible aliasing on sharp edges.
pub fn tent_filter(u: f32) -> f32 {
	let u = u * 2.0;
	if u < 1.0 {
		u.sqrt() - 1.0
	} else {
		1.0 - (2.0 - u).sqrt()
	}
}

/// Branchless orthonormal basis around a unit vector (Duff et al. 2017),
/// used to orient cosine-hemisphere samples around a surface normal (spec
/// §4.I step 2).
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
	let sign = if n.z >= 0.0 { 1.0 } else { -1.0 };
	let a = -1.0 / (sign + n.z);
	let b = n.x * n.y * a;
	let tangent = Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
	let bitangent = Vec3::new(b, sign + n.y * n.y * a, -n.y);
	(tangent, bitangent)
}

/// Sample a direction from the cosine-weighted hemisphere around `normal`
/// (spec §4.I step 2). Importance-sampling the cosine term this way means
/// the `cos(theta)/pi` BRDF factor cancels exactly against the sample's
/// PDF, so the caller's throughput update is a plain albedo multiply.
pub fn cosine_sample_hemisphere(normal: Vec3, u1: f32, u2: f32) -> Vec3 {
	let r = u1.max(0.0).sqrt();
	let theta = 2.0 * std::f32::consts::PI * u2;
	let x = r * theta.cos();
	let y = r * theta.sin();
	let z = (1.0 - u1).max(0.0).sqrt();

	let (tangent, bitangent) = orthonormal_basis(normal);
	(tangent * x + bitangent * y + normal * z).normalized()
}

/// Russian-roulette path termination (spec §4.I step 3): below
/// `min_bounces`, every path survives with weight 1; beyond it, a path
/// survives with probability proportional to its throughput and is
/// reweighted by `1/p` to stay unbiased, or killed otherwise.
pub fn russian_roulette(throughput: Vec3, rng: &mut Prng, past_min_bounces: bool) -> Option<f32> {
	if !past_min_bounces {
		return Some(1.0);
	}
	let p = throughput.x.max(throughput.y).max(throughput.z).clamp(0.05, 1.0);
	if rng.next_f32() < p {
		Some(1.0 / p)
	} else {
		None
	}
}

/// One path's accumulated state across bounces.
#[derive(Clone, Copy, Debug)]
pub struct PathState {
	pub throughput: Vec3,
	pub radiance: Vec3,
	pub alive: bool,
	pub rng: Prng,
}

impl PathState {
	pub fn new(seed: u32) -> Self {
		Self { throughput: Vec3::ONE, radiance: Vec3::ZERO, alive: true, rng: Prng::new(seed) }
	}
}

/// Advance one path by one bounce (spec §4.I steps 2-4): add the hit
/// surface's emission weighted by the current throughput, sample a new
/// cosine-weighted bounce direction, fold the surface's diffuse albedo
/// into the throughput, and roll Russian roulette. Returns the new bounce
/// direction, or `None` if the path terminated (either by roulette or
/// because it had already died on a prior call).
pub fn bounce(state: &mut PathState, hit_normal: Vec3, emission: Vec3, diffuse: f32, bounce_index: u32) -> Option<Vec3> {
	if !state.alive {
		return None;
	}

	state.radiance += state.throughput.cmul(emission);

	let u1 = state.rng.next_f32();
	let u2 = state.rng.next_f32();
	let new_dir = cosine_sample_hemisphere(hit_normal, u1, u2);

	state.throughput = state.throughput * diffuse;

	match russian_roulette(state.throughput, &mut state.rng, bounce_index >= 3) {
		Some(inv_p) => {
			state.throughput = state.throughput * inv_p;
			Some(new_dir)
		}
		None => {
			state.alive = false;
			None
		}
	}
}

/// Which branch a stochastic Fresnel split picked (spec §4.I step 5
/// "Fresnel split").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FresnelBranch {
	Reflect,
	Refract,
}

/// Draw the Fresnel split for one transmissive-material bounce (spec §4.I
/// step 5): unlike the ray-traced path, which sums a reflect and a
/// transmit contribution weighted by `reflectance`/`1 - reflectance`, the
/// path tracer follows exactly one branch per sample and folds the
/// importance weight into the caller's throughput, so the estimator stays
/// unbiased without ever evaluating both children.
pub fn fresnel_split(rng: &mut Prng, reflectance: f32) -> (FresnelBranch, f32) {
	if rng.next_f32() < reflectance {
		(FresnelBranch::Reflect, 1.0 / reflectance.max(1e-6))
	} else {
		(FresnelBranch::Refract, 1.0 / (1.0 - reflectance).max(1e-6))
	}
}

/// Fold one more sample into a running average in place (spec §4.I step 5
/// "in-place running-average accumulation"): `accum += (sample - accum) /
/// n`, avoiding the separate sum-then-divide buffer the naive approach
/// needs.
pub fn accumulate_running_average(accum: &mut Vec3, sample: Vec3, sample_index: u32) {
	let n = (sample_index + 1) as f32;
	*accum += (sample - *accum) / n;
}
