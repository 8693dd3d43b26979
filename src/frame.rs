//! Frame driver (spec §4.J): row-striped iteration, primary ray generation,
//! antialiasing downsample and final pixel pack. Named to match the
//! teacher's `graphics/scene.rs` driver role.
//!
//! This drives `crate::recurse::trace` directly rather than going through
//! `crate::schedule::Scheduler`; a caller that wants the scheduler's
//! cross-batch shading deferral composes it itself by running
//! `solver::intersect` per batch and submitting the resulting hits, since
//! that reordering is an optional performance layer, not a required part
//! of the row-driver contract.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::ContextStack;
use crate::error::Error;
use crate::math::Vec3;
use crate::pathtrace::{self, PathState};
use crate::recurse;
use crate::scene::{Camera, Scene};
use crate::simd::{Mask, Vec3L};

/// Per-frame path-tracer accumulation state (spec §6 "Path-tracer planes").
pub struct PathTracerState<'a> {
	pub planes: [&'a mut [f32]; 3],
	pub sample_index: u32,
}

/// Everything one `render` call needs (spec §6 "`render(info)`"): the
/// camera, the scene to intersect against, the output framebuffer, frame
/// dimensions, the antialiasing level, thread geometry and a cooperative
/// cancellation flag.
pub struct RenderInfo<'a> {
	pub camera: &'a Camera,
	pub scene: &'a Scene,
	pub framebuffer: &'a mut [u32],
	pub frame_w: u32,
	pub frame_h: u32,
	/// Antialiasing level: `1 << fsaa` sub-pixel samples are packed into
	/// extra SIMD lanes per batch and folded back down to one pixel (spec
	/// §4.J "each doubles lane count along one axis pair").
	pub fsaa: u32,
	pub thread_count: u32,
	pub max_depth: usize,
	pub cancel: &'a AtomicBool,
	pub path_tracer: Option<PathTracerState<'a>>,
}

/// Render this thread's row stripe into `info.framebuffer` (spec §6
/// `render(info)`, §5 "row = thread_index + k*thread_count"). `W` is the
/// SIMD width this call is compiled for; `W` must be a multiple of `1 <<
/// info.fsaa` or every batch would straddle a pixel boundary.
pub fn render<const W: usize>(info: &mut RenderInfo, thread_index: usize) -> Result<(), Error> {
	if !info.camera.validate() {
		return Err(Error::new("camera configuration is invalid: non-orthogonal step axes or no AA offsets"));
	}

	let samples_per_pixel = 1usize << info.fsaa;
	if W % samples_per_pixel != 0 {
		return Err(Error::new("lane width must be an integer multiple of the antialiasing sample count"));
	}
	let pixels_per_batch = W / samples_per_pixel;

	let mut stack = ContextStack::<W>::new(info.max_depth);
	let ambient = info.camera.ambient_color * info.camera.ambient_intensity;

	let max_depth = info.max_depth as u32;

	let mut row = thread_index as u32;
	while row < info.frame_h {
		if info.cancel.load(Ordering::Relaxed) {
			log::debug!("render cancelled before row {row}");
			return Ok(());
		}
		log::trace!("rendering row {row}");
		if info.path_tracer.is_some() {
			render_row_path_traced::<W>(info, &mut stack, row, pixels_per_batch, samples_per_pixel, max_depth);
		} else {
			render_row::<W>(info, &mut stack, ambient, row, pixels_per_batch, samples_per_pixel);
		}
		row += info.thread_count;
	}

	Ok(())
}

/// Path-tracer analogue of `render_row` (spec §4.I, §6): jitters each
/// lane's primary ray with its own tent-filter sample instead of the fixed
/// `aa_offsets` grid, seeds one `PathState` per lane, drives
/// `recurse::trace_path` to completion, and folds the result into the
/// frame's running-average planes.
fn render_row_path_traced<const W: usize>(
	info: &mut RenderInfo,
	stack: &mut ContextStack<W>,
	row: u32,
	pixels_per_batch: usize,
	samples_per_pixel: usize,
	max_bounces: u32,
) {
	let camera = info.camera;
	let ver_offset = camera.ver_step * row as f32;
	let sample_index = info.path_tracer.as_ref().expect("path-tracer branch requires path_tracer state").sample_index;

	let mut col = 0u32;
	while col < info.frame_w {
		let batch_pixels = pixels_per_batch.min((info.frame_w - col) as usize);
		let active = Mask::from_fn(|lane| lane / samples_per_pixel < batch_pixels);

		let mut ray: Vec3L<W> = Vec3L::ZERO;
		let mut paths: Vec<PathState> = Vec::with_capacity(W);
		for lane in 0..W {
			let pixel_in_batch = (lane / samples_per_pixel).min(batch_pixels.saturating_sub(1));
			let mut rng = pathtrace::Prng::new(pixel_seed(row, col + pixel_in_batch as u32, sample_index, lane as u32));
			let jitter_x = pathtrace::tent_filter(rng.next_f32());
			let jitter_y = pathtrace::tent_filter(rng.next_f32());

			let hor = camera.hor_step * (col as f32 + pixel_in_batch as f32 + jitter_x);
			let ver = ver_offset + camera.ver_step * jitter_y;
			ray.set_lane(lane, (camera.direction + hor + ver).normalized());

			paths.push(PathState { throughput: Vec3::ONE, radiance: Vec3::ZERO, alive: active.lane(lane), rng });
		}

		{
			let ctx = stack.current_mut();
			ctx.org = Vec3L::splat(camera.origin);
			ctx.ray = ray;
			ctx.wmask = active;
		}

		let color = recurse::trace_path(stack, info.scene, &mut paths, max_bounces);

		write_path_traced_batch(info, row, col, batch_pixels, samples_per_pixel, color, sample_index);

		col += batch_pixels as u32;
	}
}

/// Combine a pixel's position and this frame's sample index into one LCG
/// seed (spec §4.I "per-pixel PRNG"), spreading `lane` in too so a batch's
/// sub-pixel AA samples don't all draw the same stream.
fn pixel_seed(row: u32, col: u32, sample_index: u32, lane: u32) -> u32 {
	row.wrapping_mul(9_781) ^ col.wrapping_mul(6_151) ^ sample_index.wrapping_mul(1_000_003) ^ lane.wrapping_mul(193)
}

/// Path-tracer analogue of `write_batch`: fold this sample into the
/// per-pixel running average (spec §4.I step 5 "in-place running-average
/// accumulation") before gamma-encoding, clamping and packing it the same
/// way `write_batch` does.
fn write_path_traced_batch<const W: usize>(
	info: &mut RenderInfo,
	row: u32,
	col: u32,
	batch_pixels: usize,
	samples_per_pixel: usize,
	color: Vec3L<W>,
	sample_index: u32,
) {
	let clamp = info.camera.clamp_value;
	for pixel_in_batch in 0..batch_pixels {
		let lo = pixel_in_batch * samples_per_pixel;
		let mut averaged = Vec3::ZERO;
		for lane in lo..lo + samples_per_pixel {
			averaged += color.lane(lane);
		}
		averaged = averaged / samples_per_pixel as f32;

		let index = row as usize * info.frame_w as usize + col as usize + pixel_in_batch;

		let accum = {
			let planes = &mut info.path_tracer.as_mut().expect("path-tracer branch requires path_tracer state").planes;
			let mut accum = Vec3::new(planes[0][index], planes[1][index], planes[2][index]);
			pathtrace::accumulate_running_average(&mut accum, averaged, sample_index);
			planes[0][index] = accum.x;
			planes[1][index] = accum.y;
			planes[2][index] = accum.z;
			accum
		};

		let gamma = gamma_encode_scalar(accum);
		let clamped = Vec3::new(gamma.x.min(clamp), gamma.y.min(clamp), gamma.z.min(clamp));
		let packed = info.camera.pack_pixel(clamped.x, clamped.y, clamped.z);
		info.framebuffer[index] = packed;
	}
}

fn render_row<const W: usize>(
	info: &mut RenderInfo,
	stack: &mut ContextStack<W>,
	ambient: Vec3,
	row: u32,
	pixels_per_batch: usize,
	samples_per_pixel: usize,
) {
	let camera = info.camera;
	let ver_offset = camera.ver_step * row as f32;
	let aa_count = camera.aa_offsets.len().max(1);

	let mut col = 0u32;
	while col < info.frame_w {
		let batch_pixels = pixels_per_batch.min((info.frame_w - col) as usize);

		let ray = Vec3L::from_fn(|lane| {
			let pixel_in_batch = lane / samples_per_pixel;
			let (ax, ay) = camera.aa_offsets[(lane % samples_per_pixel) % aa_count];
			let hor = camera.hor_step * (col as f32 + pixel_in_batch.min(batch_pixels.saturating_sub(1)) as f32 + ax);
			let ver = ver_offset + camera.ver_step * ay;
			(camera.direction + hor + ver).normalized()
		});
		let active = Mask::from_fn(|lane| lane / samples_per_pixel < batch_pixels);

		{
			let ctx = stack.current_mut();
			ctx.org = Vec3L::splat(camera.origin);
			ctx.ray = ray;
			ctx.wmask = active;
		}

		let color = recurse::trace(stack, info.scene, ambient);

		write_batch(info, row, col, batch_pixels, samples_per_pixel, color);

		col += batch_pixels as u32;
	}
}

/// Downsample, gamma-encode, clamp and pack one batch's worth of finished
/// pixels into the framebuffer (spec §4.J "write pixel integers ... after
/// downsampling ... clamping, gamma-out, and a float->int conversion").
fn write_batch<const W: usize>(
	info: &mut RenderInfo,
	row: u32,
	col: u32,
	batch_pixels: usize,
	samples_per_pixel: usize,
	color: Vec3L<W>,
) {
	let clamp = info.camera.clamp_value;
	for pixel_in_batch in 0..batch_pixels {
		let lo = pixel_in_batch * samples_per_pixel;
		let mut averaged = Vec3::ZERO;
		for lane in lo..lo + samples_per_pixel {
			averaged += color.lane(lane);
		}
		averaged = averaged / samples_per_pixel as f32;

		let gamma = gamma_encode_scalar(averaged);
		let clamped = Vec3::new(gamma.x.min(clamp), gamma.y.min(clamp), gamma.z.min(clamp));
		let packed = info.camera.pack_pixel(clamped.x, clamped.y, clamped.z);

		let index = row as usize * info.frame_w as usize + col as usize + pixel_in_batch;
		info.framebuffer[index] = packed;
	}
}

/// Scalar analogue of `crate::shade::gamma_encode`, applied once per
/// finished pixel after the AA downsample has collapsed the SIMD batch
/// down to a single sample.
fn gamma_encode_scalar(c: Vec3) -> Vec3 {
	Vec3::new(c.x.max(0.0).sqrt(), c.y.max(0.0).sqrt(), c.z.max(0.0).sqrt())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scene::{Light, Material, MaterialFlags, SceneElem, SidedMaterial, Surface, SurfaceKind, TextureTransform};

	fn emissive_material() -> Material {
		Material {
			flags: MaterialFlags::LIGHT,
			texture: None,
			texture_transform: TextureTransform { scale: [1.0, 1.0], offset: [0.0, 0.0], xmask: 0, yshift: 0, axis_map: [0, 1] },
			diffuse: 0.0,
			specular: 0.0,
			specular_pow_28_4: 0,
			reflect: 0.0,
			transmit: 0.0,
			refract_index: 1.0,
			rfr_2: 0.0,
			metal_ext_2: 0.0,
			metal_ext_2_rcp: 0.0,
			emission: Vec3::new(1.0, 1.0, 1.0),
			color_clamp: 1.0,
			channel_mask: 0xff,
		}
	}

	fn scene_with_sphere_filling_frame() -> Scene {
		let mut scene = Scene::new();
		let sphere = scene.surfaces.insert(Surface::new(
			SurfaceKind::Quadric { sci: Vec3::ONE, scj: Vec3::ZERO, sci_w: -100.0 },
			Vec3::new(0.0, 0.0, 5.0),
			[0, 1, 2],
			[1.0; 3],
			SidedMaterial { outer: Some(0), inner: Some(0) },
		));
		scene.materials.push(emissive_material());
		scene.surface_list.push(SceneElem::Surface(sphere));
		scene.lights.push(Light {
			position: Vec3::new(0.0, 0.0, -5.0),
			color: Vec3::ONE,
			intensity: 1.0,
			attenuation_quadratic: 0.0,
			attenuation_linear: 0.0,
			attenuation_constant: 1.0,
			depth_max: 1,
			shadow_casters: None,
		});
		scene
	}

	#[test]
	fn render_rejects_invalid_camera() {
		let scene = Scene::new();
		let camera = Camera { aa_offsets: vec![], ..Camera::default() };
		let mut framebuffer = [0u32; 16];
		let cancel = AtomicBool::new(false);
		let mut info = RenderInfo {
			camera: &camera,
			scene: &scene,
			framebuffer: &mut framebuffer,
			frame_w: 4,
			frame_h: 4,
			fsaa: 0,
			thread_count: 1,
			max_depth: 4,
			cancel: &cancel,
			path_tracer: None,
		};
		assert!(render::<4>(&mut info, 0).is_err());
	}

	#[test]
	fn render_fills_every_pixel_a_single_thread_owns() {
		let scene = scene_with_sphere_filling_frame();
		let camera = Camera::default();
		let mut framebuffer = [0u32; 16];
		let cancel = AtomicBool::new(false);
		{
			let mut info = RenderInfo {
				camera: &camera,
				scene: &scene,
				framebuffer: &mut framebuffer,
				frame_w: 4,
				frame_h: 4,
				fsaa: 0,
				thread_count: 1,
				max_depth: 4,
				cancel: &cancel,
				path_tracer: None,
			};
			render::<4>(&mut info, 0).unwrap();
		}
		assert!(framebuffer.iter().any(|&p| p != 0), "a scene filling the frame should not pack to all-black");
		assert!(framebuffer.iter().all(|&p| p >> 24 == 0xFF), "every pixel must carry the opaque alpha byte");
	}

	#[test]
	fn two_threads_cover_disjoint_rows() {
		let scene = scene_with_sphere_filling_frame();
		let camera = Camera::default();
		let cancel = AtomicBool::new(false);

		let mut fb_a = [0u32; 16];
		{
			let mut info = RenderInfo {
				camera: &camera,
				scene: &scene,
				framebuffer: &mut fb_a,
				frame_w: 4,
				frame_h: 4,
				fsaa: 0,
				thread_count: 2,
				max_depth: 4,
				cancel: &cancel,
				path_tracer: None,
			};
			render::<4>(&mut info, 0).unwrap();
		}
		// Thread 0 owns rows 0 and 2; rows 1 and 3 must stay untouched.
		for row in [1usize, 3] {
			for col in 0..4 {
				assert_eq!(fb_a[row * 4 + col], 0);
			}
		}
	}

	#[test]
	fn cancellation_stops_before_the_next_stripe() {
		let scene = scene_with_sphere_filling_frame();
		let camera = Camera::default();
		let mut framebuffer = [0u32; 16];
		let cancel = AtomicBool::new(true);
		let mut info = RenderInfo {
			camera: &camera,
			scene: &scene,
			framebuffer: &mut framebuffer,
			frame_w: 4,
			frame_h: 4,
			fsaa: 0,
			thread_count: 1,
			max_depth: 4,
			cancel: &cancel,
			path_tracer: None,
		};
		render::<4>(&mut info, 0).unwrap();
		assert!(framebuffer.iter().all(|&p| p == 0), "a pre-cancelled render must not touch the framebuffer");
	}

	#[test]
	fn path_tracer_mode_lights_pixels_looking_at_an_emissive_sphere() {
		let scene = scene_with_sphere_filling_frame();
		let camera = Camera::default();
		let mut framebuffer = [0u32; 16];
		let mut planes = [vec![0.0f32; 16], vec![0.0f32; 16], vec![0.0f32; 16]];
		let cancel = AtomicBool::new(false);
		{
			let [r, g, b] = &mut planes;
			let mut info = RenderInfo {
				camera: &camera,
				scene: &scene,
				framebuffer: &mut framebuffer,
				frame_w: 4,
				frame_h: 4,
				fsaa: 0,
				thread_count: 1,
				max_depth: 4,
				cancel: &cancel,
				path_tracer: Some(PathTracerState {
					planes: [r.as_mut_slice(), g.as_mut_slice(), b.as_mut_slice()],
					sample_index: 0,
				}),
			};
			render::<4>(&mut info, 0).unwrap();
		}
		assert!(framebuffer.iter().any(|&p| p != 0), "a scene filling the frame should not pack to all-black");
		assert!(planes[0].iter().any(|&v| v > 0.0), "the running-average plane should record the sampled radiance");
	}
}
