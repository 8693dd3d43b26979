//! SIMD-buffer scheduler (spec §4.H).
//!
//! Primary rays are generated and intersected one `W`-wide batch at a time
//! (`crate::frame`), but neighboring pixels rarely hit the same surface, so
//! a naive per-batch shade call wastes most of its lanes on masked-off
//! work. The scheduler instead collects single-lane hits into per-
//! `(surface, side)` row buffers and only shades once a row fills to `W`
//! lanes — or is force-flushed at end of frame, padded with a sentinel
//! lane that `shade_group` ignores because its mask bit is clear.

use std::collections::HashMap;

use crate::context::ContextStack;
use crate::math::Vec3;
use crate::recurse;
use crate::scene::{Scene, SurfaceId};
use crate::simd::{Lanes, Mask, Vec3L};

/// One pixel's worth of already-intersected ray state, handed to the
/// scheduler instead of being shaded immediately (spec §4.H step 1).
#[derive(Clone, Copy, Debug)]
pub struct PendingHit {
	pub pixel: u32,
	pub org: Vec3,
	pub ray: Vec3,
	pub t: f32,
	pub surface: SurfaceId,
	pub inner: bool,
}

/// A shaded pixel, ready for `crate::frame` to accumulate into its output
/// buffer.
#[derive(Clone, Copy, Debug)]
pub struct ShadedPixel {
	pub pixel: u32,
	pub color: Vec3,
}

struct Row<const W: usize> {
	pixel: [u32; W],
	org: Vec3L<W>,
	ray: Vec3L<W>,
	t: Lanes<W>,
	filled: usize,
}

impl<const W: usize> Row<W> {
	fn empty() -> Self {
		Self { pixel: [u32::MAX; W], org: Vec3L::ZERO, ray: Vec3L::ZERO, t: Lanes::ZERO, filled: 0 }
	}

	fn push(&mut self, hit: PendingHit) -> bool {
		let i = self.filled;
		self.pixel[i] = hit.pixel;
		self.org.set_lane(i, hit.org);
		self.ray.set_lane(i, hit.ray);
		self.t.set_lane(i, hit.t);
		self.filled += 1;
		self.filled == W
	}

	fn active_mask(&self) -> Mask<W> {
		Mask::from_fn(|i| i < self.filled)
	}
}

/// Groups pending hits by `(surface, side)` and shades each group once it
/// has `W` lanes (spec §4.H steps 2-3 "slicing rule" / "full-row shading").
pub struct Scheduler<const W: usize> {
	rows: HashMap<(u32, bool), Row<W>>,
}

impl<const W: usize> Scheduler<W> {
	pub fn new() -> Self {
		Self { rows: HashMap::new() }
	}

	/// Register one pixel's hit. Returns the shaded results for any row
	/// that just filled (almost always zero or one row; a single pending
	/// hit can only ever complete the one row it was added to).
	pub fn submit(
		&mut self,
		stack: &mut ContextStack<W>,
		scene: &Scene,
		ambient: Vec3,
		hit: PendingHit,
	) -> Vec<ShadedPixel> {
		let key = (hit.surface.0, hit.inner);
		let row = self.rows.entry(key).or_insert_with(Row::empty);

		if row.push(hit) {
			let row = self.rows.remove(&key).unwrap();
			flush_row(stack, scene, ambient, hit.surface, hit.inner, &row)
		} else {
			Vec::new()
		}
	}

	/// Shade every partially-filled row at end of frame, padding unused
	/// lanes with a cleared mask bit so they contribute nothing (spec §4.H
	/// "end-of-frame flush with sentinel-masked padding").
	pub fn flush_all(&mut self, stack: &mut ContextStack<W>, scene: &Scene, ambient: Vec3) -> Vec<ShadedPixel> {
		let mut out = Vec::new();
		for ((surface, inner), row) in self.rows.drain() {
			if row.filled == 0 {
				continue;
			}
			out.extend(flush_row(stack, scene, ambient, SurfaceId(surface), inner, &row));
		}
		out
	}
}

impl<const W: usize> Default for Scheduler<W> {
	fn default() -> Self {
		Self::new()
	}
}

fn flush_row<const W: usize>(
	stack: &mut ContextStack<W>,
	scene: &Scene,
	ambient: Vec3,
	surface: SurfaceId,
	inner: bool,
	row: &Row<W>,
) -> Vec<ShadedPixel> {
	let active = row.active_mask();

	{
		let ctx = stack.current_mut();
		ctx.org = row.org;
		ctx.ray = row.ray;
		ctx.t_buf = row.t;
		ctx.tmask = active;
		ctx.wmask = active;
	}

	recurse::shade_group(stack, scene, surface, inner, active, ambient);

	let col = stack.current().col;
	(0..row.filled).map(|i| ShadedPixel { pixel: row.pixel[i], color: col.lane(i) }).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::math::Vec3;
	use crate::scene::{
		Light, Material, MaterialFlags, SceneElem, SidedMaterial, Surface, SurfaceKind, TextureTransform,
	};

	fn light_material() -> Material {
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
			emission: Vec3::new(1.0, 0.5, 0.25),
			color_clamp: 1.0,
			channel_mask: 0xff,
		}
	}

	fn scene_with_emissive_sphere() -> (Scene, SurfaceId) {
		let mut scene = Scene::new();
		let sphere = scene.surfaces.insert(Surface::new(
			SurfaceKind::Quadric { sci: Vec3::ONE, scj: Vec3::ZERO, sci_w: -1.0 },
			Vec3::ZERO,
			[0, 1, 2],
			[1.0; 3],
			SidedMaterial { outer: Some(0), inner: Some(0) },
		));
		scene.materials.push(light_material());
		scene.surface_list.push(SceneElem::Surface(sphere));
		(scene, sphere)
	}

	#[test]
	fn row_flushes_once_full_and_reports_every_pixel() {
		let (scene, sphere) = scene_with_emissive_sphere();
		let mut stack = ContextStack::<4>::new(2);
		let mut scheduler = Scheduler::<4>::new();

		let mut flushed = Vec::new();
		for pixel in 0..4u32 {
			let hit = PendingHit {
				pixel,
				org: Vec3::new(0.0, 0.0, -3.0),
				ray: Vec3::new(0.0, 0.0, 1.0),
				t: 2.0,
				surface: sphere,
				inner: false,
			};
			flushed.extend(scheduler.submit(&mut stack, &scene, Vec3::ZERO, hit));
		}

		assert_eq!(flushed.len(), 4);
		for shaded in &flushed {
			assert!((shaded.color.x - 1.0).abs() < 1e-4);
			assert!((shaded.color.y - 0.5).abs() < 1e-4);
		}
	}

	#[test]
	fn partial_row_only_flushes_on_explicit_flush_all() {
		let (scene, sphere) = scene_with_emissive_sphere();
		let mut stack = ContextStack::<4>::new(2);
		let mut scheduler = Scheduler::<4>::new();

		let hit = PendingHit { pixel: 7, org: Vec3::new(0.0, 0.0, -3.0), ray: Vec3::new(0.0, 0.0, 1.0), t: 2.0, surface: sphere, inner: false };
		let immediate = scheduler.submit(&mut stack, &scene, Vec3::ZERO, hit);
		assert!(immediate.is_empty(), "a single pixel must not flush a width-4 row");

		let flushed = scheduler.flush_all(&mut stack, &scene, Vec3::ZERO);
		assert_eq!(flushed.len(), 1);
		assert_eq!(flushed[0].pixel, 7);
	}

	#[test]
	fn distinct_surfaces_fill_independent_rows() {
		let mut scene = Scene::new();
		let a = scene.surfaces.insert(Surface::new(
			SurfaceKind::Quadric { sci: Vec3::ONE, scj: Vec3::ZERO, sci_w: -1.0 },
			Vec3::ZERO,
			[0, 1, 2],
			[1.0; 3],
			SidedMaterial { outer: Some(0), inner: Some(0) },
		));
		let b = scene.surfaces.insert(Surface::new(
			SurfaceKind::Quadric { sci: Vec3::ONE, scj: Vec3::ZERO, sci_w: -1.0 },
			Vec3::new(10.0, 0.0, 0.0),
			[0, 1, 2],
			[1.0; 3],
			SidedMaterial { outer: Some(0), inner: Some(0) },
		));
		scene.materials.push(light_material());
		scene.surface_list.push(SceneElem::Surface(a));
		scene.surface_list.push(SceneElem::Surface(b));
		scene.lights.push(Light {
			position: Vec3::ZERO,
			color: Vec3::ONE,
			intensity: 1.0,
			attenuation_quadratic: 0.0,
			attenuation_linear: 0.0,
			attenuation_constant: 1.0,
			depth_max: 1,
			shadow_casters: None,
		});

		let mut stack = ContextStack::<4>::new(2);
		let mut scheduler = Scheduler::<4>::new();

		let hit_a = PendingHit { pixel: 0, org: Vec3::new(0.0, 0.0, -3.0), ray: Vec3::new(0.0, 0.0, 1.0), t: 2.0, surface: a, inner: false };
		let hit_b = PendingHit { pixel: 1, org: Vec3::new(10.0, 0.0, -3.0), ray: Vec3::new(0.0, 0.0, 1.0), t: 2.0, surface: b, inner: false };

		assert!(scheduler.submit(&mut stack, &scene, Vec3::ZERO, hit_a).is_empty());
		assert!(scheduler.submit(&mut stack, &scene, Vec3::ZERO, hit_b).is_empty());
		assert_eq!(scheduler.rows.len(), 2, "distinct surfaces must not share a row");
	}
}
