//! Ray batch / recursion-frame stack (spec §4.C).
//!
//! The original pins a single aligned arena per thread and addresses
//! frames by byte offset. Per the design notes (spec §9 "Manual register
//! allocation", "Coroutine-like control flow") we replace that with a
//! `Vec<Context<W>>` used as a LIFO stack: push/pop is `Vec::push`/
//! `Vec::pop`-shaped (implemented as index increment/decrement so the
//! storage is preallocated once, matching the "arena, not per-bounce
//! allocation" contract).

use crate::scene::SurfaceId;
use crate::simd::{ILanes, Lanes, Mask, Vec3L};
use bitflags::bitflags;

bitflags! {
	/// Context pass/side flags (spec §7), packed alongside the material
	/// property bits in the original's single `PARAM` word.
	#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
	pub struct ContextFlags: u32 {
		/// Inner side of a closed quadric (outer = 0 is the default).
		const INNER  = 0x1;
		/// A transmission (refraction) bounce, as opposed to a reflection.
		const THRU   = 0x2;
		/// A shadow ray: only the returned mask matters, not the color.
		const SHADOW = 0x4;
	}
}

/// Which shader stage a recursion frame returns control to (the original's
/// small integer return tag stored in `LOCAL.ptr`, spec §4.G step 2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnTag {
	Shadow,
	Transmission,
	Reflection,
	PathBounce,
}

/// One bounce's working memory (spec §3 "Context").
pub struct Context<const W: usize> {
	pub org: Vec3L<W>,
	pub ray: Vec3L<W>,
	pub dff: Vec3L<W>,
	pub hit: Vec3L<W>,
	pub nrm: Vec3L<W>,
	pub new_dir: Vec3L<W>,

	pub t_val: Lanes<W>,
	pub t_buf: Lanes<W>,
	pub t_min: Lanes<W>,

	pub tmask: Mask<W>,
	pub wmask: Mask<W>,

	/// The arena index of the current winning surface per lane, or `-1`
	/// where no surface has been hit yet (spec §4.D step 8 "per-side
	/// loop", resolved by the solver and consumed by the shader).
	pub hit_surf: ILanes<W>,
	/// Which side of `hit_surf` won, per lane (outer = unset).
	pub hit_inner: Mask<W>,

	pub index: ILanes<W>,

	pub col: Vec3L<W>,
	pub mul: Vec3L<W>,

	pub c_trn: Lanes<W>,
	pub c_rfl: Lanes<W>,

	/// Mask returned by a shadow-ray recursion (spec §4.F: "push a shadow
	/// recursion (returns only a mask in `C_BUF`)").
	pub shadow_mask: Mask<W>,

	pub flags: ContextFlags,
	/// The surface/material/light-list pointer the current bounce
	/// originated from (`PARAM.lst`/`PARAM.obj` in the original).
	pub origin_surface: Option<SurfaceId>,
	pub material_or_light: Option<u32>,
	pub return_tag: Option<ReturnTag>,
}

impl<const W: usize> Context<W> {
	pub fn new() -> Self {
		Self {
			org: Vec3L::ZERO,
			ray: Vec3L::ZERO,
			dff: Vec3L::ZERO,
			hit: Vec3L::ZERO,
			nrm: Vec3L::ZERO,
			new_dir: Vec3L::ZERO,
			t_val: Lanes::ZERO,
			t_buf: Lanes::splat(f32::MAX),
			t_min: Lanes::splat(1e-4),
			tmask: Mask::ALL_FALSE,
			wmask: Mask::ALL_FALSE,
			hit_surf: ILanes::splat(-1),
			hit_inner: Mask::ALL_FALSE,
			index: ILanes::ZERO,
			col: Vec3L::ZERO,
			mul: Vec3L { x: Lanes::ONE, y: Lanes::ONE, z: Lanes::ONE },
			c_trn: Lanes::ZERO,
			c_rfl: Lanes::ZERO,
			shadow_mask: Mask::ALL_TRUE,
			flags: ContextFlags::empty(),
			origin_surface: None,
			material_or_light: None,
			return_tag: None,
		}
	}

	/// Reset a frame's stale hit state on entry (spec §4.C): `T_BUF <-
	/// T_MAX`, color accumulators and the shadow buffer cleared.
	pub fn reset_for_bounce(&mut self, wmask: Mask<W>) {
		self.t_buf = Lanes::splat(f32::MAX);
		self.tmask = Mask::ALL_FALSE;
		self.wmask = wmask;
		self.col = Vec3L::ZERO;
		self.shadow_mask = Mask::ALL_TRUE;
		self.hit_surf = ILanes::splat(-1);
		self.hit_inner = Mask::ALL_FALSE;
	}
}

impl<const W: usize> Default for Context<W> {
	fn default() -> Self {
		Self::new()
	}
}

/// A per-thread LIFO stack of recursion frames (spec §4.C, §4.G). Sized to
/// `max_depth + 1` frames at construction, matching the original's "arena
/// large enough for (max_depth + 1) contexts" contract — this stack never
/// grows after `new`.
pub struct ContextStack<const W: usize> {
	frames: Vec<Context<W>>,
	top: usize,
}

impl<const W: usize> ContextStack<W> {
	pub fn new(max_depth: usize) -> Self {
		let mut frames = Vec::with_capacity(max_depth + 1);
		for _ in 0..=max_depth {
			frames.push(Context::new());
		}
		Self { frames, top: 0 }
	}

	pub fn depth(&self) -> usize {
		self.top
	}

	pub fn max_depth(&self) -> usize {
		self.frames.len() - 1
	}

	pub fn current(&self) -> &Context<W> {
		&self.frames[self.top]
	}

	pub fn current_mut(&mut self) -> &mut Context<W> {
		&mut self.frames[self.top]
	}

	/// Push a new frame for a secondary-ray bounce. Returns `false` (the
	/// depth-zero terminator from spec §4.G) if the stack is already at
	/// its configured max depth.
	pub fn push(&mut self) -> bool {
		if self.top + 1 >= self.frames.len() {
			return false;
		}
		self.top += 1;
		true
	}

	/// Pop back to the parent frame after a bounce returns.
	pub fn pop(&mut self) {
		debug_assert!(self.top > 0, "popped past the root context frame");
		self.top -= 1;
	}

	pub fn remaining_depth(&self) -> usize {
		self.frames.len() - 1 - self.top
	}
}
