use super::surface::Surface;
use crate::math::{Mat3, Vec3};

/// An index into a `SurfaceArena`. Surfaces are owned by a single arena for
/// the lifetime of a frame's scene snapshot; every other reference
/// (scheme lists, clip lists, bounding groups) goes through this handle
/// instead of a pointer (spec §9 "Cyclic references").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u32);

#[derive(Clone, Debug, Default)]
pub struct SurfaceArena {
	surfaces: Vec<Surface>,
}

impl SurfaceArena {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, mut surface: Surface) -> SurfaceId {
		surface.update();
		self.surfaces.push(surface);
		SurfaceId((self.surfaces.len() - 1) as u32)
	}

	pub fn get(&self, id: SurfaceId) -> &Surface {
		&self.surfaces[id.0 as usize]
	}

	pub fn get_mut(&mut self, id: SurfaceId) -> &mut Surface {
		&mut self.surfaces[id.0 as usize]
	}

	pub fn len(&self) -> usize {
		self.surfaces.len()
	}

	pub fn is_empty(&self) -> bool {
		self.surfaces.is_empty()
	}
}

/// One element of the scene's main surface list (spec §3 "List element",
/// §4.E). Per the design notes (spec §9) the original's tagged pointer is
/// modeled as an explicit sum type rather than a 4-bit flag packed into a
/// pointer's low bits.
#[derive(Clone, Debug)]
pub enum SceneElem {
	/// An ordinary candidate surface.
	Surface(SurfaceId),
	/// A trnode: the following elements up to (and not including) index
	/// `last_index` share `transform`/`position` and may reuse a single
	/// transformed DFF/RAY cache (spec §4.D step 2, §4.E).
	TransformGroup { transform: Mat3, position: Vec3, last_index: usize },
	/// A bounding array: `bound` is a group-bounding quadric surface; when
	/// every lane misses it, the solver skips `count` following elements
	/// (spec §4.D step 4, §4.E).
	BoundingArray { bound: SurfaceId, count: usize },
}

pub type SceneList = Vec<SceneElem>;

/// One element of a custom-clip list (spec §4.D "Custom clippers"). The
/// `AccumEnter`/`AccumLeave` sentinels bracket an accumulator scope: the
/// original represents them as `(simd=null, data=±1)`; here they're
/// distinct enum variants instead of magic sentinel values (spec §9,
/// §3 "Supplemented features").
#[derive(Clone, Debug)]
pub enum ClipElem {
	Clip(SurfaceId),
	AccumEnter,
	AccumLeave,
}

pub type ClipList = Vec<ClipElem>;

/// Checks that every `AccumEnter` in a clip list is matched by exactly one
/// `AccumLeave` later in list order, with no interleaving — the
/// well-formedness property spec §8 requires.
pub fn accumulator_brackets_well_formed(list: &ClipList) -> bool {
	let mut depth = 0i32;
	for elem in list {
		match elem {
			ClipElem::AccumEnter => depth += 1,
			ClipElem::AccumLeave => {
				depth -= 1;
				if depth < 0 {
					return false;
				}
			}
			ClipElem::Clip(_) => {}
		}
	}
	depth == 0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn arena_round_trips_ids() {
		let mut arena = SurfaceArena::new();
		let id = arena.insert(super::super::surface::Surface::new(
			super::super::surface::SurfaceKind::Plane,
			Vec3::ZERO,
			[0, 1, 2],
			[1.0; 3],
			super::super::surface::SidedMaterial { outer: Some(0), inner: None },
		));
		assert_eq!(arena.len(), 1);
		assert!(matches!(arena.get(id).kind, super::super::surface::SurfaceKind::Plane));
	}

	#[test]
	fn well_formed_brackets() {
		let list = vec![ClipElem::AccumEnter, ClipElem::Clip(SurfaceId(0)), ClipElem::AccumLeave];
		assert!(accumulator_brackets_well_formed(&list));
	}

	#[test]
	fn unmatched_leave_is_not_well_formed() {
		let list = vec![ClipElem::AccumLeave, ClipElem::AccumEnter];
		assert!(!accumulator_brackets_well_formed(&list));
	}

	#[test]
	fn unclosed_enter_is_not_well_formed() {
		let list = vec![ClipElem::AccumEnter];
		assert!(!accumulator_brackets_well_formed(&list));
	}
}
