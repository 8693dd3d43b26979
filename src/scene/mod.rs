//! Scene data model (spec §4.B): camera, lights, surfaces and materials
//! with the layout the solver consumes directly.

mod camera;
mod light;
mod list;
mod material;
mod surface;

pub use camera::Camera;
pub use light::Light;
pub use list::{accumulator_brackets_well_formed, ClipElem, ClipList, SceneElem, SceneList, SurfaceArena, SurfaceId};
pub use material::{encode_specular_pow, Material, MaterialFlags, Texture, TextureTransform};
pub use surface::{AxisClip, SidedMaterial, Surface, SurfaceKind};

/// A caller-provided handle into `tile_map`, indexing a per-tile surface
/// sub-list (spec §6 "Tile map"): `tile_row * tls_row + tile_col`.
#[derive(Clone, Debug, Default)]
pub struct TileMap {
	pub tile_w: u32,
	pub tile_h: u32,
	pub tiles_per_row: u32,
	pub tiles: Vec<SceneList>,
}

impl TileMap {
	pub fn list_for(&self, tile_row: u32, tile_col: u32) -> &SceneList {
		&self.tiles[(tile_row * self.tiles_per_row + tile_col) as usize]
	}
}

/// A complete scene snapshot for one frame: owns the surface arena, the
/// material table and the light list the solver/shader read (spec §3,
/// §5 "scene data ... is shared immutable while a frame is in flight").
#[derive(Clone, Debug, Default)]
pub struct Scene {
	pub surfaces: SurfaceArena,
	pub materials: Vec<Material>,
	pub lights: Vec<Light>,
	pub surface_list: SceneList,
	pub tile_map: Option<TileMap>,
}

impl Scene {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn material(&self, index: u32) -> &Material {
		&self.materials[index as usize]
	}

	pub fn surface_list_for_tile(&self, tile_row: u32, tile_col: u32) -> &SceneList {
		match &self.tile_map {
			Some(map) => map.list_for(tile_row, tile_col),
			None => &self.surface_list,
		}
	}
}
