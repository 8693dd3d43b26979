use crate::math::Vec3;
use bitflags::bitflags;

bitflags! {
	/// Material property bits (spec §7). Packed into the context's
	/// `PARAM`/`LOCAL` word in the original; here they're just a typed set
	/// fetched once per solver hit.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct MaterialFlags: u32 {
		const LIGHT    = 0x0010;
		const METAL    = 0x0020;
		const GAMMA    = 0x0040;
		const FRESNEL  = 0x0080;
		const NORMAL   = 0x0100;
		const OPAQUE   = 0x0200;
		const TRANSP   = 0x0400;
		const TEXTURE  = 0x0800;
		const REFLECT  = 0x1000;
		const REFRACT  = 0x2000;
		const DIFFUSE  = 0x4000;
		const SPECULAR = 0x8000;
	}
}

/// A 2D UV transform applied before the texture lookup (spec §4.F step 2):
/// scale, offset, an index mask and a row shift for the packed lookup.
#[derive(Clone, Copy, Debug)]
pub struct TextureTransform {
	pub scale: [f32; 2],
	pub offset: [f32; 2],
	/// Mask applied to the truncated U integer coordinate (power-of-two
	/// texture width minus one).
	pub xmask: i32,
	/// Shift applied to the truncated V integer coordinate before
	/// combining with U into a single row-major index.
	pub yshift: u32,
	/// Which local axes (0=I,1=J,2=K) the U/V coordinates are derived from.
	pub axis_map: [usize; 2],
}

/// A row-major, power-of-two-dimensioned texture buffer (spec §6).
#[derive(Clone, Debug)]
pub struct Texture {
	pub width: u32,
	pub height: u32,
	/// Packed 0xAABBGGRR texels, row-major.
	pub texels: Vec<u32>,
}

impl Texture {
	pub fn sample_texel(&self, index: u32) -> u32 {
		self.texels[(index as usize) % self.texels.len()]
	}
}

/// Per-surface-side material (spec §3).
#[derive(Clone, Debug)]
pub struct Material {
	pub flags: MaterialFlags,

	pub texture: Option<Texture>,
	pub texture_transform: TextureTransform,

	pub diffuse: f32,
	pub specular: f32,
	/// Specular exponent in 28.4 fixed point, as the original stores it
	/// (spec §3). `specular_power()` decodes it to a plain f32 exponent.
	pub specular_pow_28_4: u32,

	pub reflect: f32,
	pub transmit: f32,
	pub refract_index: f32,
	/// `1 - refract_index^2`, precomputed as the original's `rfr_2` field.
	pub rfr_2: f32,

	/// Metal extinction coefficient squared, and its reciprocal.
	pub metal_ext_2: f32,
	pub metal_ext_2_rcp: f32,

	pub emission: Vec3,

	pub color_clamp: f32,
	pub channel_mask: u32,
}

impl Material {
	pub fn specular_power(&self) -> f32 {
		self.specular_pow_28_4 as f32 / 16.0
	}

	pub fn is_light(&self) -> bool {
		self.flags.contains(MaterialFlags::LIGHT)
	}
}

/// Encode an exponent into 28.4 fixed point the way the original's
/// iterated-square pow evaluator consumes it.
pub fn encode_specular_pow(exponent: f32) -> u32 {
	(exponent * 16.0).round() as u32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn specular_pow_roundtrips() {
		let encoded = encode_specular_pow(32.0);
		let mat = Material {
			flags: MaterialFlags::DIFFUSE,
			texture: None,
			texture_transform: TextureTransform { scale: [1.0, 1.0], offset: [0.0, 0.0], xmask: 0, yshift: 0, axis_map: [0, 1] },
			diffuse: 1.0,
			specular: 0.0,
			specular_pow_28_4: encoded,
			reflect: 0.0,
			transmit: 0.0,
			refract_index: 1.0,
			rfr_2: 0.0,
			metal_ext_2: 0.0,
			metal_ext_2_rcp: 0.0,
			emission: Vec3::ZERO,
			color_clamp: 1.0,
			channel_mask: 0xff,
		};
		assert!((mat.specular_power() - 32.0).abs() < 1e-3);
	}
}
