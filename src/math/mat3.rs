use super::vec3::Vec3;

/// A row-major 3x3 matrix: the per-surface local-space rotation/scale used
/// to transform `DFF`/`RAY` into a surface's local coordinate frame (spec
/// §3 "transform-matrix rows").
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat3 {
	pub rows: [Vec3; 3],
}

impl Mat3 {
	pub const IDENTITY: Self = Self {
		rows: [Vec3::X, Vec3::Y, Vec3::Z],
	};

	pub const fn from_rows(r0: Vec3, r1: Vec3, r2: Vec3) -> Self {
		Self { rows: [r0, r1, r2] }
	}

	/// A diagonal (scale-only) matrix: the solver's fastpath in spec §4.D
	/// step 3 uses only these diagonal entries.
	pub const fn from_diagonal(scale: Vec3) -> Self {
		Self::from_rows(
			Vec3::new(scale.x, 0.0, 0.0),
			Vec3::new(0.0, scale.y, 0.0),
			Vec3::new(0.0, 0.0, scale.z),
		)
	}

	pub fn is_diagonal(&self) -> bool {
		self.rows[0].y == 0.0 && self.rows[0].z == 0.0 &&
		self.rows[1].x == 0.0 && self.rows[1].z == 0.0 &&
		self.rows[2].x == 0.0 && self.rows[2].y == 0.0
	}

	/// Rotate a world-space vector into local space (`v * M`).
	pub fn transform(&self, v: Vec3) -> Vec3 {
		Vec3::new(self.rows[0].dot(v), self.rows[1].dot(v), self.rows[2].dot(v))
	}

	/// Rotate a local-space vector back into world space (`v * M^T`), used
	/// to finalize normals per spec §4.F step 1.
	pub fn transform_transpose(&self, v: Vec3) -> Vec3 {
		Vec3::new(
			self.rows[0].x * v.x + self.rows[1].x * v.y + self.rows[2].x * v.z,
			self.rows[0].y * v.x + self.rows[1].y * v.y + self.rows[2].y * v.z,
			self.rows[0].z * v.x + self.rows[1].z * v.y + self.rows[2].z * v.z,
		)
	}

	pub fn is_isometric(&self) -> bool {
		let eps = 1e-5;
		(self.rows[0].length_sq() - 1.0).abs() < eps &&
		(self.rows[1].length_sq() - 1.0).abs() < eps &&
		(self.rows[2].length_sq() - 1.0).abs() < eps
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identity_roundtrips() {
		let v = Vec3::new(1.0, 2.0, 3.0);
		assert_eq!(Mat3::IDENTITY.transform(v), v);
		assert_eq!(Mat3::IDENTITY.transform_transpose(v), v);
	}

	#[test]
	fn diagonal_is_diagonal() {
		assert!(Mat3::from_diagonal(Vec3::new(2.0, 3.0, 4.0)).is_diagonal());
		assert!(Mat3::IDENTITY.is_diagonal());

		let rotated = Mat3::from_rows(Vec3::new(0.0, 1.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), Vec3::Z);
		assert!(!rotated.is_diagonal());
	}
}
