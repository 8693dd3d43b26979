use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

/// A scalar 3-component vector used for surface positions, light colors and
/// the handful of per-surface constants the solver broadcasts into lanes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
	pub x: f32,
	pub y: f32,
	pub z: f32,
}

impl Vec3 {
	pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };
	pub const ONE: Self = Self { x: 1.0, y: 1.0, z: 1.0 };
	pub const X: Self = Self { x: 1.0, y: 0.0, z: 0.0 };
	pub const Y: Self = Self { x: 0.0, y: 1.0, z: 0.0 };
	pub const Z: Self = Self { x: 0.0, y: 0.0, z: 1.0 };

	pub const fn new(x: f32, y: f32, z: f32) -> Self {
		Self { x, y, z }
	}

	pub const fn splat(v: f32) -> Self {
		Self { x: v, y: v, z: v }
	}

	pub fn dot(self, rhs: Self) -> f32 {
		self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
	}

	pub fn cross(self, rhs: Self) -> Self {
		Self::new(
			self.y * rhs.z - self.z * rhs.y,
			self.z * rhs.x - self.x * rhs.z,
			self.x * rhs.y - self.y * rhs.x,
		)
	}

	pub fn length_sq(self) -> f32 {
		self.dot(self)
	}

	pub fn length(self) -> f32 {
		self.length_sq().sqrt()
	}

	pub fn normalized(self) -> Self {
		let len = self.length();
		if len > 0.0 { self / len } else { self }
	}

	pub fn cmul(self, rhs: Self) -> Self {
		Self::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
	}

	/// Component indexed by the I/J/K axis permutation (0, 1, 2).
	pub fn axis(self, index: usize) -> f32 {
		self[index]
	}
}

impl Index<usize> for Vec3 {
	type Output = f32;

	fn index(&self, index: usize) -> &f32 {
		match index {
			0 => &self.x,
			1 => &self.y,
			2 => &self.z,
			_ => panic!("Vec3 index out of range: {index}"),
		}
	}
}

impl IndexMut<usize> for Vec3 {
	fn index_mut(&mut self, index: usize) -> &mut f32 {
		match index {
			0 => &mut self.x,
			1 => &mut self.y,
			2 => &mut self.z,
			_ => panic!("Vec3 index out of range: {index}"),
		}
	}
}

impl Add for Vec3 {
	type Output = Self;

	fn add(self, rhs: Self) -> Self {
		Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
	}
}

impl AddAssign for Vec3 {
	fn add_assign(&mut self, rhs: Self) {
		*self = *self + rhs;
	}
}

impl Sub for Vec3 {
	type Output = Self;

	fn sub(self, rhs: Self) -> Self {
		Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
	}
}

impl SubAssign for Vec3 {
	fn sub_assign(&mut self, rhs: Self) {
		*self = *self - rhs;
	}
}

impl Mul<f32> for Vec3 {
	type Output = Self;

	fn mul(self, rhs: f32) -> Self {
		Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
	}
}

impl MulAssign<f32> for Vec3 {
	fn mul_assign(&mut self, rhs: f32) {
		*self = *self * rhs;
	}
}

impl Div<f32> for Vec3 {
	type Output = Self;

	fn div(self, rhs: f32) -> Self {
		self * (1.0 / rhs)
	}
}

impl DivAssign<f32> for Vec3 {
	fn div_assign(&mut self, rhs: f32) {
		*self = *self / rhs;
	}
}

impl Neg for Vec3 {
	type Output = Self;

	fn neg(self) -> Self {
		Self::new(-self.x, -self.y, -self.z)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dot_and_cross() {
		let a = Vec3::X;
		let b = Vec3::Y;
		assert_eq!(a.dot(b), 0.0);
		assert_eq!(a.cross(b), Vec3::Z);
	}

	#[test]
	fn normalize() {
		let v = Vec3::new(3.0, 0.0, 4.0);
		let n = v.normalized();
		assert!((n.length() - 1.0).abs() < 1e-6);
		assert!((n.x - 0.6).abs() < 1e-6);
	}
}
