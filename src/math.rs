use bevy::math::Vec2;
use nalgebra::Matrix2;

pub type Real = f32;

pub type Vector = Vec2;

/// 2x2 block type used by the sparse Jacobian.
pub type Block = Matrix2<Real>;

#[inline(always)]
pub fn zero_vector() -> Vector {
    Vec2::ZERO
}

/// Scalar 2D cross product `a.x * b.y - a.y * b.x`.
#[inline(always)]
pub fn cross(a: Vector, b: Vector) -> Real {
    a.perp_dot(b)
}

/// Velocity of a rigid rotation with angular rate `omega` about `center`.
#[inline(always)]
pub fn rigid_rotation(omega: Real, center: Vector, position: Vector) -> Vector {
    (position - center).perp() * omega
}

#[inline(always)]
pub fn outer_product(a: Vector, b: Vector) -> Block {
    Block::new(a.x * b.x, a.x * b.y, a.y * b.x, a.y * b.y)
}

#[inline(always)]
pub fn block_identity() -> Block {
    Block::identity()
}

#[inline(always)]
pub fn block_is_finite(block: &Block) -> bool {
    block.iter().all(|value| value.is_finite())
}

/// Harmonic mean `2ab / (a + b)`, zero when either side vanishes.
#[inline(always)]
pub fn harmonic_mean(a: Real, b: Real) -> Real {
    let sum = a + b;
    if sum > 0.0 { 2.0 * (a * b) / sum } else { 0.0 }
}
