//! Transfer and density kernels.

use glam::Vec3;

/// 1D tent weight with one-cell support.
#[inline]
pub fn tent_1d(r: f32) -> f32 {
    let a = r.abs();
    if a < 1.0 {
        1.0 - a
    } else {
        0.0
    }
}

/// Separable tent kernel over an offset measured in cells.
#[inline]
pub fn tent_3d(offset: Vec3) -> f32 {
    tent_1d(offset.x) * tent_1d(offset.y) * tent_1d(offset.z)
}

/// Smooth falloff `max(0, 1 - r^2/s^2)^3` used for particle density.
#[inline]
pub fn smooth(r2: f32, radius: f32) -> f32 {
    let s2 = radius * radius;
    if r2 >= s2 {
        0.0
    } else {
        let x = 1.0 - r2 / s2;
        x * x * x
    }
}
