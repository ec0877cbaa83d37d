//! Default simulation parameters.
//!
//! ## Units
//!
//! The simulation runs in normalized coordinates: positions live in `[0,1]^3`
//! and the cell width is `1 / max(X,Y,Z)`. Velocities, gravity, and the
//! liquid level set all use the same normalized units.
//!
//! ## Particle spacing
//!
//! `DEFAULT_DENSITY` is the emission spacing measured in cells. The default
//! of 0.5 places two particles per cell along each axis (eight per cell).

use glam::Vec3;

/// Fixed time step per frame (seconds).
pub const DEFAULT_STEPSIZE: f32 = 0.005;

/// FLIP weight in the PIC/FLIP blend (0.95 = 95% FLIP, 5% PIC).
pub const DEFAULT_PICFLIP_RATIO: f32 = 0.95;

/// Particle spacing in cells.
pub const DEFAULT_DENSITY: f32 = 0.5;

/// Relative density below which a particle counts as isolated.
pub const DEFAULT_DENSITY_THRESHOLD: f32 = 0.04;

/// Gravity in normalized units per second squared.
pub const GRAVITY_VEC: Vec3 = Vec3::new(0.0, -9.8, 0.0);

/// Relative residual at which the pressure solve is considered converged.
pub const CG_TOLERANCE: f32 = 1e-4;

/// Iteration cap for the pressure solve.
pub const CG_MAX_ITERATIONS: usize = 200;

/// Lower clamp for the free-surface fraction used by ghost pressures.
pub const SUBCELL_THETA_MIN: f32 = 1e-2;

/// Impulse factor applied when a stuck particle is projected out of a solid.
pub const WALL_PENALTY_FORCE: f32 = 10.0;

/// Hard cap on the particle population; inserts and emissions stop above it.
pub const DEFAULT_MAX_PARTICLES: usize = 4_000_000;
