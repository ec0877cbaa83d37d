//! Simulation parameters and construction-time validation.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants;

/// Rejected configuration. Construction fails fast; nothing downstream
/// re-validates.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("grid dimensions must be at least 3 cells per axis, got {0}x{1}x{2}")]
    InvalidDimensions(u32, u32, u32),
    #[error("particle spacing must be positive and at most one cell, got {0}")]
    InvalidDensity(f32),
    #[error("step size must be positive, got {0}")]
    InvalidStepsize(f32),
    #[error("PIC/FLIP ratio must lie in [0, 1], got {0}")]
    InvalidPicFlipRatio(f32),
    #[error("pressure solve needs a positive tolerance and iteration budget")]
    InvalidSolverSettings,
}

/// Tunable simulation parameters. Defaults mirror the reference
/// configuration; see [`crate::constants`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FlipParams {
    /// Time step per frame (seconds).
    pub stepsize: f32,
    /// FLIP weight in the PIC/FLIP blend.
    pub picflip_ratio: f32,
    /// Particle spacing in cells (0.5 = two particles per cell per axis).
    pub density: f32,
    /// Relative density below which a particle counts as isolated.
    pub density_threshold: f32,
    /// Ghost-pressure treatment at fluid/air faces.
    pub subcell: bool,
    /// Relative residual target for the pressure solve.
    pub cg_tolerance: f32,
    /// Iteration cap for the pressure solve.
    pub cg_max_iterations: usize,
    /// Gravity in normalized units.
    pub gravity: Vec3,
    /// Impulse factor for stuck-particle recovery.
    pub wall_penalty: f32,
    /// Hard cap on the particle population.
    pub max_particles: usize,
    /// Log one info line per step.
    pub verbose: bool,
}

impl Default for FlipParams {
    fn default() -> Self {
        Self {
            stepsize: constants::DEFAULT_STEPSIZE,
            picflip_ratio: constants::DEFAULT_PICFLIP_RATIO,
            density: constants::DEFAULT_DENSITY,
            density_threshold: constants::DEFAULT_DENSITY_THRESHOLD,
            subcell: true,
            cg_tolerance: constants::CG_TOLERANCE,
            cg_max_iterations: constants::CG_MAX_ITERATIONS,
            gravity: constants::GRAVITY_VEC,
            wall_penalty: constants::WALL_PENALTY_FORCE,
            max_particles: constants::DEFAULT_MAX_PARTICLES,
            verbose: false,
        }
    }
}

impl FlipParams {
    /// Check every invariant the step pipeline assumes.
    pub fn validate(&self, dims: glam::UVec3) -> Result<(), ConfigError> {
        if dims.x < 3 || dims.y < 3 || dims.z < 3 {
            return Err(ConfigError::InvalidDimensions(dims.x, dims.y, dims.z));
        }
        if !(self.density > 0.0 && self.density <= 1.0) {
            return Err(ConfigError::InvalidDensity(self.density));
        }
        if !(self.stepsize > 0.0) {
            return Err(ConfigError::InvalidStepsize(self.stepsize));
        }
        if !(0.0..=1.0).contains(&self.picflip_ratio) {
            return Err(ConfigError::InvalidPicFlipRatio(self.picflip_ratio));
        }
        if !(self.cg_tolerance > 0.0) || self.cg_max_iterations == 0 {
            return Err(ConfigError::InvalidSolverSettings);
        }
        Ok(())
    }
}
