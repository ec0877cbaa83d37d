//! 3D FLIP/PIC incompressible fluid simulation core.
//!
//! Marker particles carry the fluid state; each step transfers their
//! momentum onto a staggered MAC grid, projects the grid field to be
//! divergence-free under a particle-built free-surface level set, and blends
//! the corrected grid velocities back onto the particles before advecting
//! them through solid obstacles.
//!
//! Scenes supply level sets, emission, and export behind the [`Scene`]
//! trait; the simulator owns the particles and every grid.
//!
//! # Example
//!
//! ```
//! use flip3d::{FlipParams, FlipSimulation, GeometryScene, UVec3, Vec3};
//!
//! let dims = UVec3::new(16, 16, 16);
//! let mut scene = GeometryScene::new(dims);
//! scene.add_liquid_region(Vec3::ZERO, Vec3::new(1.0, 0.4, 1.0));
//!
//! let mut sim = FlipSimulation::new(dims, scene, FlipParams::default()).unwrap();
//! sim.init();
//! sim.step(false, false, false);
//! assert!(!sim.particles().is_empty());
//! ```

pub mod advection;
pub mod constants;
pub mod grid;
pub mod kernels;
pub mod mac;
pub mod params;
pub mod particle;
pub mod particlegrid;
pub mod pressure;
pub mod resample;
pub mod scene;
pub mod transfer;

pub use glam::{UVec3, Vec3};
pub use grid::{CellType, Grid3};
pub use mac::{MacGrid, PrevGrid};
pub use params::{ConfigError, FlipParams};
pub use particle::{Particle, ParticleKind, Particles};
pub use particlegrid::ParticleGrid;
pub use scene::{AabbRegion, GeometryScene, Inflow, Scene, SceneRegion};

use rayon::prelude::*;

/// FLIP/PIC fluid simulator over a `(X, Y, Z)`-cell domain.
pub struct FlipSimulation<S: Scene> {
    dims: UVec3,
    maxd: f32,
    params: FlipParams,
    scene: S,
    particles: Particles,
    pgrid: ParticleGrid,
    mgrid: MacGrid,
    mgrid_prev: PrevGrid,
    /// Kernel density of ideally packed fluid, calibrated once in `init`.
    max_density: f32,
    frame: u32,
}

impl<S: Scene> FlipSimulation<S> {
    /// Validate the configuration and allocate every grid.
    pub fn new(dims: UVec3, scene: S, params: FlipParams) -> Result<Self, ConfigError> {
        params.validate(dims)?;
        Ok(Self {
            dims,
            maxd: dims.x.max(dims.y).max(dims.z) as f32,
            params,
            scene,
            particles: Particles::new(),
            pgrid: ParticleGrid::new(dims),
            mgrid: MacGrid::new(dims),
            mgrid_prev: PrevGrid::new(dims),
            max_density: 1.0,
            frame: 0,
        })
    }

    /// Calibrate the density normalization, emit the frame-0 particles, and
    /// purge fluid that spawned inside solids.
    pub fn init(&mut self) {
        // A packed synthetic block tells us what the kernel density of
        // ideal packing looks like; runtime densities are relative to it.
        let spacing = self.params.density / self.maxd;
        self.particles.clear();
        for k in 0..10 {
            for j in 0..10 {
                for i in 0..10 {
                    self.particles.spawn_fluid(
                        Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32 + 0.5) * spacing,
                    );
                }
            }
        }
        self.pgrid.sort(&self.particles);
        self.max_density = 1.0;
        self.compute_density();
        self.max_density = self
            .particles
            .list
            .iter()
            .map(|p| p.density)
            .fold(0.0, f32::max)
            .max(f32::MIN_POSITIVE);
        self.particles.clear();

        self.scene.build_level_sets(0);
        self.scene
            .generate_particles(&mut self.particles, self.params.density, 0);
        self.pgrid.sort(&self.particles);
        self.pgrid.mark_cell_types(
            &self.particles,
            &mut self.mgrid.a,
            self.scene.solid_level_set(),
        );

        let a = &self.mgrid.a;
        let pgrid = &self.pgrid;
        self.particles.list.retain(|particle| {
            if particle.kind != ParticleKind::Fluid {
                return true;
            }
            let (i, j, k) = pgrid.cell_of(particle.p);
            a.get(i, j, k) != CellType::Solid
        });
        self.pgrid.sort(&self.particles);

        if self.params.verbose {
            log::info!(
                "initialized with {} particles, max_density {:.4}",
                self.particles.len(),
                self.max_density
            );
        }
    }

    /// Advance one frame. Numerical trouble is logged, never fatal; the
    /// export flags forward to the scene when any is set.
    pub fn step(&mut self, save_vdb: bool, save_obj: bool, save_partio: bool) {
        self.frame += 1;
        if self.params.verbose {
            log::info!("simulating step {}", self.frame);
        }

        self.scene.build_level_sets(self.frame);
        self.scene
            .generate_particles(&mut self.particles, self.params.density, self.frame);
        if self.particles.len() > self.params.max_particles {
            log::warn!(
                "particle cap {} exceeded; dropping {} newly emitted particles",
                self.params.max_particles,
                self.particles.len() - self.params.max_particles
            );
            self.particles.list.truncate(self.params.max_particles);
        }

        self.pgrid.sort(&self.particles);
        self.compute_density();
        self.apply_external_forces();
        transfer::splat_particles_to_mac(&self.pgrid, &self.particles, &mut self.mgrid);
        self.pgrid.mark_cell_types(
            &self.particles,
            &mut self.mgrid.a,
            self.scene.solid_level_set(),
        );
        self.mgrid.store_previous(&mut self.mgrid_prev);
        self.mgrid.enforce_boundary_velocity();
        self.project();
        self.mgrid.enforce_boundary_velocity();
        self.mgrid.extrapolate_velocity();
        self.mgrid.subtract_previous(&mut self.mgrid_prev);
        transfer::blend_pic_flip(
            &mut self.particles,
            &self.mgrid,
            &self.mgrid_prev,
            self.params.picflip_ratio,
        );
        advection::advect_particles(
            &mut self.particles,
            &mut self.pgrid,
            &self.mgrid,
            self.dims,
            self.params.stepsize,
            self.params.density,
        );
        resample::resample_particles(
            &self.pgrid,
            &mut self.particles,
            &self.mgrid,
            &self.params,
            self.frame,
        );
        self.mark_invalid_particles();
        self.particles.cull_temporary();
        self.recover_stuck_particles();

        if save_vdb || save_obj || save_partio {
            self.scene.export_particles(
                &self.particles,
                self.maxd,
                self.frame,
                save_vdb,
                save_obj,
                save_partio,
            );
        }
    }

    /// Divergence, particle level set, pressure solve, gradient subtraction.
    fn project(&mut self) {
        pressure::compute_divergence(&mut self.mgrid);
        self.pgrid
            .build_sdf(&self.particles, &mut self.mgrid.l, self.params.density);
        let stats = pressure::solve_pressure(
            &mut self.mgrid,
            self.params.subcell,
            constants::SUBCELL_THETA_MIN,
            self.params.cg_tolerance,
            self.params.cg_max_iterations,
        );
        if !stats.converged {
            log::warn!(
                "pressure solve stopped after {} iterations at relative residual {:.3e}",
                stats.iterations,
                stats.relative_residual
            );
        } else if self.params.verbose {
            log::debug!("pressure solve converged in {} iterations", stats.iterations);
        }
        pressure::subtract_pressure_gradient(
            &mut self.mgrid,
            self.params.subcell,
            constants::SUBCELL_THETA_MIN,
        );
        let scrubbed = self.mgrid.scrub_non_finite();
        if scrubbed > 0 {
            log::warn!("zeroed {scrubbed} non-finite faces after projection");
        }
    }

    /// Kernel-weighted neighborhood density per particle, normalized by the
    /// calibrated packing density. Solid markers count as fully dense.
    fn compute_density(&mut self) {
        let radius = 4.0 * self.params.density / self.maxd;
        let max_density = self.max_density;
        let pgrid = &self.pgrid;
        let list = &self.particles.list;

        let densities: Vec<f32> = list
            .par_iter()
            .map(|particle| {
                if particle.kind == ParticleKind::Solid {
                    return 1.0;
                }
                let cell = pgrid.cell_of(particle.p);
                let mut weight = 0.0f32;
                for idx in pgrid.cell_neighbors(cell, 1) {
                    let neighbor = &list[idx as usize];
                    if neighbor.kind == ParticleKind::Solid {
                        continue;
                    }
                    let r2 = (neighbor.p - particle.p).length_squared();
                    weight += neighbor.mass * kernels::smooth(r2, radius);
                }
                weight / max_density
            })
            .collect();

        for (particle, density) in self.particles.list.iter_mut().zip(densities) {
            particle.density = density;
        }
    }

    fn apply_external_forces(&mut self) {
        let impulse = self.params.gravity * self.params.stepsize;
        self.particles.list.par_iter_mut().for_each(|particle| {
            if particle.kind == ParticleKind::Fluid {
                particle.u += impulse;
            }
        });
    }

    /// Flag particles that left the domain or sit inside a solid cell.
    fn mark_invalid_particles(&mut self) {
        let extent = self.dims.as_vec3();
        let maxd = self.maxd;
        let a = &self.mgrid.a;
        let pgrid = &self.pgrid;
        self.particles.list.par_iter_mut().for_each(|particle| {
            particle.invalid = false;
            let g = particle.p * maxd;
            if g.x < 0.0
                || g.y < 0.0
                || g.z < 0.0
                || g.x > extent.x
                || g.y > extent.y
                || g.z > extent.z
            {
                particle.invalid = true;
            }
            let (i, j, k) = pgrid.cell_of(particle.p);
            if a.get(i, j, k) == CellType::Solid {
                particle.invalid = true;
            }
        });
    }

    /// Ask the scene to project stuck fluid particles to the nearest solid
    /// surface and kick them along the recovery direction.
    fn recover_stuck_particles(&mut self) {
        let maxd = self.maxd;
        let mut stuck_indices = Vec::new();
        let mut stuck_points = Vec::new();
        for (idx, particle) in self.particles.list.iter().enumerate() {
            if particle.invalid && particle.kind == ParticleKind::Fluid {
                stuck_indices.push(idx);
                stuck_points.push(particle.p * maxd);
            }
        }
        if stuck_points.is_empty() {
            return;
        }

        self.scene.project_points_to_solid_surface(&mut stuck_points);

        for (&idx, &point) in stuck_indices.iter().zip(stuck_points.iter()) {
            let particle = &mut self.particles.list[idx];
            let old = particle.p * maxd;
            let recovery = point - old;
            if recovery.length() > 1e-4 {
                particle.p = point / maxd;
                particle.u = recovery * self.params.wall_penalty;
            }
        }
    }

    pub fn particles(&self) -> &Particles {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut Particles {
        &mut self.particles
    }

    pub fn dimensions(&self) -> UVec3 {
        self.dims
    }

    pub fn params(&self) -> &FlipParams {
        &self.params
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn mac(&self) -> &MacGrid {
        &self.mgrid
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn max_density(&self) -> f32 {
        self.max_density
    }

    /// Whether the scene's level sets place liquid (and no solid) at a cell.
    pub fn is_cell_fluid(&self, i: usize, j: usize, k: usize) -> bool {
        self.scene.liquid_level_set().get(i, j, k) < 0.0
            && self.scene.solid_level_set().get(i, j, k) >= 0.0
    }
}
