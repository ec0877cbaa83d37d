//! Scene collaborators: level sets, particle emission, stuck-particle
//! projection, and the export seam.
//!
//! The simulator drives a [`Scene`] but never owns its geometry; anything
//! that can produce liquid/solid signed-distance grids and emit marker
//! particles can act as one. [`GeometryScene`] builds scenes from
//! axis-aligned boxes, which covers containers, columns, dam breaks, and
//! inflow jets.

use glam::{UVec3, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::grid::Grid3;
use crate::particle::Particles;

/// External supplier of level sets, emission, and persistence.
///
/// `project_points_to_solid_surface` works on positions in grid units
/// (cells), matching the units the stuck-particle recovery uses.
pub trait Scene {
    /// (Re)build the liquid and solid signed-distance grids for a frame.
    fn build_level_sets(&mut self, frame: u32);

    /// Liquid signed distance at cell centers; negative inside the liquid.
    fn liquid_level_set(&self) -> &Grid3<f32>;

    /// Solid signed distance at cell centers; negative inside obstacles.
    fn solid_level_set(&self) -> &Grid3<f32>;

    /// Append particles emitted this frame.
    fn generate_particles(&mut self, particles: &mut Particles, density: f32, frame: u32);

    /// Move each point (grid units) to the nearest solid surface point.
    fn project_points_to_solid_surface(&self, points: &mut [Vec3]);

    /// Persistence sink; formats are the scene's business.
    fn export_particles(
        &mut self,
        particles: &Particles,
        maxd: f32,
        frame: u32,
        vdb: bool,
        obj: bool,
        partio: bool,
    );
}

/// Axis-aligned box in normalized coordinates.
#[derive(Clone, Copy, Debug)]
pub struct AabbRegion {
    pub min: Vec3,
    pub max: Vec3,
}

impl AabbRegion {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Exact signed distance to the box surface; negative inside.
    pub fn sdf(&self, p: Vec3) -> f32 {
        let center = (self.min + self.max) * 0.5;
        let half = (self.max - self.min) * 0.5;
        let q = (p - center).abs() - half;
        let outside = q.max(Vec3::ZERO).length();
        let inside = q.x.max(q.y).max(q.z).min(0.0);
        outside + inside
    }

    pub fn contains(&self, p: Vec3) -> bool {
        self.sdf(p) < 0.0
    }
}

/// Box or sphere primitive a scene is assembled from.
#[derive(Clone, Copy, Debug)]
pub enum SceneRegion {
    Box(AabbRegion),
    Sphere { center: Vec3, radius: f32 },
}

impl SceneRegion {
    pub fn sdf(&self, p: Vec3) -> f32 {
        match self {
            SceneRegion::Box(region) => region.sdf(p),
            SceneRegion::Sphere { center, radius } => (p - *center).length() - radius,
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        self.sdf(p) < 0.0
    }
}

/// Per-frame fluid source.
#[derive(Clone, Copy, Debug)]
pub struct Inflow {
    pub region: AabbRegion,
    pub velocity: Vec3,
}

/// Scene assembled from axis-aligned boxes and spheres plus optional
/// per-frame inflows.
pub struct GeometryScene {
    dims: UVec3,
    maxd: f32,
    liquid_regions: Vec<SceneRegion>,
    solid_regions: Vec<SceneRegion>,
    inflows: Vec<Inflow>,
    liquid_sdf: Grid3<f32>,
    solid_sdf: Grid3<f32>,
    export_calls: u32,
}

/// Distance reported where no region exists at all.
const FAR: f32 = 1.0;

impl GeometryScene {
    pub fn new(dims: UVec3) -> Self {
        Self {
            dims,
            maxd: dims.x.max(dims.y).max(dims.z) as f32,
            liquid_regions: Vec::new(),
            solid_regions: Vec::new(),
            inflows: Vec::new(),
            liquid_sdf: Grid3::cell_centered(dims, FAR),
            solid_sdf: Grid3::cell_centered(dims, FAR),
            export_calls: 0,
        }
    }

    /// Initial liquid volume (normalized coordinates).
    pub fn add_liquid_region(&mut self, min: Vec3, max: Vec3) -> &mut Self {
        self.liquid_regions
            .push(SceneRegion::Box(AabbRegion::new(min, max)));
        self
    }

    /// Initial spherical liquid volume.
    pub fn add_liquid_sphere(&mut self, center: Vec3, radius: f32) -> &mut Self {
        self.liquid_regions.push(SceneRegion::Sphere { center, radius });
        self
    }

    /// Solid obstacle (normalized coordinates).
    pub fn add_solid_region(&mut self, min: Vec3, max: Vec3) -> &mut Self {
        self.solid_regions
            .push(SceneRegion::Box(AabbRegion::new(min, max)));
        self
    }

    /// Spherical solid obstacle.
    pub fn add_solid_sphere(&mut self, center: Vec3, radius: f32) -> &mut Self {
        self.solid_regions.push(SceneRegion::Sphere { center, radius });
        self
    }

    /// Fluid source emitting every frame with the given velocity.
    pub fn add_inflow(&mut self, min: Vec3, max: Vec3, velocity: Vec3) -> &mut Self {
        self.inflows.push(Inflow {
            region: AabbRegion::new(min, max),
            velocity,
        });
        self
    }

    pub fn export_calls(&self) -> u32 {
        self.export_calls
    }

    fn liquid_distance(&self, p: Vec3) -> f32 {
        self.liquid_regions
            .iter()
            .fold(FAR, |acc, region| acc.min(region.sdf(p)))
    }

    fn solid_distance(&self, p: Vec3) -> f32 {
        self.solid_regions
            .iter()
            .fold(FAR, |acc, region| acc.min(region.sdf(p)))
    }

    /// Outward solid-surface normal by central differences.
    fn solid_normal(&self, p: Vec3) -> Vec3 {
        let eps = 0.1 / self.maxd;
        let grad = Vec3::new(
            self.solid_distance(p + Vec3::X * eps) - self.solid_distance(p - Vec3::X * eps),
            self.solid_distance(p + Vec3::Y * eps) - self.solid_distance(p - Vec3::Y * eps),
            self.solid_distance(p + Vec3::Z * eps) - self.solid_distance(p - Vec3::Z * eps),
        );
        let len = grad.length();
        if len > 1e-6 {
            grad / len
        } else {
            Vec3::Y
        }
    }

    /// Visit every lattice site of the emission grid (spacing
    /// `density / maxd` over the cell extent of the domain).
    fn for_each_lattice_site(&self, density: f32, mut visit: impl FnMut(Vec3)) {
        let per_axis = (1.0 / density).round().max(1.0) as u32;
        let spacing = 1.0 / (self.maxd * per_axis as f32);
        let steps = self.dims * per_axis;
        for k in 0..steps.z {
            for j in 0..steps.y {
                for i in 0..steps.x {
                    visit(Vec3::new(
                        (i as f32 + 0.5) * spacing,
                        (j as f32 + 0.5) * spacing,
                        (k as f32 + 0.5) * spacing,
                    ));
                }
            }
        }
    }
}

impl Scene for GeometryScene {
    fn build_level_sets(&mut self, _frame: u32) {
        let (nx, ny, nz) = (
            self.dims.x as usize,
            self.dims.y as usize,
            self.dims.z as usize,
        );
        let h = 1.0 / self.maxd;
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let center = Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32 + 0.5) * h;
                    self.liquid_sdf.set(i, j, k, self.liquid_distance(center));
                    self.solid_sdf.set(i, j, k, self.solid_distance(center));
                }
            }
        }
    }

    fn liquid_level_set(&self) -> &Grid3<f32> {
        &self.liquid_sdf
    }

    fn solid_level_set(&self) -> &Grid3<f32> {
        &self.solid_sdf
    }

    fn generate_particles(&mut self, particles: &mut Particles, density: f32, frame: u32) {
        if frame == 0 {
            // Initial liquid fill: a deterministic lattice keeps symmetric
            // scenes exactly symmetric.
            self.for_each_lattice_site(density, |p| {
                if self.liquid_distance(p) < 0.0 && self.solid_distance(p) > 0.0 {
                    particles.spawn_fluid(p);
                }
            });

            // Solid markers in the surface band, carrying outward normals
            // for the wall response.
            let band = 2.0 / self.maxd;
            let mut solids = Vec::new();
            self.for_each_lattice_site(density, |p| {
                let d = self.solid_distance(p);
                if d < 0.0 && d > -band {
                    solids.push(p);
                }
            });
            for p in solids {
                let n = self.solid_normal(p);
                particles.spawn_solid(p, n);
            }
        }

        if !self.inflows.is_empty() {
            let mut rng = ChaCha8Rng::seed_from_u64(frame as u64);
            let h = 1.0 / self.maxd;
            let inflows = self.inflows.clone();
            for inflow in &inflows {
                self.for_each_lattice_site(density, |p| {
                    if !inflow.region.contains(p) || self.solid_distance(p) <= 0.0 {
                        return;
                    }
                    let jitter = Vec3::new(
                        rng.gen::<f32>() - 0.5,
                        rng.gen::<f32>() - 0.5,
                        rng.gen::<f32>() - 0.5,
                    ) * (0.1 * h);
                    particles.spawn_fluid_with_velocity(p + jitter, inflow.velocity);
                });
            }
        }
    }

    fn project_points_to_solid_surface(&self, points: &mut [Vec3]) {
        for point in points.iter_mut() {
            let mut p = *point / self.maxd;
            for _ in 0..3 {
                let d = self.solid_distance(p);
                if d >= 0.0 {
                    break;
                }
                p += self.solid_normal(p) * (-d + 1e-4);
            }
            *point = p * self.maxd;
        }
    }

    fn export_particles(
        &mut self,
        particles: &Particles,
        _maxd: f32,
        frame: u32,
        vdb: bool,
        obj: bool,
        partio: bool,
    ) {
        self.export_calls += 1;
        log::debug!(
            "export frame {}: {} particles (vdb={} obj={} partio={})",
            frame,
            particles.len(),
            vdb,
            obj,
            partio
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_sdf_signs() {
        let region = AabbRegion::new(Vec3::splat(0.25), Vec3::splat(0.75));
        assert!(region.sdf(Vec3::splat(0.5)) < 0.0);
        assert!(region.sdf(Vec3::splat(0.9)) > 0.0);
        assert!(region.sdf(Vec3::new(0.5, 0.75, 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_level_sets_rasterized() {
        let mut scene = GeometryScene::new(UVec3::new(8, 8, 8));
        scene.add_liquid_region(Vec3::ZERO, Vec3::new(1.0, 0.5, 1.0));
        scene.add_solid_region(Vec3::new(0.4, 0.6, 0.4), Vec3::new(0.6, 0.8, 0.6));
        scene.build_level_sets(0);

        assert!(scene.liquid_level_set().get(4, 1, 4) < 0.0);
        assert!(scene.liquid_level_set().get(4, 6, 4) > 0.0);
        assert!(scene.solid_level_set().get(4, 5, 4) < 0.0);
        assert!(scene.solid_level_set().get(1, 1, 1) > 0.0);
    }

    #[test]
    fn test_emission_fills_liquid_only() {
        let mut scene = GeometryScene::new(UVec3::new(8, 8, 8));
        scene.add_liquid_region(Vec3::ZERO, Vec3::new(1.0, 0.5, 1.0));
        scene.build_level_sets(0);

        let mut particles = Particles::new();
        scene.generate_particles(&mut particles, 0.5, 0);

        // Half the domain at 8 per cell: 8*8*4 cells * 8 particles.
        assert_eq!(particles.len(), 8 * 8 * 4 * 8);
        assert!(particles.list.iter().all(|p| p.p.y < 0.5));
    }

    #[test]
    fn test_no_emission_after_frame_zero_without_inflow() {
        let mut scene = GeometryScene::new(UVec3::new(8, 8, 8));
        scene.add_liquid_region(Vec3::ZERO, Vec3::new(1.0, 0.5, 1.0));
        scene.build_level_sets(0);

        let mut particles = Particles::new();
        scene.generate_particles(&mut particles, 0.5, 1);
        assert!(particles.is_empty());
    }

    #[test]
    fn test_solid_markers_carry_normals() {
        let mut scene = GeometryScene::new(UVec3::new(8, 8, 8));
        scene.add_solid_region(Vec3::new(0.25, 0.0, 0.25), Vec3::new(0.75, 0.25, 0.75));
        scene.build_level_sets(0);

        let mut particles = Particles::new();
        scene.generate_particles(&mut particles, 0.5, 0);

        assert!(!particles.is_empty());
        let top_marker = particles
            .list
            .iter()
            .find(|p| p.p.x > 0.4 && p.p.x < 0.6 && p.p.z > 0.4 && p.p.z < 0.6 && p.p.y > 0.2)
            .expect("marker near the top face");
        assert!(top_marker.n.y > 0.9, "normal {:?}", top_marker.n);
    }

    #[test]
    fn test_projection_moves_point_out_of_solid() {
        let mut scene = GeometryScene::new(UVec3::new(8, 8, 8));
        scene.add_solid_region(Vec3::new(0.25, 0.25, 0.25), Vec3::new(0.75, 0.75, 0.75));
        scene.build_level_sets(0);

        let mut points = [Vec3::splat(0.45) * 8.0];
        scene.project_points_to_solid_surface(&mut points);
        let projected = points[0] / 8.0;
        assert!(
            scene.solid_distance(projected) >= -1e-4,
            "still inside: {:?}",
            projected
        );
    }
}
