//! Cell-bucket spatial index over the particle set.
//!
//! Buckets are rebuilt with [`ParticleGrid::sort`] whenever particle
//! positions change materially; every neighbor query between sorts reads the
//! same immutable buckets, which keeps the query side lock-free.

use glam::UVec3;
use rayon::prelude::*;

use crate::grid::{CellType, Grid3};
use crate::particle::{ParticleKind, Particles};

pub struct ParticleGrid {
    dims: UVec3,
    maxd: f32,
    buckets: Vec<Vec<u32>>,
}

impl ParticleGrid {
    pub fn new(dims: UVec3) -> Self {
        let cells = (dims.x * dims.y * dims.z) as usize;
        Self {
            dims,
            maxd: dims.x.max(dims.y).max(dims.z) as f32,
            buckets: vec![Vec::new(); cells],
        }
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    #[inline]
    fn bucket_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims.x as usize * (j + self.dims.y as usize * k)
    }

    /// Cell containing a normalized position, clamped into the domain.
    #[inline]
    pub fn cell_of(&self, p: glam::Vec3) -> (usize, usize, usize) {
        let g = p * self.maxd;
        (
            (g.x as i32).clamp(0, self.dims.x as i32 - 1) as usize,
            (g.y as i32).clamp(0, self.dims.y as i32 - 1) as usize,
            (g.z as i32).clamp(0, self.dims.z as i32 - 1) as usize,
        )
    }

    /// Rebuild every bucket from current particle positions. O(N).
    pub fn sort(&mut self, particles: &Particles) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        for (idx, particle) in particles.list.iter().enumerate() {
            let (i, j, k) = self.cell_of(particle.p);
            let cell = self.bucket_index(i, j, k);
            self.buckets[cell].push(idx as u32);
        }
    }

    /// Particle indices bucketed in one cell.
    pub fn cell_particles(&self, i: usize, j: usize, k: usize) -> &[u32] {
        &self.buckets[self.bucket_index(i, j, k)]
    }

    /// Particle indices in the cubic neighborhood `center ± radius`, clamped
    /// to the domain.
    pub fn cell_neighbors(
        &self,
        center: (usize, usize, usize),
        radius: usize,
    ) -> impl Iterator<Item = u32> + '_ {
        let r = radius as i32;
        let lo_i = (center.0 as i32 - r).max(0) as usize;
        let hi_i = ((center.0 as i32 + r).min(self.dims.x as i32 - 1)) as usize;
        let lo_j = (center.1 as i32 - r).max(0) as usize;
        let hi_j = ((center.1 as i32 + r).min(self.dims.y as i32 - 1)) as usize;
        let lo_k = (center.2 as i32 - r).max(0) as usize;
        let hi_k = ((center.2 as i32 + r).min(self.dims.z as i32 - 1)) as usize;

        (lo_k..=hi_k).flat_map(move |k| {
            (lo_j..=hi_j).flat_map(move |j| {
                (lo_i..=hi_i)
                    .flat_map(move |i| self.buckets[self.bucket_index(i, j, k)].iter().copied())
            })
        })
    }

    /// Classify every cell: the domain shell and cells inside the solid
    /// level set are Solid, cells holding at least one fluid particle are
    /// Fluid, the rest Air.
    pub fn mark_cell_types(
        &self,
        particles: &Particles,
        a: &mut Grid3<CellType>,
        solid_sdf: &Grid3<f32>,
    ) {
        let (nx, ny, nz) = (
            self.dims.x as usize,
            self.dims.y as usize,
            self.dims.z as usize,
        );

        let plane = nx * ny;
        a.data_mut()
            .par_chunks_mut(plane)
            .enumerate()
            .for_each(|(k, slab)| {
                for j in 0..ny {
                    for i in 0..nx {
                        let shell = i == 0
                            || i == nx - 1
                            || j == 0
                            || j == ny - 1
                            || k == 0
                            || k == nz - 1;
                        slab[i + nx * j] = if shell || solid_sdf.get(i, j, k) < 0.0 {
                            CellType::Solid
                        } else {
                            CellType::Air
                        };
                    }
                }
            });

        for particle in &particles.list {
            if particle.kind != ParticleKind::Fluid {
                continue;
            }
            let (i, j, k) = self.cell_of(particle.p);
            if a.get(i, j, k) != CellType::Solid {
                a.set(i, j, k, CellType::Fluid);
            }
        }
    }

    /// Build the liquid level set from fluid particles: per cell, the
    /// minimum over nearby fluid particles of `|x_cell - x_p| - r`, where
    /// `r` is half the per-cell linear particle count in cells (one cell at
    /// the default spacing). Cells with no fluid nearby stay far positive.
    pub fn build_sdf(&self, particles: &Particles, l: &mut Grid3<f32>, density: f32) {
        let (nx, ny) = (self.dims.x as usize, self.dims.y as usize);
        let h = 1.0 / self.maxd;
        let radius = 0.5 * h / density;
        let far = 1.0f32;

        let plane = nx * ny;
        l.data_mut()
            .par_chunks_mut(plane)
            .enumerate()
            .for_each(|(k, slab)| {
                for j in 0..ny {
                    for i in 0..nx {
                        let center =
                            glam::Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32 + 0.5) * h;
                        let mut phi = far;
                        for idx in self.cell_neighbors((i, j, k), 1) {
                            let particle = &particles.list[idx as usize];
                            if particle.kind != ParticleKind::Fluid {
                                continue;
                            }
                            let d = (center - particle.p).length() - radius;
                            phi = phi.min(d);
                        }
                        slab[i + nx * j] = phi;
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_sort_buckets_cover_all_particles() {
        let dims = UVec3::new(4, 4, 4);
        let mut pgrid = ParticleGrid::new(dims);
        let mut particles = Particles::new();
        particles.spawn_fluid(Vec3::new(0.1, 0.1, 0.1));
        particles.spawn_fluid(Vec3::new(0.1, 0.12, 0.1));
        particles.spawn_fluid(Vec3::new(0.9, 0.9, 0.9));
        pgrid.sort(&particles);

        let mut total = 0;
        for k in 0..4 {
            for j in 0..4 {
                for i in 0..4 {
                    total += pgrid.cell_particles(i, j, k).len();
                }
            }
        }
        assert_eq!(total, particles.len());
        assert_eq!(pgrid.cell_particles(0, 0, 0).len(), 2);
    }

    #[test]
    fn test_cell_of_clamps() {
        let pgrid = ParticleGrid::new(UVec3::new(4, 4, 4));
        assert_eq!(pgrid.cell_of(Vec3::new(1.5, -0.2, 0.5)), (3, 0, 2));
    }

    #[test]
    fn test_neighbors_clamped_at_corner() {
        let dims = UVec3::new(4, 4, 4);
        let mut pgrid = ParticleGrid::new(dims);
        let mut particles = Particles::new();
        particles.spawn_fluid(Vec3::new(0.05, 0.05, 0.05));
        particles.spawn_fluid(Vec3::new(0.95, 0.95, 0.95));
        pgrid.sort(&particles);

        let near_origin: Vec<u32> = pgrid.cell_neighbors((0, 0, 0), 1).collect();
        assert_eq!(near_origin, vec![0]);
    }

    #[test]
    fn test_mark_cell_types() {
        let dims = UVec3::new(5, 5, 5);
        let mut pgrid = ParticleGrid::new(dims);
        let mut particles = Particles::new();
        particles.spawn_fluid(Vec3::new(0.5, 0.5, 0.5));
        pgrid.sort(&particles);

        let mut a = Grid3::cell_centered(dims, CellType::Air);
        let solid_sdf = Grid3::cell_centered(dims, 1.0f32);
        pgrid.mark_cell_types(&particles, &mut a, &solid_sdf);

        assert_eq!(a.get(2, 2, 2), CellType::Fluid);
        assert_eq!(a.get(0, 2, 2), CellType::Solid);
        assert_eq!(a.get(4, 2, 2), CellType::Solid);
        assert_eq!(a.get(2, 1, 2), CellType::Air);
    }

    #[test]
    fn test_build_sdf_negative_in_fluid() {
        let dims = UVec3::new(5, 5, 5);
        let mut pgrid = ParticleGrid::new(dims);
        let mut particles = Particles::new();
        // Pack the center cell so its center sits within the particle radius.
        let h = 1.0 / 5.0;
        for dz in 0..2 {
            for dy in 0..2 {
                for dx in 0..2 {
                    particles.spawn_fluid(Vec3::new(
                        (2.25 + 0.5 * dx as f32) * h,
                        (2.25 + 0.5 * dy as f32) * h,
                        (2.25 + 0.5 * dz as f32) * h,
                    ));
                }
            }
        }
        pgrid.sort(&particles);

        let mut l = Grid3::cell_centered(dims, 0.0f32);
        pgrid.build_sdf(&particles, &mut l, 0.5);

        assert!(l.get(2, 2, 2) < 0.0, "center cell: {}", l.get(2, 2, 2));
        assert!(l.get(0, 0, 0) > 0.5, "far cell: {}", l.get(0, 0, 0));
    }
}
