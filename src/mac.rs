//! Staggered MAC grid bundle.
//!
//! Velocity components live on cell faces:
//! - `u_x` on YZ faces, extent (X+1, Y, Z)
//! - `u_y` on XZ faces, extent (X, Y+1, Z)
//! - `u_z` on XY faces, extent (X, Y, Z+1)
//!
//! Cell type, pressure, divergence, and the liquid level set live at cell
//! centers. A second bundle mirrors the face grids so the FLIP velocity
//! delta can be formed after projection.

use glam::{UVec3, Vec3};
use rayon::prelude::*;

use crate::grid::{CellType, Grid3};

#[derive(Clone)]
pub struct MacGrid {
    dims: UVec3,
    maxd: f32,
    /// X-velocity on YZ faces
    pub u_x: Grid3<f32>,
    /// Y-velocity on XZ faces
    pub u_y: Grid3<f32>,
    /// Z-velocity on XY faces
    pub u_z: Grid3<f32>,
    /// Cell classification
    pub a: Grid3<CellType>,
    /// Pressure
    pub p: Grid3<f32>,
    /// Velocity divergence
    pub d: Grid3<f32>,
    /// Liquid level set (negative inside the liquid)
    pub l: Grid3<f32>,
}

/// Face-velocity mirror; after `subtract_previous` it holds the per-face
/// velocity change the projection introduced.
#[derive(Clone)]
pub struct PrevGrid {
    maxd: f32,
    pub u_x: Grid3<f32>,
    pub u_y: Grid3<f32>,
    pub u_z: Grid3<f32>,
}

/// Trilinear read of one staggered component. Coordinates are already in
/// that component's face-index space; reads clamp at the extents.
pub(crate) fn sample_face(grid: &Grid3<f32>, x: f32, y: f32, z: f32) -> f32 {
    let i0 = x.floor() as i32;
    let j0 = y.floor() as i32;
    let k0 = z.floor() as i32;
    let tx = x - i0 as f32;
    let ty = y - j0 as f32;
    let tz = z - k0 as f32;

    let mut value = 0.0;
    for dk in 0..2 {
        for dj in 0..2 {
            for di in 0..2 {
                let w = (if di == 0 { 1.0 - tx } else { tx })
                    * (if dj == 0 { 1.0 - ty } else { ty })
                    * (if dk == 0 { 1.0 - tz } else { tz });
                value += w * grid.get_signed(i0 + di, j0 + dj, k0 + dk);
            }
        }
    }
    value
}

/// Component-wise staggered interpolation of a face-grid triple at a
/// normalized position.
pub(crate) fn sample_staggered(
    u_x: &Grid3<f32>,
    u_y: &Grid3<f32>,
    u_z: &Grid3<f32>,
    maxd: f32,
    p: Vec3,
) -> Vec3 {
    let g = p * maxd;
    Vec3::new(
        sample_face(u_x, g.x, g.y - 0.5, g.z - 0.5),
        sample_face(u_y, g.x - 0.5, g.y, g.z - 0.5),
        sample_face(u_z, g.x - 0.5, g.y - 0.5, g.z),
    )
}

impl MacGrid {
    pub fn new(dims: UVec3) -> Self {
        let (x, y, z) = (dims.x as usize, dims.y as usize, dims.z as usize);
        Self {
            dims,
            maxd: dims.x.max(dims.y).max(dims.z) as f32,
            u_x: Grid3::new(x + 1, y, z, 0.0),
            u_y: Grid3::new(x, y + 1, z, 0.0),
            u_z: Grid3::new(x, y, z + 1, 0.0),
            a: Grid3::new(x, y, z, CellType::Air),
            p: Grid3::new(x, y, z, 0.0),
            d: Grid3::new(x, y, z, 0.0),
            l: Grid3::new(x, y, z, 1.0),
        }
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn maxd(&self) -> f32 {
        self.maxd
    }

    /// Cell width in normalized units.
    pub fn h(&self) -> f32 {
        1.0 / self.maxd
    }

    /// Velocity at a normalized position.
    pub fn sample_velocity(&self, p: Vec3) -> Vec3 {
        sample_staggered(&self.u_x, &self.u_y, &self.u_z, self.maxd, p)
    }

    /// Zero every face on the domain boundary and every face whose
    /// along-axis neighbor cell is solid. The forced-solid shell makes this
    /// a no-slip condition on the outer walls as well.
    pub fn enforce_boundary_velocity(&mut self) {
        let (x, y, z) = (
            self.dims.x as usize,
            self.dims.y as usize,
            self.dims.z as usize,
        );
        let a = &self.a;

        self.u_x
            .data_mut()
            .par_chunks_mut((x + 1) * y)
            .enumerate()
            .for_each(|(k, slab)| {
                for j in 0..y {
                    for i in 0..=x {
                        let solid = i == 0
                            || i == x
                            || a.get(i - 1, j, k) == CellType::Solid
                            || a.get(i, j, k) == CellType::Solid;
                        if solid {
                            slab[i + (x + 1) * j] = 0.0;
                        }
                    }
                }
            });

        self.u_y
            .data_mut()
            .par_chunks_mut(x * (y + 1))
            .enumerate()
            .for_each(|(k, slab)| {
                for j in 0..=y {
                    for i in 0..x {
                        let solid = j == 0
                            || j == y
                            || a.get(i, j - 1, k) == CellType::Solid
                            || a.get(i, j, k) == CellType::Solid;
                        if solid {
                            slab[i + x * j] = 0.0;
                        }
                    }
                }
            });

        self.u_z
            .data_mut()
            .par_chunks_mut(x * y)
            .enumerate()
            .for_each(|(k, slab)| {
                for j in 0..y {
                    for i in 0..x {
                        let solid = k == 0
                            || k == z
                            || a.get(i, j, k - 1) == CellType::Solid
                            || a.get(i, j, k) == CellType::Solid;
                        if solid {
                            slab[i + x * j] = 0.0;
                        }
                    }
                }
            });
    }

    /// Deep-copy the face velocities into `prev`.
    pub fn store_previous(&self, prev: &mut PrevGrid) {
        prev.u_x.copy_from(&self.u_x);
        prev.u_y.copy_from(&self.u_y);
        prev.u_z.copy_from(&self.u_z);
    }

    /// Replace `prev` with the per-face delta `current - prev`.
    pub fn subtract_previous(&self, prev: &mut PrevGrid) {
        for (cur, old) in [
            (&self.u_x, &mut prev.u_x),
            (&self.u_y, &mut prev.u_y),
            (&self.u_z, &mut prev.u_z),
        ] {
            old.data_mut()
                .par_iter_mut()
                .zip(cur.data().par_iter())
                .for_each(|(o, c)| *o = c - *o);
        }
    }

    /// Extend face velocities one cell into the air band so interpolation
    /// near the free surface is defined. Faces touching a fluid cell are
    /// authoritative and untouched; faces walled in by solids are skipped;
    /// every other face takes the mean of its axis-aligned valid neighbors.
    /// The pass reads valid faces only, so a second invocation is a no-op.
    pub fn extrapolate_velocity(&mut self) {
        let (x, y, z) = (
            self.dims.x as usize,
            self.dims.y as usize,
            self.dims.z as usize,
        );
        let a = &self.a;

        // X faces: neighbors along the axis are cells (i-1) and (i).
        let valid_x = |i: usize, j: usize, k: usize| {
            (i > 0 && a.get(i - 1, j, k) == CellType::Fluid)
                || (i < x && a.get(i, j, k) == CellType::Fluid)
        };
        let wall_x = |i: usize, j: usize, k: usize| {
            (i == 0 || a.get(i - 1, j, k) == CellType::Solid)
                && (i == x || a.get(i, j, k) == CellType::Solid)
        };
        let valid_y = |i: usize, j: usize, k: usize| {
            (j > 0 && a.get(i, j - 1, k) == CellType::Fluid)
                || (j < y && a.get(i, j, k) == CellType::Fluid)
        };
        let wall_y = |i: usize, j: usize, k: usize| {
            (j == 0 || a.get(i, j - 1, k) == CellType::Solid)
                && (j == y || a.get(i, j, k) == CellType::Solid)
        };
        let valid_z = |i: usize, j: usize, k: usize| {
            (k > 0 && a.get(i, j, k - 1) == CellType::Fluid)
                || (k < z && a.get(i, j, k) == CellType::Fluid)
        };
        let wall_z = |i: usize, j: usize, k: usize| {
            (k == 0 || a.get(i, j, k - 1) == CellType::Solid)
                && (k == z || a.get(i, j, k) == CellType::Solid)
        };

        extrapolate_component(&mut self.u_x, &valid_x, &wall_x);
        extrapolate_component(&mut self.u_y, &valid_y, &wall_y);
        extrapolate_component(&mut self.u_z, &valid_z, &wall_z);
    }

    /// Zero non-finite faces, returning how many were found.
    pub fn scrub_non_finite(&mut self) -> usize {
        let mut count = 0;
        for grid in [&mut self.u_x, &mut self.u_y, &mut self.u_z] {
            for v in grid.data_mut() {
                if !v.is_finite() {
                    *v = 0.0;
                    count += 1;
                }
            }
        }
        count
    }
}

impl PrevGrid {
    pub fn new(dims: UVec3) -> Self {
        let (x, y, z) = (dims.x as usize, dims.y as usize, dims.z as usize);
        Self {
            maxd: dims.x.max(dims.y).max(dims.z) as f32,
            u_x: Grid3::new(x + 1, y, z, 0.0),
            u_y: Grid3::new(x, y + 1, z, 0.0),
            u_z: Grid3::new(x, y, z + 1, 0.0),
        }
    }

    /// Velocity (or, after `subtract_previous`, velocity delta) at a
    /// normalized position.
    pub fn sample_velocity(&self, p: Vec3) -> Vec3 {
        sample_staggered(&self.u_x, &self.u_y, &self.u_z, self.maxd, p)
    }
}

/// One extrapolation sweep over a face grid. New values are computed from
/// valid faces only, into a fresh buffer, then written back; valid and
/// walled faces keep their current values.
fn extrapolate_component(
    grid: &mut Grid3<f32>,
    valid: &(dyn Fn(usize, usize, usize) -> bool + Sync),
    wall: &(dyn Fn(usize, usize, usize) -> bool + Sync),
) {
    let (nx, ny, nz) = (grid.nx(), grid.ny(), grid.nz());
    let current: &Grid3<f32> = grid;

    let updated: Vec<f32> = (0..nx * ny * nz)
        .into_par_iter()
        .map(|idx| {
            let i = idx % nx;
            let j = (idx / nx) % ny;
            let k = idx / (nx * ny);
            let value = current.get(i, j, k);

            if valid(i, j, k) || wall(i, j, k) {
                return value;
            }

            let neighbors = [
                (i as i32 - 1, j as i32, k as i32),
                (i as i32 + 1, j as i32, k as i32),
                (i as i32, j as i32 - 1, k as i32),
                (i as i32, j as i32 + 1, k as i32),
                (i as i32, j as i32, k as i32 - 1),
                (i as i32, j as i32, k as i32 + 1),
            ];
            let mut sum = 0.0;
            let mut weight = 0u32;
            for (ni, nj, nk) in neighbors {
                if !current.in_bounds(ni, nj, nk) {
                    continue;
                }
                let (ni, nj, nk) = (ni as usize, nj as usize, nk as usize);
                if valid(ni, nj, nk) {
                    sum += current.get(ni, nj, nk);
                    weight += 1;
                }
            }
            if weight > 0 {
                sum / weight as f32
            } else {
                value
            }
        })
        .collect();

    grid.data_mut().copy_from_slice(&updated);
}
