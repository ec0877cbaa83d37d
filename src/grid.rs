//! Dense 3D grids over a uniform axis-aligned domain.
//!
//! One generic grid type covers the scalar, cell-type, and indicator grids
//! the simulation needs. Reads outside the domain clamp to the nearest cell
//! and writes outside the domain are ignored, so hot loops never branch on
//! errors.

use glam::UVec3;

/// Cell classification for the pressure solve.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CellType {
    /// Solid obstacle (no flow)
    Solid,
    /// Contains fluid particles
    Fluid,
    /// Empty air
    #[default]
    Air,
}

/// Dense 3D grid with `i + nx*(j + ny*k)` storage.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid3<T> {
    nx: usize,
    ny: usize,
    nz: usize,
    data: Vec<T>,
}

impl<T: Copy> Grid3<T> {
    /// Create a grid of the given extent, filled with `value`.
    pub fn new(nx: usize, ny: usize, nz: usize, value: T) -> Self {
        Self {
            nx,
            ny,
            nz,
            data: vec![value; nx * ny * nz],
        }
    }

    /// Create a cell-centered grid matching `dims`.
    pub fn cell_centered(dims: UVec3, value: T) -> Self {
        Self::new(dims.x as usize, dims.y as usize, dims.z as usize, value)
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn nz(&self) -> usize {
        self.nz
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat index of `(i, j, k)`. Callers must pass in-range coordinates.
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.nx * (j + self.ny * k)
    }

    /// Clamped read: out-of-range coordinates snap to the nearest cell.
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> T {
        let i = i.min(self.nx - 1);
        let j = j.min(self.ny - 1);
        let k = k.min(self.nz - 1);
        self.data[self.index(i, j, k)]
    }

    /// Clamped read for signed coordinates.
    #[inline]
    pub fn get_signed(&self, i: i32, j: i32, k: i32) -> T {
        let i = i.clamp(0, self.nx as i32 - 1) as usize;
        let j = j.clamp(0, self.ny as i32 - 1) as usize;
        let k = k.clamp(0, self.nz as i32 - 1) as usize;
        self.data[self.index(i, j, k)]
    }

    /// Write `value` at `(i, j, k)`; out-of-range writes are dropped.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: T) {
        if i < self.nx && j < self.ny && k < self.nz {
            let idx = self.index(i, j, k);
            self.data[idx] = value;
        }
    }

    #[inline]
    pub fn in_bounds(&self, i: i32, j: i32, k: i32) -> bool {
        i >= 0
            && i < self.nx as i32
            && j >= 0
            && j < self.ny as i32
            && k >= 0
            && k < self.nz as i32
    }

    /// Fill the whole grid with `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Copy the contents of a same-shaped grid.
    pub fn copy_from(&mut self, other: &Grid3<T>) {
        debug_assert_eq!(self.data.len(), other.data.len());
        self.data.copy_from_slice(&other.data);
    }
}
