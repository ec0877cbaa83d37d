//! Per-cell particle population maintenance.
//!
//! Keeps fluid cells near the per-cell count the emission spacing implies:
//! badly over-packed cells flag their surplus for the end-of-step cull, and
//! under-populated cells well inside the liquid get refills with velocities
//! sampled from the grid. Inserts stop at the global particle cap.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::grid::CellType;
use crate::mac::MacGrid;
use crate::params::FlipParams;
use crate::particle::{Particle, ParticleKind, Particles};
use crate::particlegrid::ParticleGrid;

/// Cull factor: cells above `CULL_FACTOR * target` shed the surplus.
const CULL_FACTOR: usize = 3;

pub fn resample_particles(
    pgrid: &ParticleGrid,
    particles: &mut Particles,
    mgrid: &MacGrid,
    params: &FlipParams,
    frame: u32,
) {
    let dims = pgrid.dims();
    let maxd = dims.x.max(dims.y).max(dims.z) as f32;
    let h = 1.0 / maxd;

    let per_axis = (1.0 / params.density).round().max(1.0) as usize;
    let target = per_axis * per_axis * per_axis;
    let cull_above = CULL_FACTOR * target;
    let refill_below = target / 2;

    let mut rng = ChaCha8Rng::seed_from_u64(frame as u64);
    let mut inserts: Vec<Particle> = Vec::new();
    let mut capped = false;

    for k in 0..dims.z as usize {
        for j in 0..dims.y as usize {
            for i in 0..dims.x as usize {
                if mgrid.a.get(i, j, k) != CellType::Fluid {
                    continue;
                }

                let bucket = pgrid.cell_particles(i, j, k);
                let fluid_count = bucket
                    .iter()
                    .filter(|&&idx| {
                        let p = &particles.list[idx as usize];
                        p.kind == ParticleKind::Fluid && !p.temp
                    })
                    .count();

                if fluid_count > cull_above {
                    let mut kept = 0;
                    for &idx in bucket {
                        let particle = &mut particles.list[idx as usize];
                        if particle.kind != ParticleKind::Fluid || particle.temp {
                            continue;
                        }
                        kept += 1;
                        if kept > cull_above {
                            particle.temp = true;
                        }
                    }
                    continue;
                }

                // Refill only cells fully surrounded by fluid so the free
                // surface is not seeded from the air side.
                let fluid_at = |di: i32, dj: i32, dk: i32| {
                    let (ni, nj, nk) = (i as i32 + di, j as i32 + dj, k as i32 + dk);
                    mgrid.a.in_bounds(ni, nj, nk)
                        && mgrid.a.get_signed(ni, nj, nk) == CellType::Fluid
                };
                let interior = fluid_at(1, 0, 0)
                    && fluid_at(-1, 0, 0)
                    && fluid_at(0, 1, 0)
                    && fluid_at(0, -1, 0)
                    && fluid_at(0, 0, 1)
                    && fluid_at(0, 0, -1);
                if interior && fluid_count < refill_below {
                    let missing = target - fluid_count;
                    if particles.len() + inserts.len() + missing > params.max_particles {
                        capped = true;
                        continue;
                    }
                    for _ in 0..missing {
                        let p = Vec3::new(
                            (i as f32 + rng.gen::<f32>()) * h,
                            (j as f32 + rng.gen::<f32>()) * h,
                            (k as f32 + rng.gen::<f32>()) * h,
                        );
                        let u = mgrid.sample_velocity(p);
                        inserts.push(Particle::fluid_with_velocity(p, u));
                    }
                }
            }
        }
    }

    if capped {
        log::warn!(
            "particle cap {} reached; skipping resampler inserts",
            params.max_particles
        );
    }
    particles.list.extend(inserts);
}
