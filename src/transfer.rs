//! Particle/grid transfer operators.
//!
//! Splat (P2G) runs as a per-face gather: every face pulls from the bucketed
//! particle grid instead of particles scattering into shared accumulators,
//! so the pass needs no locks and is order-independent. Gather (G2P) is the
//! matching staggered trilinear interpolation.

use glam::Vec3;
use rayon::prelude::*;

use crate::grid::Grid3;
use crate::kernels::tent_3d;
use crate::mac::{MacGrid, PrevGrid};
use crate::particle::{ParticleKind, Particles};
use crate::particlegrid::ParticleGrid;

/// Mass-weighted tent-kernel average of fluid-particle velocities at every
/// face. Faces with no particle support stay zero for extrapolation to fill.
pub fn splat_particles_to_mac(
    pgrid: &ParticleGrid,
    particles: &Particles,
    mgrid: &mut MacGrid,
) {
    let dims = mgrid.dims();
    let maxd = mgrid.maxd();
    let (x, y, z) = (dims.x as usize, dims.y as usize, dims.z as usize);

    // X faces at (i, j+1/2, k+1/2) in grid units.
    splat_component(
        &mut mgrid.u_x,
        pgrid,
        particles,
        maxd,
        |i, j, k| Vec3::new(i as f32, j as f32 + 0.5, k as f32 + 0.5),
        |i, j, k| (i.min(x - 1), j, k),
        |u| u.x,
    );
    // Y faces at (i+1/2, j, k+1/2).
    splat_component(
        &mut mgrid.u_y,
        pgrid,
        particles,
        maxd,
        |i, j, k| Vec3::new(i as f32 + 0.5, j as f32, k as f32 + 0.5),
        |i, j, k| (i, j.min(y - 1), k),
        |u| u.y,
    );
    // Z faces at (i+1/2, j+1/2, k).
    splat_component(
        &mut mgrid.u_z,
        pgrid,
        particles,
        maxd,
        |i, j, k| Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32),
        |i, j, k| (i, j, k.min(z - 1)),
        |u| u.z,
    );
}

fn splat_component(
    faces: &mut Grid3<f32>,
    pgrid: &ParticleGrid,
    particles: &Particles,
    maxd: f32,
    face_pos: impl Fn(usize, usize, usize) -> Vec3 + Sync,
    face_cell: impl Fn(usize, usize, usize) -> (usize, usize, usize) + Sync,
    component: impl Fn(Vec3) -> f32 + Sync,
) {
    let (nx, ny) = (faces.nx(), faces.ny());
    let plane = nx * ny;

    faces
        .data_mut()
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(k, slab)| {
            for j in 0..ny {
                for i in 0..nx {
                    let pos = face_pos(i, j, k);
                    let mut momentum = 0.0f32;
                    let mut mass = 0.0f32;
                    for idx in pgrid.cell_neighbors(face_cell(i, j, k), 1) {
                        let particle = &particles.list[idx as usize];
                        if particle.kind != ParticleKind::Fluid {
                            continue;
                        }
                        let w = particle.mass * tent_3d(particle.p * maxd - pos);
                        if w > 0.0 {
                            momentum += w * component(particle.u);
                            mass += w;
                        }
                    }
                    slab[i + nx * j] = if mass > 0.0 { momentum / mass } else { 0.0 };
                }
            }
        });
}

/// Overwrite every fluid particle's velocity with the interpolated grid
/// velocity (pure PIC transfer).
pub fn gather_velocity_to_particles(particles: &mut Particles, mgrid: &MacGrid) {
    particles.list.par_iter_mut().for_each(|particle| {
        if particle.kind == ParticleKind::Fluid {
            particle.u = mgrid.sample_velocity(particle.p);
        }
    });
}

/// PIC/FLIP blend. `prev` must hold the post-projection velocity delta; the
/// FLIP candidate (old velocity plus delta) lands in the scratch field `t`,
/// the PIC candidate is the straight grid sample, and the final velocity is
/// `(1 - ratio) * pic + ratio * flip`.
pub fn blend_pic_flip(
    particles: &mut Particles,
    mgrid: &MacGrid,
    prev: &PrevGrid,
    ratio: f32,
) {
    particles.list.par_iter_mut().for_each(|particle| {
        if particle.kind != ParticleKind::Fluid {
            return;
        }
        let flip = particle.u + prev.sample_velocity(particle.p);
        let pic = mgrid.sample_velocity(particle.p);
        particle.t = flip;
        particle.u = (1.0 - ratio) * pic + ratio * flip;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::UVec3;

    fn packed_particles(dims: UVec3, velocity: Vec3) -> (Particles, ParticleGrid) {
        let maxd = dims.x.max(dims.y).max(dims.z) as f32;
        let spacing = 0.5 / maxd;
        let mut particles = Particles::new();
        for k in 0..dims.z * 2 {
            for j in 0..dims.y * 2 {
                for i in 0..dims.x * 2 {
                    let p = Vec3::new(
                        (i as f32 + 0.5) * spacing,
                        (j as f32 + 0.5) * spacing,
                        (k as f32 + 0.5) * spacing,
                    );
                    particles.spawn_fluid_with_velocity(p, velocity);
                }
            }
        }
        let mut pgrid = ParticleGrid::new(dims);
        pgrid.sort(&particles);
        (particles, pgrid)
    }

    #[test]
    fn test_splat_uniform_velocity() {
        let dims = UVec3::new(6, 6, 6);
        let v = Vec3::new(1.0, -2.0, 0.5);
        let (particles, pgrid) = packed_particles(dims, v);
        let mut mgrid = MacGrid::new(dims);

        splat_particles_to_mac(&pgrid, &particles, &mut mgrid);

        // Interior faces reproduce the uniform velocity exactly.
        for k in 2..4 {
            for j in 2..4 {
                for i in 2..4 {
                    assert!((mgrid.u_x.get(i, j, k) - v.x).abs() < 1e-4);
                    assert!((mgrid.u_y.get(i, j, k) - v.y).abs() < 1e-4);
                    assert!((mgrid.u_z.get(i, j, k) - v.z).abs() < 1e-4);
                }
            }
        }
    }

    #[test]
    fn test_splat_then_gather_round_trip() {
        let dims = UVec3::new(6, 6, 6);
        let v = Vec3::new(0.8, 0.3, -0.6);
        let (mut particles, pgrid) = packed_particles(dims, v);
        let mut mgrid = MacGrid::new(dims);

        splat_particles_to_mac(&pgrid, &particles, &mut mgrid);
        gather_velocity_to_particles(&mut particles, &mgrid);

        let h = 1.0 / 6.0;
        for particle in &particles.list {
            let interior = particle.p.cmpgt(Vec3::splat(2.0 * h)).all()
                && particle.p.cmplt(Vec3::splat(1.0 - 2.0 * h)).all();
            if interior {
                assert!(
                    (particle.u - v).length() < 1e-3,
                    "round trip at {:?}: {:?}",
                    particle.p,
                    particle.u
                );
            }
        }
    }

    #[test]
    fn test_empty_faces_stay_zero() {
        let dims = UVec3::new(6, 6, 6);
        let mut particles = Particles::new();
        particles.spawn_fluid_with_velocity(Vec3::splat(0.25), Vec3::X);
        let mut pgrid = ParticleGrid::new(dims);
        pgrid.sort(&particles);
        let mut mgrid = MacGrid::new(dims);

        splat_particles_to_mac(&pgrid, &particles, &mut mgrid);

        assert_eq!(mgrid.u_x.get(5, 5, 5), 0.0);
    }

    #[test]
    fn test_blend_matches_formula() {
        let dims = UVec3::new(4, 4, 4);
        let mut mgrid = MacGrid::new(dims);
        let mut prev = PrevGrid::new(dims);
        mgrid.u_x.fill(2.0);
        prev.u_x.fill(0.5); // delta

        let mut particles = Particles::new();
        particles.spawn_fluid_with_velocity(Vec3::splat(0.5), Vec3::new(1.0, 0.0, 0.0));

        let ratio = 0.95;
        blend_pic_flip(&mut particles, &mgrid, &prev, ratio);

        let particle = &particles.list[0];
        let flip = 1.0 + 0.5;
        let pic = 2.0;
        let expected = (1.0 - ratio) * pic + ratio * flip;
        assert!((particle.u.x - expected).abs() < 1e-6);
        assert!((particle.t.x - flip).abs() < 1e-6);
        assert!(particle.u.y.abs() < 1e-6);
    }
}
