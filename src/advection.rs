//! Particle advection and solid wall response.

use glam::{UVec3, Vec3};
use rayon::prelude::*;

use crate::mac::MacGrid;
use crate::particle::{ParticleKind, Particles};
use crate::particlegrid::ParticleGrid;

/// Advance fluid particles through the grid velocity field, clamp them into
/// the domain margin, and push them off nearby solid markers.
///
/// The bucket index is rebuilt after the position update so the wall
/// response reads current neighborhoods.
pub fn advect_particles(
    particles: &mut Particles,
    pgrid: &mut ParticleGrid,
    mgrid: &MacGrid,
    dims: UVec3,
    dt: f32,
    density: f32,
) {
    let maxd = dims.x.max(dims.y).max(dims.z) as f32;
    let margin = 1.0 / maxd;

    // Forward Euler through the sampled field.
    particles.list.par_iter_mut().for_each(|particle| {
        if particle.kind == ParticleKind::Fluid {
            let velocity = mgrid.sample_velocity(particle.p);
            particle.p += dt * velocity;
        }
    });

    pgrid.sort(particles);

    // Keep fluid inside the walls.
    particles.list.par_iter_mut().for_each(|particle| {
        if particle.kind == ParticleKind::Fluid {
            particle.p = particle
                .p
                .clamp(Vec3::splat(margin), Vec3::splat(1.0 - margin));
        }
    });

    resolve_solid_contacts(particles, pgrid, maxd, density, margin);
}

/// Push fluid particles away from solid markers within the contact radius
/// and cancel the velocity component pointing into the wall. The push can
/// aim outward near the domain boundary, so positions are re-clamped after
/// the contact loop.
fn resolve_solid_contacts(
    particles: &mut Particles,
    pgrid: &ParticleGrid,
    maxd: f32,
    density: f32,
    margin: f32,
) {
    let contact_radius = 1.5 * density / maxd;

    // Solid markers never move during this pass, so a snapshot of kinds,
    // positions, and normals is safe to read while fluid particles mutate.
    let kinds: Vec<ParticleKind> = particles.list.iter().map(|p| p.kind).collect();
    let positions: Vec<Vec3> = particles.list.iter().map(|p| p.p).collect();
    let normals: Vec<Vec3> = particles.list.iter().map(|p| p.n).collect();

    particles.list.par_iter_mut().for_each(|particle| {
        if particle.kind != ParticleKind::Fluid {
            return;
        }
        let cell = pgrid.cell_of(particle.p);
        for neighbor in pgrid.cell_neighbors(cell, 1) {
            let neighbor = neighbor as usize;
            if kinds[neighbor] != ParticleKind::Solid {
                continue;
            }
            let dist = (particle.p - positions[neighbor]).length();
            if dist >= contact_radius {
                continue;
            }
            let mut normal = normals[neighbor];
            if normal.length() < 1e-7 && dist > 0.0 {
                normal = (particle.p - positions[neighbor]).normalize();
            }
            particle.p += (contact_radius - dist) * normal;
            let inward = particle.u.dot(normal);
            if inward < 0.0 {
                particle.u -= inward * normal;
            }
        }
        particle.p = particle
            .p
            .clamp(Vec3::splat(margin), Vec3::splat(1.0 - margin));
    });
}
