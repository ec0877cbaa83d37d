//! Marker particles.

use glam::Vec3;

/// What a particle represents.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParticleKind {
    /// Moving fluid marker
    Fluid,
    /// Static solid marker carrying a surface normal
    Solid,
    /// Air marker (rarely populated)
    Air,
}

/// A single marker particle in normalized `[0,1]^3` coordinates.
#[derive(Clone, Copy, Debug)]
pub struct Particle {
    /// Position
    pub p: Vec3,
    /// Velocity
    pub u: Vec3,
    /// Scratch velocity; holds the FLIP candidate during blending
    pub t: Vec3,
    /// Surface normal (solid markers only)
    pub n: Vec3,
    /// Mass used as the splat weight
    pub mass: f32,
    /// Kernel density relative to the calibrated maximum
    pub density: f32,
    pub kind: ParticleKind,
    /// Set when the particle is out of bounds or inside a solid cell
    pub invalid: bool,
    /// Set when the particle should be culled at the end of the step
    pub temp: bool,
}

impl Particle {
    /// Fluid marker at rest.
    pub fn fluid(p: Vec3) -> Self {
        Self::fluid_with_velocity(p, Vec3::ZERO)
    }

    /// Fluid marker with an initial velocity.
    pub fn fluid_with_velocity(p: Vec3, u: Vec3) -> Self {
        Self {
            p,
            u,
            t: Vec3::ZERO,
            n: Vec3::ZERO,
            mass: 1.0,
            density: 1.0,
            kind: ParticleKind::Fluid,
            invalid: false,
            temp: false,
        }
    }

    /// Solid marker with an outward surface normal.
    pub fn solid(p: Vec3, n: Vec3) -> Self {
        Self {
            p,
            u: Vec3::ZERO,
            t: Vec3::ZERO,
            n,
            mass: 1.0,
            density: 1.0,
            kind: ParticleKind::Solid,
            invalid: false,
            temp: false,
        }
    }
}

/// Particle collection owned by the simulator.
#[derive(Default)]
pub struct Particles {
    pub list: Vec<Particle>,
}

impl Particles {
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            list: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    pub fn spawn_fluid(&mut self, p: Vec3) {
        self.list.push(Particle::fluid(p));
    }

    pub fn spawn_fluid_with_velocity(&mut self, p: Vec3, u: Vec3) {
        self.list.push(Particle::fluid_with_velocity(p, u));
    }

    pub fn spawn_solid(&mut self, p: Vec3, n: Vec3) {
        self.list.push(Particle::solid(p, n));
    }

    /// Drop every particle flagged for end-of-step removal.
    pub fn cull_temporary(&mut self) {
        self.list.retain(|p| !p.temp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn() {
        let mut particles = Particles::new();
        particles.spawn_fluid(Vec3::splat(0.5));
        particles.spawn_solid(Vec3::splat(0.1), Vec3::Y);
        assert_eq!(particles.len(), 2);
        assert_eq!(particles.list[0].kind, ParticleKind::Fluid);
        assert_eq!(particles.list[1].kind, ParticleKind::Solid);
        assert_eq!(particles.list[1].n, Vec3::Y);
    }

    #[test]
    fn test_cull_temporary() {
        let mut particles = Particles::new();
        particles.spawn_fluid(Vec3::splat(0.2));
        particles.spawn_fluid(Vec3::splat(0.4));
        particles.list[0].temp = true;
        particles.cull_temporary();
        assert_eq!(particles.len(), 1);
        assert_eq!(particles.list[0].p, Vec3::splat(0.4));
    }
}
