//! Property-based invariants over randomized initial conditions: whatever
//! the droplet position and kick velocity, particles stay finite, stay in
//! the unit cube, and valid fluid never ends up inside a solid cell.

use flip3d::{
    CellType, FlipParams, FlipSimulation, GeometryScene, ParticleKind, UVec3, Vec3,
};
use proptest::prelude::*;

const GRID: u32 = 8;
const STEPS: usize = 3;

fn droplet_center() -> impl Strategy<Value = Vec3> {
    (0.3f32..0.7, 0.3f32..0.7, 0.3f32..0.7).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

fn kick_velocity() -> impl Strategy<Value = Vec3> {
    (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_randomized_droplet_keeps_invariants(center in droplet_center(), kick in kick_velocity()) {
        let dims = UVec3::new(GRID, GRID, GRID);
        let mut scene = GeometryScene::new(dims);
        scene.add_liquid_sphere(center, 0.12);
        scene.add_solid_region(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.15, 1.0));
        let mut sim = FlipSimulation::new(dims, scene, FlipParams::default()).unwrap();
        sim.init();
        prop_assume!(!sim.particles().is_empty());

        for particle in &mut sim.particles_mut().list {
            if particle.kind == ParticleKind::Fluid {
                particle.u = kick;
            }
        }

        for _ in 0..STEPS {
            sim.step(false, false, false);

            let a = &sim.mac().a;
            let maxd = GRID as f32;
            for particle in &sim.particles().list {
                prop_assert!(particle.p.is_finite(), "non-finite position");
                prop_assert!(particle.u.is_finite(), "non-finite velocity");
                prop_assert!(
                    particle.p.cmpge(Vec3::ZERO).all() && particle.p.cmple(Vec3::ONE).all(),
                    "escaped the unit cube: {:?}",
                    particle.p
                );
                if particle.kind == ParticleKind::Fluid && !particle.invalid {
                    let g = particle.p * maxd;
                    let (i, j, k) = (
                        (g.x as usize).min(GRID as usize - 1),
                        (g.y as usize).min(GRID as usize - 1),
                        (g.z as usize).min(GRID as usize - 1),
                    );
                    prop_assert!(
                        a.get(i, j, k) != CellType::Solid,
                        "valid fluid particle in a solid cell"
                    );
                }
            }
        }

        prop_assert!(sim.particles().len() <= sim.params().max_particles);
    }
}
