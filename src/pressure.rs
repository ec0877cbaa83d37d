//! Pressure projection for incompressible flow.
//!
//! The discrete Poisson system is assembled matrix-free over fluid cells:
//! solid neighbors drop out of the stencil (Neumann), air neighbors act as
//! Dirichlet zero, and with the sub-cell correction an air neighbor across a
//! level-set sign change contributes the ghost coefficient `1/theta` with
//! `theta = clamp(L_f / (L_f - L_a), theta_min, 1)`. The same ghost pressure
//! is substituted when the gradient is subtracted, so the projected field is
//! consistent with the solve.
//!
//! The solver is preconditioned conjugate gradient with a diagonal (Jacobi)
//! preconditioner, running on f64 vectors with f64 reductions so results are
//! stable under rayon's worker reordering.

use rayon::prelude::*;

use crate::grid::{CellType, Grid3};
use crate::mac::MacGrid;

/// Outcome of one pressure solve.
#[derive(Clone, Copy, Debug)]
pub struct SolveStats {
    pub iterations: usize,
    pub relative_residual: f64,
    pub converged: bool,
}

/// Velocity divergence per fluid cell, `(du_x + du_y + du_z) / h`.
/// Non-fluid cells read zero.
pub fn compute_divergence(mgrid: &mut MacGrid) {
    let dims = mgrid.dims();
    let (nx, ny) = (dims.x as usize, dims.y as usize);
    let scale = mgrid.maxd();

    let u_x = &mgrid.u_x;
    let u_y = &mgrid.u_y;
    let u_z = &mgrid.u_z;
    let a = &mgrid.a;

    mgrid
        .d
        .data_mut()
        .par_chunks_mut(nx * ny)
        .enumerate()
        .for_each(|(k, slab)| {
            for j in 0..ny {
                for i in 0..nx {
                    let cell = i + nx * j;
                    if a.get(i, j, k) != CellType::Fluid {
                        slab[cell] = 0.0;
                        continue;
                    }
                    let div = (u_x.get(i + 1, j, k) - u_x.get(i, j, k))
                        + (u_y.get(i, j + 1, k) - u_y.get(i, j, k))
                        + (u_z.get(i, j, k + 1) - u_z.get(i, j, k));
                    slab[cell] = div * scale;
                }
            }
        });
}

/// Free-surface fraction across a fluid/air face, clamped away from zero so
/// the ghost coefficient stays bounded.
#[inline]
fn theta_clamped(l_fluid: f32, l_air: f32, theta_min: f32) -> f32 {
    let denom = l_fluid - l_air;
    let theta = if denom.abs() > 1e-12 {
        l_fluid / denom
    } else {
        1.0
    };
    theta.clamp(theta_min, 1.0)
}

/// Solve the pressure Poisson system for the current cell classification,
/// divergence, and liquid level set, writing the result into `mgrid.p`.
/// On non-convergence the partial solution is kept and the caller decides
/// how loudly to complain.
pub fn solve_pressure(
    mgrid: &mut MacGrid,
    subcell: bool,
    theta_min: f32,
    tolerance: f32,
    max_iterations: usize,
) -> SolveStats {
    let dims = mgrid.dims();
    let (nx, ny, nz) = (dims.x as usize, dims.y as usize, dims.z as usize);
    let plane = nx * ny;
    let ncells = nx * ny * nz;
    let h = mgrid.h() as f64;

    let a = mgrid.a.data();
    let l = mgrid.l.data();
    let div = mgrid.d.data();

    // Assemble the stencil diagonal and right-hand side.
    let mut diag = vec![0.0f64; ncells];
    let mut rhs = vec![0.0f64; ncells];
    diag.par_chunks_mut(plane)
        .zip(rhs.par_chunks_mut(plane))
        .enumerate()
        .for_each(|(k, (diag_slab, rhs_slab))| {
            for j in 0..ny {
                for i in 0..nx {
                    let cell = i + nx * j;
                    let idx = cell + plane * k;
                    if a[idx] != CellType::Fluid {
                        continue;
                    }
                    let neighbors = [
                        (i > 0, idx.wrapping_sub(1)),
                        (i + 1 < nx, idx + 1),
                        (j > 0, idx.wrapping_sub(nx)),
                        (j + 1 < ny, idx + nx),
                        (k > 0, idx.wrapping_sub(plane)),
                        (k + 1 < nz, idx + plane),
                    ];
                    let mut coeff = 0.0f64;
                    for (in_bounds, nidx) in neighbors {
                        if !in_bounds {
                            continue;
                        }
                        match a[nidx] {
                            CellType::Solid => {}
                            CellType::Fluid => coeff += 1.0,
                            CellType::Air => {
                                coeff += if subcell && l[idx] * l[nidx] < 0.0 {
                                    1.0 / theta_clamped(l[idx], l[nidx], theta_min) as f64
                                } else {
                                    1.0
                                };
                            }
                        }
                    }
                    diag_slab[cell] = coeff;
                    if coeff > 0.0 {
                        rhs_slab[cell] = -(div[idx] as f64) * h * h;
                    }
                }
            }
        });

    let active = |idx: usize| a[idx] == CellType::Fluid && diag[idx] > 0.0;

    let b_norm = dot(&rhs, &rhs).sqrt();
    if b_norm == 0.0 {
        mgrid.p.fill(0.0);
        return SolveStats {
            iterations: 0,
            relative_residual: 0.0,
            converged: true,
        };
    }

    let mut x = vec![0.0f64; ncells];
    let mut r = rhs.clone();
    let mut z = vec![0.0f64; ncells];
    precondition(&mut z, &r, &diag, a);
    let mut s = z.clone();
    let mut t = vec![0.0f64; ncells];
    let mut sigma = dot(&z, &r);

    let mut stats = SolveStats {
        iterations: 0,
        relative_residual: 1.0,
        converged: false,
    };

    for iteration in 1..=max_iterations {
        apply_stencil(&mut t, &s, a, &diag, nx, ny, nz);
        let sts = dot(&s, &t);
        if sts.abs() < f64::MIN_POSITIVE {
            break;
        }
        let alpha = sigma / sts;

        x.par_iter_mut()
            .zip(s.par_iter())
            .for_each(|(xi, si)| *xi += alpha * si);
        r.par_iter_mut()
            .zip(t.par_iter())
            .for_each(|(ri, ti)| *ri -= alpha * ti);

        stats.iterations = iteration;
        stats.relative_residual = dot(&r, &r).sqrt() / b_norm;
        if stats.relative_residual < tolerance as f64 {
            stats.converged = true;
            break;
        }

        precondition(&mut z, &r, &diag, a);
        let sigma_new = dot(&z, &r);
        let beta = sigma_new / sigma;
        s.par_iter_mut()
            .zip(z.par_iter())
            .for_each(|(si, zi)| *si = zi + beta * *si);
        sigma = sigma_new;
    }

    // Publish: fluid cells take the solution, everything else is Dirichlet 0.
    let p = mgrid.p.data_mut();
    p.par_iter_mut().enumerate().for_each(|(idx, value)| {
        *value = if active(idx) { x[idx] as f32 } else { 0.0 };
    });

    stats
}

/// Jacobi preconditioner `z = r / diag` on active cells.
fn precondition(z: &mut [f64], r: &[f64], diag: &[f64], a: &[CellType]) {
    z.par_iter_mut().enumerate().for_each(|(idx, zi)| {
        *zi = if a[idx] == CellType::Fluid && diag[idx] > 0.0 {
            r[idx] / diag[idx]
        } else {
            0.0
        };
    });
}

/// Matrix-free application of the 7-point operator restricted to fluid
/// cells: `dst = diag * src - sum(fluid-neighbor src)`.
fn apply_stencil(
    dst: &mut [f64],
    src: &[f64],
    a: &[CellType],
    diag: &[f64],
    nx: usize,
    ny: usize,
    nz: usize,
) {
    let plane = nx * ny;
    dst.par_chunks_mut(plane)
        .enumerate()
        .for_each(|(k, slab)| {
            for j in 0..ny {
                for i in 0..nx {
                    let cell = i + nx * j;
                    let idx = cell + plane * k;
                    if a[idx] != CellType::Fluid || diag[idx] <= 0.0 {
                        slab[cell] = 0.0;
                        continue;
                    }
                    let mut value = diag[idx] * src[idx];
                    if i > 0 && a[idx - 1] == CellType::Fluid {
                        value -= src[idx - 1];
                    }
                    if i + 1 < nx && a[idx + 1] == CellType::Fluid {
                        value -= src[idx + 1];
                    }
                    if j > 0 && a[idx - nx] == CellType::Fluid {
                        value -= src[idx - nx];
                    }
                    if j + 1 < ny && a[idx + nx] == CellType::Fluid {
                        value -= src[idx + nx];
                    }
                    if k > 0 && a[idx - plane] == CellType::Fluid {
                        value -= src[idx - plane];
                    }
                    if k + 1 < nz && a[idx + plane] == CellType::Fluid {
                        value -= src[idx + plane];
                    }
                    slab[cell] = value;
                }
            }
        });
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.par_iter().zip(b.par_iter()).map(|(x, y)| x * y).sum()
}

/// Subtract the pressure gradient from every face with fluid on at least one
/// side. Faces touching a solid cell are zeroed; at level-set sign changes
/// the air-side pressure is replaced by its clamped ghost value.
pub fn subtract_pressure_gradient(mgrid: &mut MacGrid, subcell: bool, theta_min: f32) {
    let dims = mgrid.dims();
    let (x, y, z) = (dims.x as usize, dims.y as usize, dims.z as usize);
    let inv_h = mgrid.maxd();

    let a = &mgrid.a;
    let p = &mgrid.p;
    let l = &mgrid.l;

    gradient_pass(&mut mgrid.u_x, a, p, l, subcell, theta_min, inv_h, |i, j, k| {
        if i == 0 || i == x {
            None
        } else {
            Some(((i - 1, j, k), (i, j, k)))
        }
    });
    gradient_pass(&mut mgrid.u_y, a, p, l, subcell, theta_min, inv_h, |i, j, k| {
        if j == 0 || j == y {
            None
        } else {
            Some(((i, j - 1, k), (i, j, k)))
        }
    });
    gradient_pass(&mut mgrid.u_z, a, p, l, subcell, theta_min, inv_h, |i, j, k| {
        if k == 0 || k == z {
            None
        } else {
            Some(((i, j, k - 1), (i, j, k)))
        }
    });
}

type CellPair = ((usize, usize, usize), (usize, usize, usize));

#[allow(clippy::too_many_arguments)]
fn gradient_pass(
    faces: &mut Grid3<f32>,
    a: &Grid3<CellType>,
    p: &Grid3<f32>,
    l: &Grid3<f32>,
    subcell: bool,
    theta_min: f32,
    inv_h: f32,
    cells_of_face: impl Fn(usize, usize, usize) -> Option<CellPair> + Sync,
) {
    let (nx, ny) = (faces.nx(), faces.ny());
    faces
        .data_mut()
        .par_chunks_mut(nx * ny)
        .enumerate()
        .for_each(|(k, slab)| {
            for j in 0..ny {
                for i in 0..nx {
                    let Some((back, front)) = cells_of_face(i, j, k) else {
                        continue;
                    };
                    let a_b = a.get(back.0, back.1, back.2);
                    let a_f = a.get(front.0, front.1, front.2);
                    if a_b == CellType::Solid || a_f == CellType::Solid {
                        slab[i + nx * j] = 0.0;
                        continue;
                    }
                    if a_b != CellType::Fluid && a_f != CellType::Fluid {
                        continue;
                    }

                    let l_b = l.get(back.0, back.1, back.2);
                    let l_f = l.get(front.0, front.1, front.2);
                    let mut p_b = p.get(back.0, back.1, back.2);
                    let mut p_f = p.get(front.0, front.1, front.2);

                    if subcell && l_b * l_f < 0.0 {
                        if l_f >= 0.0 {
                            let theta = theta_clamped(l_b, l_f, theta_min);
                            p_f = (1.0 - 1.0 / theta) * p.get(back.0, back.1, back.2);
                        }
                        if l_b >= 0.0 {
                            let theta = theta_clamped(l_f, l_b, theta_min);
                            p_b = (1.0 - 1.0 / theta) * p.get(front.0, front.1, front.2);
                        }
                    }

                    slab[i + nx * j] -= (p_f - p_b) * inv_h;
                }
            }
        });
}
