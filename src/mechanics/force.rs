//! Nodal force assembly: internal stress divergence, gravity body force,
//! Winkler foundation on the bottom boundary, and local damping.

use rayon::prelude::*;

use crate::constants::{NDIMS, NODES_PER_ELEM, NODES_PER_FACET, NODE_OF_FACET, NSTR};
use crate::mechanics::material::MatProps;
use crate::mechanics::strain::tensor_dot;
use crate::mesh::fields::{ScalarField, VectorField};
use crate::mesh::geometry::{facet_normal, ShapeGrad};

/// Assemble the nodal force vector from scratch.
///
/// Internal force: f_n -= sigma . grad(N_i) * vol for every element in the
/// node's support. Gravity enters as a body force along -z, lumped equally
/// onto the element's nodes.
#[allow(clippy::too_many_arguments)]
pub fn update_force(
    mat: &MatProps,
    gravity: f64,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    mattype: &ScalarField<i32>,
    temperature: &ScalarField<f64>,
    stress: &VectorField<f64, NSTR>,
    volume: &ScalarField<f64>,
    shpgrad: &ScalarField<ShapeGrad>,
    force: &mut VectorField<f64, NDIMS>,
) {
    let contrib: Vec<[[f64; NDIMS]; NODES_PER_ELEM]> = (0..connectivity.len())
        .into_par_iter()
        .map(|e| {
            let conn = &connectivity[e];
            let vol = volume[e];
            let grad = &shpgrad[e];
            let m = mattype[e] as usize;

            let mut t_elem = 0.0;
            for &n in conn.iter() {
                t_elem += temperature[n];
            }
            t_elem /= NODES_PER_ELEM as f64;
            let buoy = mat.rho(m, t_elem) * gravity / NODES_PER_ELEM as f64;

            let mut out = [[0.0; NDIMS]; NODES_PER_ELEM];
            for i in 0..NODES_PER_ELEM {
                let f_int = tensor_dot(&stress[e], &grad[i]);
                for d in 0..NDIMS {
                    out[i][d] = -f_int[d] * vol;
                }
                out[i][NDIMS - 1] -= buoy * vol;
            }
            out
        })
        .collect();

    force.resize(temperature.len());
    force.fill(0.0);
    for (e, out) in contrib.into_iter().enumerate() {
        let conn = &connectivity[e];
        for i in 0..NODES_PER_ELEM {
            for d in 0..NDIMS {
                force[conn[i]][d] += out[i][d];
            }
        }
    }
}

/// Winkler foundation: a pressure on the bottom facets restoring them
/// toward the nominal depth, with `delta_rho` excess density. The pressure
/// is anchored at the compensation pressure so a flat bottom at depth
/// carries exactly the lithostatic load.
#[allow(clippy::too_many_arguments)]
pub fn apply_winkler_foundation(
    mat: &MatProps,
    gravity: f64,
    delta_rho: f64,
    compensation_pressure: f64,
    zlength: f64,
    coord: &VectorField<f64, NDIMS>,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    mattype: &ScalarField<i32>,
    bottom_facets: &[(usize, usize)],
    force: &mut VectorField<f64, NDIMS>,
) {
    for &(e, f) in bottom_facets {
        let conn = &connectivity[e];
        let mut nodes = [0usize; NODES_PER_FACET];
        let mut fp = [[0.0; NDIMS]; NODES_PER_FACET];
        let mut zcenter = 0.0;
        for (j, &i) in NODE_OF_FACET[f].iter().enumerate() {
            nodes[j] = conn[i];
            fp[j] = coord[conn[i]];
            zcenter += fp[j][NDIMS - 1];
        }
        zcenter /= NODES_PER_FACET as f64;

        let normal = facet_normal(&fp);
        let m = mattype[e] as usize;
        let rho = mat.rho(m, 273.0) + delta_rho;
        let p = compensation_pressure - rho * gravity * (zcenter + zlength);

        for &n in nodes.iter() {
            force[n][NDIMS - 1] -= p * normal[NDIMS - 1] / NODES_PER_FACET as f64;
        }
    }
}

/// Local non-viscous damping toward the quasi-static state:
/// f -= damping_factor * sign(v) * |f| componentwise.
pub fn apply_damping(
    damping_factor: f64,
    vel: &VectorField<f64, NDIMS>,
    force: &mut VectorField<f64, NDIMS>,
) {
    if damping_factor == 0.0 {
        return;
    }
    force
        .as_mut_slice()
        .par_iter_mut()
        .zip(vel.as_slice().par_iter())
        .for_each(|(f, v)| {
            for d in 0..NDIMS {
                if v[d].abs() > 1e-15 {
                    f[d] -= damping_factor * f[d].abs() * v[d].signum();
                }
            }
        });
}
