//! Explicit heat diffusion with lumped thermal mass.
//!
//! Per element the diffusion operator is D[i][j] = sum_d dN_i/dx_d *
//! dN_j/dx_d; the nodal heat rate is gathered over the element support and
//! the temperature advanced by dt over the lumped thermal mass. The top
//! surface is pinned to the surface temperature; the bottom can optionally
//! be pinned to the mantle temperature. Radiogenic crustal heating enters
//! as an additive per-element source.

use rayon::prelude::*;

use crate::constants::{BOUNDZ0, BOUNDZ1, NDIMS, NODES_PER_ELEM};
use crate::mechanics::material::MatProps;
use crate::mesh::fields::{ScalarField, VectorField};
use crate::mesh::geometry::{element_center, ShapeGrad};

/// Exponentially folded radiogenic heat production in the crust.
#[derive(Debug, Clone, Copy)]
pub struct RadiogenicHeating {
    /// Heat production rate at the surface (W/kg).
    pub heat_rate: f64,
    /// e-folding depth of the production (m).
    pub folding_depth: f64,
    /// Production stops below this depth (m).
    pub crustal_thickness: f64,
}

impl RadiogenicHeating {
    /// Volumetric source (W/m^3) at depth (m, positive down).
    pub fn source(&self, rho: f64, depth: f64) -> f64 {
        if depth < 0.0 || depth > self.crustal_thickness || self.heat_rate == 0.0 {
            return 0.0;
        }
        rho * self.heat_rate * (-depth / self.folding_depth).exp()
    }
}

/// Advance the temperature field by one explicit diffusion step.
#[allow(clippy::too_many_arguments)]
pub fn update_temperature(
    mat: &MatProps,
    surface_temperature: f64,
    bottom_temperature: Option<f64>,
    radiogenic: Option<&RadiogenicHeating>,
    dt: f64,
    coord: &VectorField<f64, NDIMS>,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    mattype: &ScalarField<i32>,
    volume: &ScalarField<f64>,
    shpgrad: &ScalarField<ShapeGrad>,
    tmass: &ScalarField<f64>,
    bcflag: &ScalarField<u32>,
    temperature: &mut ScalarField<f64>,
    tdot: &mut ScalarField<f64>,
) {
    let contrib: Vec<[f64; NODES_PER_ELEM]> = (0..connectivity.len())
        .into_par_iter()
        .map(|e| {
            let conn = &connectivity[e];
            let grad = &shpgrad[e];
            let m = mattype[e] as usize;

            let mut t_elem = 0.0;
            for &n in conn.iter() {
                t_elem += temperature[n];
            }
            t_elem /= NODES_PER_ELEM as f64;

            // Conductivity times volume, with the diffusivity clamp folded
            // into k().
            let kv = mat.k(m, t_elem) * volume[e];

            let mut out = [0.0; NODES_PER_ELEM];
            for i in 0..NODES_PER_ELEM {
                let mut diffusion = 0.0;
                for j in 0..NODES_PER_ELEM {
                    let mut d_ij = 0.0;
                    for d in 0..NDIMS {
                        d_ij += grad[i][d] * grad[j][d];
                    }
                    diffusion += d_ij * temperature[conn[j]];
                }
                out[i] = diffusion * kv;
            }

            if let Some(heat) = radiogenic {
                let center = element_center(coord, conn);
                let depth = -center[NDIMS - 1];
                let src = heat.source(mat.rho(m, t_elem), depth);
                if src != 0.0 {
                    // Heating enters tdot with a negative sign: the nodal
                    // update subtracts tdot.
                    let share = src * volume[e] / NODES_PER_ELEM as f64;
                    for o in out.iter_mut() {
                        *o -= share;
                    }
                }
            }
            out
        })
        .collect();

    tdot.resize(temperature.len());
    tdot.fill(0.0);
    for (e, out) in contrib.into_iter().enumerate() {
        let conn = &connectivity[e];
        for i in 0..NODES_PER_ELEM {
            tdot[conn[i]] += out[i];
        }
    }

    for n in 0..temperature.len() {
        let flag = bcflag[n];
        if flag & BOUNDZ1 != 0 {
            temperature[n] = surface_temperature;
        } else if let (Some(t_bot), true) = (bottom_temperature, flag & BOUNDZ0 != 0) {
            temperature[n] = t_bot;
        } else {
            temperature[n] -= tdot[n] * dt / tmass[n];
        }
    }
}
