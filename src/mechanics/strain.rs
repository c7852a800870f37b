//! Strain rate from nodal velocities, plus packed-tensor helpers.
//!
//! Symmetric tensors are stored packed: the NDIMS diagonal components first
//! (xx, zz in 2D; xx, yy, zz in 3D), then the off-diagonals in
//! [`STR_OFFDIAG`] order. Off-diagonal strain-rate components carry the
//! tensorial 1/2 factor, consistent with the shape-function assembly.

use rayon::prelude::*;

use crate::constants::{NDIMS, NODES_PER_ELEM, NSTR, STR_OFFDIAG};
use crate::mesh::fields::{ScalarField, VectorField};
use crate::mesh::geometry::ShapeGrad;

/// Trace of a packed symmetric tensor.
#[inline]
pub fn trace(t: &[f64; NSTR]) -> f64 {
    let mut tr = 0.0;
    for d in 0..NDIMS {
        tr += t[d];
    }
    tr
}

/// Square root of the second invariant of the deviatoric part:
/// sqrt(0.5 * s'_ij s'_ij).
pub fn second_invariant(t: &[f64; NSTR]) -> f64 {
    let mean = trace(t) / NDIMS as f64;
    let mut j2 = 0.0;
    for d in 0..NDIMS {
        j2 += 0.5 * (t[d] - mean) * (t[d] - mean);
    }
    for k in NDIMS..NSTR {
        j2 += t[k] * t[k];
    }
    j2.sqrt()
}

/// Expand a packed symmetric tensor into the full matrix.
pub fn unpack(t: &[f64; NSTR]) -> [[f64; NDIMS]; NDIMS] {
    let mut m = [[0.0; NDIMS]; NDIMS];
    for d in 0..NDIMS {
        m[d][d] = t[d];
    }
    for (k, &(a, b)) in STR_OFFDIAG.iter().enumerate() {
        m[a][b] = t[NDIMS + k];
        m[b][a] = t[NDIMS + k];
    }
    m
}

/// Product of a packed symmetric tensor with a vector.
pub fn tensor_dot(t: &[f64; NSTR], v: &[f64; NDIMS]) -> [f64; NDIMS] {
    let m = unpack(t);
    let mut r = [0.0; NDIMS];
    for a in 0..NDIMS {
        for b in 0..NDIMS {
            r[a] += m[a][b] * v[b];
        }
    }
    r
}

/// Strain rate of one element from its nodal velocities.
pub fn element_strain_rate(
    conn: &[usize; NODES_PER_ELEM],
    vel: &VectorField<f64, NDIMS>,
    grad: &ShapeGrad,
) -> [f64; NSTR] {
    let mut s = [0.0; NSTR];
    for i in 0..NODES_PER_ELEM {
        let v = vel[conn[i]];
        for d in 0..NDIMS {
            s[d] += grad[i][d] * v[d];
        }
        for (k, &(a, b)) in STR_OFFDIAG.iter().enumerate() {
            s[NDIMS + k] += 0.5 * (grad[i][b] * v[a] + grad[i][a] * v[b]);
        }
    }
    s
}

/// Recompute the strain rate of every element.
pub fn update_strain_rate(
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    vel: &VectorField<f64, NDIMS>,
    shpgrad: &ScalarField<ShapeGrad>,
    strain_rate: &mut VectorField<f64, NSTR>,
) {
    strain_rate.resize(connectivity.len());
    strain_rate
        .as_mut_slice()
        .par_iter_mut()
        .enumerate()
        .for_each(|(e, s)| {
            *s = element_strain_rate(&connectivity[e], vel, &shpgrad[e]);
        });
}
