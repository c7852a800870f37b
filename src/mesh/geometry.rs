//! Element geometry: simplex volumes, linear shape-function gradients and
//! facet normals.
//!
//! All elements are straight-sided simplices with linear (P1) shape
//! functions, so volumes and gradients are constant per element.

use rayon::prelude::*;

use crate::constants::{NDIMS, NODES_PER_ELEM, NODE_OF_FACET};
use crate::mesh::fields::{ScalarField, VectorField};

/// Constant per-element shape-function gradients: `grad[i][d]` = ∂N_i/∂x_d.
pub type ShapeGrad = [[f64; NDIMS]; NODES_PER_ELEM];

/// Signed area of a triangle (positive for counter-clockwise node order).
#[cfg(not(feature = "three_d"))]
pub fn element_volume(coord: &VectorField<f64, NDIMS>, conn: &[usize; NODES_PER_ELEM]) -> f64 {
    let p0 = coord[conn[0]];
    let p1 = coord[conn[1]];
    let p2 = coord[conn[2]];
    0.5 * ((p1[0] - p0[0]) * (p2[1] - p0[1]) - (p2[0] - p0[0]) * (p1[1] - p0[1]))
}

/// Signed volume of a tetrahedron (positive for outward-oriented facets).
#[cfg(feature = "three_d")]
pub fn element_volume(coord: &VectorField<f64, NDIMS>, conn: &[usize; NODES_PER_ELEM]) -> f64 {
    let p0 = coord[conn[0]];
    let mut e = [[0.0; NDIMS]; 3];
    for (k, row) in e.iter_mut().enumerate() {
        let p = coord[conn[k + 1]];
        for d in 0..NDIMS {
            row[d] = p[d] - p0[d];
        }
    }
    // e1 . (e2 x e3)
    (e[0][0] * (e[1][1] * e[2][2] - e[1][2] * e[2][1])
        + e[0][1] * (e[1][2] * e[2][0] - e[1][0] * e[2][2])
        + e[0][2] * (e[1][0] * e[2][1] - e[1][1] * e[2][0]))
        / 6.0
}

/// Outward normal of a facet, scaled by the facet measure (edge length in
/// 2D, face area in 3D). Node order follows [`NODE_OF_FACET`].
#[cfg(not(feature = "three_d"))]
pub fn facet_normal(p: &[[f64; NDIMS]; crate::constants::NODES_PER_FACET]) -> [f64; NDIMS] {
    let t = [p[1][0] - p[0][0], p[1][1] - p[0][1]];
    [t[1], -t[0]]
}

#[cfg(feature = "three_d")]
pub fn facet_normal(p: &[[f64; NDIMS]; crate::constants::NODES_PER_FACET]) -> [f64; NDIMS] {
    let mut u = [0.0; NDIMS];
    let mut v = [0.0; NDIMS];
    for d in 0..NDIMS {
        u[d] = p[1][d] - p[0][d];
        v[d] = p[2][d] - p[0][d];
    }
    [
        0.5 * (u[1] * v[2] - u[2] * v[1]),
        0.5 * (u[2] * v[0] - u[0] * v[2]),
        0.5 * (u[0] * v[1] - u[1] * v[0]),
    ]
}

/// Centroid of an element.
pub fn element_center(
    coord: &VectorField<f64, NDIMS>,
    conn: &[usize; NODES_PER_ELEM],
) -> [f64; NDIMS] {
    let mut c = [0.0; NDIMS];
    for &n in conn.iter() {
        for d in 0..NDIMS {
            c[d] += coord[n][d];
        }
    }
    for d in c.iter_mut() {
        *d /= NODES_PER_ELEM as f64;
    }
    c
}

/// Characteristic element length: vol^(1/NDIMS).
#[inline]
pub fn characteristic_length(volume: f64) -> f64 {
    if NDIMS == 3 {
        volume.cbrt()
    } else {
        volume.sqrt()
    }
}

/// Recompute all element volumes.
///
/// Returns the number of non-positive elements. A non-positive volume means
/// the mesh has tangled; the caller must trigger remeshing, this function
/// only reports the worst offender.
pub fn compute_volume(
    coord: &VectorField<f64, NDIMS>,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    volume: &mut ScalarField<f64>,
) -> usize {
    volume.resize(connectivity.len());
    volume
        .as_mut_slice()
        .par_iter_mut()
        .zip(connectivity.as_slice().par_iter())
        .for_each(|(vol, conn)| {
            *vol = element_volume(coord, conn);
        });

    let mut n_bad = 0;
    let mut worst = (0usize, f64::INFINITY);
    for (e, &v) in volume.iter().enumerate() {
        if v <= 0.0 {
            n_bad += 1;
            if v < worst.1 {
                worst = (e, v);
            }
        }
    }
    if n_bad > 0 {
        eprintln!(
            "Warning: {} element(s) with non-positive volume, worst at element #{} (vol = {:.3e})",
            n_bad, worst.0, worst.1
        );
    }
    n_bad
}

/// Recompute the shape-function gradients of every element.
///
/// For a simplex, ∇N_i = -n_i / (NDIMS * vol) where n_i is the outward
/// normal (scaled by the facet measure) of the facet opposite node i.
pub fn compute_shape_fn(
    coord: &VectorField<f64, NDIMS>,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    volume: &ScalarField<f64>,
    shpgrad: &mut ScalarField<ShapeGrad>,
) {
    shpgrad.resize(connectivity.len());
    shpgrad
        .as_mut_slice()
        .par_iter_mut()
        .enumerate()
        .for_each(|(e, grad)| {
            let conn = &connectivity[e];
            let scale = -1.0 / (NDIMS as f64 * volume[e]);
            for i in 0..NODES_PER_ELEM {
                let mut fp = [[0.0; NDIMS]; crate::constants::NODES_PER_FACET];
                for (j, slot) in fp.iter_mut().enumerate() {
                    *slot = coord[conn[NODE_OF_FACET[i][j]]];
                }
                let n = facet_normal(&fp);
                for d in 0..NDIMS {
                    grad[i][d] = scale * n[d];
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // One right simplex with unit legs.
    #[cfg(not(feature = "three_d"))]
    fn unit_mesh() -> (VectorField<f64, NDIMS>, VectorField<usize, NODES_PER_ELEM>) {
        let coord = VectorField::from_vec(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let conn = VectorField::from_vec(vec![[0, 1, 2]]);
        (coord, conn)
    }

    #[cfg(feature = "three_d")]
    fn unit_mesh() -> (VectorField<f64, NDIMS>, VectorField<usize, NODES_PER_ELEM>) {
        let coord = VectorField::from_vec(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        let conn = VectorField::from_vec(vec![[0, 1, 2, 3]]);
        (coord, conn)
    }

    #[test]
    fn test_unit_simplex_volume() {
        let (coord, conn) = unit_mesh();
        let mut volume = ScalarField::zeros(0);
        let n_bad = compute_volume(&coord, &conn, &mut volume);
        assert_eq!(n_bad, 0);
        let expect = if NDIMS == 3 { 1.0 / 6.0 } else { 0.5 };
        assert_relative_eq!(volume[0], expect, epsilon = 1e-14);
    }

    #[test]
    fn test_inverted_element_is_reported() {
        let (coord, mut conn) = unit_mesh();
        conn[0].swap(0, 1);
        let mut volume = ScalarField::zeros(0);
        let n_bad = compute_volume(&coord, &conn, &mut volume);
        assert_eq!(n_bad, 1, "Swapped nodes invert the element");
        assert!(volume[0] < 0.0);
    }

    #[test]
    fn test_shape_fn_partition_of_unity() {
        let (coord, conn) = unit_mesh();
        let mut volume = ScalarField::zeros(0);
        compute_volume(&coord, &conn, &mut volume);
        let mut shpgrad = ScalarField::zeros(0);
        compute_shape_fn(&coord, &conn, &volume, &mut shpgrad);

        // Gradients of a partition of unity sum to zero in every direction.
        for d in 0..NDIMS {
            let sum: f64 = (0..NODES_PER_ELEM).map(|i| shpgrad[0][i][d]).sum();
            assert_relative_eq!(sum, 0.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn test_shape_fn_interpolates_linear_field() {
        let (coord, conn) = unit_mesh();
        let mut volume = ScalarField::zeros(0);
        compute_volume(&coord, &conn, &mut volume);
        let mut shpgrad = ScalarField::zeros(0);
        compute_shape_fn(&coord, &conn, &volume, &mut shpgrad);

        // f(x) = 1 + 2 x_0 + 3 x_{last}; the recovered gradient is exact.
        let f: Vec<f64> = coord
            .iter()
            .map(|p| 1.0 + 2.0 * p[0] + 3.0 * p[NDIMS - 1])
            .collect();
        let mut grad = [0.0; NDIMS];
        for i in 0..NODES_PER_ELEM {
            for d in 0..NDIMS {
                grad[d] += shpgrad[0][i][d] * f[conn[0][i]];
            }
        }
        assert_relative_eq!(grad[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(grad[NDIMS - 1], 3.0, epsilon = 1e-12);
    }
}
