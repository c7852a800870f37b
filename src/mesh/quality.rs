//! Element quality assessment.
//!
//! The quality metric is a dimensionless ratio in (0, 1]:
//! - 2D: minimum interior angle normalized by 60 degrees;
//! - 3D: inscribed-to-circumscribed sphere radius ratio normalized so a
//!   regular tetrahedron scores 1, reported as q^(1/3) so its magnitude
//!   matches the 2D metric.
//!
//! Remeshing triggers when the worst element drops below
//! `mesh.min_quality`; degradation is gradual, so the check runs every few
//! steps rather than every step.

use rayon::prelude::*;

use crate::constants::{NDIMS, NODES_PER_ELEM};
use crate::mesh::fields::VectorField;

/// Quality of a single element, in (0, 1]; 0 or negative for degenerate
/// or inverted elements.
#[cfg(not(feature = "three_d"))]
pub fn element_quality(
    coord: &VectorField<f64, NDIMS>,
    conn: &[usize; NODES_PER_ELEM],
) -> f64 {
    let p = [coord[conn[0]], coord[conn[1]], coord[conn[2]]];

    // Signed area; inverted triangles report non-positive quality.
    let area2 = (p[1][0] - p[0][0]) * (p[2][1] - p[0][1])
        - (p[2][0] - p[0][0]) * (p[1][1] - p[0][1]);
    if area2 <= 0.0 {
        return 0.0;
    }

    let mut min_angle = f64::INFINITY;
    for i in 0..3 {
        let a = p[(i + 1) % 3];
        let b = p[(i + 2) % 3];
        let u = [a[0] - p[i][0], a[1] - p[i][1]];
        let v = [b[0] - p[i][0], b[1] - p[i][1]];
        let lu = (u[0] * u[0] + u[1] * u[1]).sqrt();
        let lv = (v[0] * v[0] + v[1] * v[1]).sqrt();
        if lu == 0.0 || lv == 0.0 {
            return 0.0;
        }
        let c = ((u[0] * v[0] + u[1] * v[1]) / (lu * lv)).clamp(-1.0, 1.0);
        min_angle = min_angle.min(c.acos());
    }
    min_angle / (60.0 * crate::constants::DEG2RAD)
}

#[cfg(feature = "three_d")]
pub fn element_quality(
    coord: &VectorField<f64, NDIMS>,
    conn: &[usize; NODES_PER_ELEM],
) -> f64 {
    use nalgebra::{Matrix3, Vector3};

    let p: Vec<Vector3<f64>> = conn
        .iter()
        .map(|&n| Vector3::new(coord[n][0], coord[n][1], coord[n][2]))
        .collect();

    let e1 = p[1] - p[0];
    let e2 = p[2] - p[0];
    let e3 = p[3] - p[0];
    let vol6 = e1.dot(&e2.cross(&e3));
    if vol6 <= 0.0 {
        return 0.0;
    }
    let vol = vol6 / 6.0;

    // Inradius from the face areas: r_in = 3 V / sum(A_f).
    let face_area = |a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>| -> f64 {
        0.5 * (b - a).cross(&(c - a)).norm()
    };
    let total_area = face_area(&p[1], &p[2], &p[3])
        + face_area(&p[0], &p[3], &p[2])
        + face_area(&p[0], &p[1], &p[3])
        + face_area(&p[0], &p[2], &p[1]);
    let r_in = 3.0 * vol / total_area;

    // Circumcenter c solves 2 (p_i - p_0) . c = |p_i|^2 - |p_0|^2.
    let m = Matrix3::from_rows(&[
        (2.0 * e1).transpose(),
        (2.0 * e2).transpose(),
        (2.0 * e3).transpose(),
    ]);
    let rhs = Vector3::new(
        p[1].norm_squared() - p[0].norm_squared(),
        p[2].norm_squared() - p[0].norm_squared(),
        p[3].norm_squared() - p[0].norm_squared(),
    );
    let center = match m.lu().solve(&rhs) {
        Some(c) => c,
        None => return 0.0,
    };
    let r_circ = (center - p[0]).norm();
    if r_circ == 0.0 {
        return 0.0;
    }

    // Regular tetrahedron has r_in / r_circ = 1/3.
    3.0 * r_in / r_circ
}

/// Worst element quality over the mesh, with the offending element index.
///
/// In 3D the ratio is reported as q^(1/3) so the `min_quality` threshold
/// has the same magnitude in both dimensions.
pub fn worst_quality(
    coord: &VectorField<f64, NDIMS>,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
) -> (f64, usize) {
    let scan = |(e, conn): (usize, &[usize; NODES_PER_ELEM])| {
        (element_quality(coord, conn), e)
    };
    let fold = |a: (f64, usize), b: (f64, usize)| if b.0 < a.0 { b } else { a };

    let (mut q, elem) = if connectivity.len() > 1000 {
        connectivity
            .as_slice()
            .par_iter()
            .enumerate()
            .map(scan)
            .reduce(|| (f64::INFINITY, 0), fold)
    } else {
        connectivity
            .as_slice()
            .iter()
            .enumerate()
            .map(scan)
            .fold((f64::INFINITY, 0), fold)
    };

    if NDIMS == 3 && q > 0.0 {
        q = q.cbrt();
    }
    (q, elem)
}
