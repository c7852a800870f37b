//! Constitutive stress update and Jaumann corotational rotation.
//!
//! The update is driven by the strain increment `de = strain_rate * dt` and
//! dispatches on the configured rheology:
//! - elastic: incremental Hooke with Lame parameters from (K, G);
//! - viscous: deviatoric stress from the clamped creep viscosity, mean
//!   stress elastic on the accumulated volumetric strain;
//! - maxwell: elastic predictor with deviatoric relaxation by the
//!   dt/(eta/G) ratio;
//! - elasto-plastic: Mohr-Coulomb return mapping in principal-stress space
//!   with strain weakening, non-associative flow and a tension cutoff;
//! - elasto-viscous-plastic: both the Maxwell and the plastic branch are
//!   evaluated and the softer response (smaller deviatoric second
//!   invariant) wins.

use rayon::prelude::*;

use crate::constants::{NDIMS, NODES_PER_ELEM, NSTR, STR_OFFDIAG};
use crate::mechanics::material::{MatProps, PlasticProps, Rheology};
use crate::mechanics::strain::{second_invariant, trace, unpack};
use crate::mesh::fields::{ScalarField, VectorField};
use crate::mesh::geometry::ShapeGrad;

/// Incremental isotropic elasticity.
fn elastic(bulkm: f64, shearm: f64, de: &[f64; NSTR], s: &mut [f64; NSTR]) {
    let lambda = bulkm - 2.0 / 3.0 * shearm;
    let dev = trace(de);
    for d in 0..NDIMS {
        s[d] += lambda * dev + 2.0 * shearm * de[d];
    }
    for k in NDIMS..NSTR {
        s[k] += 2.0 * shearm * de[k];
    }
}

/// Viscous stress: deviatoric creep plus an elastic mean part on the
/// accumulated volumetric strain (weak incompressibility enforcement).
fn viscous(bulkm: f64, eta: f64, total_dv: f64, edot: &[f64; NSTR], s: &mut [f64; NSTR]) {
    let dev = trace(edot) / NDIMS as f64;
    for d in 0..NDIMS {
        s[d] = 2.0 * eta * (edot[d] - dev) + bulkm * total_dv;
    }
    for k in NDIMS..NSTR {
        s[k] = 2.0 * eta * edot[k];
    }
}

/// Maxwell viscoelasticity: elastic predictor, deviatoric relaxation.
fn maxwell(
    bulkm: f64,
    shearm: f64,
    eta: f64,
    dt: f64,
    dv: f64,
    de: &[f64; NSTR],
    s: &mut [f64; NSTR],
) {
    let chi = 0.5 * dt * shearm / eta;
    let f1 = 1.0 - chi;
    let f2 = 1.0 / (1.0 + chi);

    let dev = trace(de) / NDIMS as f64;
    let s0 = trace(s) / NDIMS as f64;

    for d in 0..NDIMS {
        s[d] = ((s[d] - s0) * f1 + 2.0 * shearm * (de[d] - dev)) * f2 + s0 + bulkm * dv;
    }
    for k in NDIMS..NSTR {
        s[k] = (s[k] * f1 + 2.0 * shearm * de[k]) * f2;
    }
}

/// Principal stresses of the packed tensor, ascending (most compressive
/// first, tension positive), plus what is needed to rebuild the tensor in
/// the unchanged eigenframe.
#[cfg(not(feature = "three_d"))]
struct Principal {
    p: [f64; NDIMS],
    dd: f64,
    shear: f64,
    radius: f64,
}

#[cfg(not(feature = "three_d"))]
fn principal(s: &[f64; NSTR]) -> Principal {
    let center = 0.5 * (s[0] + s[1]);
    let dd = 0.5 * (s[0] - s[1]);
    let radius = (dd * dd + s[2] * s[2]).sqrt();
    Principal {
        p: [center - radius, center + radius],
        dd,
        shear: s[2],
        radius,
    }
}

#[cfg(not(feature = "three_d"))]
fn recompose(pr: &Principal, p: &[f64; NDIMS], s: &mut [f64; NSTR]) {
    let center = 0.5 * (p[0] + p[1]);
    let radius = 0.5 * (p[1] - p[0]);
    if pr.radius > 1e-30 {
        let scale = radius / pr.radius;
        s[0] = center + pr.dd * scale;
        s[1] = center - pr.dd * scale;
        s[2] = pr.shear * scale;
    } else {
        s[0] = center;
        s[1] = center;
        s[2] = 0.0;
    }
}

#[cfg(feature = "three_d")]
struct Principal {
    p: [f64; NDIMS],
    axes: nalgebra::Matrix3<f64>,
}

#[cfg(feature = "three_d")]
fn principal(s: &[f64; NSTR]) -> Principal {
    use nalgebra::Matrix3;
    let full = unpack(s);
    let m = Matrix3::new(
        full[0][0], full[0][1], full[0][2],
        full[1][0], full[1][1], full[1][2],
        full[2][0], full[2][1], full[2][2],
    );
    let eigen = m.symmetric_eigen();

    // Sort ascending, carrying the eigenvectors along.
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].partial_cmp(&eigen.eigenvalues[b]).unwrap());
    let mut p = [0.0; NDIMS];
    let mut axes = Matrix3::zeros();
    for (k, &i) in order.iter().enumerate() {
        p[k] = eigen.eigenvalues[i];
        axes.set_column(k, &eigen.eigenvectors.column(i).into_owned());
    }
    Principal { p, axes }
}

#[cfg(feature = "three_d")]
fn recompose(pr: &Principal, p: &[f64; NDIMS], s: &mut [f64; NSTR]) {
    use nalgebra::Matrix3;
    let lambda = Matrix3::from_diagonal(&nalgebra::Vector3::new(p[0], p[1], p[2]));
    let m = pr.axes * lambda * pr.axes.transpose();
    for d in 0..NDIMS {
        s[d] = m[(d, d)];
    }
    for (k, &(a, b)) in STR_OFFDIAG.iter().enumerate() {
        s[NDIMS + k] = m[(a, b)];
    }
}

/// Mohr-Coulomb return mapping on the elastic trial stress. Returns the
/// plastic strain increment (zero when the trial state is elastic).
fn elasto_plastic(
    bulkm: f64,
    shearm: f64,
    props: &PlasticProps,
    de: &[f64; NSTR],
    s: &mut [f64; NSTR],
) -> f64 {
    elastic(bulkm, shearm, de, s);

    let sphi = props.friction_angle.sin();
    let spsi = props.dilation_angle.sin();
    let anphi = (1.0 + sphi) / (1.0 - sphi);
    let anpsi = (1.0 + spsi) / (1.0 - spsi);
    let amc = 2.0 * props.cohesion * anphi.sqrt();
    let ten_max = props.tension_max;

    let pr = principal(s);
    let p1 = pr.p[0];
    let p3 = pr.p[NDIMS - 1];

    let fs = p1 - p3 * anphi + amc;
    let ft = p3 - ten_max;
    if fs > 0.0 && ft < 0.0 {
        // Inside the yield envelope.
        return 0.0;
    }

    // The diagonal through the envelope corner separates shear from
    // tensile failure of the trial state.
    let pa = (1.0 + anphi * anphi).sqrt() + anphi;
    let sp = ten_max * anphi - amc;
    let shear_mode = p3 - ten_max + pa * (p1 - sp) < 0.0;

    let a1 = bulkm + 4.0 / 3.0 * shearm;
    let a2 = bulkm - 2.0 / 3.0 * shearm;

    let mut p_new = pr.p;
    let depls;
    if shear_mode {
        let denom = a1 - a2 * anpsi - anphi * (a2 - a1 * anpsi);
        let alam = fs / denom;
        p_new[0] -= alam * (a1 - a2 * anpsi);
        #[cfg(feature = "three_d")]
        {
            p_new[1] -= alam * a2 * (1.0 - anpsi);
        }
        p_new[NDIMS - 1] -= alam * (a2 - a1 * anpsi);

        // Second invariant of the principal plastic strain increments
        // (alam, 0, -alam*anpsi).
        let e1 = alam;
        let e3 = -alam * anpsi;
        let em = (e1 + e3) / 3.0;
        depls = (0.5 * ((e1 - em) * (e1 - em) + em * em + (e3 - em) * (e3 - em))).sqrt();
    } else {
        let alam = ft / a1;
        p_new[0] -= alam * a2;
        #[cfg(feature = "three_d")]
        {
            p_new[1] -= alam * a2;
        }
        p_new[NDIMS - 1] -= alam * a1;

        let em = alam / 3.0;
        depls = (0.5 * (2.0 * em * em + (alam - em) * (alam - em))).sqrt();
    }

    recompose(&pr, &p_new, s);
    depls
}

/// Per-element results collected by the parallel pass and scattered back.
struct StressResult {
    stress: [f64; NSTR],
    strain: [f64; NSTR],
    depls: f64,
}

/// Advance the stress of every element by one step of the configured
/// rheology, accumulating total strain and plastic strain on the way.
#[allow(clippy::too_many_arguments)]
pub fn update_stress(
    mat: &MatProps,
    dt: f64,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    temperature: &ScalarField<f64>,
    mattype: &ScalarField<i32>,
    strain_rate: &VectorField<f64, NSTR>,
    strain: &mut VectorField<f64, NSTR>,
    stress: &mut VectorField<f64, NSTR>,
    plstrain: &mut ScalarField<f64>,
    delta_plstrain: &mut ScalarField<f64>,
) {
    let results: Vec<StressResult> = (0..connectivity.len())
        .into_par_iter()
        .map(|e| {
            let m = mattype[e] as usize;
            let edot = &strain_rate[e];
            let mut de = [0.0; NSTR];
            for k in 0..NSTR {
                de[k] = edot[k] * dt;
            }
            let mut eps = strain[e];
            for k in 0..NSTR {
                eps[k] += de[k];
            }
            let dv = trace(&de);

            // Element mean temperature drives the creep viscosity.
            let conn = &connectivity[e];
            let mut t_elem = 0.0;
            for &n in conn.iter() {
                t_elem += temperature[n];
            }
            t_elem /= NODES_PER_ELEM as f64;

            let bulkm = mat.bulkm(m);
            let shearm = mat.shearm(m);

            let mut s = stress[e];
            let mut depls = 0.0;
            match mat.rheology {
                Rheology::Elastic => {
                    elastic(bulkm, shearm, &de, &mut s);
                }
                Rheology::Viscous => {
                    let eta = mat.visc(m, t_elem, second_invariant(edot));
                    viscous(bulkm, eta, trace(&eps), edot, &mut s);
                }
                Rheology::Maxwell => {
                    let eta = mat.visc(m, t_elem, second_invariant(edot));
                    maxwell(bulkm, shearm, eta, dt, dv, &de, &mut s);
                }
                Rheology::ElastoPlastic => {
                    let props = mat.plastic_props(m, plstrain[e]);
                    depls = elasto_plastic(bulkm, shearm, &props, &de, &mut s);
                }
                Rheology::ElastoViscousPlastic => {
                    let eta = mat.visc(m, t_elem, second_invariant(edot));
                    let mut sv = stress[e];
                    maxwell(bulkm, shearm, eta, dt, dv, &de, &mut sv);

                    let props = mat.plastic_props(m, plstrain[e]);
                    let mut sp = stress[e];
                    let dp = elasto_plastic(bulkm, shearm, &props, &de, &mut sp);

                    // The softer branch carries the stress.
                    if second_invariant(&sv) < second_invariant(&sp) {
                        s = sv;
                    } else {
                        s = sp;
                        depls = dp;
                    }
                }
            }

            StressResult {
                stress: s,
                strain: eps,
                depls,
            }
        })
        .collect();

    for (e, r) in results.into_iter().enumerate() {
        stress[e] = r.stress;
        strain[e] = r.strain;
        delta_plstrain[e] = r.depls;
        plstrain[e] += r.depls;
    }
}

/// Jaumann corotational update: s += dt * (W s - s W), with W the
/// antisymmetric spin from the velocity gradients. Applied once per step
/// after the constitutive update; the trace is preserved exactly.
pub fn rotate_stress(
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    vel: &VectorField<f64, NDIMS>,
    shpgrad: &ScalarField<ShapeGrad>,
    dt: f64,
    stress: &mut VectorField<f64, NSTR>,
) {
    stress
        .as_mut_slice()
        .par_iter_mut()
        .enumerate()
        .for_each(|(e, s)| {
            let conn = &connectivity[e];
            let grad = &shpgrad[e];

            // Spin tensor W[a][b] = 0.5 (dv_a/dx_b - dv_b/dx_a).
            let mut w = [[0.0; NDIMS]; NDIMS];
            for i in 0..NODES_PER_ELEM {
                let v = vel[conn[i]];
                for &(a, b) in STR_OFFDIAG.iter() {
                    w[a][b] += 0.5 * (grad[i][b] * v[a] - grad[i][a] * v[b]);
                }
            }
            for &(a, b) in STR_OFFDIAG.iter() {
                w[b][a] = -w[a][b];
            }

            let m = unpack(s);
            let mut rot = [[0.0; NDIMS]; NDIMS];
            for a in 0..NDIMS {
                for b in 0..NDIMS {
                    for c in 0..NDIMS {
                        rot[a][b] += w[a][c] * m[c][b] - m[a][c] * w[c][b];
                    }
                }
            }

            for d in 0..NDIMS {
                s[d] += dt * rot[d][d];
            }
            for (k, &(a, b)) in STR_OFFDIAG.iter().enumerate() {
                s[NDIMS + k] += dt * rot[a][b];
            }
        });
}

#[cfg(test)]
#[cfg(not(feature = "three_d"))]
mod tests {
    use super::*;
    use crate::constants::DEG2RAD;
    use approx::assert_relative_eq;

    fn single_material(rheology: Rheology) -> MatProps {
        MatProps {
            rheology,
            nmat: 1,
            visc_min: 1e18,
            visc_max: 1e24,
            tension_max: 1e9,
            therm_diff_max: 5e-6,
            rho0: vec![3000.0],
            alpha: vec![0.0],
            bulk_modulus: vec![50e9],
            shear_modulus: vec![30e9],
            visc_exponent: vec![3.0],
            visc_coefficient: vec![1e3],
            visc_activation_energy: vec![350e3],
            heat_capacity: vec![1000.0],
            therm_cond: vec![3.0],
            pls0: vec![0.0],
            pls1: vec![0.5],
            cohesion0: vec![44e6],
            cohesion1: vec![4e6],
            friction_angle0: vec![30.0],
            friction_angle1: vec![5.0],
            dilation_angle0: vec![0.0],
            dilation_angle1: vec![0.0],
        }
    }

    #[test]
    fn test_elastic_uniaxial_increment() {
        let (k, g) = (50e9, 30e9);
        let lambda = k - 2.0 / 3.0 * g;
        let mut s = [0.0; NSTR];
        let mut de = [0.0; NSTR];
        de[0] = 1e-6;
        elastic(k, g, &de, &mut s);
        assert_relative_eq!(s[0], (lambda + 2.0 * g) * 1e-6, max_relative = 1e-12);
        assert_relative_eq!(s[1], lambda * 1e-6, max_relative = 1e-12);
        assert_relative_eq!(s[2], 0.0);
    }

    #[test]
    fn test_maxwell_relaxes_deviatoric_keeps_mean() {
        let (k, g, eta) = (50e9, 30e9, 1e21);
        let mut s = [0.0; NSTR];
        s[0] = 3e6;
        s[1] = 1e6;
        let mean = 2e6;
        let de = [0.0; NSTR];

        let dt = eta / g; // one relaxation time
        maxwell(k, g, eta, dt, 0.0, &de, &mut s);

        let chi = 0.5;
        let factor = (1.0 - chi) / (1.0 + chi);
        assert_relative_eq!(trace(&s) / 2.0, mean, max_relative = 1e-12);
        assert_relative_eq!(s[0] - mean, 1e6 * factor, max_relative = 1e-12);
        assert_relative_eq!(s[1] - mean, -1e6 * factor, max_relative = 1e-12);
    }

    #[test]
    fn test_viscous_stress_is_deviatoric_plus_mean() {
        let (k, eta) = (50e9, 1e20);
        let mut s = [0.0; NSTR];
        let mut edot = [0.0; NSTR];
        edot[0] = 1e-15;
        edot[1] = -1e-15;
        viscous(k, eta, 0.0, &edot, &mut s);
        assert_relative_eq!(s[0], 2.0 * eta * 1e-15, max_relative = 1e-12);
        assert_relative_eq!(s[1], -2.0 * eta * 1e-15, max_relative = 1e-12);
        assert_relative_eq!(trace(&s), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_plastic_return_lands_on_yield_surface() {
        let mat = single_material(Rheology::ElastoPlastic);
        let props = mat.plastic_props(0, 0.0);

        // Strong differential compression that must shear-yield.
        let mut s = [0.0; NSTR];
        let mut de = [0.0; NSTR];
        de[0] = -8e-3;
        de[1] = 4e-3;
        let depls = elasto_plastic(mat.bulkm(0), mat.shearm(0), &props, &de, &mut s);
        assert!(depls > 0.0, "Differential compression must yield");

        let sphi = props.friction_angle.sin();
        let anphi = (1.0 + sphi) / (1.0 - sphi);
        let amc = 2.0 * props.cohesion * anphi.sqrt();
        let pr = principal(&s);
        let fs = pr.p[0] - pr.p[1] * anphi + amc;
        assert_relative_eq!(fs, 0.0, epsilon = amc * 1e-9);
    }

    #[test]
    fn test_tension_cutoff() {
        let mat = single_material(Rheology::ElastoPlastic);
        let props = mat.plastic_props(0, 0.0);
        assert!(props.tension_max < 1e8, "cohesion caps the cutoff at the apex");

        // Near-hydrostatic extension beyond the cutoff: the most tensile
        // principal component is returned exactly onto it.
        let mut s = [0.0; NSTR];
        let mut de = [0.0; NSTR];
        de[0] = 1.2e-3;
        de[1] = 1.0e-3;
        let depls = elasto_plastic(mat.bulkm(0), mat.shearm(0), &props, &de, &mut s);
        assert!(depls > 0.0);
        // The trial state is diagonal with s_xx the largest component.
        assert_relative_eq!(s[0], props.tension_max, max_relative = 1e-9);
        assert_relative_eq!(s[2], 0.0, epsilon = 1.0);
    }

    #[test]
    fn test_elastic_state_untouched_by_plasticity() {
        let mat = single_material(Rheology::ElastoPlastic);
        let props = mat.plastic_props(0, 0.0);
        let mut s = [0.0; NSTR];
        let mut de = [0.0; NSTR];
        de[0] = -1e-7; // small, stays elastic
        let mut s_ref = [0.0; NSTR];
        elastic(mat.bulkm(0), mat.shearm(0), &de, &mut s_ref);
        let depls = elasto_plastic(mat.bulkm(0), mat.shearm(0), &props, &de, &mut s);
        assert_eq!(depls, 0.0);
        for k in 0..NSTR {
            assert_relative_eq!(s[k], s_ref[k]);
        }
    }

    #[test]
    fn test_rotation_preserves_trace() {
        use crate::mesh::geometry::{compute_shape_fn, compute_volume};

        let coord = VectorField::from_vec(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let conn = VectorField::from_vec(vec![[0, 1, 2]]);
        let mut volume = ScalarField::zeros(0);
        compute_volume(&coord, &conn, &mut volume);
        let mut shpgrad = ScalarField::zeros(0);
        compute_shape_fn(&coord, &conn, &volume, &mut shpgrad);

        // Rigid rotation velocity field: v = omega x r.
        let omega = 1e-3;
        let vel = VectorField::from_vec(
            coord.iter().map(|p| [-omega * p[1], omega * p[0]]).collect(),
        );

        let mut stress = VectorField::from_vec(vec![[5e6, -2e6, 1e6]]);
        let before = trace(&stress[0]);
        rotate_stress(&conn, &vel, &shpgrad, 1.0, &mut stress);
        assert_relative_eq!(trace(&stress[0]), before, max_relative = 1e-14);
    }

    #[test]
    fn test_rotation_matches_analytic_spin() {
        use crate::mesh::geometry::{compute_shape_fn, compute_volume};

        let coord = VectorField::from_vec(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let conn = VectorField::from_vec(vec![[0, 1, 2]]);
        let mut volume = ScalarField::zeros(0);
        compute_volume(&coord, &conn, &mut volume);
        let mut shpgrad = ScalarField::zeros(0);
        compute_shape_fn(&coord, &conn, &volume, &mut shpgrad);

        // v_x = g z gives spin W_xz = g/2; for s = diag(s0, 0) the Jaumann
        // increment is ds_xz = -W_xz * ... = s0 * W_xz * dt on the shear
        // component and zero on the trace.
        let g = 1e-4;
        let vel = VectorField::from_vec(coord.iter().map(|p| [g * p[1], 0.0]).collect());
        let s0 = 1e6;
        let mut stress = VectorField::from_vec(vec![[s0, 0.0, 0.0]]);
        let dt = 1.0;
        rotate_stress(&conn, &vel, &shpgrad, dt, &mut stress);

        let w = 0.5 * g;
        // (W s - s W)_xz = -w * s0 with W_xz = +w.
        assert_relative_eq!(stress[0][2], -w * s0 * dt, max_relative = 1e-12);
        assert_relative_eq!(stress[0][0], s0, max_relative = 1e-12);
    }

    #[test]
    fn test_update_stress_accumulates_strain() {
        let mat = single_material(Rheology::Elastic);
        let conn = VectorField::from_vec(vec![[0, 1, 2]]);
        let temperature = ScalarField::from_vec(vec![273.0; 3]);
        let mattype = ScalarField::from_vec(vec![0i32]);
        let mut strain_rate = VectorField::zeros(1);
        strain_rate[0][0] = 1e-15;
        let mut strain = VectorField::zeros(1);
        let mut stress = VectorField::zeros(1);
        let mut plstrain = ScalarField::zeros(1);
        let mut dpls = ScalarField::zeros(1);

        let dt = 1e10;
        update_stress(
            &mat,
            dt,
            &conn,
            &temperature,
            &mattype,
            &strain_rate,
            &mut strain,
            &mut stress,
            &mut plstrain,
            &mut dpls,
        );
        assert_relative_eq!(strain[0][0], 1e-5, max_relative = 1e-12);
        assert!(stress[0][0] > 0.0);
        assert_eq!(plstrain[0], 0.0);
    }
}
