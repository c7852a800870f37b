//! Initial conditions: material layering, weak zones, temperature and the
//! lithostatic stress state.
//!
//! Weak zones are tagged variants with a single `contains` test; the value
//! aspect (uniform vs Gaussian-weighted plastic strain) is a second variant
//! applied multiplicatively at the same site.

use crate::config::Param;
use crate::constants::{DEG2RAD, NDIMS, NODES_PER_ELEM, NSTR, YEAR2SEC};
use crate::mechanics::material::MatProps;
use crate::mesh::fields::{ScalarField, VectorField};
use crate::mesh::geometry::element_center;
use crate::utils::erf;

/// Geometric region of prescribed initial plastic strain.
#[derive(Debug, Clone)]
pub enum Zone {
    Empty,
    Planar {
        center: [f64; NDIMS],
        azimuth_tan: f64,
        inclination_cot: f64,
        halfwidth: f64,
        #[cfg(feature = "three_d")]
        y_range: (f64, f64),
        z_range: (f64, f64),
    },
    Ellipsoidal {
        center: [f64; NDIMS],
        semi_axis2: [f64; NDIMS],
    },
    GaussianPoint {
        center: [f64; NDIMS],
        std_dev: f64,
    },
}

impl Zone {
    pub fn contains(&self, x: &[f64; NDIMS]) -> bool {
        match self {
            Zone::Empty => false,
            Zone::Planar {
                center,
                azimuth_tan,
                inclination_cot,
                halfwidth,
                #[cfg(feature = "three_d")]
                y_range,
                z_range,
            } => {
                let z = x[NDIMS - 1];
                if z <= z_range.0 || z >= z_range.1 {
                    return false;
                }
                #[cfg(feature = "three_d")]
                {
                    if x[1] <= y_range.0 || x[1] >= y_range.1 {
                        return false;
                    }
                }
                let mut dist = x[0] - center[0] + inclination_cot * (z - center[NDIMS - 1]);
                #[cfg(feature = "three_d")]
                {
                    dist -= azimuth_tan * (x[1] - center[1]);
                }
                #[cfg(not(feature = "three_d"))]
                let _ = azimuth_tan;
                dist.abs() < *halfwidth
            }
            Zone::Ellipsoidal { center, semi_axis2 } => {
                let mut r = 0.0;
                for d in 0..NDIMS {
                    r += (x[d] - center[d]) * (x[d] - center[d]) / semi_axis2[d];
                }
                r < 1.0
            }
            Zone::GaussianPoint { center, std_dev } => {
                let mut r2 = 0.0;
                for d in 0..NDIMS {
                    r2 += (x[d] - center[d]) * (x[d] - center[d]);
                }
                r2 < 16.0 * std_dev * std_dev
            }
        }
    }
}

/// Weight applied to the prescribed plastic strain inside a zone.
#[derive(Debug, Clone)]
pub enum ZoneValue {
    Constant,
    Gaussian {
        center: [f64; NDIMS],
        std_dev: f64,
    },
}

impl ZoneValue {
    pub fn value(&self, x: &[f64; NDIMS]) -> f64 {
        match self {
            ZoneValue::Constant => 1.0,
            ZoneValue::Gaussian { center, std_dev } => {
                let mut r2 = 0.0;
                for d in 0..NDIMS {
                    r2 += (x[d] - center[d]) * (x[d] - center[d]);
                }
                (-r2 / (2.0 * std_dev * std_dev)).exp()
            }
        }
    }
}

fn weakzone_center(param: &Param) -> [f64; NDIMS] {
    let mut center = [0.0; NDIMS];
    center[0] = param.ic.weakzone_xcenter * param.mesh.xlength;
    #[cfg(feature = "three_d")]
    {
        center[1] = param.ic.weakzone_ycenter * param.mesh.ylength;
    }
    center[NDIMS - 1] = -param.ic.weakzone_zcenter * param.mesh.zlength;
    center
}

/// Build the configured weak zone and its value weighting.
pub fn make_weakzone(param: &Param) -> Result<(Zone, ZoneValue), String> {
    let ic = &param.ic;
    match ic.weakzone_option {
        0 => Ok((Zone::Empty, ZoneValue::Constant)),
        1 => {
            let center = weakzone_center(param);
            Ok((
                Zone::Planar {
                    center,
                    azimuth_tan: (ic.weakzone_azimuth * DEG2RAD).tan(),
                    inclination_cot: 1.0 / (ic.weakzone_inclination * DEG2RAD).tan(),
                    halfwidth: ic.weakzone_halfwidth * param.mesh.resolution,
                    #[cfg(feature = "three_d")]
                    y_range: (
                        ic.weakzone_y_min * param.mesh.ylength,
                        ic.weakzone_y_max * param.mesh.ylength,
                    ),
                    z_range: (
                        -ic.weakzone_depth_max * param.mesh.zlength,
                        -ic.weakzone_depth_min * param.mesh.zlength,
                    ),
                },
                ZoneValue::Constant,
            ))
        }
        2 => {
            let center = weakzone_center(param);
            let mut semi_axis2 = [0.0; NDIMS];
            semi_axis2[0] = ic.weakzone_xsemi_axis * ic.weakzone_xsemi_axis;
            #[cfg(feature = "three_d")]
            {
                semi_axis2[1] = ic.weakzone_ysemi_axis * ic.weakzone_ysemi_axis;
            }
            semi_axis2[NDIMS - 1] = ic.weakzone_zsemi_axis * ic.weakzone_zsemi_axis;
            Ok((Zone::Ellipsoidal { center, semi_axis2 }, ZoneValue::Constant))
        }
        3 => {
            let center = weakzone_center(param);
            let std_dev = ic.weakzone_standard_deviation;
            Ok((
                Zone::GaussianPoint { center, std_dev },
                ZoneValue::Gaussian { center, std_dev },
            ))
        }
        other => Err(format!("unknown ic.weakzone_option: {}", other)),
    }
}

/// Seed the initial plastic strain inside the weak zone.
pub fn initial_weakzone(
    param: &Param,
    coord: &VectorField<f64, NDIMS>,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    plstrain: &mut ScalarField<f64>,
) -> Result<(), String> {
    let (zone, value) = make_weakzone(param)?;
    for (e, conn) in connectivity.iter().enumerate() {
        let center = element_center(coord, conn);
        if zone.contains(&center) {
            plstrain[e] = param.ic.weakzone_plstrain * value.value(&center);
        }
    }
    Ok(())
}

/// Material tag per element from the layered depth table; elements below
/// the last listed depth keep the last material.
pub fn initial_material(
    param: &Param,
    coord: &VectorField<f64, NDIMS>,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
) -> ScalarField<i32> {
    let ic = &param.ic;
    let mut mattype = ScalarField::zeros(connectivity.len());
    if ic.layer_mattypes.is_empty() {
        return mattype;
    }
    for (e, conn) in connectivity.iter().enumerate() {
        let depth = -element_center(coord, conn)[NDIMS - 1];
        let mut m = ic.layer_mattypes[ic.layer_mattypes.len() - 1];
        for (i, &top_depth) in ic.mattype_layer_depths.iter().enumerate() {
            if depth >= top_depth {
                m = ic.layer_mattypes[(i + 1).min(ic.layer_mattypes.len() - 1)];
            }
        }
        // Depths above the first listed interface belong to layer 0.
        if depth < ic.mattype_layer_depths.first().copied().unwrap_or(f64::MAX) {
            m = ic.layer_mattypes[0];
        }
        mattype[e] = m;
    }
    mattype
}

/// Initial temperature field.
///
/// Option 0: oceanic half-space cooling with the plate age;
/// option 1: continental geotherm with folded radiogenic production;
/// option 90: raw binary file of nnode doubles.
pub fn initial_temperature(
    param: &Param,
    mat: &MatProps,
    coord: &VectorField<f64, NDIMS>,
    temperature: &mut ScalarField<f64>,
) -> Result<(), String> {
    let t_top = param.bc.surface_temperature;
    let t_bot = param.bc.mantle_temperature;
    temperature.resize(coord.len());

    match param.ic.temperature_option {
        0 => {
            let age = param.ic.oceanic_plate_age_in_yr * YEAR2SEC;
            let diffusivity = mat.therm_cond[0] / (mat.rho0[0] * mat.cp(0));
            let scale = (4.0 * diffusivity * age).sqrt();
            for n in 0..coord.len() {
                let w = -coord[n][NDIMS - 1] / scale;
                temperature[n] = t_top + (t_bot - t_top) * erf(w);
            }
            Ok(())
        }
        1 => {
            let ic = &param.ic;
            let pi = std::f64::consts::PI;
            let crust = param.mat.mattype_crust as usize;
            let mantle = param.mat.mattype_mantle as usize;

            let dens_c = mat.rho0[crust.min(mat.rho0.len() - 1)];
            let dens_m = mat.rho0[mantle.min(mat.rho0.len() - 1)];
            let cond_c = mat.therm_cond[crust.min(mat.therm_cond.len() - 1)];
            let cond_m = mat.therm_cond[mantle.min(mat.therm_cond.len() - 1)];
            let diff_m = cond_m / 1000.0 / dens_m;

            let age = ic.continental_plate_age_in_yr * YEAR2SEC;
            let hs = ic.radiogenic_heating_of_crust;
            let hr = ic.radiogenic_folding_depth;
            let hc = ic.radiogenic_crustal_thickness;
            let hl = ic.lithospheric_thickness;
            if hr <= 0.0 || hc <= 0.0 || hl <= 0.0 {
                return Err(
                    "continental geotherm needs positive radiogenic depths and thickness"
                        .to_string(),
                );
            }

            let tr = dens_c * hs * hr * hr / cond_c * (1.0 - (-hc / hr).exp()).exp();
            let q_m = (t_bot - t_top - tr) / (hc / cond_c + (hl - hc) / cond_m);
            let tm = t_top + (q_m / cond_c) * hc + tr;
            let tau_d = hl * hl / (pi * pi * diff_m);

            for n in 0..coord.len() {
                let y = -coord[n][NDIMS - 1];
                let tss = if y <= hc {
                    t_top + (q_m / cond_c) * y
                        + (dens_c * hs * hr * hr / cond_c) * (1.0 - (-y / hr).exp()).exp()
                } else {
                    tm + (q_m / cond_m) * (y - hc)
                };
                let mut tt = 0.0;
                let mut pp = -1.0;
                for k in 1..101 {
                    let an = k as f64;
                    pp = -pp;
                    tt += pp / an * (-an * an * age / tau_d).exp() * (pi * an * (hl - y) / hl).sin();
                }
                let mut t = tss + 2.0 / pi * (t_bot - t_top) * tt;
                if t > t_bot || y >= hl {
                    t = t_bot;
                }
                if y == 0.0 {
                    t = t_top;
                }
                temperature[n] = t;
            }
            Ok(())
        }
        90 => {
            let bytes = std::fs::read(&param.ic.temperature_filename).map_err(|e| {
                format!(
                    "cannot read temperature file '{}': {}",
                    param.ic.temperature_filename, e
                )
            })?;
            if bytes.len() != coord.len() * 8 {
                return Err(format!(
                    "temperature file '{}' holds {} bytes, expected {}",
                    param.ic.temperature_filename,
                    bytes.len(),
                    coord.len() * 8
                ));
            }
            for (n, chunk) in bytes.chunks_exact(8).enumerate() {
                temperature[n] = f64::from_ne_bytes(chunk.try_into().unwrap());
            }
            Ok(())
        }
        other => Err(format!("unknown ic.temperature_option: {}", other)),
    }
}

/// Reference lithostatic pressure at height z (z <= 0).
pub fn ref_pressure(param: &Param, mat: &MatProps, z: f64) -> f64 {
    mat.rho0[0] * param.control.gravity * (-z)
}

/// Lithostatic initial stress and strain; returns the compensation
/// pressure at the domain bottom (zero without gravity).
pub fn initial_stress_state(
    param: &Param,
    mat: &MatProps,
    coord: &VectorField<f64, NDIMS>,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    mattype: &ScalarField<i32>,
    stress: &mut VectorField<f64, NSTR>,
    strain: &mut VectorField<f64, NSTR>,
) -> f64 {
    if param.control.gravity == 0.0 {
        return 0.0;
    }

    for (e, conn) in connectivity.iter().enumerate() {
        let zcenter = element_center(coord, conn)[NDIMS - 1];
        let m = mattype[e] as usize;

        // Option 0 presses with the 0-th material everywhere; options 1 and
        // 2 use each element's own material.
        let (rho, ks) = if param.control.ref_pressure_option == 0 {
            (mat.rho0[0], mat.bulkm(0))
        } else {
            (mat.rho0[m], mat.bulkm(m))
        };
        let p = rho * param.control.gravity * (-zcenter);

        for d in 0..NDIMS {
            stress[e][d] = -p;
            strain[e][d] = -p / ks / NDIMS as f64;
        }
    }

    ref_pressure(param, mat, -param.mesh.zlength)
}

#[cfg(test)]
#[cfg(not(feature = "three_d"))]
mod tests {
    use super::*;

    #[test]
    fn test_empty_zone_contains_nothing() {
        let zone = Zone::Empty;
        assert!(!zone.contains(&[0.0; NDIMS]));
    }

    #[test]
    fn test_planar_zone_band() {
        // A vertical fault band of half-width 100 m through x = 1000.
        let zone = Zone::Planar {
            center: [1000.0, -500.0],
            azimuth_tan: 0.0,
            inclination_cot: 0.0,
            halfwidth: 100.0,
            z_range: (-1000.0, 0.0),
        };
        assert!(zone.contains(&[1050.0, -500.0]));
        assert!(!zone.contains(&[1200.0, -500.0]));
        assert!(!zone.contains(&[1000.0, -1500.0]), "Below the depth range");
    }

    #[test]
    fn test_ellipsoidal_zone() {
        let zone = Zone::Ellipsoidal {
            center: [0.0, 0.0],
            semi_axis2: [100.0 * 100.0, 50.0 * 50.0],
        };
        assert!(zone.contains(&[50.0, 0.0]));
        assert!(!zone.contains(&[0.0, 60.0]));
    }

    #[test]
    fn test_gaussian_value_peaks_at_center() {
        let value = ZoneValue::Gaussian {
            center: [0.0, 0.0],
            std_dev: 100.0,
        };
        assert!((value.value(&[0.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(value.value(&[100.0, 0.0]) < 1.0);
        let zone = Zone::GaussianPoint {
            center: [0.0, 0.0],
            std_dev: 100.0,
        };
        assert!(zone.contains(&[300.0, 0.0]));
        assert!(!zone.contains(&[500.0, 0.0]), "Cut off at 4 sigma");
    }
}
