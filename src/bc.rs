//! Velocity boundary conditions.
//!
//! Each of the seven boundary classes carries a type and a value:
//! - 0: free (no constraint);
//! - 1: normal component fixed to the value, tangential free;
//! - 2: normal free, tangential fixed to zero;
//! - 3: normal fixed to the value, tangential fixed to zero.
//!
//! The x-boundary magnitudes can follow a piecewise-constant time schedule
//! (`vbc_period_*`): the ratio of the last period whose start time is not
//! past the current time scales the value multiplicatively.
//!
//! Velocity BCs are re-imposed after every velocity update so prescribed
//! components are bit-equal to their target. Winkler/elastic foundations
//! alter forces, not velocities, and live in `mechanics::force`.

use crate::config::BcParam;
use crate::constants::{IBOUNDX0, IBOUNDX1, IBOUNDY0, IBOUNDY1, NBDRYTYPES, NDIMS};
use crate::mesh::fields::{ScalarField, VectorField};
use crate::mesh::topology::boundary_normal_dim;
use crate::utils::seconds_to_years;

/// Resolved velocity boundary conditions for all boundary classes.
#[derive(Debug, Clone)]
pub struct VbcSpec {
    pub types: [i32; NBDRYTYPES],
    pub values: [f64; NBDRYTYPES],
    /// (start time in yr, ratio) pairs for the x0/x1 boundary magnitudes.
    pub periods_x0: Vec<(f64, f64)>,
    pub periods_x1: Vec<(f64, f64)>,
}

impl VbcSpec {
    pub fn from_config(bc: &BcParam) -> Result<Self, String> {
        let mut types = [0i32; NBDRYTYPES];
        let mut values = [0.0; NBDRYTYPES];

        types[IBOUNDX0] = bc.vbc_x0;
        types[IBOUNDX1] = bc.vbc_x1;
        types[IBOUNDY0] = bc.vbc_y0;
        types[IBOUNDY1] = bc.vbc_y1;
        types[crate::constants::IBOUNDZ0] = bc.vbc_z0;
        types[crate::constants::IBOUNDZ1] = bc.vbc_z1;

        for (k, &t) in types.iter().enumerate() {
            if !(0..=3).contains(&t) {
                return Err(format!("vbc type {} on boundary {} is not in 0..=3", t, k));
            }
        }

        // Unset x values default to a divergent +/- max_vbc_val pair.
        values[IBOUNDX0] = bc.vbc_val_x0.unwrap_or(-bc.max_vbc_val);
        values[IBOUNDX1] = bc.vbc_val_x1.unwrap_or(bc.max_vbc_val);
        values[IBOUNDY0] = bc.vbc_val_y0.unwrap_or(0.0);
        values[IBOUNDY1] = bc.vbc_val_y1.unwrap_or(0.0);
        values[crate::constants::IBOUNDZ0] = bc.vbc_val_z0.unwrap_or(0.0);
        values[crate::constants::IBOUNDZ1] = bc.vbc_val_z1.unwrap_or(0.0);

        let build_periods = |times: &[f64], ratios: &[f64], name: &str| {
            if times.len() != ratios.len() {
                return Err(format!(
                    "{}: {} period times vs {} ratios",
                    name,
                    times.len(),
                    ratios.len()
                ));
            }
            if times.windows(2).any(|w| w[1] <= w[0]) {
                return Err(format!("{}: period times must be increasing", name));
            }
            Ok(times.iter().copied().zip(ratios.iter().copied()).collect())
        };
        let periods_x0 = build_periods(
            &bc.vbc_period_x0_time_in_yr,
            &bc.vbc_period_x0_ratio,
            "vbc_period_x0",
        )?;
        let periods_x1 = build_periods(
            &bc.vbc_period_x1_time_in_yr,
            &bc.vbc_period_x1_ratio,
            "vbc_period_x1",
        )?;

        Ok(Self {
            types,
            values,
            periods_x0,
            periods_x1,
        })
    }

    /// Largest prescribed velocity magnitude (used by the dt controller).
    pub fn max_vbc_val(&self) -> f64 {
        let mut max = 0.0f64;
        for k in 0..NBDRYTYPES {
            if self.types[k] == 1 || self.types[k] == 3 {
                max = max.max(self.values[k].abs());
            }
        }
        max
    }

    fn ratio(periods: &[(f64, f64)], time_yr: f64) -> f64 {
        let mut r = 1.0;
        for &(start, ratio) in periods {
            if time_yr >= start {
                r = ratio;
            }
        }
        r
    }

    /// Clamp prescribed velocity components. `time` is in seconds.
    pub fn apply_vbcs(
        &self,
        time: f64,
        bcflag: &ScalarField<u32>,
        vel: &mut VectorField<f64, NDIMS>,
    ) {
        let time_yr = seconds_to_years(time);
        let ratio_x0 = Self::ratio(&self.periods_x0, time_yr);
        let ratio_x1 = Self::ratio(&self.periods_x1, time_yr);

        for n in 0..vel.len() {
            let flag = bcflag[n];
            if flag == 0 {
                continue;
            }
            for k in 0..NBDRYTYPES {
                if flag & (1 << k) == 0 {
                    continue;
                }
                if NDIMS == 2 && (k == IBOUNDY0 || k == IBOUNDY1) {
                    continue;
                }
                let d = boundary_normal_dim(k);
                let mut v = self.values[k];
                if k == IBOUNDX0 {
                    v *= ratio_x0;
                } else if k == IBOUNDX1 {
                    v *= ratio_x1;
                }
                match self.types[k] {
                    1 => vel[n][d] = v,
                    2 => {
                        for dd in 0..NDIMS {
                            if dd != d {
                                vel[n][dd] = 0.0;
                            }
                        }
                    }
                    3 => {
                        vel[n][d] = v;
                        for dd in 0..NDIMS {
                            if dd != d {
                                vel[n][dd] = 0.0;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[cfg(not(feature = "three_d"))]
mod tests {
    use super::*;
    use crate::constants::{BOUNDX0, BOUNDX1, BOUNDZ1};

    fn base_vbc() -> VbcSpec {
        VbcSpec {
            types: [1, 1, 0, 0, 0, 0, 0],
            values: [-1e-9, 1e-9, 0.0, 0.0, 0.0, 0.0, 0.0],
            periods_x0: Vec::new(),
            periods_x1: Vec::new(),
        }
    }

    #[test]
    fn test_prescribed_components_are_bit_equal() {
        let vbc = base_vbc();
        let bcflag = ScalarField::from_vec(vec![BOUNDX0, BOUNDX1, 0]);
        let mut vel = VectorField::from_vec(vec![
            [3.0e-10, 7.0e-10],
            [-2.0e-10, 1.0e-10],
            [5.0e-10, 5.0e-10],
        ]);
        vbc.apply_vbcs(0.0, &bcflag, &mut vel);

        assert_eq!(vel[0][0], -1e-9);
        assert_eq!(vel[1][0], 1e-9);
        // Tangential components and interior nodes are untouched.
        assert_eq!(vel[0][1], 7.0e-10);
        assert_eq!(vel[2][0], 5.0e-10);
    }

    #[test]
    fn test_type3_fixes_all_components() {
        let mut vbc = base_vbc();
        vbc.types[crate::constants::IBOUNDZ1] = 3;
        let bcflag = ScalarField::from_vec(vec![BOUNDZ1]);
        let mut vel = VectorField::from_vec(vec![[1.0, 2.0]]);
        vbc.apply_vbcs(0.0, &bcflag, &mut vel);
        assert_eq!(vel[0], [0.0, 0.0]);
    }

    #[test]
    fn test_corner_node_gets_both_boundaries() {
        let mut vbc = base_vbc();
        vbc.types[crate::constants::IBOUNDZ1] = 1;
        let bcflag = ScalarField::from_vec(vec![BOUNDX0 | BOUNDZ1]);
        let mut vel = VectorField::from_vec(vec![[9.9, 9.9]]);
        vbc.apply_vbcs(0.0, &bcflag, &mut vel);
        assert_eq!(vel[0][0], -1e-9, "x0 clamps the x component");
        assert_eq!(vel[0][1], 0.0, "z1 clamps the z component");
    }

    #[test]
    fn test_period_schedule_scales_magnitude() {
        let mut vbc = base_vbc();
        vbc.periods_x0 = vec![(0.0, 1.0), (1000.0, 0.5)];
        let bcflag = ScalarField::from_vec(vec![BOUNDX0]);

        let mut vel = VectorField::zeros(1);
        vbc.apply_vbcs(crate::utils::years_to_seconds(500.0), &bcflag, &mut vel);
        assert_eq!(vel[0][0], -1e-9);

        vbc.apply_vbcs(crate::utils::years_to_seconds(2000.0), &bcflag, &mut vel);
        assert_eq!(vel[0][0], -0.5e-9);
    }

    #[test]
    fn test_max_vbc_val() {
        let vbc = base_vbc();
        assert_eq!(vbc.max_vbc_val(), 1e-9);
    }
}
