//! Solid mechanics: material tables, kinematics, constitutive updates and
//! force assembly for the explicit time-stepping core.

pub mod force;
pub mod material;
pub mod strain;
pub mod stress;

pub use force::{apply_damping, apply_winkler_foundation, update_force};
pub use material::{MatProps, PlasticProps, Rheology};
pub use strain::{second_invariant, trace, update_strain_rate};
pub use stress::{rotate_stress, update_stress};
