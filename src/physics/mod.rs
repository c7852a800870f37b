pub mod thermal;

pub use thermal::{update_temperature, RadiogenicHeating};
