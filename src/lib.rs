//! Explicit Lagrangian finite-element solver for large-deformation
//! geodynamics on simplicial meshes (triangles in 2D, tetrahedra behind
//! the `three_d` feature), with quality-triggered remeshing and
//! conservative old-to-new field transfer.

pub mod bc;
pub mod config;
pub mod constants;
pub mod ic;
pub mod mechanics;
pub mod mesh;
pub mod output;
pub mod physics;
pub mod remesh;
pub mod simulation;
pub mod timestepping;
pub mod utils;

pub use config::Param;
pub use mechanics::{MatProps, Rheology};
pub use mesh::{MeshBuffers, MeshSource, ScalarField, StructuredGenerator, VectorField};
pub use remesh::{bad_mesh_quality, remesh, BadMesh};
pub use simulation::{init, restart, run, step, Variables};
