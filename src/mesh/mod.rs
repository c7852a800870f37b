pub mod fields;
pub mod generator;
pub mod geometry;
pub mod quality;
pub mod topology;
pub mod triangulate;

pub use fields::{ScalarField, VectorField};
pub use generator::{MeshBuffers, MeshSource, StructuredGenerator};
pub use geometry::ShapeGrad;
