pub mod shape;
pub mod mass;

pub use shape::{Shape, half_height_world};
pub use mass::MassProps;
