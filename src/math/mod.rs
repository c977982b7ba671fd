pub mod interpolate;
pub mod physics;
pub mod pi;

pub use interpolate::*;
pub use physics::*;
