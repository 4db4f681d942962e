pub mod factory;

pub use factory::{ProbeFactory, ProbeFactoryError};
