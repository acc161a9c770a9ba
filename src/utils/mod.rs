pub mod ids;
pub mod rng;
