//! campaign-sim core: synthetic A/B marketing-campaign transactions.

pub mod campaign;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod population;
pub mod rng;
pub mod simulator;
pub mod sink;
pub mod types;
