/// Randomized position and status updates during calamity mode
pub mod status_simulator;

pub use status_simulator::{SimulationPolicy, StatusChange, StatusSimulator, TickReport};
