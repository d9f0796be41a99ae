//! Domain models for the pharmacy system.

mod medication;
mod prescription;
mod reservation;
mod stock;

pub use medication::*;
pub use prescription::*;
pub use reservation::*;
pub use stock::*;
