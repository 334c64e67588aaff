//! Manufacturer identification.

pub mod manufacturer;

pub use manufacturer::{ManufacturerId, ManufacturerInfo, KNOWN_MANUFACTURERS};
