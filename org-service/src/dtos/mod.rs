pub mod organization_units;

pub use organization_units::*;
