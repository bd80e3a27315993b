pub mod health;
pub mod organization_units;

pub use health::*;
pub use organization_units::*;
