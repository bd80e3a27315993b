pub mod organization_unit;
pub mod tenant;

pub use organization_unit::*;
pub use tenant::*;
