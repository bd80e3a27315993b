pub mod database;
pub mod metrics;
pub mod organization;
pub mod tree;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use organization::OrganizationService;
