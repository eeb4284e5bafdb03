pub mod ab;
pub mod health;
pub mod interact;
pub mod recommend;
pub mod train;

pub use ab::{ab_dashboard_handler, ab_end_handler, ab_start_handler};
pub use health::{health_handler, ready_handler};
pub use interact::interact_handler;
pub use recommend::recommend_handler;
pub use train::train_handler;
