pub mod config;
pub mod database;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod remote;
pub mod scheduler;
pub mod sync;
pub mod utils;
pub mod cli;

pub use config::Config;
pub use database::LocalCache;
pub use models::{AppState, DailyEntry, Goal, Subtask, Widget};
pub use sync::{SyncCoordinator, SyncStatus};
pub use utils::Profile;
