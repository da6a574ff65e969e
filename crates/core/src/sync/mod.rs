//! Sync domain models and collaborator contracts.

mod record_model;
mod record_traits;
mod session_model;
mod sync_engine_model;
mod sync_scheduler;

pub use record_model::*;
pub use record_traits::*;
pub use session_model::*;
pub use sync_engine_model::*;
pub use sync_scheduler::*;
