//! Mode lifecycle management
//!
//! Owns the single active streaming mode and drives transitions:
//! - Inactive: no mode, no workers
//! - Switching: teardown of the old mode and startup of the new one
//! - Active: one mode with exactly the workers it declares

mod machine;
mod status;

pub use machine::ModeManager;
pub use status::ModeStatus;
