//! Route configuration
//!
//! Route handlers live next to the functionality they expose
//! (`progress::handlers`, `realtime::subscription`); this module only
//! assembles them into the router.

/// Main router creation
pub mod router;

pub use router::create_router;
