//! Business operations over the inventory hierarchy.

// Hierarchy
pub mod laboratories;
pub mod sections;
pub mod storages;

// Stock and its audit trail
pub mod items;
pub mod movements;
pub mod recorder;

// Read-side helpers
pub mod location;
pub mod stats;
