//! Persistent model of the containment hierarchy and its audit trail.
//!
//! Laboratory → Storage → Section → Item form the physical tree; Movement rows
//! record every change to an item's quantity or section, and User identifies
//! who performed it.

pub mod item;
pub mod laboratory;
pub mod movement;
pub mod section;
pub mod storage;
pub mod user;

pub use movement::MovementType;
pub use section::SectionStatus;
pub use storage::StorageStatus;
pub use user::Role;
