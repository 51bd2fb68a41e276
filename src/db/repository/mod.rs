//! Repository layer — entity-scoped database operations.

mod claim;
mod moderation;

pub use claim::*;
pub use moderation::*;
