pub mod asset;
pub mod claim;
pub mod enums;
pub mod moderation;
pub mod recognition;

pub use asset::*;
pub use claim::*;
pub use enums::*;
pub use moderation::*;
pub use recognition::*;

/// Uncanonicalized field bag, keyed by schema field name.
pub type RawFieldBag = std::collections::BTreeMap<String, String>;
