pub mod container;
pub mod versioned_value;

pub use container::{DataContainer, VersionedRead};
pub use versioned_value::{DataKey, Value, VersionedValue};
