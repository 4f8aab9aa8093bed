pub mod generator;
pub mod read;
pub mod vector;
pub mod write;

pub use generator::{ClusterSnapshot, VersionGenerator};
pub use read::ReadVersion;
pub use vector::{VersionRelation, VersionVector, NON_EXISTING};
pub use write::WriteVersion;
