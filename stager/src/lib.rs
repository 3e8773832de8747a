pub mod checksum;
pub mod cloud_init;
mod error;
mod source;
mod stager;

pub use cloud_init::CloudInitDocuments;
pub use error::{Result, StagerError};
pub use source::{classify, Scheme};
pub use stager::{ArtifactKind, LocalFile, Stager};
