pub mod cache;
pub mod classifier;
pub mod error;
pub mod scanner;
pub mod snapshot;

pub use cache::{CacheMetadata, CensusCache};
pub use classifier::{split_decorated, NodeClassifier};
pub use error::{CensusError, Result};
pub use scanner::{
    list_packages, CensusReport, NodeCensus, SkippedPackage, BUILTIN_FILES, KNOWN_BUILTINS,
};
pub use snapshot::{CensusSnapshot, CensusSummary};
