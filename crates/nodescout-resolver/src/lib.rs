pub mod error;
pub mod installer;
pub mod plan;
pub mod registry;
pub mod resolver;
pub mod search;

pub use error::{ResolverError, Result};
pub use installer::{GitInstaller, InstallError, InstallItem, InstallOutcome, Installer};
pub use plan::{InstallPlan, PlannedPackage};
pub use registry::{
    FileRegistrySource, HttpRegistrySource, NodeRegistry, RegistryIndex, RegistrySource,
    StaticRegistrySource,
};
pub use resolver::{
    BatchResolution, LocatedPackage, RepositoryResolver, Resolution, ResolutionTier,
    ResolverSettings,
};
pub use search::{
    clean_query_name, CodeSearchItem, CodeSearchResults, GithubCodeSearch, RateLimitHeaders,
    SearchReply, SearchRepository, SearchTransport,
};
