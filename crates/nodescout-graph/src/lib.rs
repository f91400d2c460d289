pub mod error;
pub mod metadata;
pub mod model;
pub mod normalize;
pub mod semantic;

pub use error::{GraphFormatError, Result};
pub use metadata::{load_workflow, source_for_path, JsonFileSource, MetadataSource, PngMetadataSource};
pub use model::{InputBinding, InputSlot, Link, LinkTarget, Node, OutputSlot, WorkflowGraph};
pub use normalize::{detect_shape, normalize, parse_workflow, WorkflowShape};
pub use semantic::{
    build_views, AuxiliaryModel, CapabilityFlags, Polarity, PromptEntry, PromptSet, SemanticViews,
};
