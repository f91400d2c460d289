pub mod error;
pub mod file_collect;
pub mod language;
pub mod lower;
pub mod symbolic;
pub mod syntax;

pub use error::{ParseError, Result};
pub use file_collect::collect_python_files;
pub use language::{create_parser, is_python_file, parse_python};
pub use lower::{lower_file, lower_source};
pub use symbolic::{
    build_import_map, literal_mapping, python_format, ImportTarget, ResolutionStack,
    SymbolicResolver, Value,
};
pub use syntax::{DictItem, Expr, FStringPart, ImportAlias, Keyword, Module, Param, Stmt, Target};
