//! Attachment specs: parsing route expressions and resolving them to files.

pub mod error;
pub mod parser;
pub mod resolver;
pub mod types;

pub use error::{CollectionEntryError, ParseError, ResolutionError};
pub use parser::{derive_alias, parse, parse_route};
pub use resolver::{AttachmentResolver, resolve};
pub use types::{
    AttachmentSpec, Destination, RawRoute, ResolvedFile, SpecKind, SpecSource, TemplateBinding,
};
