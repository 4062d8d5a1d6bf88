//! Descomposición de componentes JSX generados por un modelo en fragmentos
//! identificados, parches dirigidos sobre un único elemento y reensamblado
//! en un documento renderizable.

// Núcleo
pub mod assemble;
pub mod decompose;
pub mod identity;
pub mod markup;
pub mod normalize;
pub mod parser;
pub mod patch;
pub mod splice;

// Aplicación
pub mod api;
pub mod app_state;
pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod sanitize;
pub mod store;
pub mod studio;

pub use assemble::{assemble, verify_assembled, ASSEMBLY_MARKER};
pub use decompose::decompose;
pub use identity::{IdGenerator, IdScope, SequentialIds, ShortUuid, IDENTITY_ATTR};
pub use models::{ChangeRecord, Fragment, Project, ProjectStatus};
pub use parser::{parse_source, ParseOutcome};
pub use patch::{apply_patch, PatchError, PatchOutcome, PatchRequest};
pub use splice::{locate, splice, SpliceError};
