pub mod aggregate;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logo;
pub mod model;
pub mod parser;
pub mod passes;
pub mod render;
pub mod store;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{EngineConfig, load_config, parse_config};
pub use error::{Degradation, RenderStatus, StoreError};
pub use model::{CompanyProfile, FieldValue, LineItem, LogoResult, PlaceholderMap, RenderRequest};
pub use passes::{Pipeline, PipelineInput, PipelineOutput};
pub use render::{RenderedDocument, Renderer, render_resolved, render_with_defaults};
pub use store::{CachedStore, MemoryStore, OrganizationStore};
