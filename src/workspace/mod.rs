pub mod checkpoint;
pub mod config;
pub mod options;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod workspace;

pub use checkpoint::Checkpoint;
pub use config::WorkspaceConfig;
pub use options::Options;
pub use registry::NameRegistry;
pub use workspace::{opt_file_extension, Workspace};
