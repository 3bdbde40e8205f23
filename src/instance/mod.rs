//! Incremental model instances: instantiate once, update through modifiers,
//! solve many times.

pub mod cloner;
pub mod log;
pub mod model_instance;
pub mod modifier;
pub mod options;
pub mod scenario;
pub mod state;

pub use cloner::InstanceCloner;
pub use log::{LogRedirect, SolveOutput};
pub use model_instance::{InterruptHandle, ModelInstance};
pub use modifier::Modifier;
pub use options::SolveOptions;
pub use scenario::ScenarioUnit;
pub use state::InstanceState;
