pub mod plugin_actor;
pub mod registry;
pub mod scheduler;

pub use plugin_actor::{PluginHandle, PluginMessage, PluginRuntime};
pub use registry::{PluginRegistry, RuntimeDeps};
pub use scheduler::{Scheduler, parse_cron};
