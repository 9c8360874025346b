pub mod job;

pub use job::{PluginStatus, RunOutcome, RunReport, RunStatus, TriggerAck, TriggerSource};
