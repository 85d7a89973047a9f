//! Domain model module declarations.

pub mod agent;
pub mod queue;
pub mod task;

pub use agent::{AgentId, AgentIdentity, AgentRole};
pub use queue::{Queue, QueueName};
pub use task::{FrontMatter, Priority, TaskKind, TaskRecord, TaskStatus};
