//! Event bus for live pipeline progress
//!
//! The orchestrator emits an event at every node boundary. Consumers such as
//! the CLI progress printer subscribe to the bus; nothing in the pipeline
//! waits on them.
//!
//! ```rust,ignore
//! let bus = Arc::new(EventBus::with_default_capacity());
//! let mut rx = bus.subscribe();
//! let orchestrator = Orchestrator::new(llm, config)?.with_event_bus(bus.clone());
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use types::PipelineEvent;
