//! Application use cases. Orchestrate domain logic via ports.

pub mod aggregator;
pub mod dispatcher;
pub mod generator;
pub mod pipeline;
pub mod quotes;
pub mod scheduler;

pub use aggregator::RequestAggregator;
pub use dispatcher::{DispatchConfig, TripDispatcher};
pub use generator::CombinationGenerator;
pub use pipeline::PipelineService;
pub use quotes::QuoteService;
pub use scheduler::Scheduler;
