//! In-memory adapters.

mod pipelines;
mod queue;
mod schedules;

pub use pipelines::MemoryPipelineRepository;
pub use queue::MemoryTaskQueue;
pub use schedules::MemoryScheduleRepository;
