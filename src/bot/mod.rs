pub mod metrics;
pub mod orchestrator;
pub mod sampler;
pub mod scheduler;

pub use metrics::BotMetrics;
pub use orchestrator::SwapBot;
pub use sampler::CycleSampler;
pub use scheduler::{BotCommand, BotEvent, BotScheduler, SchedulerCore, SchedulerState};
