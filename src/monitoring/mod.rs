pub mod instrument;
pub mod orchestrator;
pub mod poller;
pub mod scorer;
pub mod volume;

pub use orchestrator::TrackingOrchestrator;
pub use poller::PollingMonitor;
