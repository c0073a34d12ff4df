//! Stage orchestration for theme-to-video runs.
//!
//! The [`Orchestrator`] owns the run registry, the progress hub and the
//! history store, and implements every control operation. Stage workers run
//! in background tasks and report through per-run progress channels.

pub mod config;
pub mod error;
pub mod fanout;
pub mod orchestrator;
pub mod poller;
pub mod regen;
pub mod registry;
pub mod request;
pub mod retry;
pub mod stages;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use fanout::FanOut;
pub use orchestrator::Orchestrator;
pub use poller::{LongOperationPoller, PollReport};
pub use registry::{Run, RunRegistry, StageOutcome};
pub use request::{
    Ack, ContinueRequest, FinalizeRequest, RegenerateRequest, RegenerateVoicesRequest,
    RunSnapshot, StartRequest, StartResponse, VideosRequest, VoicesRequest,
};
pub use retry::RetryPolicy;
