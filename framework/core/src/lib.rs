mod bail;
mod error;
mod shutdown;
mod stage;

pub mod prelude {
    pub use crate::bail::AgentBailError;
    pub use crate::error::ScenarioConfigError;
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
    pub use crate::stage::{RampMode, RunPhase, ScenarioClock, Stage, StagePlan};
}
