use std::time::Duration;

/// A problem with the scenario configuration. These are all detected before any virtual user
/// starts and abort the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScenarioConfigError {
    #[error("A scenario needs at least one stage")]
    NoStages,
    #[error("Stage {index} has a duration of {duration:?}, stages must have a positive duration")]
    NonPositiveStageDuration { index: usize, duration: Duration },
    #[error("Stage {index} has a target of {target}, targets cannot be negative")]
    NegativeStageTarget { index: usize, target: i64 },
    #[error("Stage {index} has a target of {target}, the most virtual users a stage can have is {max}", max = u32::MAX)]
    StageTargetTooLarge { index: usize, target: i64 },
    #[error("Stage {index} ends too far after the start of the run to be scheduled")]
    StagePlanTooLong { index: usize },
    #[error("Invalid stage definition `{input}`: {reason}")]
    InvalidStage { input: String, reason: String },
    #[error("Threshold references unknown metric `{0}`")]
    UnknownMetric(String),
    #[error("Invalid threshold `{expression}` for metric `{metric}`: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },
}
