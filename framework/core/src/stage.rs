use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ScenarioConfigError;

/// One phase of a load scenario, as configured.
///
/// Over `duration` the number of active virtual users moves from the previous stage's target to
/// this stage's `target`. The target is signed so that configuration coming from users can be
/// validated rather than silently wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: i64,
}

impl Stage {
    pub fn new(duration: Duration, target: i64) -> Self {
        Self { duration, target }
    }
}

/// How the target concurrency moves between two stage targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
pub enum RampMode {
    /// Interpolate linearly from the previous target to the stage target.
    #[default]
    #[display("linear")]
    Linear,
    /// Jump straight to the stage target when the stage begins.
    #[display("step")]
    Step,
}

/// The lifecycle of a run. Transitions are driven purely by elapsed time against the stage plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RunPhase {
    #[display("idle")]
    Idle,
    #[display("ramping")]
    Ramping,
    #[display("steady")]
    Steady,
    #[display("ramping down")]
    RampingDown,
    #[display("finished")]
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: Duration,
    end: Duration,
    from: u32,
    to: u32,
}

/// A validated, ordered sequence of stages.
#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<Stage>,
    segments: Vec<Segment>,
    ramp_mode: RampMode,
}

impl StagePlan {
    /// Validate the stages and build a plan. Concurrency before the first stage is 0.
    pub fn new(stages: Vec<Stage>, ramp_mode: RampMode) -> Result<Self, ScenarioConfigError> {
        if stages.is_empty() {
            return Err(ScenarioConfigError::NoStages);
        }

        let mut segments = Vec::with_capacity(stages.len());
        let mut start = Duration::ZERO;
        let mut from = 0u32;
        for (index, stage) in stages.iter().enumerate() {
            if stage.duration.is_zero() {
                return Err(ScenarioConfigError::NonPositiveStageDuration {
                    index,
                    duration: stage.duration,
                });
            }
            if stage.target < 0 {
                return Err(ScenarioConfigError::NegativeStageTarget {
                    index,
                    target: stage.target,
                });
            }
            let to = u32::try_from(stage.target).map_err(|_| {
                ScenarioConfigError::StageTargetTooLarge {
                    index,
                    target: stage.target,
                }
            })?;

            let end = start
                .checked_add(stage.duration)
                .ok_or(ScenarioConfigError::StagePlanTooLong { index })?;
            segments.push(Segment {
                start,
                end,
                from,
                to,
            });
            start = end;
            from = to;
        }

        Ok(Self {
            stages,
            segments,
            ramp_mode,
        })
    }

    /// A single stage which holds `target` virtual users for `duration`.
    pub fn constant(duration: Duration, target: u32) -> Result<Self, ScenarioConfigError> {
        Self::new(vec![Stage::new(duration, target as i64)], RampMode::Step)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn ramp_mode(&self) -> RampMode {
        self.ramp_mode
    }

    pub fn total_duration(&self) -> Duration {
        self.segments
            .last()
            .map(|segment| segment.end)
            .unwrap_or_default()
    }

    /// The largest number of virtual users that will be active at any point in the plan.
    pub fn peak_concurrency(&self) -> u32 {
        self.segments
            .iter()
            .map(|segment| segment.to)
            .max()
            .unwrap_or_default()
    }

    /// The target number of active virtual users at `elapsed` into the run.
    ///
    /// The end of each stage is inclusive, so at a stage's end timestamp this returns exactly that
    /// stage's target. After the last stage the last target is held.
    pub fn concurrency_at(&self, elapsed: Duration) -> u32 {
        let Some(segment) = self.segment_at(elapsed) else {
            return self
                .segments
                .last()
                .map(|segment| segment.to)
                .unwrap_or_default();
        };

        match self.ramp_mode {
            RampMode::Step => segment.to,
            RampMode::Linear => {
                let into_stage = elapsed.saturating_sub(segment.start).as_secs_f64();
                let fraction = into_stage / (segment.end - segment.start).as_secs_f64();
                let value =
                    segment.from as f64 + (segment.to as f64 - segment.from as f64) * fraction;
                value.round() as u32
            }
        }
    }

    pub fn phase_at(&self, elapsed: Duration) -> RunPhase {
        if elapsed >= self.total_duration() {
            return RunPhase::Finished;
        }

        match self.segment_at(elapsed) {
            // A step jumps to its target as the stage starts, so there is nothing to ramp.
            Some(_) if self.ramp_mode == RampMode::Step => RunPhase::Steady,
            Some(segment) if segment.to > segment.from => RunPhase::Ramping,
            Some(segment) if segment.to < segment.from => RunPhase::RampingDown,
            Some(_) => RunPhase::Steady,
            None => RunPhase::Finished,
        }
    }

    fn segment_at(&self, elapsed: Duration) -> Option<&Segment> {
        self.segments.iter().find(|segment| elapsed <= segment.end)
    }
}

/// The time reference for one run.
///
/// This is an immutable value that is handed to every virtual user. Reading the target
/// concurrency or phase does not touch any shared mutable state.
#[derive(Debug, Clone)]
pub struct ScenarioClock {
    started: Instant,
    plan: Arc<StagePlan>,
}

impl ScenarioClock {
    /// Start the clock now.
    pub fn start(plan: Arc<StagePlan>) -> Self {
        Self {
            started: Instant::now(),
            plan,
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn target_concurrency(&self) -> u32 {
        self.plan.concurrency_at(self.elapsed())
    }

    pub fn phase(&self) -> RunPhase {
        self.plan.phase_at(self.elapsed())
    }

    pub fn remaining(&self) -> Duration {
        self.plan.total_duration().saturating_sub(self.elapsed())
    }
}
