use crate::cli::RuleEngineScenarioCli;
use clap::Parser;
use surge_runner::prelude::{ScenarioDefinitionBuilder, UserValuesConstraint};

pub struct RuleEngineScenarioDefinitionBuilder<RV: UserValuesConstraint, AV: UserValuesConstraint> {
    inner: ScenarioDefinitionBuilder<RV, AV>,
}

impl<RV: UserValuesConstraint, AV: UserValuesConstraint> RuleEngineScenarioDefinitionBuilder<RV, AV> {
    /// See [ScenarioDefinitionBuilder::new_with_init].
    ///
    /// This function uses [RuleEngineScenarioCli] instead of [surge_runner::prelude::SurgeScenarioCli].
    pub fn new_with_init(name: &str) -> anyhow::Result<Self> {
        env_logger::init();
        Self::new(name, RuleEngineScenarioCli::parse())
    }

    pub fn new(name: &str, cli: RuleEngineScenarioCli) -> anyhow::Result<Self> {
        Ok(Self {
            inner: ScenarioDefinitionBuilder::new(name, cli.try_into()?).add_capture_env("BASE_URL"),
        })
    }

    /// Once the rule engine customisations have been made, use this function to switch back to
    /// configuring default properties for the scenario.
    pub fn into_std(self) -> ScenarioDefinitionBuilder<RV, AV> {
        self.inner
    }
}
