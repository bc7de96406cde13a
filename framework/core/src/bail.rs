/// Return this error from a virtual user's behaviour to take that virtual user out of the run.
///
/// Failed requests are not a reason to bail, they are recorded as failed outcomes and the loop
/// carries on. Bail when the virtual user can no longer do anything useful, for example when its
/// client could not be constructed. The other virtual users keep running.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct AgentBailError {
    msg: String,
}

impl AgentBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for AgentBailError {
    fn default() -> Self {
        Self::new("Virtual user is bailing")
    }
}
