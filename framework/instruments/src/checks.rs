use std::fmt::{Debug, Formatter};
use std::sync::Arc;

type CheckFn<T> = dyn Fn(&T) -> bool + Send + Sync;

/// The result of one named check against one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

/// A named set of boolean checks that are evaluated against every response of one kind.
///
/// Checks never fail a request on their own. Their pass rate is tracked as the `checks` metric.
pub struct Checks<T> {
    checks: Vec<(String, Arc<CheckFn<T>>)>,
}

impl<T> Checks<T> {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn check(mut self, name: impl Into<String>, check: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.checks.push((name.into(), Arc::new(check)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|(name, _)| name.as_str())
    }

    pub fn evaluate(&self, subject: &T) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|(name, check)| CheckResult {
                name: name.clone(),
                passed: check(subject),
            })
            .collect()
    }

    /// Used when there is nothing to check against, for example when the request never got a
    /// response.
    pub fn fail_all(&self) -> Vec<CheckResult> {
        self.names()
            .map(|name| CheckResult {
                name: name.to_string(),
                passed: false,
            })
            .collect()
    }
}

impl<T> Default for Checks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Checks<T> {
    fn clone(&self) -> Self {
        Self {
            checks: self.checks.clone(),
        }
    }
}

impl<T> Debug for Checks<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn evaluate_in_declaration_order() {
        let checks = Checks::<u16>::new()
            .check("status is 200", |status| *status == 200)
            .check("not a server error", |status| *status < 500);

        assert_eq!(
            vec![
                CheckResult {
                    name: "status is 200".to_string(),
                    passed: false
                },
                CheckResult {
                    name: "not a server error".to_string(),
                    passed: true
                },
            ],
            checks.evaluate(&404)
        );
    }

    #[test]
    fn fail_all_marks_every_check() {
        let checks = Checks::<u16>::new().check("a", |_| true).check("b", |_| true);

        assert!(checks.fail_all().iter().all(|result| !result.passed));
        assert_eq!(2, checks.fail_all().len());
    }
}
