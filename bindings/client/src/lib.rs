mod api;
mod client;
mod error;

pub mod prelude {
    pub use crate::api::{
        AttributeType, CategoryValidationRequest, CategoryValidationResponse, ComparisonOperator,
        Condition, EvaluationContext, ExpressionEvaluationRequest, ExpressionEvaluationResponse,
        RuleResult, RuleSetValidationResult, RuleValidationRequest, RuleValidationResponse,
    };
    pub use crate::client::RuleEngineClientInstrumented as RuleEngineClient;
    pub use crate::client::{
        ResponseView, EVALUATE_EXPRESSION, VALIDATE_BY_CATEGORY, VALIDATE_RULE,
    };
    pub use crate::error::{RequestError, RequestResult};
}
