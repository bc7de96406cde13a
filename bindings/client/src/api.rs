use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Values made available to an expression or rule, keyed by attribute code such as
/// `customer.age`.
pub type EvaluationContext = BTreeMap<String, Value>;

/// The service writes empty collections as `null` as well as leaving them out.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// The data types that rule attributes can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Date,
    Datetime,
    Decimal,
}

/// Comparison operators understood by rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComparisonOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

/// Body of `POST /api/expressions/evaluate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionEvaluationRequest {
    /// Evaluate a stored expression instead of `expression_string`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_id: Option<String>,
    pub expression_string: String,
    pub context: EvaluationContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionEvaluationResponse {
    #[serde(default)]
    pub value: Value,
    #[serde(default, rename = "type")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub attribute_code: String,
    pub attribute_type: AttributeType,
    pub operator: ComparisonOperator,
    pub target_value: Value,
}

/// Body of `POST /api/rules/validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleValidationRequest {
    pub rule_id: String,
    pub rule_name: String,
    pub conditions: Vec<Condition>,
    pub context: EvaluationContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleValidationResponse {
    pub passed: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: BTreeMap<String, Value>,
}

/// Body of `POST /api/rule-sets/validate-by-category`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryValidationRequest {
    pub rule_category: String,
    pub context_map: EvaluationContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryValidationResponse {
    pub passed: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub rule_category: Option<String>,
    #[serde(default)]
    pub total_rule_sets: u32,
    #[serde(default)]
    pub passed_rule_sets: u32,
    #[serde(default)]
    pub failed_rule_sets: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rule_set_results: Vec<RuleSetValidationResult>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetValidationResult {
    pub rule_set_id: String,
    #[serde(default)]
    pub rule_set_name: Option<String>,
    pub passed: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rule_results: Vec<RuleResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub rule_id: String,
    #[serde(default)]
    pub rule_name: Option<String>,
    pub passed: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn expression_request_matches_script_payload() {
        let request = ExpressionEvaluationRequest {
            expression_id: None,
            expression_string: "customer.age >= 18 && order.total > 100".to_string(),
            context: EvaluationContext::from([
                ("customer.age".to_string(), json!(25)),
                ("order.total".to_string(), json!(150.0)),
            ]),
        };

        assert_eq!(
            json!({
                "expressionString": "customer.age >= 18 && order.total > 100",
                "context": {
                    "customer.age": 25,
                    "order.total": 150.0
                }
            }),
            serde_json::to_value(&request).unwrap()
        );
    }

    #[test]
    fn rule_request_uses_upper_case_enums() {
        let request = RuleValidationRequest {
            rule_id: "rule-1".to_string(),
            rule_name: "Test Rule".to_string(),
            conditions: vec![Condition {
                attribute_code: "customer.age".to_string(),
                attribute_type: AttributeType::Number,
                operator: ComparisonOperator::Gte,
                target_value: json!(18),
            }],
            context: EvaluationContext::new(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(json!("NUMBER"), value["conditions"][0]["attributeType"]);
        assert_eq!(json!("GTE"), value["conditions"][0]["operator"]);
        assert_eq!(json!("rule-1"), value["ruleId"]);
    }

    #[test]
    fn decode_evaluation_response() {
        let response: ExpressionEvaluationResponse =
            serde_json::from_value(json!({"value": true, "type": "Boolean", "error": null}))
                .unwrap();

        assert_eq!(json!(true), response.value);
        assert_eq!(Some("Boolean".to_string()), response.value_type);
        assert_eq!(None, response.error);
    }

    #[test]
    fn decode_rule_response_with_null_fields() {
        let response: RuleValidationResponse =
            serde_json::from_str(r#"{"passed":true,"message":null,"details":null}"#).unwrap();

        assert!(response.passed);
        assert_eq!(None, response.message);
        assert!(response.details.is_empty());
    }

    #[test]
    fn decode_category_response_with_null_fields() {
        let response: CategoryValidationResponse = serde_json::from_value(json!({
            "passed": true,
            "message": null,
            "ruleCategory": "ELIGIBILITY",
            "totalRuleSets": 1,
            "passedRuleSets": 1,
            "failedRuleSets": 0,
            "ruleSetResults": [{
                "ruleSetId": "rs-1",
                "ruleSetName": null,
                "passed": true,
                "message": null,
                "ruleResults": null
            }],
            "details": null
        }))
        .unwrap();

        assert!(response.details.is_empty());
        assert!(response.rule_set_results[0].rule_results.is_empty());
    }

    #[test]
    fn decode_category_response() {
        let response: CategoryValidationResponse = serde_json::from_value(json!({
            "passed": false,
            "message": "1 of 2 rule sets failed",
            "ruleCategory": "ELIGIBILITY",
            "totalRuleSets": 2,
            "passedRuleSets": 1,
            "failedRuleSets": 1,
            "ruleSetResults": [{
                "ruleSetId": "rs-1",
                "ruleSetName": "Adults",
                "passed": true,
                "message": "ok",
                "ruleResults": [{"ruleId": "rule-1", "ruleName": "Age", "passed": true, "message": "ok"}]
            }],
            "details": {}
        }))
        .unwrap();

        assert!(!response.passed);
        assert_eq!(2, response.total_rule_sets);
        assert_eq!("rule-1", response.rule_set_results[0].rule_results[0].rule_id);
    }
}
