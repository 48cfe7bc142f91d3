//! Applies validation schemas to request parameters.

use crate::domain::constraint::{ConstraintContext, ConstraintRegistry};
use crate::domain::error::{HintMap, ProtocolError};
use crate::domain::protocol::RequestContext;
use crate::domain::schema::{FieldConstraints, ValidationSchema};
use crate::domain::value::to_param_string;
use std::sync::Arc;

#[derive(Clone)]
pub struct Validator {
    constraints: Arc<ConstraintRegistry>,
}

impl Validator {
    pub fn new(constraints: Arc<ConstraintRegistry>) -> Self {
        Self { constraints }
    }

    /// Hints for every failing constraint of one field, in declaration order.
    ///
    /// Constraint errors are returned as-is, never turned into hints.
    pub async fn validate_value(
        &self,
        value: &str,
        constraints: &FieldConstraints,
        context: &mut ConstraintContext<'_>,
    ) -> Result<Vec<String>, ProtocolError> {
        let mut hints = Vec::new();
        for (name, options) in constraints.iter() {
            if !self.constraints.evaluate(name, value, options, context).await? {
                hints.push(self.constraints.hint(name, options)?);
            }
        }
        Ok(hints)
    }

    /// Validates the request's parameter bag; only fields with violations appear in the result.
    pub async fn validate_request(
        &self,
        request: &mut RequestContext,
        schema: &ValidationSchema,
    ) -> Result<HintMap, ProtocolError> {
        let mut hints = HintMap::new();
        for (field, constraints) in schema.fields() {
            let value = to_param_string(request.bucket.get(field));
            let mut context = ConstraintContext::new(&mut request.entities);
            let field_hints = self.validate_value(&value, constraints, &mut context).await?;
            if !field_hints.is_empty() {
                tracing::debug!(field, violations = field_hints.len(), "parameter rejected");
                hints.insert(field.to_string(), field_hints);
            }
        }
        Ok(hints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constraint::ConstraintOptions;
    use axum::http::Method;
    use serde_json::json;

    fn validator() -> Validator {
        Validator::new(Arc::new(ConstraintRegistry::with_defaults()))
    }

    #[tokio::test]
    async fn every_failing_constraint_contributes_a_hint() {
        let constraints = FieldConstraints::new()
            .with("isLength", json!({ "min": 3, "max": 5 }))
            .rule("isNumeric")
            .rule("isAlpha");
        let hints = validator()
            .validate_value("ab", &constraints, &mut ConstraintContext::detached())
            .await
            .unwrap();
        assert_eq!(
            hints,
            vec![
                "The parameter must be between 3 and 5 characters".to_string(),
                "The parameter must be a number".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn empty_value_passes_without_presence_constraint() {
        let constraints = FieldConstraints::new()
            .rule("isEmail")
            .with("isInt", json!({ "min": 1 }))
            .with("isHash", json!({ "algorithm": "md5" }));
        let hints = validator()
            .validate_value("", &constraints, &mut ConstraintContext::detached())
            .await
            .unwrap();
        assert!(hints.is_empty());
    }

    #[tokio::test]
    async fn missing_required_field_is_reported() {
        let schema =
            ValidationSchema::new().field("param", FieldConstraints::new().rule("isRequired"));
        let mut request = RequestContext::new(Method::GET);
        let hints = validator().validate_request(&mut request, &schema).await.unwrap();
        assert_eq!(hints["param"], vec!["The parameter is required".to_string()]);
    }

    #[tokio::test]
    async fn numeric_zero_is_not_empty() {
        let count = FieldConstraints::new().rule("isRequired").rule("isInt");
        let schema = ValidationSchema::new().field("count", count);
        let mut request =
            RequestContext::new(Method::POST).with_body(json!({ "count": 0 }));
        request.merge();
        let hints = validator().validate_request(&mut request, &schema).await.unwrap();
        assert!(hints.is_empty());
    }

    #[tokio::test]
    async fn hash_hint_mentions_algorithm() {
        let md5 = ConstraintOptions::new().with("algorithm", "md5");
        let constraints = FieldConstraints::new().with("isHash", md5);
        let hints = validator()
            .validate_value("text", &constraints, &mut ConstraintContext::detached())
            .await
            .unwrap();
        assert!(hints[0].contains("md5"));
    }

    #[tokio::test]
    async fn unknown_constraint_aborts_validation() {
        let schema =
            ValidationSchema::new().field("param", FieldConstraints::new().rule("isUnknown"));
        let mut request = RequestContext::new(Method::GET);
        let err = validator().validate_request(&mut request, &schema).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Configuration(_)));
    }
}
