use crate::core::{CrudError, FieldError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of validating one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// Valid exactly when `errors` is empty.
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_errors(vec![FieldError::new(path, message)])
    }

    /// Client-facing error carrying the field errors, or `Ok` when valid.
    pub fn into_result(self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(CrudError::ValidationFailed {
                errors: self.errors,
            })
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

/// Structural validator for a model.
#[async_trait]
pub trait Validator<M>: Send + Sync {
    async fn validate(&self, model: &M) -> ValidationResult;
}

/// Custom validation step run inside the write transaction.
///
/// `Ok(None)` passes. An `Err` counts as a failed validation rather than
/// propagating as-is.
pub type ValidationFn<M, A, Tx> = Arc<
    dyn Fn(M, Option<A>, Tx) -> BoxFuture<'static, Result<Option<ValidationResult>>>
        + Send
        + Sync,
>;

/// Wraps a closure as a [`ValidationFn`].
pub fn validation_fn<M, A, Tx, F>(f: F) -> ValidationFn<M, A, Tx>
where
    F: Fn(M, Option<A>, Tx) -> BoxFuture<'static, Result<Option<ValidationResult>>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Runs `structural` and then each of `steps` in order, stopping at the first
/// invalid result. A step that fails outright becomes a generic validation
/// failure.
pub async fn run_validations<M, A, Tx>(
    structural: Option<&dyn Validator<M>>,
    steps: &[ValidationFn<M, A, Tx>],
    model: &M,
    auth: Option<&A>,
    tx: &Tx,
) -> Result<()>
where
    M: Clone + Sync,
    A: Clone,
    Tx: Clone,
{
    if let Some(validator) = structural {
        validator.validate(model).await.into_result()?;
    }

    for step in steps {
        let outcome = step(model.clone(), auth.cloned(), tx.clone())
            .await
            .map_err(|err| {
                CrudError::bad_request("Failed validations").with_reason(err.to_string())
            })?;
        if let Some(result) = outcome {
            result.into_result()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NonEmpty;

    fn non_empty() -> Option<&'static dyn Validator<String>> {
        Some(&NonEmpty)
    }

    #[async_trait]
    impl Validator<String> for NonEmpty {
        async fn validate(&self, model: &String) -> ValidationResult {
            if model.is_empty() {
                ValidationResult::invalid("", "must not be empty")
            } else {
                ValidationResult::valid()
            }
        }
    }

    #[tokio::test]
    async fn chain_stops_at_first_invalid_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let steps: Vec<ValidationFn<String, (), ()>> = vec![
            validation_fn(|_, _, _| {
                Box::pin(async { Ok(Some(ValidationResult::invalid("name", "taken"))) })
            }),
            validation_fn(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(None) })
            }),
        ];

        let err = run_validations(non_empty(), &steps, &"x".to_string(), None, &())
            .await
            .unwrap_err();
        match err {
            CrudError::ValidationFailed { errors } => assert_eq!(errors[0].message, "taken"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn structural_validator_runs_first() {
        let steps: Vec<ValidationFn<String, (), ()>> = Vec::new();
        let err = run_validations(non_empty(), &steps, &String::new(), None, &())
            .await
            .unwrap_err();
        assert!(matches!(err, CrudError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn failing_step_is_a_generic_validation_failure() {
        let steps: Vec<ValidationFn<String, (), ()>> = vec![validation_fn(|_, _, _| {
            Box::pin(async { Err(CrudError::store("connection reset")) })
        })];

        let err = run_validations(None, &steps, &"x".to_string(), None, &())
            .await
            .unwrap_err();
        let payload = err.payload();
        assert_eq!(payload.status, 400);
        assert_eq!(payload.message, "Failed validations");
    }
}
