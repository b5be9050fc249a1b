//! Declarative field rules.
//!
//! A [`RuleValidator`] checks a model's serialized form against a chain of
//! per-path rules and collects every failure.

use super::validation::{ValidationResult, Validator};
use crate::core::{FieldError, get_in_row, split_path};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// One check against the value at a path. `None` means the value passes.
pub trait FieldRule: Send + Sync {
    fn check(&self, value: Option<&JsonValue>) -> Option<String>;
}

fn present(value: Option<&JsonValue>) -> Option<&JsonValue> {
    value.filter(|value| !value.is_null())
}

/// Value must be present and not null
#[derive(Debug, Clone, Default)]
pub struct Required;

impl FieldRule for Required {
    fn check(&self, value: Option<&JsonValue>) -> Option<String> {
        match present(value) {
            Some(_) => None,
            None => Some("is required".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IsString;

impl FieldRule for IsString {
    fn check(&self, value: Option<&JsonValue>) -> Option<String> {
        match present(value) {
            Some(value) if !value.is_string() => Some("must be a string".to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IsNumber;

impl FieldRule for IsNumber {
    fn check(&self, value: Option<&JsonValue>) -> Option<String> {
        match present(value) {
            Some(value) if !value.is_number() => Some("must be a number".to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Min(pub f64);

impl FieldRule for Min {
    fn check(&self, value: Option<&JsonValue>) -> Option<String> {
        let number = present(value)?.as_f64()?;
        (number < self.0).then(|| format!("must be at least {}", self.0))
    }
}

#[derive(Debug, Clone)]
pub struct Max(pub f64);

impl FieldRule for Max {
    fn check(&self, value: Option<&JsonValue>) -> Option<String> {
        let number = present(value)?.as_f64()?;
        (number > self.0).then(|| format!("must be at most {}", self.0))
    }
}

#[derive(Debug, Clone)]
pub struct MaxLength(pub usize);

impl FieldRule for MaxLength {
    fn check(&self, value: Option<&JsonValue>) -> Option<String> {
        let text = present(value)?.as_str()?;
        (text.chars().count() > self.0)
            .then(|| format!("must be at most {} characters long", self.0))
    }
}

/// String value must match the pattern
#[derive(Debug, Clone)]
pub struct Pattern(pub Regex);

impl FieldRule for Pattern {
    fn check(&self, value: Option<&JsonValue>) -> Option<String> {
        let text = present(value)?.as_str()?;
        (!self.0.is_match(text)).then(|| format!("must match {}", self.0.as_str()))
    }
}

/// Chain of field rules applied to a model's JSON form.
#[derive(Default)]
pub struct RuleValidator {
    rules: Vec<(String, Box<dyn FieldRule>)>,
}

impl RuleValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, path: &str, rule: impl FieldRule + 'static) -> Self {
        self.rules.push((path.to_string(), Box::new(rule)));
        self
    }

    pub fn required(self, path: &str) -> Self {
        self.rule(path, Required)
    }

    pub fn string(self, path: &str) -> Self {
        self.rule(path, IsString)
    }

    pub fn number(self, path: &str) -> Self {
        self.rule(path, IsNumber)
    }

    pub fn min(self, path: &str, min: f64) -> Self {
        self.rule(path, Min(min))
    }

    pub fn max(self, path: &str, max: f64) -> Self {
        self.rule(path, Max(max))
    }

    pub fn max_length(self, path: &str, max: usize) -> Self {
        self.rule(path, MaxLength(max))
    }

    pub fn pattern(self, path: &str, pattern: Regex) -> Self {
        self.rule(path, Pattern(pattern))
    }

    /// Checks a JSON value directly. Non-object values fail every rule that
    /// needs a present value.
    pub fn validate_value(&self, value: &JsonValue) -> ValidationResult {
        let errors = self
            .rules
            .iter()
            .filter_map(|(path, rule)| {
                let found = value
                    .as_object()
                    .and_then(|row| get_in_row(row, &split_path(path)));
                rule.check(found)
                    .map(|message| FieldError::new(path.clone(), message))
            })
            .collect();
        ValidationResult::from_errors(errors)
    }
}

#[async_trait]
impl<M> Validator<M> for RuleValidator
where
    M: Serialize + Sync,
{
    async fn validate(&self, model: &M) -> ValidationResult {
        match serde_json::to_value(model) {
            Ok(value) => self.validate_value(&value),
            Err(err) => ValidationResult::invalid("", err.to_string()),
        }
    }
}
