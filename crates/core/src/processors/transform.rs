use super::{config_str, object, ProcessorEnv, StepOutcome, StepProcessor};
use crate::error::Result;
use crate::types::{DataContext, StepType};
use crate::workflow::Step;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};
use std::fmt::Write;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Applies an ordered list of field transformations.
///
/// Config:
/// ```json
/// {"transformations": [
///   {"operation": "uppercase", "source_field": "name", "target_field": "name_upper"},
///   {"operation": "multiply", "source_field": "price", "target_field": "total", "factor": 3},
///   {"operation": "format_date", "source_field": "created", "target_field": "day", "format": "%d/%m/%Y"}
/// ]}
/// ```
/// Later transformations see the results of earlier ones. A transformation whose
/// source field is absent is skipped. This step never fails.
pub struct TransformProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Uppercase,
    Lowercase,
    Multiply,
    FormatDate,
}

impl Operation {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "uppercase" => Some(Self::Uppercase),
            "lowercase" => Some(Self::Lowercase),
            "multiply" => Some(Self::Multiply),
            "format_date" => Some(Self::FormatDate),
            _ => None,
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn multiply(value: &Value, factor: &Value) -> Option<Value> {
    if let (Some(a), Some(b)) = (value.as_i64(), factor.as_i64()) {
        if let Some(product) = a.checked_mul(b) {
            return Some(json!(product));
        }
    }
    let product = value.as_f64()? * factor.as_f64()?;
    serde_json::Number::from_f64(product).map(Value::Number)
}

fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Render with a strftime pattern, rejecting invalid patterns instead of panicking
fn format_date(date: &NaiveDateTime, pattern: &str) -> Option<String> {
    let mut rendered = String::new();
    write!(rendered, "{}", date.format(pattern)).ok()?;
    Some(rendered)
}

#[async_trait::async_trait]
impl StepProcessor for TransformProcessor {
    fn step_type(&self) -> StepType {
        StepType::Transform
    }

    async fn process(
        &self,
        step: &Step,
        context: &DataContext,
        env: &ProcessorEnv,
    ) -> Result<StepOutcome> {
        env.simulate(0.5).await?;

        let transformations = step
            .config
            .get("transformations")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut working = context.clone();
        let mut written = DataContext::new();
        let mut warnings = Vec::new();
        let mut applied = 0usize;

        for (index, spec) in transformations.iter().enumerate() {
            let Some(spec) = spec.as_object() else {
                warnings.push(format!("Transformation #{} is not an object", index));
                continue;
            };
            let Some(source) = config_str(spec, "source_field") else {
                warnings.push(format!("Transformation #{} has no source_field", index));
                continue;
            };
            let target = config_str(spec, "target_field").unwrap_or(source);
            let operation_name = config_str(spec, "operation").unwrap_or_default();

            let Some(source_value) = working.get(source) else {
                continue;
            };
            let Some(operation) = Operation::parse(operation_name) else {
                warnings.push(format!("Unknown transformation '{}'", operation_name));
                continue;
            };

            let result = match operation {
                Operation::Uppercase => Some(json!(as_text(source_value).to_uppercase())),
                Operation::Lowercase => Some(json!(as_text(source_value).to_lowercase())),
                Operation::Multiply => {
                    let factor = spec.get("factor").cloned().unwrap_or(json!(1));
                    multiply(source_value, &factor)
                }
                Operation::FormatDate => {
                    let pattern = config_str(spec, "format").unwrap_or(DEFAULT_DATE_FORMAT);
                    let date = parse_date(source_value).unwrap_or_else(|| {
                        warnings.push(format!(
                            "Field '{}' is not a date; formatting the current date",
                            source
                        ));
                        Utc::now().naive_utc()
                    });
                    format_date(&date, pattern).map(Value::String)
                }
            };

            match result {
                Some(value) => {
                    working.insert(target.to_string(), value.clone());
                    written.insert(target.to_string(), value);
                    applied += 1;
                }
                None => warnings.push(format!(
                    "Transformation '{}' could not be applied to field '{}'",
                    operation_name, source
                )),
            }
        }

        let mut output = object([
            ("transformed", json!(true)),
            ("transformations_applied", json!(applied)),
        ]);
        output.extend(written);

        Ok(StepOutcome::new(output).with_warnings(warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::tests::{context, env, step};

    async fn run(transformations: Value, ctx: Value) -> StepOutcome {
        let step = step(
            StepType::Transform,
            json!({"transformations": transformations}),
        );
        TransformProcessor
            .process(&step, &context(ctx), &env())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_case_transformations() {
        let outcome = run(
            json!([
                {"operation": "uppercase", "source_field": "name", "target_field": "upper"},
                {"operation": "lowercase", "source_field": "name", "target_field": "lower"}
            ]),
            json!({"name": "Invoice"}),
        )
        .await;

        assert_eq!(outcome.output["upper"], "INVOICE");
        assert_eq!(outcome.output["lower"], "invoice");
        assert_eq!(outcome.output["transformations_applied"], 2);
        assert_eq!(outcome.output["transformed"], true);
    }

    #[tokio::test]
    async fn test_multiply_keeps_integers() {
        let outcome = run(
            json!([
                {"operation": "multiply", "source_field": "qty", "target_field": "total", "factor": 3},
                {"operation": "multiply", "source_field": "price", "target_field": "price", "factor": 0.5}
            ]),
            json!({"qty": 4, "price": 10}),
        )
        .await;

        assert_eq!(outcome.output["total"], 12);
        assert_eq!(outcome.output["price"], 5.0);
    }

    #[tokio::test]
    async fn test_missing_source_skipped() {
        let outcome = run(
            json!([{"operation": "uppercase", "source_field": "ghost", "target_field": "x"}]),
            json!({"name": "a"}),
        )
        .await;

        assert!(!outcome.output.contains_key("x"));
        assert_eq!(outcome.output["transformations_applied"], 0);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_chained_transformations_see_earlier_results() {
        let outcome = run(
            json!([
                {"operation": "multiply", "source_field": "n", "target_field": "double", "factor": 2},
                {"operation": "multiply", "source_field": "double", "target_field": "quad", "factor": 2}
            ]),
            json!({"n": 3}),
        )
        .await;

        assert_eq!(outcome.output["quad"], 12);
    }

    #[tokio::test]
    async fn test_format_date() {
        let outcome = run(
            json!([
                {"operation": "format_date", "source_field": "created", "target_field": "day",
                 "format": "%d/%m/%Y"},
                {"operation": "format_date", "source_field": "stamp", "target_field": "stamp_day"}
            ]),
            json!({"created": "2024-03-05", "stamp": "2024-03-05T10:11:12Z"}),
        )
        .await;

        assert_eq!(outcome.output["day"], "05/03/2024");
        assert_eq!(outcome.output["stamp_day"], "2024-03-05");
    }

    #[tokio::test]
    async fn test_unparsable_date_uses_today_with_warning() {
        let outcome = run(
            json!([{"operation": "format_date", "source_field": "when", "target_field": "day"}]),
            json!({"when": "soon"}),
        )
        .await;

        let today = Utc::now().format(DEFAULT_DATE_FORMAT).to_string();
        assert_eq!(outcome.output["day"], today.as_str());
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_non_numeric_multiply_is_not_applied() {
        let outcome = run(
            json!([{"operation": "multiply", "source_field": "name", "factor": 2}]),
            json!({"name": "abc"}),
        )
        .await;

        assert_eq!(outcome.output["transformations_applied"], 0);
        assert_eq!(outcome.warnings.len(), 1);
    }
}
