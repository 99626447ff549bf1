use crate::error::{LoadError, Result};
use crate::models::{DataType, TypedValue};

const TRUE_TOKENS: &[&str] = &["yes", "true", "1"];

/// Cast a raw CSV field to `kind`.
///
/// `bool` never fails: anything outside `yes`/`true`/`1` (case-insensitive) is `false`.
/// The returned `InvalidValue` carries no column context; [`crate::mapper`] fills it in.
pub fn cast(raw: &str, kind: DataType) -> Result<TypedValue> {
    match kind {
        DataType::Int => raw
            .trim()
            .parse::<i64>()
            .map(TypedValue::Int)
            .map_err(|_| invalid(raw, kind)),
        DataType::Float => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(TypedValue::Float)
            .ok_or_else(|| invalid(raw, kind)),
        DataType::Bool => {
            let lowered = raw.to_lowercase();
            Ok(TypedValue::Bool(TRUE_TOKENS.contains(&lowered.as_str())))
        }
        DataType::String => Ok(TypedValue::String(raw.to_string())),
    }
}

fn invalid(raw: &str, kind: DataType) -> LoadError {
    LoadError::InvalidValue {
        raw: raw.to_string(),
        kind: kind.name().to_string(),
        column: String::new(),
        property: String::new(),
    }
}
