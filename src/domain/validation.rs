//! Loan document validation.
//!
//! Applied to every JSON document before it is hashed and stored.

use serde_json::Value;
use std::fmt;

const MAX_LOAN_ID_LEN: usize = 128;

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a loan identifier.
pub fn validate_loan_id(loan_id: &str) -> Result<(), FieldError> {
    let err = |message: &str| FieldError {
        field: "loan_id".to_string(),
        message: message.to_string(),
    };

    if loan_id.is_empty() {
        return Err(err("must not be empty"));
    }
    if loan_id.len() > MAX_LOAN_ID_LEN {
        return Err(err("must be at most 128 characters"));
    }
    if !loan_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(err("may only contain letters, digits, '-' and '_'"));
    }
    Ok(())
}

/// Look a field up at the top level, then under `loan`.
pub fn loan_field<'a>(document: &'a Value, name: &str) -> Option<&'a Value> {
    document
        .get(name)
        .or_else(|| document.get("loan").and_then(|loan| loan.get(name)))
}

/// Numeric value of a JSON number or numeric string.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

/// Check the financial fields of a loan document, collecting every problem.
pub fn validate_loan_document(document: &Value) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if !document.is_object() {
        errors.push(FieldError {
            field: "document".to_string(),
            message: "must be a JSON object".to_string(),
        });
        return Err(errors);
    }

    if let Some(amount) = loan_field(document, "loan_amount") {
        match as_number(amount) {
            Some(n) if n.is_finite() && n > 0.0 => {}
            Some(_) => errors.push(FieldError {
                field: "loan_amount".to_string(),
                message: "must be a positive amount".to_string(),
            }),
            None => errors.push(FieldError {
                field: "loan_amount".to_string(),
                message: "must be a number".to_string(),
            }),
        }
    }

    if let Some(rate) = loan_field(document, "interest_rate") {
        match as_number(rate) {
            Some(r) if r.is_finite() && (0.0..=100.0).contains(&r) => {}
            _ => errors.push(FieldError {
                field: "interest_rate".to_string(),
                message: "must be a number between 0 and 100".to_string(),
            }),
        }
    }

    if let Some(term) = loan_field(document, "loan_term_months") {
        match term.as_u64() {
            Some(t) if t > 0 => {}
            _ => errors.push(FieldError {
                field: "loan_term_months".to_string(),
                message: "must be a positive integer".to_string(),
            }),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
