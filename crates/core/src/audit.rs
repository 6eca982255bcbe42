use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

/// Row written to the external strategy log.
///
/// `strategy_id` is `null` for account-level events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub strategy_id: Option<String>,
    pub level: AuditLevel,
    pub message: String,
    pub data: Value,
}

impl AuditRecord {
    #[must_use]
    pub fn new(
        strategy_id: Option<&str>,
        level: AuditLevel,
        message: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            strategy_id: strategy_id.map(str::to_string),
            level,
            message: message.into(),
            data,
        }
    }

    #[must_use]
    pub fn info(strategy_id: Option<&str>, message: impl Into<String>, data: Value) -> Self {
        Self::new(strategy_id, AuditLevel::Info, message, data)
    }

    #[must_use]
    pub fn warning(strategy_id: Option<&str>, message: impl Into<String>, data: Value) -> Self {
        Self::new(strategy_id, AuditLevel::Warning, message, data)
    }

    #[must_use]
    pub fn error(strategy_id: Option<&str>, message: impl Into<String>, data: Value) -> Self {
        Self::new(strategy_id, AuditLevel::Error, message, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn account_level_record_serializes_null_strategy() {
        let record = AuditRecord::error(None, "missing credentials", json!({"account": "a1"}));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["strategy_id"], Value::Null);
        assert_eq!(value["level"], "error");
        assert_eq!(value["message"], "missing credentials");
    }
}
