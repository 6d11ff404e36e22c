use thiserror::Error;

pub type FlatsheetResult<T> = Result<T, FlatsheetError>;

#[derive(Error, Debug)]
pub enum FlatsheetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid path expression '{path}': {reason}")]
    InvalidPathExpression { path: String, reason: String },

    #[error("{0}")]
    FieldNotFound(FieldErrorContext),

    #[error("Index {index} out of range for '{path}' (length {len})")]
    PathOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("Cannot convert '{value}' to {target}")]
    TypeCoercionFailure { value: String, target: String },

    #[error("Cartesian expansion needs {requested} rows, capped at {cap}")]
    CartesianExplosion { requested: usize, cap: usize },

    #[error("'{path}' does not hold a list")]
    NotAList { path: String },

    #[error("Row group {key:?} at row {row} repeats an earlier, non-adjacent group")]
    GroupNotContiguous { row: usize, key: Vec<String> },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Object #{index}: {source}")]
    InObject {
        index: usize,
        #[source]
        source: Box<FlatsheetError>,
    },

    #[error("Import error: {0}")]
    Import(String),

    #[error("Export error: {0}")]
    Export(String),
}

impl FlatsheetError {
    /// Path errors are the ones `ignore_errors` may swallow
    pub fn is_path_error(&self) -> bool {
        matches!(
            self,
            FlatsheetError::FieldNotFound(_)
                | FlatsheetError::PathOutOfRange { .. }
                | FlatsheetError::NotAList { .. }
        )
    }

    pub fn in_object(self, index: usize) -> Self {
        match self {
            already @ FlatsheetError::InObject { .. } => already,
            other => FlatsheetError::InObject {
                index,
                source: Box::new(other),
            },
        }
    }
}

/// Where an attribute lookup failed, with a hint at what the caller meant
#[derive(Debug, Clone, PartialEq)]
pub struct FieldErrorContext {
    /// The full path expression being resolved
    pub path: String,
    /// The attribute that was not found
    pub field: String,
    /// Attributes present on the object at that point
    pub available: Vec<String>,
}

impl FieldErrorContext {
    pub fn new(path: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            field: field.into(),
            available: Vec::new(),
        }
    }

    pub fn with_available(mut self, available: Vec<String>) -> Self {
        self.available = available;
        self
    }

    /// Closest available attribute: case-insensitive exact, then prefix, then substring
    pub fn find_similar(&self) -> Option<String> {
        let wanted = self.field.to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        if let Some(hit) = self
            .available
            .iter()
            .find(|name| name.to_lowercase() == wanted)
        {
            return Some(hit.clone());
        }

        if let Some(hit) = self.available.iter().find(|name| {
            let lower = name.to_lowercase();
            lower.starts_with(&wanted) || wanted.starts_with(&lower)
        }) {
            return Some(hit.clone());
        }

        self.available
            .iter()
            .find(|name| {
                let lower = name.to_lowercase();
                lower.contains(&wanted) || wanted.contains(&lower)
            })
            .cloned()
    }
}

impl std::fmt::Display for FieldErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field '{}' not found in '{}'", self.field, self.path)?;
        if let Some(similar) = self.find_similar() {
            write!(f, " (did you mean '{}'?)", similar)?;
        }
        Ok(())
    }
}

pub fn field_not_found(path: &str, field: &str, available: Vec<String>) -> FlatsheetError {
    FlatsheetError::FieldNotFound(FieldErrorContext::new(path, field).with_available(available))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_similar_exact_case_insensitive() {
        let ctx = FieldErrorContext::new("dept.Name", "Name")
            .with_available(vec!["name".to_string(), "leader".to_string()]);
        assert_eq!(ctx.find_similar(), Some("name".to_string()));
    }

    #[test]
    fn test_find_similar_prefix_and_contains() {
        let ctx = FieldErrorContext::new("order", "order")
            .with_available(vec!["order_no".to_string()]);
        assert_eq!(ctx.find_similar(), Some("order_no".to_string()));

        let ctx = FieldErrorContext::new("qty", "qty")
            .with_available(vec!["item_qty_total".to_string()]);
        assert_eq!(ctx.find_similar(), Some("item_qty_total".to_string()));
    }

    #[test]
    fn test_field_not_found_message_includes_suggestion() {
        let err = field_not_found("itms", "itms", vec!["items".to_string()]);
        let message = err.to_string();
        assert!(message.contains("Field 'itms' not found"));
        assert!(!message.contains("did you mean"), "no close match expected: {}", message);

        let err = field_not_found("item", "item", vec!["items".to_string()]);
        assert!(err.to_string().contains("did you mean 'items'?"));
    }

    #[test]
    fn test_in_object_does_not_double_wrap() {
        let err = FlatsheetError::InvalidSchema("x".to_string())
            .in_object(2)
            .in_object(5);
        match err {
            FlatsheetError::InObject { index, .. } => assert_eq!(index, 2),
            other => panic!("expected InObject, got {:?}", other),
        }
    }

    #[test]
    fn test_is_path_error() {
        assert!(field_not_found("a", "a", vec![]).is_path_error());
        assert!(FlatsheetError::PathOutOfRange {
            path: "a[3]".to_string(),
            index: 3,
            len: 1
        }
        .is_path_error());
        assert!(FlatsheetError::NotAList {
            path: "pets".to_string()
        }
        .is_path_error());
        assert!(!FlatsheetError::InvalidSchema("x".to_string()).is_path_error());
    }
}
