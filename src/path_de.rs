use std::fmt;
use serde::de::DeserializeOwned;

/// A deserialization failure annotated with where in the document it happened.
#[derive(Debug, Clone)]
pub struct PathError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at JSON path {} → {}", self.path, self.message)
    }
}

impl std::error::Error for PathError {}

/// Deserialize with JSON-path context in error messages, so a bad config
/// reports `languages.go.processing.reservedWords[3]` instead of a byte offset.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| PathError {
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn error_names_the_offending_path() {
        let err = from_str_with_path::<BTreeMap<String, Vec<String>>>(r#"{"go": ["a", 3]}"#).unwrap_err();
        assert_eq!(err.path, "go[1]");
    }
}
