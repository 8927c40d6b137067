//! Redis backend configuration

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::introspect::{ColumnDefaults, ColumnKind, ColumnOptions};

/// Text scorers accepted by `FT.SEARCH ... SCORER`
pub const VALID_TEXT_SCORERS: [&str; 6] = [
    "BM25",
    "TFIDF",
    "TFIDF.DOCNORM",
    "DISMAX",
    "DOCSCORE",
    "HAMMING",
];

/// Static configuration of a Redis index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Index name; a random `index_name__<hex>` name is generated if unset
    pub index_name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Scorer used by text search (default: BM25)
    pub text_scorer: String,
    /// Default options per backend column kind
    pub default_column_config: ColumnDefaults,
}

impl Default for RedisConfig {
    fn default() -> Self {
        let mut default_column_config = HashMap::new();
        default_column_config.insert(ColumnKind::Text, ColumnOptions::default());
        default_column_config.insert(ColumnKind::Numeric, ColumnOptions::default());
        default_column_config.insert(
            ColumnKind::Vector,
            ColumnOptions::default()
                .with_algorithm("FLAT")
                .with_distance("COSINE"),
        );

        Self {
            host: "localhost".to_string(),
            port: 6379,
            index_name: None,
            username: None,
            password: None,
            text_scorer: "BM25".to_string(),
            default_column_config,
        }
    }
}

impl RedisConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_text_scorer(mut self, scorer: impl Into<String>) -> Self {
        self.text_scorer = scorer.into();
        self
    }

    /// Override the defaults for one column kind
    pub fn with_column_defaults(mut self, kind: ColumnKind, options: ColumnOptions) -> Self {
        self.default_column_config.insert(kind, options);
        self
    }

    /// Normalise the text scorer and check it against [`VALID_TEXT_SCORERS`]
    pub fn validate(mut self) -> Result<Self, SchemaError> {
        self.text_scorer = self.text_scorer.trim().to_uppercase();
        if !VALID_TEXT_SCORERS.contains(&self.text_scorer.as_str()) {
            return Err(SchemaError::invalid_config(
                "text scorer",
                self.text_scorer,
                &VALID_TEXT_SCORERS,
            ));
        }
        Ok(self)
    }

    /// `redis://[user[:password]@]host:port`
    pub fn connection_url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(password)) => format!("{}:{}@", user, password),
            (Some(user), None) => format!("{}@", user),
            (None, Some(password)) => format!(":{}@", password),
            (None, None) => String::new(),
        };
        format!("redis://{}{}:{}", auth, self.host, self.port)
    }

    /// Load a configuration from JSON
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validate()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RedisConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6379);
        assert_eq!(config.text_scorer, "BM25");
        let vector = &config.default_column_config[&ColumnKind::Vector];
        assert_eq!(vector.algorithm.as_deref(), Some("FLAT"));
        assert_eq!(vector.distance.as_deref(), Some("COSINE"));
    }

    #[test]
    fn test_scorer_is_normalised() {
        let config = RedisConfig::default()
            .with_text_scorer("tfidf.docnorm")
            .validate()
            .unwrap();
        assert_eq!(config.text_scorer, "TFIDF.DOCNORM");
    }

    #[test]
    fn test_invalid_scorer() {
        let err = RedisConfig::default()
            .with_text_scorer("fuzzy")
            .validate()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid text scorer 'FUZZY' provided. Must be one of: BM25, TFIDF, TFIDF.DOCNORM, DISMAX, DOCSCORE, HAMMING"
        );
    }

    #[test]
    fn test_connection_url() {
        assert_eq!(RedisConfig::default().connection_url(), "redis://localhost:6379");
        let config = RedisConfig::default()
            .with_host("db")
            .with_port(7000)
            .with_credentials("app", "secret");
        assert_eq!(config.connection_url(), "redis://app:secret@db:7000");
    }

    #[test]
    fn test_from_json() {
        let config = RedisConfig::from_json(
            r#"{"port": 6380, "text_scorer": "dismax", "default_column_config": {"vector": {"distance": "L2"}}}"#,
        )
        .unwrap();
        assert_eq!(config.port, 6380);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.text_scorer, "DISMAX");
        assert_eq!(
            config.default_column_config[&ColumnKind::Vector].distance.as_deref(),
            Some("L2")
        );
    }
}
