//! Query definitions and the query-definition file
//!
//! A query file is TOML with one `[[query]]` table per statement:
//!
//! ```toml
//! [[query]]
//! id = "point_select"
//! statement = "SELECT c FROM sbtest1 WHERE id = ?"
//! weight = 3
//! params = [{ kind = "range", start = 1, end = 10000 }]
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// Longest accepted query id, in bytes
///
/// Ids travel in every stats datagram, so they are kept short.
pub const MAX_QUERY_ID_LEN: usize = 64;

/// A single parameter value bound to a statement placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer parameter
    Int(i64),
    /// Text parameter
    Text(String),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Text(s) => write!(f, "'{s}'"),
        }
    }
}

/// How to generate the value of one placeholder
///
/// The generators themselves live in `sql-bench-samplers`; this is the
/// serializable description handed to each worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamSpec {
    /// Uniform integer in `min..=max`
    RandomInt {
        /// Lower bound (inclusive)
        min: i64,
        /// Upper bound (inclusive)
        max: i64,
    },
    /// Random alphanumeric string of a fixed length
    RandomString {
        /// Length in characters
        len: usize,
    },
    /// Sequential integers `start..=end`, wrapping around
    Range {
        /// First value
        start: i64,
        /// Last value (inclusive)
        end: i64,
    },
    /// Random choice from a fixed list
    List {
        /// Candidate values
        values: Vec<ParamValue>,
    },
}

impl ParamSpec {
    fn validate(&self) -> Result<(), String> {
        match self {
            ParamSpec::RandomInt { min, max } if min > max => {
                Err(format!("random_int min {min} is greater than max {max}"))
            }
            ParamSpec::Range { start, end } if start > end => {
                Err(format!("range start {start} is greater than end {end}"))
            }
            ParamSpec::List { values } if values.is_empty() => Err("list has no values".into()),
            _ => Ok(()),
        }
    }
}

fn default_weight() -> u32 {
    1
}

/// A weighted, parameterized statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryDef {
    /// Identity used to bucket statistics
    pub id: String,

    /// SQL text with `?` placeholders
    pub statement: String,

    /// Relative frequency in the schedule
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// One generator per placeholder, in order
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl QueryDef {
    /// Create a query without parameters and weight 1
    pub fn new(id: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            statement: statement.into(),
            weight: 1,
            params: Vec::new(),
        }
    }

    /// Set the weight
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Append a placeholder generator
    pub fn with_param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }
}

/// Count `?` placeholders outside of quoted literals
pub fn placeholder_count(statement: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in statement.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '?') => count += 1,
            (None, _) => {}
        }
    }
    count
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryFile {
    #[serde(default, rename = "query")]
    queries: Vec<QueryDef>,
}

/// A validated, ordered set of query definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySet {
    queries: Vec<QueryDef>,
}

impl QuerySet {
    /// Validate and wrap a list of definitions
    pub fn new(queries: Vec<QueryDef>) -> BenchResult<Self> {
        let set = Self { queries };
        set.validate()?;
        Ok(set)
    }

    /// Parse a TOML query file body
    pub fn from_toml_str(body: &str) -> BenchResult<Self> {
        let file: QueryFile = toml::from_str(body)
            .map_err(|e| BenchError::config(format!("invalid query file: {e}")))?;
        Self::new(file.queries)
    }

    /// Read and parse a TOML query file
    pub fn load(path: &Path) -> BenchResult<Self> {
        let body = std::fs::read_to_string(path).map_err(|e| {
            BenchError::config(format!("cannot read query file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&body)
    }

    /// The definitions, in file order
    pub fn queries(&self) -> &[QueryDef] {
        &self.queries
    }

    /// Consume the set
    pub fn into_queries(self) -> Vec<QueryDef> {
        self.queries
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether the set is empty (never true for a validated set)
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    fn validate(&self) -> BenchResult<()> {
        if self.queries.is_empty() {
            return Err(BenchError::config("no query definitions"));
        }

        let mut seen = HashSet::new();
        for query in &self.queries {
            if query.id.trim().is_empty() {
                return Err(BenchError::config("query id must not be empty"));
            }
            if query.id.len() > MAX_QUERY_ID_LEN {
                return Err(BenchError::config(format!(
                    "query id '{}' is longer than {MAX_QUERY_ID_LEN} bytes",
                    query.id
                )));
            }
            if !seen.insert(query.id.as_str()) {
                return Err(BenchError::config(format!(
                    "duplicate query id '{}'",
                    query.id
                )));
            }
            if query.statement.trim().is_empty() {
                return Err(BenchError::config(format!(
                    "query '{}' has an empty statement",
                    query.id
                )));
            }
            if query.weight == 0 {
                return Err(BenchError::config(format!(
                    "query '{}' must have weight >= 1",
                    query.id
                )));
            }

            let placeholders = placeholder_count(&query.statement);
            if placeholders != query.params.len() {
                return Err(BenchError::config(format!(
                    "query '{}' has {placeholders} placeholders but {} params",
                    query.id,
                    query.params.len()
                )));
            }
            for spec in &query.params {
                spec.validate().map_err(|e| {
                    BenchError::config(format!("query '{}': {e}", query.id))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[query]]
id = "point_select"
statement = "SELECT c FROM sbtest1 WHERE id = ?"
weight = 3
params = [{ kind = "range", start = 1, end = 100 }]

[[query]]
id = "by_name"
statement = "SELECT id FROM users WHERE name = ? AND region = ?"
params = [
    { kind = "random_string", len = 8 },
    { kind = "list", values = ["eu", "us", 7] },
]
"#;

    #[test]
    fn test_parse_query_file() {
        let set = QuerySet::from_toml_str(SAMPLE).unwrap();
        assert_eq!(set.len(), 2);

        let first = &set.queries()[0];
        assert_eq!(first.id, "point_select");
        assert_eq!(first.weight, 3);
        assert_eq!(first.params, vec![ParamSpec::Range { start: 1, end: 100 }]);

        let second = &set.queries()[1];
        assert_eq!(second.weight, 1); // default
        assert_eq!(
            second.params[1],
            ParamSpec::List {
                values: vec![
                    ParamValue::Text("eu".into()),
                    ParamValue::Text("us".into()),
                    ParamValue::Int(7),
                ]
            }
        );
    }

    #[test]
    fn test_empty_file_rejected() {
        let err = QuerySet::from_toml_str("").unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = QuerySet::new(vec![
            QueryDef::new("q", "SELECT 1"),
            QueryDef::new("q", "SELECT 2"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_zero_weight_rejected() {
        let err = QuerySet::new(vec![QueryDef::new("q", "SELECT 1").with_weight(0)]).unwrap_err();
        assert!(err.to_string().contains("weight"));
    }

    #[test]
    fn test_placeholder_mismatch_rejected() {
        let err = QuerySet::new(vec![QueryDef::new("q", "SELECT ? + ?")
            .with_param(ParamSpec::RandomInt { min: 0, max: 1 })])
        .unwrap_err();
        assert!(err.to_string().contains("2 placeholders"));
    }

    #[test]
    fn test_invalid_range_rejected() {
        let err = QuerySet::new(vec![QueryDef::new("q", "SELECT ?")
            .with_param(ParamSpec::Range { start: 10, end: 1 })])
        .unwrap_err();
        assert!(err.to_string().contains("range start"));
    }

    #[test]
    fn test_long_id_rejected() {
        let id = "x".repeat(MAX_QUERY_ID_LEN + 1);
        assert!(QuerySet::new(vec![QueryDef::new(id, "SELECT 1")]).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let body = r#"
[[query]]
id = "q"
statement = "SELECT 1"
wieght = 2
"#;
        assert!(QuerySet::from_toml_str(body).is_err());
    }

    #[test]
    fn test_placeholder_count_skips_literals() {
        assert_eq!(placeholder_count("SELECT 1"), 0);
        assert_eq!(placeholder_count("SELECT * FROM t WHERE a = ? AND b = ?"), 2);
        assert_eq!(placeholder_count("SELECT '?' FROM t WHERE a = ?"), 1);
        assert_eq!(placeholder_count(r#"SELECT "it\"s?" , `c?` FROM t"#), 0);
    }

    #[test]
    fn test_param_value_display() {
        assert_eq!(ParamValue::Int(42).to_string(), "42");
        assert_eq!(ParamValue::Text("eu".into()).to_string(), "'eu'");
    }
}
