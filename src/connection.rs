use openssl::ssl::{SslContext, SslMethod, SslVerifyMode};
use scylla::frame::response::result::CqlValue;
use scylla::query::Query;
use scylla::transport::query_result::QueryResult;
use scylla::{Session, SessionBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use std::path::Path;
use tracing::{debug, error, info};

use crate::error::{ScriptError, ScriptResult};
use crate::store::{ResultSet, Store};

/// Connection document read from the credentials file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keyspace: Option<String>,
    #[serde(rename = "ssl")]
    pub ssl_enabled: bool,
    pub ssl_ca_cert: Option<String>,
    pub ssl_verify: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1".to_string()],
            port: 9042,
            username: None,
            password: None,
            keyspace: None,
            ssl_enabled: false,
            ssl_ca_cert: None,
            ssl_verify: false,
        }
    }
}

impl ConnectionConfig {
    pub fn from_credentials_file(path: &Path) -> ScriptResult<Self> {
        if !path.exists() {
            return Err(ScriptError::CredentialsError(format!(
                "Credentials file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: ConnectionConfig = serde_json::from_str(&content).map_err(|e| {
            ScriptError::CredentialsError(format!("Invalid credentials file {}: {}", path.display(), e))
        })?;

        if config.hosts.is_empty() {
            return Err(ScriptError::CredentialsError(format!(
                "No hosts configured in {}",
                path.display()
            )));
        }

        Ok(config)
    }

    /// Ask for the password on the terminal when only a username is configured.
    pub fn prompt_password_if_missing(&mut self) -> ScriptResult<()> {
        if self.username.is_some() && self.password.is_none() {
            print!("Password: ");
            use std::io::Write;
            std::io::stdout().flush()?;
            self.password = Some(rpassword::read_password()?);
        }
        Ok(())
    }

    fn contact_points(&self) -> Vec<String> {
        self.hosts
            .iter()
            .map(|host| {
                if host.contains(':') {
                    host.clone()
                } else {
                    format!("{}:{}", host, self.port)
                }
            })
            .collect()
    }
}

pub struct ConnectionManager {
    session: Session,
}

impl ConnectionManager {
    /// Create SSL context with configurable certificate verification
    fn create_ssl_context(verify_cert: bool, ca_cert: Option<&str>) -> ScriptResult<SslContext> {
        let mut ssl_builder = SslContext::builder(SslMethod::tls())
            .map_err(|e| ScriptError::ConnectionError(format!("Failed to create SSL context: {}", e)))?;

        if verify_cert {
            info!("SSL certificate verification enabled (SslVerifyMode::PEER)");
            ssl_builder.set_verify(SslVerifyMode::PEER);
        } else {
            info!("SSL certificate verification disabled (SslVerifyMode::NONE)");
            ssl_builder.set_verify(SslVerifyMode::NONE);
        }

        if let Some(ca_cert) = ca_cert {
            info!("Loading CA certificate from {}", ca_cert);
            ssl_builder.set_ca_file(ca_cert).map_err(|e| {
                ScriptError::ConnectionError(format!("Failed to load CA certificate {}: {}", ca_cert, e))
            })?;
        }

        Ok(ssl_builder.build())
    }

    pub async fn connect(config: ConnectionConfig) -> ScriptResult<Self> {
        let contact_points = config.contact_points();
        info!("Connecting to cluster at {:?}", contact_points);

        let mut builder = SessionBuilder::new().known_nodes(&contact_points);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            info!("Using authentication with username: {}", username);
            builder = builder.user(username, password);
        }

        if config.ssl_enabled {
            info!("SSL/TLS enabled with verification: {}", config.ssl_verify);
            let ssl_context = Self::create_ssl_context(config.ssl_verify, config.ssl_ca_cert.as_deref())?;
            builder = builder.ssl_context(Some(ssl_context));
        }

        let session = builder.build().await.map_err(|e| {
            ScriptError::ConnectionError(format!(
                "could not reach {:?} (SSL enabled: {}): {}",
                contact_points, config.ssl_enabled, e
            ))
        })?;

        if let Some(keyspace) = &config.keyspace {
            info!("Using keyspace: {}", keyspace);
            session
                .use_keyspace(keyspace, false)
                .await
                .map_err(|e| ScriptError::ConnectionError(format!("Failed to use keyspace: {}", e)))?;
        }

        info!("Successfully connected");
        Ok(Self { session })
    }
}

impl Store for ConnectionManager {
    async fn run(&self, statement: &str) -> ScriptResult<ResultSet> {
        debug!("Executing statement: {}", statement);

        let result = self
            .session
            .query(Query::new(statement), &[])
            .await
            .map_err(|e| {
                error!("Statement failed: {}", e);
                ScriptError::QueryError(format!("{}", e))
            })?;

        Ok(to_result_set(&result))
    }

    async fn use_keyspace(&self, keyspace: &str) -> ScriptResult<()> {
        debug!("Switching to keyspace {}", keyspace);
        self.session
            .use_keyspace(keyspace, false)
            .await
            .map_err(|e| ScriptError::QueryError(format!("Failed to use keyspace {}: {}", keyspace, e)))
    }
}

fn to_result_set(result: &QueryResult) -> ResultSet {
    let columns: Vec<String> = result.col_specs.iter().map(|spec| spec.name.clone()).collect();

    let rows = result.rows.as_ref().map(|rows| {
        rows.iter()
            .map(|row| {
                let mut doc = Map::new();
                for (i, col) in row.columns.iter().enumerate() {
                    let name = columns.get(i).cloned().unwrap_or_else(|| format!("col{}", i));
                    doc.insert(name, cql_value_to_json(col));
                }
                doc
            })
            .collect()
    });

    match rows {
        Some(rows) => ResultSet::with_rows(columns, rows),
        None => ResultSet::default(),
    }
}

fn cql_value_to_json(value: &Option<CqlValue>) -> JsonValue {
    match value {
        None => JsonValue::Null,
        Some(cql_val) => match cql_val {
            CqlValue::Ascii(s) | CqlValue::Text(s) => JsonValue::String(s.clone()),
            CqlValue::Boolean(b) => JsonValue::Bool(*b),
            CqlValue::TinyInt(i) => json!(*i),
            CqlValue::SmallInt(i) => json!(*i),
            CqlValue::Int(i) => json!(*i),
            CqlValue::BigInt(i) => json!(*i),
            CqlValue::Counter(c) => json!(c.0),
            CqlValue::Float(f) => json!(*f),
            CqlValue::Double(f) => json!(*f),
            CqlValue::Uuid(u) => JsonValue::String(u.to_string()),
            CqlValue::Timeuuid(u) => JsonValue::String(u.to_string()),
            CqlValue::Inet(addr) => JsonValue::String(addr.to_string()),
            CqlValue::Timestamp(ts) => json!(ts.0),
            CqlValue::Blob(bytes) => JsonValue::String(format!(
                "0x{}",
                bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>()
            )),
            CqlValue::Empty => JsonValue::Null,
            CqlValue::List(items) | CqlValue::Set(items) => JsonValue::Array(
                items.iter().map(|v| cql_value_to_json(&Some(v.clone()))).collect(),
            ),
            CqlValue::Tuple(items) => JsonValue::Array(items.iter().map(cql_value_to_json).collect()),
            CqlValue::Map(entries) => map_to_json(entries),
            CqlValue::UserDefinedType { fields, .. } => JsonValue::Object(
                fields
                    .iter()
                    .map(|(name, v)| (name.clone(), cql_value_to_json(v)))
                    .collect(),
            ),
            _ => JsonValue::String(format!("{:?}", cql_val)),
        },
    }
}

/// Maps keyed by text become objects; any other key type becomes a list of pairs.
fn map_to_json(entries: &[(CqlValue, CqlValue)]) -> JsonValue {
    let text_keys = entries
        .iter()
        .all(|(k, _)| matches!(k, CqlValue::Text(_) | CqlValue::Ascii(_)));

    if text_keys {
        let mut object = Map::new();
        for (k, v) in entries {
            if let CqlValue::Text(key) | CqlValue::Ascii(key) = k {
                object.insert(key.clone(), cql_value_to_json(&Some(v.clone())));
            }
        }
        JsonValue::Object(object)
    } else {
        JsonValue::Array(
            entries
                .iter()
                .map(|(k, v)| json!([cql_value_to_json(&Some(k.clone())), cql_value_to_json(&Some(v.clone()))]))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn credentials_file_missing() {
        let dir = TempDir::new().unwrap();
        let err = ConnectionConfig::from_credentials_file(&dir.path().join("creds.json")).unwrap_err();
        assert!(err.to_string().contains("Credentials file not found"));
    }

    #[test]
    fn credentials_file_defaults_and_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(&path, r#"{"hosts": ["db1", "db2:9142"], "keyspace": "app", "ssl": true}"#).unwrap();

        let config = ConnectionConfig::from_credentials_file(&path).unwrap();
        assert_eq!(config.port, 9042);
        assert_eq!(config.keyspace.as_deref(), Some("app"));
        assert!(config.ssl_enabled);
        assert!(!config.ssl_verify);
        assert_eq!(config.contact_points(), vec!["db1:9042", "db2:9142"]);
    }

    #[test]
    fn credentials_file_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(&path, "{ hosts: ").unwrap();
        assert!(ConnectionConfig::from_credentials_file(&path).is_err());

        fs::write(&path, r#"{"hosts": []}"#).unwrap();
        assert!(ConnectionConfig::from_credentials_file(&path).is_err());
    }

    #[test]
    fn cql_values_convert_to_json() {
        assert_eq!(cql_value_to_json(&None), JsonValue::Null);
        assert_eq!(cql_value_to_json(&Some(CqlValue::Int(5))), json!(5));
        assert_eq!(cql_value_to_json(&Some(CqlValue::Blob(vec![0xde, 0xad]))), json!("0xdead"));
        assert_eq!(
            cql_value_to_json(&Some(CqlValue::Map(vec![(
                CqlValue::Text("k".into()),
                CqlValue::Boolean(true)
            )]))),
            json!({"k": true})
        );
        assert_eq!(
            cql_value_to_json(&Some(CqlValue::Map(vec![(CqlValue::Int(1), CqlValue::Int(2))]))),
            json!([[1, 2]])
        );
    }
}
