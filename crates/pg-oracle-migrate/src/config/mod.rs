//! Configuration loading and validation.

mod profiles;
mod types;
mod validation;

pub use profiles::{Profile, ProfileStore, PROFILE_FILE_NAME};
pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// The order mode in effect, filling in the per-source default.
    pub fn order_mode(&self) -> OrderMode {
        self.migration.order_mode.unwrap_or(if self.source.is_oracle() {
            OrderMode::ForeignKeys
        } else {
            OrderMode::Explicit
        })
    }

    /// Whether any side reads its connection from the profile store.
    pub fn needs_profiles(&self) -> bool {
        self.target.host.is_empty() || (self.source.is_oracle() && self.source.host.is_empty())
    }

    /// Load the profile store if any side needs it.
    pub fn profile_store(&self) -> Result<Option<ProfileStore>> {
        if self.needs_profiles() {
            ProfileStore::load_default().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Resolve Oracle connection parameters from inline values or a profile.
#[allow(clippy::too_many_arguments)]
fn resolve_oracle(
    side: &str,
    host: &str,
    port: Option<u16>,
    service_name: Option<&str>,
    sid: Option<&str>,
    user: &str,
    password: &str,
    sysdba: bool,
    profile: Option<&str>,
    store: Option<&ProfileStore>,
) -> Result<OracleConnectParams> {
    if !host.is_empty() {
        let connect_string = OracleConnectParams::connect_string(
            host,
            port.unwrap_or(ORACLE_DEFAULT_PORT),
            service_name,
            sid,
        )
        .ok_or_else(|| MigrateError::Config(format!("{}.service_name or {}.sid is required", side, side)))?;
        return Ok(OracleConnectParams {
            user: user.to_string(),
            password: password.to_string(),
            connect_string,
            sysdba,
        });
    }

    let store = store.ok_or_else(|| {
        MigrateError::Config(format!("{}.host is empty and no profile store is loaded", side))
    })?;
    let mut params = store.get(profile)?.connect_params()?;
    if !user.is_empty() {
        params.user = user.to_string();
    }
    if !password.is_empty() {
        params.password = password.to_string();
    }
    params.sysdba |= sysdba;
    Ok(params)
}

impl SourceConfig {
    pub fn is_oracle(&self) -> bool {
        self.r#type.eq_ignore_ascii_case("oracle")
    }

    /// Build a connection string for tokio-postgres.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host,
            self.port.unwrap_or(POSTGRES_DEFAULT_PORT),
            self.database,
            self.user,
            self.password
        )
    }

    /// Oracle connection parameters (Oracle sources).
    pub fn oracle_params(&self, store: Option<&ProfileStore>) -> Result<OracleConnectParams> {
        resolve_oracle(
            "source",
            &self.host,
            self.port,
            self.service_name.as_deref(),
            self.sid.as_deref(),
            &self.user,
            &self.password,
            self.sysdba,
            self.profile.as_deref(),
            store,
        )
    }

    /// Effective source schema: the configured one, else `public` for
    /// PostgreSQL or the connecting user for Oracle.
    pub fn schema_name(&self, oracle_user: Option<&str>) -> String {
        match (&self.schema, self.is_oracle()) {
            (Some(schema), _) => schema.clone(),
            (None, true) => oracle_user.unwrap_or(&self.user).to_uppercase(),
            (None, false) => "public".to_string(),
        }
    }
}

impl TargetConfig {
    /// Oracle connection parameters.
    pub fn oracle_params(&self, store: Option<&ProfileStore>) -> Result<OracleConnectParams> {
        resolve_oracle(
            "target",
            &self.host,
            self.port,
            self.service_name.as_deref(),
            self.sid.as_deref(),
            &self.user,
            &self.password,
            self.sysdba,
            self.profile.as_deref(),
            store,
        )
    }

    /// Effective target schema: the configured one, else the connecting user.
    pub fn schema_name(&self, params: &OracleConnectParams) -> String {
        self.schema
            .clone()
            .unwrap_or_else(|| params.user.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
source:
  type: postgres
  host: pg.local
  database: mes
  user: mes
  password: secret
target:
  host: ora.local
  service_name: MESDB
  user: MES
  password: secret
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.migration.batch_size, 500);
        assert_eq!(config.order_mode(), OrderMode::Explicit);
        assert_eq!(config.migration.id_column, "ID");
        assert!(config.migration.create_tables);
        assert!(!config.migration.row_fallback);
        assert_eq!(config.migration.key_conversions.len(), 51);
        assert!(!config.needs_profiles());
        assert_eq!(config.source.schema_name(None), "public");
    }

    #[test]
    fn test_inline_target_params() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        let params = config.target.oracle_params(None).unwrap();
        assert_eq!(params.connect_string, "//ora.local:1521/MESDB");
        assert_eq!(config.target.schema_name(&params), "MES");
    }

    #[test]
    fn test_profile_target_params() {
        let yaml = r#"
source:
  host: pg.local
  database: mes
  user: mes
  password: x
target:
  profile: plant2
migration:
  order_mode: foreign_keys
  batch_size: 1000
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.needs_profiles());
        assert_eq!(config.order_mode(), OrderMode::ForeignKeys);

        let store = ProfileStore::from_json(
            r#"{"profiles": {"plant2": {"host": "h2", "service_name": "S2", "user": "mes2", "password": "p"}}}"#,
        )
        .unwrap();
        let params = config.target.oracle_params(Some(&store)).unwrap();
        assert_eq!(params.connect_string, "//h2:1521/S2");
        assert_eq!(params.user, "mes2");
        assert!(config.target.oracle_params(None).is_err());
    }

    #[test]
    fn test_oracle_source_defaults_to_foreign_key_order() {
        let yaml = r#"
source:
  type: oracle
  host: ora-old.local
  service_name: OLDDB
  user: MES_OLD
target:
  host: ora.local
  service_name: MESDB
  user: MES
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.migration.order_mode, None);
        assert_eq!(config.order_mode(), OrderMode::ForeignKeys);

        let pinned = format!("{}migration:\n  order_mode: explicit\n", yaml);
        let config = Config::from_yaml(&pinned).unwrap();
        assert_eq!(config.order_mode(), OrderMode::Explicit);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.source.host, "pg.local");
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            Config::from_yaml("source: [unclosed"),
            Err(MigrateError::Yaml(_))
        ));
    }
}
