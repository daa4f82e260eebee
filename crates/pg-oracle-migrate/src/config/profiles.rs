//! Named Oracle connection profiles.
//!
//! Profiles live in a JSON file (`~/.oracle_db_config.json` by default):
//!
//! ```json
//! {
//!   "default_profile": "plant1",
//!   "profiles": {
//!     "plant1": {
//!       "host": "10.0.0.5", "port": 1521, "service_name": "MESDB",
//!       "user": "mes", "password": "secret"
//!     }
//!   }
//! }
//! ```
//!
//! Older files use `sites`/`default_site`, `service` and `username`; both
//! spellings are accepted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::{OracleConnectParams, ORACLE_DEFAULT_PORT};
use crate::error::{MigrateError, Result};

/// File name of the profile store in the home directory.
pub const PROFILE_FILE_NAME: &str = ".oracle_db_config.json";

/// One named connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, alias = "service")]
    pub service_name: Option<String>,

    #[serde(default)]
    pub sid: Option<String>,

    #[serde(alias = "username")]
    pub user: String,

    pub password: String,

    /// "SYSDBA" for privileged connections.
    #[serde(default)]
    pub mode: Option<String>,
}

fn default_port() -> u16 {
    ORACLE_DEFAULT_PORT
}

impl Profile {
    pub fn is_sysdba(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("SYSDBA"))
    }

    /// Connection parameters for the `oracle` driver.
    pub fn connect_params(&self) -> Result<OracleConnectParams> {
        let connect_string = OracleConnectParams::connect_string(
            &self.host,
            self.port,
            self.service_name.as_deref(),
            self.sid.as_deref(),
        )
        .ok_or_else(|| {
            MigrateError::Config(format!(
                "profile for {} needs a service_name or sid",
                self.host
            ))
        })?;
        Ok(OracleConnectParams {
            user: self.user.clone(),
            password: self.password.clone(),
            connect_string,
            sysdba: self.is_sysdba(),
        })
    }
}

/// The profile file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStore {
    #[serde(default, alias = "sites")]
    pub profiles: BTreeMap<String, Profile>,

    #[serde(default, alias = "default_site")]
    pub default_profile: Option<String>,
}

impl ProfileStore {
    /// Default location: `$HOME/.oracle_db_config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(PROFILE_FILE_NAME))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            MigrateError::Config(format!(
                "cannot read profile store {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load the store from its default location.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()
            .ok_or_else(|| MigrateError::Config("cannot determine home directory".into()))?;
        Self::load(path)
    }

    /// Look up a profile by name, or the default profile when `name` is
    /// `None`.
    pub fn get(&self, name: Option<&str>) -> Result<&Profile> {
        let name = name
            .or(self.default_profile.as_deref())
            .ok_or_else(|| MigrateError::Config("no profile given and no default_profile set".into()))?;
        self.profiles.get(name).ok_or_else(|| {
            MigrateError::Config(format!(
                "profile '{}' not found. Available: {}",
                name,
                self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_modern_keys() {
        let store = ProfileStore::from_json(
            r#"{
                "default_profile": "a",
                "profiles": {
                    "a": {"host": "h", "port": 1522, "service_name": "SVC", "user": "u", "password": "p"}
                }
            }"#,
        )
        .unwrap();
        let params = store.get(None).unwrap().connect_params().unwrap();
        assert_eq!(params.connect_string, "//h:1522/SVC");
        assert_eq!(params.user, "u");
        assert!(!params.sysdba);
    }

    #[test]
    fn test_legacy_keys() {
        let store = ProfileStore::from_json(
            r#"{
                "default_site": "old",
                "sites": {
                    "old": {"host": "h", "sid": "ORCL", "username": "sys", "password": "p", "mode": "SYSDBA"}
                }
            }"#,
        )
        .unwrap();
        let profile = store.get(None).unwrap();
        assert_eq!(profile.port, 1521);
        assert!(profile.is_sysdba());
        let params = profile.connect_params().unwrap();
        assert!(params.connect_string.contains("(SID=ORCL)"));
        assert_eq!(params.user, "sys");
    }

    #[test]
    fn test_service_alias() {
        let store = ProfileStore::from_json(
            r#"{"profiles": {"x": {"host": "h", "service": "S", "user": "u", "password": "p"}}}"#,
        )
        .unwrap();
        assert_eq!(store.get(Some("x")).unwrap().service_name.as_deref(), Some("S"));
    }

    #[test]
    fn test_unknown_profile() {
        let store = ProfileStore::default();
        assert!(store.get(Some("missing")).is_err());
        assert!(store.get(None).is_err());
    }

    #[test]
    fn test_missing_service_and_sid() {
        let store = ProfileStore::from_json(
            r#"{"profiles": {"x": {"host": "h", "user": "u", "password": "p"}}}"#,
        )
        .unwrap();
        assert!(store.get(Some("x")).unwrap().connect_params().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"profiles": {{"p": {{"host": "db", "service_name": "S", "user": "u", "password": "x"}}}}}}"#
        )
        .unwrap();
        let store = ProfileStore::load(file.path()).unwrap();
        assert_eq!(store.profiles.len(), 1);
    }
}
