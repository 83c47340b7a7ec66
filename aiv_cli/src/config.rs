use aiv::{ElectionPublicKeys, MemLedger, StoredElectionKeys};
use std::env::var;
use std::fs::read_to_string;
use thiserror::Error;

pub const KEYS_VAR: &str = "AIV_KEYS";
pub const LEDGER_VAR: &str = "AIV_LEDGER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no {what} given: pass --{flag} or set {var}")]
    Missing {
        what: &'static str,
        flag: &'static str,
        var: &'static str,
    },

    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("{path} is not a valid {what}: {source}")]
    Invalid {
        path: String,
        what: &'static str,
        source: aiv::Error,
    },
}

/// File locations, from flags first and the environment second
#[derive(Debug, Default, Clone)]
pub struct Config {
    pub keys_path: Option<String>,
    pub ledger_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            keys_path: var(KEYS_VAR).ok(),
            ledger_path: var(LEDGER_VAR).ok(),
        }
    }

    /// Apply command-line overrides
    pub fn with_matches(mut self, matches: &clap::ArgMatches) -> Self {
        if let Some(path) = matches.value_of("keys") {
            self.keys_path = Some(path.to_owned());
        }
        if let Some(path) = matches.value_of("ledger") {
            self.ledger_path = Some(path.to_owned());
        }
        self
    }

    fn keys_file(&self) -> Result<(String, String), ConfigError> {
        let path = self.keys_path.clone().ok_or(ConfigError::Missing {
            what: "key file",
            flag: "keys",
            var: KEYS_VAR,
        })?;
        let contents = read(&path)?;
        Ok((path, contents))
    }

    /// The authority's full key file
    pub fn election_keys(&self) -> Result<StoredElectionKeys, ConfigError> {
        let (path, contents) = self.keys_file()?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Invalid {
            path,
            what: "election key file",
            source: e.into(),
        })
    }

    /// Public keys, from either a public key file or the authority's full key file
    pub fn public_keys(&self) -> Result<ElectionPublicKeys, ConfigError> {
        let (path, contents) = self.keys_file()?;
        if let Ok(stored) = serde_json::from_str::<StoredElectionKeys>(&contents) {
            return Ok(ElectionPublicKeys {
                encryption_public: stored.encryption_public,
                signing_public: stored.signing_public,
            });
        }
        serde_json::from_str(&contents).map_err(|e| ConfigError::Invalid {
            path,
            what: "public key file",
            source: e.into(),
        })
    }

    /// A JSON dump of ledger transactions
    pub fn ledger(&self) -> Result<MemLedger, ConfigError> {
        let path = self.ledger_path.clone().ok_or(ConfigError::Missing {
            what: "ledger dump",
            flag: "ledger",
            var: LEDGER_VAR,
        })?;
        let contents = read(&path)?;
        MemLedger::from_json(&contents).map_err(|source| ConfigError::Invalid {
            path,
            what: "ledger dump",
            source,
        })
    }
}

fn read(path: &str) -> Result<String, ConfigError> {
    read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_missing_paths_are_errors() {
        let config = Config::default();
        let err = config.election_keys().unwrap_err();
        assert_eq!(err.to_string(), "no key file given: pass --keys or set AIV_KEYS");
        assert!(matches!(config.ledger(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_unreadable_and_invalid_files() {
        let config = Config {
            keys_path: Some("/nonexistent/aiv-keys.json".to_owned()),
            ledger_path: None,
        };
        assert!(matches!(config.public_keys(), Err(ConfigError::Io { .. })));

        let garbage = file("{\"not\": \"keys\"}");
        let config = Config {
            keys_path: Some(garbage.path().to_string_lossy().into_owned()),
            ledger_path: Some(garbage.path().to_string_lossy().into_owned()),
        };
        assert!(matches!(
            config.public_keys(),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(config.ledger(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_ledger_dump() {
        let dump = file(
            r#"[{"digest":"a","sequence":1,"sender":"0x1","changed_objects":["0xe"],"calls":[]}]"#,
        );
        let config = Config {
            keys_path: None,
            ledger_path: Some(dump.path().to_string_lossy().into_owned()),
        };
        assert_eq!(config.ledger().unwrap().len(), 1);
    }
}
