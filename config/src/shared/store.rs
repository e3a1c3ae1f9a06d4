use std::path::PathBuf;

use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Document store the sync writes to.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store, optionally loaded from and saved back to a JSON snapshot file.
    Memory {
        #[serde(default)]
        snapshot_path: Option<PathBuf>,
    },
    /// Documents kept in a Postgres table.
    Postgres {
        connection: PgConnectionConfig,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

impl StoreConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

    /// Validates the store settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StoreConfig::Memory { .. } => Ok(()),
            StoreConfig::Postgres {
                connection,
                max_connections,
            } => {
                connection.validate()?;
                if *max_connections == 0 {
                    return Err(ValidationError::InvalidFieldValue {
                        field: "store.postgres.max_connections".to_string(),
                        constraint: "must be greater than 0".to_string(),
                    });
                }

                Ok(())
            }
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory {
            snapshot_path: None,
        }
    }
}

fn default_max_connections() -> u32 {
    StoreConfig::DEFAULT_MAX_CONNECTIONS
}
