use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::ots::DEFAULT_CALENDARS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for chain.json, actions.json, and witnesses/.
    pub home: PathBuf,
    /// Identity recorded as the `who` of every atom.
    pub identity: String,
    /// OpenTimestamps calendar endpoints.
    pub calendars: Vec<String>,
}

impl AppConfig {
    pub fn load() -> Self {
        let home = env::var("FORGE_HOME").map(PathBuf::from).unwrap_or_else(|_| {
            let base = env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(base).join(".forge")
        });

        let identity = env::var("FORGE_IDENTITY").unwrap_or_else(|_| "operator@localhost".to_string());

        let calendars = env::var("FORGE_CALENDARS")
            .map(|raw| {
                raw.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .ok()
            .filter(|cs| !cs.is_empty())
            .unwrap_or_else(|| DEFAULT_CALENDARS.iter().map(|c| c.to_string()).collect());

        AppConfig {
            home,
            identity,
            calendars,
        }
    }
}
