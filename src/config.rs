use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::limits::*;

pub const DEFAULT_DATE_COLUMN: &str = "Date";
pub const DEFAULT_PERIOD_COLUMN: &str = "Créneau";
pub const DEFAULT_HORIZON_DAYS: u32 = 30;

/// Who may free a reserved cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Any authenticated session can cancel any reservation.
    #[default]
    Anyone,
    /// Only the session whose user matches the occupant can cancel.
    OccupantOnly,
}

fn default_date_column() -> String {
    DEFAULT_DATE_COLUMN.to_string()
}

fn default_period_column() -> String {
    DEFAULT_PERIOD_COLUMN.to_string()
}

fn default_horizon_days() -> u32 {
    DEFAULT_HORIZON_DAYS
}

/// Static description of one flex office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexOfficeConfig {
    /// Display name, also the identifier callers pass to the engine.
    pub name: String,
    /// Key under which the office's sheet is stored.
    pub storage_key: String,
    /// Bookable resources, in column order.
    pub resources: Vec<String>,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_period_column")]
    pub period_column: String,
    /// Days covered by the bulk reservation view.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default)]
    pub cancel_policy: CancelPolicy,
}

impl FlexOfficeConfig {
    pub fn new(name: impl Into<String>, storage_key: impl Into<String>, resources: &[&str]) -> Self {
        Self {
            name: name.into(),
            storage_key: storage_key.into(),
            resources: resources.iter().map(|r| r.to_string()).collect(),
            date_column: default_date_column(),
            period_column: default_period_column(),
            horizon_days: DEFAULT_HORIZON_DAYS,
            cancel_policy: CancelPolicy::Anyone,
        }
    }

    pub fn with_period_column(mut self, column: impl Into<String>) -> Self {
        self.period_column = column.into();
        self
    }

    pub fn with_horizon(mut self, days: u32) -> Self {
        self.horizon_days = days;
        self
    }

    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    pub fn has_resource(&self, resource: &str) -> bool {
        self.resources.iter().any(|r| r == resource)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |reason: String| ConfigError::Invalid {
            office: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(bad("empty office name".into()));
        }
        if self.storage_key.trim().is_empty() || self.storage_key.len() > MAX_STORAGE_KEY_LEN {
            return Err(bad("storage key empty or too long".into()));
        }
        // Keys name files as-is; anything a store would have to rewrite could alias another key.
        if !self
            .storage_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(bad(format!(
                "storage key {:?} may only contain A-Z, a-z, 0-9, '_' and '-'",
                self.storage_key
            )));
        }
        if self.resources.is_empty() || self.resources.len() > MAX_ROSTER_SIZE {
            return Err(bad(format!(
                "roster must hold between 1 and {MAX_ROSTER_SIZE} resources"
            )));
        }
        if self.date_column == self.period_column {
            return Err(bad("date and period columns share a name".into()));
        }
        let mut seen = HashSet::new();
        for r in &self.resources {
            if r.trim().is_empty() || r.len() > MAX_RESOURCE_NAME_LEN {
                return Err(bad(format!("invalid resource name {r:?}")));
            }
            if *r == self.date_column || *r == self.period_column {
                return Err(bad(format!("resource {r:?} collides with a header column")));
            }
            if !seen.insert(r.as_str()) {
                return Err(bad(format!("duplicate resource {r:?}")));
            }
        }
        if self.horizon_days == 0 || self.horizon_days > MAX_HORIZON_DAYS {
            return Err(bad(format!(
                "horizon must be between 1 and {MAX_HORIZON_DAYS} days"
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid { office: String, reason: String },
    DuplicateOffice(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read office directory: {e}"),
            ConfigError::Parse(e) => write!(f, "invalid office directory: {e}"),
            ConfigError::Invalid { office, reason } => {
                write!(f, "office {office:?}: {reason}")
            }
            ConfigError::DuplicateOffice(name) => write!(f, "office {name:?} declared twice"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Deserialize)]
struct DirectoryFile {
    offices: Vec<FlexOfficeConfig>,
}

/// All offices the engine knows about, in declaration order.
#[derive(Debug, Clone)]
pub struct OfficeDirectory {
    offices: Vec<FlexOfficeConfig>,
}

impl OfficeDirectory {
    pub fn new(offices: Vec<FlexOfficeConfig>) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for office in &offices {
            office.validate()?;
            // Case-insensitive file systems fold keys that differ only in case.
            if !names.insert(office.name.as_str())
                || !keys.insert(office.storage_key.to_ascii_lowercase())
            {
                return Err(ConfigError::DuplicateOffice(office.name.clone()));
            }
        }
        Ok(Self { offices })
    }

    /// Parse a JSON document of the form `{"offices": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: DirectoryFile = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        Self::new(file.offices)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json(&json)
    }

    /// The three offices that exist when no directory file is configured.
    pub fn builtin() -> Self {
        Self {
            offices: vec![
                FlexOfficeConfig::new(
                    "Aquarium",
                    "FlexAqua",
                    &["Aquali", "Carapuce", "Hank", "Némo", "Polochon", "Tamatoa"],
                )
                .with_horizon(60),
                FlexOfficeConfig::new("Jungle", "FlexSerre", &["Baloo", "Stitch", "Rajah", "Meeko"])
                    .with_horizon(60),
                FlexOfficeConfig::new("IMA", "FlexIMA", &["Bureau 1", "Bureau 2", "Bureau 3"])
                    .with_horizon(60),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&FlexOfficeConfig> {
        self.offices.iter().find(|o| o.name == name)
    }

    pub fn offices(&self) -> &[FlexOfficeConfig] {
        &self.offices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_directory_is_valid() {
        let dir = OfficeDirectory::builtin();
        assert_eq!(dir.offices().len(), 3);
        for office in dir.offices() {
            office.validate().unwrap();
        }
        assert!(dir.get("Jungle").unwrap().has_resource("Baloo"));
        assert!(dir.get("Savane").is_none());
    }

    #[test]
    fn json_applies_defaults() {
        let json = r#"{"offices": [
            {"name": "Jungle", "storage_key": "FlexSerre", "resources": ["Baloo", "Stitch"]},
            {"name": "Mer", "storage_key": "FlexMer", "resources": ["Némo", "Dori"],
             "period_column": "Période", "horizon_days": 15, "cancel_policy": "occupant_only"}
        ]}"#;
        let dir = OfficeDirectory::from_json(json).unwrap();
        let jungle = dir.get("Jungle").unwrap();
        assert_eq!(jungle.date_column, "Date");
        assert_eq!(jungle.period_column, "Créneau");
        assert_eq!(jungle.horizon_days, DEFAULT_HORIZON_DAYS);
        assert_eq!(jungle.cancel_policy, CancelPolicy::Anyone);

        let mer = dir.get("Mer").unwrap();
        assert_eq!(mer.period_column, "Période");
        assert_eq!(mer.horizon_days, 15);
        assert_eq!(mer.cancel_policy, CancelPolicy::OccupantOnly);
    }

    #[test]
    fn duplicate_offices_rejected() {
        let a = FlexOfficeConfig::new("A", "KeyA", &["x"]);
        let b = FlexOfficeConfig::new("A", "KeyB", &["y"]);
        assert!(matches!(
            OfficeDirectory::new(vec![a, b]),
            Err(ConfigError::DuplicateOffice(_))
        ));
    }

    #[test]
    fn shared_storage_key_rejected() {
        let a = FlexOfficeConfig::new("A", "Shared", &["x"]);
        let b = FlexOfficeConfig::new("B", "Shared", &["y"]);
        assert!(OfficeDirectory::new(vec![a, b]).is_err());
    }

    #[test]
    fn keys_that_alias_one_file_rejected() {
        let dotted = FlexOfficeConfig::new("A", "Flex.Aqua", &["X"]);
        assert!(matches!(dotted.validate(), Err(ConfigError::Invalid { .. })));
        assert!(FlexOfficeConfig::new("A", "../FlexAqua", &["X"]).validate().is_err());
        assert!(FlexOfficeConfig::new("A", "Flex Aqua", &["X"]).validate().is_err());
        assert!(FlexOfficeConfig::new("A", "Flex_Aqua-2", &["X"]).validate().is_ok());

        let a = FlexOfficeConfig::new("A", "FlexAqua", &["X"]);
        let b = FlexOfficeConfig::new("B", "flexaqua", &["X"]);
        assert!(matches!(
            OfficeDirectory::new(vec![a, b]),
            Err(ConfigError::DuplicateOffice(name)) if name == "B"
        ));
    }

    #[test]
    fn roster_validation() {
        assert!(FlexOfficeConfig::new("A", "K", &[]).validate().is_err());
        assert!(FlexOfficeConfig::new("A", "K", &["x", "x"]).validate().is_err());
        assert!(FlexOfficeConfig::new("A", "K", &["Date"]).validate().is_err());
        assert!(FlexOfficeConfig::new("A", "K", &["  "]).validate().is_err());
        assert!(FlexOfficeConfig::new("A", "K", &["x"]).with_horizon(0).validate().is_err());
        assert!(FlexOfficeConfig::new("A", "K", &["x"]).with_period_column("Date").validate().is_err());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            OfficeDirectory::from_json("{\"offices\": 3}"),
            Err(ConfigError::Parse(_))
        ));
    }
}
