use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    normalize::DEFAULT_MIN_AGE,
    record::{AGE_FIELD, CITY_FIELD, NAME_FIELD},
};

/// Run settings, loadable from YAML and overridable from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PipelineConfig {
    pub min_age: i64,
    /// Source identifier recorded on the run; defaults to the input file name.
    pub source_tag: Option<String>,
    /// Written as in the CLI: `,`, `tab`, `;`, `|`.
    #[serde(deserialize_with = "deserialize_delimiter")]
    pub delimiter: Option<u8>,
    pub input_encoding: Option<String>,
    pub columns: ColumnNames,
}

fn deserialize_delimiter<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|value| crate::cli::parse_delimiter(&value).map_err(serde::de::Error::custom))
        .transpose()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_age: DEFAULT_MIN_AGE,
            source_tag: None,
            delimiter: None,
            input_encoding: None,
            columns: ColumnNames::default(),
        }
    }
}

/// Header names in the input file that carry each required field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub name: String,
    pub age: String,
    pub city: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            name: NAME_FIELD.to_string(),
            age: AGE_FIELD.to_string(),
            city: CITY_FIELD.to_string(),
        }
    }
}

impl ColumnNames {
    /// Maps an input header to the canonical field key, leaving unrelated headers as-is.
    pub fn canonical_key<'a>(&self, header: &'a str) -> &'a str {
        let trimmed = header.trim();
        if trimmed == self.name {
            NAME_FIELD
        } else if trimmed == self.age {
            AGE_FIELD
        } else if trimmed == self.city {
            CITY_FIELD
        } else {
            header
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub min_age: Option<i64>,
    pub source_tag: Option<String>,
    pub delimiter: Option<u8>,
    pub input_encoding: Option<String>,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        Ok(config)
    }

    pub fn resolve(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply(overrides);
        Ok(config)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(min_age) = overrides.min_age {
            self.min_age = min_age;
        }
        if overrides.source_tag.is_some() {
            self.source_tag = overrides.source_tag;
        }
        if overrides.delimiter.is_some() {
            self.delimiter = overrides.delimiter;
        }
        if overrides.input_encoding.is_some() {
            self.input_encoding = overrides.input_encoding;
        }
    }
}
