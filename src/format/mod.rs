//! format
//!
//! Format loader/saver boundary consumed by the write engine.
//!
//! # Architecture
//!
//! The engine never inspects format-specific content; it stages whatever
//! bytes the [`ConfigIo`] implementation produces and renames them into
//! place. Configuration data crosses the boundary as a [`ConfigMap`]
//! (string keys to JSON values, ordered for deterministic output).
//!
//! [`BuiltinIo`] covers JSON and TOML. YAML and application-specific line
//! formats are parser territory that plugs in through the trait; the
//! built-in implementation reports [`FormatError::Unsupported`] for them.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

/// Key/value view of one configuration file.
///
/// `BTreeMap` keeps serialization order stable across runs.
pub type ConfigMap = BTreeMap<String, Value>;

/// Errors from loading or saving configuration content.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The built-in adapter does not handle this format.
    #[error("no built-in adapter for {0} files; supply a ConfigIo implementation")]
    Unsupported(ConfigFormat),

    /// Content could not be parsed in the declared format.
    #[error("failed to parse {}: {message}", .path.display())]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// Data could not be serialized in the declared format.
    #[error("failed to serialize {}: {message}", .path.display())]
    Serialize {
        /// Destination file.
        path: PathBuf,
        /// Serializer diagnostic.
        message: String,
    },

    /// The file's top level is not a key/value table.
    #[error("{}: top level is not a key/value table", .path.display())]
    NotATable {
        /// Offending file.
        path: PathBuf,
    },

    /// I/O error reading or writing configuration content.
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigFormat {
    /// JSON documents.
    Json,
    /// YAML documents (adapter plug-in point; not built in).
    Yaml,
    /// TOML documents.
    Toml,
    /// Application-specific line-oriented format (adapter plug-in point).
    Custom,
}

impl ConfigFormat {
    /// Guess the format from a file extension; unknown extensions map to
    /// [`ConfigFormat::Custom`].
    ///
    /// # Example
    ///
    /// ```
    /// use confguard::format::ConfigFormat;
    /// use std::path::Path;
    ///
    /// assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
    /// assert_eq!(ConfigFormat::from_path(Path::new("a.yml")), ConfigFormat::Yaml);
    /// assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Custom);
    /// ```
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("yaml") | Some("yml") => Self::Yaml,
            Some("toml") => Self::Toml,
            _ => Self::Custom,
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}

/// Identifies one configuration file: where it lives and how to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDescriptor {
    /// Location of the file.
    pub path: PathBuf,
    /// Format used to interpret its bytes.
    pub format: ConfigFormat,
}

impl ConfigDescriptor {
    /// Descriptor with an explicit format.
    pub fn new(path: impl Into<PathBuf>, format: ConfigFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Descriptor with the format guessed from the file extension.
    pub fn guessed(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = ConfigFormat::from_path(&path);
        Self { path, format }
    }

    /// The same file under a different path (used when staging: the
    /// serialized bytes go to a temp sibling, format unchanged).
    pub fn at(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: self.format,
        }
    }
}

/// Loader/saver boundary for configuration content.
///
/// Implementations parse whole files into a [`ConfigMap`] and serialize
/// maps back to bytes. They write to exactly the descriptor's path; the
/// engine supplies temp paths when staging.
pub trait ConfigIo: Send + Sync {
    /// Load and parse the descriptor's file.
    fn load(&self, descriptor: &ConfigDescriptor) -> Result<ConfigMap, FormatError>;

    /// Serialize `data` and write it to the descriptor's path.
    fn save(&self, descriptor: &ConfigDescriptor, data: &ConfigMap) -> Result<(), FormatError>;
}

/// Built-in adapter for the formats the crate's own stack covers.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinIo;

impl BuiltinIo {
    /// Create the built-in adapter.
    pub fn new() -> Self {
        Self
    }
}

impl ConfigIo for BuiltinIo {
    fn load(&self, descriptor: &ConfigDescriptor) -> Result<ConfigMap, FormatError> {
        if let f @ (ConfigFormat::Yaml | ConfigFormat::Custom) = descriptor.format {
            return Err(FormatError::Unsupported(f));
        }
        let content = fs::read_to_string(&descriptor.path)?;
        match descriptor.format {
            ConfigFormat::Json => {
                let value: Value =
                    serde_json::from_str(&content).map_err(|e| FormatError::Parse {
                        path: descriptor.path.clone(),
                        message: e.to_string(),
                    })?;
                match value {
                    Value::Object(map) => Ok(map.into_iter().collect()),
                    _ => Err(FormatError::NotATable {
                        path: descriptor.path.clone(),
                    }),
                }
            }
            ConfigFormat::Toml => {
                let table: toml::Table =
                    toml::from_str(&content).map_err(|e| FormatError::Parse {
                        path: descriptor.path.clone(),
                        message: e.to_string(),
                    })?;
                table
                    .into_iter()
                    .map(|(k, v)| {
                        serde_json::to_value(v)
                            .map(|v| (k, v))
                            .map_err(|e| FormatError::Parse {
                                path: descriptor.path.clone(),
                                message: e.to_string(),
                            })
                    })
                    .collect()
            }
            other => Err(FormatError::Unsupported(other)),
        }
    }

    fn save(&self, descriptor: &ConfigDescriptor, data: &ConfigMap) -> Result<(), FormatError> {
        let content = match descriptor.format {
            ConfigFormat::Json => {
                let mut rendered =
                    serde_json::to_string_pretty(data).map_err(|e| FormatError::Serialize {
                        path: descriptor.path.clone(),
                        message: e.to_string(),
                    })?;
                rendered.push('\n');
                rendered
            }
            ConfigFormat::Toml => {
                toml::to_string_pretty(data).map_err(|e| FormatError::Serialize {
                    path: descriptor.path.clone(),
                    message: e.to_string(),
                })?
            }
            other => return Err(FormatError::Unsupported(other)),
        };

        let mut file = fs::File::create(&descriptor.path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn map(pairs: &[(&str, Value)]) -> ConfigMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("settings.JSON")),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("settings.toml")),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("settings.yaml")),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("ghostty/config")),
            ConfigFormat::Custom
        );
    }

    #[test]
    fn json_save_then_load() {
        let temp = TempDir::new().expect("create temp dir");
        let desc = ConfigDescriptor::new(temp.path().join("a.json"), ConfigFormat::Json);
        let data = map(&[("counter", json!(3)), ("name", json!("app"))]);

        let io = BuiltinIo::new();
        io.save(&desc, &data).expect("save");
        let loaded = io.load(&desc).expect("load");

        assert_eq!(loaded, data);
    }

    #[test]
    fn toml_save_then_load() {
        let temp = TempDir::new().expect("create temp dir");
        let desc = ConfigDescriptor::new(temp.path().join("a.toml"), ConfigFormat::Toml);
        let data = map(&[("enabled", json!(true)), ("threshold", json!(10))]);

        let io = BuiltinIo::new();
        io.save(&desc, &data).expect("save");
        let loaded = io.load(&desc).expect("load");

        assert_eq!(loaded, data);
    }

    #[test]
    fn json_rejects_non_object_root() {
        let temp = TempDir::new().expect("create temp dir");
        let path = temp.path().join("list.json");
        fs::write(&path, "[1, 2, 3]").expect("write");

        let desc = ConfigDescriptor::new(&path, ConfigFormat::Json);
        let err = BuiltinIo::new().load(&desc).unwrap_err();
        assert!(matches!(err, FormatError::NotATable { .. }));
    }

    #[test]
    fn parse_error_names_the_file() {
        let temp = TempDir::new().expect("create temp dir");
        let path = temp.path().join("bad.json");
        fs::write(&path, "{ not json").expect("write");

        let desc = ConfigDescriptor::new(&path, ConfigFormat::Json);
        let err = BuiltinIo::new().load(&desc).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn yaml_and_custom_are_plugin_points() {
        let temp = TempDir::new().expect("create temp dir");
        let io = BuiltinIo::new();
        for format in [ConfigFormat::Yaml, ConfigFormat::Custom] {
            let desc = ConfigDescriptor::new(temp.path().join("f"), format);
            let err = io.save(&desc, &ConfigMap::new()).unwrap_err();
            assert!(matches!(err, FormatError::Unsupported(f) if f == format));
        }
    }

    #[test]
    fn descriptor_at_keeps_format() {
        let desc = ConfigDescriptor::new("/etc/app/config.toml", ConfigFormat::Toml);
        let staged = desc.at("/etc/app/config.toml.tmp.123");
        assert_eq!(staged.format, ConfigFormat::Toml);
        assert_eq!(staged.path, PathBuf::from("/etc/app/config.toml.tmp.123"));
    }

    #[test]
    fn guessed_descriptor() {
        let desc = ConfigDescriptor::guessed("/tmp/x.yml");
        assert_eq!(desc.format, ConfigFormat::Yaml);
    }
}
