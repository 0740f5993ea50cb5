use crate::models::SorterConfig;
use ::config::{Config, Environment, File, FileFormat};
use anyhow::{Context, Result, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Name of the settings file inside the config directory.
pub const SETTINGS_FILE_NAME: &str = "Sorter Config.yaml";

/// Prefix of environment overrides, e.g. `KSORT__SETTINGS__COPY__MAX_CONCURRENT=20`.
pub const ENV_PREFIX: &str = "KSORT";

/// Configuration manager for loading and saving `Sorter Config.yaml`.
///
/// Loading is layered: built-in defaults, then the YAML file if present, then `KSORT__*`
/// environment variables. Saving always writes the plain YAML file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE_NAME),
            config_dir,
        })
    }

    /// Load the configuration from defaults, file and environment.
    pub fn load_config(&self) -> Result<SorterConfig> {
        if self.settings_path.exists() {
            tracing::info!("Loading config from {}", self.settings_path);
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.settings_path
            );
        }

        let defaults = Config::try_from(&SorterConfig::default())
            .context("Failed to build default configuration")?;

        let config: SorterConfig = Config::builder()
            .add_source(defaults)
            .add_source(
                File::from(self.settings_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.settings_path))?;

        validate(&config)?;
        Ok(config)
    }

    /// Save the configuration file.
    pub fn save_config(&self, config: &SorterConfig) -> Result<()> {
        validate(config)?;
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.settings_path))?;

        tracing::info!("Saved config to {}", self.settings_path);
        Ok(())
    }

    /// Write a default config file unless one exists. Returns true when a file was written.
    pub fn write_default_config(&self) -> Result<bool> {
        if self.settings_path.exists() {
            tracing::info!("Config already exists at {}", self.settings_path);
            return Ok(false);
        }
        self.save_config(&SorterConfig::default())?;
        Ok(true)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

/// Reject settings the engine cannot run with.
pub fn validate(config: &SorterConfig) -> Result<()> {
    let settings = &config.settings;
    ensure!(
        settings.copy.max_concurrent >= 1,
        "copy.max_concurrent must be at least 1"
    );
    ensure!(
        settings.manifest.mesh_slots >= 1,
        "manifest.mesh_slots must be at least 1"
    );

    let converter = &settings.converter;
    for (name, value) in [
        ("skeleton_extension", &converter.skeleton_extension),
        ("pose_extension", &converter.pose_extension),
        ("output_extension", &converter.output_extension),
    ] {
        ensure!(
            !value.trim_start_matches('.').trim().is_empty(),
            "converter.{} must not be empty",
            name
        );
    }

    for version in &config.versions {
        ensure!(
            !version.name.trim().is_empty(),
            "version entries need a name (root {})",
            version.root
        );
    }

    Ok(())
}
