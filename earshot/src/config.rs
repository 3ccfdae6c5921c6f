// SPDX-License-Identifier: GPL-3.0-or-later

//! This module defines the configuration of the application.
//!
//! The configuration is either loaded from a file or used with default
//! values, which are defined in the code. The configuration file syntax is
//! based on the YAML format and the default file name is `earshot.yml`.
//!
//! The configuration file location is searched in the following order:
//! 1. The current working directory
//! 2. The local configuration directory of the user
//! 3. The configuration directory of the user
//! 4. The local configuration directory of the application
//! 5. The configuration directory of the application
//!
//! ```yaml
//! schema: 1.0
//!
//! intercept:
//!   library: /usr/libexec/earshot/libearshot_preload.so
//!   reporter: /usr/libexec/earshot/earshot-supervisor
//!
//! compilers:
//!   - path: /usr/local/bin/mpicc
//!
//! sources:
//!   strict: true
//!   include: ["/opt/project/sources"]
//!   exclude: ["/opt/project/tests"]
//!
//! format:
//!   command_as_array: true
//!   drop_output_field: false
//! ```

// Re-Export the types and the loader module content.
pub use loader::{ConfigError, Loader};
pub use types::*;

mod types {
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    /// Represents the application configuration.
    #[derive(Debug, PartialEq, Deserialize, Serialize)]
    pub struct Main {
        #[serde(deserialize_with = "validate_schema_version")]
        pub schema: String,
        #[serde(default)]
        pub intercept: Intercept,
        #[serde(default)]
        pub compilers: Vec<Compiler>,
        #[serde(default)]
        pub sources: SourceFilter,
        #[serde(default)]
        pub format: Format,
    }

    impl Default for Main {
        fn default() -> Self {
            Self {
                schema: String::from(SUPPORTED_SCHEMA_VERSION),
                intercept: Intercept::default(),
                compilers: vec![],
                sources: SourceFilter::default(),
                format: Format::default(),
            }
        }
    }

    /// The runtime components of the interception.
    ///
    /// The library is injected into every process of the build via
    /// `LD_PRELOAD`, the reporter is the supervisor executable the library
    /// routes every exec call through.
    #[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
    pub struct Intercept {
        #[serde(default = "default_preload_library")]
        pub library: PathBuf,
        #[serde(default = "default_supervisor_executable")]
        pub reporter: PathBuf,
    }

    impl Default for Intercept {
        fn default() -> Self {
            Self {
                library: default_preload_library(),
                reporter: default_supervisor_executable(),
            }
        }
    }

    /// An extra compiler executable the recogniser shall accept.
    ///
    /// The built-in name patterns cover the common cases; site specific
    /// wrappers (like an MPI compiler front-end on a non-standard path)
    /// can be declared here.
    #[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
    pub struct Compiler {
        pub path: PathBuf,
    }

    /// Controls which entries make it into the compilation database.
    ///
    /// The default is permissive: every recognised entry is accepted. The
    /// strict mode accepts an entry only if the source file exists and the
    /// include/exclude directory roots allow it.
    #[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
    pub struct SourceFilter {
        #[serde(default)]
        pub strict: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub include: Vec<PathBuf>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub exclude: Vec<PathBuf>,
    }

    /// Controls the shape of the emitted compilation database entries.
    #[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
    pub struct Format {
        #[serde(default = "default_enabled")]
        pub command_as_array: bool,
        #[serde(default)]
        pub drop_output_field: bool,
    }

    impl Default for Format {
        fn default() -> Self {
            Self {
                command_as_array: true,
                drop_output_field: false,
            }
        }
    }

    const SUPPORTED_SCHEMA_VERSION: &str = "1.0";
    const PRELOAD_LIBRARY_PATH: &str = env!("PRELOAD_LIBRARY_PATH");
    const SUPERVISOR_EXECUTABLE_PATH: &str = env!("SUPERVISOR_EXECUTABLE_PATH");

    pub(super) fn default_preload_library() -> PathBuf {
        PathBuf::from(PRELOAD_LIBRARY_PATH)
    }

    pub(super) fn default_supervisor_executable() -> PathBuf {
        PathBuf::from(SUPERVISOR_EXECUTABLE_PATH)
    }

    fn default_enabled() -> bool {
        true
    }

    // Custom deserialization function to validate the schema version
    fn validate_schema_version<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let schema: String = Deserialize::deserialize(deserializer)?;
        if schema != SUPPORTED_SCHEMA_VERSION {
            use serde::de::Error;
            Err(Error::custom(format!(
                "Unsupported schema version: {schema}. Expected: {SUPPORTED_SCHEMA_VERSION}"
            )))
        } else {
            Ok(schema)
        }
    }
}

mod loader {
    use super::Main;
    use directories::{BaseDirs, ProjectDirs};
    use std::fs::OpenOptions;
    use std::path::{Path, PathBuf};
    use thiserror::Error;

    pub struct Loader {}

    impl Loader {
        /// Loads the configuration from the specified file or the default
        /// locations.
        ///
        /// If the configuration file is specified, it will be used. Otherwise
        /// the default locations will be searched for the configuration file.
        /// If no configuration file is found, the default configuration will
        /// be returned.
        pub fn load(filename: &Option<String>) -> Result<Main, ConfigError> {
            if let Some(path) = filename {
                Self::from_file(Path::new(path))
            } else {
                for location in Self::file_locations() {
                    log::debug!("Checking configuration file: {}", location.display());
                    if location.exists() {
                        return Self::from_file(location.as_path());
                    }
                }
                log::debug!("Configuration file not found. Using the default configuration.");
                Ok(Main::default())
            }
        }

        fn file_locations() -> Vec<PathBuf> {
            let mut locations = Vec::new();

            if let Ok(current_dir) = std::env::current_dir() {
                locations.push(current_dir);
            }
            if let Some(base_dirs) = BaseDirs::new() {
                locations.push(base_dirs.config_local_dir().to_path_buf());
                locations.push(base_dirs.config_dir().to_path_buf());
            }
            if let Some(proj_dirs) = ProjectDirs::from("com.github", "earshot-project", "earshot")
            {
                locations.push(proj_dirs.config_local_dir().to_path_buf());
                locations.push(proj_dirs.config_dir().to_path_buf());
            }
            locations.dedup();
            locations.iter().map(|p| p.join("earshot.yml")).collect()
        }

        /// Loads the configuration from the specified file.
        pub fn from_file(path: &Path) -> Result<Main, ConfigError> {
            log::info!("Loading configuration file: {}", path.display());

            let reader = OpenOptions::new().read(true).open(path).map_err(|source| {
                ConfigError::FileAccess {
                    path: path.to_path_buf(),
                    source,
                }
            })?;

            let content: Main =
                serde_yml::from_reader(reader).map_err(|source| ConfigError::ParseError {
                    path: path.to_path_buf(),
                    source,
                })?;

            Ok(content)
        }
    }

    /// Represents all possible configuration-related errors.
    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("Failed to access configuration file '{path}': {source}")]
        FileAccess {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("Failed to parse configuration from file '{path}': {source}")]
        ParseError {
            path: PathBuf,
            #[source]
            source: serde_yml::Error,
        },
    }
}
