// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::platform::mock::MockPlatform;
use crate::platform::software::SoftwarePlatform;
use crate::platform::Platform;

pub use self::error::ConfigError;

mod error;

/// Prefix of environment variables that override file settings, e.g.
/// `SAMPLEPOOL_BACKEND=mock`.
pub const ENV_PREFIX: &str = "SAMPLEPOOL";

/// Default size of the worker pool used for blocking calls.
pub const DEFAULT_MAX_BLOCKING_THREADS: usize = 8;

/// Which platform backs the session manager.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process pools that decode into memory.
    #[default]
    Software,
    /// Pools that record calls and never finish a load on their own.
    Mock,
}

/// Settings for the session manager.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    /// Where load-from-bytes and remote loads are staged.
    #[serde(default = "default_scratch_dir")]
    scratch_dir: PathBuf,

    /// Where bundled resources (`moderate_1.wav` ...) are found.
    #[serde(default = "default_builtin_dir")]
    builtin_dir: PathBuf,

    #[serde(default)]
    backend: Backend,

    /// Remove scratch files left by an earlier process when starting.
    #[serde(default = "default_sweep_on_start")]
    sweep_on_start: bool,

    #[serde(default = "default_max_blocking_threads")]
    max_blocking_threads: usize,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("samplepool")
}

fn default_builtin_dir() -> PathBuf {
    PathBuf::from("assets/builtin")
}

fn default_sweep_on_start() -> bool {
    true
}

fn default_max_blocking_threads() -> usize {
    DEFAULT_MAX_BLOCKING_THREADS
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            scratch_dir: default_scratch_dir(),
            builtin_dir: default_builtin_dir(),
            backend: Backend::default(),
            sweep_on_start: default_sweep_on_start(),
            max_blocking_threads: default_max_blocking_threads(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional YAML file, then applies environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()?
            .validate()
    }

    /// Parses settings from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Settings, ConfigError> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Settings>()?
            .validate()
    }

    fn validate(self) -> Result<Settings, ConfigError> {
        if self.max_blocking_threads == 0 {
            return Err(ConfigError::Invalid {
                key: "max_blocking_threads",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(self)
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn builtin_dir(&self) -> &Path {
        &self.builtin_dir
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn sweep_on_start(&self) -> bool {
        self.sweep_on_start
    }

    pub fn max_blocking_threads(&self) -> usize {
        self.max_blocking_threads
    }

    /// Builds the platform selected by these settings.
    pub fn platform(&self) -> Arc<dyn Platform> {
        match self.backend {
            Backend::Software => Arc::new(SoftwarePlatform::new(&self.builtin_dir)),
            Backend::Mock => Arc::new(MockPlatform::new()),
        }
    }
}
