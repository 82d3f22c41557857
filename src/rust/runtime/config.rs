// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
};
use ::std::{
    fs::File,
    io::Read,
    ops::Index,
    str::FromStr,
    thread,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Runtime options.
mod runtime_config {
    pub const SECTION_NAME: &str = "nestsched";
    // Most harts the broker hands out.
    pub const MAX_HARTS: &str = "max_harts";
    // Default fiber stack size in bytes.
    pub const STACK_SIZE: &str = "stack_size";
    // Spins before a busy-wait starts yielding its OS thread.
    pub const SPIN_LIMIT: &str = "spin_limit";
}

/// Configuration used when none is supplied.
const DEFAULT_CONFIG: &str = "nestsched: {}\n";

//======================================================================================================================
// Structures
//======================================================================================================================

/// Runtime configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: String) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(&config_path)?.read_to_string(&mut config_s)?;
        config_s.parse()
    }

    /// Most harts the runtime will ever own at once. Defaults to the available parallelism of the machine.
    pub fn max_harts(&self) -> Result<usize, Fail> {
        let max_harts: usize = match Self::get_typed_env_option(runtime_config::MAX_HARTS)? {
            Some(max_harts) => max_harts,
            None => match self.get_int_option(runtime_config::MAX_HARTS)? {
                Some(max_harts) => max_harts,
                None => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            },
        };

        if max_harts == 0 || max_harts > limits::MAX_HARTS_LIMIT {
            let cause: String = format!("parameter \"{}\" is out of range", runtime_config::MAX_HARTS);
            error!("max_harts(): {}", cause);
            return Err(Fail::new(libc::ERANGE, &cause));
        }
        Ok(max_harts)
    }

    /// Default fiber stack size in bytes.
    pub fn stack_size(&self) -> Result<usize, Fail> {
        let stack_size: usize = match Self::get_typed_env_option(runtime_config::STACK_SIZE)? {
            Some(stack_size) => stack_size,
            None => self
                .get_int_option(runtime_config::STACK_SIZE)?
                .unwrap_or(limits::STACK_SIZE_DEFAULT),
        };

        if stack_size < limits::STACK_SIZE_MIN {
            let cause: String = format!("parameter \"{}\" is out of range", runtime_config::STACK_SIZE);
            error!("stack_size(): {}", cause);
            return Err(Fail::new(libc::ERANGE, &cause));
        }
        Ok(stack_size)
    }

    /// Spin iterations before a busy-wait starts yielding its OS thread.
    pub fn spin_limit(&self) -> Result<usize, Fail> {
        let spin_limit: usize = match Self::get_typed_env_option(runtime_config::SPIN_LIMIT)? {
            Some(spin_limit) => spin_limit,
            None => self
                .get_int_option(runtime_config::SPIN_LIMIT)?
                .unwrap_or(limits::SPIN_LIMIT_DEFAULT),
        };

        if spin_limit == 0 {
            let cause: String = format!("parameter \"{}\" is out of range", runtime_config::SPIN_LIMIT);
            error!("spin_limit(): {}", cause);
            return Err(Fail::new(libc::ERANGE, &cause));
        }
        Ok(spin_limit)
    }

    /// Returns the runtime section, if there is one.
    fn get_runtime_config(&self) -> Result<Option<&Yaml>, Fail> {
        match self.0.index(runtime_config::SECTION_NAME) {
            Yaml::BadValue | Yaml::Null => Ok(None),
            section @ Yaml::Hash(_) => Ok(Some(section)),
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", runtime_config::SECTION_NAME);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Reads an integer option from the runtime section, verifying that the destination type may hold it. Missing
    /// options are not an error.
    fn get_int_option<T: TryFrom<i64>>(&self, index: &str) -> Result<Option<T>, Fail> {
        let section: &Yaml = match self.get_runtime_config()? {
            Some(section) => section,
            None => return Ok(None),
        };
        match section.index(index) {
            Yaml::BadValue | Yaml::Null => Ok(None),
            Yaml::Integer(val) => match T::try_from(*val) {
                Ok(val) => Ok(Some(val)),
                _ => {
                    let message: String = format!("parameter \"{}\" is out of range", index);
                    Err(Fail::new(libc::ERANGE, message.as_str()))
                },
            },
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Get value where the environment value overrides the config file if it exists.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        // Check for the environment variable.
        if let Ok(var) = ::std::env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter {} has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl FromStr for Config {
    type Err = Fail;

    /// Parses a configuration document.
    fn from_str(config_s: &str) -> Result<Self, Self::Err> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(e) => {
                let cause: String = format!("malformed configuration ({})", e);
                error!("from_str(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let config_obj: &Yaml = match &config[..] {
            &[ref c] => c,
            _ => return Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        };

        Ok(Self(config_obj.clone()))
    }
}

impl Default for Config {
    fn default() -> Self {
        match DEFAULT_CONFIG.parse() {
            Ok(config) => config,
            Err(_) => Self(Yaml::Hash(Default::default())),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
