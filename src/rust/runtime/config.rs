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

// Scheduler options. These apply to every pool built from this configuration.
mod pool_config {
    pub const SECTION_NAME: &str = "forkpool";
    // Number of worker threads.
    pub const WORKER_COUNT: &str = "worker_count";
    // Sequential cutoff used when a caller does not provide one.
    pub const CUTOFF_DEFAULT: &str = "cutoff_default";
    // Victim selection order when stealing.
    pub const STEAL_STRATEGY: &str = "steal_strategy";
    // Stride hint for the instrumentation ledger.
    pub const CACHE_LINE_SIZE_HINT: &str = "cache_line_size_hint";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scheduler configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

/// Victim selection order used by idle workers when stealing from siblings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StealStrategy {
    /// Scan siblings from a rotating start index.
    RoundRobin,
    /// Pick victims at random.
    Random,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

/// Common associated functions for the configuration object.
impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: String) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::from_yaml_str(&config_s)
    }

    /// Parses a configuration object out of a YAML string.
    pub fn from_yaml_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(e) => {
                let cause: String = format!("malformed configuration: {:?}", e);
                error!("from_yaml_str(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let config_obj: &Yaml = match &config[..] {
            &[ref c] => c,
            _ => return Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        };

        Ok(Self { 0: config_obj.clone() })
    }

    /// Reads the number of worker threads. Defaults to the hardware concurrency of the host.
    pub fn worker_count(&self) -> Result<usize, Fail> {
        let count: usize = if let Some(count) = Self::get_typed_env_option(pool_config::WORKER_COUNT)? {
            count
        } else if let Some(section) = self.get_pool_config()? {
            match Self::get_optional(section, pool_config::WORKER_COUNT) {
                Some(_) => Self::get_int_option(section, pool_config::WORKER_COUNT)?,
                None => return Ok(Self::default_worker_count()),
            }
        } else {
            return Ok(Self::default_worker_count());
        };

        if count == 0 {
            let cause: String = format!("parameter \"{}\" must be at least one", pool_config::WORKER_COUNT);
            error!("worker_count(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(count)
    }

    /// Reads the sequential cutoff applied when a caller passes a cutoff of zero.
    pub fn cutoff_default(&self) -> Result<usize, Fail> {
        let cutoff: usize = if let Some(cutoff) = Self::get_typed_env_option(pool_config::CUTOFF_DEFAULT)? {
            cutoff
        } else if let Some(section) = self.get_pool_config()? {
            match Self::get_optional(section, pool_config::CUTOFF_DEFAULT) {
                Some(_) => Self::get_int_option(section, pool_config::CUTOFF_DEFAULT)?,
                None => return Ok(limits::DEFAULT_CUTOFF),
            }
        } else {
            return Ok(limits::DEFAULT_CUTOFF);
        };

        if cutoff == 0 {
            let cause: String = format!("parameter \"{}\" must be at least one", pool_config::CUTOFF_DEFAULT);
            error!("cutoff_default(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(cutoff)
    }

    /// Reads the steal strategy. Defaults to round-robin victim selection.
    pub fn steal_strategy(&self) -> Result<StealStrategy, Fail> {
        if let Some(strategy) = Self::get_typed_env_option(pool_config::STEAL_STRATEGY)? {
            return Ok(strategy);
        }
        if let Some(section) = self.get_pool_config()? {
            if Self::get_optional(section, pool_config::STEAL_STRATEGY).is_some() {
                return Self::get_typed_str_option(section, pool_config::STEAL_STRATEGY, |val: &str| {
                    StealStrategy::from_str(val).ok()
                });
            }
        }
        Ok(StealStrategy::RoundRobin)
    }

    /// Reads the cache line size hint used to stride the instrumentation ledger. Must be a power of two.
    pub fn cache_line_size_hint(&self) -> Result<usize, Fail> {
        let hint: usize = if let Some(hint) = Self::get_typed_env_option(pool_config::CACHE_LINE_SIZE_HINT)? {
            hint
        } else if let Some(section) = self.get_pool_config()? {
            match Self::get_optional(section, pool_config::CACHE_LINE_SIZE_HINT) {
                Some(_) => Self::get_int_option(section, pool_config::CACHE_LINE_SIZE_HINT)?,
                None => return Ok(limits::DEFAULT_CACHE_LINE_SIZE),
            }
        } else {
            return Ok(limits::DEFAULT_CACHE_LINE_SIZE);
        };

        if !hint.is_power_of_two() {
            let cause: String = format!("parameter \"{}\" must be a power of two", pool_config::CACHE_LINE_SIZE_HINT);
            error!("cache_line_size_hint(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(hint)
    }

    //==================================================================================================================
    // Static Functions
    //==================================================================================================================

    /// Number of workers used when neither the environment nor the file names one.
    pub(crate) fn default_worker_count() -> usize {
        match thread::available_parallelism() {
            Ok(count) => count.get(),
            Err(_) => 1,
        }
    }

    /// Finds the scheduler section of the configuration, if present.
    fn get_pool_config(&self) -> Result<Option<&Yaml>, Fail> {
        match Self::get_optional(&self.0, pool_config::SECTION_NAME) {
            Some(section) => match section {
                Yaml::Hash(_) => Ok(Some(section)),
                _ => {
                    let message: String = format!("parameter \"{}\" has unexpected type", pool_config::SECTION_NAME);
                    Err(Fail::new(libc::EINVAL, message.as_str()))
                },
            },
            None => Ok(None),
        }
    }

    /// Index `yaml` to find the value at `index`, returning None when the option is absent.
    fn get_optional<'a>(yaml: &'a Yaml, index: &str) -> Option<&'a Yaml> {
        match yaml.index(index) {
            Yaml::BadValue => None,
            value => Some(value),
        }
    }

    /// Index `yaml` to find the value at `index`, validating that the index exists.
    fn get_option<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => {
                let message: String = format!("missing configuration option \"{}\"", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
            value => Ok(value),
        }
    }

    /// Index `yaml` to find the value at `index`, validating that it exists and that the receiver returns Some(_).
    fn get_typed_option<'a, T, Fn>(yaml: &'a Yaml, index: &str, receiver: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&'a Yaml) -> Option<T>,
    {
        let option: &'a Yaml = Self::get_option(yaml, index)?;
        match receiver(option) {
            Some(value) => Ok(value),
            None => {
                let message: String = format!("parameter \"{}\" has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Index `yaml` to find value at `index`, validating it as a string.
    fn get_typed_str_option<T, Fn>(yaml: &Yaml, index: &str, parser: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&str) -> Option<T>,
    {
        let option: &Yaml = Self::get_option(yaml, index)?;
        if let Some(value) = option.as_str() {
            if let Some(value) = parser(value) {
                return Ok(value);
            }
        }
        let message: String = format!("parameter \"{}\" has unexpected type", index);
        Err(Fail::new(libc::EINVAL, message.as_str()))
    }

    /// Get value where the environment value overrides the config file if it exists.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        // Check for the environment variable.
        if let Ok(var) = ::std::env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter \"{}\" has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }

    /// Similar to `get_typed_option` using `Yaml::as_i64` as the receiver, but additionally verifies that the
    /// destination type may hold the i64 value.
    fn get_int_option<T: TryFrom<i64>>(yaml: &Yaml, index: &str) -> Result<T, Fail> {
        let val: i64 = Self::get_typed_option(yaml, index, &Yaml::as_i64)?;
        match T::try_from(val) {
            Ok(val) => Ok(val),
            _ => {
                let message: String = format!("parameter \"{}\" is out of range", index);
                Err(Fail::new(libc::ERANGE, message.as_str()))
            },
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Conversion trait implementation for steal strategies.
impl FromStr for StealStrategy {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            _ => {
                let cause: String = format!("unsupported steal strategy: {}", s);
                Err(Fail::new(libc::EINVAL, &cause))
            },
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
