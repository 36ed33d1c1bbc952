use std::path::{Path, PathBuf};

use anyhow::bail;
use dap_commander_debug::call_graph::Dialect;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::util::logging::{LogFormat, LogLevel};

/// Name of the project specific configuration file, looked up in the working directory.
const CONFIG_FILE: &str = "dapcmdr.toml";
/// Prefix of configuration values given through the environment, e.g. `DAPCMDR_UNWIND__WORDS`.
const ENV_PREFIX: &str = "DAPCMDR_";
/// Variables sharing the prefix which are command line options, not configuration values.
const ENV_IGNORED: &[&str] = &["config"];

/// The layered configuration sources.
#[derive(Debug, Clone)]
pub struct Configs {
    figment: Figment,
}

/// The main struct holding all the possible config options.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub general: General,
    pub callgraph: CallGraph,
    pub unwind: Unwind,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct General {
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CallGraph {
    pub dialect: DialectChoice,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Unwind {
    pub words: usize,
}

/// A listing format, or automatic detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DialectChoice {
    /// Try MDK, GCC and IAR in this order
    Auto,
    /// Keil MDK `fromelf -c`
    Mdk,
    /// GNU `objdump -d`
    Gcc,
    /// IAR `ielfdump --code`
    Iar,
}

impl DialectChoice {
    pub fn dialect(self) -> Option<Dialect> {
        match self {
            DialectChoice::Auto => None,
            DialectChoice::Mdk => Some(Dialect::Mdk),
            DialectChoice::Gcc => Some(Dialect::Gcc),
            DialectChoice::Iar => Some(Dialect::Iar),
        }
    }
}

impl Configs {
    pub fn new(conf_dir: &Path) -> Configs {
        let figment = Figment::new()
            .merge(Toml::string(include_str!("default.toml")).nested())
            .merge(Toml::file(conf_dir.join(CONFIG_FILE)).nested())
            .merge(Env::prefixed(ENV_PREFIX).ignore(ENV_IGNORED).split("__"));

        Configs { figment }
    }

    /// Adds a configuration file given on the command line. It takes precedence over all other sources.
    pub fn merge(&mut self, conf_file: PathBuf) -> anyhow::Result<()> {
        let original = self.figment.clone();
        self.figment = match conf_file.extension().and_then(|e| e.to_str()) {
            Some("toml") => original.merge(Toml::file(conf_file).nested()),
            _ => bail!("Configuration files have to be TOML files (.toml)"),
        };
        Ok(())
    }

    pub fn extract(self) -> anyhow::Result<Config> {
        match self.figment.extract::<Config>() {
            Ok(config) => Ok(config),
            Err(errors) => bail!(
                "Failed to parse supplied configuration:\n{}",
                errors
                    .into_iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<String>>()
                    .join("\n")
            ),
        }
    }

    #[cfg(test)]
    fn with_test_data(mut self, data: &str) -> Configs {
        self.figment = self.figment.merge(Toml::string(data).nested());
        self
    }
}
