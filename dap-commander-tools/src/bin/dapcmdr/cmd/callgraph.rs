use std::path::PathBuf;

use anyhow::Context;
use dap_commander_debug::FunctionTable;

use crate::config::{Config, DialectChoice};

/// Print the functions of a disassembly listing with their callees and callers
///
/// e.g. dapcmdr callgraph firmware.dis --dialect gcc
#[derive(clap::Parser)]
#[clap(verbatim_doc_comment)]
pub struct Cmd {
    /// The disassembly listing
    listing: PathBuf,
    /// Format of the listing, defaults to the configured dialect
    #[clap(long, value_enum)]
    dialect: Option<DialectChoice>,
}

impl Cmd {
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let dialect = self.dialect.unwrap_or(config.callgraph.dialect);

        let table = FunctionTable::from_file(&self.listing, dialect.dialect())
            .with_context(|| format!("Failed to load {}", self.listing.display()))?;

        if table.is_empty() {
            tracing::warn!(
                "No functions found in {}, is the dialect right?",
                self.listing.display()
            );
        }

        print!("{table}");
        Ok(())
    }
}
