use std::path::PathBuf;

use anyhow::Context;
use dap_commander_debug::{unwind, FunctionTable};

use crate::{
    config::{Config, DialectChoice},
    util::{parse_u32, parse_usize},
};

/// Reconstruct the call stack of a faulted core from a stack dump
///
/// The stack dump is a raw little endian memory image starting at the stack
/// pointer of the faulted core, beginning with the exception frame.
///
/// e.g. dapcmdr unwind firmware.dis stack.bin --words 128
#[derive(clap::Parser)]
#[clap(verbatim_doc_comment)]
pub struct Cmd {
    /// The disassembly listing
    listing: PathBuf,
    /// The raw stack memory image
    stack_dump: PathBuf,
    /// Format of the listing, defaults to the configured dialect
    #[clap(long, value_enum)]
    dialect: Option<DialectChoice>,
    /// Number of stack words to search, defaults to the configured value
    #[clap(long, value_parser = parse_usize)]
    words: Option<usize>,
    /// The address the stack dump was read from
    #[clap(long, value_parser = parse_u32, default_value = "0")]
    base: u32,
}

impl Cmd {
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let dialect = self.dialect.unwrap_or(config.callgraph.dialect);
        let words = self.words.unwrap_or(config.unwind.words);

        let table = FunctionTable::from_file(&self.listing, dialect.dialect())
            .with_context(|| format!("Failed to load {}", self.listing.display()))?;

        let dump = std::fs::read(&self.stack_dump)
            .with_context(|| format!("Failed to read {}", self.stack_dump.display()))?;
        let mut stack = decode_words(&dump);
        if stack.len() > words {
            stack.truncate(words);
        }
        tracing::debug!("Searching {} stack words", stack.len());

        match unwind(&table, &stack, self.base) {
            Ok(call_stack) => print!("{call_stack}"),
            Err(failure) => println!("{failure}"),
        }

        Ok(())
    }
}

/// Splits a little endian memory image into words. Trailing bytes are ignored.
fn decode_words(bytes: &[u8]) -> Vec<u32> {
    let words = bytes.chunks_exact(4);
    if !words.remainder().is_empty() {
        tracing::warn!(
            "Ignoring {} trailing bytes of the stack dump",
            words.remainder().len()
        );
    }

    words
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .collect()
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::decode_words;

    #[test]
    fn little_endian_words() {
        assert_eq!(
            decode_words(&[0x67, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0xff]),
            vec![0x0800_0167, 0x0100_0000]
        );
    }

    #[test]
    fn empty_dump() {
        assert_eq!(decode_words(&[]), Vec::<u32>::new());
    }
}
