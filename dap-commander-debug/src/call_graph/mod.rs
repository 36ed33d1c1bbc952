//! Static call graph recovered from a disassembly listing.

mod dialect;

use std::{collections::HashMap, fmt, path::Path};

pub use dialect::{Dialect, DisassemblyDialect, Gcc, Iar, Mdk, UnknownDialect};

/// Errors while loading a disassembly listing.
#[derive(Debug, thiserror::Error)]
pub enum CallGraphError {
    /// The listing could not be read.
    #[error("Failed to read the disassembly listing {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A call instruction inside a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Address of the branch with link instruction.
    pub address: u32,
    /// Name of the called function.
    pub callee: String,
}

/// A call site as seen from the called function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Name of the calling function.
    pub caller: String,
    /// Address of the branch with link instruction inside the caller.
    pub address: u32,
}

/// A function found in the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Symbol name as printed in the listing.
    pub name: String,
    /// Address of the first instruction.
    pub start: u32,
    /// Address of the last instruction, inclusive.
    pub end: u32,
    /// Calls made by this function, in listing order.
    pub callees: Vec<CallSite>,
    /// Calls of this function made by functions in the same table.
    pub callers: Vec<Caller>,
}

impl Function {
    pub(crate) fn new(name: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            callees: Vec::new(),
            callers: Vec::new(),
        }
    }

    /// Whether `address` lies within the inclusive address range of the function.
    pub fn contains(&self, address: u32) -> bool {
        self.start <= address && address <= self.end
    }
}

/// All functions of a listing, in order of their first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionTable {
    functions: Vec<Function>,
    by_name: HashMap<String, usize>,
}

impl FunctionTable {
    /// Parses a listing.
    ///
    /// With `dialect` set to `None`, all known dialects are tried in turn and
    /// the first one finding any function is used. The result is empty if no
    /// dialect recognized the listing.
    pub fn parse(text: &str, dialect: Option<Dialect>) -> Self {
        let candidates = match dialect {
            Some(dialect) => vec![dialect.strategy()],
            None => dialect::auto_detect_order().to_vec(),
        };

        for candidate in candidates {
            if let Some(mut table) = candidate.try_parse(text) {
                tracing::debug!(
                    "Found {} functions in a {} listing",
                    table.len(),
                    candidate.name()
                );
                table.link_callers();
                return table;
            }
        }

        tracing::warn!("No functions found in the disassembly listing");
        Self::default()
    }

    /// Reads and parses the listing at `path`.
    pub fn from_file(path: impl AsRef<Path>, dialect: Option<Dialect>) -> Result<Self, CallGraphError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CallGraphError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Self::parse(&text, dialect))
    }

    /// Adds a function. A function of the same name is replaced in place.
    pub(crate) fn insert(&mut self, function: Function) {
        match self.by_name.get(&function.name) {
            Some(&index) => self.functions[index] = function,
            None => {
                self.by_name
                    .insert(function.name.clone(), self.functions.len());
                self.functions.push(function);
            }
        }
    }

    /// Derives the callers of every function from the callees of all functions.
    pub(crate) fn link_callers(&mut self) {
        for function in &mut self.functions {
            function.callers.clear();
        }

        let edges = self
            .functions
            .iter()
            .flat_map(|function| {
                function.callees.iter().map(|site| {
                    (
                        site.callee.clone(),
                        Caller {
                            caller: function.name.clone(),
                            address: site.address,
                        },
                    )
                })
            })
            .collect::<Vec<_>>();

        for (callee, caller) in edges {
            if let Some(&index) = self.by_name.get(&callee) {
                self.functions[index].callers.push(caller);
            }
        }
    }

    /// Looks up a function by name.
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.by_name.get(name).map(|&index| &self.functions[index])
    }

    /// The functions in listing order.
    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// The first function in listing order containing `address`.
    pub fn function_at(&self, address: u32) -> Option<&Function> {
        self.functions
            .iter()
            .find(|function| function.contains(address))
    }

    /// The lowest start and the highest end address of all functions.
    pub fn address_range(&self) -> Option<(u32, u32)> {
        let start = self.functions.iter().map(|function| function.start).min()?;
        let end = self.functions.iter().map(|function| function.end).max()?;

        Some((start, end))
    }
}

impl<'a> IntoIterator for &'a FunctionTable {
    type Item = &'a Function;
    type IntoIter = std::slice::Iter<'a, Function>;

    fn into_iter(self) -> Self::IntoIter {
        self.functions.iter()
    }
}

impl fmt::Display for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for function in &self.functions {
            writeln!(
                f,
                "\n{:30} @ 0x{:08X} - 0x{:08X}",
                function.name, function.start, function.end
            )?;
            for site in &function.callees {
                writeln!(f, "    0x{:08X} {}", site.address, site.callee)?;
            }
        }

        for function in &self.functions {
            writeln!(f, "\n{:30} called by:", function.name)?;
            for caller in &function.callers {
                writeln!(f, "    {:30} @ 0x{:08X}", caller.caller, caller.address)?;
            }
        }

        Ok(())
    }
}
