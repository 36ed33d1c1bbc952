//! Listing formats of the supported toolchains.
//!
//! All dialects share the same structure: a label line naming a function, followed
//! by a block of instruction lines which ends at a dialect specific boundary.
//! They differ in how labels, addresses and calls are spelled.

use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{CallSite, Function, FunctionTable};

/// A parser for the listing format of one toolchain.
pub trait DisassemblyDialect: Sync {
    /// Name of the toolchain the format belongs to.
    fn name(&self) -> &'static str;

    /// Parses `text`, or returns `None` if no function was found.
    fn try_parse(&self, text: &str) -> Option<FunctionTable>;
}

/// The dialects tried, in order, when none is given explicitly.
pub(super) fn auto_detect_order() -> [&'static dyn DisassemblyDialect; 3] {
    [&Mdk, &Gcc, &Iar]
}

/// Selects one of the supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Keil MDK `fromelf -c` output.
    Mdk,
    /// GNU `objdump -d` output.
    Gcc,
    /// IAR `ielfdump --code` output.
    Iar,
}

impl Dialect {
    pub fn strategy(self) -> &'static dyn DisassemblyDialect {
        match self {
            Dialect::Mdk => &Mdk,
            Dialect::Gcc => &Gcc,
            Dialect::Iar => &Iar,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.strategy().name())
    }
}

/// Unknown disassembly dialect '{0}', expected one of `mdk`, `gcc` or `iar`
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub struct UnknownDialect(String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mdk" => Ok(Dialect::Mdk),
            "gcc" => Ok(Dialect::Gcc),
            "iar" => Ok(Dialect::Iar),
            _ => Err(UnknownDialect(s.to_string())),
        }
    }
}

/// How a dialect spells the parts of a function block.
struct ListingSyntax {
    /// A function label. Captures `name`, and `address` if the label carries one.
    label: Regex,
    /// The first body line, which carries the start address in `address`.
    /// Without it, the start address is taken from the label.
    first_instruction: Option<Regex>,
    /// Any instruction line, capturing its `address`.
    instruction: Regex,
    /// A call to a named function. Captures `address` and `callee`.
    call: Regex,
    /// The line ending a function body.
    terminator: fn(&str) -> bool,
}

impl ListingSyntax {
    fn parse(&self, text: &str) -> Option<FunctionTable> {
        let lines = text.lines().collect::<Vec<_>>();
        let mut table = FunctionTable::default();

        let mut line = 0;
        while line < lines.len() {
            let Some(label) = self.label.captures(lines[line]) else {
                line += 1;
                continue;
            };

            let name = &label["name"];
            let body_begin = line + 1;

            let start = match &self.first_instruction {
                Some(first) => lines
                    .get(body_begin)
                    .and_then(|text| first.captures(text))
                    .and_then(|captures| parse_address(&captures["address"])),
                None => label
                    .name("address")
                    .and_then(|address| parse_address(address.as_str())),
            };
            let Some(start) = start else {
                line += 1;
                continue;
            };

            // The end of the listing also ends the last function.
            let body_end = (body_begin..lines.len())
                .find(|&index| (self.terminator)(lines[index]))
                .unwrap_or(lines.len());
            let body = &lines[body_begin..body_end];

            let end = body
                .iter()
                .rev()
                .find(|text| !text.trim().is_empty())
                .and_then(|text| self.instruction.captures(text))
                .and_then(|captures| parse_address(&captures["address"]))
                .unwrap_or(start);

            let mut function = Function::new(name, start, end);
            function.callees = body
                .iter()
                .filter_map(|text| self.call.captures(text))
                .filter_map(|captures| {
                    Some(CallSite {
                        address: parse_address(&captures["address"])?,
                        callee: captures["callee"].to_string(),
                    })
                })
                .collect();

            tracing::trace!(
                "{} @ {:#010x} - {:#010x}, {} calls",
                function.name,
                function.start,
                function.end,
                function.callees.len()
            );
            table.insert(function);

            line = body_end.max(body_begin);
        }

        (!table.is_empty()).then_some(table)
    }
}

/// Parses a hexadecimal address, with or without `0x` prefix and `'` digit separators.
fn parse_address(text: &str) -> Option<u32> {
    let digits = text
        .trim_start_matches("0x")
        .chars()
        .filter(|&c| c != '\'')
        .collect::<String>();

    u32::from_str_radix(&digits, 16).ok()
}

fn regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(error) => panic!("invalid listing pattern {pattern}: {error}"),
    }
}

static MDK_SYNTAX: Lazy<ListingSyntax> = Lazy::new(|| ListingSyntax {
    label: regex(r"^ {4}(?P<name>[A-Za-z_][A-Za-z0-9_]*)$"),
    first_instruction: Some(regex(r"^ {8}(?P<address>0x[0-9a-f]{8}):")),
    instruction: regex(r"^ {8}(?P<address>0x[0-9a-f]{8}):"),
    call: regex(
        r"^ {8}(?P<address>0x[0-9a-f]{8}):\s+[0-9a-f]{4,8}\s+\S+\s+B[L.W]*\s+(?P<callee>[A-Za-z_][A-Za-z0-9_]*) ;",
    ),
    terminator: |line| {
        line.strip_prefix("    ").is_some_and(|rest| {
            rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$')
        })
    },
});

static GCC_SYNTAX: Lazy<ListingSyntax> = Lazy::new(|| ListingSyntax {
    label: regex(r"^(?P<address>[0-9a-f]{8}) <(?P<name>[A-Za-z_][A-Za-z0-9_]*)>:"),
    first_instruction: None,
    instruction: regex(r"^\s+(?P<address>[0-9a-f]{1,8}):\s+[0-9a-f]{4}"),
    call: regex(
        r"^\s+(?P<address>[0-9a-f]{1,8}):.+?bl\s+[0-9a-f]+\s<(?P<callee>[A-Za-z_][A-Za-z0-9_]*)>",
    ),
    terminator: |line| line.trim().is_empty(),
});

static IAR_SYNTAX: Lazy<ListingSyntax> = Lazy::new(|| ListingSyntax {
    label: regex(r"^\s+(?P<name>[A-Za-z_][A-Za-z0-9_]+):$"),
    first_instruction: Some(regex(r"^\s+(?P<address>0x[0-9a-f']+): 0x[0-9a-f]{4}")),
    instruction: regex(r"^\s+(?P<address>0x[0-9a-f']+): 0x[0-9a-f]{4}"),
    call: regex(
        r"^\s+(?P<address>0x[0-9a-f']+): 0x[0-9a-f]{4} 0x[0-9a-f]{4}\s+BL\s+(?P<callee>[A-Za-z_][A-Za-z0-9_]+)\s+; 0x[0-9a-f']+",
    ),
    terminator: |line| {
        let rest = line.trim_start();
        rest.len() < line.len()
            && (rest.starts_with('$')
                || rest.starts_with("`.text")
                || rest
                    .strip_prefix("// ")
                    .is_some_and(|comment| comment.starts_with(|c: char| c == '}' || c.is_ascii_lowercase())))
    },
});

/// Keil MDK `fromelf -c` listings.
///
/// Labels are indented by four spaces, instructions by eight. A function ends
/// at the next line indented by four spaces.
#[derive(Debug, Clone, Copy)]
pub struct Mdk;

impl DisassemblyDialect for Mdk {
    fn name(&self) -> &'static str {
        "mdk"
    }

    fn try_parse(&self, text: &str) -> Option<FunctionTable> {
        MDK_SYNTAX.parse(text)
    }
}

/// GNU `objdump -d` listings.
///
/// Labels carry the function address. A function ends at the next empty line.
#[derive(Debug, Clone, Copy)]
pub struct Gcc;

impl DisassemblyDialect for Gcc {
    fn name(&self) -> &'static str {
        "gcc"
    }

    fn try_parse(&self, text: &str) -> Option<FunctionTable> {
        GCC_SYNTAX.parse(text)
    }
}

/// IAR `ielfdump --code` listings.
///
/// Addresses may contain `'` digit separators. A function ends at a mapping
/// symbol, a section marker or a lowercase comment line.
#[derive(Debug, Clone, Copy)]
pub struct Iar;

impl DisassemblyDialect for Iar {
    fn name(&self) -> &'static str {
        "iar"
    }

    fn try_parse(&self, text: &str) -> Option<FunctionTable> {
        IAR_SYNTAX.parse(text)
    }
}
