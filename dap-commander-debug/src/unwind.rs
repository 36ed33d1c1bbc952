//! Call stack reconstruction from raw stack memory.
//!
//! No frame pointers or unwind tables are used. Instead the stack is searched for
//! saved return addresses: a word on the stack is taken as the return address of
//! a call if it equals the address of a known call site plus five (the address
//! after the 32-bit `BL` instruction, with the Thumb bit set).

use std::fmt;

use crate::call_graph::FunctionTable;

/// Number of words the hardware pushes on exception entry.
const EXCEPTION_FRAME_WORDS: usize = 8;
/// Offset of the stacked LR in an exception frame.
const STACKED_LR: usize = 5;
/// Offset of the stacked PC in an exception frame.
const STACKED_PC: usize = 6;
/// Offset of the stacked xPSR in an exception frame.
const STACKED_XPSR: usize = 7;

/// Distance between a `BL` instruction and the return address it leaves in LR.
const RETURN_ADDRESS_OFFSET: u32 = 5;

/// One entry of a reconstructed call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// For the innermost frame of an exception, the interrupted instruction.
    /// Otherwise the return address found on the stack.
    pub address: u32,
    /// The function the address belongs to.
    pub function: String,
    /// Where in target memory the address was found.
    pub stack_address: u32,
}

/// A reconstructed call stack, innermost function first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack {
    /// The interrupted function, followed by its callers.
    pub frames: Vec<StackFrame>,
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Call Stack:")?;
        for frame in &self.frames {
            writeln!(f, "0x{:08X}  {}", frame.address, frame.function)?;
        }
        Ok(())
    }
}

/// The stack window could not be unwound.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, docsplay::Display)]
pub enum UnwindFailure {
    /// No functions parsed from disassembly
    NoFunctions,
    /// Invalid Exception Stack Frame
    InvalidExceptionFrame,
    /// Cannot find the function be interrupted
    InterruptedFunctionNotFound {
        /// The stacked PC, which lies in no known function.
        address: u32,
    },
}

/// Returns the stacked PC if an exception frame starts at `index`.
///
/// The stacked LR must be a Thumb address and the stacked PC a halfword aligned
/// address, both within the program. The stacked xPSR must have the Thumb bit set.
fn exception_frame_at(words: &[u32], index: usize, program: (u32, u32)) -> Option<u32> {
    let frame = words.get(index..index + EXCEPTION_FRAME_WORDS)?;
    let in_program = |address: u32| program.0 <= address && address <= program.1;

    let lr = frame[STACKED_LR];
    let pc = frame[STACKED_PC];
    let xpsr = frame[STACKED_XPSR];

    (in_program(lr) && lr & 1 == 1 && in_program(pc) && pc & 1 == 0 && (xpsr >> 24) & 1 == 1)
        .then_some(pc)
}

/// Reconstructs the call stack from `words`, read from target memory at `base`.
///
/// The window has to start with the exception frame of the fault. Further down,
/// every word is checked for a nested exception frame first and otherwise
/// compared against the call sites of the innermost function found so far.
/// The first matching call site wins.
pub fn unwind(functions: &FunctionTable, words: &[u32], base: u32) -> Result<CallStack, UnwindFailure> {
    let program = functions
        .address_range()
        .ok_or(UnwindFailure::NoFunctions)?;
    let stack_address = |index: usize| base.wrapping_add((index as u32).wrapping_mul(4));

    let mut stack = CallStack::default();
    let mut index = 0;

    while index < words.len() {
        if let Some(pc) = exception_frame_at(words, index, program) {
            let function = functions
                .function_at(pc)
                .ok_or(UnwindFailure::InterruptedFunctionNotFound { address: pc })?;

            tracing::debug!(
                "Exception frame at {:#010x}, interrupted {} at {:#010x}",
                stack_address(index),
                function.name,
                pc
            );
            stack.frames.push(StackFrame {
                address: pc,
                function: function.name.clone(),
                stack_address: stack_address(index + STACKED_PC),
            });
            index += EXCEPTION_FRAME_WORDS;
            continue;
        }

        let Some(innermost) = stack.frames.last() else {
            return Err(UnwindFailure::InvalidExceptionFrame);
        };

        let word = words[index];
        let caller = functions.get(&innermost.function).and_then(|function| {
            function
                .callers
                .iter()
                .find(|caller| word == caller.address.wrapping_add(RETURN_ADDRESS_OFFSET))
        });

        if let Some(caller) = caller {
            tracing::debug!(
                "Return address {:#010x} into {} at {:#010x}",
                word,
                caller.caller,
                stack_address(index)
            );
            let frame = StackFrame {
                address: word,
                function: caller.caller.clone(),
                stack_address: stack_address(index),
            };
            stack.frames.push(frame);
        }

        index += 1;
    }

    if stack.frames.is_empty() {
        return Err(UnwindFailure::InvalidExceptionFrame);
    }

    Ok(stack)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::call_graph::{CallSite, Function};

    /// `main` calls `foo` twice, `foo` calls `bar`.
    fn functions() -> FunctionTable {
        let mut main = Function::new("main", 0x0800_0150, 0x0800_015e);
        main.callees = vec![
            CallSite {
                address: 0x0800_0152,
                callee: "foo".to_string(),
            },
            CallSite {
                address: 0x0800_0156,
                callee: "foo".to_string(),
            },
        ];
        let mut foo = Function::new("foo", 0x0800_0160, 0x0800_0166);
        foo.callees = vec![CallSite {
            address: 0x0800_0162,
            callee: "bar".to_string(),
        }];
        let bar = Function::new("bar", 0x0800_0168, 0x0800_016e);

        let mut table = FunctionTable::default();
        table.insert(main);
        table.insert(foo);
        table.insert(bar);
        table.link_callers();
        table
    }

    fn exception_frame(lr: u32, pc: u32) -> [u32; 8] {
        [1, 2, 3, 4, 12, lr, pc, 0x0100_0000]
    }

    fn frames(stack: &CallStack) -> Vec<(u32, &str)> {
        stack
            .frames
            .iter()
            .map(|frame| (frame.address, frame.function.as_str()))
            .collect()
    }

    #[test]
    fn fault_in_nested_call() {
        let mut words = exception_frame(0x0800_0167, 0x0800_016a).to_vec();
        words.extend([0x2000_0100, 0x0800_0167, 0, 0x0800_0157, 0, 0, 0, 0]);

        let stack = unwind(&functions(), &words, 0x2000_0fe0);

        assert_eq!(
            stack.as_ref().map(frames),
            Ok(vec![
                (0x0800_016a, "bar"),
                (0x0800_0167, "foo"),
                (0x0800_0157, "main")
            ])
        );
        assert_eq!(
            stack.map(|stack| stack.frames[1].stack_address),
            Ok(0x2000_1004)
        );
    }

    #[test]
    fn second_call_site_is_found() {
        let mut words = exception_frame(0x0800_0167, 0x0800_0164).to_vec();
        words.push(0x0800_015b);

        let stack = unwind(&functions(), &words, 0);

        assert_eq!(
            stack.as_ref().map(frames),
            Ok(vec![(0x0800_0164, "foo"), (0x0800_015b, "main")])
        );
    }

    #[test]
    fn values_between_frames_are_skipped() {
        let mut words = exception_frame(0x0800_0167, 0x0800_016a).to_vec();
        words.extend([0xdead_beef, 0x0800_0157, 0x0800_0167]);

        let stack = unwind(&functions(), &words, 0);

        assert_eq!(
            stack.as_ref().map(frames),
            Ok(vec![(0x0800_016a, "bar"), (0x0800_0167, "foo")])
        );
    }

    #[test]
    fn nested_exception_frame() {
        let mut words = exception_frame(0x0800_0167, 0x0800_016a).to_vec();
        words.extend(exception_frame(0x0800_0157, 0x0800_0150));

        let stack = unwind(&functions(), &words, 0);

        assert_eq!(
            stack.as_ref().map(frames),
            Ok(vec![(0x0800_016a, "bar"), (0x0800_0150, "main")])
        );
    }

    #[test]
    fn rendering() {
        let mut words = exception_frame(0x0800_0167, 0x0800_016a).to_vec();
        words.push(0x0800_0167);

        let stack = unwind(&functions(), &words, 0).map(|stack| stack.to_string());

        assert_eq!(
            stack,
            Ok("Call Stack:\n0x0800016A  bar\n0x08000167  foo\n".to_string())
        );
    }

    #[test]
    fn malformed_exception_frame() {
        // The stacked PC is odd.
        let words = exception_frame(0x0800_0167, 0x0800_016b);

        let result = unwind(&functions(), &words, 0);

        assert_eq!(result, Err(UnwindFailure::InvalidExceptionFrame));
        assert_eq!(
            result.map_err(|failure| failure.to_string()),
            Err("Invalid Exception Stack Frame".to_string())
        );
    }

    #[test]
    fn exception_frame_without_thumb_state() {
        let mut table = FunctionTable::default();
        table.insert(Function::new("B", 0x1000, 0x1010));

        let words = [0, 0, 0, 0, 0, 0x1001, 0x1004, 0];

        assert_eq!(
            unwind(&table, &words, 0).map_err(|failure| failure.to_string()),
            Err("Invalid Exception Stack Frame".to_string())
        );
    }

    #[test]
    fn exception_frame_with_even_return_address() {
        let mut words = exception_frame(0x0800_0166, 0x0800_016a).to_vec();
        words.push(0x0800_0167);

        assert_eq!(
            unwind(&functions(), &words, 0),
            Err(UnwindFailure::InvalidExceptionFrame)
        );
    }

    #[test]
    fn short_window() {
        let words = [0x0800_0167, 0x0800_016a];

        assert_eq!(
            unwind(&functions(), &words, 0),
            Err(UnwindFailure::InvalidExceptionFrame)
        );
        assert_eq!(
            unwind(&functions(), &[], 0),
            Err(UnwindFailure::InvalidExceptionFrame)
        );
    }

    #[test]
    fn interrupted_address_between_functions() {
        let mut table = FunctionTable::default();
        table.insert(Function::new("low", 0x1000, 0x1010));
        table.insert(Function::new("high", 0x2000, 0x2010));

        let words = exception_frame(0x1001, 0x1800);

        let result = unwind(&table, &words, 0);

        assert_eq!(
            result,
            Err(UnwindFailure::InterruptedFunctionNotFound { address: 0x1800 })
        );
        assert_eq!(
            result.map_err(|failure| failure.to_string()),
            Err("Cannot find the function be interrupted".to_string())
        );
    }

    #[test]
    fn empty_function_table() {
        let words = exception_frame(0x0800_0167, 0x0800_016a);

        assert_eq!(
            unwind(&FunctionTable::default(), &words, 0).map_err(|failure| failure.to_string()),
            Err("No functions parsed from disassembly".to_string())
        );
    }
}
