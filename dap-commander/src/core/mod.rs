mod core_status;
mod memory_mapped_registers;
mod registers;

pub use core_status::CoreStatus;
pub use memory_mapped_registers::MemoryMappedRegister;
pub use registers::{CoreRegister, RegisterId, RegisterKind, COMBINED_REGISTER_SELECTOR};
