use dap_commander::{
    architecture::arm::core::registers::cortex_m, CoreRegister, RegisterKind,
};

/// List the core registers and how they are accessed
///
/// e.g. dapcmdr registers basepri
#[derive(clap::Parser)]
#[clap(verbatim_doc_comment)]
pub struct Cmd {
    /// Only show this register
    name: Option<String>,
}

impl Cmd {
    pub fn run(self) -> anyhow::Result<()> {
        let registers: Vec<&CoreRegister> = match &self.name {
            Some(name) => {
                let id = cortex_m::resolve(name)?;
                cortex_m::CORTEX_M_REGISTERS
                    .iter()
                    .filter(|register| register.id == id)
                    .collect()
            }
            None => cortex_m::CORTEX_M_REGISTERS.iter().collect(),
        };

        println!("{:<10} {:>5}  ACCESS", "NAME", "INDEX");
        for register in registers {
            println!(
                "{:<10} {:>5}  {}",
                register.name,
                register.id.index(),
                describe(register.id.kind())
            );
        }

        Ok(())
    }
}

fn describe(kind: RegisterKind) -> String {
    match kind {
        RegisterKind::Ordinary(selector) => format!("DCRSR selector {selector}"),
        RegisterKind::PackedByte { combined, shift } => {
            format!("bits {}..{} of DCRSR selector {combined}", shift, shift + 7)
        }
        RegisterKind::FloatingPoint(selector) => {
            format!("DCRSR selector {selector:#04x}, FPU only")
        }
    }
}
