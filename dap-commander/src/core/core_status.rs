/// The execution state of a core.
///
/// The state is never cached; it is derived from DHCSR every time it is queried.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CoreStatus {
    /// The core is currently running.
    Running,
    /// The core is halted in debug state.
    Halted,
    /// The core is held in reset.
    Reset,
    /// The core is sleeping and waits for an interrupt or event.
    Sleeping,
    /// The core is locked up because of an unrecoverable exception.
    LockedUp,
}

impl CoreStatus {
    /// Returns `true` if the core is currently halted.
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted)
    }

    /// Returns `true` if the core is currently running.
    pub fn is_running(&self) -> bool {
        self == &Self::Running
    }
}

impl std::fmt::Display for CoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CoreStatus::Running => "running",
            CoreStatus::Halted => "halted",
            CoreStatus::Reset => "in reset",
            CoreStatus::Sleeping => "sleeping",
            CoreStatus::LockedUp => "locked up",
        };
        f.write_str(name)
    }
}
