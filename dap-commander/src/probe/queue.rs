use core::fmt;
use std::{collections::HashMap, sync::Arc};

use crate::architecture::arm::PortType;
use crate::probe::DapError;

/// A single DAP register transfer waiting in a [`TransferQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DapTransfer {
    /// Read a DP or AP register.
    Read { port: PortType, address: u8 },
    /// Write a DP or AP register.
    Write {
        port: PortType,
        address: u8,
        value: u32,
    },
}

impl DapTransfer {
    /// The port the transfer targets.
    pub fn port(&self) -> PortType {
        match self {
            DapTransfer::Read { port, .. } | DapTransfer::Write { port, .. } => *port,
        }
    }
}

/// An error that occurred while a queue was executed.
///
/// The results of the transfers that completed before the failing one are kept,
/// so they can still be taken by their issuers.
#[derive(thiserror::Error, Debug)]
#[error("{error} after {} completed reads", results.len())]
pub struct BatchExecutionError {
    /// The error that aborted the batch.
    #[source]
    pub error: DapError,

    /// The results of the reads that completed before the error occurred.
    pub results: DeferredResultSet<u32>,
}

/// The set of results returned by executing a batch of transfers.
pub struct DeferredResultSet<T>(HashMap<DeferredResultIndex, T>);

impl<T: fmt::Debug> fmt::Debug for DeferredResultSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeferredResultSet").field(&self.0).finish()
    }
}

impl<T> Default for DeferredResultSet<T> {
    fn default() -> Self {
        Self(HashMap::default())
    }
}

impl<T> DeferredResultSet<T> {
    /// Creates a new empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty result set with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(HashMap::with_capacity(capacity))
    }

    pub(crate) fn push(&mut self, idx: &DeferredResultIndex, result: T) {
        self.0.insert(idx.clone(), result);
    }

    /// Returns the number of results in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Moves all results of `other` into this set.
    ///
    /// Results whose index has been dropped by the issuer are discarded.
    pub fn merge_from(&mut self, other: DeferredResultSet<T>) {
        self.0.extend(other.0);
        self.0.retain(|k, _| k.should_capture());
    }

    /// Takes a result from the set.
    ///
    /// If the result is not (yet) present, the index is handed back.
    pub fn take(&mut self, index: DeferredResultIndex) -> Result<T, DeferredResultIndex> {
        self.0.remove(&index).ok_or(index)
    }
}

/// An index type used to retrieve the result of a deferred read.
///
/// Indices can only be created by a [`TransferQueue`], and compare by identity.
#[derive(Eq)]
pub struct DeferredResultIndex(Arc<()>);

impl PartialEq for DeferredResultIndex {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DeferredResultIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeferredResultIndex")
            .field(&self.id())
            .finish()
    }
}

impl DeferredResultIndex {
    // Intentionally private. User code must not be able to create these.
    fn new() -> Self {
        Self(Arc::new(()))
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub(crate) fn should_capture(&self) -> bool {
        // The queue and the issuer each hold one reference. If the issuer dropped
        // theirs, nobody can read the value anymore.
        Arc::strong_count(&self.0) > 1
    }

    // Intentionally private. User code must not be able to clone these.
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl std::hash::Hash for DeferredResultIndex {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state)
    }
}

/// An ordered list of DAP transfers that a transport executes in one go.
///
/// Reads hand out a [`DeferredResultIndex`] which is later used to take the value
/// from the [`DeferredResultSet`] returned by [`TransferQueue::execute`].
#[derive(Debug, Default)]
pub struct TransferQueue {
    transfers: Vec<(Option<DeferredResultIndex>, DapTransfer)>,
}

impl TransferQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a register read and returns the index of its future result.
    pub fn schedule_read(&mut self, port: PortType, address: u8) -> DeferredResultIndex {
        let index = DeferredResultIndex::new();
        self.transfers
            .push((Some(index.clone()), DapTransfer::Read { port, address }));
        index
    }

    /// Schedules a register write.
    pub fn schedule_write(&mut self, port: PortType, address: u8, value: u32) {
        self.transfers.push((
            None,
            DapTransfer::Write {
                port,
                address,
                value,
            },
        ));
    }

    /// Returns the number of transfers in the queue.
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    /// Returns whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Drains the queue, handing every transfer to `transfer` in the order it was scheduled.
    ///
    /// `transfer` returns the read value for reads. The first failing transfer
    /// aborts the batch; the remaining transfers are discarded.
    pub fn execute<F>(&mut self, mut transfer: F) -> Result<DeferredResultSet<u32>, BatchExecutionError>
    where
        F: FnMut(&DapTransfer) -> Result<Option<u32>, DapError>,
    {
        let mut results = DeferredResultSet::with_capacity(self.transfers.len());

        for (index, command) in self.transfers.drain(..) {
            match transfer(&command) {
                Ok(value) => {
                    if let (Some(index), Some(value)) = (index, value) {
                        if index.should_capture() {
                            results.push(&index, value);
                        }
                    }
                }
                Err(error) => return Err(BatchExecutionError { error, results }),
            }
        }

        Ok(results)
    }
}
