//! The fabric is the transport layer of the runtime: it moves category-tagged
//! byte frames between processors and provides the global barrier and the
//! count exchange that the superstep protocol is built on.
//!
//! Backends are dispatched through the [`Fabric`] enum rather than trait
//! objects, so the compiler can specialize the protocol paths per backend.

use crate::env_var::config;
use crate::error::Result;
use crate::protocol::{Category, Frame};
use enum_dispatch::enum_dispatch;

pub(crate) mod local;
pub(crate) mod thread;

use local::LocalFabric;
use thread::ThreadFabric;

/// The list of available fabric backends, used to specify how data is
/// transfered between processors.
#[derive(Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Clone, Copy)]
pub enum Backend {
    /// Single processor loopback -- intended for single process development
    Local,
    /// One OS thread per processor in a single process -- intended for
    /// emulating distributed environments and for the test suite
    Thread,
}

impl Default for Backend {
    fn default() -> Self {
        match config().backend.as_str() {
            "thread" => Backend::Thread,
            _ => Backend::Local,
        }
    }
}

#[enum_dispatch]
pub(crate) trait FabricComm {
    fn my_pe(&self) -> usize;
    fn num_pes(&self) -> usize;
    fn backend(&self) -> Backend;
    /// Global synchronization of all active processors.
    fn barrier(&self) -> Result<()>;
    /// Per-sender-per-category FIFO delivery of one frame.
    fn send_bytes(&self, dst: usize, cat: Category, payload: Vec<u8>) -> Result<()>;
    /// Blocking receive of the next frame of a category, from any sender.
    fn recv_any(&self, cat: Category) -> Result<Frame>;
    /// Standard count exchange: every processor contributes a P-length
    /// vector, every processor receives the sum of its own column.
    fn reduce_scatter_sum(&self, counts: &[i64]) -> Result<i64>;
    fn shutdown(&self);
}

#[enum_dispatch(FabricComm)]
pub(crate) enum Fabric {
    Local(LocalFabric),
    Thread(ThreadFabric),
}

pub(crate) fn create_fabric(backend: Backend) -> Fabric {
    match backend {
        Backend::Local => Fabric::Local(LocalFabric::new()),
        Backend::Thread => {
            // a single-member group; multi processor groups are created by
            // the environment, which owns all the members
            let mut group = thread::create_group(1);
            Fabric::Thread(group.remove(0))
        }
    }
}
