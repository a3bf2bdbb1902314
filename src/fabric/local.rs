use crate::error::{Error, Result};
use crate::fabric::{Backend, FabricComm};
use crate::protocol::{Category, Frame, NUM_CATEGORIES};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::trace;

/// Single-processor fabric: every send is a loopback into a local queue.
///
/// The barrier is a no-op and the count exchange is the identity, which is
/// exactly the degenerate case of the protocol at P = 1.
pub(crate) struct LocalFabric {
    queues: Vec<Mutex<VecDeque<Frame>>>,
}

impl LocalFabric {
    pub(crate) fn new() -> LocalFabric {
        LocalFabric {
            queues: (0..NUM_CATEGORIES).map(|_| Mutex::new(VecDeque::new())).collect(),
        }
    }
}

impl FabricComm for LocalFabric {
    fn my_pe(&self) -> usize {
        0
    }

    fn num_pes(&self) -> usize {
        1
    }

    fn backend(&self) -> Backend {
        Backend::Local
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn send_bytes(&self, dst: usize, cat: Category, payload: Vec<u8>) -> Result<()> {
        if dst != 0 {
            return Err(Error::TransportFailure(format!(
                "local fabric cannot reach processor {}",
                dst
            )));
        }
        self.queues[cat.index()].lock().push_back(Frame { src: 0, payload });
        Ok(())
    }

    fn recv_any(&self, cat: Category) -> Result<Frame> {
        // all frames of a superstep are enqueued before the drain starts, so
        // an empty queue here means the counts and the traffic disagree
        self.queues[cat.index()].lock().pop_front().ok_or_else(|| {
            Error::TransportFailure(format!("no pending {:?} frame on local fabric", cat))
        })
    }

    fn reduce_scatter_sum(&self, counts: &[i64]) -> Result<i64> {
        Ok(counts[0])
    }

    fn shutdown(&self) {
        trace!("[0] local fabric shutting down");
    }
}
