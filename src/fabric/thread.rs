use crate::env_var::config;
use crate::error::{Error, Result};
use crate::fabric::{Backend, FabricComm};
use crate::protocol::{Category, Frame, NUM_CATEGORIES};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Multi-processor fabric for a single process: one OS thread per logical
/// processor, one unbounded channel per (receiver, category).
///
/// A channel is a FIFO, so frames from one sender arrive in the order they
/// were sent, which is the per-sender-per-category guarantee the queue
/// delivery order is built on. Cross-sender interleaving is whatever the
/// channel produces.
pub(crate) struct ThreadFabric {
    my_pe: usize,
    num_pes: usize,
    /// senders indexed by [destination][category]
    txs: Vec<Vec<Sender<Frame>>>,
    /// receivers for this processor, indexed by category
    rxs: Vec<Receiver<Frame>>,
    shared: Arc<ThreadShared>,
}

struct ThreadShared {
    barrier: GenerationBarrier,
    /// P x P count matrix for the reduce-scatter, row = source processor
    counts: Vec<AtomicI64>,
}

/// Create the fabrics for a group of `num_pes` processors. Each member is
/// handed to exactly one thread; the members share the barrier and the
/// count matrix.
pub(crate) fn create_group(num_pes: usize) -> Vec<ThreadFabric> {
    assert!(num_pes >= 1, "a fabric group needs at least one processor");
    let shared = Arc::new(ThreadShared {
        barrier: GenerationBarrier::new(num_pes),
        counts: (0..num_pes * num_pes).map(|_| AtomicI64::new(0)).collect(),
    });

    let mut tx_table: Vec<Vec<Sender<Frame>>> = Vec::with_capacity(num_pes);
    let mut rx_table: Vec<Vec<Receiver<Frame>>> = Vec::with_capacity(num_pes);
    for _pe in 0..num_pes {
        let mut txs = Vec::with_capacity(NUM_CATEGORIES);
        let mut rxs = Vec::with_capacity(NUM_CATEGORIES);
        for _cat in 0..NUM_CATEGORIES {
            let (tx, rx) = unbounded();
            txs.push(tx);
            rxs.push(rx);
        }
        tx_table.push(txs);
        rx_table.push(rxs);
    }

    rx_table
        .into_iter()
        .enumerate()
        .map(|(pe, rxs)| ThreadFabric {
            my_pe: pe,
            num_pes,
            txs: tx_table.clone(),
            rxs,
            shared: shared.clone(),
        })
        .collect()
}

impl FabricComm for ThreadFabric {
    fn my_pe(&self) -> usize {
        self.my_pe
    }

    fn num_pes(&self) -> usize {
        self.num_pes
    }

    fn backend(&self) -> Backend {
        Backend::Thread
    }

    fn barrier(&self) -> Result<()> {
        trace!("[{}] thread fabric barrier", self.my_pe);
        self.shared.barrier.wait(self.my_pe);
        Ok(())
    }

    fn send_bytes(&self, dst: usize, cat: Category, payload: Vec<u8>) -> Result<()> {
        self.txs[dst][cat.index()]
            .send(Frame {
                src: self.my_pe,
                payload,
            })
            .map_err(|_| Error::TransportFailure(format!("processor {} is gone", dst)))
    }

    fn recv_any(&self, cat: Category) -> Result<Frame> {
        self.rxs[cat.index()]
            .recv()
            .map_err(|_| Error::TransportFailure(format!("all {:?} senders disconnected", cat)))
    }

    fn reduce_scatter_sum(&self, counts: &[i64]) -> Result<i64> {
        let p = self.num_pes;
        debug_assert_eq!(counts.len(), p);
        for (dst, count) in counts.iter().enumerate() {
            self.shared.counts[self.my_pe * p + dst].store(*count, Ordering::Relaxed);
        }
        // the barrier publishes every row before any column is read, and
        // holds the matrix steady until every column has been read
        self.shared.barrier.wait(self.my_pe);
        let sum = (0..p)
            .map(|src| self.shared.counts[src * p + self.my_pe].load(Ordering::Relaxed))
            .sum();
        self.shared.barrier.wait(self.my_pe);
        Ok(sum)
    }

    fn shutdown(&self) {
        trace!("[{}] thread fabric shutting down", self.my_pe);
    }
}

/// Counting barrier on a mutex and condvar. A processor stuck here past the
/// configured deadlock timeout logs a warning and keeps waiting; there is no
/// timeout semantics in the protocol, only a diagnostic.
struct GenerationBarrier {
    lock: Mutex<BarrierState>,
    cvar: Condvar,
    parties: usize,
}

struct BarrierState {
    arrived: usize,
    generation: u64,
}

impl GenerationBarrier {
    fn new(parties: usize) -> GenerationBarrier {
        GenerationBarrier {
            lock: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            cvar: Condvar::new(),
            parties,
        }
    }

    fn wait(&self, my_pe: usize) {
        let mut state = self.lock.lock();
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return;
        }
        let generation = state.generation;
        let timeout = Duration::from_secs_f64(config().deadlock_timeout);
        let mut warned = false;
        while state.generation == generation {
            if self.cvar.wait_for(&mut state, timeout).timed_out()
                && state.generation == generation
                && !warned
            {
                warn!(
                    "[{}] barrier has waited longer than {:?}; a peer may have died",
                    my_pe, timeout
                );
                warned = true;
            }
        }
    }
}
