use crate::error::{fatal, Error, Result};
use crate::fabric::{create_fabric, Backend, Fabric, FabricComm};
use crate::protocol::{
    Category, GetRequestHeader, MessageHeader, PutHeader, GET_REQUEST_HEADER_LEN,
    MESSAGE_HEADER_LEN, PUT_HEADER_LEN,
};
use crate::registry::{InboxSink, Registry};
use crate::superstep;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Per-destination tallies of the communication scheduled this superstep.
/// Reset to zero at the end of every `sync`.
pub(crate) struct Counters {
    pub(crate) put_counts: Vec<i64>,
    pub(crate) get_counts: Vec<i64>,
    pub(crate) msg_counts: Vec<i64>,
    /// outstanding futures awaiting get responses
    pub(crate) local_gets: i64,
}

impl Counters {
    fn new(num_pes: usize) -> Counters {
        Counters {
            put_counts: vec![0; num_pes],
            get_counts: vec![0; num_pes],
            msg_counts: vec![0; num_pes],
            local_gets: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.put_counts.iter_mut().for_each(|c| *c = 0);
        self.get_counts.iter_mut().for_each(|c| *c = 0);
        self.msg_counts.iter_mut().for_each(|c| *c = 0);
        self.local_gets = 0;
    }
}

/// The shared guts of a world. The `World` handle holds the only strong
/// reference; variables, queues and futures hold weak ones, which is how
/// use-after-teardown surfaces as `WorldGone` instead of undefined behavior.
pub(crate) struct WorldState {
    fabric: Fabric,
    my_pe: usize,
    num_pes: usize,
    pub(crate) registry: Mutex<Registry>,
    pub(crate) counters: Mutex<Counters>,
    epoch: AtomicUsize,
    alive: AtomicBool,
}

impl WorldState {
    pub(crate) fn my_pe(&self) -> usize {
        self.my_pe
    }

    pub(crate) fn num_pes(&self) -> usize {
        self.num_pes
    }

    pub(crate) fn fabric(&self) -> &Fabric {
        &self.fabric
    }

    /// The current superstep number; advanced by every completed `sync`.
    pub(crate) fn epoch(&self) -> usize {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn advance_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn check_pe(&self, pe: usize) -> Result<()> {
        if pe < self.num_pes {
            Ok(())
        } else {
            Err(Error::BadProcessor {
                pe,
                num_pes: self.num_pes,
            })
        }
    }

    /// Upgrade a handle's weak reference, refusing handles that outlived
    /// their world.
    pub(crate) fn upgrade(world: &Weak<WorldState>) -> Result<Arc<WorldState>> {
        match world.upgrade() {
            Some(state) if state.alive.load(Ordering::Acquire) => Ok(state),
            _ => Err(Error::WorldGone),
        }
    }

    pub(crate) fn register_location(&self, addr: usize, size: usize) -> i32 {
        let id = self.registry.lock().register_location(addr, size);
        trace!("[{}] registered location {} ({} bytes)", self.my_pe, id, size);
        id
    }

    /// Collective: the barrier guarantees no in-flight put or get still
    /// references the cell when the mapping disappears.
    pub(crate) fn unregister_location(&self, id: i32) {
        if let Err(err) = self.fabric.barrier() {
            warn!("[{}] barrier failed during deregistration: {}", self.my_pe, err);
        }
        self.registry.lock().unregister_location(id);
        trace!("[{}] unregistered location {}", self.my_pe, id);
    }

    pub(crate) fn register_queue(&self, sink: Arc<dyn InboxSink>) -> i32 {
        let id = self.registry.lock().register_queue(sink);
        trace!("[{}] registered queue {}", self.my_pe, id);
        id
    }

    pub(crate) fn unregister_queue(&self, id: i32) {
        if let Err(err) = self.fabric.barrier() {
            warn!("[{}] barrier failed during deregistration: {}", self.my_pe, err);
        }
        self.registry.lock().unregister_queue(id);
        trace!("[{}] unregistered queue {}", self.my_pe, id);
    }

    /// Enqueue a one-sided write of `data` into image `dst` of variable
    /// `var_id`, at element granularity. Visible after the next barrier.
    pub(crate) fn put(
        &self,
        dst: usize,
        var_id: i32,
        elem_offset: usize,
        elem_size: usize,
        data: &[u8],
    ) -> Result<()> {
        self.check_pe(dst)?;
        let mut payload = Vec::with_capacity(PUT_HEADER_LEN + data.len());
        PutHeader {
            var_id,
            byte_offset: (elem_offset * elem_size) as u64,
        }
        .encode_into(&mut payload);
        payload.extend_from_slice(data);
        self.fabric.send_bytes(dst, Category::VarPut, payload)?;
        self.counters.lock().put_counts[dst] += 1;
        Ok(())
    }

    /// Enqueue a one-sided read of `count` elements from image `dst` of
    /// variable `var_id`. The response is written through `target` during
    /// the next `sync`; `target` is opaque to the remote side.
    pub(crate) fn get(
        &self,
        dst: usize,
        var_id: i32,
        elem_offset: usize,
        elem_size: usize,
        count: usize,
        target: u64,
    ) -> Result<()> {
        self.check_pe(dst)?;
        let mut payload = Vec::with_capacity(GET_REQUEST_HEADER_LEN);
        GetRequestHeader {
            var_id,
            byte_offset: (elem_offset * elem_size) as u64,
            count: count as i32,
            elem_size: elem_size as u64,
            target,
        }
        .encode_into(&mut payload);
        self.fabric.send_bytes(dst, Category::VarGetRequest, payload)?;
        let mut counters = self.counters.lock();
        counters.get_counts[dst] += 1;
        counters.local_gets += 1;
        Ok(())
    }

    /// Enqueue a tagged message for queue `queue_id` on processor `dst`.
    pub(crate) fn send_message(
        &self,
        dst: usize,
        queue_id: i32,
        tag: &[u8],
        content: &[u8],
    ) -> Result<()> {
        self.check_pe(dst)?;
        let mut payload = Vec::with_capacity(MESSAGE_HEADER_LEN + tag.len() + content.len());
        MessageHeader {
            queue_id,
            tag_size: tag.len() as u32,
            content_size: content.len() as u32,
        }
        .encode_into(&mut payload);
        payload.extend_from_slice(tag);
        payload.extend_from_slice(content);
        self.fabric.send_bytes(dst, Category::Message, payload)?;
        self.counters.lock().msg_counts[dst] += 1;
        Ok(())
    }
}

/// The per-processor facade of the runtime.
///
/// A world is created once per processor (all processors together, in the
/// same program order) and owns the registration table, the communication
/// accounting and the fabric. All deferred communication scheduled through
/// variables and queues commits at [`World::sync`].
///
/// Dropping the world is collective and tears it down; handles that outlive
/// it report [`Error::WorldGone`](crate::Error::WorldGone).
pub struct World {
    state: Arc<WorldState>,
}

impl World {
    pub(crate) fn new(fabric: Fabric) -> World {
        let my_pe = fabric.my_pe();
        let num_pes = fabric.num_pes();
        let state = Arc::new(WorldState {
            fabric,
            my_pe,
            num_pes,
            registry: Mutex::new(Registry::new()),
            counters: Mutex::new(Counters::new(num_pes)),
            epoch: AtomicUsize::new(0),
            alive: AtomicBool::new(true),
        });
        if let Err(err) = state.fabric.barrier() {
            fatal(err);
        }
        trace!("[{}] world created with {} processors", my_pe, num_pes);
        World { state }
    }

    pub(crate) fn state(&self) -> &Arc<WorldState> {
        &self.state
    }

    /// The number of active processors `P`, fixed for the world's lifetime.
    pub fn active_processors(&self) -> usize {
        self.state.num_pes
    }

    /// This processor's id `s`, with `0 <= s < P`.
    pub fn processor_id(&self) -> usize {
        self.state.my_pe
    }

    /// `(s + 1) % P`, the conventional neighbor for rotation patterns.
    pub fn next_processor(&self) -> usize {
        (self.state.my_pe + 1) % self.state.num_pes
    }

    /// `(s + P - 1) % P`.
    pub fn prev_processor(&self) -> usize {
        (self.state.my_pe + self.state.num_pes - 1) % self.state.num_pes
    }

    /// A bare global barrier. This synchronizes the processors but does not
    /// drain any pending communication; almost always `sync` is what you
    /// want.
    pub fn barrier(&self) {
        if let Err(err) = self.state.fabric.barrier() {
            fatal(err);
        }
    }

    /// Close the current superstep: drain every pending put, get and
    /// message, make their effects visible, and open the next superstep.
    ///
    /// Every active processor must call `sync` the same number of times;
    /// the call blocks until all of them have. A protocol or transport
    /// failure is fatal and aborts the processor.
    pub fn sync(&self) {
        if let Err(err) = superstep::run(&self.state) {
            fatal(err);
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        trace!("[{}] world dropping", self.state.my_pe);
        self.state.alive.store(false, Ordering::Release);
        if let Err(err) = self.state.fabric.barrier() {
            warn!("[{}] barrier failed during world teardown: {}", self.state.my_pe, err);
        }
        self.state.fabric.shutdown();
    }
}

/// Builds a single-process [`World`].
///
/// Multi-processor worlds are spawned through
/// [`Environment`](crate::Environment), which hands one world to each
/// processor thread; the builder covers the `P = 1` development case.
pub struct WorldBuilder {
    backend: Backend,
}

impl WorldBuilder {
    pub fn new() -> WorldBuilder {
        trace!("new world builder");
        WorldBuilder {
            backend: Default::default(),
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> WorldBuilder {
        self.backend = backend;
        self
    }

    pub fn build(self) -> World {
        World::new(create_fabric(self.backend))
    }
}

impl Default for WorldBuilder {
    fn default() -> Self {
        WorldBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_processor_world() {
        let world = WorldBuilder::new().with_backend(Backend::Local).build();
        assert_eq!(world.active_processors(), 1);
        assert_eq!(world.processor_id(), 0);
        assert_eq!(world.next_processor(), 0);
        assert_eq!(world.prev_processor(), 0);
    }

    #[test]
    fn counters_reset_after_sync() {
        let world = WorldBuilder::new().with_backend(Backend::Local).build();
        let mut cell = 0i32.to_le_bytes();
        let id = world.state().register_location(cell.as_mut_ptr() as usize, 4);
        world.state().put(0, id, 0, 4, &5i32.to_le_bytes()).unwrap();
        assert_eq!(world.state().counters.lock().put_counts[0], 1);
        world.sync();
        assert_eq!(world.state().counters.lock().put_counts[0], 0);
        assert_eq!(i32::from_le_bytes(cell), 5);
        world.state().registry.lock().unregister_location(id);
    }
}
