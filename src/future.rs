use crate::error::{Error, Result};
use crate::var::Dist;
use crate::world::WorldState;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Weak;
use tracing::trace;

/// A write-once placeholder for the result of a deferred remote read.
///
/// A future is created pending by [`VarImage::get`](crate::VarImage::get)
/// and becomes ready inside the next [`sync`](crate::World::sync), when the
/// get response is written into its slot. Reading it earlier fails with
/// [`Error::NotReady`](crate::Error::NotReady).
///
/// The slot is heap allocated and its address travels with the get request,
/// so the handle itself may be moved freely at any time. A future dropped
/// while still pending leaks its slot instead of freeing it: the response
/// arriving at the next sync still writes through the captured address.
#[must_use = "a future delivers its value only after the next sync"]
pub struct Future<T: Dist> {
    slot: Option<Box<UnsafeCell<MaybeUninit<T>>>>,
    ready_epoch: usize,
    world: Weak<WorldState>,
}

impl<T: Dist> Future<T> {
    /// Allocate a pending slot and the wire-level target pointer that the
    /// remote side echoes back.
    pub(crate) fn reserve() -> (Box<UnsafeCell<MaybeUninit<T>>>, u64) {
        let slot: Box<UnsafeCell<MaybeUninit<T>>> = Box::new(UnsafeCell::new(MaybeUninit::uninit()));
        let target = slot.get() as u64;
        (slot, target)
    }

    pub(crate) fn new(
        slot: Box<UnsafeCell<MaybeUninit<T>>>,
        world: Weak<WorldState>,
        ready_epoch: usize,
    ) -> Future<T> {
        Future {
            slot: Some(slot),
            ready_epoch,
            world,
        }
    }

    /// The delivered value, once the sync following the get has completed.
    pub fn value(&self) -> Result<T> {
        let state = WorldState::upgrade(&self.world)?;
        if state.epoch() < self.ready_epoch {
            return Err(Error::NotReady);
        }
        let slot = self.slot.as_ref().expect("pending slot outlives the handle");
        // the completing sync wrote the response through the slot address
        Ok(unsafe { (*slot.get()).assume_init() })
    }
}

impl<T: Dist> Drop for Future<T> {
    fn drop(&mut self) {
        let pending = match WorldState::upgrade(&self.world) {
            Ok(state) => state.epoch() < self.ready_epoch,
            Err(_) => false,
        };
        if pending {
            // the in-flight response will still write through the slot
            // address; freeing it here would hand the transport a dangling
            // pointer, so the slot is abandoned to the allocator instead
            if let Some(slot) = self.slot.take() {
                trace!("future dropped while pending; leaking its slot");
                let _ = Box::into_raw(slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldBuilder;
    use crate::{Backend, Var};

    #[test]
    fn pending_until_sync() {
        let world = WorldBuilder::new().with_backend(Backend::Local).build();
        let a = Var::<i32>::with_value(&world, 21);
        let f = a.image(0).unwrap().get();
        assert_eq!(f.value(), Err(Error::NotReady));
        world.sync();
        assert_eq!(f.value(), Ok(21));
    }

    #[test]
    fn ready_future_survives_later_syncs() {
        let world = WorldBuilder::new().with_backend(Backend::Local).build();
        let a = Var::<i32>::with_value(&world, 4);
        let f = a.image(0).unwrap().get();
        world.sync();
        world.sync();
        assert_eq!(f.value(), Ok(4));
    }

    #[test]
    fn moving_the_handle_keeps_the_slot() {
        let world = WorldBuilder::new().with_backend(Backend::Local).build();
        let a = Var::<i32>::with_value(&world, 8);
        let f = a.image(0).unwrap().get();
        let moved = f;
        world.sync();
        assert_eq!(moved.value(), Ok(8));
    }

    #[test]
    fn dropping_a_pending_future_is_harmless() {
        let world = WorldBuilder::new().with_backend(Backend::Local).build();
        let a = Var::<i32>::with_value(&world, 1);
        drop(a.image(0).unwrap().get());
        // the response still arrives and writes into the leaked slot
        world.sync();
    }

    #[test]
    fn world_teardown_turns_reads_into_world_gone() {
        let world = WorldBuilder::new().with_backend(Backend::Local).build();
        let a = Var::<i32>::with_value(&world, 2);
        let f = a.image(0).unwrap().get();
        world.sync();
        drop(a);
        drop(world);
        assert_eq!(f.value(), Err(Error::WorldGone));
    }
}
