use crate::error::{fatal, Result};
use crate::future::Future;
use crate::world::{World, WorldState};
use std::cell::UnsafeCell;
use std::mem;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Marker for types a registered variable can hold: plain data that can be
/// moved between processors as raw bytes.
pub trait Dist: Copy + Send + Sync + 'static {}

impl<T: Copy + Send + Sync + 'static> Dist for T {}

/// A registered variable: one image of a distributed variable, readable and
/// writable from every processor.
///
/// Construction is **collective** -- every processor constructs its vars in
/// the same program order, which is what gives the variable the same id
/// everywhere. The local cell is heap allocated, so its address is stable
/// for the variable's whole life and moving the handle moves only the
/// pointer to it.
///
/// Remote effects are deferred: a put or get scheduled through
/// [`image`](Var::image) commits at the next [`sync`](crate::World::sync).
/// Local access through [`value`](Var::value) is always immediate.
///
/// Dropping the variable deregisters it collectively; the drop contains a
/// barrier so that no in-flight access still references the cell.
///
/// ```
/// use strata::{Backend, Var, WorldBuilder};
///
/// let world = WorldBuilder::new().with_backend(Backend::Local).build();
/// let a = Var::<i32>::new(&world);
/// a.image(0).unwrap().put(12);
/// world.sync();
/// assert_eq!(*a.value(), 12);
/// ```
pub struct Var<T: Dist> {
    cell: Box<UnsafeCell<T>>,
    id: i32,
    world: Weak<WorldState>,
}

impl<T: Dist + Default> Var<T> {
    /// Register a fresh variable holding `T::default()`.
    pub fn new(world: &World) -> Var<T> {
        Var::with_value(world, T::default())
    }
}

impl<T: Dist> Var<T> {
    /// Register a fresh variable holding `value`.
    pub fn with_value(world: &World, value: T) -> Var<T> {
        let cell = Box::new(UnsafeCell::new(value));
        let id = world
            .state()
            .register_location(cell.get() as usize, mem::size_of::<T>());
        Var {
            cell,
            id,
            world: Arc::downgrade(world.state()),
        }
    }

    /// The collectively assigned variable id: the same integer on every
    /// processor.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Read access to the local cell. No communication, always current.
    pub fn value(&self) -> &T {
        unsafe { &*self.cell.get() }
    }

    /// Write access to the local cell. The write is immediately visible
    /// locally; remote processors never observe it directly, only through
    /// gets. The borrow must not be held across a `sync`, which writes
    /// incoming puts into the cell.
    pub fn value_mut(&mut self) -> &mut T {
        unsafe { &mut *self.cell.get() }
    }

    /// A selector for the image of this variable on processor `t`.
    pub fn image(&self, t: usize) -> Result<VarImage<'_, T>> {
        let state = WorldState::upgrade(&self.world)?;
        state.check_pe(t)?;
        Ok(VarImage {
            var: self,
            state,
            pe: t,
        })
    }

    /// Schedule a put of `value` to every processor, including this one.
    /// All images hold `value` after the next `sync`.
    pub fn broadcast(&self, value: T) -> Result<()> {
        let state = WorldState::upgrade(&self.world)?;
        for t in 0..state.num_pes() {
            self.schedule_put(&state, t, value)?;
        }
        Ok(())
    }

    fn schedule_put(&self, state: &Arc<WorldState>, dst: usize, value: T) -> Result<()> {
        let bytes = unsafe {
            std::slice::from_raw_parts(&value as *const T as *const u8, mem::size_of::<T>())
        };
        state.put(dst, self.id, 0, mem::size_of::<T>(), bytes)
    }
}

impl<T: Dist> Drop for Var<T> {
    fn drop(&mut self) {
        // collective deregistration; skipped when the world is already gone,
        // in which case nothing references the cell anymore either
        match WorldState::upgrade(&self.world) {
            Ok(state) => state.unregister_location(self.id),
            Err(_) => trace!("variable {} dropped after its world", self.id),
        }
    }
}

/// The image of a [`Var`] on one specific processor, the handle through
/// which remote reads and writes are scheduled.
pub struct VarImage<'a, T: Dist> {
    var: &'a Var<T>,
    state: Arc<WorldState>,
    pe: usize,
}

impl<T: Dist> VarImage<'_, T> {
    /// Schedule a write of `value` to this image. Takes effect at the next
    /// barrier; two puts from this processor to the same image in one
    /// superstep resolve to the later one.
    pub fn put(&self, value: T) {
        if let Err(err) = self.var.schedule_put(&self.state, self.pe, value) {
            fatal(err);
        }
    }

    /// Schedule a read of this image. The returned future becomes ready at
    /// the next barrier, holding the image's value as of that barrier --
    /// after the superstep's puts have been applied.
    pub fn get(&self) -> Future<T> {
        let (slot, target) = Future::reserve();
        if let Err(err) = self.state.get(
            self.pe,
            self.var.id,
            0,
            mem::size_of::<T>(),
            1,
            target,
        ) {
            fatal(err);
        }
        Future::new(slot, Arc::downgrade(&self.state), self.state.epoch() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::world::WorldBuilder;
    use crate::Backend;

    fn world() -> World {
        WorldBuilder::new().with_backend(Backend::Local).build()
    }

    #[test]
    fn local_value_access_is_immediate() {
        let world = world();
        let mut a = Var::<i32>::with_value(&world, 3);
        assert_eq!(*a.value(), 3);
        *a.value_mut() = 9;
        assert_eq!(*a.value(), 9);
    }

    #[test]
    fn image_out_of_range_is_bad_processor() {
        let world = world();
        let a = Var::<i32>::new(&world);
        assert!(matches!(
            a.image(1),
            Err(Error::BadProcessor { pe: 1, num_pes: 1 })
        ));
    }

    #[test]
    fn image_after_world_drop_is_world_gone() {
        let world = world();
        let a = Var::<i32>::new(&world);
        drop(world);
        assert!(matches!(a.image(0), Err(Error::WorldGone)));
    }

    #[test]
    fn put_is_deferred_until_sync() {
        let world = world();
        let a = Var::<i32>::with_value(&world, 1);
        a.image(0).unwrap().put(2);
        assert_eq!(*a.value(), 1, "a put must not be visible before sync");
        world.sync();
        assert_eq!(*a.value(), 2);
    }

    #[test]
    fn broadcast_reaches_self() {
        let world = world();
        let a = Var::<u64>::new(&world);
        a.broadcast(17).unwrap();
        world.sync();
        assert_eq!(*a.value(), 17);
    }

    #[test]
    fn handles_can_move_between_registration_and_sync() {
        let world = world();
        let a = Var::<i32>::with_value(&world, 0);
        a.image(0).unwrap().put(5);
        let moved = a;
        world.sync();
        assert_eq!(*moved.value(), 5);
    }
}
