//! Strata is a bulk-synchronous parallel (BSP) runtime: a fixed set of
//! processors run the same program, and computation proceeds in supersteps
//! separated by global barriers.
//!
//! Within a superstep each processor computes locally and schedules
//! one-sided communication: writes (`put`) and reads (`get`) against remote
//! images of [registered variables](Var), and tagged messages into remote
//! [queues](Queue). All of it is deferred -- the effects become visible
//! only after the next [`World::sync`], everywhere at once. That one rule
//! is what makes BSP programs easy to reason about: between two syncs there
//! is no remote traffic to think about at all.
//!
//! Data moves through a fabric backend selected by the `STRATA_BACKEND`
//! environment variable (or explicitly on the builder): `local` for a
//! single processor, `thread` for one OS thread per processor within a
//! process.
//!
//! EXAMPLES
//! --------
//!
//! # Rotating a value around the ring
//! ```
//! use strata::{Environment, Var};
//!
//! Environment::new().with_processors(4).spawn(|world| {
//!     let s = world.processor_id();
//!     let p = world.active_processors();
//!
//!     let a = Var::<usize>::new(&world);
//!     a.image(world.next_processor()).unwrap().put(s);
//!     world.sync();
//!     assert_eq!(*a.value(), (s + p - 1) % p);
//! });
//! ```
//!
//! # Deferred reads through futures
//! ```
//! use strata::{Environment, Var};
//!
//! Environment::new().with_processors(2).spawn(|world| {
//!     let b = Var::<usize>::with_value(&world, world.processor_id());
//!     world.sync();
//!
//!     let f = b.image(world.next_processor()).unwrap().get();
//!     world.sync();
//!     assert_eq!(f.value().unwrap(), world.next_processor());
//! });
//! ```
//!
//! # Message passing
//! ```
//! use strata::{Environment, Queue};
//!
//! Environment::new().with_processors(2).spawn(|world| {
//!     let q = Queue::<usize, u64>::new(&world);
//!     q.image(world.next_processor()).unwrap().send(world.processor_id(), 1337);
//!     world.sync();
//!     for msg in &q {
//!         assert_eq!(msg.tag, world.prev_processor());
//!         assert_eq!(msg.content, 1337);
//!     }
//! });
//! ```

mod env_var;
mod environment;
mod error;
mod fabric;
mod future;
mod protocol;
mod queue;
mod registry;
mod superstep;
mod var;
mod world;

pub use crate::env_var::{config, Config};
pub use crate::environment::Environment;
pub use crate::error::{Error, Result};
pub use crate::fabric::Backend;
pub use crate::future::Future;
pub use crate::queue::{Message, MessageIter, Queue, QueueImage};
pub use crate::var::{Dist, Var, VarImage};
pub use crate::world::{World, WorldBuilder};

pub(crate) fn serialize<T: ?Sized>(obj: &T) -> anyhow::Result<Vec<u8>>
where
    T: serde::Serialize,
{
    Ok(bincode::serialize(obj)?)
}

pub(crate) fn deserialize<'a, T>(bytes: &'a [u8]) -> anyhow::Result<T>
where
    T: serde::Deserialize<'a>,
{
    Ok(bincode::deserialize(bytes)?)
}
