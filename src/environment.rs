use crate::env_var::config;
use crate::fabric::{thread, Fabric, FabricComm};
use crate::world::World;
use tracing::trace;

/// Spawns a group of processors that run the same program, each against its
/// own [`World`], using the thread backend.
///
/// This is the entry point for multi-processor execution inside one
/// process. The closure is the whole BSP program: it runs once per
/// processor, the worlds are torn down when it returns, and `spawn` itself
/// returns when every processor has finished.
///
/// ```
/// use strata::Environment;
///
/// Environment::new().with_processors(2).spawn(|world| {
///     let s = world.processor_id();
///     let p = world.active_processors();
///     assert!(s < p);
///     world.sync();
/// });
/// ```
pub struct Environment {
    num_pes: usize,
}

impl Environment {
    /// An environment sized by `STRATA_THREADS`, defaulting to the
    /// machine's available parallelism.
    pub fn new() -> Environment {
        Environment {
            num_pes: config().threads,
        }
    }

    /// Override the number of processors to spawn.
    pub fn with_processors(mut self, num_pes: usize) -> Environment {
        assert!(num_pes >= 1, "a world needs at least one processor");
        self.num_pes = num_pes;
        self
    }

    /// Run `program` on every processor and wait for all of them. A panic
    /// on any processor fails the whole job.
    pub fn spawn<F>(&self, program: F)
    where
        F: Fn(World) + Send + Sync,
    {
        trace!("spawning {} processors", self.num_pes);
        let fabrics = thread::create_group(self.num_pes);
        std::thread::scope(|scope| {
            for fabric in fabrics {
                let program = &program;
                let name = format!("strata-pe-{}", fabric.my_pe());
                std::thread::Builder::new()
                    .name(name)
                    .spawn_scoped(scope, move || {
                        let world = World::new(Fabric::Thread(fabric));
                        program(world);
                    })
                    .expect("failed to spawn a processor thread");
            }
        });
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}
