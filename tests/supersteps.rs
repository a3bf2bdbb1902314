//! Superstep semantics: visibility boundaries, ordering tie-breaks and the
//! exactness of the per-superstep delivery.

use rand::Rng;
use strata::{Environment, Queue, Var, World};

macro_rules! world_test {
    ($name:ident, ($($pes:literal),+), $body:expr) => {
        paste::paste! {
            $(
                #[test]
                fn [<$name _ $pes _pes>]() {
                    Environment::new().with_processors($pes).spawn($body);
                }
            )+
        }
    };
}

world_test!(empty_sync_is_a_pure_barrier, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let a = Var::<usize>::with_value(&world, s);
    let q = Queue::<u8, u8>::new(&world);

    world.sync();

    assert_eq!(*a.value(), s, "an empty sync must not disturb local cells");
    assert!(q.is_empty(), "an empty sync must not conjure messages");
});

world_test!(last_put_from_one_source_wins, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let p = world.active_processors();
    let a = Var::<usize>::new(&world);

    let image = a.image(world.next_processor()).unwrap();
    for i in 0..10 {
        image.put(s * 100 + i);
    }
    world.sync();

    assert_eq!(*a.value(), ((s + p - 1) % p) * 100 + 9);
});

// a get issued in the same superstep as a put to its target observes the
// value as of the midpoint barrier, i.e. after the put has been applied
world_test!(get_observes_same_superstep_puts, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let t = world.next_processor();
    let a = Var::<usize>::with_value(&world, 0);

    a.image(t).unwrap().put(100 + t);
    let f = a.image(t).unwrap().get();
    world.sync();

    assert_eq!(f.value().unwrap(), 100 + t);
    assert_eq!(*a.value(), 100 + s);
});

world_test!(messages_surface_in_the_next_superstep_only, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let q = Queue::<usize, usize>::new(&world);

    // superstep 0
    q.image(world.next_processor()).unwrap().send(s, 0);
    world.sync();

    // superstep 1: the previous delivery is readable, the new send is not
    let delivered: Vec<_> = q.iter().map(|m| m.content).collect();
    assert_eq!(delivered, vec![0]);
    q.image(world.next_processor()).unwrap().send(s, 1);
    assert_eq!(q.len(), 1, "a send in superstep 1 must not appear yet");
    world.sync();

    // superstep 2
    let delivered: Vec<_> = q.iter().map(|m| m.content).collect();
    assert_eq!(delivered, vec![1], "superstep 0 messages must be gone");
    world.sync();

    // superstep 3: nothing was sent in superstep 2
    assert!(q.is_empty());
});

world_test!(per_sender_fifo_under_random_fanout, (2, 4), |world: World| {
    let s = world.processor_id();
    let p = world.active_processors();
    let q = Queue::<usize, usize>::new(&world);

    let mut rng = rand::thread_rng();
    for i in 0..200 {
        let dst = rng.gen_range(0..p);
        q.image(dst).unwrap().send(s, i);
    }
    world.sync();

    // within each sender, the delivered sequence numbers must be ascending
    let mut last_seen = vec![None::<usize>; p];
    for msg in &q {
        if let Some(prev) = last_seen[msg.tag] {
            assert!(
                msg.content > prev,
                "messages from processor {} arrived out of order",
                msg.tag
            );
        }
        last_seen[msg.tag] = Some(msg.content);
    }
});

world_test!(several_supersteps_of_rotation, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let p = world.active_processors();
    let a = Var::<usize>::with_value(&world, s);

    // rotate the payload p times; it must come all the way around
    for _ in 0..p {
        let held = *a.value();
        a.image(world.next_processor()).unwrap().put(held);
        world.sync();
    }
    assert_eq!(*a.value(), s);
});

world_test!(futures_from_consecutive_supersteps, (1, 2, 4), |world: World| {
    let mut b = Var::<usize>::new(&world);
    *b.value_mut() = world.processor_id();
    world.sync();

    let first = b.image(world.next_processor()).unwrap().get();
    world.sync();
    let second = b.image(world.prev_processor()).unwrap().get();
    world.sync();

    assert_eq!(first.value().unwrap(), world.next_processor());
    assert_eq!(second.value().unwrap(), world.prev_processor());
});
