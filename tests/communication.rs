//! End-to-end communication patterns: puts, gets and message passing across
//! every backend-visible shape (self, neighbor, all-to-one), at several
//! processor counts.

use strata::{Environment, Future, Queue, Var, World};

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

world_test!(put, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let p = world.active_processors();
    let a = Var::<usize>::new(&world);

    a.image(world.next_processor()).unwrap().put(s);
    world.sync();

    assert_eq!(*a.value(), (s + p - 1) % p);
});

world_test!(put_to_self, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let a = Var::<usize>::new(&world);

    a.image(s).unwrap().put(s);
    world.sync();

    assert_eq!(*a.value(), s);
});

world_test!(get_from_self, (1, 2), |world: World| {
    let s = world.processor_id();
    let mut a = Var::<usize>::new(&world);
    *a.value_mut() = s;

    let b = a.image(s).unwrap().get();
    world.sync();

    assert_eq!(b.value().unwrap(), s);
});

world_test!(put_non_int, (1, 2, 4), |world: World| {
    let a = Var::<f32>::new(&world);

    a.image(world.next_processor()).unwrap().put(1.0);
    world.sync();

    assert_eq!(*a.value(), 1.0);
});

world_test!(put_multiple, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let p = world.active_processors();
    let size = 5;

    let xs: Vec<Var<usize>> = (0..size).map(|_| Var::new(&world)).collect();
    for (i, x) in xs.iter().enumerate() {
        x.image(world.next_processor()).unwrap().put(s + i);
    }

    world.sync();

    for (i, x) in xs.iter().enumerate() {
        assert_eq!(*x.value(), (s + p - 1) % p + i);
    }
});

// heterogeneous traffic: processor 0 floods everyone, then reads one back
world_test!(put_unequal, (2, 4), |world: World| {
    let s = world.processor_id();
    let p = world.active_processors();
    let size = 5;

    let xs: Vec<Var<usize>> = (0..size).map(|_| Var::new(&world)).collect();
    if s == 0 {
        for i in 1..p {
            for x in &xs {
                x.image(i).unwrap().put(i);
            }
        }
    }

    world.sync();

    let a: Option<Future<usize>> = if s == 0 {
        Some(xs[size - 1].image(p - 1).unwrap().get())
    } else {
        None
    };

    world.sync();

    if let Some(a) = a {
        assert_eq!(a.value().unwrap(), p - 1);
    }
});

world_test!(get, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let mut b = Var::<usize>::new(&world);
    *b.value_mut() = s;
    world.sync();

    let c = b.image(world.next_processor()).unwrap().get();
    world.sync();

    assert_eq!(c.value().unwrap(), world.next_processor());
});

world_test!(get_multiple, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let mut x = Var::<usize>::new(&world);
    *x.value_mut() = s;

    world.sync();

    let ys: Vec<Future<usize>> = (0..5)
        .map(|_| x.image(world.next_processor()).unwrap().get())
        .collect();

    world.sync();

    for y in &ys {
        assert_eq!(y.value().unwrap(), world.next_processor());
    }
});

world_test!(single_message_passing, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let q = Queue::<usize, u64>::new(&world);

    q.image(world.next_processor()).unwrap().send(s, 1337);
    world.sync();

    let delivered: Vec<_> = q.iter().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].tag, world.prev_processor());
    assert_eq!(delivered[0].content, 1337);
});

world_test!(multiple_message_passing, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let contents: Vec<u64> = vec![1337, 12345, 1230519, 5, 8];

    let q = Queue::<usize, u64>::new(&world);
    for content in &contents {
        q.image(world.next_processor()).unwrap().send(s, *content);
    }

    world.sync();

    let delivered: Vec<_> = q.iter().collect();
    assert_eq!(delivered.len(), contents.len());
    for (msg, expected) in delivered.iter().zip(&contents) {
        assert_eq!(msg.tag, world.prev_processor());
        assert_eq!(msg.content, *expected);
    }
});

world_test!(multiple_queue_and_types_message_passing, (1, 2, 4), |world: World| {
    let s = world.processor_id();
    let contents: Vec<i64> = vec![1337, 12345, 1230519, 5, 8];
    let contents2: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];

    let q = Queue::<usize, i64>::new(&world);
    let q2 = Queue::<usize, f32>::new(&world);

    for content in &contents {
        q.image(world.next_processor()).unwrap().send(s, *content);
    }
    for content in &contents2 {
        q2.image(world.next_processor()).unwrap().send(s, *content);
    }

    world.sync();

    let delivered: Vec<_> = q.iter().collect();
    assert_eq!(delivered.len(), contents.len());
    for (msg, expected) in delivered.iter().zip(&contents) {
        assert_eq!(msg.tag, world.prev_processor());
        assert_eq!(msg.content, *expected);
    }

    let delivered2: Vec<_> = q2.iter().collect();
    assert_eq!(delivered2.len(), contents2.len());
    for (msg, expected) in delivered2.iter().zip(&contents2) {
        assert_eq!(msg.tag, world.prev_processor());
        assert_eq!(msg.content, *expected);
    }
});

world_test!(broadcast_from_one_processor, (1, 2, 4), |world: World| {
    let a = Var::<u32>::new(&world);
    if world.processor_id() == 0 {
        a.broadcast(42).unwrap();
    }
    world.sync();
    assert_eq!(*a.value(), 42);
});
