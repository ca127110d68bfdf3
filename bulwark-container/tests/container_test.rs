use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use bulwark_container::{Container, ContainerError, Entry, Lifetime, Registration};

trait Message: Send + Sync {
    fn text(&self) -> String;
}

struct Static(&'static str);

impl Message for Static {
    fn text(&self) -> String {
        self.0.to_string()
    }
}

struct Numbered(usize);

impl Message for Numbered {
    fn text(&self) -> String {
        format!("B#{}", self.0)
    }
}

fn singleton_and_factory(container: &Container) -> Arc<AtomicUsize> {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();

    container
        .provide_all([
            Registration::from(Entry::<dyn Message>::singleton(Arc::new(Static("A"))).named("A")),
            Registration::from(
                Entry::<dyn Message>::factory(move |_| {
                    Arc::new(Numbered(counter.fetch_add(1, Ordering::SeqCst))) as Arc<dyn Message>
                })
                .named("B"),
            ),
        ])
        .unwrap();

    built
}

#[test]
fn singleton_stays_first_and_factory_stays_second() {
    let container = Container::new();
    let built = singleton_and_factory(&container);

    let a1 = container.resolve_at::<dyn Message>(0).unwrap();
    let a2 = container.resolve_at::<dyn Message>(0).unwrap();
    assert!(Arc::ptr_eq(&a1, &a2));
    assert_eq!(a1.text(), "A");

    let b1 = container.resolve_at::<dyn Message>(1).unwrap();
    let b2 = container.resolve_named::<dyn Message>("B").unwrap();
    assert!(!Arc::ptr_eq(&b1, &b2));
    assert_eq!(b1.text(), "B#0");
    assert_eq!(b2.text(), "B#1");
    assert_eq!(built.load(Ordering::SeqCst), 2);

    let a3 = container.resolve_named::<dyn Message>("A").unwrap();
    assert!(Arc::ptr_eq(&a1, &a3));
}

#[test]
fn entries_report_their_lifetime() {
    let singleton = Entry::<dyn Message>::singleton(Arc::new(Static("x"))).named("x");
    let factory = Entry::<dyn Message>::factory(|_| Arc::new(Static("y")) as Arc<dyn Message>);

    assert_eq!(singleton.lifetime(), Lifetime::Singleton);
    assert_eq!(singleton.name(), Some("x"));
    assert_eq!(factory.lifetime(), Lifetime::Factory);
    assert_eq!(factory.name(), None);

    let registration = Registration::from(factory);
    assert_eq!(registration.lifetime(), Lifetime::Factory);
    assert!(registration.capability().contains("Message"));
}

#[test]
fn retried_batch_lands_at_original_indexes() {
    let container = Container::new();
    container
        .provide(Entry::<dyn Message>::singleton(Arc::new(Static("first"))).named("B"))
        .unwrap();

    let conflict = container.provide_all([
        Registration::from(Entry::<dyn Message>::singleton(Arc::new(Static("second")))),
        Registration::from(Entry::<dyn Message>::singleton(Arc::new(Static("third"))).named("B")),
    ]);
    assert!(matches!(conflict, Err(ContainerError::DuplicateName { .. })));

    container
        .provide_all([
            Registration::from(Entry::<dyn Message>::singleton(Arc::new(Static("second")))),
            Registration::from(
                Entry::<dyn Message>::singleton(Arc::new(Static("third"))).named("C"),
            ),
        ])
        .unwrap();

    let texts: Vec<String> = (0..3)
        .map(|index| container.resolve_at::<dyn Message>(index).unwrap().text())
        .collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[test]
fn concurrent_registration_and_resolution() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    let container = Arc::new(Container::new());
    container
        .provide(Entry::<dyn Message>::singleton(Arc::new(Static("seed"))))
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let name = format!("t{thread_id}-{i}");
                    container
                        .provide(Entry::<dyn Message>::singleton(Arc::new(Numbered(i))).named(name))
                        .unwrap();
                    assert_eq!(container.resolve::<dyn Message>().unwrap().text(), "seed");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(container.len(), 1 + THREADS * PER_THREAD);
    assert_eq!(container.names().len(), THREADS * PER_THREAD);
    assert_eq!(container.resolve_at::<dyn Message>(0).unwrap().text(), "seed");
}

#[test]
fn racing_registrations_of_one_name_admit_exactly_one() {
    let container = Arc::new(Container::new());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container
                    .provide(Entry::<dyn Message>::singleton(Arc::new(Static("x"))).named("shared"))
                    .is_ok()
            })
        })
        .collect();

    let admitted = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(admitted, 1);
    assert_eq!(container.count::<dyn Message>(), 1);
}

#[test]
fn global_container_is_shared() {
    Container::global()
        .provide(Entry::<dyn Message>::singleton(Arc::new(Static("global"))).named("global-message"))
        .unwrap();

    let resolved = thread::spawn(|| {
        Container::global()
            .resolve_named::<dyn Message>("global-message")
            .map(|message| message.text())
    })
    .join()
    .unwrap();

    assert_eq!(resolved.unwrap(), "global");
}
