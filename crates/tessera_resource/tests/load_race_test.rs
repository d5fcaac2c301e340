//! Integration tests for concurrent transitions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tessera_resource::{
    Loadable, LoadingState, Resource, ResourceError, ResourceHandle, ResourceResult,
};

/// Payload whose hooks are slow enough for callers to pile up.
struct Slow {
    prepares: Arc<AtomicU32>,
    loads: Arc<AtomicU32>,
    post_loads: Arc<AtomicU32>,
    fail: bool,
}

impl Slow {
    fn new(fail: bool) -> (Self, Arc<AtomicU32>, Arc<AtomicU32>, Arc<AtomicU32>) {
        let prepares = Arc::new(AtomicU32::new(0));
        let loads = Arc::new(AtomicU32::new(0));
        let post_loads = Arc::new(AtomicU32::new(0));
        let payload = Self {
            prepares: Arc::clone(&prepares),
            loads: Arc::clone(&loads),
            post_loads: Arc::clone(&post_loads),
            fail,
        };
        (payload, prepares, loads, post_loads)
    }
}

impl Loadable for Slow {
    fn prepare(&mut self) -> ResourceResult<()> {
        thread::sleep(Duration::from_millis(20));
        self.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&mut self) -> ResourceResult<()> {
        thread::sleep(Duration::from_millis(30));
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ResourceError::payload("device lost"));
        }
        Ok(())
    }

    fn post_load(&mut self) {
        self.post_loads.fetch_add(1, Ordering::SeqCst);
    }

    fn unload(&mut self) {}
}

#[test]
fn test_two_thread_load_race() {
    let (payload, prepares, loads, post_loads) = Slow::new(false);
    let resource = Arc::new(Resource::new(ResourceHandle(1), "terrain", "General", payload));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let resource = Arc::clone(&resource);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let result = resource.load();
                // Both callers return only once the resource is loaded.
                assert_eq!(resource.state(), LoadingState::Loaded);
                result
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(prepares.load(Ordering::SeqCst), 1);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(post_loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_many_callers_single_load() {
    let (payload, prepares, loads, _) = Slow::new(false);
    let resource = Arc::new(Resource::new(ResourceHandle(2), "sky", "General", payload));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let resource = Arc::clone(&resource);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    resource.prepare().unwrap();
                }
                resource.load().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(resource.is_loaded());
    assert_eq!(prepares.load(Ordering::SeqCst), 1);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_waiting_loader_sees_failed_load() {
    let (payload, _, loads, _) = Slow::new(true);
    let resource = Arc::new(Resource::new(ResourceHandle(3), "broken", "General", payload));
    resource.prepare().unwrap();

    let winner = {
        let resource = Arc::clone(&resource);
        thread::spawn(move || resource.load())
    };
    resource.machine().await_state(&[LoadingState::Loading]);
    let waited = resource.load();
    let won = winner.join().unwrap();

    assert_eq!(won, Err(ResourceError::payload("device lost")));
    assert!(matches!(
        waited,
        Err(ResourceError::ConcurrentLoadFailed { state: LoadingState::Prepared, .. })
    ));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(resource.state(), LoadingState::Prepared);
}

#[test]
fn test_concurrent_unload_runs_once() {
    let unloads = Arc::new(AtomicU32::new(0));

    struct Counted(Arc<AtomicU32>);
    impl Loadable for Counted {
        fn load(&mut self) -> ResourceResult<()> {
            Ok(())
        }
        fn unload(&mut self) {
            thread::sleep(Duration::from_millis(10));
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let resource = Arc::new(Resource::new(
        ResourceHandle(4),
        "water",
        "General",
        Counted(Arc::clone(&unloads)),
    ));
    resource.load().unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let resource = Arc::clone(&resource);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                resource.unload();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(unloads.load(Ordering::SeqCst), 1);
    assert_eq!(resource.state(), LoadingState::Unloaded);
}
