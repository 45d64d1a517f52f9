//! Unhandled faults: reporter delivery, worker death, recovery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use suzhu::{
    EmbeddedProgram, FaultResult, OpaquePayload, Runtime, RuntimeFault, RuntimeHost, ThreadState,
};

fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let begun = Instant::now();
    while begun.elapsed() < limit {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

struct Volatile {
    teardown_log: Arc<Mutex<Vec<&'static str>>>,
}

impl EmbeddedProgram for Volatile {
    fn boot(&mut self, rt: &Runtime) -> FaultResult<()> {
        rt.bind("ECHO", |_rt, payload| Ok(payload));
        rt.bind("RAISE", |_rt, _payload| {
            Err(RuntimeFault::raised("example exception"))
        });
        rt.bind("PANIC", |_rt, _payload| panic!("kaboom"));
        Ok(())
    }

    fn teardown(&mut self, _fault: &RuntimeFault) {
        self.teardown_log.lock().push("teardown");
    }
}

fn volatile_host() -> (RuntimeHost, Arc<Mutex<Vec<&'static str>>>) {
    let teardown_log = Arc::new(Mutex::new(Vec::new()));
    let host = {
        let teardown_log = teardown_log.clone();
        RuntimeHost::new(move || Volatile {
            teardown_log: teardown_log.clone(),
        })
    };
    (host, teardown_log)
}

#[test]
fn faulting_handler_fires_the_hook_once_and_ends_the_worker() {
    let (host, _) = volatile_host();
    let reports = Arc::new(Mutex::new(Vec::new()));
    {
        let reports = reports.clone();
        host.start(Some(Box::new(move |message: &str| {
            reports.lock().push(message.to_owned());
        })))
        .unwrap();
    }

    host.send_async("RAISE", OpaquePayload::null(), None);
    assert!(wait_until(Duration::from_secs(5), || !reports.lock().is_empty()));
    assert_eq!(*reports.lock(), vec!["example exception".to_owned()]);

    // the worker is gone: every further sync send resolves to null
    let mut probe = 9u8;
    let reply = host.send_sync("ECHO", OpaquePayload::from_mut(&mut probe));
    assert!(reply.is_null());

    // stop() still works and resets the state for a clean restart
    host.stop(false);
    assert_eq!(host.state(), ThreadState::Stopped);

    host.start(None).unwrap();
    let reply = host.send_sync("ECHO", OpaquePayload::from_mut(&mut probe));
    assert!(!reply.is_null());
    assert_eq!(*reports.lock(), vec!["example exception".to_owned()]);

    host.stop(false);
}

#[test]
fn messages_queued_behind_a_fault_resolve_to_null() {
    let (host, _) = volatile_host();
    host.start(None).unwrap();

    host.send_async("RAISE", OpaquePayload::null(), None);
    // queued behind the failing message on the same FIFO
    let mut probe = 5u8;
    let reply = host.send_sync("ECHO", OpaquePayload::from_mut(&mut probe));
    assert!(reply.is_null());

    host.stop(false);
}

#[test]
fn panicking_handler_is_reported_as_a_fault() {
    let (host, _) = volatile_host();
    let reports = Arc::new(Mutex::new(Vec::new()));
    {
        let reports = reports.clone();
        host.start(Some(Box::new(move |message: &str| {
            reports.lock().push(message.to_owned());
        })))
        .unwrap();
    }

    // the blocked sender is resolved with null even though the handler
    // never returned
    let reply = host.send_sync("PANIC", OpaquePayload::null());
    assert!(reply.is_null());

    assert!(wait_until(Duration::from_secs(5), || !reports.lock().is_empty()));
    assert!(reports.lock()[0].contains("kaboom"));

    host.stop(false);
    host.start(None).unwrap();
    assert!(host.is_running());
    host.stop(false);
}

#[test]
fn teardown_hook_runs_before_the_exception_hook() {
    let (host, teardown_log) = volatile_host();
    {
        let teardown_log = teardown_log.clone();
        host.start(Some(Box::new(move |_message: &str| {
            teardown_log.lock().push("hook");
        })))
        .unwrap();
    }

    host.send_async("RAISE", OpaquePayload::null(), None);
    assert!(wait_until(Duration::from_secs(5), || {
        teardown_log.lock().len() == 2
    }));
    assert_eq!(*teardown_log.lock(), vec!["teardown", "hook"]);

    host.stop(false);
}

#[test]
fn unbound_message_type_is_fatal() {
    let (host, _) = volatile_host();
    let reports = Arc::new(Mutex::new(Vec::new()));
    {
        let reports = reports.clone();
        host.start(Some(Box::new(move |message: &str| {
            reports.lock().push(message.to_owned());
        })))
        .unwrap();
    }

    let reply = host.send_sync("NO-SUCH-TAG", OpaquePayload::null());
    assert!(reply.is_null());
    assert!(wait_until(Duration::from_secs(5), || !reports.lock().is_empty()));
    assert!(reports.lock()[0].contains("NO-SUCH-TAG"));

    host.stop(false);
}

struct DeadOnBoot;

impl EmbeddedProgram for DeadOnBoot {
    fn boot(&mut self, _rt: &Runtime) -> FaultResult<()> {
        Err(RuntimeFault::raised("never got going"))
    }
}

#[test]
fn boot_failures_never_reach_the_exception_hook() {
    let fired = Arc::new(AtomicUsize::new(0));
    let host = RuntimeHost::new(|| DeadOnBoot);

    let result = {
        let fired = fired.clone();
        host.start(Some(Box::new(move |_message: &str| {
            fired.fetch_add(1, Ordering::SeqCst);
        })))
    };
    assert!(result.is_err());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}
