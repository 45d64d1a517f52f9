//! Scheduled work versus the immediate queue, and stop-time draining.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use suzhu::{EmbeddedProgram, FaultResult, OpaquePayload, Runtime, RuntimeHost};

/// Schedules one flag-raising task `delay` after boot.
struct DelayedFlag {
    delay: Duration,
    flag: Arc<AtomicBool>,
}

impl EmbeddedProgram for DelayedFlag {
    fn boot(&mut self, rt: &Runtime) -> FaultResult<()> {
        let flag = self.flag.clone();
        rt.schedule(self.delay, move |_rt| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        Ok(())
    }
}

fn delayed_flag_host(delay: Duration) -> (RuntimeHost, Arc<AtomicBool>) {
    let flag = Arc::new(AtomicBool::new(false));
    let host = {
        let flag = flag.clone();
        RuntimeHost::new(move || DelayedFlag {
            delay,
            flag: flag.clone(),
        })
    };
    (host, flag)
}

#[test]
fn stop_waiting_for_scheduled_work_blocks_until_it_ran() {
    let (host, flag) = delayed_flag_host(Duration::from_secs(1));
    let begun = Instant::now();
    host.start(None).unwrap();
    host.stop(true);

    assert!(begun.elapsed() >= Duration::from_secs(1));
    assert!(flag.load(Ordering::SeqCst));
}

#[test]
fn stop_without_waiting_discards_scheduled_work() {
    let (host, flag) = delayed_flag_host(Duration::from_secs(1));
    host.start(None).unwrap();

    let begun = Instant::now();
    host.stop(false);

    assert!(begun.elapsed() < Duration::from_millis(300));
    assert!(!flag.load(Ordering::SeqCst));
}

#[test]
fn scheduled_work_runs_while_the_loop_is_idle() {
    let (host, flag) = delayed_flag_host(Duration::from_millis(50));
    host.start(None).unwrap();

    thread::sleep(Duration::from_millis(300));
    assert!(flag.load(Ordering::SeqCst));

    host.stop(false);
}

/// "ARM" schedules a short-delay counter bump from inside a handler.
struct ArmOnDemand {
    bumps: Arc<AtomicUsize>,
}

impl EmbeddedProgram for ArmOnDemand {
    fn boot(&mut self, rt: &Runtime) -> FaultResult<()> {
        let bumps = self.bumps.clone();
        rt.bind("ARM", move |rt, _payload| {
            let bumps = bumps.clone();
            rt.schedule(Duration::from_millis(10), move |_rt| {
                bumps.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(OpaquePayload::null())
        });
        Ok(())
    }
}

#[test]
fn handlers_can_schedule_future_work() {
    let bumps = Arc::new(AtomicUsize::new(0));
    let host = {
        let bumps = bumps.clone();
        RuntimeHost::new(move || ArmOnDemand {
            bumps: bumps.clone(),
        })
    };
    host.start(None).unwrap();

    host.send_sync("ARM", OpaquePayload::null());
    host.send_sync("ARM", OpaquePayload::null());

    // stop(true) drains the two armed tasks before the worker exits
    host.stop(true);
    assert_eq!(bumps.load(Ordering::SeqCst), 2);
}

/// Chained timers: each task re-arms the next until the chain is done.
struct Chain {
    remaining: Arc<AtomicUsize>,
}

fn arm_chain(rt: &Runtime, remaining: Arc<AtomicUsize>) {
    rt.schedule(Duration::from_millis(5), move |rt| {
        if remaining.fetch_sub(1, Ordering::SeqCst) > 1 {
            arm_chain(rt, remaining);
        }
        Ok(())
    });
}

impl EmbeddedProgram for Chain {
    fn boot(&mut self, rt: &Runtime) -> FaultResult<()> {
        arm_chain(rt, self.remaining.clone());
        Ok(())
    }
}

#[test]
fn draining_stop_follows_a_timer_chain_to_the_end() {
    let remaining = Arc::new(AtomicUsize::new(5));
    let host = {
        let remaining = remaining.clone();
        RuntimeHost::new(move || Chain {
            remaining: remaining.clone(),
        })
    };
    host.start(None).unwrap();

    host.stop(true);
    assert_eq!(remaining.load(Ordering::SeqCst), 0);
}
