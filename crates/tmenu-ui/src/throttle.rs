//! Render throttling
//!
//! [`Timer`] is a one-shot, cancellable scheduler backed by a thread
//! parked on a deadline. [`Throttler`] coalesces high-frequency
//! low-priority calls to a minimum interval while letting high-priority
//! callers run synchronously; the menu uses it to rate-limit rendering
//! at 60 Hz while guaranteeing the final render on exit is synchronous.

use std::sync::{Arc, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Active,
    Expired,
    Canceled,
}

struct TimerState<T> {
    phase: Phase,
    epoch: u64,
    payload: Option<T>,
    deadline: Option<Instant>,
    thread: Option<JoinHandle<()>>,
}

struct TimerInner<T> {
    callback: Box<dyn Fn(T) + Send + Sync>,
    default_interval: Option<Duration>,
    state: Mutex<TimerState<T>>,
    cond: Condvar,
}

/// A one-shot, cancellable timer.
///
/// Exactly one of `idle` / `active` / `expired` / `canceled` describes
/// the timer at any time; `expired` and `canceled` are refinements of
/// idle, so `start` works again from either.
pub struct Timer<T: Send + 'static> {
    inner: Arc<TimerInner<T>>,
}

impl<T: Send + 'static> Timer<T> {
    pub fn new<F>(default_interval: Option<Duration>, callback: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(TimerInner {
                callback: Box::new(callback),
                default_interval,
                state: Mutex::new(TimerState {
                    phase: Phase::Idle,
                    epoch: 0,
                    payload: None,
                    deadline: None,
                    thread: None,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Arm the timer. Returns false when it is already active.
    pub fn start(&self, interval: Option<Duration>, payload: T) -> bool {
        let interval = interval
            .or(self.inner.default_interval)
            .unwrap_or(Duration::ZERO);

        let epoch = {
            let mut state = self.inner.state.lock();
            if state.phase == Phase::Active {
                return false;
            }
            state.phase = Phase::Active;
            state.epoch += 1;
            state.payload = Some(payload);
            state.deadline = Some(Instant::now() + interval);
            state.epoch
        };

        let inner = Arc::clone(&self.inner);
        let handle = std::thread::spawn(move || Self::run_deadline(&inner, epoch));
        self.inner.state.lock().thread = Some(handle);
        true
    }

    fn run_deadline(inner: &TimerInner<T>, epoch: u64) {
        let mut state = inner.state.lock();
        loop {
            if state.epoch != epoch || state.phase != Phase::Active {
                return;
            }
            let Some(deadline) = state.deadline else {
                return;
            };
            if Instant::now() >= deadline {
                break;
            }
            inner.cond.wait_until(&mut state, deadline);
        }

        // Expire before running so the callback observes an idle timer
        state.phase = Phase::Expired;
        let payload = state.payload.take();
        drop(state);

        if let Some(payload) = payload {
            (inner.callback)(payload);
        }
    }

    /// Disarm the timer. Returns true only when it moved active to
    /// canceled; a canceled timer never runs its callback.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Active {
            return false;
        }
        state.phase = Phase::Canceled;
        state.payload = None;
        self.inner.cond.notify_all();
        true
    }

    /// Replace the pending payload of an active timer without touching
    /// its deadline. Returns false when the timer is not active.
    pub fn displace(&self, payload: T) -> bool {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Active {
            return false;
        }
        state.payload = Some(payload);
        true
    }

    /// Wait until the timer reaches a terminal state
    pub fn join(&self) {
        let handle = self.inner.state.lock().thread.take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub fn active(&self) -> bool {
        self.inner.state.lock().phase == Phase::Active
    }

    pub fn expired(&self) -> bool {
        self.inner.state.lock().phase == Phase::Expired
    }

    pub fn canceled(&self) -> bool {
        self.inner.state.lock().phase == Phase::Canceled
    }

    pub fn idle(&self) -> bool {
        !self.active()
    }
}

struct ThrottlerInner<T: Clone + Send + 'static> {
    callback: Box<dyn Fn(T) + Send + Sync>,
    interval: Duration,
    timestamp: Mutex<Option<Instant>>,
    throttle_lock: Mutex<()>,
    main_lock: Mutex<()>,
    timer: OnceLock<Timer<T>>,
}

/// Coalesces low-priority calls at a minimum interval.
///
/// `lopri` drops contended calls outright, defers too-early calls onto a
/// one-shot timer (later calls displace the deferred payload), and runs
/// otherwise. `hipri` blocks on the main lock, cancels any deferred run,
/// and runs synchronously.
pub struct Throttler<T: Clone + Send + 'static> {
    inner: Arc<ThrottlerInner<T>>,
}

impl<T: Clone + Send + 'static> Clone for Throttler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Throttler<T> {
    pub fn new<F>(interval: Duration, callback: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let inner = Arc::new(ThrottlerInner {
            callback: Box::new(callback),
            interval,
            timestamp: Mutex::new(None),
            throttle_lock: Mutex::new(()),
            main_lock: Mutex::new(()),
            timer: OnceLock::new(),
        });

        // The deferred timer feeds back into lopri, which re-checks the
        // interval and runs for real this time
        let weak: Weak<ThrottlerInner<T>> = Arc::downgrade(&inner);
        let timer = Timer::new(None, move |payload: T| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.lopri(payload);
            }
        });
        let _ = inner.timer.set(timer);

        Self { inner }
    }

    fn timer(&self) -> &Timer<T> {
        self.inner.timer.get().expect("timer installed at construction")
    }

    fn run(&self, payload: T) {
        (self.inner.callback)(payload);
        *self.inner.timestamp.lock() = Some(Instant::now());
    }

    /// Rate-limited call; may be dropped, deferred, or run now.
    /// Returns true when the callback ran or a deferred run was armed.
    pub fn lopri(&self, payload: T) -> bool {
        let Some(_throttle) = self.inner.throttle_lock.try_lock() else {
            return false;
        };

        if self.timer().displace(payload.clone()) {
            return false;
        }

        let last_run = *self.inner.timestamp.lock();
        if let Some(last_run) = last_run {
            let elapsed = last_run.elapsed();
            if elapsed < self.inner.interval {
                return self.timer().start(Some(self.inner.interval - elapsed), payload);
            }
        }

        let Some(_main) = self.inner.main_lock.try_lock() else {
            return false;
        };
        self.run(payload);
        true
    }

    /// Synchronous call under the main lock; cancels any deferred run
    pub fn hipri(&self, payload: T) {
        let _main = self.inner.main_lock.lock();
        self.timer().cancel();
        self.run(payload);
    }

    /// The lock `hipri` runs under; holding it keeps renders out of a
    /// critical section
    pub fn main_lock(&self) -> MutexGuard<'_, ()> {
        self.inner.main_lock.lock()
    }

    /// Block until any pending deferred run resolves
    pub fn join(&self) {
        self.timer().join();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn sleep(ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    #[test]
    fn test_timer_predicates_fresh() {
        let timer: Timer<()> = Timer::new(None, |()| {});
        assert!(!timer.active());
        assert!(!timer.expired());
        assert!(timer.idle());
        assert!(!timer.canceled());
    }

    #[test]
    fn test_timer_start_expire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = Timer::new(None, move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(timer.start(Some(Duration::from_millis(30)), ()));
        assert!(timer.active());
        assert!(!timer.idle());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        timer.join();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.active());
        assert!(timer.expired());
        assert!(timer.idle());
        assert!(!timer.canceled());
    }

    #[test]
    fn test_timer_start_cancel() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = Timer::new(None, move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(timer.start(Some(Duration::from_secs(10)), ()));
        assert!(timer.active());

        assert!(timer.cancel());
        timer.join();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.active());
        assert!(!timer.expired());
        assert!(timer.idle());
        assert!(timer.canceled());
    }

    #[test]
    fn test_timer_cancel_after_expiry() {
        let timer = Timer::new(None, |()| {});
        assert!(timer.start(Some(Duration::from_millis(10)), ()));
        timer.join();
        assert!(timer.expired());

        assert!(!timer.cancel());
        assert!(timer.expired());
        assert!(!timer.canceled());
    }

    #[test]
    fn test_timer_start_twice() {
        let timer = Timer::new(None, |()| {});
        assert!(timer.start(Some(Duration::from_secs(10)), ()));
        assert!(!timer.start(Some(Duration::from_secs(10)), ()));
        assert!(timer.active());
        timer.cancel();
    }

    #[test]
    fn test_timer_idle_cancel() {
        let timer: Timer<()> = Timer::new(None, |()| {});
        assert!(!timer.cancel());
        assert!(timer.idle());
        assert!(!timer.canceled());
    }

    #[test]
    fn test_timer_restart_after_cancel() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = Timer::new(None, move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(timer.start(Some(Duration::from_secs(10)), ()));
        assert!(timer.cancel());
        assert!(timer.start(Some(Duration::from_millis(10)), ()));
        timer.join();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_throttler_coalesces() {
        let runs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&runs);
        let throttler = Throttler::new(Duration::from_millis(300), move |tag: u32| {
            sink.lock().push(tag);
        });

        // first call runs immediately
        assert!(throttler.lopri(1));
        assert_eq!(*runs.lock(), vec![1]);

        // too soon: deferred
        sleep(60);
        throttler.lopri(2);
        assert_eq!(*runs.lock(), vec![1]);

        // still pending: displaces the deferred payload
        sleep(60);
        throttler.lopri(3);

        // the single deferred run fires with the displaced payload
        throttler.join();
        sleep(20);
        assert_eq!(*runs.lock(), vec![1, 3]);
    }

    #[test]
    fn test_throttler_hipri_cancels_deferred() {
        let runs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&runs);
        let throttler = Throttler::new(Duration::from_millis(300), move |tag: u32| {
            sink.lock().push(tag);
        });

        assert!(throttler.lopri(1));
        sleep(30);
        throttler.lopri(2);

        throttler.hipri(9);
        assert_eq!(*runs.lock(), vec![1, 9]);

        // nothing left pending
        sleep(400);
        assert_eq!(*runs.lock(), vec![1, 9]);
    }

    #[test]
    fn test_throttler_runs_after_interval() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let throttler = Throttler::new(Duration::from_millis(20), move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(throttler.lopri(()));
        sleep(50);
        assert!(throttler.lopri(()));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
