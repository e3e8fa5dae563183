// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The instance pool: tracks one service's backend instances through
//! READY, FAILED, and RETRYING, and picks among them for dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use rand::seq::IteratorRandom;
use wf_ore::now::EpochMillis;
use wf_types::model::Instance;

use crate::clock::{Clock, SystemClock};

/// The health state of one pooled instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    Failed,
    Retrying,
}

/// Base interval and exponent cap for the exponential backoff schedule: the
/// `k`-th consecutive failure's retry deadline is
/// `now + base_millis * 2^min(k-1, cap_exponent)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_millis: u64,
    pub cap_exponent: u32,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            base_millis: 250,
            cap_exponent: 5,
        }
    }
}

/// Names the pooled entry a [`InstancePool::pick_instance`] call returned,
/// so a later `succeeded`/`failed` call acts on the exact same entry even
/// if `update_instances` has since replaced its payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(String);

#[derive(Debug, Clone)]
struct PooledInstance {
    instance: Instance,
    status: Status,
    failure_count: u32,
    retry_deadline: Option<EpochMillis>,
}

#[derive(Default)]
struct PoolState {
    entries: HashMap<String, PooledInstance>,
    ready: HashSet<String>,
    failed: HashSet<String>,
    retrying: HashSet<String>,
}

impl PoolState {
    fn drop_entry(&mut self, name: &str) {
        self.entries.remove(name);
        self.ready.remove(name);
        self.failed.remove(name);
        self.retrying.remove(name);
    }

    fn move_to(&mut self, name: &str, status: Status) {
        self.ready.remove(name);
        self.failed.remove(name);
        self.retrying.remove(name);
        match status {
            Status::Ready => self.ready.insert(name.to_string()),
            Status::Failed => self.failed.insert(name.to_string()),
            Status::Retrying => self.retrying.insert(name.to_string()),
        };
    }
}

/// A single service's pool of backend instances.
///
/// Guarded by one [`std::sync::Mutex`] rather than an owning task, since
/// every operation here is synchronous bookkeeping with no I/O to isolate.
pub struct InstancePool<C: Clock = SystemClock> {
    state: Mutex<PoolState>,
    clock: C,
    policy: RetryPolicy,
}

impl<C: Clock> InstancePool<C> {
    pub fn new(clock: C) -> InstancePool<C> {
        InstancePool::with_policy(clock, RetryPolicy::default())
    }

    pub fn with_policy(clock: C, policy: RetryPolicy) -> InstancePool<C> {
        InstancePool {
            state: Mutex::new(PoolState::default()),
            clock,
            policy,
        }
    }

    /// Reconciles pool membership to `instances`, keyed by instance name.
    /// Names new to the pool are inserted as READY; names present both
    /// before and after keep their health state but get the new payload;
    /// names dropped from the list are removed entirely.
    pub fn update_instances(&self, instances: impl IntoIterator<Item = (String, Instance)>) {
        let incoming: HashMap<String, Instance> = instances.into_iter().collect();
        let mut state = self.state.lock().expect("pool mutex poisoned");

        let stale: Vec<String> = state
            .entries
            .keys()
            .filter(|name| !incoming.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            state.drop_entry(&name);
        }

        for (name, instance) in incoming {
            if let Some(entry) = state.entries.get_mut(&name) {
                entry.instance = instance;
            } else {
                state.entries.insert(
                    name.clone(),
                    PooledInstance {
                        instance,
                        status: Status::Ready,
                        failure_count: 0,
                        retry_deadline: None,
                    },
                );
                state.ready.insert(name);
            }
        }
    }

    /// Picks one instance, preferring READY, then RETRYING, then FAILED
    /// (the "degenerate fallback": a probably-bad endpoint beats none).
    /// Returns `None` iff the pool is empty.
    pub fn pick_instance(&self) -> Option<Handle> {
        let state = self.state.lock().expect("pool mutex poisoned");
        let mut rng = rand::thread_rng();
        state
            .ready
            .iter()
            .choose(&mut rng)
            .or_else(|| state.retrying.iter().choose(&mut rng))
            .or_else(|| state.failed.iter().choose(&mut rng))
            .cloned()
            .map(Handle)
    }

    /// Transitions the named entry to READY, clearing its failure history.
    /// A no-op if the entry has since been removed.
    pub fn succeeded(&self, handle: &Handle) {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        if let Some(entry) = state.entries.get_mut(&handle.0) {
            entry.status = Status::Ready;
            entry.failure_count = 0;
            entry.retry_deadline = None;
            state.move_to(&handle.0, Status::Ready);
        }
    }

    /// Marks the named entry FAILED, increments its failure count, and
    /// sets its retry deadline per [`RetryPolicy`]. A no-op if the entry
    /// has since been removed.
    pub fn failed(&self, handle: &Handle) {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        let now = self.clock.now();
        let Some(entry) = state.entries.get_mut(&handle.0) else {
            return;
        };
        entry.failure_count += 1;
        let exponent = entry.failure_count.saturating_sub(1).min(self.policy.cap_exponent);
        let delay = self.policy.base_millis.saturating_mul(1u64 << exponent);
        entry.retry_deadline = Some(now + delay);
        entry.status = Status::Failed;
        state.move_to(&handle.0, Status::Failed);
    }

    /// Moves every FAILED entry whose retry deadline has passed into
    /// RETRYING, where it is preferred over the remaining FAILED entries
    /// by `pick_instance`.
    pub fn process_retries(&self) {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        let now = self.clock.now();
        let due: Vec<String> = state
            .failed
            .iter()
            .filter(|name| {
                state
                    .entries
                    .get(*name)
                    .and_then(|e| e.retry_deadline)
                    .is_some_and(|deadline| deadline <= now)
            })
            .cloned()
            .collect();
        for name in due {
            if let Some(entry) = state.entries.get_mut(&name) {
                entry.status = Status::Retrying;
            }
            state.move_to(&name, Status::Retrying);
        }
    }

    /// The instance payload for a given handle, for callers that picked a
    /// handle and now need to dispatch to it.
    pub fn instance(&self, handle: &Handle) -> Option<Instance> {
        let state = self.state.lock().expect("pool mutex poisoned");
        state.entries.get(&handle.0).map(|e| e.instance.clone())
    }

    /// The number of instances in `(ready, failed, retrying)`, for
    /// reporting on a metrics endpoint.
    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().expect("pool mutex poisoned");
        (state.ready.len(), state.failed.len(), state.retrying.len())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicU64, Ordering};

    use wf_types::model::IpPort;

    use super::*;

    struct TestClock(AtomicU64);

    impl TestClock {
        fn new(start: EpochMillis) -> TestClock {
            TestClock(AtomicU64::new(start))
        }

        fn advance(&self, delta_millis: u64) {
            self.0.fetch_add(delta_millis, Ordering::SeqCst);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> EpochMillis {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn instance(last_octet: u8) -> Instance {
        Instance {
            host_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 3, last_octet)),
            address: IpPort {
                ip: IpAddr::V4(Ipv4Addr::new(192, 168, 3, last_octet)),
                port: 1000 + last_octet as u16,
            },
            rule: None,
            labels: Default::default(),
        }
    }

    #[test]
    fn empty_pool_picks_nothing() {
        let pool = InstancePool::new(SystemClock);
        assert!(pool.pick_instance().is_none());
        pool.update_instances([]);
        assert!(pool.pick_instance().is_none());
    }

    #[test]
    fn pool_of_one_falls_back_to_the_failed_instance() {
        let pool = InstancePool::new(SystemClock);
        pool.update_instances([("a".to_string(), instance(101))]);

        let picked = pool.pick_instance().unwrap();
        assert_eq!(picked, Handle("a".to_string()));
        pool.succeeded(&picked);

        let picked = pool.pick_instance().unwrap();
        pool.failed(&picked);
        // Still the only instance in the pool, so still picked.
        assert_eq!(pool.pick_instance().unwrap(), Handle("a".to_string()));

        pool.update_instances([]);
        assert!(pool.pick_instance().is_none());
    }

    #[test]
    fn prefers_ready_then_retrying_then_failed() {
        let clock = TestClock::new(0);
        let pool = InstancePool::with_policy(
            clock,
            RetryPolicy { base_millis: 100, cap_exponent: 5 },
        );

        pool.update_instances([("a".into(), instance(101))]);
        let a = pool.pick_instance().unwrap();
        pool.failed(&a);

        // inst2 (ready) is preferred to inst1 (failed).
        pool.update_instances([("a".into(), instance(101)), ("b".into(), instance(102))]);
        for _ in 0..20 {
            let picked = pool.pick_instance().unwrap();
            assert_eq!(picked, Handle("b".to_string()));
            pool.succeeded(&picked);
        }

        // Fail inst2, let inst1's deadline elapse, and retry it.
        pool.clock.advance(100);
        let b = pool.pick_instance().unwrap();
        assert_eq!(b, Handle("b".to_string()));
        pool.failed(&b);
        pool.process_retries();

        // inst1 is now RETRYING, strictly preferred over inst2's FAILED.
        assert_eq!(pool.pick_instance().unwrap(), Handle("a".to_string()));

        // A fresh, actually-READY inst3 is preferred over both.
        pool.update_instances([
            ("a".into(), instance(101)),
            ("b".into(), instance(102)),
            ("c".into(), instance(103)),
        ]);
        for _ in 0..20 {
            let picked = pool.pick_instance().unwrap();
            assert_eq!(picked, Handle("c".to_string()));
            pool.succeeded(&picked);
        }
    }

    #[test]
    fn exponential_backoff_doubles_the_retry_window() {
        let clock = TestClock::new(0);
        let pool = InstancePool::with_policy(
            clock,
            RetryPolicy { base_millis: 100, cap_exponent: 5 },
        );
        pool.update_instances([("a".into(), instance(101))]);

        for i in 0..5u32 {
            let picked = pool.pick_instance().unwrap();
            pool.failed(&picked);
            assert!(pool.state.lock().unwrap().ready.is_empty());
            pool.clock.advance((1u64 << i) * 100);
            pool.process_retries();
            assert!(!pool.state.lock().unwrap().retrying.is_empty());
        }
    }

    #[test]
    fn update_instances_preserves_health_state() {
        let pool = InstancePool::new(SystemClock);
        pool.update_instances([("a".into(), instance(101))]);
        let a = pool.pick_instance().unwrap();
        pool.failed(&a);

        // Re-reconciling with a changed payload must not reset the failure.
        pool.update_instances([("a".into(), instance(201))]);
        let state = pool.state.lock().unwrap();
        assert!(state.failed.contains("a"));
        assert_eq!(state.entries["a"].instance.address.port, 1201);
    }
}
