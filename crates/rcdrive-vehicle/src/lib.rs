//! `rcdrive-vehicle` – the operator's driving intent.
//!
//! [`Vehicle`] holds the mutable intent (`active`, throttle, steer) that the
//! input surface writes and the vehicle link reads.  It is an observable:
//! every mutation synchronously notifies the registered subscribers, in
//! registration order, once the mutation has completed.
//!
//! Clone it cheaply – all clones share the same state and subscriber list.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use rcdrive_types::{Steer, Throttle};
//! use rcdrive_vehicle::Vehicle;
//!
//! let vehicle = Vehicle::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! vehicle.subscribe(move |snap| sink.lock().unwrap().push(snap.throttle));
//!
//! vehicle.set_throttle(Throttle::Forward);
//! vehicle.set_steer(Steer::Left);
//!
//! assert_eq!(*seen.lock().unwrap(), vec![Throttle::Forward, Throttle::Forward]);
//! assert_eq!(vehicle.snapshot().steer.degrees(), 0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rcdrive_types::{SteerAngle, Throttle};
use tracing::trace;

/// Point-in-time copy of the vehicle intent handed to subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VehicleSnapshot {
    pub active: bool,
    pub throttle: Throttle,
    pub steer: SteerAngle,
}

/// Handle returned by [`Vehicle::subscribe`]; pass it to
/// [`Vehicle::unsubscribe`] to stop receiving notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&VehicleSnapshot) + Send + Sync>;

#[derive(Default)]
struct Inner {
    state: Mutex<VehicleSnapshot>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
}

/// Shared, observable vehicle intent.
#[derive(Clone, Default)]
pub struct Vehicle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vehicle")
            .field("state", &self.snapshot())
            .field("subscribers", &lock(&self.inner.subscribers).len())
            .finish()
    }
}

impl Vehicle {
    /// Inactive vehicle in neutral with straight wheels and no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> VehicleSnapshot {
        *lock(&self.inner.state)
    }

    pub fn is_active(&self) -> bool {
        self.snapshot().active
    }

    pub fn throttle(&self) -> Throttle {
        self.snapshot().throttle
    }

    pub fn steer(&self) -> SteerAngle {
        self.snapshot().steer
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Register `subscriber`.  It is called after every mutation, on the
    /// thread that performed the mutation, after earlier subscribers.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&VehicleSnapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.subscribers).push((id, Arc::new(subscriber)));
        id
    }

    /// Remove a subscriber.  Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.inner.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn set_active(&self, active: bool) {
        self.mutate(|s| s.active = active);
    }

    pub fn set_throttle(&self, dir: Throttle) {
        self.mutate(|s| s.throttle = dir);
    }

    /// Accepts either a raw angle (clamped to `0..=180`) or a
    /// [`Steer`][rcdrive_types::Steer] direction.
    pub fn set_steer(&self, steer: impl Into<SteerAngle>) {
        let steer = steer.into();
        self.mutate(|s| s.steer = steer);
    }

    /// Neutral throttle, then straight wheels.  Subscribers are notified once
    /// per step so each change is observed on its own.
    pub fn reset(&self) {
        self.set_throttle(Throttle::Neutral);
        self.set_steer(SteerAngle::default());
    }

    fn mutate(&self, apply: impl FnOnce(&mut VehicleSnapshot)) {
        let snapshot = {
            let mut state = lock(&self.inner.state);
            apply(&mut state);
            *state
        };
        trace!(?snapshot, "vehicle state changed");
        self.notify(&snapshot);
    }

    // Subscribers run without any lock held so they may read or mutate the
    // vehicle themselves.
    fn notify(&self, snapshot: &VehicleSnapshot) {
        let subscribers: Vec<Subscriber> = lock(&self.inner.subscribers)
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(snapshot);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcdrive_types::Steer;

    fn recorder(vehicle: &Vehicle) -> Arc<Mutex<Vec<VehicleSnapshot>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        vehicle.subscribe(move |snap| sink.lock().unwrap().push(*snap));
        seen
    }

    #[test]
    fn new_vehicle_is_inactive_and_neutral() {
        let vehicle = Vehicle::new();
        let snap = vehicle.snapshot();
        assert!(!snap.active);
        assert_eq!(snap.throttle, Throttle::Neutral);
        assert_eq!(snap.steer.degrees(), 90);
    }

    #[test]
    fn subscribers_see_state_after_mutation() {
        let vehicle = Vehicle::new();
        let seen = recorder(&vehicle);

        vehicle.set_throttle(Throttle::Reverse);
        vehicle.set_steer(120u8);
        vehicle.set_active(true);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].throttle, Throttle::Reverse);
        assert_eq!(seen[1].steer.degrees(), 120);
        assert!(seen[2].active);
    }

    #[test]
    fn subscribers_are_called_in_registration_order() {
        let vehicle = Vehicle::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            vehicle.subscribe(move |_| order.lock().unwrap().push(tag));
        }

        vehicle.set_throttle(Throttle::Forward);

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn set_steer_accepts_direction_or_angle() {
        let vehicle = Vehicle::new();
        vehicle.set_steer(Steer::Right);
        assert_eq!(vehicle.steer().degrees(), 180);
        vehicle.set_steer(Steer::Left);
        assert_eq!(vehicle.steer().degrees(), 0);
        vehicle.set_steer(200u8);
        assert_eq!(vehicle.steer().degrees(), 180);
    }

    #[test]
    fn reset_notifies_throttle_then_steer() {
        let vehicle = Vehicle::new();
        vehicle.set_throttle(Throttle::Forward);
        vehicle.set_steer(Steer::Left);
        let seen = recorder(&vehicle);

        vehicle.reset();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].throttle, Throttle::Neutral);
        assert_eq!(seen[0].steer.degrees(), 0);
        assert_eq!(seen[1].steer.degrees(), 90);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let vehicle = Vehicle::new();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        let id = vehicle.subscribe(move |_| *sink.lock().unwrap() += 1);

        vehicle.set_active(true);
        assert!(vehicle.unsubscribe(id));
        vehicle.set_active(false);

        assert_eq!(*seen.lock().unwrap(), 1);
        assert!(!vehicle.unsubscribe(id));
    }

    #[test]
    fn subscriber_may_read_vehicle_without_deadlock() {
        let vehicle = Vehicle::new();
        let reader = vehicle.clone();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        vehicle.subscribe(move |_| *sink.lock().unwrap() = Some(reader.throttle()));

        vehicle.set_throttle(Throttle::Forward);

        assert_eq!(*seen.lock().unwrap(), Some(Throttle::Forward));
    }
}
