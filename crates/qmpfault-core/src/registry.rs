//! Callback registry keyed by fault event id.
//!
//! Ids are small integers handed to the target with each trigger and echoed
//! back in `FAULT_EVENT`. An id is the slot index of its callback; slots are
//! never freed, so ids stay stable for the session lifetime and a callback
//! that reschedules itself keeps its id.

use crate::{callback::Callback, error::SessionError};

/// Maps fault event ids to callbacks.
///
/// Registration scans all slots, which is fine for the handful of faults a
/// session arms.
///
/// # Invariants
///
/// - A callback occupies exactly one slot, whatever the number of
///   registrations
/// - Distinct callbacks never share an id
#[derive(Debug)]
pub struct CallbackRegistry<S> {
    slots: Vec<Callback<S>>,
}

impl<S> Default for CallbackRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> CallbackRegistry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register `callback`, returning its event id.
    ///
    /// A handle already registered (same action, see
    /// [`Callback::same_as`]) gets its existing id back. Otherwise the
    /// callback takes the first unused id.
    pub fn register(&mut self, callback: &Callback<S>) -> u64 {
        if let Some(index) = self.slots.iter().position(|slot| slot.same_as(callback)) {
            return index as u64;
        }

        self.slots.push(callback.clone());
        (self.slots.len() - 1) as u64
    }

    /// Callback registered under `event_id`.
    ///
    /// # Errors
    ///
    /// - `SessionError::UnknownEventId` if nothing was registered under it
    pub fn get(&self, event_id: u64) -> Result<Callback<S>, SessionError> {
        usize::try_from(event_id)
            .ok()
            .and_then(|index| self.slots.get(index))
            .cloned()
            .ok_or(SessionError::UnknownEventId(event_id))
    }

    /// Run the callback registered under `event_id`.
    ///
    /// # Errors
    ///
    /// - `SessionError::UnknownEventId` if nothing was registered under it
    /// - Any error raised by the callback
    pub fn dispatch(&self, event_id: u64, context: &mut S) -> Result<(), SessionError> {
        self.get(event_id)?.invoke(context)
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no callback has been registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    fn counter(name: &str) -> Callback<Vec<String>> {
        let name = name.to_string();
        Callback::new(&name.clone(), move |log: &mut Vec<String>| {
            log.push(name.clone());
            Ok(())
        })
    }

    #[test]
    fn first_registration_gets_zero() {
        let mut registry = CallbackRegistry::new();
        assert_eq!(registry.register(&counter("c1")), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reregistration_is_idempotent() {
        let mut registry = CallbackRegistry::new();
        let c1 = counter("c1");
        let c2 = counter("c2");

        assert_eq!(registry.register(&c1), 0);
        assert_eq!(registry.register(&c2), 1);
        assert_eq!(registry.register(&c1.clone()), 0);
        assert_eq!(registry.register(&c2), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn dispatch_invokes_exactly_that_callback() {
        let mut registry = CallbackRegistry::new();
        registry.register(&counter("c1"));
        registry.register(&counter("c2"));

        let mut log = Vec::new();
        registry.dispatch(1, &mut log).unwrap();
        assert_eq!(log, vec!["c2".to_string()]);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let registry: CallbackRegistry<Vec<String>> = CallbackRegistry::new();
        let err = registry.dispatch(0, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, SessionError::UnknownEventId(0)));
        assert!(matches!(registry.get(u64::MAX), Err(SessionError::UnknownEventId(u64::MAX))));
    }

    proptest! {
        /// Any interleaving of registrations keeps one id per callback and
        /// distinct ids across callbacks.
        #[test]
        fn prop_ids_track_identity(picks in prop::collection::vec(0usize..6, 1..40)) {
            let callbacks: Vec<_> = (0..6).map(|i| counter(&format!("c{i}"))).collect();
            let mut registry = CallbackRegistry::new();
            let mut assigned: Vec<Option<u64>> = vec![None; callbacks.len()];

            for pick in picks {
                let id = registry.register(&callbacks[pick]);
                match assigned[pick] {
                    Some(previous) => prop_assert_eq!(previous, id),
                    None => assigned[pick] = Some(id),
                }
            }

            let ids: Vec<u64> = assigned.iter().flatten().copied().collect();
            let unique: HashSet<u64> = ids.iter().copied().collect();
            prop_assert_eq!(ids.len(), unique.len());
            prop_assert_eq!(registry.len(), ids.len());
        }
    }
}
