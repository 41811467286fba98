//! Shared callback handles.
//!
//! A [`Callback`] is a reference-counted handle to an operator action. Clones
//! share identity: the registry recognizes a re-registered handle by pointer,
//! which is what lets a callback reschedule itself without allocating a new
//! event id. An action that needs its own handle holds a [`WeakCallback`] so
//! the handle does not keep itself alive.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use crate::error::SessionError;

type CallbackFn<S> = dyn FnMut(&mut S) -> Result<(), SessionError>;

/// Action run when a fault trigger fires.
///
/// Generic over the context `S` handed to the action; the session uses
/// [`SessionCallback`](crate::SessionCallback), which receives the session
/// itself so the action can issue commands.
pub struct Callback<S> {
    name: Rc<str>,
    action: Rc<RefCell<CallbackFn<S>>>,
}

impl<S> Callback<S> {
    /// Wrap an action under a display name.
    pub fn new<F>(name: &str, action: F) -> Self
    where
        F: FnMut(&mut S) -> Result<(), SessionError> + 'static,
    {
        Self { name: Rc::from(name), action: Rc::new(RefCell::new(action)) }
    }

    /// Wrap an action built from a weak handle to itself.
    ///
    /// `make` runs once, before the callback exists; the handle it receives
    /// only upgrades after construction returns.
    pub fn new_cyclic<F, M>(name: &str, make: M) -> Self
    where
        F: FnMut(&mut S) -> Result<(), SessionError> + 'static,
        M: FnOnce(WeakCallback<S>) -> F,
    {
        let name: Rc<str> = Rc::from(name);
        let action = Rc::new_cyclic(|weak: &Weak<RefCell<F>>| {
            let weak: Weak<RefCell<CallbackFn<S>>> = weak.clone();
            RefCell::new(make(WeakCallback { name: Rc::clone(&name), action: weak }))
        });
        Self { name, action }
    }

    /// Non-owning handle to the same action.
    pub fn downgrade(&self) -> WeakCallback<S> {
        WeakCallback { name: Rc::clone(&self.name), action: Rc::downgrade(&self.action) }
    }

    /// Display name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `other` is a handle to the same action.
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.action, &other.action)
    }

    /// Run the action.
    ///
    /// # Errors
    ///
    /// - `SessionError::CallbackBusy` if the action is already running
    /// - Any error the action returns
    pub fn invoke(&self, context: &mut S) -> Result<(), SessionError> {
        let mut action = self
            .action
            .try_borrow_mut()
            .map_err(|_| SessionError::CallbackBusy { name: self.name.to_string() })?;
        (&mut *action)(context)
    }
}

impl<S> Clone for Callback<S> {
    fn clone(&self) -> Self {
        Self { name: Rc::clone(&self.name), action: Rc::clone(&self.action) }
    }
}

impl<S> fmt::Debug for Callback<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Non-owning [`Callback`] handle.
pub struct WeakCallback<S> {
    name: Rc<str>,
    action: Weak<RefCell<CallbackFn<S>>>,
}

impl<S> WeakCallback<S> {
    /// The callback, if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<Callback<S>> {
        let action = self.action.upgrade()?;
        Some(Callback { name: Rc::clone(&self.name), action })
    }
}

impl<S> Clone for WeakCallback<S> {
    fn clone(&self) -> Self {
        Self { name: Rc::clone(&self.name), action: Weak::clone(&self.action) }
    }
}

impl<S> fmt::Debug for WeakCallback<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCallback").field("name", &self.name).finish_non_exhaustive()
    }
}
