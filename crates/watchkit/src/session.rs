#![forbid(unsafe_code)]

//! Access sessions: collecting reads while a probe runs.
//!
//! # Design
//!
//! Each thread keeps a stack of open [`AccessSet`]s. Registrars report reads
//! through [`track_access`], which records into the top of the calling
//! thread's stack. Opening a session pushes; the [`AccessSession`] guard pops
//! when finished or dropped, including during unwinding.
//!
//! Nested sessions shadow the outer one: reads performed while the inner
//! session is open are recorded only there, and the outer session resumes
//! recording once the inner one closes.
//!
//! # Invariants
//!
//! 1. A session only ever sees reads made on its own thread.
//! 2. Repeated reads of one property within one session collapse to one entry.
//! 3. Closing a session restores the stack depth it was opened at.
//! 4. A guard only ever closes its own frame. Each frame carries a token
//!    unique to the session that pushed it; a guard whose frame was already
//!    discarded (by an outer session closing first) leaves the stack alone.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::property::PropertyId;
use crate::registrar::{Registrar, RegistrarId};
use crate::registration::{Member, Observer, RegistrationId, RegistrationState};

/// One open session on the stack.
struct Frame {
    token: u64,
    set: AccessSet,
}

thread_local! {
    /// Stack of open access sessions for this thread.
    static SESSION_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

fn next_token() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

fn owns_frame(stack: &[Frame], depth: usize, token: u64) -> bool {
    stack.get(depth).is_some_and(|frame| frame.token == token)
}

/// Record a read of `property` on `registrar` into the innermost open session
/// of the calling thread.
///
/// Returns false if no session is open.
pub fn track_access(registrar: &Registrar, property: PropertyId) -> bool {
    SESSION_STACK.with(|stack| match stack.borrow_mut().last_mut() {
        Some(frame) => {
            frame.set.insert(registrar, property);
            true
        }
        None => false,
    })
}

/// Whether a tracking session is open on this thread.
#[must_use]
pub fn is_tracking() -> bool {
    SESSION_STACK.with(|stack| !stack.borrow().is_empty())
}

/// Number of nested sessions open on this thread.
#[must_use]
pub fn session_depth() -> usize {
    SESSION_STACK.with(|stack| stack.borrow().len())
}

/// Properties read during one session, grouped by registrar.
#[derive(Default)]
pub struct AccessSet {
    entries: FxHashMap<RegistrarId, (Registrar, FxHashSet<PropertyId>)>,
}

impl AccessSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one read. Returns false if it was already recorded.
    pub fn insert(&mut self, registrar: &Registrar, property: PropertyId) -> bool {
        self.entries
            .entry(registrar.id())
            .or_insert_with(|| (registrar.clone(), FxHashSet::default()))
            .1
            .insert(property)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of distinct `(registrar, property)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(|(_, properties)| properties.len()).sum()
    }

    #[must_use]
    pub fn registrar_count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn contains(&self, registrar: RegistrarId, property: PropertyId) -> bool {
        self.entries
            .get(&registrar)
            .is_some_and(|(_, properties)| properties.contains(&property))
    }

    /// Properties read on `registrar`, in no particular order.
    pub fn properties_on(&self, registrar: RegistrarId) -> impl Iterator<Item = PropertyId> + '_ {
        self.entries
            .get(&registrar)
            .into_iter()
            .flat_map(|(_, properties)| properties.iter().copied())
    }

    /// Turn the recorded reads into one logical registration.
    ///
    /// Every touched registrar receives a record for exactly the properties
    /// read on it. All records share `callback`: the first mutation of any
    /// watched property runs it once and removes every record. Registration
    /// ids are allocated before any record is inserted, so each record knows
    /// its siblings from the start.
    ///
    /// An empty set registers nothing and drops `callback`.
    pub fn finalize(self, callback: impl FnOnce() + Send + 'static) -> RegistrationMap {
        if self.entries.is_empty() {
            debug!("no properties read; nothing registered");
            return RegistrationMap::default();
        }

        let mut planned: Vec<(Registrar, RegistrationId, FxHashSet<PropertyId>)> = self
            .entries
            .into_values()
            .map(|(registrar, properties)| (registrar, RegistrationId::next(), properties))
            .collect();
        planned.sort_by_key(|(registrar, _, _)| registrar.id());

        let members = planned
            .iter()
            .map(|(registrar, id, _)| Member {
                registrar: registrar.downgrade(),
                registration: *id,
            })
            .collect();
        let observer = Arc::new(Observer::new(Box::new(callback), members));

        let entries = planned
            .into_iter()
            .map(|(registrar, id, properties)| {
                registrar.insert_registration(id, properties, &observer);
                (registrar.id(), id)
            })
            .collect();

        RegistrationMap {
            entries,
            observer: Some(observer),
        }
    }
}

impl fmt::Debug for AccessSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(id, (_, properties))| (id, properties.len())),
            )
            .finish()
    }
}

/// Result of [`AccessSet::finalize`]: the registration id created on each
/// touched registrar.
#[derive(Debug, Default)]
pub struct RegistrationMap {
    entries: Vec<(RegistrarId, RegistrationId)>,
    observer: Option<Arc<Observer>>,
}

impl RegistrationMap {
    #[must_use]
    pub fn get(&self, registrar: RegistrarId) -> Option<RegistrationId> {
        self.entries
            .iter()
            .find(|(id, _)| *id == registrar)
            .map(|(_, registration)| *registration)
    }

    /// `(registrar, registration)` pairs, ordered by registrar id.
    pub fn iter(&self) -> impl Iterator<Item = (RegistrarId, RegistrationId)> + '_ {
        self.entries.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lifecycle of the logical registration, or `None` if nothing was
    /// registered.
    #[must_use]
    pub fn state(&self) -> Option<RegistrationState> {
        self.observer.as_ref().map(|observer| observer.state())
    }
}

/// An open tracking session on the current thread.
///
/// Created by [`AccessSession::begin`]. Call [`finish`](Self::finish) to
/// close it and take the recorded reads; dropping it instead discards them.
#[must_use = "the session closes when this guard is dropped"]
pub struct AccessSession {
    /// Stack depth below this session.
    depth: usize,
    /// Identifies this session's frame on the stack.
    token: u64,
    finished: bool,
    /// Sessions are thread-local.
    _marker: PhantomData<*const ()>,
}

impl AccessSession {
    /// Open a session, shadowing any session already open on this thread.
    pub fn begin() -> Self {
        let token = next_token();
        let depth = SESSION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Frame {
                token,
                set: AccessSet::new(),
            });
            stack.len() - 1
        });
        Self {
            depth,
            token,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// Nesting depth of this session (0 for the outermost).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Close the session and return what it recorded.
    ///
    /// Sessions opened inside this one and never closed are discarded. If an
    /// enclosing session already closed and took this frame with it, the
    /// result is empty and the stack is left untouched.
    pub fn finish(mut self) -> AccessSet {
        self.finished = true;
        SESSION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if !owns_frame(&stack, self.depth, self.token) {
                debug!(depth = self.depth, "session frame already discarded");
                return AccessSet::new();
            }
            stack.truncate(self.depth + 1);
            stack.pop().map(|frame| frame.set).unwrap_or_default()
        })
    }
}

impl Drop for AccessSession {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Thread teardown may already have destroyed the stack.
        let _ = SESSION_STACK.try_with(|stack| {
            if let Ok(mut stack) = stack.try_borrow_mut() {
                if owns_frame(&stack, self.depth, self.token) {
                    stack.truncate(self.depth);
                }
            }
        });
    }
}

impl fmt::Debug for AccessSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessSession")
            .field("depth", &self.depth)
            .finish()
    }
}
