//! The transition-table engine (§4.1): a table of `(source, event) -> dest`
//! pairs, `BeforeEnter`/`AfterEnter`/`WhenStateTimeout` callbacks, a FIFO
//! follow-up event queue, and a history log. One `Fsm` instance exists per
//! game (Discovery) or per player (Activation); the owning service looks it
//! up by `FsmHandle` rather than holding a live reference, so callbacks never
//! need to borrow the machine that is calling them.

use ephemeral_core::{CoordError, Event, FsmHandle};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

/// A state usable in the engine. Every FSM in this workspace reserves one
/// variant as the terminal `stopped` state: once entered, no further
/// transitions are looked up and `write` becomes a no-op.
pub trait FsmState: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// The reserved terminal state.
    fn stopped() -> Self;
}

/// An event kind usable in the engine.
pub trait FsmEventKind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static> FsmEventKind for T {}

/// One recorded transition, kept for diagnostics and the `History` API
/// (§4.1).
#[derive(Debug, Clone)]
pub struct HistoryEntry<S, E> {
    /// State the machine was in before this transition.
    pub from: S,
    /// Event that triggered the transition.
    pub event: E,
    /// State the machine entered.
    pub to: S,
    /// Wall-clock time the transition was applied.
    pub at: time::OffsetDateTime,
}

/// Source side of a transition-table entry: either a specific state, or the
/// wildcard that matches any state not otherwise claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Source<S> {
    State(S),
    Any,
}

type BeforeAfter<S, E> = HashMap<S, Vec<Box<dyn Fn(&FsmHandle, S, E) -> Vec<Event> + Send + Sync>>>;

/// A fully-built FSM: transition table, callbacks, and runtime state.
pub struct Fsm<S: FsmState, E: FsmEventKind> {
    handle: FsmHandle,
    current: S,
    table: HashMap<(Source<S>, E), S>,
    before_enter: BeforeAfter<S, E>,
    after_enter: BeforeAfter<S, E>,
    on_timeout: HashMap<S, (Duration, Box<dyn Fn(&FsmHandle) -> Vec<Event> + Send + Sync>)>,
    queue: VecDeque<E>,
    history: Vec<HistoryEntry<S, E>>,
}

impl<S: FsmState, E: FsmEventKind> Fsm<S, E> {
    /// The FSM's handle, used by the owning service to route follow-up
    /// events back to this instance.
    pub fn handle(&self) -> &FsmHandle {
        &self.handle
    }

    /// The state the machine currently occupies.
    pub fn current(&self) -> S {
        self.current
    }

    /// Whether the machine has reached its terminal state.
    pub fn is_stopped(&self) -> bool {
        self.current == S::stopped()
    }

    /// The full transition history, oldest first.
    pub fn history(&self) -> &[HistoryEntry<S, E>] {
        &self.history
    }

    /// How long the machine may dwell in its current state before
    /// `on_timeout`'s effects should be applied, if a timeout is registered
    /// for it.
    pub fn timeout_budget(&self) -> Option<Duration> {
        self.on_timeout.get(&self.current).map(|(d, _)| *d)
    }

    /// Enqueue an event and drain the queue, applying every transition it
    /// triggers (including follow-up events pushed by callbacks) before
    /// returning. Events with no matching transition from the current state
    /// are rejected as protocol errors rather than silently dropped, per
    /// §7's "unregistered event for the current state" case. Writes to a
    /// stopped machine are rejected outright.
    pub fn write(&mut self, event: E) -> Result<Vec<Event>, CoordError> {
        if self.is_stopped() {
            return Err(CoordError::protocol(format!(
                "{:?}: machine is stopped, rejecting {:?}",
                self.handle, event
            )));
        }
        self.queue.push_back(event);
        let mut effects = Vec::new();
        while let Some(event) = self.queue.pop_front() {
            effects.extend(self.apply(event)?);
            if self.is_stopped() {
                break;
            }
        }
        Ok(effects)
    }

    /// Apply the effects registered for the current state's timeout, if the
    /// caller's timer actually elapsed while the machine was still in that
    /// state. Callers must re-check `current()` against the state they
    /// armed the timer for before calling this, since the machine may have
    /// already transitioned away.
    pub fn fire_timeout(&mut self) -> Vec<Event> {
        match self.on_timeout.get(&self.current) {
            Some((_, callback)) => callback(&self.handle),
            None => Vec::new(),
        }
    }

    fn apply(&mut self, event: E) -> Result<Vec<Event>, CoordError> {
        let dest = self
            .table
            .get(&(Source::State(self.current), event))
            .or_else(|| self.table.get(&(Source::Any, event)))
            .copied()
            .ok_or_else(|| {
                CoordError::protocol(format!(
                    "{:?}: no transition from {:?} on {:?}",
                    self.handle, self.current, event
                ))
            })?;

        let mut effects = Vec::new();
        if let Some(callbacks) = self.before_enter.get(&dest) {
            for callback in callbacks {
                effects.extend(callback(&self.handle, dest, event));
            }
        }

        let from = self.current;
        self.current = dest;
        self.history.push(HistoryEntry {
            from,
            event,
            to: dest,
            at: time::OffsetDateTime::now_utc(),
        });
        tracing::debug!(handle = ?self.handle, ?from, ?event, ?dest, "fsm transition");

        if let Some(callbacks) = self.after_enter.get(&dest) {
            for callback in callbacks {
                effects.extend(callback(&self.handle, dest, event));
            }
        }
        Ok(effects)
    }
}

type Hook<S, E> = Box<dyn Fn(&FsmHandle, S, E) -> Vec<Event> + Send + Sync>;
type TimeoutHook = Box<dyn Fn(&FsmHandle) -> Vec<Event> + Send + Sync>;

/// Builder for a transition table and its callbacks, consumed by
/// [`FsmBuilder::build`] to produce a ready-to-drive [`Fsm`].
pub struct FsmBuilder<S: FsmState, E: FsmEventKind> {
    initial: S,
    table: HashMap<(Source<S>, E), S>,
    before_enter: BeforeAfter<S, E>,
    after_enter: BeforeAfter<S, E>,
    on_timeout: HashMap<S, (Duration, TimeoutHook)>,
}

impl<S: FsmState, E: FsmEventKind> FsmBuilder<S, E> {
    /// Start building a machine that begins in `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            table: HashMap::new(),
            before_enter: HashMap::new(),
            after_enter: HashMap::new(),
            on_timeout: HashMap::new(),
        }
    }

    /// Register a transition from a specific state.
    pub fn on(mut self, source: S, event: E, dest: S) -> Self {
        self.table.insert((Source::State(source), event), dest);
        self
    }

    /// Register a wildcard transition, matched when no specific-source entry
    /// applies for the current state and event (specific transitions always
    /// take precedence over this one, per §4.1).
    pub fn on_any(mut self, event: E, dest: S) -> Self {
        self.table.insert((Source::Any, event), dest);
        self
    }

    /// Register a callback run immediately before the machine enters
    /// `state`, while `current()` still reports the state being left.
    pub fn before_enter(mut self, state: S, callback: Hook<S, E>) -> Self {
        self.before_enter.entry(state).or_default().push(callback);
        self
    }

    /// Register a callback run immediately after the machine enters `state`.
    pub fn after_enter(mut self, state: S, callback: Hook<S, E>) -> Self {
        self.after_enter.entry(state).or_default().push(callback);
        self
    }

    /// Register a dwell-time budget for `state`: if the machine remains in
    /// `state` for longer than `duration`, the caller should invoke
    /// [`Fsm::fire_timeout`].
    pub fn on_timeout(mut self, state: S, duration: Duration, callback: TimeoutHook) -> Self {
        self.on_timeout.insert(state, (duration, callback));
        self
    }

    /// Build the machine, bound to `handle`.
    pub fn build(self, handle: FsmHandle) -> Fsm<S, E> {
        Fsm {
            handle,
            current: self.initial,
            table: self.table,
            before_enter: self.before_enter,
            after_enter: self.after_enter,
            on_timeout: self.on_timeout,
            queue: VecDeque::new(),
            history: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum DoorState {
        Open,
        Closed,
        Stopped,
    }

    impl FsmState for DoorState {
        fn stopped() -> Self {
            Self::Stopped
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum DoorEvent {
        Knock,
        Close,
        Destroy,
    }

    fn door_builder() -> FsmBuilder<DoorState, DoorEvent> {
        FsmBuilder::new(DoorState::Closed)
            .on(DoorState::Closed, DoorEvent::Knock, DoorState::Open)
            .on(DoorState::Open, DoorEvent::Close, DoorState::Closed)
            .on_any(DoorEvent::Destroy, DoorState::Stopped)
    }

    #[test]
    fn specific_transition_takes_precedence_over_wildcard() {
        let mut fsm = FsmBuilder::new(DoorState::Closed)
            .on(DoorState::Closed, DoorEvent::Knock, DoorState::Open)
            .on_any(DoorEvent::Knock, DoorState::Stopped)
            .build(FsmHandle::for_player());
        fsm.write(DoorEvent::Knock).unwrap();
        assert_eq!(fsm.current(), DoorState::Open);
    }

    #[test]
    fn unregistered_event_is_a_protocol_error() {
        let mut fsm = door_builder().build(FsmHandle::for_player());
        let err = fsm.write(DoorEvent::Close).unwrap_err();
        assert_eq!(err.category(), "protocol");
    }

    #[test]
    fn wildcard_transition_to_stopped_rejects_further_writes() {
        let mut fsm = door_builder().build(FsmHandle::for_player());
        fsm.write(DoorEvent::Destroy).unwrap();
        assert!(fsm.is_stopped());
        let err = fsm.write(DoorEvent::Knock).unwrap_err();
        assert_eq!(err.category(), "protocol");
    }

    #[test]
    fn history_accumulates_one_entry_per_transition() {
        let mut fsm = door_builder().build(FsmHandle::for_player());
        fsm.write(DoorEvent::Knock).unwrap();
        fsm.write(DoorEvent::Close).unwrap();
        assert_eq!(fsm.history().len(), 2);
        assert_eq!(fsm.history()[0].from, DoorState::Closed);
        assert_eq!(fsm.history()[0].to, DoorState::Open);
    }

    #[test]
    fn after_enter_callback_can_chain_follow_up_events_via_effects() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let fired = Arc::new(AtomicBool::new(false));
        let fired_in_callback = fired.clone();
        let fsm = FsmBuilder::new(DoorState::Closed)
            .on(DoorState::Closed, DoorEvent::Knock, DoorState::Open)
            .after_enter(
                DoorState::Open,
                Box::new(move |_handle, _state, _event| {
                    fired_in_callback.store(true, Ordering::SeqCst);
                    Vec::new()
                }),
            );
        let mut fsm = fsm.build(FsmHandle::for_player());
        fsm.write(DoorEvent::Knock).unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }
}
