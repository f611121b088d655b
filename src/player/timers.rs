use std::{collections::HashMap, time::Duration};

use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};

/// Named timers a session can have armed at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    Prefetch,
    /// Delayed advance after a skip.
    Advance,
    /// Retry/skip scheduled by the recovery policy.
    Recovery,
    /// Ceiling on how long a transition may stay in flight.
    TransitionDeadline,
    /// Transport has to report playing before this fires.
    StartTimeout,
    /// Writes a snapshot that changed too soon after the previous write.
    Persist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub slot: TimerSlot,
    pub ticket: u64,
}

struct Armed<A> {
    ticket: u64,
    task: JoinHandle<()>,
    action: A,
}

/// One timer per slot, each carrying the action to run when it fires.
///
/// Arming a slot aborts whatever was armed there. A firing whose ticket is
/// no longer the slot's current one is stale and [`Timers::fire`] ignores it.
pub struct Timers<A, E> {
    slots: HashMap<TimerSlot, Armed<A>>,
    next_ticket: u64,
    tx: UnboundedSender<E>,
    wrap: fn(TimerFired) -> E,
}

impl<A, E: Send + 'static> Timers<A, E> {
    pub fn new(tx: UnboundedSender<E>, wrap: fn(TimerFired) -> E) -> Self {
        Self {
            slots: HashMap::new(),
            next_ticket: 0,
            tx,
            wrap,
        }
    }

    pub fn arm(&mut self, slot: TimerSlot, delay: Duration, action: A) -> u64 {
        self.cancel(slot);

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let tx = self.tx.clone();
        let event = (self.wrap)(TimerFired { slot, ticket });

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });

        self.slots.insert(
            slot,
            Armed {
                ticket,
                task,
                action,
            },
        );
        ticket
    }
}

impl<A, E> Timers<A, E> {
    /// Takes the action for a firing if it is still current.
    pub fn fire(&mut self, fired: TimerFired) -> Option<A> {
        match self.slots.get(&fired.slot) {
            Some(armed) if armed.ticket == fired.ticket => {
                self.slots.remove(&fired.slot).map(|armed| armed.action)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self, slot: TimerSlot) -> bool {
        match self.slots.remove(&slot) {
            Some(armed) => {
                armed.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, slot: TimerSlot) -> bool {
        self.slots.contains_key(&slot)
    }

    pub fn clear_all(&mut self) {
        for (_, armed) in self.slots.drain() {
            armed.task.abort();
        }
    }
}

impl<A, E> Drop for Timers<A, E> {
    fn drop(&mut self) {
        self.clear_all();
    }
}
