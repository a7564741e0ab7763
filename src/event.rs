//! Event handling.
//!
//! The [Machine](crate::machine::Machine) publishes an [Event] every time a piece of its
//! visible state changes. Interested parties subscribe to events by name with
//! [subscribe](crate::machine::Machine::subscribe) and get a [Subscription] back, which can
//! later be handed to [unsubscribe](crate::machine::Machine::unsubscribe).
//!
//! Event names are `MEM.<addr>`, `REG.<name>`, `FLAG.<name>`, `STACK.<index>`,
//! `INS.STR.<addr>`, `LABEL.<addr>`, `RUNNING`, `INS.COUNT` and `ACC.COUNT`. Subscribing to
//! `*` receives every event.
//!
//! Dispatch is synchronous: listeners run inside the call that changed the state, in
//! subscription order. Listeners of `*` take their place in that order like any other. The
//! only exception is queueing mode, where events are collected and dispatched on
//! [flush](EventHub::flush).
//!
//! A blanket implementation of [EventListener] for all `FnMut(&Event)` is provided.

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;

/// Name of the pseudo-event that matches every event.
pub const ALL_EVENTS: &str = "*";

/// Represents a change of the state of a machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A memory cell was written.
    MemoryChange {
        address: usize,
        value: u8,
    },

    /// A register was written.
    RegisterChange {
        name: &'static str,
        value: u32,
    },

    /// A flag was written.
    FlagChange {
        name: &'static str,
        value: bool,
    },

    /// A cell of the stack of a stack machine was written.
    StackChange {
        address: usize,
        value: u8,
    },

    /// The disassembled text of a memory cell changed.
    InstructionStringChange {
        address: usize,
        text: String,
    },

    /// The label shown for a memory cell changed.
    LabelChange {
        address: usize,
        label: String,
    },

    /// The machine was started or stopped.
    RunningChange {
        running: bool,
    },

    InstructionCountChange {
        count: u64,
    },

    AccessCountChange {
        count: u64,
    },
}

impl Event {
    /// The name listeners subscribe to for this event.
    pub fn name(&self) -> String {
        match self {
            Event::MemoryChange { address, .. } => format!("MEM.{}", address),
            Event::RegisterChange { name, .. } => format!("REG.{}", name.to_uppercase()),
            Event::FlagChange { name, .. } => format!("FLAG.{}", name.to_uppercase()),
            Event::StackChange { address, .. } => format!("STACK.{}", address),
            Event::InstructionStringChange { address, .. } => format!("INS.STR.{}", address),
            Event::LabelChange { address, .. } => format!("LABEL.{}", address),
            Event::RunningChange { .. } => "RUNNING".to_string(),
            Event::InstructionCountChange { .. } => "INS.COUNT".to_string(),
            Event::AccessCountChange { .. } => "ACC.COUNT".to_string(),
        }
    }
}

/// Trait for consuming events.
pub trait EventListener {
    /// Called whenever an event the listener subscribed to is published.
    fn event(&mut self, event: &Event);
}

impl<F> EventListener for F where F: FnMut(&Event) {
    fn event(&mut self, event: &Event) {
        self(event)
    }
}

/// Handle of a registered listener, used to remove it again.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    event: String,
    id: usize,
}

impl Subscription {
    /// Name of the event the listener is registered for.
    pub fn event(&self) -> &str {
        &self.event
    }
}

/// Registry mapping event names to listeners.
pub struct EventHub {
    listeners: HashMap<String, Vec<(usize, Box<dyn EventListener>)>>,
    next_id: usize,
    queue: Option<Vec<Event>>,
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listeners.values().map(Vec::len).sum::<usize>())
            .field("queued", &self.queue.as_ref().map(Vec::len))
            .finish()
    }
}

impl Default for EventHub {
    fn default() -> EventHub {
        EventHub::new()
    }
}

impl EventHub {
    pub fn new() -> EventHub {
        EventHub {
            listeners: HashMap::new(),
            next_id: 0,
            queue: None,
        }
    }

    /// Registers `listener` for events named `event`. Names are case-insensitive.
    pub fn subscribe<L>(&mut self, event: &str, listener: L) -> Subscription
    where
        L: EventListener + 'static,
    {
        let event = event.to_uppercase();
        let id = self.next_id;
        self.next_id += 1;

        self.listeners
            .entry(event.clone())
            .or_default()
            .push((id, Box::new(listener) as Box<dyn EventListener>));

        Subscription { event, id }
    }

    /// Removes a listener. Returns `false` if it was already removed.
    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        let listeners = match self.listeners.get_mut(&subscription.event) {
            Some(listeners) => listeners,
            None => return false,
        };

        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription.id);
        let removed = listeners.len() != before;

        if listeners.is_empty() {
            self.listeners.remove(&subscription.event);
        }

        removed
    }

    /// Returns `true` if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Starts collecting events instead of dispatching them.
    pub fn start_queue(&mut self) {
        if self.queue.is_none() {
            self.queue = Some(Vec::new());
        }
    }

    /// Leaves queueing mode and dispatches every collected event in publication order.
    pub fn flush(&mut self) {
        if let Some(queue) = self.queue.take() {
            for event in queue {
                self.dispatch(&event);
            }
        }
    }

    pub fn is_queueing(&self) -> bool {
        self.queue.is_some()
    }

    /// Publishes an event, or queues it in queueing mode.
    pub fn publish(&mut self, event: Event) {
        if self.listeners.is_empty() {
            return;
        }

        match self.queue {
            Some(ref mut queue) => queue.push(event),
            None => self.dispatch(&event),
        }
    }

    fn dispatch(&mut self, event: &Event) {
        let name = event.name();

        // Ids grow with every subscription, so merging by id restores subscription order.
        let mut every = self.listeners.remove(ALL_EVENTS).unwrap_or_default();
        let named = self.listeners.get_mut(&name).into_iter().flatten();

        for (_, listener) in named.merge_by(every.iter_mut(), |a, b| a.0 < b.0) {
            listener.event(event);
        }

        if !every.is_empty() {
            self.listeners.insert(ALL_EVENTS.to_string(), every);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<Event>>>, impl FnMut(&Event)) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |event: &Event| sink.borrow_mut().push(event.clone()))
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Event::MemoryChange { address: 12, value: 0 }.name(), "MEM.12");
        assert_eq!(Event::RegisterChange { name: "ac", value: 0 }.name(), "REG.AC");
        assert_eq!(Event::InstructionStringChange { address: 3, text: String::new() }.name(), "INS.STR.3");
        assert_eq!(Event::AccessCountChange { count: 0 }.name(), "ACC.COUNT");
    }

    #[test]
    fn test_subscribe_dispatch_in_order() {
        let mut hub = EventHub::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let first = order.clone();
        hub.subscribe("MEM.1", move |_: &Event| first.borrow_mut().push(1));
        let second = order.clone();
        hub.subscribe("mem.1", move |_: &Event| second.borrow_mut().push(2));

        hub.publish(Event::MemoryChange { address: 1, value: 7 });
        hub.publish(Event::MemoryChange { address: 2, value: 7 });

        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_wildcard_keeps_subscription_order() {
        let mut hub = EventHub::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let first = order.clone();
        hub.subscribe(ALL_EVENTS, move |_: &Event| first.borrow_mut().push(1));
        let second = order.clone();
        hub.subscribe("REG.AC", move |_: &Event| second.borrow_mut().push(2));
        let third = order.clone();
        hub.subscribe(ALL_EVENTS, move |_: &Event| third.borrow_mut().push(3));

        hub.publish(Event::RegisterChange { name: "AC", value: 1 });
        assert_eq!(*order.borrow(), vec![1, 2, 3]);

        hub.publish(Event::RunningChange { running: true });
        assert_eq!(*order.borrow(), vec![1, 2, 3, 1, 3]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut hub = EventHub::new();
        let (log, listener) = recorder();

        let sub = hub.subscribe("RUNNING", listener);
        hub.publish(Event::RunningChange { running: true });
        assert!(hub.unsubscribe(&sub));
        assert!(!hub.unsubscribe(&sub));
        hub.publish(Event::RunningChange { running: false });

        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_queue_defers_until_flush() {
        let mut hub = EventHub::new();
        let (log, listener) = recorder();
        hub.subscribe(ALL_EVENTS, listener);

        hub.start_queue();
        hub.publish(Event::MemoryChange { address: 0, value: 1 });
        hub.publish(Event::MemoryChange { address: 1, value: 2 });
        assert!(log.borrow().is_empty());

        hub.flush();
        assert_eq!(log.borrow().len(), 2);
        assert!(!hub.is_queueing());
    }
}
