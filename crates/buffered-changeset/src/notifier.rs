use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    BeforeValidation,
    AfterValidation,
    AfterRollback,
    Execute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BeforeValidation { key: String },
    AfterValidation { key: String },
    AfterRollback,
    Execute,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::BeforeValidation { .. } => EventKind::BeforeValidation,
            Event::AfterValidation { .. } => EventKind::AfterValidation,
            Event::AfterRollback => EventKind::AfterRollback,
            Event::Execute => EventKind::Execute,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Event::BeforeValidation { key } | Event::AfterValidation { key } => Some(key),
            Event::AfterRollback | Event::Execute => None,
        }
    }
}

type Listener = Box<dyn FnMut(&Event)>;

/// Per-kind listener lists. Listeners run in registration order.
pub struct Notifier {
    next_listener_id: u64,
    listeners: BTreeMap<EventKind, BTreeMap<u64, Listener>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self {
            next_listener_id: 1,
            listeners: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<EventKind, usize> = self
            .listeners
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("Notifier").field("listeners", &counts).finish()
    }
}

impl Notifier {
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> u64
    where
        F: FnMut(&Event) + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        self.listeners
            .entry(kind)
            .or_default()
            .insert(id, Box::new(listener));
        id
    }

    pub fn off(&mut self, kind: EventKind, listener_id: u64) -> bool {
        self.listeners
            .get_mut(&kind)
            .map_or(false, |list| list.remove(&listener_id).is_some())
    }

    pub fn trigger(&mut self, event: &Event) {
        if let Some(list) = self.listeners.get_mut(&event.kind()) {
            for listener in list.values_mut() {
                listener(event);
            }
        }
    }
}
