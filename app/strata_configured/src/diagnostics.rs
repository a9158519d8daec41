/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Errors and warnings shown to the user.

use std::fmt;

use dupe::Dupe;
use parking_lot::Mutex;
use strata_core::target::label::TargetLabel;

#[derive(Debug, Clone, Copy, Dupe, PartialEq, Eq)]
pub enum EventKind {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub label: Option<TargetLabel>,
    pub message: String,
}

impl Event {
    pub fn error(label: Option<TargetLabel>, message: impl Into<String>) -> Event {
        Event {
            kind: EventKind::Error,
            label,
            message: message.into(),
        }
    }

    pub fn warning(label: Option<TargetLabel>, message: impl Into<String>) -> Event {
        Event {
            kind: EventKind::Warning,
            label,
            message: message.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            EventKind::Error => "ERROR",
            EventKind::Warning => "WARNING",
            EventKind::Info => "INFO",
        };
        match &self.label {
            Some(label) => write!(f, "{}: {}: {}", kind, label, self.message),
            None => write!(f, "{}: {}", kind, self.message),
        }
    }
}

/// Receives diagnostics.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: Event);
}

/// Events buffered during one evaluation. They reach the handler only if the evaluation
/// completes, so an evaluation that is restarted shows nothing.
#[derive(Debug, Default)]
pub struct StoredEvents {
    events: Vec<Event>,
}

impl StoredEvents {
    pub fn handle(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.kind == EventKind::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn replay_on(self, handler: &dyn EventHandler) {
        for event in self.events {
            handler.handle(event);
        }
    }
}

/// Keeps every event, for inspection after a build.
#[derive(Default)]
pub struct CollectingEventHandler {
    events: Mutex<Vec<Event>>,
}

impl CollectingEventHandler {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn errors(&self) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == EventKind::Error)
            .cloned()
            .collect()
    }
}

impl EventHandler for CollectingEventHandler {
    fn handle(&self, event: Event) {
        match event.kind {
            EventKind::Error => tracing::debug!("{}", event),
            EventKind::Warning | EventKind::Info => tracing::trace!("{}", event),
        }
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use strata_core::target::label::TargetLabel;

    use crate::diagnostics::CollectingEventHandler;
    use crate::diagnostics::Event;
    use crate::diagnostics::StoredEvents;

    #[test]
    fn test_replay() {
        let label = TargetLabel::testing_parse("//app:bin");
        let mut stored = StoredEvents::default();
        stored.handle(Event::warning(Some(label.clone()), "deprecated"));
        assert!(!stored.has_errors());
        stored.handle(Event::error(Some(label), "boom"));
        assert!(stored.has_errors());

        let handler = CollectingEventHandler::default();
        stored.replay_on(&handler);
        assert_eq!(2, handler.events().len());
        assert_eq!("ERROR: //app:bin: boom", handler.errors()[0].to_string());
    }
}
