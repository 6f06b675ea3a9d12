use crate::engine::events::GradingEvent;
use crate::engine::sink::EventSink;

/// An in-memory event sink used to collect grading events
/// during a single run.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Vec<GradingEvent>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Event kinds in emission order.
    #[cfg(test)]
    pub fn kinds(&self) -> Vec<crate::engine::events::GradingEventKind> {
        self.events.iter().map(|e| e.kind.clone()).collect()
    }

    /// Consume the sink and return the collected events.
    pub fn into_events(self) -> Vec<GradingEvent> {
        self.events
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&mut self, event: GradingEvent) {
        self.events.push(event);
    }
}
