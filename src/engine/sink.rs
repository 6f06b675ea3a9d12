use crate::engine::events::GradingEvent;

pub trait EventSink: Send {
    fn emit(&mut self, event: GradingEvent);
}
