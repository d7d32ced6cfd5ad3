use super::{Message, MessageKind};
use crate::error::ProtocolError;
use std::collections::BTreeMap;

pub type Handler<C> = fn(&mut C, &Message) -> Result<(), ProtocolError>;

/// Per-kind handler lookup built once at startup.
///
/// Handlers are chosen by exact message kind. Kinds without a registered
/// handler fall through to the table's fallback.
pub struct DispatchTable<C> {
    handlers: BTreeMap<MessageKind, Handler<C>>,
    fallback: Handler<C>,
}

impl<C> DispatchTable<C> {
    pub fn new(fallback: Handler<C>) -> Self {
        Self {
            handlers: BTreeMap::new(),
            fallback,
        }
    }

    pub fn on(mut self, kind: MessageKind, handler: Handler<C>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn handles(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn dispatch(&self, context: &mut C, msg: &Message) -> Result<(), ProtocolError> {
        let handler = self.handlers.get(&msg.kind()).copied().unwrap_or(self.fallback);
        handler(context, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ChatFromServerMsg, TickMsg};

    #[derive(Default)]
    struct Recorder {
        ticks: Vec<u16>,
        other: usize,
    }

    fn on_tick(recorder: &mut Recorder, msg: &Message) -> Result<(), ProtocolError> {
        if let Message::Tick(tick) = msg {
            recorder.ticks.push(tick.tick_id);
        }
        Ok(())
    }

    fn fallback(recorder: &mut Recorder, _msg: &Message) -> Result<(), ProtocolError> {
        recorder.other += 1;
        Ok(())
    }

    #[test]
    fn test_dispatch_by_exact_kind() {
        let table = DispatchTable::new(fallback).on(MessageKind::Tick, on_tick);
        let mut recorder = Recorder::default();

        table.dispatch(&mut recorder, &TickMsg { tick_id: 5 }.into()).unwrap();
        table
            .dispatch(
                &mut recorder,
                &ChatFromServerMsg {
                    text: "hi".into(),
                    error: false,
                }
                .into(),
            )
            .unwrap();

        assert_eq!(recorder.ticks, vec![5]);
        assert_eq!(recorder.other, 1);
        assert!(table.handles(MessageKind::Tick));
        assert!(!table.handles(MessageKind::Chat));
    }
}
