//! Messaging and event-subscription scenarios

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use kite_core::AgentEvent;

use crate::context::RunContext;
use crate::scenarios::{agent, check};

/// An instant message reaches the peer's sink with its body intact.
pub fn simple_message(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let received = Arc::new(Mutex::new(Vec::new()));
    let inbox = Arc::clone(&received);
    b.set_event_sink(Some(Arc::new(move |event, _| {
        if let AgentEvent::MessageReceived { body } = event {
            inbox.lock().push(body.clone());
        }
    })));

    let sent = a.message('b', "hello there");
    ctx.b.apply_sink();

    check!(ctx, sent.is_ok());
    check!(ctx, received.lock().as_slice() == ["hello there"]);
    check!(ctx, a.message('z', "nobody home").is_err());
    0
}

/// A subscriber is notified of package updates; unrelated packages and
/// non-subscribers stay silent.
pub fn event_subscription(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    a.set_event_sink(Some(Arc::new(move |event, _| {
        if matches!(event, AgentEvent::NotifyReceived { .. }) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    })));

    let subscribed = a.subscribe('b', "presence");
    let notified = b.notify_subscribers("presence");
    let unrelated = b.notify_subscribers("message-summary");
    ctx.a.apply_sink();

    check!(ctx, subscribed.is_ok());
    check!(ctx, matches!(notified, Ok(1)));
    check!(ctx, matches!(unrelated, Ok(0)));
    check!(ctx, seen.load(Ordering::Relaxed) == 1);
    0
}

#[cfg(test)]
mod tests {
    use kite_core::Subsystems;

    use super::*;
    use crate::config::RunConfig;
    use crate::context::RunContext;
    use crate::scenarios::setup;

    fn ready_ctx() -> RunContext {
        let config = RunConfig {
            print_headings: false,
            ..RunConfig::default()
        };
        let mut ctx = RunContext::new(config, Subsystems::new());
        assert_eq!(setup::engine_init(&mut ctx), 0);
        ctx
    }

    #[test]
    fn failed_subscription_restores_the_context_sink() {
        let mut ctx = ready_ctx();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        ctx.a.sink = Some(Arc::new(move |event, _| {
            if matches!(event, AgentEvent::MessageReceived { .. }) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }));
        ctx.a.apply_sink();

        // With b gone the subscription fails; the scenario must still
        // leave A wired to the context's own sink.
        if let Some(engine) = ctx.engine.as_ref() {
            engine.destroy_agent('b').unwrap();
        }
        assert_eq!(event_subscription(&mut ctx), 1);

        let c = ctx.c.agent.as_ref().unwrap();
        c.message('a', "still wired").unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn message_scenario_restores_the_context_sink() {
        let mut ctx = ready_ctx();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        ctx.b.sink = Some(Arc::new(move |event, _| {
            if matches!(event, AgentEvent::MessageReceived { .. }) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }));
        ctx.b.apply_sink();

        assert_eq!(simple_message(&mut ctx), 0);
        assert_eq!(seen.load(Ordering::Relaxed), 0, "scenario traffic goes to its own inbox");

        ctx.a.agent.as_ref().unwrap().message('b', "after").unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }
}
