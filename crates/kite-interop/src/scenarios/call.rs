//! Call scenarios
//!
//! Each scenario drives a complete signalling exchange between the
//! endpoints and asserts the observable outcome on both sides. Calls
//! are always terminated before the scenario returns so endpoints are
//! quiescent for the next checkpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kite_agent::InviteOptions;
use kite_core::{AgentEvent, CallState, KiteError};
use kite_net::{Credentials, Relay};

use crate::context::RunContext;
use crate::scenarios::{agent, check, try_op};

/// Unknown request methods are answered with 501, known ones with 200.
pub fn extension(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    check!(ctx, matches!(a.request('b', "X-STRETCH"), Ok(501)));
    check!(ctx, matches!(a.request('b', "INFO"), Ok(200)));
    0
}

/// Invite, answer, terminate.
pub fn basic_call(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let call = try_op!(ctx, a.invite('b', InviteOptions::default()));
    check!(ctx, a.call_state(call) == Some(CallState::Calling));
    check!(ctx, b.incoming_calls() == vec![call]);

    try_op!(ctx, b.answer(call, &[]));
    check!(ctx, a.call_state(call) == Some(CallState::Ready));
    check!(ctx, a.negotiated_media(call) == ["audio"]);
    check!(ctx, b.incoming_calls().is_empty());

    try_op!(ctx, a.bye(call));
    check!(ctx, a.call_state(call) == Some(CallState::Terminated));
    check!(ctx, matches!(a.bye(call), Err(KiteError::InvalidCallState(_))));
    0
}

/// The callee declines with 603.
pub fn reject_callee(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let call = try_op!(ctx, a.invite('b', InviteOptions::default()));
    try_op!(ctx, b.reject(call, 603));
    check!(ctx, a.call_state(call) == Some(CallState::Terminated));
    check!(ctx, b.incoming_calls().is_empty());
    0
}

/// The callee reports busy with 486.
pub fn reject_busy(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let call = try_op!(ctx, a.invite('b', InviteOptions::default()));
    try_op!(ctx, b.reject(call, 486));
    check!(ctx, a.call_state(call) == Some(CallState::Terminated));
    0
}

/// The callee redirects to the third endpoint, and the caller follows.
pub fn redirect(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);
    let c = agent!(ctx, c);

    let call = try_op!(ctx, a.invite('b', InviteOptions::default()));
    let target = c.location().clone();
    try_op!(ctx, b.redirect(call, target));
    check!(ctx, a.call_state(call) == Some(CallState::Terminated));
    check!(ctx, b.incoming_calls().is_empty());

    let call = try_op!(ctx, a.invite('c', InviteOptions::default()));
    try_op!(ctx, c.answer(call, &[]));
    check!(ctx, a.call_state(call) == Some(CallState::Ready));
    try_op!(ctx, a.bye(call));
    0
}

/// A challenging relay rejects unauthenticated binds with 401 and
/// accepts a credentialed retry.
pub fn auth_challenge(ctx: &mut RunContext) -> i32 {
    let Some(relay) = ctx.relay.clone() else {
        return 0;
    };
    relay.set_auth_realm(Some("kite-test".to_string()));
    let rc = auth_challenge_checks(ctx, &relay);
    relay.set_auth_realm(None);
    rc
}

fn auth_challenge_checks(ctx: &mut RunContext, relay: &Relay) -> i32 {
    let registrar = relay.uri().clone();
    let c = agent!(ctx, c);

    check!(
        ctx,
        matches!(
            c.register(&registrar, None),
            Err(KiteError::RegistrationRejected { code: 401 })
        )
    );

    let credentials = Credentials {
        realm: "kite-test".to_string(),
        user: "c".to_string(),
        secret: "kite-secret".to_string(),
    };
    try_op!(ctx, c.register(&registrar, Some(&credentials)));
    check!(ctx, c.is_registered());
    0
}

/// Media offers are answered with the supported intersection; an empty
/// intersection rejects the call with 488.
pub fn media_negotiation(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let call = try_op!(
        ctx,
        a.invite(
            'b',
            InviteOptions {
                media: vec!["audio".to_string(), "video".to_string()],
                ..InviteOptions::default()
            },
        )
    );
    try_op!(ctx, b.answer(call, &["audio"]));
    check!(ctx, a.negotiated_media(call) == ["audio"]);
    try_op!(ctx, a.bye(call));

    let call = try_op!(
        ctx,
        a.invite(
            'b',
            InviteOptions {
                media: vec!["text".to_string()],
                ..InviteOptions::default()
            },
        )
    );
    check!(
        ctx,
        matches!(
            b.answer(call, &["audio"]),
            Err(KiteError::CallRejected { code: 488 })
        )
    );
    check!(ctx, a.call_state(call) == Some(CallState::Terminated));
    0
}

/// Wrong-realm credentials stay challenged; a bad secret is forbidden.
pub fn auth_failure(ctx: &mut RunContext) -> i32 {
    let Some(relay) = ctx.relay.clone() else {
        return 0;
    };
    relay.set_auth_realm(Some("kite-aka".to_string()));
    let rc = auth_failure_checks(ctx, &relay);
    relay.set_auth_realm(None);
    rc
}

fn auth_failure_checks(ctx: &mut RunContext, relay: &Relay) -> i32 {
    let registrar = relay.uri().clone();
    let c = agent!(ctx, c);

    let wrong_realm = Credentials {
        realm: "elsewhere".to_string(),
        user: "c".to_string(),
        secret: "kite-secret".to_string(),
    };
    check!(
        ctx,
        matches!(
            c.register(&registrar, Some(&wrong_realm)),
            Err(KiteError::RegistrationRejected { code: 401 })
        )
    );

    let bad_secret = Credentials {
        realm: "kite-aka".to_string(),
        user: "c".to_string(),
        secret: String::new(),
    };
    check!(
        ctx,
        matches!(
            c.register(&registrar, Some(&bad_secret)),
            Err(KiteError::RegistrationRejected { code: 403 })
        )
    );
    0
}

/// The caller cancels before the call is answered; both sides see 487.
pub fn call_cancel(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let call = try_op!(ctx, a.invite('b', InviteOptions::default()));
    try_op!(ctx, a.cancel(call));
    check!(ctx, a.call_state(call) == Some(CallState::Terminated));
    check!(ctx, b.incoming_calls().is_empty());
    check!(ctx, matches!(a.cancel(call), Err(KiteError::InvalidCallState(_))));
    0
}

/// Destroying a call drops it without signalling the peer.
pub fn call_destroy(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let call = try_op!(ctx, a.invite('b', InviteOptions::default()));
    try_op!(ctx, a.destroy(call));
    check!(ctx, a.call_state(call).is_none());
    check!(ctx, b.incoming_calls().is_empty());
    0
}

/// The caller hangs up while the call is still in a provisional state.
pub fn early_bye(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let call = try_op!(ctx, a.invite('b', InviteOptions::default()));
    try_op!(ctx, b.progress(call));
    check!(ctx, a.call_state(call) == Some(CallState::Proceeding));

    try_op!(ctx, a.bye(call));
    check!(ctx, a.call_state(call) == Some(CallState::Terminated));
    check!(ctx, b.incoming_calls().is_empty());
    0
}

/// Media is renegotiated mid-call.
pub fn reinvite(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let call = try_op!(ctx, a.invite('b', InviteOptions::default()));
    try_op!(ctx, b.answer(call, &[]));
    check!(ctx, a.negotiated_media(call) == ["audio"]);

    try_op!(ctx, a.reinvite(call, &["audio", "video"]));
    check!(ctx, a.negotiated_media(call) == ["audio", "video"]);
    check!(ctx, a.call_state(call) == Some(CallState::Ready));

    try_op!(ctx, a.bye(call));
    0
}

/// Session timers refresh an established call.
pub fn session_timer(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let call = try_op!(
        ctx,
        a.invite(
            'b',
            InviteOptions {
                session_interval: Some(90),
                ..InviteOptions::default()
            },
        )
    );
    try_op!(ctx, b.answer(call, &[]));

    let refreshes = if ctx.config.expensive { 4 } else { 2 };
    for expected in 1..=refreshes {
        check!(ctx, matches!(a.refresh_session(call), Ok(n) if n == expected));
    }

    try_op!(ctx, a.bye(call));
    check!(
        ctx,
        matches!(a.refresh_session(call), Err(KiteError::InvalidCallState(_)))
    );
    0
}

/// A mid-call refer reaches the peer's event sink.
pub fn refer(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);
    let c = agent!(ctx, c);

    let call = try_op!(ctx, a.invite('b', InviteOptions::default()));
    try_op!(ctx, b.answer(call, &[]));

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    b.set_event_sink(Some(Arc::new(move |event, _| {
        if matches!(event, AgentEvent::ReferReceived { .. }) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    })));

    let target = c.location().clone();
    let referred = a.refer(call, target).is_ok();
    ctx.b.apply_sink();

    check!(ctx, referred);
    check!(ctx, seen.load(Ordering::Relaxed) == 1);

    try_op!(ctx, a.bye(call));
    0
}

/// A reliable provisional moves the caller to the early state before
/// the final answer.
pub fn reliable_provisional(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);

    let call = try_op!(
        ctx,
        a.invite(
            'b',
            InviteOptions {
                reliable_provisional: true,
                ..InviteOptions::default()
            },
        )
    );
    try_op!(ctx, b.progress(call));
    check!(ctx, a.call_state(call) == Some(CallState::Early));

    try_op!(ctx, b.answer(call, &[]));
    check!(ctx, a.call_state(call) == Some(CallState::Ready));

    try_op!(ctx, a.bye(call));
    check!(ctx, a.call_state(call) == Some(CallState::Terminated));
    0
}
