//! Setup, parameter and teardown scenarios
//!
//! These run before the engine-dependent battery: API misuse checks
//! against throwaway engines, parameter plumbing checks, and the
//! engine-init checkpoint that populates the run context. `deinit` is
//! the terminal checkpoint and runs no matter what the aggregate is.

use std::sync::Arc;

use kite_agent::{Engine, EngineConfig, InviteOptions};
use kite_core::{AgentEvent, CallState, KiteError, Uri};
use kite_net::{NatConfig, NatEmulator, Relay, RelayConfig};

use crate::context::{LifecycleEvent, RunContext};
use crate::scenarios::{agent, check, report_failure, try_op};

/// Deliberate API misuse must fail cleanly, not crash.
pub fn api_errors(ctx: &mut RunContext) -> i32 {
    check!(ctx, Uri::parse("").is_err());
    check!(ctx, Uri::parse("no-scheme-here").is_err());
    check!(ctx, Uri::parse("kite:").is_err());

    check!(
        ctx,
        Engine::start(EngineConfig {
            domain: String::new(),
            ..EngineConfig::default()
        })
        .is_err()
    );
    check!(
        ctx,
        matches!(
            Relay::start(RelayConfig {
                domain: String::new(),
                ..RelayConfig::default()
            }),
            Err(KiteError::RelayStartFailed(_))
        )
    );

    // Operations against a stopped engine fail with EngineStopped.
    let mut engine = try_op!(
        ctx,
        Engine::start(EngineConfig {
            threading: false,
            subsystems: ctx.subsystems.clone(),
            ..EngineConfig::default()
        })
    );
    let orphan = try_op!(ctx, engine.create_agent('x'));
    engine.stop();
    check!(ctx, matches!(orphan.ping('x'), Err(KiteError::EngineStopped)));
    check!(
        ctx,
        matches!(engine.create_agent('y'), Err(KiteError::EngineStopped))
    );
    0
}

/// Event labels and call-state formatting stay distinct and stable;
/// the event printers rely on both.
pub fn param_filter(ctx: &mut RunContext) -> i32 {
    let target = match Uri::parse("kite:x.local") {
        Ok(uri) => uri,
        Err(err) => {
            report_failure(ctx, &format!("uri parse: {}", err), file!(), line!());
            return 1;
        }
    };

    let samples = [
        AgentEvent::RegisterOk {
            registrar: target.clone(),
        },
        AgentEvent::RegisterFailed { code: 401 },
        AgentEvent::Unregistered,
        AgentEvent::IncomingCall {
            from: target.clone(),
        },
        AgentEvent::CallStateChanged {
            state: CallState::Ready,
        },
        AgentEvent::CallTerminated { code: 200 },
        AgentEvent::Redirected {
            target: target.clone(),
        },
        AgentEvent::AuthChallenge {
            realm: "test".to_string(),
        },
        AgentEvent::ReferReceived { target },
        AgentEvent::MessageReceived {
            body: "hello".to_string(),
        },
        AgentEvent::NotifyReceived {
            package: "presence".to_string(),
        },
        AgentEvent::Shutdown,
    ];
    for (i, left) in samples.iter().enumerate() {
        for right in &samples[i + 1..] {
            check!(ctx, left.label() != right.label());
        }
    }

    check!(ctx, CallState::Ready.to_string() == "ready");
    check!(ctx, CallState::Terminated.to_string() == "terminated");
    0
}

/// Engine and agent parameters round-trip through a throwaway engine.
pub fn params(ctx: &mut RunContext) -> i32 {
    check!(ctx, InviteOptions::default().media == ["audio"]);

    let mut engine = try_op!(
        ctx,
        Engine::start(EngineConfig {
            threading: ctx.config.threading,
            subsystems: ctx.subsystems.clone(),
            ..EngineConfig::default()
        })
    );
    check!(ctx, engine.is_running());
    check!(ctx, engine.is_threaded() == ctx.config.threading);
    check!(ctx, engine.stats().operations == 0);

    let agent = try_op!(ctx, engine.create_agent('x'));
    check!(ctx, agent.tag() == 'x');
    check!(ctx, agent.aor() == "x@test.example.org");
    check!(ctx, agent.location().to_string() == "kite:x.local");
    check!(ctx, !agent.is_registered());

    try_op!(ctx, engine.destroy_agent('x'));
    check!(
        ctx,
        matches!(engine.destroy_agent('x'), Err(KiteError::AgentNotFound('x')))
    );

    engine.stop();
    engine.stop();
    check!(ctx, !engine.is_running());
    0
}

/// Bring up the engine, its collaborators, and the three endpoints.
///
/// Not fatal under stop-on-first-failure: when init fails the gated
/// battery is skipped and only deinit runs.
pub fn engine_init(ctx: &mut RunContext) -> i32 {
    let engine = match Engine::start(EngineConfig {
        threading: ctx.config.threading,
        subsystems: ctx.subsystems.clone(),
        ..EngineConfig::default()
    }) {
        Ok(engine) => engine,
        Err(err) => {
            report_failure(ctx, &format!("engine start: {}", err), file!(), line!());
            return 1;
        }
    };

    if ctx.config.relay_enabled {
        match Relay::start(RelayConfig::default()) {
            Ok(relay) => {
                let relay = Arc::new(relay);
                engine.attach_relay(Arc::clone(&relay));
                ctx.relay = Some(relay);
                ctx.relay_started = true;
                ctx.record(LifecycleEvent::RelayStarted);
            }
            Err(err) => {
                report_failure(ctx, &format!("relay start: {}", err), file!(), line!());
                return 1;
            }
        }
    }

    if ctx.config.nat_enabled {
        let nat = Arc::new(NatEmulator::new(NatConfig {
            symmetric: ctx.config.nat_symmetric,
            logging: ctx.config.nat_logging,
            ..NatConfig::default()
        }));
        engine.attach_nat(Arc::clone(&nat));
        ctx.nat = Some(nat);
        ctx.record(LifecycleEvent::NatStarted);
    }

    let agents = ['a', 'b', 'c'].map(|tag| engine.create_agent(tag));
    for result in &agents {
        if let Err(err) = result {
            report_failure(ctx, &format!("agent create: {}", err), file!(), line!());
            return 1;
        }
    }
    let [a, b, c] = agents;
    ctx.a.agent = a.ok();
    ctx.b.agent = b.ok();
    ctx.c.agent = c.ok();
    ctx.a.apply_sink();
    ctx.b.apply_sink();
    ctx.c.apply_sink();

    ctx.engine = Some(engine);
    ctx.record(LifecycleEvent::EngineStarted);
    0
}

/// Misuse against the live engine fails without disturbing it.
pub fn stack_errors(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    check!(ctx, matches!(a.answer(9999, &[]), Err(KiteError::CallNotFound)));
    check!(ctx, matches!(a.bye(9999), Err(KiteError::CallNotFound)));
    check!(ctx, matches!(a.cancel(9999), Err(KiteError::CallNotFound)));
    check!(ctx, matches!(a.ping('z'), Err(KiteError::AgentNotFound('z'))));
    check!(ctx, matches!(a.unregister(), Err(KiteError::NotRegistered)));

    if let Some(engine) = ctx.engine.as_ref() {
        check!(
            ctx,
            matches!(engine.create_agent('a'), Err(KiteError::AgentExists('a')))
        );
        check!(ctx, engine.is_running());
        check!(ctx, engine.relay().is_some() == ctx.relay.is_some());
        check!(ctx, engine.nat().is_some() == ctx.nat.is_some());
    }
    0
}

/// Terminal checkpoint: release agents and stop the engine. Runs even
/// when the battery failed; collaborator shutdown and the journal
/// bookkeeping for it happen in the context teardown that follows.
pub fn deinit(ctx: &mut RunContext) -> i32 {
    for endpoint in ctx.endpoints_mut() {
        if let Some(agent) = &endpoint.agent {
            agent.set_event_sink(None);
        }
        endpoint.agent = None;
    }
    if let Some(mut engine) = ctx.engine.take() {
        engine.stop();
        ctx.record(LifecycleEvent::EngineStopped);
    }
    0
}
