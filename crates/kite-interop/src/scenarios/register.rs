//! Registration and connectivity scenarios

use kite_core::{KiteError, KiteResult, Uri};

use crate::context::RunContext;
use crate::scenarios::{agent, check, report_failure, try_op};

/// Registrar for new bindings: the outbound proxy override when one
/// was given, otherwise the relay, otherwise the bare domain.
pub(super) fn registrar_uri(ctx: &RunContext) -> KiteResult<Uri> {
    if let Some(proxy) = &ctx.config.outbound_proxy {
        return Ok(proxy.clone());
    }
    if let Some(relay) = &ctx.relay {
        return Ok(relay.uri().clone());
    }
    Uri::parse("kite:test.example.org")
}

/// Register all three endpoints.
pub fn register(ctx: &mut RunContext) -> i32 {
    let registrar = try_op!(ctx, registrar_uri(ctx));

    for endpoint in [&ctx.a, &ctx.b, &ctx.c] {
        let Some(agent) = &endpoint.agent else {
            report_failure(ctx, "endpoint has no agent", file!(), line!());
            return 1;
        };
        try_op!(ctx, agent.register(&registrar, None));
        check!(ctx, agent.is_registered());
    }

    if let Some(relay) = &ctx.relay {
        if ctx.config.outbound_proxy.is_none() {
            check!(ctx, relay.binding_count() == 3);
        }
    }
    0
}

/// Every endpoint can reach every other endpoint.
pub fn connectivity(ctx: &mut RunContext) -> i32 {
    let a = agent!(ctx, a);
    let b = agent!(ctx, b);
    let c = agent!(ctx, c);

    try_op!(ctx, a.ping('b'));
    try_op!(ctx, b.ping('c'));
    try_op!(ctx, c.ping('a'));

    check!(ctx, matches!(a.request('b', "OPTIONS"), Ok(200)));
    check!(ctx, matches!(b.request('a', "PING"), Ok(200)));
    0
}

/// A NAT rebind severs connectivity until registrations are refreshed.
pub fn nat_timeout(ctx: &mut RunContext) -> i32 {
    let Some(nat) = ctx.nat.clone() else {
        return 0;
    };
    check!(ctx, nat.is_symmetric() == ctx.config.nat_symmetric);
    let registrar = try_op!(ctx, registrar_uri(ctx));
    let rounds = if ctx.config.expensive { 3 } else { 1 };

    for _ in 0..rounds {
        nat.rebind();
        {
            let a = agent!(ctx, a);
            check!(ctx, matches!(a.ping('b'), Err(KiteError::Unreachable(_))));
        }

        for endpoint in [&ctx.a, &ctx.b, &ctx.c] {
            if let Some(agent) = &endpoint.agent {
                try_op!(ctx, agent.register(&registrar, None));
            }
        }

        let a = agent!(ctx, a);
        try_op!(ctx, a.ping('b'));
        let b = agent!(ctx, b);
        try_op!(ctx, b.ping('c'));
    }
    check!(ctx, nat.translation_count() > 0);
    0
}

/// Drop every live registration and verify the relay table drains.
pub fn unregister(ctx: &mut RunContext) -> i32 {
    for endpoint in [&ctx.a, &ctx.b, &ctx.c] {
        if let Some(agent) = &endpoint.agent {
            if agent.is_registered() {
                try_op!(ctx, agent.unregister());
                check!(ctx, !agent.is_registered());
            }
        }
    }

    if let Some(relay) = &ctx.relay {
        if ctx.config.outbound_proxy.is_none() {
            check!(ctx, relay.binding_count() == 0);
        }
    }
    0
}
