//! Scenario battery
//!
//! The fixed, ordered catalogue of interop scenarios. Bodies are thin
//! drivers over the engine facade; each returns zero when every check
//! inside passed and nonzero otherwise. `battery()` assembles the
//! checkpoints with their gates in the canonical order.

use crate::context::RunContext;
use crate::sequencer::{Checkpoint, Gate, Step};
use crate::PROGRAM;

mod call;
mod events;
mod register;
mod setup;

/// Report a failed check; panics instead when `-a|--abort` was given.
/// With `KITE_INTEROP_TRACE` set, the failure is also appended to the
/// named file.
pub(crate) fn report_failure(ctx: &RunContext, what: &str, file: &str, line: u32) {
    let message = format!("{}: check failed: {} ({}:{})", PROGRAM, what, file, line);
    eprintln!("{}", message);
    if let Some(path) = std::env::var_os("KITE_INTEROP_TRACE") {
        crate::trace::append_line(std::path::Path::new(&path), &message);
    }
    if ctx.config.abort_on_check {
        panic!("{}: aborting on failed check: {}", PROGRAM, what);
    }
}

/// Fail the scenario unless the condition holds.
macro_rules! check {
    ($ctx:expr, $cond:expr) => {
        if !$cond {
            $crate::scenarios::report_failure($ctx, stringify!($cond), file!(), line!());
            return 1;
        }
    };
}

/// Unwrap an operation result or fail the scenario.
macro_rules! try_op {
    ($ctx:expr, $expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => {
                $crate::scenarios::report_failure(
                    $ctx,
                    &format!("{}: {}", stringify!($expr), err),
                    file!(),
                    line!(),
                );
                return 1;
            }
        }
    };
}

/// Borrow an endpoint's live agent or fail the scenario.
macro_rules! agent {
    ($ctx:expr, $ep:ident) => {
        match $ctx.$ep.agent.as_ref() {
            Some(agent) => agent,
            None => {
                $crate::scenarios::report_failure(
                    $ctx,
                    concat!("endpoint ", stringify!($ep), " has no agent"),
                    file!(),
                    line!(),
                );
                return 1;
            }
        }
    };
}

pub(crate) use agent;
pub(crate) use check;
pub(crate) use try_op;

/// The canonical battery: steps in fixed total order plus the terminal
/// deinit checkpoint, which runs regardless of the aggregate.
pub fn battery() -> (Vec<Step>, Checkpoint) {
    let steps = vec![
        Step::Run(Checkpoint::new("api errors", Gate::Always, true, setup::api_errors)),
        Step::Run(Checkpoint::new(
            "parameter filtering",
            Gate::Always,
            true,
            setup::param_filter,
        )),
        Step::Run(Checkpoint::new(
            "parameter handling",
            Gate::Always,
            true,
            setup::params,
        )),
        Step::Run(Checkpoint::new(
            "engine init",
            Gate::Always,
            false,
            setup::engine_init,
        )),
        Step::GatedOnPassing(vec![
            Step::RewireSinks,
            Step::Run(Checkpoint::new(
                "stack errors",
                Gate::Always,
                true,
                setup::stack_errors,
            )),
            Step::Run(Checkpoint::new(
                "register",
                Gate::Always,
                false,
                register::register,
            )),
            Step::Run(Checkpoint::new(
                "connectivity",
                Gate::Passing,
                false,
                register::connectivity,
            )),
            Step::Run(Checkpoint::new(
                "nat timeout",
                Gate::PassingAndNat,
                false,
                register::nat_timeout,
            )),
            Step::GatedOnPassing(vec![
                Step::Run(Checkpoint::new(
                    "extension method",
                    Gate::Always,
                    true,
                    call::extension,
                )),
                Step::Run(Checkpoint::new("basic call", Gate::Always, true, call::basic_call)),
                Step::Run(Checkpoint::new(
                    "reject by callee",
                    Gate::Always,
                    true,
                    call::reject_callee,
                )),
                Step::Run(Checkpoint::new(
                    "reject busy",
                    Gate::Always,
                    true,
                    call::reject_busy,
                )),
                Step::Run(Checkpoint::new("redirect", Gate::Always, true, call::redirect)),
                Step::Run(Checkpoint::new(
                    "auth challenge",
                    Gate::Always,
                    true,
                    call::auth_challenge,
                )),
                Step::Run(Checkpoint::new(
                    "media negotiation",
                    Gate::Always,
                    true,
                    call::media_negotiation,
                )),
                Step::Run(Checkpoint::new(
                    "auth failure",
                    Gate::Always,
                    true,
                    call::auth_failure,
                )),
                Step::Run(Checkpoint::new(
                    "call cancel",
                    Gate::Always,
                    true,
                    call::call_cancel,
                )),
                Step::Run(Checkpoint::new(
                    "call destroy",
                    Gate::Always,
                    true,
                    call::call_destroy,
                )),
                Step::Run(Checkpoint::new("early bye", Gate::Always, true, call::early_bye)),
                Step::Run(Checkpoint::new("re-invite", Gate::Always, true, call::reinvite)),
                Step::Run(Checkpoint::new(
                    "session timer",
                    Gate::Always,
                    true,
                    call::session_timer,
                )),
                Step::Run(Checkpoint::new("refer", Gate::Always, true, call::refer)),
                Step::Run(Checkpoint::new(
                    "reliable provisionals",
                    Gate::Always,
                    true,
                    call::reliable_provisional,
                )),
                Step::Run(Checkpoint::new(
                    "simple messaging",
                    Gate::Always,
                    true,
                    events::simple_message,
                )),
                Step::Run(Checkpoint::new(
                    "event subscription",
                    Gate::Always,
                    true,
                    events::event_subscription,
                )),
            ]),
            Step::Run(Checkpoint::new(
                "unregister",
                Gate::Unregister,
                true,
                register::unregister,
            )),
        ]),
    ];

    let terminal = Checkpoint::new("deinit", Gate::Always, false, setup::deinit);
    (steps, terminal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint_names(steps: &[Step], names: &mut Vec<&'static str>) {
        for step in steps {
            match step {
                Step::Run(checkpoint) => names.push(checkpoint.name),
                Step::GatedOnPassing(inner) => checkpoint_names(inner, names),
                Step::RewireSinks => {}
            }
        }
    }

    #[test]
    fn battery_order_is_fixed() {
        let (steps, terminal) = battery();
        let mut names = Vec::new();
        checkpoint_names(&steps, &mut names);

        assert_eq!(names.first(), Some(&"api errors"));
        assert_eq!(names.last(), Some(&"unregister"));
        assert_eq!(terminal.name, "deinit");

        let register_at = names.iter().position(|n| *n == "register").unwrap();
        let connectivity_at = names.iter().position(|n| *n == "connectivity").unwrap();
        let init_at = names.iter().position(|n| *n == "engine init").unwrap();
        assert!(init_at < register_at && register_at < connectivity_at);
    }
}
