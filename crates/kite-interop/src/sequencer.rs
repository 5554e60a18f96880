//! Sequencer
//!
//! Interprets the scenario battery as data: an ordered tree of steps,
//! each either a checkpoint, a sink-rewiring action, or a region gated
//! on the aggregate still being zero. Gate regions snapshot their
//! condition at entry, so a failure inside a region (with the stop
//! policy disabled) does not eject the remaining checkpoints of that
//! region. The terminal deinit checkpoint runs regardless of the
//! aggregate and the stop policy, followed by teardown.

use std::io::Write;

use crate::context::{event_printer, RunContext};
use crate::PROGRAM;

/// A scenario body: zero means every assertion inside passed.
pub type ScenarioFn = Box<dyn Fn(&mut RunContext) -> i32>;

/// Eligibility rule for one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Runs regardless of prior results.
    Always,
    /// Runs only while the aggregate is still zero.
    Passing,
    /// Runs while passing and only when NAT emulation is enabled.
    PassingAndNat,
    /// Unregistration: proxy scenarios enabled AND (still passing OR
    /// no relay was ever started). Preserved literally.
    Unregister,
}

/// One scenario's slot in the battery.
pub struct Checkpoint {
    pub name: &'static str,
    pub gate: Gate,
    /// Whether the stop-on-first-failure check applies after this
    /// checkpoint.
    pub fatal: bool,
    run: ScenarioFn,
}

impl Checkpoint {
    pub fn new(
        name: &'static str,
        gate: Gate,
        fatal: bool,
        run: impl Fn(&mut RunContext) -> i32 + 'static,
    ) -> Self {
        Self {
            name,
            gate,
            fatal,
            run: Box::new(run),
        }
    }

    fn eligible(&self, ctx: &RunContext) -> bool {
        match self.gate {
            Gate::Always => true,
            Gate::Passing => ctx.aggregate == 0,
            Gate::PassingAndNat => ctx.aggregate == 0 && ctx.config.nat_enabled,
            Gate::Unregister => {
                ctx.config.proxy_tests && (ctx.aggregate == 0 || !ctx.relay_started)
            }
        }
    }
}

/// One node of the battery.
pub enum Step {
    Run(Checkpoint),
    /// Rewire endpoint event sinks from the per-actor event flags.
    RewireSinks,
    /// A sub-sequence entered only while the aggregate is zero.
    GatedOnPassing(Vec<Step>),
}

/// Drives the battery in its fixed total order.
pub struct Sequencer {
    steps: Vec<Step>,
    terminal: Checkpoint,
}

enum Flow {
    Continue,
    Stop,
}

impl Sequencer {
    pub fn new(steps: Vec<Step>, terminal: Checkpoint) -> Self {
        Self { steps, terminal }
    }

    /// Execute the battery against a run context; returns the final
    /// aggregate, after the terminal checkpoint and teardown.
    pub fn run(&self, ctx: &mut RunContext) -> i32 {
        // Initialization events go to actor A's sink until the
        // post-init rewiring step.
        ctx.a.sink = ctx.config.events_init.then(event_printer);
        ctx.a.apply_sink();

        let _ = Self::run_steps(&self.steps, ctx);

        Self::run_checkpoint(&self.terminal, ctx);
        ctx.teardown();
        ctx.aggregate
    }

    fn run_steps(steps: &[Step], ctx: &mut RunContext) -> Flow {
        for step in steps {
            match step {
                Step::RewireSinks => rewire_sinks(ctx),
                Step::GatedOnPassing(inner) => {
                    if ctx.aggregate == 0 {
                        if let Flow::Stop = Self::run_steps(inner, ctx) {
                            return Flow::Stop;
                        }
                    }
                }
                Step::Run(checkpoint) => {
                    if !checkpoint.eligible(ctx) {
                        continue;
                    }
                    Self::run_checkpoint(checkpoint, ctx);
                    if checkpoint.fatal
                        && ctx.config.stop_on_first_failure
                        && ctx.aggregate != 0
                    {
                        return Flow::Stop;
                    }
                }
            }
        }
        Flow::Continue
    }

    fn run_checkpoint(checkpoint: &Checkpoint, ctx: &mut RunContext) {
        if ctx.config.print_headings {
            println!("{}: testing {}", PROGRAM, checkpoint.name);
        }
        let result = (checkpoint.run)(ctx);
        ctx.aggregate |= result;
        if result != 0 {
            eprintln!("{}: {} FAILED ({})", PROGRAM, checkpoint.name, result);
        }
        let _ = std::io::stdout().flush();
    }
}

/// Rewire every endpoint's sink from the per-actor event flags, then
/// push the sinks down to any live agents.
fn rewire_sinks(ctx: &mut RunContext) {
    let flags = [
        ctx.config.events_a,
        ctx.config.events_b,
        ctx.config.events_c,
    ];
    for (endpoint, enabled) in ctx.endpoints_mut().into_iter().zip(flags) {
        endpoint.sink = enabled.then(event_printer);
        endpoint.apply_sink();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use kite_core::Subsystems;

    use super::*;
    use crate::config::RunConfig;

    fn quiet_config() -> RunConfig {
        RunConfig {
            print_headings: false,
            ..RunConfig::default()
        }
    }

    fn ctx_with(config: RunConfig) -> RunContext {
        RunContext::new(config, Subsystems::new())
    }

    /// Checkpoint that records its name and returns a fixed code.
    fn probe(
        name: &'static str,
        gate: Gate,
        fatal: bool,
        code: i32,
        log: &Rc<RefCell<Vec<&'static str>>>,
    ) -> Checkpoint {
        let log = Rc::clone(log);
        Checkpoint::new(name, gate, fatal, move |_| {
            log.borrow_mut().push(name);
            code
        })
    }

    fn terminal(log: &Rc<RefCell<Vec<&'static str>>>) -> Checkpoint {
        probe("deinit", Gate::Always, false, 0, log)
    }

    #[test]
    fn all_passing_battery_runs_everything() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let steps = vec![
            Step::Run(probe("one", Gate::Always, true, 0, &log)),
            Step::GatedOnPassing(vec![Step::Run(probe("two", Gate::Always, true, 0, &log))]),
        ];
        let sequencer = Sequencer::new(steps, terminal(&log));

        let result = sequencer.run(&mut ctx_with(quiet_config()));
        assert_eq!(result, 0);
        assert_eq!(*log.borrow(), vec!["one", "two", "deinit"]);
    }

    #[test]
    fn failure_stops_run_but_terminal_still_executes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let steps = vec![
            Step::Run(probe("one", Gate::Always, true, 0, &log)),
            Step::Run(probe("two", Gate::Always, true, 4, &log)),
            Step::Run(probe("three", Gate::Always, true, 0, &log)),
        ];
        let sequencer = Sequencer::new(steps, terminal(&log));

        let mut ctx = ctx_with(quiet_config());
        let result = sequencer.run(&mut ctx);
        assert_eq!(result, 4);
        assert_eq!(*log.borrow(), vec!["one", "two", "deinit"]);
        assert_eq!(
            ctx.journal.last(),
            Some(&crate::context::LifecycleEvent::ArenaReleased),
            "teardown still runs after a stop"
        );
    }

    #[test]
    fn keep_going_continues_and_ors_results() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let steps = vec![
            Step::Run(probe("one", Gate::Always, true, 1, &log)),
            Step::Run(probe("two", Gate::Always, true, 2, &log)),
        ];
        let sequencer = Sequencer::new(steps, terminal(&log));

        let config = RunConfig {
            stop_on_first_failure: false,
            ..quiet_config()
        };
        let result = sequencer.run(&mut ctx_with(config));
        assert_eq!(result, 1 | 2);
        assert_eq!(*log.borrow(), vec!["one", "two", "deinit"]);
    }

    #[test]
    fn passing_gate_skips_after_failure() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let steps = vec![
            Step::Run(probe("one", Gate::Always, false, 7, &log)),
            Step::Run(probe("two", Gate::Passing, false, 0, &log)),
            Step::Run(probe("three", Gate::Always, false, 0, &log)),
        ];
        let sequencer = Sequencer::new(steps, terminal(&log));

        let config = RunConfig {
            stop_on_first_failure: false,
            ..quiet_config()
        };
        let result = sequencer.run(&mut ctx_with(config));
        assert_eq!(result, 7);
        assert_eq!(*log.borrow(), vec!["one", "three", "deinit"]);
    }

    #[test]
    fn gated_region_snapshots_condition_at_entry() {
        let log = Rc::new(RefCell::new(Vec::new()));
        // With the stop policy off, a failure inside the region must
        // not eject the region's remaining checkpoints.
        let steps = vec![Step::GatedOnPassing(vec![
            Step::Run(probe("one", Gate::Always, true, 3, &log)),
            Step::Run(probe("two", Gate::Always, true, 0, &log)),
        ])];
        let sequencer = Sequencer::new(steps, terminal(&log));

        let config = RunConfig {
            stop_on_first_failure: false,
            ..quiet_config()
        };
        let result = sequencer.run(&mut ctx_with(config));
        assert_eq!(result, 3);
        assert_eq!(*log.borrow(), vec!["one", "two", "deinit"]);
    }

    #[test]
    fn gated_region_is_skipped_when_already_failing() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let steps = vec![
            Step::Run(probe("one", Gate::Always, false, 5, &log)),
            Step::GatedOnPassing(vec![Step::Run(probe("two", Gate::Always, false, 0, &log))]),
        ];
        let sequencer = Sequencer::new(steps, terminal(&log));

        let config = RunConfig {
            stop_on_first_failure: false,
            ..quiet_config()
        };
        sequencer.run(&mut ctx_with(config));
        assert_eq!(*log.borrow(), vec!["one", "deinit"]);
    }

    #[test]
    fn nat_gate_requires_nat_enabled() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let steps = vec![Step::Run(probe("nat", Gate::PassingAndNat, false, 0, &log))];
        let sequencer = Sequencer::new(steps, terminal(&log));

        let config = RunConfig {
            nat_enabled: false,
            ..quiet_config()
        };
        sequencer.run(&mut ctx_with(config));
        assert_eq!(*log.borrow(), vec!["deinit"]);
    }

    #[test]
    fn unregister_gate_truth_table() {
        // (proxy_tests, aggregate, relay_started) -> runs
        let cases = [
            (false, 0, false, false),
            (false, 0, true, false),
            (true, 0, false, true),
            (true, 0, true, true),
            (true, 9, false, true), // failures, relay never started
            (true, 9, true, false), // failures against a live relay
        ];
        for (proxy_tests, aggregate, relay_started, expect_run) in cases {
            let log = Rc::new(RefCell::new(Vec::new()));
            let steps = vec![Step::Run(probe("unregister", Gate::Unregister, false, 0, &log))];
            let sequencer = Sequencer::new(steps, terminal(&log));

            let config = RunConfig {
                proxy_tests,
                stop_on_first_failure: false,
                ..quiet_config()
            };
            let mut ctx = ctx_with(config);
            ctx.aggregate = aggregate;
            ctx.relay_started = relay_started;
            sequencer.run(&mut ctx);

            let ran = log.borrow().contains(&"unregister");
            assert_eq!(
                ran, expect_run,
                "proxy_tests={} aggregate={} relay_started={}",
                proxy_tests, aggregate, relay_started
            );
        }
    }

    #[test]
    fn rewire_step_honors_event_flags() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let steps = vec![Step::RewireSinks];
        let sequencer = Sequencer::new(steps, terminal(&log));

        let config = RunConfig {
            events_b: true,
            ..quiet_config()
        };
        let mut ctx = ctx_with(config);
        // Run the steps only; teardown clears the sinks.
        ctx.a.sink = Some(event_printer());
        let _ = Sequencer::run_steps(&sequencer.steps, &mut ctx);

        assert!(ctx.a.sink.is_none(), "A had no event flag");
        assert!(ctx.b.sink.is_some());
        assert!(ctx.c.sink.is_none());
    }
}
