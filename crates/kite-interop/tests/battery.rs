//! End-to-end battery runs against the in-process engine.

use kite_core::{Subsystems, Uri};
use kite_interop::config::RunConfig;
use kite_interop::context::{LifecycleEvent, RunContext};
use kite_interop::scenarios;
use kite_interop::sequencer::{Checkpoint, Gate, Sequencer, Step};

fn quiet() -> RunConfig {
    RunConfig {
        print_headings: false,
        proxy_tests: true,
        ..RunConfig::default()
    }
}

fn run_with(config: RunConfig) -> (i32, RunContext) {
    let mut ctx = RunContext::new(config, Subsystems::new());
    let (steps, terminal) = scenarios::battery();
    let result = Sequencer::new(steps, terminal).run(&mut ctx);
    (result, ctx)
}

#[test]
fn default_battery_passes() {
    let (result, ctx) = run_with(quiet());
    assert_eq!(result, 0);
    assert!(ctx.engine.is_none(), "deinit must release the engine");

    assert_eq!(
        ctx.journal,
        vec![
            LifecycleEvent::ArenaInit,
            LifecycleEvent::EndpointInit('a'),
            LifecycleEvent::EndpointInit('b'),
            LifecycleEvent::EndpointInit('c'),
            LifecycleEvent::RelayStarted,
            LifecycleEvent::NatStarted,
            LifecycleEvent::EngineStarted,
            LifecycleEvent::EngineStopped,
            LifecycleEvent::NatStopped,
            LifecycleEvent::RelayStopped,
            LifecycleEvent::EndpointReleased('c'),
            LifecycleEvent::EndpointReleased('b'),
            LifecycleEvent::EndpointReleased('a'),
            LifecycleEvent::ArenaReleased,
        ]
    );
}

#[test]
fn battery_without_relay_and_nat_passes() {
    let config = RunConfig {
        relay_enabled: false,
        nat_enabled: false,
        ..quiet()
    };
    let (result, ctx) = run_with(config);
    assert_eq!(result, 0);
    assert!(!ctx.journal.contains(&LifecycleEvent::RelayStarted));
    assert!(!ctx.journal.contains(&LifecycleEvent::NatStarted));
}

#[test]
fn single_threaded_battery_passes() {
    let config = RunConfig {
        threading: false,
        ..quiet()
    };
    let (result, _ctx) = run_with(config);
    assert_eq!(result, 0);
}

#[test]
fn symmetric_nat_battery_passes() {
    let config = RunConfig {
        nat_symmetric: true,
        ..quiet()
    };
    let (result, _ctx) = run_with(config);
    assert_eq!(result, 0);
}

#[test]
fn expensive_battery_passes() {
    let config = RunConfig {
        expensive: true,
        ..quiet()
    };
    let (result, _ctx) = run_with(config);
    assert_eq!(result, 0);
}

#[test]
fn outbound_proxy_battery_passes() {
    let config = RunConfig {
        outbound_proxy: Some(Uri::parse("kite:proxy.example.com").unwrap()),
        ..quiet()
    };
    let (result, _ctx) = run_with(config);
    assert_eq!(result, 0);
}

#[test]
fn identical_runs_produce_identical_journals() {
    let (first_result, first) = run_with(quiet());
    let (second_result, second) = run_with(quiet());
    assert_eq!(first_result, second_result);
    assert_eq!(first.journal, second.journal);
}

#[test]
fn early_failure_still_reaches_deinit_and_teardown() {
    let (_, terminal) = scenarios::battery();
    let steps = vec![Step::Run(Checkpoint::new(
        "induced failure",
        Gate::Always,
        true,
        |_: &mut RunContext| 8,
    ))];

    let mut ctx = RunContext::new(quiet(), Subsystems::new());
    let result = Sequencer::new(steps, terminal).run(&mut ctx);

    assert_eq!(result, 8);
    assert_eq!(ctx.journal.last(), Some(&LifecycleEvent::ArenaReleased));
}

#[test]
fn keep_going_battery_still_passes() {
    let config = RunConfig {
        stop_on_first_failure: false,
        ..quiet()
    };
    let (result, _ctx) = run_with(config);
    assert_eq!(result, 0);
}
