//! Harness entry point: parse options, arm the guard, run the battery.

use std::io::BufRead;

use tracing_subscriber::EnvFilter;

use kite_core::Subsystems;
use kite_interop::config::{usage_text, RunConfig};
use kite_interop::context::RunContext;
use kite_interop::guard::GuardTimer;
use kite_interop::scenarios;
use kite_interop::sequencer::Sequencer;
use kite_interop::PROGRAM;

fn init_tracing(config: &RunConfig) {
    let default_filter = if config.verbose {
        "debug"
    } else if config.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let subsystems = Subsystems::new();

    let config = match RunConfig::parse(&args, &subsystems) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}: {}", PROGRAM, err);
            eprint!("{}", usage_text());
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    // A debugger attach takes precedence over the watchdog; an armed
    // guard would kill the process mid-session.
    let guard = if config.attach {
        println!("{}: pid {}", PROGRAM, std::process::id());
        println!("<Press RETURN to continue>");
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        None
    } else if config.guard_enabled {
        Some(GuardTimer::arm(config.guard_timeout()))
    } else {
        None
    };

    let mut ctx = RunContext::new(config, subsystems);
    let (steps, terminal) = scenarios::battery();
    let retval = Sequencer::new(steps, terminal).run(&mut ctx);

    if let Some(guard) = guard {
        guard.disarm();
    }
    drop(ctx);
    std::process::exit(retval);
}
