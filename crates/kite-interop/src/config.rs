//! Run configuration
//!
//! Parses argv-like tokens into a `RunConfig`. Scanning is strictly
//! left to right; value-taking flags (`-l`, `-p`) accept their value
//! inline or as the next token; `-` and the first non-dash token stop
//! option scanning; anything unrecognized is a usage error. The parsed
//! logging level is propagated to the subsystem sinks as a side effect
//! of a successful scan, force-setting the engine sink and soft-setting
//! the rest.

use thiserror::Error;

use kite_core::{Subsystems, Uri};

use crate::PROGRAM;

/// A malformed or unrecognized command line. Always fatal with exit
/// code 1 at process level; a value here so the rules stay testable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized or malformed option: {token:?}")]
pub struct UsageError {
    pub token: Option<String>,
}

impl UsageError {
    fn at(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
        }
    }
}

static OPTIONS_USAGE: &str = "   -v | --verbose    be verbose
   -a | --abort      abort on a failed check
   -q | --quiet      be quiet
   -s                use only single thread
   -l level          set logging level (0 by default)
   -e | --events     print agent events
   -I                print initialization events
   -A                print agent events for A
   -B                print agent events for B
   -C                print agent events for C
   --attach          print pid, wait for a debugger to be attached
   --no-proxy        do not use internal relay
   --no-nat          do not use internal \"nat\"
   --nat             use internal \"nat\"
   --symmetric       run internal \"nat\" in symmetric mode
   -N                print events from internal \"nat\"
   --no-alarm        don't ask for guard timer
   -p uri            specify uri of outbound proxy
   --proxy-tests     run tests involving the relay, too
   --expensive       run expensive checks
   -k                do not exit after first error
";

/// The static usage block, enumerating every recognized flag.
pub fn usage_text() -> String {
    format!(
        "usage: {} OPTIONS\n   where OPTIONS are\n{}",
        PROGRAM, OPTIONS_USAGE
    )
}

/// Immutable run options, fixed once parsing completes.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub verbose: bool,
    pub quiet: bool,
    pub abort_on_check: bool,
    /// Normalized logging level.
    pub log_level: u8,
    /// Drive the engine multi-threaded; `-s` selects inline pumping.
    pub threading: bool,
    pub events_init: bool,
    pub events_a: bool,
    pub events_b: bool,
    pub events_c: bool,
    pub attach: bool,
    /// Start the internal relay during engine init.
    pub relay_enabled: bool,
    pub nat_enabled: bool,
    pub nat_symmetric: bool,
    pub nat_logging: bool,
    /// Outbound proxy override for new registrations.
    pub outbound_proxy: Option<Uri>,
    /// Run the relay-dependent scenarios.
    pub proxy_tests: bool,
    pub stop_on_first_failure: bool,
    pub guard_enabled: bool,
    pub expensive: bool,
    /// Print a heading line before each checkpoint.
    pub print_headings: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            quiet: false,
            abort_on_check: false,
            log_level: 0,
            threading: true,
            events_init: false,
            events_a: false,
            events_b: false,
            events_c: false,
            attach: false,
            relay_enabled: true,
            nat_enabled: true,
            nat_symmetric: false,
            nat_logging: false,
            outbound_proxy: None,
            proxy_tests: false,
            stop_on_first_failure: true,
            guard_enabled: true,
            expensive: false,
            print_headings: true,
        }
    }
}

impl RunConfig {
    /// Parse command-line tokens; the `EXPENSIVE_CHECKS` environment
    /// variable is OR'd into the expensive flag.
    pub fn parse(args: &[String], subsystems: &Subsystems) -> Result<Self, UsageError> {
        let env_expensive = std::env::var_os("EXPENSIVE_CHECKS").is_some();
        Self::parse_with_env(args, subsystems, env_expensive)
    }

    /// Parse with an explicit environment flag, for tests.
    pub fn parse_with_env(
        args: &[String],
        subsystems: &Subsystems,
        env_expensive: bool,
    ) -> Result<Self, UsageError> {
        let mut config = RunConfig {
            expensive: env_expensive,
            ..RunConfig::default()
        };

        let mut i = 0;
        while i < args.len() {
            let token = args[i].as_str();
            match token {
                "-v" | "--verbose" => config.verbose = true,
                "-a" | "--abort" => config.abort_on_check = true,
                "-q" | "--quiet" => {
                    config.verbose = false;
                    config.quiet = true;
                }
                "-k" => config.stop_on_first_failure = false,
                "-e" | "--events" => {
                    config.events_init = true;
                    config.events_a = true;
                    config.events_b = true;
                    config.events_c = true;
                }
                "-I" => config.events_init = true,
                "-A" => config.events_a = true,
                "-B" => config.events_b = true,
                "-C" => config.events_c = true,
                "-s" => config.threading = false,
                "--attach" => config.attach = true,
                "--proxy-tests" => config.proxy_tests = true,
                "--no-proxy" => config.relay_enabled = false,
                "--no-nat" => config.nat_enabled = false,
                "--nat" => config.nat_enabled = true,
                "--symmetric" => config.nat_symmetric = true,
                "-N" => config.nat_logging = true,
                "--expensive" => config.expensive = true,
                "--no-alarm" => config.guard_enabled = false,
                "-" => break,
                _ if token.starts_with("-l") => {
                    let inline = &token[2..];
                    let level = if !inline.is_empty() {
                        parse_level(inline).ok_or_else(|| UsageError::at(token))?
                    } else if i + 1 < args.len() {
                        i += 1;
                        parse_level(&args[i]).ok_or_else(|| UsageError::at(&args[i]))?
                    } else {
                        3
                    };
                    config.log_level = level;
                    // Propagate immediately: engine force-set, the
                    // rest soft-set.
                    subsystems.engine.set_level(level);
                    subsystems.negotiator.soft_set_level(level);
                    subsystems.notifier.soft_set_level(level);
                    subsystems.transaction.soft_set_level(level);
                    subsystems.transport.soft_set_level(level);
                }
                _ if token.starts_with("-p") => {
                    let inline = &token[2..];
                    let value = if !inline.is_empty() {
                        inline
                    } else {
                        i += 1;
                        match args.get(i) {
                            Some(next) if !next.starts_with('-') => next.as_str(),
                            _ => return Err(UsageError::at(token)),
                        }
                    };
                    let uri = Uri::parse(value).map_err(|_| UsageError::at(value))?;
                    config.outbound_proxy = Some(uri);
                }
                _ if !token.starts_with('-') => break,
                _ => return Err(UsageError::at(token)),
            }
            i += 1;
        }

        config.finish(subsystems);
        Ok(config)
    }

    /// Post-scan normalization: a level of 0 on a non-quiet run becomes
    /// 1 and is soft-propagated everywhere, unless verbose output was
    /// requested.
    fn finish(&mut self, subsystems: &Subsystems) {
        if !self.verbose {
            if self.log_level == 0 && !self.quiet {
                self.log_level = 1;
            }
            subsystems.soft_set_all(self.log_level);
        }
        self.print_headings =
            !self.quiet || self.verbose || self.events_a || self.events_b || self.events_c;
    }

    /// Watchdog bound under the current expensive-checks setting.
    pub fn guard_timeout(&self) -> std::time::Duration {
        if self.expensive {
            crate::guard::GUARD_TIMEOUT_EXPENSIVE
        } else {
            crate::guard::GUARD_TIMEOUT
        }
    }
}

/// Parse a logging level, consuming the entire token.
fn parse_level(s: &str) -> Option<u8> {
    let value: i32 = s.parse().ok()?;
    Some(value.clamp(0, kite_core::MAX_LOG_LEVEL as i32) as u8)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn parse(tokens: &[&str]) -> Result<RunConfig, UsageError> {
        RunConfig::parse_with_env(&args(tokens), &Subsystems::new(), false)
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert!(config.threading);
        assert!(config.relay_enabled);
        assert!(config.nat_enabled);
        assert!(config.stop_on_first_failure);
        assert!(config.guard_enabled);
        assert!(!config.proxy_tests);
        assert_eq!(config.log_level, 1, "non-quiet level 0 normalizes to 1");
    }

    #[test]
    fn quiet_level_nat_and_keep_going() {
        // Concrete scenario: -q -l 2 --no-nat -k
        let config = parse(&["-q", "-l", "2", "--no-nat", "-k"]).unwrap();
        assert!(config.quiet);
        assert!(!config.verbose);
        assert_eq!(config.log_level, 2);
        assert!(!config.nat_enabled);
        assert!(!config.stop_on_first_failure);
    }

    #[test]
    fn quiet_clears_earlier_verbose() {
        let config = parse(&["-v", "-q"]).unwrap();
        assert!(config.quiet);
        assert!(!config.verbose);

        let config = parse(&["-q", "-v"]).unwrap();
        assert!(config.quiet);
        assert!(config.verbose);
    }

    #[test]
    fn outbound_proxy_leaves_relay_enabled() {
        // Concrete scenario: -p sip:proxy.example.com --proxy-tests
        let config = parse(&["-p", "sip:proxy.example.com", "--proxy-tests"]).unwrap();
        assert_eq!(
            config.outbound_proxy,
            Some(Uri::parse("sip:proxy.example.com").unwrap())
        );
        assert!(config.proxy_tests);
        assert!(config.relay_enabled, "-p alone must not disable the relay");
    }

    #[test]
    fn no_alarm_disables_guard() {
        let config = parse(&["--no-alarm", "--expensive"]).unwrap();
        assert!(!config.guard_enabled);
        assert!(config.expensive);
    }

    #[test]
    fn level_inline_and_next_token() {
        assert_eq!(parse(&["-l4"]).unwrap().log_level, 4);
        assert_eq!(parse(&["-l", "4"]).unwrap().log_level, 4);
        assert_eq!(parse(&["-l"]).unwrap().log_level, 3, "bare -l defaults to 3");
    }

    #[test]
    fn level_with_trailing_junk_is_usage_error() {
        assert!(parse(&["-l2x"]).is_err());
        assert!(parse(&["-l", "2x"]).is_err());
        assert!(parse(&["-l", "-v"]).is_err(), "next token is consumed as the value");
    }

    #[test]
    fn level_propagates_to_sinks() {
        let subsystems = Subsystems::new();
        let config =
            RunConfig::parse_with_env(&args(&["-l", "5"]), &subsystems, false).unwrap();
        assert_eq!(config.log_level, 5);
        assert_eq!(subsystems.engine.level(), 5);
        assert!(subsystems.engine.is_pinned());
        assert_eq!(subsystems.transport.level(), 5);
        assert!(!subsystems.transport.is_pinned());
    }

    #[test]
    fn proxy_missing_value_is_usage_error() {
        assert!(parse(&["-p"]).is_err());
        assert!(parse(&["-p", "-v"]).is_err());
        assert!(parse(&["-p", "not a uri"]).is_err());
        assert!(parse(&["-psip:p.example.com"]).is_ok());
    }

    #[test]
    fn dash_stops_scanning() {
        let config = parse(&["-q", "-", "--no-such-flag"]).unwrap();
        assert!(config.quiet);

        let config = parse(&["-q", "positional", "--no-such-flag"]).unwrap();
        assert!(config.quiet);
    }

    #[test]
    fn unknown_flag_is_usage_error() {
        let err = parse(&["--frobnicate"]).unwrap_err();
        assert_eq!(err.token.as_deref(), Some("--frobnicate"));
        assert!(parse(&["-h"]).is_err());
    }

    #[test]
    fn env_expensive_is_ored_in() {
        let config =
            RunConfig::parse_with_env(&args(&[]), &Subsystems::new(), true).unwrap();
        assert!(config.expensive);
        assert_eq!(config.guard_timeout(), crate::guard::GUARD_TIMEOUT_EXPENSIVE);
    }

    #[test]
    fn events_flag_sets_all_scopes() {
        let config = parse(&["-e"]).unwrap();
        assert!(config.events_init && config.events_a && config.events_b && config.events_c);

        let config = parse(&["-B"]).unwrap();
        assert!(!config.events_a && config.events_b && !config.events_c);
    }

    #[test]
    fn usage_rows_are_uniformly_indented() {
        for line in OPTIONS_USAGE.lines() {
            assert!(line.starts_with("   -"), "usage row lost its indent: {:?}", line);
        }
    }

    #[test]
    fn usage_text_names_every_flag() {
        let text = usage_text();
        for flag in [
            "-v", "--verbose", "-q", "--quiet", "-s", "-l", "-e", "--events", "-I", "-A",
            "-B", "-C", "--attach", "--no-proxy", "--no-nat", "--nat", "--symmetric",
            "-N", "--no-alarm", "-p", "--proxy-tests", "--expensive", "-k",
        ] {
            assert!(text.contains(flag), "usage text is missing {}", flag);
        }
    }

    /// Simple boolean flags and the field they set.
    const SIMPLE_FLAGS: &[(&str, fn(&RunConfig) -> bool)] = &[
        ("-v", |c| c.verbose),
        ("-a", |c| c.abort_on_check),
        ("-k", |c| !c.stop_on_first_failure),
        ("-I", |c| c.events_init),
        ("-A", |c| c.events_a),
        ("-B", |c| c.events_b),
        ("-C", |c| c.events_c),
        ("-s", |c| !c.threading),
        ("--attach", |c| c.attach),
        ("--proxy-tests", |c| c.proxy_tests),
        ("--no-proxy", |c| !c.relay_enabled),
        ("--no-nat", |c| !c.nat_enabled),
        ("--symmetric", |c| c.nat_symmetric),
        ("-N", |c| c.nat_logging),
        ("--expensive", |c| c.expensive),
        ("--no-alarm", |c| !c.guard_enabled),
    ];

    proptest! {
        #[test]
        fn recognized_flag_sequences_parse_to_the_union_of_effects(
            picks in proptest::collection::vec(0usize..SIMPLE_FLAGS.len(), 0..12)
        ) {
            let tokens: Vec<String> =
                picks.iter().map(|&i| SIMPLE_FLAGS[i].0.to_string()).collect();
            let config =
                RunConfig::parse_with_env(&tokens, &Subsystems::new(), false).unwrap();

            for (i, (flag, effect)) in SIMPLE_FLAGS.iter().enumerate() {
                let given = picks.contains(&i);
                prop_assert_eq!(
                    effect(&config),
                    given,
                    "effect of {} (given: {})",
                    flag,
                    given
                );
            }
        }

        #[test]
        fn any_unknown_dash_token_is_a_usage_error(junk in "--[x-z]{1,8}") {
            prop_assume!(!SIMPLE_FLAGS.iter().any(|(f, _)| *f == junk));
            let tokens = vec![junk.clone()];
            let result =
                RunConfig::parse_with_env(&tokens, &Subsystems::new(), false);
            prop_assert!(result.is_err());
        }
    }
}
