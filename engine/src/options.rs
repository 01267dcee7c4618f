// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::context::ContextSensitivity;
use crate::worklist::{FifoWorkingSet, LifoWorkingSet, WorkingSet};

use clap::{App, AppSettings, Arg, Error, ErrorKind};
use itertools::Itertools;
use mirai_annotations::*;

/// Creates the clap::App metadata for argument parsing.
fn make_options_parser<'a>() -> App<'a, 'a> {
    App::new("absint")
        .setting(AppSettings::NoBinaryName)
        .version("v0.5.0")
        .arg(Arg::with_name("widen_after")
            .long("widen_after")
            .takes_value(true)
            .default_value("5")
            .help("The number of joins per node (scaled by its predecessors) before widening kicks in.")
            .long_help("Use 0 to always join with lub; this renounces the termination guarantee for domains with unbounded ascending chains."))
        .arg(Arg::with_name("context")
            .long("context")
            .possible_values(&["insensitive", "klimited", "full"])
            .default_value("klimited")
            .help("How calling contexts are distinguished.\n")
            .long_help("With `insensitive`, all call sites of a procedure share one summary.\nWith `klimited`, results are kept apart per call string, truncated to --context_depth frames.\nWith `full`, call strings are unbounded.\n"))
        .arg(Arg::with_name("context_depth")
            .long("context_depth")
            .takes_value(true)
            .default_value("5")
            .help("The number of call frames a klimited context remembers."))
        .arg(Arg::with_name("worklist")
            .long("worklist")
            .possible_values(&["fifo", "lifo"])
            .default_value("fifo")
            .help("The processing order of pending statements within one fixpoint."))
}

/// The processing order of one fixpoint run; a fresh working set is created
/// per computation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WorklistSelection {
    Fifo,
    Lifo,
}

impl WorklistSelection {
    pub fn make(self) -> Box<dyn WorkingSet> {
        match self {
            WorklistSelection::Fifo => Box::new(FifoWorkingSet::new()),
            WorklistSelection::Lifo => Box::new(LifoWorkingSet::new()),
        }
    }
}

impl Default for WorklistSelection {
    fn default() -> Self {
        WorklistSelection::Fifo
    }
}

/// Represents the configuration the engine reads but does not own: the
/// widening threshold, the context-sensitivity policy, and the worklist
/// strategy.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    pub widen_after: usize,
    pub sensitivity: ContextSensitivity,
    pub worklist: WorklistSelection,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            widen_after: 5,
            sensitivity: ContextSensitivity::KLimited(5),
            worklist: WorklistSelection::Fifo,
        }
    }
}

impl Options {
    /// Parse options from an argument string. The argument string will be
    /// split using unix shell escaping rules. Any content beyond the
    /// leftmost `--` token will be returned (excluding this token).
    pub fn parse_from_str(&mut self, s: &str) -> Vec<String> {
        self.parse(&shellwords::split(s).unwrap_or_else(|e| {
            Error::with_description(
                &format!("Cannot parse argument string: {:?}", e),
                ErrorKind::InvalidUtf8,
            )
            .exit()
        }))
    }

    /// Parses options from a list of strings. Any content beyond the
    /// leftmost `--` token will be returned (excluding this token).
    pub fn parse(&mut self, args: &[String]) -> Vec<String> {
        let mut absint_args_end = args.len();
        let mut remaining_args_start = 0;
        if let Some((p, _)) = args.iter().find_position(|s| s.as_str() == "--") {
            absint_args_end = p;
            remaining_args_start = p + 1;
        }
        let absint_args = &args[0..absint_args_end];
        let matches = if remaining_args_start == 0 {
            // The arguments may not be intended for the engine and may get
            // here via some tool, so do not report errors here, but just
            // assume that the arguments were not meant for it.
            match make_options_parser().get_matches_from_safe(absint_args.iter()) {
                Ok(matches) => {
                    // Looks like these are engine options after all.
                    remaining_args_start = args.len();
                    matches
                }
                Err(Error {
                    kind: ErrorKind::HelpDisplayed,
                    message,
                    ..
                }) => {
                    println!("{}\n", message);
                    return args.to_vec();
                }
                Err(Error {
                    kind: ErrorKind::UnknownArgument,
                    ..
                }) => {
                    // Just send all of the arguments on. Note that this
                    // means that engine options and remaining options must
                    // always be separated by --.
                    return args.to_vec();
                }
                Err(e) => {
                    e.exit();
                }
            }
        } else {
            // This will display error diagnostics for arguments that are
            // not valid for the engine.
            make_options_parser().get_matches_from(absint_args.iter())
        };

        if matches.is_present("widen_after") {
            self.widen_after = match matches.value_of("widen_after") {
                Some(s) => match s.parse::<usize>() {
                    Ok(v) => v,
                    Err(_) => Error::with_description(
                        "--widen_after expects a non-negative integer",
                        ErrorKind::InvalidValue,
                    )
                    .exit(),
                },
                None => assume_unreachable!(),
            }
        }
        let context_depth = if matches.is_present("context_depth") {
            match matches.value_of("context_depth") {
                Some(s) => match s.parse::<usize>() {
                    Ok(v) => v,
                    Err(_) => Error::with_description(
                        "--context_depth expects a non-negative integer",
                        ErrorKind::InvalidValue,
                    )
                    .exit(),
                },
                None => assume_unreachable!(),
            }
        } else {
            5
        };
        if matches.is_present("context") {
            self.sensitivity = match matches.value_of("context").unwrap() {
                "insensitive" => ContextSensitivity::CallInsensitive,
                "klimited" => ContextSensitivity::KLimited(context_depth),
                "full" => ContextSensitivity::FullStack,
                _ => assume_unreachable!(),
            };
        }
        if matches.is_present("worklist") {
            self.worklist = match matches.value_of("worklist").unwrap() {
                "fifo" => WorklistSelection::Fifo,
                "lifo" => WorklistSelection::Lifo,
                _ => assume_unreachable!(),
            };
        }
        args[remaining_args_start..].to_vec()
    }
}
