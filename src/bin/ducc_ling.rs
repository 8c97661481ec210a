/* Run a job as its owner.
 *
 * Copyright © 2026 The ducc_ling developers
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 * http://www.apache.org/licenses/LICENSE-2.0
 * There is NO WARRANTY.
 *
 *    ducc_ling <-u user> [-w workingdir] [-f filepath] -- program [args...]
 *
 * becomes USER and then execs PROGRAM with ARGS and the inherited
 * environment.  Nothing of ducc_ling survives the exec: the job keeps
 * our process id, and its exit status is the exit status the caller
 * sees.
 *
 * Only the "ducc" account may switch identities.  Anyone else who runs
 * this program gets their job run as themselves, which is harmless.
 * Nobody may run it as root, and nobody may ask to become root.
 *
 * Before the exec, in this order and after the identity switch:
 *
 *  - DUCC_RLIMIT_<NAME> variables (CORE, CPU, DATA, FSIZE, MEMLOCK,
 *    NOFILE, NPROC, RSS, STACK, and on Linux AS, LOCKS, SIGPENDING,
 *    MSGQUEUE, NICE, RTPRIO) set the matching soft limit.  A value that
 *    is not a non-negative integer is a fatal error.
 *  - The process is reniced by DUCC_NICE (default 10, also used when
 *    DUCC_NICE is not a number).
 *  - If -w was given we chdir there.
 *  - DUCC_LD_LIBRARY_PATH, if present, is renamed LD_LIBRARY_PATH.
 *  - If DUCC_CONSOLE_LISTENER is set to IP:PORT, stdin, stdout and
 *    stderr are connected to that TCP listener.  Otherwise, if -f was
 *    given, stdout and stderr go to FILEPATH-<pid>.log, creating any
 *    missing directories (mode 0750).  Otherwise they are inherited.
 *
 * Progress is reported as "<code> <message>" lines on stdout; fatal
 * errors as "<code> <message>" on stderr, followed by exit status 1.
 * "0 <pid>" means the checks passed and the identity switch is next.
 *
 * Free-form diagnostics go through the log crate; set DUCC_LING_LOG
 * (e.g. DUCC_LING_LOG=debug) to see more or less of them.
 */

extern crate ducc_ling;
extern crate env_logger;

use std::convert::Infallible;
use std::env;
use std::process;

use ducc_ling::cli::Args;
use ducc_ling::config::LaunchConfig;
use ducc_ling::environ::Environment;
use ducc_ling::identity::{Privileged, SystemAccounts};
use ducc_ling::launch::launch;
use ducc_ling::redirect::StandardStreams;
use ducc_ling::{report, LaunchError};

fn run() -> Result<Infallible, LaunchError> {
    report::version();

    let mut accounts = SystemAccounts;
    let privileged = Privileged::acquire(&accounts)?;

    let args = Args::parse_from_args(env::args_os())?;
    let config = LaunchConfig::new(args, Environment::capture())?;
    let streams = StandardStreams::claim().ok_or(LaunchError::StreamsAlreadyClaimed)?;

    launch(privileged, &mut accounts, streams, &config)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("DUCC_LING_LOG", "info"))
        .format_timestamp(None)
        .init();

    process::exit(match run() {
        Ok(never) => match never {},
        Err(e) => {
            report::failure(&e);
            1
        }
    });
}
