// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use crate::config::Config;
use crate::output::Summary;
use backtrace::Backtrace;
use clap::{value_parser, Command};
use core::sync::atomic::{AtomicBool, Ordering};
use requester::Work;
use ringlog::*;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Builder;
use tokio::time::sleep;

mod config;
mod output;

static RUNNING: AtomicBool = AtomicBool::new(true);

fn main() {
    // custom panic hook to terminate whole process after unwinding
    std::panic::set_hook(Box::new(|s| {
        eprintln!("{s}");
        eprintln!("{:?}", Backtrace::new());
        std::process::exit(101);
    }));

    // parse command line options
    let cli = Command::new(env!("CARGO_BIN_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_about("Sends a fixed number of HTTP requests, optionally rate limited, and reports on the responses.")
        .arg(
            clap::Arg::new("CONFIG")
                .help("Configuration file")
                .value_parser(value_parser!(PathBuf))
                .action(clap::ArgAction::Set)
                .required(true)
                .index(1),
        )
        .get_matches();

    let Some(config) = cli.get_one::<PathBuf>("CONFIG") else {
        eprintln!("no configuration file provided");
        std::process::exit(1);
    };

    run(Config::new(config))
}

fn run(config: Config) {
    // configure debug log
    let debug_output: Box<dyn Output> = if let Some(file) = config.debug().log_file() {
        let backup = config
            .debug()
            .log_backup()
            .unwrap_or(format!("{}.old", file));
        match File::new(&file, &backup, config.debug().log_max_size()) {
            Ok(f) => Box::new(f),
            Err(e) => {
                eprintln!("failed to open debug log file: {e}");
                std::process::exit(1);
            }
        }
    } else {
        // by default, log to stderr
        Box::new(Stderr::new())
    };

    let level = config.debug().log_level();

    let debug_log = if level <= Level::Info {
        LogBuilder::new().format(ringlog::default_format)
    } else {
        LogBuilder::new()
    }
    .output(debug_output)
    .log_queue_depth(config.debug().log_queue_depth())
    .single_message_size(config.debug().log_single_message_size())
    .build();

    let debug_log = match debug_log {
        Ok(log) => log,
        Err(e) => {
            eprintln!("failed to initialize debug log: {e:?}");
            std::process::exit(1);
        }
    };

    let mut log = MultiLogBuilder::new()
        .level_filter(level.to_level_filter())
        .default(debug_log)
        .build()
        .start();

    output!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    // initialize async runtime for control plane
    let control_runtime = match Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to initialize tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    // spawn logging thread
    control_runtime.spawn(async move {
        while RUNNING.load(Ordering::Relaxed) {
            sleep(Duration::from_millis(1)).await;
            let _ = log.flush();
        }
        let _ = log.flush();
    });

    let work = match config.work_spec().and_then(Work::new) {
        Ok(work) => work,
        Err(e) => {
            error!("invalid configuration: {e}");
            shutdown(control_runtime);
            std::process::exit(1);
        }
    };

    output!(
        "Target: {} {}",
        config.request().method().to_uppercase(),
        config.request().url()
    );

    match config.general().duration() {
        Some(duration) => output!(
            "Workers: {} Duration: {}",
            config.general().concurrency(),
            humantime::format_duration(duration)
        ),
        None => output!(
            "Workers: {} Requests: {}",
            config.general().concurrency(),
            config.general().requests()
        ),
    }

    debug!("starting run");
    let running = work.start();

    // stop early on ctrl-c, in-flight requests still complete
    {
        let stop = running.stop_handle();
        control_runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, stopping");
                stop.stop();
            }
        });
    }

    if let Some(duration) = config.general().duration() {
        let stop = running.stop_handle();
        control_runtime.spawn(async move {
            sleep(duration).await;
            debug!("duration elapsed, stopping");
            stop.stop();
        });
    }

    let mut summary = match Summary::new() {
        Ok(summary) => summary,
        Err(e) => {
            error!("failed to initialize summary: {e:?}");
            running.stop();
            shutdown(control_runtime);
            std::process::exit(1);
        }
    };

    for result in running.results() {
        summary.record(&result);
    }

    match running.join() {
        Ok(completion) => {
            debug!("run complete: {} results", summary.count());
            summary.print(&completion);
        }
        Err(e) => {
            error!("run failed: {e}");
            shutdown(control_runtime);
            std::process::exit(1);
        }
    }

    shutdown(control_runtime);
}

fn shutdown(control_runtime: tokio::runtime::Runtime) {
    RUNNING.store(false, Ordering::Relaxed);

    // delay so the logging task gets a final flush in
    std::thread::sleep(Duration::from_millis(100));

    control_runtime.shutdown_timeout(Duration::from_millis(100));
}
