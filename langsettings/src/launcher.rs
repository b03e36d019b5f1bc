// SPDX-License-Identifier: GPL-3.0-or-later

//! Launching the compiler probe and streaming its output.

use crate::scheduler::CancellationToken;
use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A command line to run, with the complete environment it gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub command: String,
    pub environment: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The process finished; `code` is absent when it was killed by a signal.
    Exited { code: Option<i32> },
    /// The cancellation token fired and the process was killed.
    Cancelled,
}

/// Runs external commands for the builtin-specs detector.
///
/// # Thread Safety
///
/// Implementations are shared between the scheduler workers.
pub trait ProcessLauncher: Send + Sync {
    /// Runs the request and passes every output line to `sink` as it arrives.
    ///
    /// Lines are passed without their line terminator. The call returns
    /// when the process exits, or soon after `cancellation` fires.
    fn launch(
        &self,
        request: &LaunchRequest,
        cancellation: &CancellationToken,
        sink: &mut dyn FnMut(Stream, &str),
    ) -> Result<LaunchOutcome, LaunchError>;
}

/// Launches processes on the local machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(
        &self,
        request: &LaunchRequest,
        cancellation: &CancellationToken,
        sink: &mut dyn FnMut(Stream, &str),
    ) -> Result<LaunchOutcome, LaunchError> {
        let arguments = shell_words::split(&request.command)
            .map_err(|source| LaunchError::CommandSyntax { command: request.command.clone(), source })?;
        let (program, arguments) =
            arguments.split_first().ok_or_else(|| LaunchError::EmptyCommand { command: request.command.clone() })?;
        let executable = PathBuf::from(program);

        let mut command = Command::new(program);
        command
            .args(arguments)
            .env_clear()
            .envs(&request.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(working_dir) = &request.working_dir {
            command.current_dir(working_dir);
        }

        log::debug!("Launching: {}", request.command);
        let mut child =
            command.spawn().map_err(|source| LaunchError::ProcessSpawn { executable: executable.clone(), source })?;

        let (sender, receiver) = unbounded::<(Stream, String)>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, Stream::Stdout, sender.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, Stream::Stderr, sender.clone()));
        }
        drop(sender);

        loop {
            if cancellation.is_cancelled() {
                log::debug!("Cancelled, killing child process");
                child.kill().map_err(|source| LaunchError::ProcessKill { executable: executable.clone(), source })?;
                child.wait().map_err(|source| LaunchError::ProcessWait { executable: executable.clone(), source })?;
                join_readers(readers);
                return Ok(LaunchOutcome::Cancelled);
            }
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok((stream, line)) => sink(stream, &line),
                Err(RecvTimeoutError::Timeout) => continue,
                // Both streams closed.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = loop {
            if cancellation.is_cancelled() {
                child.kill().map_err(|source| LaunchError::ProcessKill { executable: executable.clone(), source })?;
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => return Err(LaunchError::ProcessWait { executable, source }),
            }
        };
        join_readers(readers);
        log::debug!("Child process exited: {status:?}");

        if cancellation.is_cancelled() {
            return Ok(LaunchOutcome::Cancelled);
        }
        Ok(LaunchOutcome::Exited { code: status.code() })
    }
}

fn forward_lines<R>(source: R, stream: Stream, sender: Sender<(Stream, String)>) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if sender.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    log::debug!("Failed to read {stream:?}: {error}");
                    break;
                }
            }
        }
    })
}

fn join_readers(readers: Vec<thread::JoinHandle<()>>) {
    for reader in readers {
        if reader.join().is_err() {
            log::debug!("Output reader thread panicked");
        }
    }
}

/// Errors that can occur while launching a command.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to split command '{command}': {source}")]
    CommandSyntax {
        command: String,
        #[source]
        source: shell_words::ParseError,
    },
    #[error("Command is empty: '{command}'")]
    EmptyCommand { command: String },
    #[error("Failed to execute '{executable}': {source}", executable = executable.display())]
    ProcessSpawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to kill process '{executable}': {source}", executable = executable.display())]
    ProcessKill {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to wait for process '{executable}': {source}", executable = executable.display())]
    ProcessWait {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
