use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;
use regex::Regex;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::fetcher::{FetchRequest, FetchedSource, SourceFetcher};

/// How often a running subprocess is polled for exit and cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Fetches pinned git revisions with `nix-prefetch-git` and hashes them with
/// `nix hash-path`.
///
/// This uses the system tools, which in turn pick up:
/// - SSH keys from ~/.ssh/
/// - Git credential helpers
/// - Any authentication configured in ~/.gitconfig
#[derive(Debug, Clone)]
pub struct NixPrefetchGit {
    program: String,
    hash_program: String,
}

impl Default for NixPrefetchGit {
    fn default() -> Self {
        Self::new("nix-prefetch-git", "nix")
    }
}

impl NixPrefetchGit {
    pub fn new(program: impl Into<String>, hash_program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            hash_program: hash_program.into(),
        }
    }

    fn failure(request: &FetchRequest, message: impl Into<String>) -> Error {
        Error::FetchFailure {
            url: request.url.clone(),
            revision: request.revision.clone(),
            message: message.into(),
        }
    }

    /// `nix hash-path --base32 --type sha256 <path>`
    fn hash_path(
        &self,
        request: &FetchRequest,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut command = Command::new(&self.hash_program);
        command
            .args(["hash-path", "--base32", "--type", "sha256"])
            .arg(path);
        let output = run_cancellable(command, cancel)
            .map_err(|e| lift_spawn_error(e, request, &self.hash_program))?;
        if !output.status.success() {
            return Err(Self::failure(
                request,
                format!("{} hash-path failed: {}", self.hash_program, output.stderr.trim()),
            ));
        }
        let hash = output.stdout.trim();
        if !is_nix_base32_sha256(hash) {
            return Err(Self::failure(
                request,
                format!("unexpected hash output '{}'", hash),
            ));
        }
        Ok(hash.to_string())
    }
}

impl SourceFetcher for NixPrefetchGit {
    fn fetch(&self, request: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedSource> {
        // nix-prefetch-git refuses to write into an existing directory
        if request.destination.exists() {
            fs::remove_dir_all(&request.destination)?;
        }
        if let Some(parent) = request.destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut command = Command::new(&self.program);
        command
            .args(["--builder", "--url", &request.url, "--out"])
            .arg(&request.destination)
            .args(["--rev", &request.revision]);
        if request.recursive {
            command.arg("--fetch-submodules");
        }
        debug!("Running {:?}", command);

        let output = run_cancellable(command, cancel)
            .map_err(|e| lift_spawn_error(e, request, &self.program))?;
        if !output.status.success() {
            let stderr = output.stderr.trim();
            let message = if stderr.contains("Authentication failed")
                || stderr.contains("Permission denied")
                || stderr.contains("Could not read from remote repository")
            {
                format!(
                    "Authentication failed. Make sure you have access to the repository.\n\
                    Error: {}",
                    stderr
                )
            } else {
                stderr.to_string()
            };
            return Err(Self::failure(request, message));
        }
        if !request.destination.is_dir() {
            return Err(Self::failure(
                request,
                format!("{} did not produce {}", self.program, request.destination.display()),
            ));
        }

        let content_hash = self.hash_path(request, &request.destination, cancel)?;
        Ok(FetchedSource {
            local_copy: request.destination.clone(),
            content_hash,
        })
    }
}

/// `true` for a 52 character nix base32 sha256 digest
pub fn is_nix_base32_sha256(hash: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[0-9a-z]{52}$").unwrap_or_else(|_| unreachable!()))
        .is_match(hash)
}

/// Captured result of a finished subprocess
#[derive(Debug)]
struct CommandOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Spawn failures keep the io error so they can be reported against the request
enum RunError {
    Spawn(std::io::Error),
    Other(Error),
}

impl From<Error> for RunError {
    fn from(e: Error) -> Self {
        RunError::Other(e)
    }
}

impl From<std::io::Error> for RunError {
    fn from(e: std::io::Error) -> Self {
        RunError::Other(Error::Io(e))
    }
}

fn lift_spawn_error(e: RunError, request: &FetchRequest, program: &str) -> Error {
    match e {
        RunError::Spawn(io) => NixPrefetchGit::failure(
            request,
            format!("failed to run {}: {}", program, io),
        ),
        RunError::Other(e) => e,
    }
}

/// Runs `command` to completion, killing it if `cancel` fires.
///
/// Output pipes are drained on helper threads so a chatty child cannot
/// block on a full pipe while we poll.
fn run_cancellable(
    mut command: Command,
    cancel: &CancellationToken,
) -> std::result::Result<CommandOutput, RunError> {
    cancel.check()?;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn().map_err(RunError::Spawn)?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        if cancel.is_cancelled() {
            kill(&mut child);
            return Err(RunError::Other(Error::Cancelled));
        }
        if let Some(status) = child.try_wait()? {
            break status;
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(CommandOutput {
        status,
        stdout: join_output(stdout),
        stderr: join_output(stderr),
    })
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill child process {}: {}", child.id(), e);
    }
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn join_output(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
