//! [`AccessProvider`] backed by the OpenSSH command-line tools.

use super::{AccessError, AccessProvider, CommandOutput, ExecRequest};
use pi_link_ssh::{KeySpec, SshTarget};
use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a child with a deadline is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Whether the child talks to the user's terminal or to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StdioMode {
    /// stdin closed, stdout/stderr captured
    Captured,
    /// Inherit the terminal so the tool can prompt for a password
    Interactive,
}

/// Runs `ssh-keygen`, `ssh-copy-id` and `ssh` from `PATH`.
#[derive(Debug, Clone)]
pub struct OpenSshProvider {
    ssh_keygen: String,
    ssh_copy_id: String,
    ssh: String,
}

impl Default for OpenSshProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenSshProvider {
    pub fn new() -> Self {
        Self {
            ssh_keygen: "ssh-keygen".to_string(),
            ssh_copy_id: "ssh-copy-id".to_string(),
            ssh: "ssh".to_string(),
        }
    }
}

impl AccessProvider for OpenSshProvider {
    fn generate_key(&self, spec: &KeySpec, private_key: &Path) -> Result<(), AccessError> {
        run(
            &self.ssh_keygen,
            &spec.keygen_args(private_key),
            StdioMode::Captured,
            None,
        )
        .map(|_| ())
    }

    fn derive_public_key(&self, private_key: &Path) -> Result<String, AccessError> {
        let args: Vec<OsString> =
            vec!["-y".into(), "-f".into(), private_key.as_os_str().to_owned()];
        let output = run(&self.ssh_keygen, &args, StdioMode::Captured, None)?;
        Ok(output.stdout.trim().to_string())
    }

    fn copy_id(
        &self,
        public_key: &Path,
        target: &SshTarget,
        timeout: Option<Duration>,
    ) -> Result<(), AccessError> {
        let args: Vec<OsString> = vec![
            "-i".into(),
            public_key.as_os_str().to_owned(),
            "-p".into(),
            target.port.to_string().into(),
            target.destination().into(),
        ];
        run(&self.ssh_copy_id, &args, StdioMode::Interactive, timeout).map(|_| ())
    }

    fn exec(&self, request: &ExecRequest) -> Result<CommandOutput, AccessError> {
        let args: Vec<OsString> = request.ssh_args().into_iter().map(OsString::from).collect();
        run(&self.ssh, &args, StdioMode::Captured, request.deadline)
    }
}

/// Spawn `program`, wait for it (killing it at `deadline`), and map failures to [`AccessError`].
fn run(
    program: &str,
    args: &[OsString],
    mode: StdioMode,
    deadline: Option<Duration>,
) -> Result<CommandOutput, AccessError> {
    log::debug!("Running: {}", display_command(program, args));

    let mut command = Command::new(program);
    command.args(args);
    if mode == StdioMode::Captured {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
    }

    let mut child = command.spawn().map_err(|e| spawn_error(program, e))?;

    // Drain pipes on their own threads so a chatty child cannot block on a full pipe.
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let waited = match deadline {
        Some(limit) => wait_with_deadline(&mut child, limit),
        None => child.wait().map(Some),
    };

    let output = CommandOutput {
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
    };

    let status = match waited {
        Ok(Some(status)) => status,
        Ok(None) => {
            log::warn!("{} timed out after {:?}", program, deadline.unwrap_or_default());
            return Err(AccessError::TimedOut {
                program: program.to_string(),
                after: deadline.unwrap_or_default(),
            });
        }
        Err(source) => {
            return Err(AccessError::Io {
                program: program.to_string(),
                source,
            });
        }
    };

    log::debug!("{} finished with {}", program, status);
    check_status(program, status, output)
}

fn check_status(
    program: &str,
    status: ExitStatus,
    output: CommandOutput,
) -> Result<CommandOutput, AccessError> {
    if status.success() {
        Ok(output)
    } else {
        Err(AccessError::rejected(program, status.code(), output.stderr))
    }
}

fn spawn_error(program: &str, e: io::Error) -> AccessError {
    if e.kind() == io::ErrorKind::NotFound {
        AccessError::ToolMissing {
            program: program.to_string(),
        }
    } else {
        AccessError::Io {
            program: program.to_string(),
            source: e,
        }
    }
}

/// Poll until the child exits or `limit` elapses. `Ok(None)` means it was killed.
fn wait_with_deadline(child: &mut Child, limit: Duration) -> io::Result<Option<ExitStatus>> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(limit.saturating_sub(started.elapsed())));
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            log::warn!("Error reading child output: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Shell-quoted rendering of a command line for logs and messages.
pub fn display_command<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let words: Vec<String> = std::iter::once(program.to_string())
        .chain(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()))
        .collect();
    shell_words::join(words)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_run_captures_stdout() {
        let output = run("sh", &os_args(&["-c", "echo hello"]), StdioMode::Captured, None).unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_reports_exit_code_and_stderr() {
        let err = run(
            "sh",
            &os_args(&["-c", "echo nope >&2; exit 3"]),
            StdioMode::Captured,
            None,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_run_missing_tool() {
        let err = run(
            "pi-link-definitely-not-a-real-binary",
            &[],
            StdioMode::Captured,
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), super::super::AccessErrorKind::ToolMissing);
    }

    #[test]
    fn test_run_deadline_kills_child() {
        let started = Instant::now();
        let err = run(
            "sh",
            &os_args(&["-c", "exec sleep 5"]),
            StdioMode::Captured,
            Some(Duration::from_millis(200)),
        )
        .unwrap_err();
        assert_eq!(err.kind(), super::super::AccessErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_display_command_quotes() {
        assert_eq!(
            display_command("ssh", &["-p", "22", "pi@h", "pgrep -f x"]),
            "ssh -p 22 pi@h 'pgrep -f x'"
        );
    }
}
