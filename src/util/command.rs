use std::io;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Flags whose following argument must never reach the logs.
const SECRET_FLAGS: [&str; 3] = ["--password", "--secret-access-key", "--access-key"];

/// Failure of an external command, carrying what the operator needs to act on it.
#[derive(Debug, Error)]
pub enum CommandFailure {
    #[error("{program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with code {code}{}", stderr_suffix(.stderr))]
    Exited {
        program: String,
        code: i32,
        stderr: String,
    },
    #[error("{program} was terminated by a signal{}", stderr_suffix(.stderr))]
    Signalled { program: String, stderr: String },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

pub fn describe_command(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    let mut redact_next = false;
    for arg in cmd.get_args() {
        let arg = arg.to_string_lossy();
        if redact_next {
            parts.push("***".to_string());
            redact_next = false;
            continue;
        }
        redact_next = SECRET_FLAGS.contains(&arg.as_ref());
        parts.push(arg.to_string());
    }
    parts.join(" ")
}

/// Runs `cmd` to completion and returns its stdout. A non-zero exit is the only
/// failure signal; stderr is attached to the error.
pub fn run_capture(cmd: &mut Command) -> Result<String, CommandFailure> {
    let program = cmd.get_program().to_string_lossy().to_string();
    debug!(command = %describe_command(cmd), "exec");
    let output = cmd.output().map_err(|source| CommandFailure::Spawn {
        program: program.clone(),
        source,
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(match output.status.code() {
            Some(code) => CommandFailure::Exited {
                program,
                code,
                stderr,
            },
            None => CommandFailure::Signalled { program, stderr },
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Runs `cmd` and reports only whether it exited successfully.
pub fn run_quiet(cmd: &mut Command) -> bool {
    debug!(command = %describe_command(cmd), "exec");
    cmd.output().map(|o| o.status.success()).unwrap_or(false)
}
