// SPDX-License-Identifier: MIT OR Apache-2.0
//! Allowlisted subprocess sandbox.
//!
//! [`run_allowed`] is the only way the kernel spawns a child process: the
//! executable must resolve to a basename present in an explicit allowlist,
//! the environment starts empty and is rebuilt key-by-key, output and wall
//! time are hard-capped with SIGKILL on overflow, and the working directory
//! is contained by realpath comparison rather than trusted as given. The
//! kernel never shells out — `tokio::process::Command` is always invoked
//! with an explicit argv, never a shell string.

#![deny(unsafe_code)]

pub mod constraints;
pub mod cwd;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use ak_error::{AkError, ErrorCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

pub use constraints::check_exec_constraints;
pub use cwd::contain_cwd;

/// Default output caps and timeouts (§4.6).
pub const DEFAULT_MAX_STDOUT_BYTES: usize = 1_048_576;
pub const DEFAULT_MAX_STDERR_BYTES: usize = 512_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const HARD_TIMEOUT_MS: u64 = 600_000;

/// Environment variables copied through from the parent process when
/// present, subject to `env_overrides` on top.
pub fn default_allow_env() -> HashSet<String> {
    [
        "PATH",
        "HOME",
        "USERPROFILE",
        "APPDATA",
        "LOCALAPPDATA",
        "TMPDIR",
        "TMP",
        "TEMP",
        "SYSTEMROOT",
        "WINDIR",
        "COMSPEC",
        "PATHEXT",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Variables stripped from the child environment no matter what the
/// allowlist or overrides say.
pub const FORCE_STRIPPED_ENV: &[&str] =
    &["NODE_OPTIONS", "LD_PRELOAD", "DYLD_INSERT_LIBRARIES", "DYLD_LIBRARY_PATH"];

/// Configuration for one sandboxed invocation.
#[derive(Clone, Debug)]
pub struct SandboxOptions {
    pub allowed_bins: HashSet<String>,
    pub allow_env: HashSet<String>,
    pub env_overrides: BTreeMap<String, String>,
    pub max_stdout_bytes: usize,
    pub max_stderr_bytes: usize,
    pub timeout_ms: u64,
    pub allow_absolute_path: bool,
    pub allow_interpreter_argv: bool,
    pub workspace_root: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub input: Option<Vec<u8>>,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            allowed_bins: HashSet::new(),
            allow_env: default_allow_env(),
            env_overrides: BTreeMap::new(),
            max_stdout_bytes: DEFAULT_MAX_STDOUT_BYTES,
            max_stderr_bytes: DEFAULT_MAX_STDERR_BYTES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            allow_absolute_path: false,
            allow_interpreter_argv: false,
            workspace_root: None,
            cwd: None,
            input: None,
        }
    }
}

/// The outcome of a completed (non-killed) subprocess invocation.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Normalize a supplied command name to its allowlist-comparable basename:
/// lower-cased, with a trailing `.exe`/`.cmd`/`.bat` stripped. Rejects any
/// command containing a path separator unless `allow_absolute_path`.
pub fn normalize_command(command: &str, allow_absolute_path: bool) -> Result<String, AkError> {
    if (command.contains('/') || command.contains('\\')) && !allow_absolute_path {
        return Err(AkError::new(ErrorCode::ExecBlocked, "command must be a bare executable name")
            .with_context("command", command));
    }
    let base = Path::new(command).file_name().and_then(|s| s.to_str()).unwrap_or(command);
    let mut lower = base.to_lowercase();
    for suffix in [".exe", ".cmd", ".bat"] {
        if let Some(stripped) = lower.strip_suffix(suffix) {
            lower = stripped.to_string();
            break;
        }
    }
    Ok(lower)
}

fn build_env(
    allow_env: &HashSet<String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for (key, value) in std::env::vars() {
        let allowed = allow_env.contains(&key) || (key.starts_with("XDG_") && allow_env.iter().any(|k| k == "XDG_*"));
        if allowed {
            env.insert(key, value);
        }
    }
    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }
    for forced in FORCE_STRIPPED_ENV {
        env.remove(*forced);
    }
    env
}

/// Spawn `command` with `args` under the given sandbox options, enforcing
/// the allowlist, environment scrub, I/O caps, and timeout cap. Never
/// invokes a shell; `command`/`args` are passed directly as argv.
pub async fn run_allowed(
    command: &str,
    args: &[String],
    opts: &SandboxOptions,
) -> Result<RunOutcome, AkError> {
    let normalized = normalize_command(command, opts.allow_absolute_path)?;
    if !opts.allowed_bins.contains(&normalized) {
        return Err(AkError::new(ErrorCode::ExecBlocked, "executable is not in the allowlist")
            .with_context("command", command.to_string())
            .with_context("normalized", normalized));
    }
    check_exec_constraints(&normalized, args, opts.allow_interpreter_argv)?;

    let cwd = match (&opts.cwd, &opts.workspace_root) {
        (Some(cwd), Some(root)) => Some(contain_cwd(cwd, root)?),
        (Some(cwd), None) => Some(cwd.clone()),
        (None, _) => None,
    };

    let env = build_env(&opts.allow_env, &opts.env_overrides);
    let timeout_ms = opts.timeout_ms.min(HARD_TIMEOUT_MS);

    let mut cmd = Command::new(command);
    cmd.args(args);
    cmd.env_clear();
    cmd.envs(&env);
    if let Some(cwd) = &cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdin(if opts.input.is_some() { Stdio::piped() } else { Stdio::null() });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        AkError::new(ErrorCode::ExecBlocked, "failed to spawn subprocess")
            .with_context("command", command.to_string())
            .with_source(e)
    })?;

    if let Some(input) = &opts.input {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(input).await;
        }
    }

    let mut stdout = child.stdout.take().expect("stdout is piped");
    let mut stderr = child.stderr.take().expect("stderr is piped");

    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out_done = false;
    let mut err_done = false;
    let mut chunk = [0u8; 8192];
    let mut exceeded: Option<ErrorCode> = None;

    let deadline = tokio::time::sleep(Duration::from_millis(timeout_ms));
    tokio::pin!(deadline);

    loop {
        if out_done && err_done {
            break;
        }
        tokio::select! {
            biased;
            () = &mut deadline => {
                exceeded = Some(ErrorCode::ExecTimeout);
                break;
            }
            n = stdout.read(&mut chunk), if !out_done => {
                match n {
                    Ok(0) | Err(_) => out_done = true,
                    Ok(n) => {
                        out_buf.extend_from_slice(&chunk[..n]);
                        if out_buf.len() > opts.max_stdout_bytes {
                            exceeded = Some(ErrorCode::ExecOutputExceeded);
                            break;
                        }
                    }
                }
            }
            n = stderr.read(&mut chunk), if !err_done => {
                match n {
                    Ok(0) | Err(_) => err_done = true,
                    Ok(n) => {
                        err_buf.extend_from_slice(&chunk[..n]);
                        if err_buf.len() > opts.max_stderr_bytes {
                            exceeded = Some(ErrorCode::ExecOutputExceeded);
                            break;
                        }
                    }
                }
            }
        }
    }

    if let Some(code) = exceeded {
        let _ = child.start_kill();
        let _ = child.wait().await;
        tracing::warn!(target: "ak.sandbox", command, ?code, "subprocess killed");
        return Err(AkError::new(code, "subprocess exceeded its resource cap")
            .with_context("command", command.to_string()));
    }

    let status = child.wait().await.map_err(|e| {
        AkError::new(ErrorCode::ExecBlocked, "failed waiting on subprocess").with_source(e)
    })?;

    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal = None;

    Ok(RunOutcome { code: status.code(), signal, stdout: out_buf, stderr: err_buf })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_extension_and_lowercases() {
        assert_eq!(normalize_command("LS.EXE", true).unwrap(), "ls");
        assert_eq!(normalize_command("Python3.CMD", true).unwrap(), "python3");
    }

    #[test]
    fn normalize_rejects_path_separators_by_default() {
        assert!(normalize_command("/bin/sh", false).is_err());
        assert!(normalize_command("..\\evil.exe", false).is_err());
    }

    #[test]
    fn normalize_allows_path_when_explicit() {
        assert!(normalize_command("/bin/ls", true).is_ok());
    }

    #[test]
    fn build_env_strips_forced_vars_even_if_allowlisted() {
        let mut allow = default_allow_env();
        allow.insert("NODE_OPTIONS".to_string());
        let mut overrides = BTreeMap::new();
        overrides.insert("NODE_OPTIONS".to_string(), "--inspect".to_string());
        let env = build_env(&allow, &overrides);
        assert!(!env.contains_key("NODE_OPTIONS"));
    }

    #[tokio::test]
    async fn rejects_unlisted_executable() {
        let opts = SandboxOptions::default();
        let err = run_allowed("ls", &[], &opts).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ExecBlocked);
    }

    #[tokio::test]
    async fn runs_allowlisted_executable_and_captures_stdout() {
        let mut opts = SandboxOptions::default();
        opts.allowed_bins.insert("echo".to_string());
        let outcome =
            run_allowed("echo", &["hello".to_string()], &opts).await.expect("echo should run");
        assert_eq!(outcome.code, Some(0));
        assert!(String::from_utf8_lossy(&outcome.stdout).contains("hello"));
    }

    #[tokio::test]
    async fn exceeding_stdout_cap_kills_and_fails() {
        let mut opts = SandboxOptions::default();
        opts.allowed_bins.insert("yes".to_string());
        opts.max_stdout_bytes = 16;
        opts.timeout_ms = 5_000;
        let err = run_allowed("yes", &[], &opts).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ExecOutputExceeded);
    }

    #[tokio::test]
    async fn exceeding_timeout_kills_and_fails() {
        let mut opts = SandboxOptions::default();
        opts.allowed_bins.insert("sleep".to_string());
        opts.timeout_ms = 50;
        let err = run_allowed("sleep", &["5".to_string()], &opts).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ExecTimeout);
    }
}
