//! Real command execution with a tracked working directory.

use crate::config::Config;
use crate::vfs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const EXIT_TIMEOUT: i32 = 124;
pub const EXIT_BLOCKED: i32 = 126;

/// Substrings that are never allowed to reach a real shell.
const DANGEROUS: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "mkfs",
    "dd if=",
    "of=/dev/sd",
    "> /dev/sd",
    "fdisk",
    "parted",
    ":(){ :|:& };:",
    "sudo rm",
    "sudo dd",
    "sudo mkfs",
    "sudo fdisk",
    "shutdown",
    "reboot",
    "halt",
    "poweroff",
    "init 0",
    "init 6",
];

const SENSITIVE_FILES: &[&str] = &["/etc/passwd", "/etc/shadow", "/etc/sudoers"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

impl CommandResult {
    pub fn ok(stdout: impl Into<String>) -> Self {
        CommandResult {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            success: true,
        }
    }

    pub fn failure(stderr: impl Into<String>, exit_code: i32) -> Self {
        CommandResult {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            success: false,
        }
    }

    pub fn with_stdout(mut self, stdout: String) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.success {
            return None;
        }
        Some(match self.exit_code {
            EXIT_BLOCKED => FailureKind::Blocked,
            EXIT_TIMEOUT => FailureKind::Timeout,
            1 if self.stderr.starts_with("cd: ") => FailureKind::NoSuchDirectory,
            0 => FailureKind::Internal,
            _ => FailureKind::NonZeroExit,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Blocked,
    NoSuchDirectory,
    Timeout,
    NonZeroExit,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Dangerous command detected: \"{0}\". This command is blocked for safety.")]
    Dangerous(&'static str),
    #[error("Access to sensitive system files is restricted.")]
    SensitiveFile(&'static str),
}

/// Case-insensitive substring check against the denylist.
pub fn sanitize(command: &str) -> Result<(), PolicyViolation> {
    let cmd = command.trim().to_lowercase();
    if let Some(p) = DANGEROUS.iter().find(|p| cmd.contains(*p)) {
        return Err(PolicyViolation::Dangerous(p));
    }
    if let Some(f) = SENSITIVE_FILES.iter().find(|f| cmd.contains(*f)) {
        return Err(PolicyViolation::SensitiveFile(f));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub working_directory: Option<String>,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        ExecOptions {
            working_directory: None,
            timeout_ms: crate::config::DEFAULT_TIMEOUT_MS,
            max_output_bytes: crate::config::DEFAULT_MAX_OUTPUT,
        }
    }
}

impl ExecOptions {
    pub fn from_config(config: &Config) -> Self {
        ExecOptions {
            working_directory: None,
            timeout_ms: config.command_timeout_ms,
            max_output_bytes: config.max_output_bytes,
        }
    }
}

/// The process-spawning primitive, split out so tests can observe it.
pub trait CommandRunner {
    fn run(&self, command: &str, cwd: &str, timeout: Duration, max_output: usize) -> CommandResult;
    fn is_dir(&self, path: &str) -> bool;
}

/// Runs commands through the platform shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[cfg(not(target_arch = "wasm32"))]
mod os {
    use super::{CommandResult, EXIT_TIMEOUT};
    use std::io::Read;
    use std::process::{Child, Command, Stdio};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    fn shell_command(command: &str) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    }

    /// How long to wait for a pipe reader once the child is gone. A detached
    /// grandchild can keep the pipe open forever.
    const EXIT_GRACE: Duration = Duration::from_millis(1000);
    const KILL_GRACE: Duration = Duration::from_millis(100);

    struct Drain {
        buf: Arc<Mutex<Vec<u8>>>,
        handle: JoinHandle<()>,
    }

    impl Drain {
        /// Whatever was read so far. Only joins a reader that already finished.
        fn collect(self, grace: Duration) -> Vec<u8> {
            let deadline = Instant::now() + grace;
            while !self.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if self.handle.is_finished() {
                let _ = self.handle.join();
            } else {
                log::warn!("abandoning output reader held open by a detached process");
            }
            let out = self.buf.lock().map(|b| b.clone()).unwrap_or_default();
            out
        }
    }

    fn drain<R: Read + Send + 'static>(source: Option<R>, cap: usize, overflow: Arc<AtomicBool>) -> Drain {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let handle = thread::spawn(move || {
            let Some(mut source) = source else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match source.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let Ok(mut buf) = sink.lock() else {
                            break;
                        };
                        let room = cap.saturating_sub(buf.len());
                        buf.extend_from_slice(&chunk[..n.min(room)]);
                        if n > room {
                            overflow.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }
            }
        });
        Drain { buf, handle }
    }

    /// Kill the child and everything it spawned.
    fn kill_tree(child: &mut Child) {
        #[cfg(unix)]
        unsafe {
            // the child leads its own process group
            libc::kill(-(child.id() as libc::pid_t), libc::SIGKILL);
        }
        let _ = child.kill();
        let _ = child.wait();
    }

    enum Outcome {
        Exited(i32),
        TimedOut,
        Overflow,
        Failed(String),
    }

    pub fn run(command: &str, cwd: &str, timeout: Duration, max_output: usize) -> CommandResult {
        let mut cmd = shell_command(command);
        cmd.current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return CommandResult::failure(e.to_string(), 1),
        };
        let overflow = Arc::new(AtomicBool::new(false));
        let out = drain(child.stdout.take(), max_output, overflow.clone());
        let err = drain(child.stderr.take(), max_output, overflow.clone());

        let deadline = Instant::now() + timeout;
        let outcome = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Outcome::Exited(status.code().unwrap_or(1)),
                Ok(None) if overflow.load(Ordering::SeqCst) => {
                    kill_tree(&mut child);
                    break Outcome::Overflow;
                }
                Ok(None) if Instant::now() >= deadline => {
                    kill_tree(&mut child);
                    break Outcome::TimedOut;
                }
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    kill_tree(&mut child);
                    break Outcome::Failed(e.to_string());
                }
            }
        };

        let grace = match outcome {
            Outcome::Exited(_) => EXIT_GRACE,
            _ => KILL_GRACE,
        };
        let stdout = String::from_utf8_lossy(&out.collect(grace)).into_owned();
        let stderr = String::from_utf8_lossy(&err.collect(grace)).into_owned();
        let outcome = match outcome {
            Outcome::Exited(_) if overflow.load(Ordering::SeqCst) => Outcome::Overflow,
            other => other,
        };

        match outcome {
            Outcome::Exited(0) => CommandResult {
                stdout,
                stderr,
                exit_code: 0,
                success: true,
            },
            Outcome::Exited(code) => CommandResult {
                stdout,
                stderr,
                exit_code: code,
                success: false,
            },
            Outcome::TimedOut => CommandResult::failure(
                format!("Command timed out after {}ms", timeout.as_millis()),
                EXIT_TIMEOUT,
            )
            .with_stdout(stdout),
            Outcome::Overflow => {
                CommandResult::failure("stdout maxBuffer length exceeded", 1).with_stdout(stdout)
            }
            Outcome::Failed(msg) => CommandResult::failure(msg, 1).with_stdout(stdout),
        }
    }
}

impl CommandRunner for SystemRunner {
    #[cfg(not(target_arch = "wasm32"))]
    fn run(&self, command: &str, cwd: &str, timeout: Duration, max_output: usize) -> CommandResult {
        os::run(command, cwd, timeout, max_output)
    }

    #[cfg(target_arch = "wasm32")]
    fn run(&self, _command: &str, _cwd: &str, _timeout: Duration, _max_output: usize) -> CommandResult {
        CommandResult::failure("process execution is not available in the browser", 1)
    }

    fn is_dir(&self, path: &str) -> bool {
        std::path::Path::new(path).is_dir()
    }
}

pub struct ShellExecutor {
    cwd: String,
    pub env: HashMap<String, String>,
    defaults: ExecOptions,
    runner: Box<dyn CommandRunner>,
}

impl ShellExecutor {
    pub fn new(cwd: &str, home: &str, defaults: ExecOptions, runner: Box<dyn CommandRunner>) -> Self {
        let mut env = HashMap::new();
        env.insert("HOME".into(), home.to_string());
        env.insert("USER".into(), "vibe-user".into());
        env.insert("HOSTNAME".into(), "vibe-terminal".into());
        ShellExecutor {
            cwd: cwd.to_string(),
            env,
            defaults,
            runner,
        }
    }

    /// Executor for the real machine: starts in the process cwd.
    pub fn local(config: &Config) -> Self {
        let cwd = std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| config.home_dir.clone());
        let home = std::env::var("HOME").unwrap_or_else(|_| config.home_dir.clone());
        Self::new(&cwd, &home, ExecOptions::from_config(config), Box::new(SystemRunner))
    }

    /// Executor for the simulated tree: starts at the virtual home.
    pub fn remote(config: &Config) -> Self {
        Self::new(
            &config.home_dir,
            &config.home_dir,
            ExecOptions::from_config(config),
            Box::new(SystemRunner),
        )
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn home(&self) -> &str {
        self.env.get("HOME").map(|h| h.as_str()).unwrap_or("/")
    }

    /// Resolve `target` the way `cd` would, without touching state.
    pub fn resolve(&self, target: &str) -> String {
        resolve_against(&self.cwd, self.home(), target)
    }

    pub fn set_cwd(&mut self, path: &str) {
        self.cwd = self.resolve(path);
    }

    fn change_directory(&mut self, target: &str, base: &str) -> CommandResult {
        let target = if target.is_empty() { "~" } else { target };
        let resolved = resolve_against(base, self.home(), target);
        if self.runner.is_dir(&resolved) {
            self.cwd = resolved;
            CommandResult::ok("")
        } else {
            CommandResult::failure(format!("cd: {}: No such file or directory", target), 1)
        }
    }

    /// Run `command` behind the denylist. `cd` is handled in-process.
    pub fn execute(&mut self, command: &str, options: &ExecOptions) -> CommandResult {
        if let Err(violation) = sanitize(command) {
            log::warn!("blocked `{}`: {}", command, violation);
            return CommandResult::failure(violation.to_string(), EXIT_BLOCKED);
        }
        let base = options
            .working_directory
            .clone()
            .unwrap_or_else(|| self.cwd.clone());
        let trimmed = command.trim();
        if trimmed == "cd" || trimmed.starts_with("cd ") {
            return self.change_directory(trimmed[2..].trim(), &base);
        }

        log::info!("exec `{}` in {}", trimmed, base);
        self.runner.run(
            trimmed,
            &base,
            Duration::from_millis(options.timeout_ms),
            options.max_output_bytes,
        )
    }

    /// [`ShellExecutor::execute`] with the executor's default options.
    pub fn safe_execute(&mut self, command: &str) -> CommandResult {
        let options = self.defaults.clone();
        self.execute(command, &options)
    }
}

fn resolve_against(base: &str, home: &str, target: &str) -> String {
    let expanded = if target == "~" {
        home.to_string()
    } else if let Some(rest) = target.strip_prefix("~/") {
        format!("{}/{}", home.trim_end_matches('/'), rest)
    } else {
        target.to_string()
    };
    if cfg!(windows) {
        return std::path::Path::new(base)
            .join(expanded)
            .to_string_lossy()
            .into_owned();
    }
    vfs::normalize(base, &expanded)
}

/// `user@vibe:~/dir$ ` style prompt.
pub fn prompt(cwd: &str, home: &str) -> String {
    let display = if cwd == home {
        "~".to_string()
    } else if let Some(rest) = cwd.strip_prefix(&format!("{}/", home.trim_end_matches('/'))) {
        format!("~/{}", rest)
    } else {
        cwd.to_string()
    };
    format!("user@vibe:{}$ ", display)
}


#[cfg(test)]
mod tests {
    use super::testing::spy_executor;
    use super::*;

    #[test]
    fn test_denylist_blocks_every_pattern() {
        for pattern in DANGEROUS.iter().chain(SENSITIVE_FILES.iter()) {
            let (mut exec, spy) = spy_executor("/home/user", &[]);
            let cmd = format!("echo x; {}", pattern.to_uppercase());
            let result = exec.safe_execute(&cmd);
            assert_eq!(result.exit_code, 126, "{cmd}");
            assert!(!result.success);
            assert_eq!(result.failure_kind(), Some(FailureKind::Blocked));
            assert!(spy.commands().is_empty(), "{cmd} reached the runner");

            let opts = ExecOptions {
                timeout_ms: 5_000,
                max_output_bytes: 64,
                working_directory: Some("/tmp".into()),
            };
            let direct = exec.execute(&cmd, &opts);
            assert_eq!(direct.exit_code, 126, "{cmd}");
            assert!(spy.commands().is_empty(), "{cmd} reached the runner via execute");
        }
    }

    #[test]
    fn test_rm_rf_root_is_rejected() {
        let (mut exec, spy) = spy_executor("/home/user", &[]);
        let result = exec.safe_execute("rm -rf /");
        assert_eq!(result.exit_code, 126);
        assert!(result.stderr.contains("rm -rf /"));
        assert!(spy.commands().is_empty());
    }

    #[test]
    fn test_sensitive_file_message() {
        assert_eq!(
            sanitize("cat /etc/shadow").unwrap_err().to_string(),
            "Access to sensitive system files is restricted."
        );
        assert!(sanitize("ls -la").is_ok());
    }

    #[test]
    fn test_safe_command_reaches_runner() {
        let (mut exec, spy) = spy_executor("/srv", &[]);
        *spy.reply.borrow_mut() = CommandResult::ok("a\nb\n");
        let result = exec.safe_execute("ls");
        assert_eq!(result.stdout, "a\nb\n");
        assert_eq!(spy.calls.borrow()[0], ("ls".to_string(), "/srv".to_string()));
    }

    #[test]
    fn test_cd_updates_cwd() {
        let (mut exec, spy) = spy_executor("/home/user", &["/home/user/projects", "/tmp", "/home"]);
        assert!(exec.safe_execute("cd projects").success);
        assert_eq!(exec.cwd(), "/home/user/projects");
        assert!(exec.safe_execute("cd ../..").success);
        assert_eq!(exec.cwd(), "/home");
        assert!(exec.safe_execute("cd /tmp").success);
        assert_eq!(exec.cwd(), "/tmp");
        assert!(spy.commands().is_empty());
    }

    #[test]
    fn test_cd_home_defaults() {
        let (mut exec, _) = spy_executor("/tmp", &["/home/user", "/home/user/docs"]);
        assert!(exec.safe_execute("cd").success);
        assert_eq!(exec.cwd(), "/home/user");
        exec.set_cwd("/tmp");
        assert!(exec.safe_execute("cd ~/docs").success);
        assert_eq!(exec.cwd(), "/home/user/docs");
    }

    #[test]
    fn test_cd_missing_directory() {
        let (mut exec, _) = spy_executor("/home/user", &[]);
        let result = exec.safe_execute("cd nowhere");
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, "cd: nowhere: No such file or directory");
        assert_eq!(result.failure_kind(), Some(FailureKind::NoSuchDirectory));
        assert_eq!(exec.cwd(), "/home/user");
    }

    #[test]
    fn test_explicit_working_directory() {
        let (mut exec, spy) = spy_executor("/home/user", &[]);
        let opts = ExecOptions {
            working_directory: Some("/opt".into()),
            ..ExecOptions::default()
        };
        exec.execute("pwd", &opts);
        assert_eq!(spy.calls.borrow()[0].1, "/opt");
        assert_eq!(exec.cwd(), "/home/user");
    }

    #[test]
    fn test_set_cwd_is_relative() {
        let (mut exec, _) = spy_executor("/home/user", &[]);
        exec.set_cwd("../other/./x/..");
        assert_eq!(exec.cwd(), "/home/other");
    }

    #[test]
    fn test_prompt() {
        assert_eq!(prompt("/home/user", "/home/user"), "user@vibe:~$ ");
        assert_eq!(prompt("/home/user/docs", "/home/user"), "user@vibe:~/docs$ ");
        assert_eq!(prompt("/var/games", "/home/user"), "user@vibe:/var/games$ ");
    }

    #[cfg(unix)]
    #[test]
    fn test_real_exit_codes_and_streams() {
        let result = SystemRunner.run("echo hi; echo oops 1>&2; exit 3", "/", Duration::from_secs(5), 1024);
        assert_eq!(result.stdout, "hi\n");
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.failure_kind(), Some(FailureKind::NonZeroExit));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_and_keeps_cwd() {
        let mut exec = ShellExecutor::new("/", "/", ExecOptions::default(), Box::new(SystemRunner));
        let opts = ExecOptions {
            timeout_ms: 200,
            ..ExecOptions::default()
        };
        let started = std::time::Instant::now();
        let result = exec.execute("echo partial; sleep 10", &opts);
        assert_eq!(result.exit_code, 124);
        assert_eq!(result.stderr, "Command timed out after 200ms");
        assert_eq!(result.stdout, "partial\n");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(exec.cwd(), "/");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_ignores_detached_pipe_holder() {
        let has_setsid = std::process::Command::new("setsid")
            .arg("true")
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !has_setsid {
            return;
        }
        let started = std::time::Instant::now();
        let result = SystemRunner.run("setsid sleep 8 & echo started; sleep 10", "/", Duration::from_millis(200), 1000);
        assert_eq!(result.exit_code, 124);
        assert_eq!(result.stdout, "started\n");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_cap() {
        let result = SystemRunner.run("yes hello", "/", Duration::from_secs(10), 1000);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, "stdout maxBuffer length exceeded");
        assert_eq!(result.stdout.len(), 1000);
    }
}
