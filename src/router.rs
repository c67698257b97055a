//! Per-command dispatch. Every branch ends in an [`ExecutionResult`]; nothing
//! escapes as an error.

use crate::environment::Environment;
use crate::gate::{HeuristicGate, InputClassifier};
use crate::hack::{self, GAMES_ROOT, README_PATH, VICTORY_PATH};
use crate::hybrid::{FsResult, HybridFs};
use crate::interpreter::{CommandInterpretation, InterpretContext, Interpreter};
use crate::session::Session;
use crate::shell::{self, CommandResult, EXIT_BLOCKED};
use crate::vfs::{self, FsError};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CLEAR_SEQUENCE: &str = "\x1b[CLEAR]";
pub const REMOTE_NOTE: &str = "Note: This is a read-only demo environment. Download the desktop app for full terminal access.";
const CHALLENGE_NOTE: &str = "Note: You're inside the virtual challenge. Type 'cd ~' to get back to your real shell.";

/// Commands the router answers itself; they never go through interpretation.
const BUILTINS: &[&str] = &["help", "hint", "hack", "joke", "fortune", "clear"];

pub const BANNER: &str = "Hi, I'm Berto, your AI terminal!
Terminal for humans. Say what you want in plain English.

Try 'help', 'ls', 'hack' or 'cat welcome.txt' to get going.
";

pub const HELP: &str = "BERTO VIBE TERMINAL - HELP

FILES
  ls [-la] [path]          list a directory (-a shows hidden files)
  cat <file>               print a file
  echo \"text\" > <file>     write a file (>> appends)
  mkdir <dir>              create a directory
  touch <file>             create an empty file
  cd <dir>                 change directory (.., ~ and absolute paths work)
  pwd                      show where you are

FUN
  hack                     start the cyber hack challenge
  hint                     get a nudge while inside the challenge
  joke                     hear a programmer joke
  fortune                  get your fortune
  clear                    clear the screen

EASTER EGGS
  Hidden files lurk in your home directory, try 'ls -la'.
  /opt/retro and /tmp hold a few surprises.

JUST ASK
  You don't need exact commands. Try 'show me all files',
  'make a folder called projects' or 'what's in the readme?'.
";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
    pub current_working_directory: String,
    pub is_simulated: bool,
}

impl ExecutionResult {
    pub fn from_command(result: CommandResult, cwd: &str, is_simulated: bool) -> Self {
        ExecutionResult {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
            success: result.success,
            current_working_directory: cwd.to_string(),
            is_simulated,
        }
    }

    /// Uniform shape for anything that went wrong inside the engine.
    pub fn internal_error(cwd: &str) -> Self {
        ExecutionResult {
            stdout: String::new(),
            stderr: "Internal server error".into(),
            exit_code: 1,
            success: false,
            current_working_directory: cwd.to_string(),
            is_simulated: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("virtual filesystem: {0}")]
    Fs(#[from] FsError),
    #[error("challenge tree is missing {0}")]
    MissingChallenge(&'static str),
}

/// One command of a submission and its outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub command: String,
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Present when the input went through the language model.
    pub interpretation: Option<CommandInterpretation>,
    pub steps: Vec<Step>,
}

impl Submission {
    /// The friendly answer when nothing was executed.
    pub fn reply(&self) -> Option<&str> {
        match &self.interpretation {
            Some(i) if i.commands.is_empty() => Some(i.explanation.as_str()),
            _ => None,
        }
    }
}

static REDIRECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^echo\s+(.*?)\s*(>>?)\s*(\S+)$").expect("redirect pattern is valid"));

fn unquote(text: &str) -> &str {
    let t = text.trim();
    for q in ['"', '\''] {
        if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
            return &t[1..t.len() - 1];
        }
    }
    t
}

fn ok(stdout: impl Into<String>) -> CommandResult {
    CommandResult::ok(stdout)
}

fn fail(stderr: impl Into<String>, code: i32) -> CommandResult {
    CommandResult::failure(stderr, code)
}

fn from_fs(result: FsResult) -> CommandResult {
    if result.success {
        ok(result.content.unwrap_or_default())
    } else {
        CommandResult {
            stdout: result.content.unwrap_or_default(),
            stderr: result.error.unwrap_or_default(),
            exit_code: if result.exit_code == 0 { 1 } else { result.exit_code },
            success: false,
        }
    }
}

pub struct Router {
    env: Environment,
    interpreter: Interpreter,
    gate: Box<dyn InputClassifier>,
    recent_commands: usize,
}

impl Router {
    pub fn new(env: Environment, interpreter: Interpreter) -> Self {
        Router {
            env,
            interpreter,
            gate: Box::new(HeuristicGate::new()),
            recent_commands: 5,
        }
    }

    pub fn with_gate(mut self, gate: Box<dyn InputClassifier>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_recent_commands(mut self, n: usize) -> Self {
        self.recent_commands = n;
        self
    }

    pub fn environment(&self) -> Environment {
        self.env
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Served from the virtual tree rather than the real machine.
    fn simulated_at(&self, cwd: &str) -> bool {
        !self.env.can_access_local_files() || hack::is_challenge_path(cwd)
    }

    pub async fn route(&self, session: &mut Session, command: &str, working_directory: Option<&str>) -> ExecutionResult {
        self.try_route(session, command, working_directory)
            .await
            .unwrap_or_else(|internal| internal)
    }

    /// Like [`Router::route`], but an internal failure comes back as `Err`
    /// holding the uniform internal-error result.
    pub async fn try_route(
        &self,
        session: &mut Session,
        command: &str,
        working_directory: Option<&str>,
    ) -> Result<ExecutionResult, ExecutionResult> {
        if let Some(dir) = working_directory.filter(|d| !d.is_empty()) {
            session.shell.set_cwd(dir);
        }
        match self.dispatch(session, command.trim()).await {
            Ok((result, simulated)) => Ok(ExecutionResult::from_command(result, session.shell.cwd(), simulated)),
            Err(e) => {
                log::error!("routing `{}` failed: {}", command, e);
                Err(ExecutionResult::internal_error(session.shell.cwd()))
            }
        }
    }

    async fn dispatch(&self, session: &mut Session, command: &str) -> Result<(CommandResult, bool), RouteError> {
        let (program, rest) = match command.split_once(char::is_whitespace) {
            Some((p, r)) => (p, r.trim()),
            None => (command, ""),
        };
        let simulated = self.simulated_at(session.shell.cwd());
        log::debug!("route `{}` (simulated: {})", command, simulated);

        match program {
            "cat" => return self.cat(session, rest).await,
            "ls" => return self.ls(session, rest),
            "cd" => return Ok(self.cd(session, rest)),
            _ => {}
        }
        if let Some(caps) = REDIRECT.captures(command) {
            return Ok(self.redirect(session, command, &caps[1], &caps[2], &caps[3]));
        }
        match program {
            "help" => return Ok((ok(HELP), true)),
            "clear" => return Ok((ok(CLEAR_SEQUENCE), true)),
            "hint" => return Ok((ok(self.hint(session).await), true)),
            "hack" => return self.hack(session).await,
            "joke" | "fortune" => {
                let pool = if program == "joke" { vfs::JOKES } else { vfs::FORTUNES };
                let pick = pool.choose(&mut rand::thread_rng()).copied().unwrap_or_default();
                return Ok((ok(format!("{}\n", pick)), true));
            }
            _ => {}
        }

        if simulated {
            if let Some(result) = self.simulated_builtin(session, program, rest) {
                return Ok((result, true));
            }
            if let Err(violation) = shell::sanitize(command) {
                return Ok((fail(violation.to_string(), EXIT_BLOCKED), true));
            }
            let note = if self.env.can_access_local_files() { CHALLENGE_NOTE } else { REMOTE_NOTE };
            return Ok((fail(format!("bash: {}: command not found\n{}", program, note), 127), true));
        }
        Ok((session.shell.safe_execute(command), false))
    }

    async fn cat(&self, session: &mut Session, rest: &str) -> Result<(CommandResult, bool), RouteError> {
        let args: Vec<&str> = rest.split_whitespace().collect();
        let simulated = self.simulated_at(session.shell.cwd());
        match args.as_slice() {
            [] => Ok((fail("cat: missing operand", 1), simulated)),
            [single] => self.cat_one(session, single).await,
            _ if !simulated => Ok((session.shell.safe_execute(&format!("cat {}", rest)), false)),
            _ => {
                let mut combined = ok("");
                let mut errors = Vec::new();
                for arg in args {
                    let (part, _) = self.cat_one(session, arg).await?;
                    combined.stdout.push_str(&part.stdout);
                    if !part.success {
                        errors.push(part.stderr);
                    }
                }
                if !errors.is_empty() {
                    combined.stderr = errors.join("\n");
                    combined.exit_code = 1;
                    combined.success = false;
                }
                Ok((combined, true))
            }
        }
    }

    async fn cat_one(&self, session: &mut Session, arg: &str) -> Result<(CommandResult, bool), RouteError> {
        let full = HybridFs::resolve_path(arg, session.shell.cwd(), session.shell.home());
        if !hack::is_challenge_path(&full) {
            let result = session.fs.read_file(&mut session.shell, arg);
            let is_sim = result.is_simulated;
            return Ok((from_fs(result), is_sim));
        }

        if let Err(reason) = hack::check_entry(&full, &session.hack) {
            return Ok((fail(format!("cat: {}: {}", arg, reason), 1), true));
        }
        if full == README_PATH {
            return Ok((ok(self.interpreter.hack_readme().await), true));
        }
        if full == VICTORY_PATH {
            return Ok(match hack::read_victory(&mut session.hack) {
                Ok(text) => (ok(text), true),
                Err(denied) => (fail(denied, 1), true),
            });
        }
        let mut out = match session.fs.tree().read_file(&full) {
            Ok(c) => c.to_string(),
            Err(FsError::IsADirectory(_)) => return Ok((fail(format!("cat: {}: Is a directory", arg), 1), true)),
            Err(_) => return Ok((fail(format!("cat: {}: No such file or directory", arg), 1), true)),
        };
        if let Some(code) = hack::code_at(&full) {
            let fresh = session.hack.discover(code);
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&session.hack.status_line(code, fresh));
            out.push('\n');
        }
        Ok((ok(out), true))
    }

    fn ls(&self, session: &mut Session, rest: &str) -> Result<(CommandResult, bool), RouteError> {
        let (flags, paths): (Vec<&str>, Vec<&str>) = rest.split_whitespace().partition(|a| a.starts_with('-'));
        let show_hidden = flags.iter().any(|f| f.contains('a') || f.contains('A'));
        let long = flags.iter().any(|f| f.contains('l'));
        let path = paths.first().copied().unwrap_or("");
        let cwd = session.shell.cwd().to_string();
        let full = HybridFs::resolve_path(path, &cwd, session.shell.home());

        if hack::is_challenge_path(&full) {
            if let Err(reason) = hack::check_entry(&full, &session.hack) {
                return Ok((fail(format!("ls: cannot open directory '{}': {}", path, reason), 1), true));
            }
            let tree = session.fs.tree();
            match tree.resolve(&full) {
                Some(node) if node.is_dir() => {}
                Some(file) => {
                    let out = if long {
                        vfs::long_line(&file.permissions, &file.owner, &file.group, file.size, &file.modified, path)
                    } else {
                        path.to_string()
                    };
                    return Ok((ok(format!("{}\n", out)), true));
                }
                None => {
                    let shown = if path.is_empty() { "." } else { path };
                    return Ok((fail(format!("ls: cannot access '{}': No such file or directory", shown), 2), true));
                }
            }
            let entries = tree.entries(&full, show_hidden)?;
            let out = if long {
                let mut out = format!("total {}\n", entries.len());
                for e in entries {
                    out.push_str(&e.long_line());
                    out.push('\n');
                }
                out
            } else {
                let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
                format!("{}\n", names.join("  "))
            };
            return Ok((ok(out), true));
        }

        if !self.simulated_at(&cwd) {
            // real ls keeps the user's flags and globs
            let command = if rest.is_empty() { "ls".to_string() } else { format!("ls {}", rest) };
            return Ok((session.shell.safe_execute(&command), false));
        }
        let result = session.fs.list_directory(&mut session.shell, path, show_hidden);
        Ok((from_fs(result), true))
    }

    fn cd(&self, session: &mut Session, target: &str) -> (CommandResult, bool) {
        let cwd = session.shell.cwd().to_string();
        let home = session.shell.home().to_string();
        let shown = if target.is_empty() { "~" } else { target };

        let resolved = hack::transition(&cwd, target).unwrap_or_else(|| {
            if target.is_empty() {
                home.clone()
            } else {
                HybridFs::resolve_path(target, &cwd, &home)
            }
        });

        if hack::is_challenge_path(&resolved) {
            if let Err(reason) = hack::check_entry(&resolved, &session.hack) {
                return (fail(format!("cd: {}: {}", shown, reason), 1), true);
            }
            if !session.fs.tree().is_dir(&resolved) {
                return (fail(format!("cd: {}: No such file or directory", shown), 1), true);
            }
            session.shell.set_cwd(&resolved);
            return (ok(""), true);
        }

        if !self.env.can_access_local_files() {
            if !session.fs.tree().is_dir(&resolved) {
                return (fail(format!("cd: {}: No such file or directory", shown), 1), true);
            }
            session.shell.set_cwd(&resolved);
            return (ok(""), true);
        }

        // leaving the virtual challenge hands an absolute path to the real shell
        let arg = if hack::is_challenge_path(&cwd) { resolved.as_str() } else { target };
        (session.shell.safe_execute(&format!("cd {}", arg)), false)
    }

    fn redirect(&self, session: &mut Session, command: &str, text: &str, op: &str, path: &str) -> (CommandResult, bool) {
        if let Some(denied) = Self::challenge_write(session, "echo", path) {
            return (denied, true);
        }
        let text = unquote(text);
        if !session.fs.is_simulated() {
            if op == ">>" {
                return (session.shell.safe_execute(command), false);
            }
            return (from_fs(session.fs.create_file(&mut session.shell, path, text)), false);
        }
        let existing = if op == ">>" {
            session.fs.read_file(&mut session.shell, path).content.unwrap_or_default()
        } else {
            String::new()
        };
        let result = session.fs.create_file(&mut session.shell, path, &format!("{}{}\n", existing, text));
        (from_fs(result), true)
    }

    /// The challenge tree is read-only whatever the mode.
    fn challenge_write(session: &Session, program: &str, path: &str) -> Option<CommandResult> {
        let full = HybridFs::resolve_path(path, session.shell.cwd(), session.shell.home());
        hack::is_challenge_path(&full)
            .then(|| fail(format!("{}: cannot write '{}': Permission denied", program, path), 1))
    }

    async fn hint(&self, session: &Session) -> String {
        if hack::is_challenge_path(session.shell.cwd()) {
            format!("{}\n", self.interpreter.hack_hint(&session.hack).await)
        } else {
            "No hints out here. Type 'hack' to start the challenge!\n".to_string()
        }
    }

    async fn hack(&self, session: &mut Session) -> Result<(CommandResult, bool), RouteError> {
        if !session.fs.tree().is_dir(GAMES_ROOT) {
            return Err(RouteError::MissingChallenge(GAMES_ROOT));
        }
        let intro = self.interpreter.hack_intro().await;
        session.hack.start();
        session.shell.set_cwd(GAMES_ROOT);
        Ok((ok(hack::briefing(&intro)), true))
    }

    fn simulated_builtin(&self, session: &mut Session, program: &str, rest: &str) -> Option<CommandResult> {
        let result = match program {
            "pwd" => ok(format!("{}\n", session.shell.cwd())),
            "whoami" => ok(format!("{}\n", session.shell.env.get("USER").cloned().unwrap_or_default())),
            "hostname" => ok(format!("{}\n", session.shell.env.get("HOSTNAME").cloned().unwrap_or_default())),
            "date" => ok(format!("{}\n", chrono::Utc::now().format("%a %b %e %H:%M:%S UTC %Y"))),
            "echo" => ok(format!("{}\n", unquote(rest))),
            "mkdir" | "touch" => {
                let targets: Vec<&str> = rest.split_whitespace().filter(|a| !a.starts_with('-')).collect();
                if targets.is_empty() {
                    return Some(fail(format!("{}: missing operand", program), 1));
                }
                let mut errors = Vec::new();
                for target in targets {
                    if let Some(denied) = Self::challenge_write(session, program, target) {
                        errors.push(denied.stderr);
                        continue;
                    }
                    let result = if program == "mkdir" {
                        session.fs.create_dir(&mut session.shell, target)
                    } else if session.fs.read_file(&mut session.shell, target).success {
                        continue;
                    } else {
                        session.fs.create_file(&mut session.shell, target, "")
                    };
                    if let Some(e) = result.error {
                        errors.push(e);
                    }
                }
                if errors.is_empty() {
                    ok("")
                } else {
                    fail(errors.join("\n"), 1)
                }
            }
            _ => return None,
        };
        Some(result)
    }

    fn context(&self, session: &Session) -> InterpretContext {
        let cwd = session.shell.cwd();
        let mut directory_contents: Vec<String> = if self.simulated_at(cwd) {
            session
                .fs
                .tree()
                .entries(cwd, true)
                .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
                .unwrap_or_default()
        } else {
            std::fs::read_dir(cwd)
                .map(|dir| {
                    dir.filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default()
        };
        directory_contents.sort();
        InterpretContext {
            current_directory: cwd.to_string(),
            directory_contents,
            recent_commands: session.recent(self.recent_commands).to_vec(),
        }
    }

    /// Full pipeline for one line of user input: gate, optional
    /// interpretation, then each resulting command in order. Stops at the
    /// first failing step.
    pub async fn submit(&self, session: &mut Session, input: &str) -> Submission {
        let input = input.trim();
        if input.is_empty() {
            return Submission::default();
        }
        let first = input.split_whitespace().next().unwrap_or_default();
        let builtin = BUILTINS.contains(&first.to_lowercase().as_str());

        let mut submission = Submission::default();
        let commands = if !builtin && self.gate.should_interpret(input) {
            let context = self.context(session);
            let interpretation = self.interpreter.interpret(input, Some(&context)).await;
            let commands = interpretation.commands.clone();
            submission.interpretation = Some(interpretation);
            commands
        } else {
            vec![input.to_string()]
        };
        session.record(input);

        for command in commands {
            let result = self.route(session, &command, None).await;
            let failed = !result.success;
            submission.steps.push(Step { command, result });
            if failed {
                break;
            }
        }
        submission
    }
}
