use crate::config::Config;
use crate::environment::Environment;
use crate::hack::HackProgress;
use crate::hybrid::HybridFs;
use crate::shell::ShellExecutor;
use std::collections::HashMap;

pub const DEFAULT_SESSION: &str = "default";
const HISTORY_LIMIT: usize = 500;

/// Everything one terminal user mutates.
pub struct Session {
    pub shell: ShellExecutor,
    pub fs: HybridFs,
    pub hack: HackProgress,
    pub history: Vec<String>,
}

impl Session {
    pub fn new(env: Environment, config: &Config) -> Self {
        let shell = if env.can_access_local_files() {
            ShellExecutor::local(config)
        } else {
            ShellExecutor::remote(config)
        };
        Self::with_shell(shell, env)
    }

    pub fn with_shell(shell: ShellExecutor, env: Environment) -> Self {
        Session {
            shell,
            fs: HybridFs::new(env),
            hack: HackProgress::default(),
            history: Vec::new(),
        }
    }

    pub fn record(&mut self, input: &str) {
        let input = input.trim();
        if input.is_empty() {
            return;
        }
        self.history.push(input.to_string());
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    /// The last `n` inputs, oldest first.
    pub fn recent(&self, n: usize) -> &[String] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }
}

/// Sessions by id, created on first use.
pub struct Sessions {
    env: Environment,
    config: Config,
    map: HashMap<String, Session>,
}

impl Sessions {
    pub fn new(env: Environment, config: Config) -> Self {
        Sessions {
            env,
            config,
            map: HashMap::new(),
        }
    }

    pub fn get_or_create(&mut self, id: Option<&str>) -> &mut Session {
        let id = id.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SESSION);
        let (env, config) = (self.env, &self.config);
        self.map.entry(id.to_string()).or_insert_with(|| {
            log::debug!("new session {}", id);
            Session::new(env, config)
        })
    }

    pub fn insert(&mut self, id: &str, session: Session) {
        self.map.insert(id.to_string(), session);
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.map.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_are_isolated() {
        let mut sessions = Sessions::new(Environment::remote(), Config::default());
        sessions.get_or_create(Some("a")).shell.set_cwd("/tmp");
        assert_eq!(sessions.get_or_create(Some("a")).shell.cwd(), "/tmp");
        assert_eq!(sessions.get_or_create(Some("b")).shell.cwd(), "/home/user");
        assert_eq!(sessions.get_or_create(None).shell.cwd(), "/home/user");
        assert_eq!(sessions.len(), 3);
        assert!(sessions.remove("a"));
        assert!(!sessions.remove("a"));
    }

    #[test]
    fn test_history() {
        let mut s = Session::new(Environment::remote(), &Config::default());
        for cmd in ["ls", "  ", "pwd", "cd /tmp", "cat x"] {
            s.record(cmd);
        }
        assert_eq!(s.history.len(), 4);
        assert_eq!(s.recent(2), &["cd /tmp".to_string(), "cat x".to_string()]);
        assert_eq!(s.recent(10).len(), 4);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut s = Session::new(Environment::remote(), &Config::default());
        for i in 0..(HISTORY_LIMIT + 10) {
            s.record(&format!("echo {}", i));
        }
        assert_eq!(s.history.len(), HISTORY_LIMIT);
        assert_eq!(s.history[0], "echo 10");
    }
}
