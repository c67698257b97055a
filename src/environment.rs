use crate::config::ModeOverride;
use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Real filesystem and shell are available.
    Local,
    /// Sandboxed deployment: everything goes through the virtual filesystem.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    mode: Mode,
    remote_deployment: bool,
}

static CURRENT: Lazy<Environment> = Lazy::new(|| {
    let env = Environment::from_lookup(|key| std::env::var(key).ok());
    log::info!("environment detected: {:?}", env);
    env
});

impl Environment {
    pub fn local() -> Self {
        Environment {
            mode: Mode::Local,
            remote_deployment: false,
        }
    }

    pub fn remote() -> Self {
        Environment {
            mode: Mode::Remote,
            remote_deployment: true,
        }
    }

    /// Process-wide detection, computed on first use and fixed afterwards.
    pub fn current() -> Environment {
        *CURRENT
    }

    /// Like [`Environment::current`] but honouring an explicit override.
    pub fn with_override(mode: Option<ModeOverride>) -> Environment {
        match mode {
            Some(ModeOverride::Local) => Environment::local(),
            Some(ModeOverride::Remote) => Environment::remote(),
            None => Environment::current(),
        }
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if cfg!(target_arch = "wasm32") {
            return Environment::remote();
        }
        if let Some(forced) = lookup("VIBE_MODE").as_deref().and_then(ModeOverride::parse) {
            return Environment::with_override(Some(forced));
        }
        let vercel = lookup("VERCEL").as_deref() == Some("1") || lookup("VERCEL_ENV").is_some();
        let dev = match lookup("NODE_ENV") {
            None => true,
            Some(v) => v.is_empty() || v == "development",
        };
        let mode = if !vercel && dev { Mode::Local } else { Mode::Remote };
        Environment {
            mode,
            remote_deployment: vercel,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn can_access_local_files(&self) -> bool {
        self.mode == Mode::Local
    }

    pub fn is_remote_deployment(&self) -> bool {
        self.remote_deployment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn detect(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_plain_process_is_local() {
        let env = detect(&[]);
        assert!(env.can_access_local_files());
        assert!(!env.is_remote_deployment());
    }

    #[test]
    fn test_vercel_is_remote() {
        let env = detect(&[("VERCEL", "1")]);
        assert!(!env.can_access_local_files());
        assert!(env.is_remote_deployment());
        let env = detect(&[("VERCEL_ENV", "preview")]);
        assert!(env.is_remote_deployment());
    }

    #[test]
    fn test_production_node_env_is_not_local() {
        let env = detect(&[("NODE_ENV", "production")]);
        assert!(!env.can_access_local_files());
        assert!(!env.is_remote_deployment());
    }

    #[test]
    fn test_override_wins() {
        let env = detect(&[("VERCEL", "1"), ("VIBE_MODE", "local")]);
        assert_eq!(env.mode(), Mode::Local);
    }

    #[test]
    fn test_current_is_stable() {
        assert_eq!(Environment::current(), Environment::current());
    }
}
