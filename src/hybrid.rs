//! File operations that go to the real disk in local mode and to the virtual
//! tree plus uploaded files in remote mode.
//!
//! Relative paths always resolve against the session's tracked working
//! directory, which lives in the [`ShellExecutor`].

use crate::environment::Environment;
use crate::shell::{CommandResult, ShellExecutor};
use crate::vfs::{self, Vfs};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct FileUpload {
    pub name: String,
    pub content: String,
    pub path: String,
    pub size: usize,
    #[serde(rename = "type")]
    pub mime: String,
    #[serde(skip)]
    pub uploaded: DateTime<Utc>,
}

impl FileUpload {
    pub fn new(name: &str, content: String, path: &str, mime: &str) -> Self {
        FileUpload {
            name: name.to_string(),
            size: content.len(),
            content,
            path: path.to_string(),
            mime: mime.to_string(),
            uploaded: Utc::now(),
        }
    }

    pub fn full_path(&self) -> String {
        vfs::normalize("/", &format!("{}/{}", self.path, self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FsResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_simulated: bool,
    #[serde(skip)]
    pub exit_code: i32,
}

impl FsResult {
    fn simulated(content: String) -> Self {
        FsResult {
            success: true,
            content: Some(content),
            error: None,
            is_simulated: true,
            exit_code: 0,
        }
    }

    fn simulated_error(error: String) -> Self {
        FsResult {
            success: false,
            content: None,
            error: Some(error),
            is_simulated: true,
            exit_code: 1,
        }
    }

    fn from_command(result: CommandResult) -> Self {
        FsResult {
            success: result.success,
            content: Some(result.stdout),
            error: (!result.stderr.is_empty()).then_some(result.stderr),
            is_simulated: false,
            exit_code: result.exit_code,
        }
    }
}

/// Quote for use inside double quotes in `sh`.
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub struct HybridFs {
    env: Environment,
    tree: Vfs,
    uploads: BTreeMap<String, FileUpload>,
}

impl HybridFs {
    pub fn new(env: Environment) -> Self {
        Self::with_tree(env, Vfs::seeded())
    }

    pub fn with_tree(env: Environment, tree: Vfs) -> Self {
        HybridFs {
            env,
            tree,
            uploads: BTreeMap::new(),
        }
    }

    pub fn tree(&self) -> &Vfs {
        &self.tree
    }

    pub fn is_simulated(&self) -> bool {
        !self.env.can_access_local_files()
    }

    /// Absolute virtual path for `path` as typed at `cwd`.
    pub fn resolve_path(path: &str, cwd: &str, home: &str) -> String {
        match path {
            "" | "." => vfs::normalize("/", cwd),
            "~" => home.to_string(),
            p => match p.strip_prefix("~/") {
                Some(rest) => vfs::normalize(home, rest),
                None => vfs::normalize(cwd, p),
            },
        }
    }

    fn virtual_path(shell: &ShellExecutor, path: &str) -> String {
        Self::resolve_path(path, shell.cwd(), shell.home())
    }

    pub fn read_file(&self, shell: &mut ShellExecutor, path: &str) -> FsResult {
        if !self.is_simulated() {
            return FsResult::from_command(shell.safe_execute(&format!("cat {}", quote(path))));
        }
        let full = Self::virtual_path(shell, path);
        if let Some(upload) = self.uploads.get(&full) {
            return FsResult::simulated(upload.content.clone());
        }
        match self.tree.read_file(&full) {
            Ok(content) => FsResult::simulated(content.to_string()),
            Err(_) => FsResult::simulated_error(format!("File not found: {}", path)),
        }
    }

    pub fn list_directory(&self, shell: &mut ShellExecutor, path: &str, show_hidden: bool) -> FsResult {
        if !self.is_simulated() {
            let flags = if show_hidden { "-la" } else { "-l" };
            let target = if path.is_empty() { "." } else { path };
            return FsResult::from_command(shell.safe_execute(&format!("ls {} {}", flags, quote(target))));
        }
        let full = Self::virtual_path(shell, path);
        let entries = match self.tree.entries(&full, show_hidden) {
            Ok(entries) => entries,
            Err(_) => {
                let shown = if path.is_empty() { "." } else { path };
                return FsResult::simulated_error(format!("Directory not found: {}", shown));
            }
        };

        let mut lines: Vec<String> = entries.iter().map(|n| n.long_line()).collect();
        for upload in self.uploads.values() {
            let dir = vfs::normalize("/", &upload.path);
            // uploads mirrored into the tree are already listed
            let listed = entries.iter().any(|n| n.name == upload.name);
            if dir == full && !listed && (show_hidden || !upload.name.starts_with('.')) {
                lines.push(vfs::long_line(
                    "-rw-r--r--",
                    "user",
                    "user",
                    upload.size,
                    &upload.uploaded,
                    &upload.name,
                ));
            }
        }

        let mut out = format!("total {}\n", lines.len());
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        FsResult::simulated(out)
    }

    pub fn create_file(&mut self, shell: &mut ShellExecutor, path: &str, content: &str) -> FsResult {
        if !self.is_simulated() {
            let cmd = format!("echo {} > {}", quote(content), quote(path));
            return FsResult::from_command(shell.safe_execute(&cmd));
        }
        let full = Self::virtual_path(shell, path);
        match self.tree.create_file(&full, content) {
            Ok(()) => FsResult::simulated(String::new()),
            Err(e) => {
                log::debug!("virtual write to {} failed: {}", full, e);
                FsResult::simulated_error("Failed to create file in virtual filesystem".into())
            }
        }
    }

    pub fn create_dir(&mut self, shell: &mut ShellExecutor, path: &str) -> FsResult {
        if !self.is_simulated() {
            return FsResult::from_command(shell.safe_execute(&format!("mkdir -p {}", quote(path))));
        }
        let full = Self::virtual_path(shell, path);
        match self.tree.create_dir(&full) {
            Ok(()) => FsResult::simulated(String::new()),
            Err(e) => FsResult::simulated_error(format!("mkdir: cannot create directory '{}': {}", path, e)),
        }
    }

    /// Store an upload and mirror it into the virtual tree when its directory exists.
    pub fn upload_file(&mut self, upload: FileUpload) -> bool {
        if upload.name.is_empty() || upload.name.contains('/') {
            return false;
        }
        let full = upload.full_path();
        if let Err(e) = self.tree.create_file(&full, &upload.content) {
            log::debug!("upload {} kept outside the tree: {}", full, e);
        }
        self.uploads.insert(full, upload);
        true
    }

    pub fn uploaded_files(&self) -> Vec<&FileUpload> {
        self.uploads.values().collect()
    }

    pub fn clear_uploaded_files(&mut self) {
        self.uploads.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::testing::spy_executor;

    fn remote() -> (HybridFs, ShellExecutor) {
        let (shell, _) = spy_executor("/home/user", &[]);
        (HybridFs::new(Environment::remote()), shell)
    }

    #[test]
    fn test_resolve_path() {
        let home = "/home/user";
        assert_eq!(HybridFs::resolve_path(".", home, home), "/home/user");
        assert_eq!(HybridFs::resolve_path("", home, home), "/home/user");
        assert_eq!(HybridFs::resolve_path("./x", home, home), "/home/user/x");
        assert_eq!(HybridFs::resolve_path("x", home, home), "/home/user/x");
        assert_eq!(HybridFs::resolve_path("/etc/motd", home, home), "/etc/motd");
        assert_eq!(HybridFs::resolve_path("x", "/var/games", home), "/var/games/x");
        assert_eq!(HybridFs::resolve_path("~/documents", "/tmp", home), "/home/user/documents");
    }

    #[test]
    fn test_remote_read() {
        let (fs, mut shell) = remote();
        let ok = fs.read_file(&mut shell, "welcome.txt");
        assert!(ok.success && ok.is_simulated);
        assert!(ok.content.unwrap().contains("Welcome"));

        let missing = fs.read_file(&mut shell, "ghost.txt");
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("File not found: ghost.txt"));
        assert_eq!(
            fs.read_file(&mut shell, "documents").error.as_deref(),
            Some("File not found: documents")
        );
    }

    #[test]
    fn test_remote_write_read_roundtrip() {
        let (mut fs, mut shell) = remote();
        assert!(fs.create_file(&mut shell, "todo.txt", "buy milk").success);
        assert_eq!(fs.read_file(&mut shell, "/home/user/todo.txt").content.as_deref(), Some("buy milk"));
        let fail = fs.create_file(&mut shell, "documents", "x");
        assert_eq!(fail.error.as_deref(), Some("Failed to create file in virtual filesystem"));
    }

    #[test]
    fn test_remote_listing() {
        let (fs, mut shell) = remote();
        let out = fs.list_directory(&mut shell, ".", false).content.unwrap();
        assert!(out.starts_with("total 2\n"));
        assert!(!out.contains(".secret"));
        let hidden = fs.list_directory(&mut shell, "", true).content.unwrap();
        assert!(hidden.starts_with("total 4\n"));
        assert!(hidden.contains(" .secret\n"));
        let err = fs.list_directory(&mut shell, "/nope", false);
        assert_eq!(err.error.as_deref(), Some("Directory not found: /nope"));
    }

    #[test]
    fn test_uploads() {
        let (mut fs, mut shell) = remote();
        assert!(fs.upload_file(FileUpload::new("data.csv", "a,b\n".into(), "/home/user", "text/csv")));
        assert!(fs.upload_file(FileUpload::new("x.bin", "zz".into(), "/nowhere", "")));
        assert!(!fs.upload_file(FileUpload::new("", "zz".into(), "/home/user", "")));
        assert_eq!(fs.uploaded_files().len(), 2);

        assert_eq!(fs.read_file(&mut shell, "data.csv").content.as_deref(), Some("a,b\n"));
        // the map answers even where the tree has no directory
        assert_eq!(fs.read_file(&mut shell, "/nowhere/x.bin").content.as_deref(), Some("zz"));
        let listing = fs.list_directory(&mut shell, ".", false).content.unwrap();
        assert_eq!(listing.matches(" data.csv\n").count(), 1);

        fs.clear_uploaded_files();
        assert!(fs.uploaded_files().is_empty());
        assert!(!fs.read_file(&mut shell, "/nowhere/x.bin").success);
    }

    #[test]
    fn test_local_mode_uses_shell() {
        let (mut shell, spy) = spy_executor("/srv", &[]);
        *spy.reply.borrow_mut() = CommandResult::ok("hello\n");
        let mut fs = HybridFs::new(Environment::local());

        let read = fs.read_file(&mut shell, "notes.txt");
        assert!(!read.is_simulated);
        assert_eq!(read.content.as_deref(), Some("hello\n"));
        fs.list_directory(&mut shell, "src", true);
        fs.create_file(&mut shell, "out.txt", "say \"hi\" $HOME");
        fs.create_dir(&mut shell, "new dir");

        assert_eq!(
            spy.commands(),
            vec![
                "cat \"notes.txt\"".to_string(),
                "ls -la \"src\"".to_string(),
                "echo \"say \\\"hi\\\" \\$HOME\" > \"out.txt\"".to_string(),
                "mkdir -p \"new dir\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_local_mode_still_blocks() {
        let (mut shell, spy) = spy_executor("/srv", &[]);
        let fs = HybridFs::new(Environment::local());
        let result = fs.read_file(&mut shell, "/etc/shadow");
        assert!(!result.success);
        assert!(spy.commands().is_empty());
    }
}
