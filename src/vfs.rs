use crate::hack;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DIR_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("{0}: No such file or directory")]
    NotFound(String),
    #[error("{0}: Not a directory")]
    NotADirectory(String),
    #[error("{0}: Is a directory")]
    IsADirectory(String),
    #[error("{0}: Invalid path")]
    InvalidPath(String),
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    File { content: String },
    Directory { children: BTreeMap<String, Inode> },
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub name: String,
    pub kind: NodeKind,
    pub permissions: String,
    pub owner: String,
    pub group: String,
    pub size: usize,
    pub modified: DateTime<Utc>,
}

impl Inode {
    pub fn dir(name: &str) -> Self {
        Inode {
            name: name.into(),
            kind: NodeKind::Directory {
                children: BTreeMap::new(),
            },
            permissions: "drwxr-xr-x".into(),
            owner: "root".into(),
            group: "root".into(),
            size: DIR_SIZE,
            modified: Utc::now(),
        }
    }

    pub fn file(name: &str, content: &str) -> Self {
        Inode {
            name: name.into(),
            kind: NodeKind::File {
                content: content.into(),
            },
            permissions: "-rw-r--r--".into(),
            owner: "root".into(),
            group: "root".into(),
            size: content.len(),
            modified: Utc::now(),
        }
    }

    pub fn owned(mut self, owner: &str, group: &str) -> Self {
        self.owner = owner.into();
        self.group = group.into();
        self
    }

    pub fn mode(mut self, permissions: &str) -> Self {
        self.permissions = permissions.into();
        self
    }

    /// Attach children; a no-op on files.
    pub fn with(mut self, nodes: impl IntoIterator<Item = Inode>) -> Self {
        if let NodeKind::Directory { children } = &mut self.kind {
            for node in nodes {
                children.insert(node.name.clone(), node);
            }
        }
        self
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn content(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::File { content } => Some(content),
            NodeKind::Directory { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<String, Inode>> {
        match &self.kind {
            NodeKind::Directory { children } => Some(children),
            NodeKind::File { .. } => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut BTreeMap<String, Inode>> {
        match &mut self.kind {
            NodeKind::Directory { children } => Some(children),
            NodeKind::File { .. } => None,
        }
    }

    fn set_content(&mut self, data: &str) {
        self.kind = NodeKind::File {
            content: data.into(),
        };
        self.size = data.len();
        self.modified = Utc::now();
    }

    /// One `ls -l` style line.
    pub fn long_line(&self) -> String {
        long_line(&self.permissions, &self.owner, &self.group, self.size, &self.modified, &self.name)
    }
}

pub fn long_line(perm: &str, owner: &str, group: &str, size: usize, when: &DateTime<Utc>, name: &str) -> String {
    format!(
        "{} 1 {} {} {} {} {}",
        perm,
        owner,
        group,
        size,
        when.format("%m/%d/%Y %H:%M"),
        name
    )
}

/// Lexically resolve `path` against `base`, folding `.` and `..`.
pub fn normalize(base: &str, path: &str) -> String {
    let raw = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Split an absolute path into (parent, leaf name).
fn split_parent(path: &str) -> Result<(String, String), FsError> {
    let norm = normalize("/", path);
    match norm.rfind('/') {
        Some(i) if norm.len() > 1 => {
            let parent = if i == 0 { "/".to_string() } else { norm[..i].to_string() };
            Ok((parent, norm[i + 1..].to_string()))
        }
        _ => Err(FsError::InvalidPath(path.to_string())),
    }
}

pub struct Vfs {
    root: Inode,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::seeded()
    }
}

impl Vfs {
    /// Bare tree with only `/`.
    pub fn new() -> Self {
        Vfs { root: Inode::dir("/") }
    }

    pub fn seeded() -> Self {
        let user = |node: Inode| node.owned("user", "user");
        let home = user(Inode::dir("user")).with([
            user(Inode::file("welcome.txt", WELCOME)),
            user(Inode::dir("documents")).with([
                user(Inode::file("notes.md", NOTES)),
                user(Inode::file("diary.txt", DIARY)).mode("-rw-------"),
            ]),
            user(Inode::file(".bashrc", BASHRC)),
            user(Inode::file(".secret", SECRET)).mode("-rw-------"),
        ]);
        let retro = Inode::dir("retro").owned("games", "games").with([
            Inode::file("ascii_art.txt", ASCII_ART).owned("games", "games"),
            Inode::file("jokes.txt", &jokes_file()).owned("games", "games"),
            Inode::file("fortune.txt", FORTUNE_FILE).owned("games", "games"),
        ]);
        let root = Inode::dir("/").with([
            Inode::dir("home").with([home]),
            Inode::dir("var").with([hack::games_tree()]),
            Inode::dir("opt").with([retro]),
            Inode::dir("etc").with([Inode::file("passwd", PASSWD), Inode::file("motd", MOTD)]),
            Inode::dir("tmp")
                .mode("drwxrwxrwt")
                .with([user(Inode::file(".mystery", MYSTERY)).mode("-rw-rw-rw-")]),
        ]);
        Vfs { root }
    }

    pub fn resolve(&self, path: &str) -> Option<&Inode> {
        let norm = normalize("/", path);
        let mut node = &self.root;
        for part in norm.split('/').filter(|s| !s.is_empty()) {
            node = node.children()?.get(part)?;
        }
        Some(node)
    }

    fn resolve_mut(&mut self, path: &str) -> Option<&mut Inode> {
        let norm = normalize("/", path);
        let mut node = &mut self.root;
        for part in norm.split('/').filter(|s| !s.is_empty()) {
            node = node.children_mut()?.get_mut(part)?;
        }
        Some(node)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).map(|n| n.is_dir()).unwrap_or(false)
    }

    pub fn read_file(&self, path: &str) -> Result<&str, FsError> {
        let node = self
            .resolve(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        node.content()
            .ok_or_else(|| FsError::IsADirectory(path.to_string()))
    }

    /// Children of a directory, dot-files only when `show_hidden`.
    pub fn entries(&self, path: &str, show_hidden: bool) -> Result<Vec<&Inode>, FsError> {
        let node = self
            .resolve(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        let children = node
            .children()
            .ok_or_else(|| FsError::NotADirectory(path.to_string()))?;
        Ok(children
            .values()
            .filter(|c| show_hidden || !c.name.starts_with('.'))
            .collect())
    }

    pub fn list_long(&self, path: &str, show_hidden: bool) -> Result<Vec<String>, FsError> {
        Ok(self
            .entries(path, show_hidden)?
            .into_iter()
            .map(Inode::long_line)
            .collect())
    }

    /// Insert or overwrite a file. The parent must already be a directory.
    pub fn create_file(&mut self, path: &str, content: &str) -> Result<(), FsError> {
        let (parent_path, name) = split_parent(path)?;
        let parent = self
            .resolve_mut(&parent_path)
            .ok_or_else(|| FsError::NotFound(parent_path.clone()))?;
        let children = parent
            .children_mut()
            .ok_or(FsError::NotADirectory(parent_path))?;
        match children.get_mut(&name) {
            Some(existing) if existing.is_dir() => Err(FsError::IsADirectory(path.to_string())),
            Some(existing) => {
                existing.set_content(content);
                Ok(())
            }
            None => {
                children.insert(name.clone(), Inode::file(&name, content).owned("user", "user"));
                Ok(())
            }
        }
    }

    /// Create a directory; an existing directory is left as is.
    pub fn create_dir(&mut self, path: &str) -> Result<(), FsError> {
        let (parent_path, name) = split_parent(path)?;
        let parent = self
            .resolve_mut(&parent_path)
            .ok_or_else(|| FsError::NotFound(parent_path.clone()))?;
        let children = parent
            .children_mut()
            .ok_or(FsError::NotADirectory(parent_path))?;
        match children.get(&name) {
            Some(existing) if existing.is_dir() => Ok(()),
            Some(_) => Err(FsError::NotADirectory(path.to_string())),
            None => {
                children.insert(name.clone(), Inode::dir(&name).owned("user", "user"));
                Ok(())
            }
        }
    }
}

const WELCOME: &str = "Welcome to Berto's Vibe Terminal!

A terminal that understands plain English.
Just say what you want to do.

Quick start:
  ls        list files
  hack      start the hacker challenge
  joke      hear a joke
  fortune   get a fortune

Psst: 'ls -la' shows hidden files.

Have fun, there are surprises around.
";

const NOTES: &str = "# My Notes

- Try asking for things in plain English
- Build something cool with Berto
- Stop memorizing flags
- Found some odd directories on this box...
- Must look into it
";

const DIARY: &str = "Dear Diary,

Found this terminal called Berto today.
People say there's a hacker game hidden somewhere.
The admin mumbled something about '/var/games'...

Going to check it out.
- User
";

const BASHRC: &str = "# ~/.bashrc
alias ll='ls -la'
alias hack='cd /var/games && ./start_hack.sh'
echo 'Type hack to begin the adventure...'
";

const SECRET: &str = "Top secret note:
The vault password is C0D3R5_0NLY
But which vault?
";

const ASCII_ART: &str = r"RETRO ASCII ART

    ____            __
   / __ )___  _____/ /_____
  / __  / _ \/ ___/ __/ __ \
 / /_/ /  __/ /  / /_/ /_/ /
/_____/\___/_/   \__/\____/

   [###]     {o,o}
   |---|     \ _ /
   |[O]|      ) (
   |___|     _|_|_

Welcome to the retro zone!
";

pub const JOKES: &[&str] = &[
    "Why do programmers prefer dark mode?\nBecause light attracts bugs!",
    "How many programmers does it take to change a light bulb?\nNone. That's a hardware problem!",
    "Why did the programmer quit the job?\nThey didn't get arrays!",
    "Where do programmers hang out after work?\nThe Foo Bar!",
    "Why do Java developers wear glasses?\nBecause they can't C#!",
];

pub const FORTUNES: &[&str] = &[
    "The code you write today will compile on the first try.",
    "A bug you've been hunting will show itself before lunch.",
    "Your next pull request will be approved without comments.",
    "You will find an easter egg in your favorite app.",
    "Lucky numbers: 42, 1337, 404, 200.",
];

fn jokes_file() -> String {
    let mut out = String::from("PROGRAMMER JOKES\n");
    for (i, joke) in JOKES.iter().enumerate() {
        out.push_str(&format!("\n{}. {}\n", i + 1, joke.replace('\n', "\n   ")));
    }
    out
}

const FORTUNE_FILE: &str = "YOUR FORTUNE TODAY

The code you write today will compile on the first try.
A bug you've been hunting will show itself before lunch.
Your next pull request will be approved without comments.

Lucky numbers: 42, 1337, 404, 200
Lucky color: terminal green
";

const PASSWD: &str = "root:x:0:0:root:/root:/bin/bash
user:x:1000:1000:User:/home/user:/bin/bash
games:x:1001:1001:Game Master:/var/games:/bin/bash
hacker:x:1337:1337:Elite Hacker:/opt/hacker:/bin/zsh
";

const MOTD: &str = "Welcome to Berto's virtual system!

Hidden games and secrets await.
Type 'hack' to start your adventure.
";

const MYSTERY: &str = "MYSTERY FILE

This file comes and goes...
You caught it at the right moment.

The real treasure was the commands we learned along the way.
";
