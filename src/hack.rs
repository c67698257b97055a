//! The `/var/games` hacker adventure: its files, its progress state and the
//! directory transition table used while the player is inside it.
//!
//! Progress is tracked explicitly. Reading a code-bearing file records its
//! access code; once all three are known `level2` opens and `victory.txt`
//! completes the run.

use crate::vfs::{self, Inode};
use std::collections::BTreeSet;

pub const GAMES_ROOT: &str = "/var/games";
pub const README_PATH: &str = "/var/games/README_HACK";
pub const VICTORY_PATH: &str = "/var/games/victory.txt";
pub const LEVEL2_DIR: &str = "/var/games/level2";

pub const BRIEFING_HEADER: &str = "CYBER HACK CHALLENGE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessCode {
    Intel,
    Matrix,
    Vault,
}

impl AccessCode {
    pub const ALL: [AccessCode; 3] = [AccessCode::Intel, AccessCode::Matrix, AccessCode::Vault];

    pub fn label(self) -> &'static str {
        match self {
            AccessCode::Intel => "CODE_1",
            AccessCode::Matrix => "CODE_2",
            AccessCode::Vault => "CODE_3",
        }
    }

    pub fn value(self) -> &'static str {
        match self {
            AccessCode::Intel => "ALPHA_SEVEN_NINE",
            AccessCode::Matrix => "BETAXYZE EIGHTFOUREX",
            AccessCode::Vault => "FIRE_MASTER",
        }
    }

    /// The file whose reading reveals this code.
    pub fn source(self) -> &'static str {
        match self {
            AccessCode::Intel => "/var/games/intel/mission1.txt",
            AccessCode::Matrix => "/var/games/matrix.dat",
            AccessCode::Vault => "/var/games/vault/treasure.txt",
        }
    }

    fn stage(self) -> HackStage {
        match self {
            AccessCode::Intel => HackStage::Intel,
            AccessCode::Matrix => HackStage::Matrix,
            AccessCode::Vault => HackStage::Vault,
        }
    }
}

/// Current objective of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HackStage {
    #[default]
    NotStarted,
    Intel,
    Matrix,
    Vault,
    LevelTwo,
    Complete,
}

#[derive(Debug, Clone, Default)]
pub struct HackProgress {
    stage: HackStage,
    codes: BTreeSet<AccessCode>,
}

impl HackProgress {
    pub fn stage(&self) -> HackStage {
        self.stage
    }

    pub fn has(&self, code: AccessCode) -> bool {
        self.codes.contains(&code)
    }

    pub fn codes_found(&self) -> usize {
        self.codes.len()
    }

    pub fn all_codes(&self) -> bool {
        self.codes.len() == AccessCode::ALL.len()
    }

    pub fn missing(&self) -> Vec<AccessCode> {
        AccessCode::ALL.into_iter().filter(|c| !self.has(*c)).collect()
    }

    pub fn start(&mut self) {
        if self.stage == HackStage::NotStarted {
            self.stage = HackStage::Intel;
        }
    }

    fn advance(&mut self) {
        if self.stage == HackStage::Complete {
            return;
        }
        self.stage = match self.missing().first() {
            Some(code) => code.stage(),
            None => HackStage::LevelTwo,
        };
    }

    /// Record a code; true when it was new.
    pub fn discover(&mut self, code: AccessCode) -> bool {
        let fresh = self.codes.insert(code);
        self.advance();
        fresh
    }

    /// Finish the run. Refused while codes are missing.
    pub fn complete(&mut self) -> bool {
        if !self.all_codes() {
            return false;
        }
        self.stage = HackStage::Complete;
        true
    }

    pub fn objective(&self) -> &'static str {
        match self.stage {
            HackStage::NotStarted => "start the challenge with the 'hack' command",
            HackStage::Intel => "find CODE_1 in the intel directory",
            HackStage::Matrix => "decode matrix.dat to find CODE_2",
            HackStage::Vault => "get into the vault and find CODE_3",
            HackStage::LevelTwo => "read the transmission in level2, then victory.txt",
            HackStage::Complete => "nothing left, the challenge is beaten",
        }
    }

    pub fn fallback_hint(&self) -> &'static str {
        match self.stage {
            HackStage::NotStarted => "Type 'hack' to begin the adventure.",
            HackStage::Intel => "Try 'cd intel' and read the mission files. 'ls -la' reveals what's hidden.",
            HackStage::Matrix => "matrix.dat is binary: every group of 8 bits is one ASCII letter.",
            HackStage::Vault => "The vault password sits in a dot-file in your home directory. Look inside the vault for treasure.",
            HackStage::LevelTwo => "You hold all three codes. 'cd level2' is open now, and victory.txt awaits.",
            HackStage::Complete => "You've beaten it! Take a break in /opt/retro.",
        }
    }

    /// Status line appended after a code-bearing file is read.
    pub fn status_line(&self, code: AccessCode, fresh: bool) -> String {
        let verb = if fresh { "recorded" } else { "already recorded" };
        format!(
            "[+] {} {} ({}/{})",
            code.label(),
            verb,
            self.codes_found(),
            AccessCode::ALL.len()
        )
    }
}

pub fn is_challenge_path(path: &str) -> bool {
    path == GAMES_ROOT || path.starts_with("/var/games/")
}

pub fn code_at(path: &str) -> Option<AccessCode> {
    AccessCode::ALL.into_iter().find(|c| c.source() == path)
}

/// Fixed `cd` table used inside the challenge. `None` means "resolve normally".
pub fn transition(cwd: &str, target: &str) -> Option<String> {
    let target = target.trim_end_matches('/');
    match target {
        ".." if is_challenge_path(cwd) => Some(vfs::normalize(cwd, "..")),
        "intel" | "vault" | "level2" if cwd == GAMES_ROOT => Some(format!("{}/{}", GAMES_ROOT, target)),
        _ => None,
    }
}

/// Whether `path` may be entered given the current progress.
pub fn check_entry(path: &str, progress: &HackProgress) -> Result<(), String> {
    let locked = path == LEVEL2_DIR || path.starts_with("/var/games/level2/");
    if locked && !progress.all_codes() {
        return Err(format!(
            "Access denied. {} of {} codes found.",
            progress.codes_found(),
            AccessCode::ALL.len()
        ));
    }
    Ok(())
}

pub fn briefing(intro: &str) -> String {
    format!(
        "======================================
      {}
    UNAUTHORIZED ACCESS DETECTED
======================================

{}

MISSION: recover the 3 hidden access codes
  1. Gather intel in the 'intel' directory
  2. Decode the 'matrix.dat' file
  3. Crack the 'vault'

Type 'cat README_HACK' for instructions, or 'hint' when stuck.
Good luck, hacker!
",
        BRIEFING_HEADER,
        intro.trim()
    )
}

pub const FALLBACK_INTRO: &str = "You've slipped past the firewall and into the mainframe.\nSomewhere in here are three access codes. Find them before the sysadmin notices.";

pub const STATIC_README: &str = "HACKER CHALLENGE INSTRUCTIONS

1. INTEL GATHERING
   - cd into 'intel'
   - read every intelligence file
   - find CODE_1

2. MATRIX DECODING
   - open 'matrix.dat'
   - decode the pattern to find CODE_2

3. VAULT CRACKING
   - enter the 'vault'
   - read what's inside for CODE_3

With all 3 codes, 'level2' unlocks. Then read 'victory.txt'!

HINTS
- 'ls -la' shows hidden files
- 'hint' gives a nudge for your current step
- the vault password was mentioned somewhere at home...
";

const MISSION1: &str = "CLASSIFIED INTEL - MISSION 1

Agent report:
Infiltration successful. Evidence found of...

[REDACTED]

CODE_1: ALPHA_SEVEN_NINE

Proceed to the next phase immediately.
";

const SECURITY_LOG: &str = "SECURITY BREACH LOG

2024-01-15 23:42:01 - unauthorized access attempt
2024-01-15 23:42:15 - firewall bypassed
2024-01-15 23:42:33 - someone is getting close...
2024-01-15 23:42:45 - they're in the system!

WARNING: intruder still active on the network
";

const CLASSIFIED: &str = "TOP SECRET

Project codename: VIBE_TERMINAL
Status: ACTIVE
Agent: Berto
Mission: make terminals fun again
";

const VAULT_ACCESS: &str = "VAULT ACCESS GRANTED

Welcome, authorized user. Password accepted: C0D3R5_0NLY

FINAL RIDDLE:
  I am not alive, but I grow;
  I have no lungs, but I need air;
  I have no mouth, but water kills me.
  What am I?

The answer is written on the treasure.
";

const TREASURE: &str = "VAULT TREASURE

You found the treasure!

CODE_3: FIRE_MASTER

(The riddle's answer was 'fire'.)
";

const TRANSMISSION: &str = "INCOMING TRANSMISSION - LEVEL 2

Agent, the three codes check out.
ALPHA_SEVEN_NINE / BETAXYZE EIGHTFOUREX / FIRE_MASTER

The mainframe is yours. Report to victory.txt for debriefing.
";

pub const VICTORY: &str = "CONGRATULATIONS, HACKER!

You completed the Cyber Hack Challenge!

  CODE_1: ALPHA_SEVEN_NINE      (intel)
  CODE_2: BETAXYZE EIGHTFOUREX  (matrix)
  CODE_3: FIRE_MASTER           (vault)

ACHIEVEMENT UNLOCKED: Master Hacker

Want more? Visit /opt/retro.
- The Berto Game Master
";

/// What `victory.txt` shows for the given progress; completes the run when possible.
pub fn read_victory(progress: &mut HackProgress) -> Result<String, String> {
    if progress.complete() {
        return Ok(VICTORY.to_string());
    }
    let missing: Vec<&str> = progress.missing().iter().map(|c| c.label()).collect();
    Err(format!(
        "ACCESS DENIED: victory.txt is encrypted.\nMissing codes: {}",
        missing.join(", ")
    ))
}

fn to_binary(text: &str) -> String {
    let bytes: Vec<String> = text.bytes().map(|b| format!("{:08b}", b)).collect();
    bytes
        .chunks(4)
        .map(|row| row.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

fn matrix_file() -> String {
    format!(
        "MATRIX DECODING CHALLENGE\n\n{}\n\nHINT: this is binary.\nHINT: 8 bits = 1 letter.\nConvert to ASCII to reveal CODE_2.\n",
        to_binary(AccessCode::Matrix.value())
    )
}

/// `/var/games` subtree for the seeded filesystem.
pub fn games_tree() -> Inode {
    let games = |node: Inode| node.owned("games", "games");
    games(Inode::dir("games")).with([
        games(Inode::file("start_hack.sh", &format!("#!/bin/bash\n\n{}", briefing(FALLBACK_INTRO)))).mode("-rwxr-xr-x"),
        games(Inode::file("README_HACK", STATIC_README)),
        games(Inode::dir("intel")).with([
            games(Inode::file("mission1.txt", MISSION1)),
            games(Inode::file("security_log.txt", SECURITY_LOG)),
            games(Inode::file(".classified", CLASSIFIED)).mode("-rw-------"),
        ]),
        games(Inode::file("matrix.dat", &matrix_file())),
        games(Inode::dir("vault")).mode("drwx------").with([
            games(Inode::file("access.txt", VAULT_ACCESS)).mode("-rw-------"),
            games(Inode::file("treasure.txt", TREASURE)),
        ]),
        games(Inode::dir("level2")).mode("drwx------").with([games(Inode::file("transmission.txt", TRANSMISSION))]),
        games(Inode::file("victory.txt", VICTORY)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progression() {
        let mut p = HackProgress::default();
        assert_eq!(p.stage(), HackStage::NotStarted);
        p.start();
        assert_eq!(p.stage(), HackStage::Intel);
        assert!(p.discover(AccessCode::Intel));
        assert_eq!(p.stage(), HackStage::Matrix);
        assert!(!p.discover(AccessCode::Intel));
        p.discover(AccessCode::Vault);
        // out of order: still owes the matrix code
        assert_eq!(p.stage(), HackStage::Matrix);
        p.discover(AccessCode::Matrix);
        assert_eq!(p.stage(), HackStage::LevelTwo);
        assert!(p.complete());
        assert_eq!(p.stage(), HackStage::Complete);
        p.discover(AccessCode::Intel);
        assert_eq!(p.stage(), HackStage::Complete);
    }

    #[test]
    fn test_victory_requires_all_codes() {
        let mut p = HackProgress::default();
        p.discover(AccessCode::Intel);
        let err = read_victory(&mut p).unwrap_err();
        assert!(err.contains("CODE_2, CODE_3"));
        assert_ne!(p.stage(), HackStage::Complete);
        p.discover(AccessCode::Matrix);
        p.discover(AccessCode::Vault);
        assert!(read_victory(&mut p).unwrap().contains("Master Hacker"));
        assert_eq!(p.stage(), HackStage::Complete);
    }

    #[test]
    fn test_level2_lock() {
        let mut p = HackProgress::default();
        assert!(check_entry(LEVEL2_DIR, &p).is_err());
        assert!(check_entry("/var/games/intel", &p).is_ok());
        for code in AccessCode::ALL {
            p.discover(code);
        }
        assert!(check_entry(LEVEL2_DIR, &p).is_ok());
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(transition(GAMES_ROOT, "intel"), Some("/var/games/intel".to_string()));
        assert_eq!(transition(GAMES_ROOT, "vault/"), Some("/var/games/vault".to_string()));
        assert_eq!(transition("/var/games/intel", ".."), Some(GAMES_ROOT.to_string()));
        assert_eq!(transition("/var/games/intel", "vault"), None);
        assert_eq!(transition("/home/user", ".."), None);
    }

    #[test]
    fn test_matrix_decodes_to_code() {
        let content = matrix_file();
        let decoded: String = content
            .split_whitespace()
            .filter(|w| w.len() == 8 && w.chars().all(|c| c == '0' || c == '1'))
            .map(|w| u8::from_str_radix(w, 2).unwrap() as char)
            .collect();
        assert_eq!(decoded, AccessCode::Matrix.value());
    }

    #[test]
    fn test_code_sources_exist_in_tree() {
        let fs = vfs::Vfs::seeded();
        for code in AccessCode::ALL {
            assert_eq!(code_at(code.source()), Some(code));
            let text = fs.read_file(code.source()).unwrap();
            if code != AccessCode::Matrix {
                assert!(text.contains(code.value()), "{:?}", code);
            }
        }
        assert!(fs.read_file("/var/games/level2/transmission.txt").is_ok());
    }

    #[test]
    fn test_briefing_splices_intro() {
        let text = briefing("  custom intro  ");
        assert!(text.contains(BRIEFING_HEADER));
        assert!(text.contains("\ncustom intro\n"));
    }
}
