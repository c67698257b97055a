//! Decides whether raw terminal input should go through the language model.
//!
//! The classifier is a heuristic: fixed regex families for conversation and
//! natural-language requests, then an allow-list of literal command names.
//! Results depend only on the input string.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Empty,
    /// Greetings, thanks, small talk.
    Conversational,
    /// A request phrased in prose.
    NaturalLanguage,
    /// Something that should run as typed.
    Literal,
}

impl InputKind {
    pub fn needs_interpretation(self) -> bool {
        matches!(self, InputKind::Conversational | InputKind::NaturalLanguage)
    }
}

/// Swappable classifier seam; callers only depend on this.
pub trait InputClassifier {
    fn classify(&self, input: &str) -> InputKind;

    fn should_interpret(&self, input: &str) -> bool {
        self.classify(input).needs_interpretation()
    }
}

const KNOWN_COMMANDS: &[&str] = &[
    "ls", "ll", "la", "dir", "cd", "pwd", "pushd", "popd", "cat", "less", "more", "head",
    "tail", "touch", "mkdir", "rmdir", "rm", "cp", "mv", "echo", "printf", "clear", "reset",
    "whoami", "id", "groups", "ps", "top", "htop", "jobs", "env", "printenv", "export", "set",
    "unset", "date", "cal", "uptime", "uname", "hostname", "arch", "history", "fc", "help",
    "man", "info", "exit", "logout", "quit", "explain", "suggest", "test", "yes", "no",
    "debug", "vibe", "find", "locate", "which", "whereis", "grep", "egrep", "fgrep", "sort",
    "uniq", "wc", "cut", "awk", "sed", "tar", "gzip", "gunzip", "zip", "unzip", "chmod",
    "chown", "chgrp", "df", "du", "free", "ping", "wget", "curl", "ssh", "scp", "rsync", "git",
    "npm", "node", "python", "pip", "make", "gcc", "g++", "javac", "java", "docker", "kubectl",
    "vim", "nano", "emacs", "code",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("gate pattern is valid"))
        .collect()
}

static CONVERSATIONAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"^(hi|hello|hey|yo|sup|what's up|whats up|good morning|good afternoon|good evening|howdy|greetings)",
        r"^(bye|goodbye|see you|later|farewell|peace|peace out|cya|see ya)",
        r"^(thanks|thank you|thx|ty|appreciate|great|awesome|cool|nice|sweet)",
        r"^(how are you|how's it going|hows it going|what's new|whats new|how you doing)",
        r"^(sorry|my bad|oops|whoops|damn|dammit)",
        r"^(yes|yep|yeah|yup|no|nope|nah|maybe|perhaps|sure|okay|ok|alright)",
        r"^(i'm|im|i am).*(good|fine|okay|ok|great|awesome|tired|busy|stressed)",
        r"^(test|testing|hello world|just testing)",
    ])
});

static NATURAL_LANGUAGE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"^(show|list|display|find|search|get|tell|what|where|how|can you|please|i want|i need)",
        r"^(create|make|build|generate|add|new)",
        r"^(delete|remove|rm|del|erase|destroy)",
        r"^(help|explain|what does|what is|how to)",
        r"\b(all|every|everything|nothing|anything|something)\b",
        r"\b(files?|folders?|directories|dir|directory)\b",
        r"\b(in|from|inside|within|containing|with|that have)\b",
        r"\?$",
    ])
});

static COMMAND_FILLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(all|every|everything|files?|folders?|that|which|where|containing|with|in|from)\b")
        .expect("filler pattern is valid")
});

static ARTICLES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(the|a|an|this|that|these|those|my|your|our|their)\b")
        .expect("article pattern is valid")
});

static PREPOSITIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(in|on|at|by|for|with|from|to|of|about|under|over)\b")
        .expect("preposition pattern is valid")
});

pub struct HeuristicGate {
    known: HashSet<&'static str>,
}

impl Default for HeuristicGate {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicGate {
    pub fn new() -> Self {
        HeuristicGate {
            known: KNOWN_COMMANDS.iter().copied().collect(),
        }
    }

    pub fn is_known_command(&self, word: &str) -> bool {
        self.known.contains(word)
    }
}

impl InputClassifier for HeuristicGate {
    fn classify(&self, input: &str) -> InputKind {
        let text = input.trim().to_lowercase();
        if text.is_empty() {
            return InputKind::Empty;
        }
        if CONVERSATIONAL.iter().any(|re| re.is_match(&text)) {
            return InputKind::Conversational;
        }
        if NATURAL_LANGUAGE.iter().any(|re| re.is_match(&text)) {
            return InputKind::NaturalLanguage;
        }

        let first = text.split_whitespace().next().unwrap_or_default();
        if self.is_known_command(first) {
            return if COMMAND_FILLER.is_match(&text) {
                InputKind::NaturalLanguage
            } else {
                InputKind::Literal
            };
        }

        let prose = text.contains(' ') && (ARTICLES.is_match(&text) || PREPOSITIONS.is_match(&text));
        if prose {
            InputKind::NaturalLanguage
        } else {
            InputKind::Literal
        }
    }
}
