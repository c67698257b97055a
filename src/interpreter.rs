//! Language-model backed translation of free text into shell commands.
//!
//! Every public action degrades to a static answer: model errors are logged and
//! swallowed here so callers always get something printable.

use crate::fuzzy;
use crate::hack::{self, HackProgress};
use crate::model::{CompletionRequest, LanguageModel, ModelError};
use crate::prompts;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;

pub const DIRECT_EXPLANATION: &str = "AI unavailable - using direct command";
pub const FRIENDLY_EXPLANATION: &str = "Hey there! I'm Berto, your friendly terminal assistant. I'm temporarily having some issues, but you can still try direct terminal commands or ask me for help!";
pub const EXPLAIN_FALLBACK: &str = "I couldn't explain that command right now. Try searching online or using 'man <command>' in your terminal.";
pub const OFFLINE_MESSAGE: &str = "Berto is offline. Check your OpenAI API key configuration.";
pub const DEFAULT_SUGGESTIONS: &[&str] = &["ls -la", "pwd", "mkdir new-folder", "touch new-file.txt", "cat filename"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandInterpretation {
    pub commands: Vec<String>,
    pub explanation: String,
    pub confidence: f64,
    pub is_complex: bool,
}

impl CommandInterpretation {
    /// Run the input exactly as typed.
    pub fn direct(input: &str) -> Self {
        CommandInterpretation {
            commands: vec![input.to_string()],
            explanation: DIRECT_EXPLANATION.to_string(),
            confidence: 0.0,
            is_complex: false,
        }
    }

    /// Conversational apology with nothing to execute.
    pub fn unavailable() -> Self {
        CommandInterpretation {
            commands: Vec::new(),
            explanation: FRIENDLY_EXPLANATION.to_string(),
            confidence: 0.8,
            is_complex: false,
        }
    }

    pub fn is_conversational(&self) -> bool {
        self.commands.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InterpretContext {
    pub current_directory: String,
    pub directory_contents: Vec<String>,
    pub recent_commands: Vec<String>,
}

impl InterpretContext {
    fn render(&self) -> String {
        let mut out = String::new();
        if !self.current_directory.is_empty() {
            out.push_str(&format!("Current Directory: {}\n", self.current_directory));
        }
        if !self.directory_contents.is_empty() {
            out.push_str(&format!("Directory Contents: {}\n", self.directory_contents.join(", ")));
        }
        if !self.recent_commands.is_empty() {
            let skip = self.recent_commands.len().saturating_sub(3);
            let recent: Vec<&str> = self.recent_commands[skip..].iter().map(|s| s.as_str()).collect();
            out.push_str(&format!("Recent Commands: {}\n", recent.join(" → ")));
        }
        out.push_str("\nMatch any file or folder the user mentions to the closest name in Directory Contents.\n");
        out
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInterpretation {
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    is_complex: bool,
}

/// Pull the outermost `{...}` out of a reply that may carry prose or fences.
fn json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

pub(crate) fn parse_interpretation(raw: &str) -> Result<CommandInterpretation, ModelError> {
    let body = json_object(raw).ok_or_else(|| ModelError::Malformed("no JSON object in reply".into()))?;
    let parsed: RawInterpretation =
        serde_json::from_str(body).map_err(|e| ModelError::Malformed(e.to_string()))?;

    let commands: Vec<String> = parsed
        .commands
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    let confidence = match parsed.confidence {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        Some(_) => 0.0,
        None => 0.5,
    };
    let is_complex = commands.len() > 1 || (parsed.is_complex && !commands.is_empty());
    Ok(CommandInterpretation {
        commands,
        explanation: parsed.explanation,
        confidence,
        is_complex,
    })
}

static NUMBERING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+[.)]|[-*])\s*").expect("numbering pattern is valid"));

fn suggestion_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| NUMBERING.replace(l.trim(), "").trim().trim_matches('`').to_string())
        .filter(|l| !l.is_empty())
        .take(5)
        .collect()
}

pub struct Interpreter {
    model: Box<dyn LanguageModel>,
}

impl Interpreter {
    pub fn new(model: Box<dyn LanguageModel>) -> Self {
        Interpreter { model }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_configured()
    }

    /// Retry once on transient failures, then settle for `fallback`.
    async fn with_fallback<T, F, Fut>(&self, action: &str, op: F, fallback: impl FnOnce() -> T) -> T
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let mut retried = false;
        loop {
            match op().await {
                Ok(value) => return value,
                Err(e) => {
                    log::warn!("{} degraded: {}", action, e);
                    if retried || !e.is_retryable() {
                        return fallback();
                    }
                    retried = true;
                }
            }
        }
    }

    /// Single attempt, errors surfaced.
    pub async fn try_interpret(
        &self,
        input: &str,
        context: Option<&InterpretContext>,
    ) -> Result<CommandInterpretation, ModelError> {
        let rendered = context.map(|c| c.render());
        let request = CompletionRequest::new(prompts::INTERPRET, prompts::interpret_prompt(input, rendered.as_deref()))
            .max_tokens(1000)
            .json();
        let reply = self.model.complete(&request).await?;
        let mut interpretation = parse_interpretation(&reply)?;
        if let Some(ctx) = context {
            for command in interpretation.commands.iter_mut() {
                let repaired = fuzzy::repair_command(command, &ctx.directory_contents);
                if repaired != *command {
                    log::debug!("repaired '{}' -> '{}'", command, repaired);
                    *command = repaired;
                }
            }
        }
        Ok(interpretation)
    }

    pub async fn interpret_or(
        &self,
        input: &str,
        context: Option<&InterpretContext>,
        fallback: CommandInterpretation,
    ) -> CommandInterpretation {
        self.with_fallback("interpret", || self.try_interpret(input, context), || fallback)
            .await
    }

    /// Never fails: on any model trouble the input runs as typed.
    pub async fn interpret(&self, input: &str, context: Option<&InterpretContext>) -> CommandInterpretation {
        self.interpret_or(input, context, CommandInterpretation::direct(input))
            .await
    }

    async fn generate(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let text = self.model.complete(&request).await?;
        Ok(text.trim().to_string())
    }

    pub async fn explain(&self, command: &str) -> String {
        let request = CompletionRequest::new(
            prompts::EXPLAIN,
            format!("Explain this terminal command: \"{}\"", command),
        );
        self.with_fallback("explain", || self.generate(request.clone()), || EXPLAIN_FALLBACK.to_string())
            .await
    }

    pub async fn suggest(&self, context: &str) -> Vec<String> {
        let request = CompletionRequest::new(
            prompts::SUGGEST,
            format!("Based on this context, suggest useful terminal commands: \"{}\"", context),
        )
        .temperature(0.3)
        .max_tokens(200);
        let op = || async {
            let lines = suggestion_lines(&self.generate(request.clone()).await?);
            if lines.is_empty() {
                return Err(ModelError::Malformed("no suggestions".into()));
            }
            Ok(lines)
        };
        self.with_fallback("suggest", op, || {
            DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
        })
        .await
    }

    /// Connectivity check: `(online, message)`.
    pub async fn test(&self) -> (bool, String) {
        let request = CompletionRequest::new(prompts::TEST, "Test the connection".into()).max_tokens(50);
        self.with_fallback(
            "test",
            || async { Ok::<_, ModelError>((true, self.generate(request.clone()).await?)) },
            || (false, OFFLINE_MESSAGE.to_string()),
        )
        .await
    }

    pub async fn hack_intro(&self) -> String {
        let request = CompletionRequest::new(prompts::HACK_INTRO, "Write the intro.".into())
            .temperature(0.8)
            .max_tokens(200);
        self.with_fallback("hack_intro", || self.generate(request.clone()), || hack::FALLBACK_INTRO.to_string())
            .await
    }

    pub async fn hack_readme(&self) -> String {
        let request = CompletionRequest::new(prompts::HACK_README, "Write the README.".into())
            .temperature(0.7)
            .max_tokens(600);
        self.with_fallback("hack_readme", || self.generate(request.clone()), || hack::STATIC_README.to_string())
            .await
    }

    pub async fn hack_hint(&self, progress: &HackProgress) -> String {
        let request = CompletionRequest::new(
            prompts::HACK_HINT,
            format!("Current objective: {}\nCodes found: {}", progress.objective(), progress.codes_found()),
        )
        .temperature(0.7)
        .max_tokens(120);
        self.with_fallback("hack_hint", || self.generate(request.clone()), || progress.fallback_hint().to_string())
            .await
    }
}
