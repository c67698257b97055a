//! Request handlers behind the HTTP-shaped surface. Bodies come in as JSON
//! values and every handler answers with a status plus a JSON body.

use crate::config::Config;
use crate::environment::Environment;
use crate::hybrid::FileUpload;
use crate::interpreter::{CommandInterpretation, InterpretContext, Interpreter};
use crate::model::OpenAiModel;
use crate::router::{ExecutionResult, Router};
use crate::session::Sessions;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const MISSING_COMMAND: &str = "Command is required and must be a string";
pub const MISSING_KEY: &str =
    "OpenAI API key is not configured. Please add OPENAI_API_KEY to your .env.local file.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Configuration(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Configuration(_) => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        ApiResponse { status: 200, body }
    }

    /// 500 carrying the execution-result shape plus `error`.
    pub fn internal(result: &ExecutionResult) -> Self {
        let mut body = to_value(result);
        if let Value::Object(map) = &mut body {
            map.insert("error".into(), Value::String(result.stderr.clone()));
        }
        ApiResponse { status: 500, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<ApiError> for ApiResponse {
    fn from(e: ApiError) -> Self {
        ApiResponse {
            status: e.status(),
            body: json!({ "error": e.to_string() }),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn parse<T: for<'de> Deserialize<'de>>(body: &Value) -> Result<T, ApiError> {
    T::deserialize(body).map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterpretRequest {
    action: String,
    #[serde(default)]
    input: String,
    #[serde(default)]
    context: Option<Value>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    input: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct UploadPart {
    #[serde(default)]
    name: String,
    #[serde(default)]
    content: String,
    #[serde(default, rename = "type")]
    mime: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    #[serde(default)]
    files: Vec<UploadPart>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

impl UploadPart {
    fn decode(&self) -> Result<String, ApiError> {
        match self.encoding.as_deref() {
            Some("base64") => STANDARD
                .decode(self.content.trim())
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .map_err(|e| ApiError::BadRequest(format!("Invalid base64 content for {}: {}", self.name, e))),
            _ => Ok(self.content.clone()),
        }
    }
}

fn session_id(body: &Value) -> Option<&str> {
    body.get("sessionId").and_then(Value::as_str)
}

/// Engine instance shared by every endpoint: one router, many sessions.
pub struct Service {
    router: Router,
    sessions: Sessions,
}

impl Service {
    pub fn new(router: Router, sessions: Sessions) -> Self {
        Service { router, sessions }
    }

    pub fn from_config(config: Config) -> Self {
        let env = Environment::with_override(config.mode);
        log::info!("service starting in {:?} mode", env.mode());
        let interpreter = Interpreter::new(Box::new(OpenAiModel::from_config(&config)));
        let router = Router::new(env, interpreter).with_recent_commands(config.recent_commands);
        Service::new(router, Sessions::new(env, config))
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn sessions(&mut self) -> &mut Sessions {
        &mut self.sessions
    }

    /// `{command, workingDirectory?, sessionId?}` → [`ExecutionResult`].
    pub async fn execute(&mut self, body: &Value) -> ApiResponse {
        let command = match body.get("command").and_then(Value::as_str) {
            Some(c) if !c.trim().is_empty() => c,
            _ => return ApiError::BadRequest(MISSING_COMMAND.into()).into(),
        };
        let working_directory = body.get("workingDirectory").and_then(Value::as_str);
        let session = self.sessions.get_or_create(session_id(body));
        match self.router.try_route(session, command, working_directory).await {
            Ok(result) => ApiResponse::ok(to_value(&result)),
            Err(internal) => ApiResponse::internal(&internal),
        }
    }

    /// Full pipeline for one line of input: `{input, sessionId?}`.
    pub async fn submit(&mut self, body: &Value) -> ApiResponse {
        let req: SubmitRequest = match parse(body) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        let session = self.sessions.get_or_create(req.session_id.as_deref());
        let submission = self.router.submit(session, &req.input).await;
        ApiResponse::ok(to_value(&submission))
    }

    pub async fn interpret(&mut self, body: &Value) -> ApiResponse {
        match self.try_interpret(body).await {
            Ok(value) => ApiResponse::ok(value),
            Err(e) => {
                log::warn!("interpret request rejected: {}", e);
                e.into()
            }
        }
    }

    async fn try_interpret(&mut self, body: &Value) -> Result<Value, ApiError> {
        let req: InterpretRequest = parse(body)?;
        let interpreter = self.router.interpreter();
        if !interpreter.is_configured() {
            return Err(ApiError::Configuration(MISSING_KEY.into()));
        }
        let value = match req.action.as_str() {
            "interpret" => {
                let context = req
                    .context
                    .as_ref()
                    .filter(|c| c.is_object())
                    .map(parse::<InterpretContext>)
                    .transpose()?;
                let interpretation = interpreter
                    .interpret_or(&req.input, context.as_ref(), CommandInterpretation::unavailable())
                    .await;
                to_value(&interpretation)
            }
            "explain" => json!({ "explanation": interpreter.explain(&req.input).await }),
            "suggest" => {
                let context = match &req.context {
                    Some(Value::String(s)) if req.input.is_empty() => s.clone(),
                    _ => req.input.clone(),
                };
                json!({ "suggestions": interpreter.suggest(&context).await })
            }
            "test" => {
                let (online, message) = interpreter.test().await;
                json!({ "status": if online { "success" } else { "error" }, "message": message })
            }
            "hack_challenge_intro" => json!({ "intro": interpreter.hack_intro().await }),
            "hack_readme" => json!({ "readme": interpreter.hack_readme().await }),
            "hack_hint" => {
                let session = self.sessions.get_or_create(req.session_id.as_deref());
                json!({ "hint": self.router.interpreter().hack_hint(&session.hack).await })
            }
            _ => return Err(ApiError::BadRequest("Invalid action".into())),
        };
        Ok(value)
    }

    /// Structured form of the multipart upload.
    pub fn upload(&mut self, body: &Value) -> ApiResponse {
        match self.try_upload(body) {
            Ok(value) => ApiResponse::ok(value),
            Err(e) => e.into(),
        }
    }

    fn try_upload(&mut self, body: &Value) -> Result<Value, ApiError> {
        let req: UploadRequest = parse(body)?;
        if req.files.is_empty() {
            return Err(ApiError::BadRequest("No files provided".into()));
        }
        let session = self.sessions.get_or_create(req.session_id.as_deref());
        let path = req
            .path
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| session.shell.home().to_string());

        let mut stored = Vec::new();
        for part in &req.files {
            let content = part.decode()?;
            if content.is_empty() {
                continue;
            }
            let upload = FileUpload::new(&part.name, content, &path, &part.mime);
            let summary = json!({ "name": upload.name, "size": upload.size, "path": upload.path });
            if session.fs.upload_file(upload) {
                stored.push(summary);
            } else {
                log::warn!("rejected upload named {:?}", part.name);
            }
        }
        Ok(json!({
            "success": true,
            "message": format!("Uploaded {} file(s)", stored.len()),
            "files": stored,
        }))
    }

    pub fn list_uploads(&mut self, session: Option<&str>) -> ApiResponse {
        let session = self.sessions.get_or_create(session);
        let files: Vec<Value> = session
            .fs
            .uploaded_files()
            .into_iter()
            .map(|f| json!({ "name": f.name, "path": f.path, "size": f.size, "type": f.mime }))
            .collect();
        ApiResponse::ok(json!({ "files": files }))
    }

    pub fn clear_uploads(&mut self, session: Option<&str>) -> ApiResponse {
        self.sessions.get_or_create(session).fs.clear_uploaded_files();
        ApiResponse::ok(json!({ "success": true, "message": "All uploaded files cleared" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hybrid::HybridFs;
    use crate::interpreter::FRIENDLY_EXPLANATION;
    use crate::session::Session;
    use crate::shell::ShellExecutor;
    use crate::vfs::Vfs;
    use crate::model::testing::ScriptedModel;
    use futures::executor::block_on;

    fn service(model: ScriptedModel) -> Service {
        let env = Environment::remote();
        let router = Router::new(env, Interpreter::new(Box::new(model)));
        Service::new(router, Sessions::new(env, Config::default()))
    }

    #[test]
    fn test_execute_requires_string_command() {
        let mut svc = service(ScriptedModel::failing());
        for body in [json!({}), json!({ "command": 42 }), json!({ "command": "  " })] {
            let resp = block_on(svc.execute(&body));
            assert_eq!(resp.status, 400);
            assert_eq!(resp.body["error"], MISSING_COMMAND);
        }
    }

    #[test]
    fn test_execute_returns_camel_case_result() {
        let mut svc = service(ScriptedModel::failing());
        let resp = block_on(svc.execute(&json!({ "command": "cd intel", "workingDirectory": "/var/games" })));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["exitCode"], 0);
        assert_eq!(resp.body["currentWorkingDirectory"], "/var/games/intel");
        assert_eq!(resp.body["isSimulated"], true);
    }

    #[test]
    fn test_execute_internal_error_is_500() {
        let mut svc = service(ScriptedModel::failing());
        let env = Environment::remote();
        let mut bare = Session::with_shell(ShellExecutor::remote(&Config::default()), env);
        bare.fs = HybridFs::with_tree(env, Vfs::new());
        svc.sessions().insert("bare", bare);

        let resp = block_on(svc.execute(&json!({ "command": "hack", "sessionId": "bare" })));
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body["error"], "Internal server error");
        assert_eq!(resp.body["stderr"], "Internal server error");
        assert_eq!(resp.body["exitCode"], 1);
        assert_eq!(resp.body["success"], false);
        assert_eq!(resp.body["currentWorkingDirectory"], "/home/user");
    }

    #[test]
    fn test_execute_keeps_sessions_apart() {
        let mut svc = service(ScriptedModel::failing());
        block_on(svc.execute(&json!({ "command": "cd documents", "sessionId": "a" })));
        let a = block_on(svc.execute(&json!({ "command": "pwd", "sessionId": "a" })));
        let b = block_on(svc.execute(&json!({ "command": "pwd", "sessionId": "b" })));
        assert_eq!(a.body["stdout"], "/home/user/documents\n");
        assert_eq!(b.body["stdout"], "/home/user\n");
    }

    #[test]
    fn test_interpret_requires_key() {
        let mut svc = service(ScriptedModel::unconfigured());
        let resp = block_on(svc.interpret(&json!({ "action": "interpret", "input": "list files" })));
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body["error"], MISSING_KEY);
    }

    #[test]
    fn test_interpret_rejects_bad_requests() {
        let mut svc = service(ScriptedModel::always("x"));
        let unknown = block_on(svc.interpret(&json!({ "action": "dance", "input": "x" })));
        assert_eq!(unknown.status, 400);
        assert_eq!(unknown.body["error"], "Invalid action");
        let malformed = block_on(svc.interpret(&json!({ "input": "no action" })));
        assert_eq!(malformed.status, 400);
    }

    #[test]
    fn test_interpret_failure_is_conversational() {
        let mut svc = service(ScriptedModel::sequence(vec![Err(crate::model::ModelError::Malformed(
            "not json".into(),
        ))]));
        let resp = block_on(svc.interpret(&json!({ "action": "interpret", "input": "show files" })));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["commands"], json!([]));
        assert_eq!(resp.body["explanation"], FRIENDLY_EXPLANATION);
        assert_eq!(resp.body["confidence"], 0.8);
        assert_eq!(resp.body["isComplex"], false);
    }

    #[test]
    fn test_interpret_with_context() {
        let mut svc = service(ScriptedModel::always(
            r#"{"commands":["cat smily"],"explanation":"show it","confidence":0.9,"isComplex":false}"#,
        ));
        let body = json!({
            "action": "interpret",
            "input": "show the smily file",
            "context": { "currentDirectory": "/home/user", "directoryContents": ["smiley.txt"], "recentCommands": [] }
        });
        let resp = block_on(svc.interpret(&body));
        assert_eq!(resp.body["commands"], json!(["cat smiley.txt"]));
    }

    #[test]
    fn test_other_actions() {
        let mut svc = service(ScriptedModel::always("1. ls\n2. pwd"));
        let suggest = block_on(svc.interpret(&json!({ "action": "suggest", "input": "new project" })));
        assert_eq!(suggest.body["suggestions"], json!(["ls", "pwd"]));
        let test = block_on(svc.interpret(&json!({ "action": "test" })));
        assert_eq!(test.body["status"], "success");
        let hint = block_on(svc.interpret(&json!({ "action": "hack_hint", "sessionId": "s" })));
        assert!(hint.body["hint"].is_string());
        assert!(block_on(svc.interpret(&json!({ "action": "hack_readme" }))).body["readme"].is_string());
        assert!(block_on(svc.interpret(&json!({ "action": "hack_challenge_intro" }))).body["intro"].is_string());
        assert!(block_on(svc.interpret(&json!({ "action": "explain", "input": "ls" }))).body["explanation"].is_string());
    }

    #[test]
    fn test_connection_offline() {
        let mut svc = service(ScriptedModel::failing());
        let resp = block_on(svc.interpret(&json!({ "action": "test" })));
        assert_eq!(resp.body["status"], "error");
        assert_eq!(resp.body["message"], crate::interpreter::OFFLINE_MESSAGE);
    }

    #[test]
    fn test_upload_list_and_clear() {
        let mut svc = service(ScriptedModel::failing());
        let body = json!({
            "files": [
                { "name": "plain.txt", "content": "hello", "type": "text/plain" },
                { "name": "encoded.txt", "content": "aGkgdGhlcmU=", "encoding": "base64" },
                { "name": "empty.txt", "content": "" }
            ]
        });
        let resp = svc.upload(&body);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["message"], "Uploaded 2 file(s)");
        assert_eq!(resp.body["files"][1]["size"], 8);
        assert_eq!(resp.body["files"][0]["path"], "/home/user");

        let cat = block_on(svc.execute(&json!({ "command": "cat encoded.txt" })));
        assert_eq!(cat.body["stdout"], "hi there");
        let ls = block_on(svc.execute(&json!({ "command": "ls" })));
        assert!(ls.body["stdout"].as_str().unwrap().contains("plain.txt"));

        let listed = svc.list_uploads(None);
        assert_eq!(listed.body["files"].as_array().unwrap().len(), 2);
        assert_eq!(listed.body["files"][1]["type"], "text/plain");

        let cleared = svc.clear_uploads(None);
        assert_eq!(cleared.body["message"], "All uploaded files cleared");
        assert!(svc.list_uploads(None).body["files"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_upload_errors() {
        let mut svc = service(ScriptedModel::failing());
        let none = svc.upload(&json!({ "files": [] }));
        assert_eq!(none.status, 400);
        assert_eq!(none.body["error"], "No files provided");
        let bad = svc.upload(&json!({ "files": [{ "name": "x", "content": "%%%", "encoding": "base64" }] }));
        assert_eq!(bad.status, 400);
    }

    #[test]
    fn test_submit_endpoint() {
        let mut svc = service(ScriptedModel::failing());
        let resp = block_on(svc.submit(&json!({ "input": "pwd" })));
        assert_eq!(resp.body["steps"][0]["result"]["stdout"], "/home/user\n");
        assert!(resp.body["interpretation"].is_null());
    }
}
