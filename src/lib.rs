pub mod api;
pub mod config;
pub mod environment;
pub mod fuzzy;
pub mod gate;
pub mod hack;
pub mod hybrid;
pub mod interpreter;
pub mod logging;
pub mod model;
pub mod network;
pub mod prompts;
pub mod router;
pub mod session;
pub mod shell;
pub mod system;
pub mod vfs;

pub use api::{ApiResponse, Service};
pub use config::Config;
pub use environment::Environment;
pub use router::{ExecutionResult, Router, Submission};
pub use session::Session;
pub use system::System;
