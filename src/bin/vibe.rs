//! Line-oriented host: runs the engine against the real shell.

#[cfg(not(target_arch = "wasm32"))]
mod host {
    use std::io::{self, BufRead, Write};
    use vibe_terminal::interpreter::Interpreter;
    use vibe_terminal::model::OpenAiModel;
    use vibe_terminal::router::{BANNER, CLEAR_SEQUENCE};
    use vibe_terminal::shell::prompt;
    use vibe_terminal::{logging, Config, Environment, Router, Session, Submission};

    fn render(submission: &Submission) {
        if let Some(reply) = submission.reply() {
            println!("Berto: {}", reply);
            return;
        }
        if let Some(interpretation) = &submission.interpretation {
            if interpretation.confidence > 0.0 {
                println!("# {}", interpretation.explanation);
            }
        }
        let echo_commands = submission.steps.len() > 1 || submission.interpretation.is_some();
        for step in &submission.steps {
            if echo_commands {
                println!("$ {}", step.command);
            }
            let result = &step.result;
            if result.stdout == CLEAR_SEQUENCE {
                print!("\x1b[2J\x1b[H");
            } else if !result.stdout.is_empty() {
                print!("{}", result.stdout);
                if !result.stdout.ends_with('\n') {
                    println!();
                }
            }
            if !result.stderr.is_empty() {
                eprintln!("{}", result.stderr.trim_end());
            }
        }
    }

    pub async fn run() -> io::Result<()> {
        logging::init();
        let config = Config::from_env();
        let env = Environment::with_override(config.mode);
        let interpreter = Interpreter::new(Box::new(OpenAiModel::from_config(&config)));
        if !interpreter.is_configured() {
            log::warn!("OPENAI_API_KEY is not set; plain-English input will run as typed");
        }
        let router = Router::new(env, interpreter).with_recent_commands(config.recent_commands);
        let mut session = Session::new(env, &config);

        print!("{}", BANNER);
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("{}", prompt(session.shell.cwd(), session.shell.home()));
            io::stdout().flush()?;
            let Some(line) = lines.next() else {
                println!();
                break;
            };
            let line = line?;
            match line.trim() {
                "" => continue,
                "exit" | "quit" | "logout" => break,
                input => {
                    let submission = router.submit(&mut session, input).await;
                    render(&submission);
                }
            }
        }
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() {
    if let Err(e) = host::run().await {
        eprintln!("vibe: {}", e);
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}
