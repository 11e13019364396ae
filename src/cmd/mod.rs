use anyhow::{bail, Context, Result};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use crate::app::{create_router, AppState, Server};
use crate::config::ModelSettings;
use crate::envconfig::Host;
use crate::facade::{get_model, LineSource, ScriptedInput, TerminalInput, MAX_BATCH_SIZE, MAX_SEQ_LEN};
use crate::infra::inspect as inspect_checkpoint;

/// Answers a single prompt and prints the response.
pub async fn run(settings: ModelSettings, args: Vec<String>) -> Result<()> {
    let prompt = args.join(" ");
    if prompt.trim().is_empty() {
        bail!("no prompt given");
    }

    tokio::task::spawn_blocking(move || -> Result<()> {
        let model = get_model(&settings).context("Failed to load model")?;
        let response = model.run(&prompt)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", response)?;
        stdout.flush()?;
        Ok(())
    })
    .await?
}

/// Interactive chat on stdin/stdout.
pub async fn chat(settings: ModelSettings) -> Result<()> {
    let model = tokio::task::spawn_blocking(move || get_model(&settings))
        .await?
        .context("Failed to load model")?;

    let interactive = io::stdin().is_terminal();
    if let Some(handle) = model.interrupt_handle().filter(|_| interactive) {
        // Ctrl-C stops the answer being streamed; at the prompt the line editor handles it.
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        });
    }

    tokio::task::spawn_blocking(move || -> Result<()> {
        let stdin = io::stdin();
        let mut input: Box<dyn LineSource> = if interactive {
            println!(">>> Chatting with {}. Type /help for commands, /exit to quit", model.variant());
            Box::new(TerminalInput::new()?)
        } else {
            Box::new(ScriptedInput::new(stdin.lock()))
        };

        let mut stdout = io::stdout();
        model.chat(input.as_mut(), &mut stdout)?;
        Ok(())
    })
    .await?
}

/// Serves the web demo until the process is stopped.
pub async fn serve(settings: ModelSettings, host: Option<String>) -> Result<()> {
    let host = host.map(|h| Host::parse(&h)).unwrap_or_else(Host::from_env);

    let model = tokio::task::spawn_blocking(move || get_model(&settings))
        .await?
        .context("Failed to load model")?;

    Server::new()
        .host(host.host)
        .port(host.port)
        .routes(create_router(AppState::new(model)))
        .run()
        .await
}

/// Prints what would be loaded, without reading any weights.
pub async fn inspect(settings: ModelSettings) -> Result<()> {
    let ckpt_dir: PathBuf = settings.ckpt_dir();
    let summary = inspect_checkpoint(&ckpt_dir, settings.tokenizer_path(), MAX_SEQ_LEN, MAX_BATCH_SIZE)
        .with_context(|| format!("Failed to inspect {}", ckpt_dir.display()))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
