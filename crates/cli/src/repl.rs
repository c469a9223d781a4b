use std::io::{self, Write};
use std::time::Duration;

use jarvis_core::router::Router;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SPINNER: [&str; 4] = ["-", "\\", "|", "/"];

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

/// Read utterances until `/q`, EOF or Ctrl-C and print each reply.
pub async fn run(router: Router) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    spawn_sigint_canceler(token.clone());

    println!("jarvis ready ({} functions). /q to quit.", router.registry().len());
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    spawn_input_thread(line_tx, ready_rx);
    request_next_prompt(&ready_tx);

    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = line_rx.recv() => event,
        };
        let Some(event) = event else {
            break;
        };

        match event {
            InputEvent::Line(line) => {
                let text = line.trim();
                if text.is_empty() {
                    request_next_prompt(&ready_tx);
                    continue;
                }
                if matches!(text, "/q" | "/exit" | "/quit") {
                    break;
                }
                let Some(reply) = answer(&router, text, &token).await? else {
                    break;
                };
                println!("Jarvis> {reply}");
                request_next_prompt(&ready_tx);
            }
            InputEvent::Interrupted => {
                token.cancel();
                break;
            }
            InputEvent::Eof => break,
            InputEvent::Error(err) => {
                eprintln!("input error: {err}");
                break;
            }
        }
    }
    drop(ready_tx);
    println!();
    Ok(())
}

/// Route one line with a spinner. `None` when cancelled mid-request.
async fn answer(router: &Router, text: &str, token: &CancellationToken) -> anyhow::Result<Option<String>> {
    let mut spinner_idx = 0;
    let mut spinner = tokio::time::interval(Duration::from_millis(100));
    spinner.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let request = router.process_request(text);
    tokio::pin!(request);
    let reply = loop {
        tokio::select! {
            _ = token.cancelled() => {
                clear_current_line()?;
                return Ok(None);
            }
            reply = &mut request => break reply,
            _ = spinner.tick() => {
                draw_thinking_frame(SPINNER[spinner_idx])?;
                spinner_idx = (spinner_idx + 1) % SPINNER.len();
            }
        }
    };
    clear_current_line()?;
    Ok(Some(reply))
}

fn draw_thinking_frame(frame: &str) -> anyhow::Result<()> {
    print!("\rthinking... {frame}");
    io::stdout().flush()?;
    Ok(())
}

fn clear_current_line() -> anyhow::Result<()> {
    print!("\r\x1b[2K");
    io::stdout().flush()?;
    Ok(())
}

fn request_next_prompt(ready_tx: &std::sync::mpsc::Sender<()>) {
    let _ = ready_tx.send(());
}

fn spawn_input_thread(line_tx: mpsc::UnboundedSender<InputEvent>, ready_rx: std::sync::mpsc::Receiver<()>) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            match editor.readline("You> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    if line_tx.send(InputEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    let _ = line_tx.send(InputEvent::Interrupted);
                    break;
                }
                Err(ReadlineError::Eof) => {
                    let _ = line_tx.send(InputEvent::Eof);
                    break;
                }
                Err(e) => {
                    let _ = line_tx.send(InputEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    });
}

fn spawn_sigint_canceler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}
