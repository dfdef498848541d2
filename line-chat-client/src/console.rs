use std::{io::BufRead, thread};

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncWriteExt},
    select,
    sync::mpsc,
};
use tracing::{info, warn};

use crate::{
    cli::{ClientArgs, OutputFormat},
    client::ChatClient,
    event::ChatEvent,
    listener,
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let client = ChatClient::new();
    let (listener, mut events) = listener::channel();
    client.add_listener(listener);

    establish_session(&client, &args).await?;

    let console = Console::new(&args);
    let mut stdin = spawn_stdin_reader()?;

    run_console_loop(&client, &console, &mut events, &mut stdin).await?;
    client.disconnect().await;

    Ok(())
}

async fn establish_session(client: &ChatClient, args: &ClientArgs) -> Result<()> {
    if !client.connect(&args.host, args.port).await {
        anyhow::bail!(client.last_error());
    }
    info!(host = %args.host, port = args.port, "connected");

    client
        .start_listening()
        .await
        .context("listen loop did not start")?;

    if !client.try_login(&args.username).await {
        let reason = client.last_error();
        client.disconnect().await;
        anyhow::bail!(reason);
    }
    Ok(())
}

async fn run_console_loop(
    client: &ChatClient,
    console: &Console,
    events: &mut mpsc::UnboundedReceiver<ChatEvent>,
    stdin: &mut mpsc::UnboundedReceiver<io::Result<String>>,
) -> Result<()> {
    loop {
        select! {
            event = events.recv() => {
                if !handle_event(event, console).await? {
                    break;
                }
            }
            line = stdin.recv() => {
                if !handle_stdin_input(line, client).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_event(event: Option<ChatEvent>, console: &Console) -> Result<bool> {
    let Some(event) = event else {
        return Ok(false);
    };

    match console.render(&event)? {
        Output::Stdout(line) => write_stdout(&line).await?,
        Output::Stderr(line) => write_stderr(&line).await?,
    }
    Ok(event != ChatEvent::Disconnected)
}

async fn handle_stdin_input(line: Option<io::Result<String>>, client: &ChatClient) -> Result<bool> {
    let Some(line) = line else {
        return Ok(false);
    };
    let line = line.context("failed to read stdin")?;

    let sent = match parse_input(line.trim_end()) {
        Input::Empty => return Ok(true),
        Input::Quit => {
            write_stdout("*** leaving chat").await?;
            return Ok(false);
        }
        Input::Invalid(reason) => {
            write_stderr(&format!("!!! {reason}")).await?;
            return Ok(true);
        }
        Input::Users => client.refresh_user_list().await,
        Input::Help => client.ask_supported_commands().await,
        Input::Private { recipient, text } => client.send_private_message(recipient, text).await,
        Input::Public(text) => client.send_public_message(text).await,
    };

    if !sent {
        write_stderr(&format!("!!! {}", client.last_error())).await?;
    }
    Ok(true)
}

// Blocking stdin reads live on their own thread so a pending read never
// holds up runtime shutdown once the session is over.
fn spawn_stdin_reader() -> Result<mpsc::UnboundedReceiver<io::Result<String>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        })
        .context("failed to spawn stdin reader")?;
    Ok(rx)
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Quit,
    Users,
    Help,
    Private { recipient: &'a str, text: &'a str },
    Public(&'a str),
    Invalid(String),
}

fn parse_input(text: &str) -> Input<'_> {
    if text.trim().is_empty() {
        return Input::Empty;
    }
    let Some(command) = text.strip_prefix('/') else {
        return Input::Public(text);
    };

    let (word, argument) = command.split_once(' ').unwrap_or((command, ""));
    match word.to_ascii_lowercase().as_str() {
        "quit" => Input::Quit,
        "users" => Input::Users,
        "help" => Input::Help,
        "privmsg" => match argument.trim_start().split_once(' ') {
            Some((recipient, text)) => Input::Private { recipient, text },
            None if !argument.trim().is_empty() => Input::Private {
                recipient: argument.trim(),
                text: "",
            },
            None => Input::Invalid("usage: /privmsg <user> <text>".to_string()),
        },
        other => Input::Invalid(format!("unknown command /{other}")),
    }
}

enum Output {
    Stdout(String),
    Stderr(String),
}

struct Console {
    username: String,
    format: OutputFormat,
}

impl Console {
    fn new(args: &ClientArgs) -> Self {
        Self {
            username: args.username.clone(),
            format: args.format,
        }
    }

    fn render(&self, event: &ChatEvent) -> Result<Output> {
        if self.format == OutputFormat::Json {
            let encoded = serde_json::to_string(event).context("failed to encode event")?;
            return Ok(Output::Stdout(encoded));
        }

        let output = match event {
            ChatEvent::LoginResult { success: true, .. } => {
                Output::Stdout(format!("*** logged in as {}", self.username))
            }
            ChatEvent::LoginResult {
                success: false,
                error,
            } => Output::Stderr(format!(
                "!!! login failed: {}",
                error.as_deref().unwrap_or("no reason given")
            )),
            ChatEvent::Disconnected => Output::Stdout("*** disconnected from server".to_string()),
            ChatEvent::UserList { users } => {
                Output::Stdout(format!("*** currently online: {}", users.join(", ")))
            }
            ChatEvent::MessageReceived(message) if message.private => {
                Output::Stdout(format!("[private] <{}> {}", message.sender, message.text))
            }
            ChatEvent::MessageReceived(message) => {
                Output::Stdout(format!("<{}> {}", message.sender, message.text))
            }
            ChatEvent::MessageError { error } => {
                Output::Stderr(format!("!!! message not delivered: {error}"))
            }
            ChatEvent::CommandError { error } => {
                Output::Stderr(format!("!!! command not understood: {error}"))
            }
            ChatEvent::SupportedCommands { commands } => {
                Output::Stdout(format!("*** server supports: {}", commands.join(", ")))
            }
        };
        Ok(output)
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
