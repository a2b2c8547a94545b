//! Console notifier binary.
//!
//! Wires the session core to a console presentation backend and a
//! line-delimited demo connector: one tab-separated command per line,
//! channel first, then tag, then arguments. Real deployments plug in
//! their own framed transport and tray backend instead.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use notifier::{
    Channel, Config, Connector, LinkError, LinkEvent, LinkHandle, OutboundCommand,
    Presentation, Session, TaggedCommand,
};

#[derive(Parser)]
#[command(name = "notifier")]
#[command(version)]
#[command(about = "Persistent-connection site notifier (console backend)", long_about = None)]
struct Cli {
    /// Config file path (default: <config dir>/notifier/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start with notifications disabled (stats only)
    #[arg(long)]
    disabled: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(async move {
        let store = ConfigStore::open();
        let enabled = !cli.disabled && store.get("enabled") != "false";

        let connector = LineConnector {
            host: config.connection.host.clone(),
            port: config.connection.port,
        };
        let session = Session::new(
            config,
            Box::new(connector),
            Box::new(ConsolePresentation { store }),
        );
        let handle = session.handle();
        handle.set_enabled(enabled, false);

        let signal_handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received interrupt, shutting down");
                signal_handle.quit();
            }
        });

        session.run().await;
        println!("notifier runloop complete");
        Ok(())
    })
}

/// Key-value store persisted as a small TOML file.
struct ConfigStore {
    path: Option<PathBuf>,
    values: HashMap<String, String>,
}

impl ConfigStore {
    fn open() -> Self {
        let path = dirs::config_dir().map(|d| d.join("notifier").join("state.toml"));
        let values = path
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|text| toml::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, values }
    }

    fn get(&self, key: &str) -> String {
        self.values.get(key).cloned().unwrap_or_default()
    }

    fn set(&mut self, key: &str, value: &str) -> bool {
        self.values.insert(key.to_string(), value.to_string());
        let Some(path) = &self.path else {
            return false;
        };
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }
        match toml::to_string(&self.values) {
            Ok(text) => std::fs::write(path, text).is_ok(),
            Err(_) => false,
        }
    }
}

/// Presentation backend printing to stdout, like the original console build.
struct ConsolePresentation {
    store: ConfigStore,
}

impl Presentation for ConsolePresentation {
    fn notify(&mut self, title: &str, text: &str, url: &str, _sticky: bool, _priority: bool) {
        println!("Notify:  {title}");
        println!("         {text}");
        println!("        ({url})");
    }

    fn open_url(&mut self, url: &str) {
        println!("URL:     {url}");
    }

    fn set_tooltip_lines(&mut self, lines: &[String]) {
        for (i, line) in lines.iter().enumerate() {
            if i == 0 {
                println!("Tooltip:  {line}");
            } else {
                println!("          {line}");
            }
        }
    }

    fn needs_update(&mut self, url: &str) -> bool {
        tracing::info!("update available at '{url}'; console build does not self-update");
        false
    }

    fn read_config(&mut self, key: &str) -> String {
        self.store.get(key)
    }

    fn write_config(&mut self, key: &str, value: &str) -> bool {
        self.store.set(key, value)
    }
}

/// Demo connector: newline-delimited, tab-separated commands over TCP.
struct LineConnector {
    host: String,
    port: u16,
}

impl Connector for LineConnector {
    fn connect(&mut self) -> (Box<dyn LinkHandle>, mpsc::UnboundedReceiver<LinkEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(link_task(
            self.host.clone(),
            self.port,
            event_tx,
            out_rx,
            cancel.clone(),
        ));
        (
            Box::new(LineLink {
                out: out_tx,
                cancel,
            }),
            event_rx,
        )
    }
}

struct LineLink {
    out: mpsc::UnboundedSender<OutboundCommand>,
    cancel: CancellationToken,
}

impl LinkHandle for LineLink {
    fn send(&self, command: OutboundCommand) {
        let _ = self.out.send(command);
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

async fn link_task(
    host: String,
    port: u16,
    events: mpsc::UnboundedSender<LinkEvent>,
    mut out_rx: mpsc::UnboundedReceiver<OutboundCommand>,
    cancel: CancellationToken,
) {
    let stream = tokio::select! {
        () = cancel.cancelled() => return,
        stream = TcpStream::connect((host.as_str(), port)) => stream,
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = events.send(LinkEvent::Failed(LinkError::Network(e.to_string())));
            return;
        }
    };

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let _ = events.send(LinkEvent::Ready);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            line = lines.next_line() => {
                let event = match line {
                    Ok(Some(line)) => parse_line(&line),
                    Ok(None) => LinkEvent::Failed(LinkError::Network(
                        "connection closed by peer".to_string(),
                    )),
                    Err(e) => LinkEvent::Failed(LinkError::Network(e.to_string())),
                };
                let terminal = matches!(event, LinkEvent::Failed(_));
                if events.send(event).is_err() || terminal {
                    return;
                }
            }
            command = out_rx.recv() => {
                let Some(command) = command else { return };
                if let Err(e) = writer.write_all(render(&command).as_bytes()).await {
                    let _ = events.send(LinkEvent::Failed(LinkError::Network(e.to_string())));
                    return;
                }
            }
        }
    }
}

fn parse_line(line: &str) -> LinkEvent {
    let mut fields = line.split('\t');
    let channel = fields.next().unwrap_or("");
    let rest: Vec<String> = fields.map(str::to_string).collect();

    let channel = match channel {
        "control" => Channel::Control,
        "presence" => Channel::Presence,
        "stats" => Channel::Stats,
        "error" => {
            return match rest.first().map(String::as_str) {
                Some("version") => LinkEvent::Failed(LinkError::Version {
                    update_url: rest.get(1).cloned().unwrap_or_default(),
                }),
                _ => LinkEvent::Failed(LinkError::Framing(
                    rest.join(" "),
                )),
            };
        }
        other => {
            return LinkEvent::Failed(LinkError::Framing(format!("unknown channel '{other}'")));
        }
    };

    let Some((tag, args)) = rest.split_first() else {
        return LinkEvent::Failed(LinkError::Framing("missing command tag".to_string()));
    };
    LinkEvent::Command(channel, TaggedCommand::new(tag.clone(), args.to_vec()))
}

fn render(command: &OutboundCommand) -> String {
    match command {
        OutboundCommand::Register {
            cookie,
            user_agent,
            protocol_version,
        } => format!("register\t{cookie}\t{user_agent}\t{protocol_version}\n"),
        OutboundCommand::SubscribePresence => "subscribe\tpresence\n".to_string(),
        OutboundCommand::CancelPresence => "cancel\tpresence\n".to_string(),
        OutboundCommand::SubscribeStats => "subscribe\tstats\n".to_string(),
        OutboundCommand::Log { message, severity } => {
            format!("log\t{message}\t{}\n", severity.code())
        }
    }
}
