//! CLI command execution.
//!
//! This is a thin client - every session operation goes through the server.

use std::io::Write as _;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::clock::{self, Clock, SystemClock};
use crate::config::Config;
use crate::models::{DurationPicker, WatchDuration, PRESET_MINUTES};
use crate::server::{
    self, ChallengeResponse, LifecycleRequest, PreviewResponse, RouteRequest, RouteView,
    SessionView, StartRequest,
};
use crate::session::AppState;

use super::args::{Cli, Commands};

/// Thin HTTP client for the local server.
struct Api {
    client: reqwest::Client,
    base: String,
}

impl Api {
    async fn connect(config: &Config) -> Result<Self> {
        let port = server::ensure_server_running(config).await?;
        Ok(Self {
            client: reqwest::Client::new(),
            base: format!("http://127.0.0.1:{port}"),
        })
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder, what: &str) -> Result<T> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to {what}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            match body.get("error").and_then(|e| e.as_str()) {
                Some(err) => bail!("Server returned {status}: {err}"),
                None => bail!("Server returned {status}"),
            }
        }

        resp.json().await.context("Failed to parse response")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn session(&self) -> Result<SessionView> {
        self.send(self.client.get(self.url("/api/session")), "get session")
            .await
    }
}

fn print_session(view: &SessionView) {
    if view.active {
        println!("Session active: {} remaining", view.countdown);
    } else {
        println!("No active session");
    }
}

/// Read one trimmed line from stdin; `None` at end of input.
async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> Result<Option<String>> {
    println!("{text}");
    let line = lines.next_line().await.context("Failed to read stdin")?;
    Ok(line.map(|l| l.trim().to_string()))
}

/// Interactive duration selection.
async fn pick_duration(lines: &mut Lines<BufReader<Stdin>>) -> Result<WatchDuration> {
    let mut picker = DurationPicker::default();
    let presets = PRESET_MINUTES.map(|m| m.to_string()).join("/");

    loop {
        let current = picker.current();
        let ends = clock::preview_end(SystemClock.now_ms(), current.minutes()).unwrap_or_default();
        let mode = if picker.is_custom() { "custom" } else { "preset" };
        let text = format!(
            "Duration: {current} ({mode}), ends at {ends}\n  [{presets}] preset, [c] custom, [+/-] adjust, [enter] confirm"
        );

        let Some(input) = prompt(lines, &text).await? else {
            bail!("Cancelled");
        };
        match input.as_str() {
            "" => return Ok(current),
            "c" => picker.toggle_custom(),
            "+" => picker.increment(),
            "-" => picker.decrement(),
            other => match other.parse::<u32>() {
                Ok(minutes) if PRESET_MINUTES.contains(&minutes) => picker.select_preset(minutes),
                _ => println!("Unrecognised input: {other}"),
            },
        }
    }
}

async fn start(api: &Api, minutes: Option<u32>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let minutes = match minutes {
        Some(m) => WatchDuration::new(m)?,
        None => pick_duration(&mut lines).await?,
    };

    let challenge: ChallengeResponse = api
        .send(api.client.post(api.url("/api/challenge")), "request challenge")
        .await?;
    let Some(answer) = prompt(&mut lines, &format!("Parent check: {}", challenge.question)).await?
    else {
        bail!("Cancelled");
    };
    let answer: u32 = answer.parse().context("Answer must be a number")?;

    let view: SessionView = api
        .send(
            api.client.post(api.url("/api/session")).json(&StartRequest {
                minutes,
                challenge_id: challenge.id,
                answer,
            }),
            "start session",
        )
        .await?;
    print_session(&view);
    Ok(())
}

async fn watch(api: &Api) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        let view = api.session().await?;
        if !view.active {
            println!("\nSession over");
            return Ok(());
        }
        print!("\r{} remaining ", view.countdown);
        std::io::stdout().flush().ok();
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config = Config::from_cli(&cli)?;

    match cli.command {
        Commands::Serve { open } => server::start_server(&config, open).await,
        command => {
            let api = Api::connect(&config).await?;
            run_client(&api, command).await
        }
    }
}

async fn run_client(api: &Api, command: Commands) -> Result<()> {
    match command {
        Commands::Serve { .. } => bail!("serve does not run through the client"),
        Commands::Status => print_session(&api.session().await?),
        Commands::Start { minutes } => start(api, minutes).await?,
        Commands::End => {
            let view: SessionView = api
                .send(api.client.delete(api.url("/api/session")), "end session")
                .await?;
            print_session(&view);
        }
        Commands::Reload => {
            let view: SessionView = api
                .send(api.client.post(api.url("/api/session/reload")), "reload session")
                .await?;
            print_session(&view);
        }
        Commands::Preview { minutes } => {
            let preview: PreviewResponse = api
                .send(
                    api.client
                        .get(api.url("/api/preview"))
                        .query(&[("minutes", minutes)]),
                    "preview session",
                )
                .await?;
            match preview.ends_at {
                Some(ends_at) => println!("{} min would end at {ends_at}", preview.minutes),
                None => println!("{} min would end at {}", preview.minutes, preview.expires_at),
            }
        }
        Commands::Lifecycle { state } => {
            let view: SessionView = api
                .send(
                    api.client
                        .post(api.url("/api/lifecycle"))
                        .json(&LifecycleRequest {
                            state: AppState::from(state),
                        }),
                    "report lifecycle",
                )
                .await?;
            print_session(&view);
        }
        Commands::Navigate { path } => {
            let route: RouteView = api
                .send(
                    api.client
                        .post(api.url("/api/route"))
                        .json(&RouteRequest { path: path.clone() }),
                    "navigate",
                )
                .await?;
            if route.path == path {
                println!("Now at {}", route.path);
            } else {
                println!("Redirected to {}", route.path);
            }
        }
        Commands::Watch => watch(api).await?,
    }

    Ok(())
}
