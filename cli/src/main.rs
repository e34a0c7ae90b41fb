use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use txrect::config::{ConfigError, TxConfig};
use txrect::feature::{Feature, MemoryStore, Rectangle};
use txrect::geo::{Point, Surface};
use txrect::handles::HandleSet;
use txrect::input::{PointerEvent, TargetTags};
use txrect::mode::{Action, EnterOptions, ModeError, TxRectMode};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("mode: {0}")]
    Mode(#[from] ModeError),
}

#[derive(Parser, Debug)]
#[command(name = "txrect-cli", about = "Rectangle rotate/scale/move engine CLI")]
struct Cli {
    /// Treat coordinates as planar x/y instead of lng/lat.
    #[arg(long, global = true, default_value_t = false)]
    planar: bool,

    /// JSON config file; defaults come from TXRECT_* environment variables.
    #[arg(long, global = true, env = "TXRECT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the vertex and rotation handles for a rectangle.
    Handles {
        /// Ring as JSON, e.g. `[[0,0],[1,0],[1,1],[0,1]]`.
        #[arg(long)]
        rect: String,
    },
    /// Replay a scripted gesture against a rectangle.
    Replay {
        #[arg(long)]
        rect: String,
        #[arg(long, default_value = "-", help = "Script file path, or - for stdin")]
        script: String,
    },
}

/// One scripted input event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Step {
    Down(StepPoint),
    Move(StepPoint),
    Up(StepPoint),
    Leave(StepPoint),
    Click(StepPoint),
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
struct StepPoint {
    lng: f64,
    lat: f64,
    #[serde(default)]
    target: Option<TargetTags>,
    #[serde(default)]
    shift: bool,
}

impl StepPoint {
    fn event(&self) -> PointerEvent {
        let event = PointerEvent::new(Point::new(self.lng, self.lat), self.target);
        if self.shift { event.with_shift() } else { event }
    }
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    actions: Vec<Action>,
    rectangle: Rectangle,
}

fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Handles { rect } => run_handles(config, &rect),
        Command::Replay { rect, script } => run_replay(config, &rect, &script),
    }
}

fn load_config(cli: &Cli) -> Result<TxConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => TxConfig::from_json_str(&read_source(&path.to_string_lossy())?)?,
        None => TxConfig::from_env()?,
    };
    if cli.planar {
        config.surface = Surface::Planar;
    }
    tracing::debug!(?config, "config loaded");
    Ok(config)
}

fn run_handles(config: TxConfig, rect: &str) -> Result<(), CliError> {
    let rect: Rectangle = serde_json::from_str(rect)?;
    let handles = HandleSet::layout(config.surface, &rect, &[], config.rotation_handle_radius);
    print_json(&handles)
}

fn run_replay(config: TxConfig, rect: &str, script: &str) -> Result<(), CliError> {
    let rect: Rectangle = serde_json::from_str(rect)?;
    let steps: Vec<Step> = serde_json::from_str(&read_source(script)?)?;

    let id = Uuid::new_v4();
    let mut store = MemoryStore::new();
    store.insert(Feature { id, geometry: rect.to_geometry() });

    let (mut mode, mut actions) = TxRectMode::enter(store, config, EnterOptions::new(id))?;
    for step in &steps {
        actions.extend(apply_step(&mut mode, step));
    }
    let rectangle = mode.rectangle()?;
    actions.extend(mode.exit());
    tracing::info!(steps = steps.len(), actions = actions.len(), "replay finished");

    print_json(&ReplayReport { actions, rectangle })
}

fn apply_step(mode: &mut TxRectMode<MemoryStore>, step: &Step) -> Vec<Action> {
    match step {
        Step::Down(p) => mode.on_pointer_down(&p.event()),
        Step::Move(p) => mode.on_pointer_move(&p.event()),
        Step::Up(p) => mode.on_pointer_up(&p.event()),
        Step::Leave(p) => mode.on_pointer_leave(&p.event()),
        Step::Click(p) => mode.on_click(&p.event()),
        Step::Cancel => mode.on_cancel(),
    }
}

fn read_source(path: &str) -> Result<String, CliError> {
    let io_err = |source| CliError::Io { path: path.to_owned(), source };
    if path == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).map_err(io_err)?;
        Ok(buf)
    } else {
        fs::read_to_string(path).map_err(io_err)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Rectangle {
        serde_json::from_str("[[-1,-1],[1,-1],[1,1],[-1,1]]").unwrap()
    }

    #[test]
    fn parses_script_steps() {
        let raw = r#"[
            {"event":"down","lng":1,"lat":1,"target":{"vertex_handle":true,"coord_path":"0.2"}},
            {"event":"move","lng":2,"lat":2,"shift":true},
            {"event":"up","lng":2,"lat":2},
            {"event":"cancel"}
        ]"#;
        let steps: Vec<Step> = serde_json::from_str(raw).unwrap();
        assert_eq!(steps.len(), 4);
        assert!(matches!(steps[1], Step::Move(StepPoint { shift: true, .. })));
        assert!(matches!(steps[2], Step::Up(_)));
        assert_eq!(steps[3], Step::Cancel);
    }

    #[test]
    fn step_event_carries_shift() {
        let p = StepPoint { lng: 0.5, lat: 0.5, target: None, shift: true };
        assert!(p.event().snap());
        assert_eq!(p.event().lng_lat, Point::new(0.5, 0.5));
    }

    #[test]
    fn replayed_vertex_drag_scales() {
        let id = Uuid::new_v4();
        let mut store = MemoryStore::new();
        store.insert(Feature { id, geometry: square().to_geometry() });
        let (mut mode, _) = TxRectMode::enter(store, TxConfig::planar(), EnterOptions::new(id)).unwrap();
        let script = r#"[
            {"event":"down","lng":1,"lat":1,"target":{"vertex_handle":true,"coord_path":"0.2"}},
            {"event":"move","lng":2,"lat":2},
            {"event":"up","lng":2,"lat":2}
        ]"#;
        let steps: Vec<Step> = serde_json::from_str(script).unwrap();
        for step in &steps {
            apply_step(&mut mode, step);
        }
        let expected: Rectangle = serde_json::from_str("[[-2,-2],[2,-2],[2,2],[-2,2]]").unwrap();
        assert!(mode.rectangle().unwrap().approx_eq(&expected, 1e-9));
    }

    #[test]
    fn rect_json_rejects_triangle() {
        assert!(serde_json::from_str::<Rectangle>("[[0,0],[1,0],[0,1]]").is_err());
    }
}
