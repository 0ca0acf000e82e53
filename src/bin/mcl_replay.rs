// Replay viewer for recorded localization runs
//
// Prints the per-step estimate table of a history file and optionally
// renders one frame. Works from the file alone; no filter is constructed.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::{error, info, warn};

use mcl_localization::localization::HistoryReplay;
use mcl_localization::mapping::PolygonMap;
use mcl_localization::utils::{plot_world_state, Visualizer};
use mcl_localization::{LocalizationError, LocalizationResult};

#[derive(Parser)]
#[command(author, version, about = "Inspect a recorded localization history", long_about = None)]
struct Cli {
    /// History file written by a localization run
    history: PathBuf,
    /// Map JSON; defaults to `<map_key>.json` next to the history file
    #[arg(short, long)]
    map: Option<PathBuf>,
    /// Frame to render
    #[arg(short, long)]
    frame: Option<usize>,
    /// PNG output for the rendered frame
    #[arg(short, long, default_value = "frame.png")]
    output: PathBuf,
}

fn locate_map(cli: &Cli, replay: &HistoryReplay) -> Option<PolygonMap> {
    let path = match &cli.map {
        Some(path) => path.clone(),
        None => cli
            .history
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{}.json", replay.map_key())),
    };
    match PolygonMap::load(&path) {
        Ok(map) => Some(map),
        Err(e) => {
            warn!("no map drawn, {}: {}", path.display(), e);
            None
        }
    }
}

fn print_table(replay: &HistoryReplay) {
    println!(
        "{:>5}  {:<16} {:>9} {:>9} {:>8} {:>9}  {}",
        "#", "instruction", "x", "y", "heading", "spread", "state"
    );
    for (i, state) in replay.iter().enumerate() {
        println!(
            "{:>5}  {:<16} {:>9.2} {:>9.2} {:>8.1} {:>9.2}  {:?}",
            i,
            state.causative_instruction,
            state.estimated_pose.x,
            state.estimated_pose.y,
            state.estimated_pose.heading,
            state.estimated_spreading,
            state.convergence
        );
    }
}

fn run(cli: Cli) -> LocalizationResult<()> {
    let replay = HistoryReplay::load(&cli.history)?;
    info!(
        "{} states on '{}' recorded at {}",
        replay.len(),
        replay.map_key(),
        replay.recorded_at()
    );
    print_table(&replay);

    let index = match cli.frame {
        Some(index) => index,
        None => return Ok(()),
    };
    let state = replay.get(index).ok_or_else(|| {
        LocalizationError::InvalidParameter(format!(
            "frame {} out of range, history has {} states",
            index,
            replay.len()
        ))
    })?;

    let vis = match locate_map(&cli, &replay) {
        Some(map) => plot_world_state(&map, state, index),
        None => {
            let mut vis = Visualizer::new();
            vis.set_title(&format!("#{} {}", index, state.causative_instruction));
            vis.draw(state);
            vis
        }
    };
    vis.save_png(&cli.output, 900, 600)?;
    info!("rendered frame {} to {}", index, cli.output.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    if let Err(e) = run(Cli::parse()) {
        error!("{}", e);
        std::process::exit(1);
    }
}
