use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qmaze::episode::{self, run_trials, success_rate};
use qmaze::{Agent, AppConfig, Environment, GridMaze, Position};

/// Train a Q-learning agent to walk a grid maze.
#[derive(Parser)]
#[command(name = "trainagent", about = "Train a Q-learning maze agent")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "qmaze.toml")]
    config: PathBuf,

    /// CSV maze file, 0 = path, 1 = wall. An open grid is used when absent.
    #[arg(long)]
    maze: Option<PathBuf>,

    /// Width of the open grid
    #[arg(long, default_value_t = 4)]
    width: usize,

    /// Height of the open grid
    #[arg(long, default_value_t = 4)]
    height: usize,

    #[arg(long, default_value_t = 0)]
    start_x: i32,

    #[arg(long, default_value_t = 0)]
    start_y: i32,

    #[arg(long, requires = "goal_y")]
    goal_x: Option<i32>,

    #[arg(long, requires = "goal_x")]
    goal_y: Option<i32>,

    /// Override number of training episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Override the agent seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write per-episode statistics to this CSV file
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Train this many independently seeded agents in parallel and report
    /// how many find the goal
    #[arg(long, default_value_t = 0)]
    trials: usize,
}

fn build_maze(cli: &Cli) -> Result<GridMaze> {
    let goal: Option<Position> = cli.goal_x.zip(cli.goal_y);
    match &cli.maze {
        Some(path) => GridMaze::from_csv_path(path, goal)
            .with_context(|| format!("loading maze from {}", path.display())),
        None => {
            if cli.width == 0 || cli.height == 0 {
                bail!("open grid needs a non-zero width and height");
            }
            let goal = match goal {
                Some(goal) => goal,
                None => {
                    let x = i32::try_from(cli.width - 1).context("open grid width does not fit in i32")?;
                    let y = i32::try_from(cli.height - 1).context("open grid height does not fit in i32")?;
                    (x, y)
                }
            };
            GridMaze::open(cli.width, cli.height, goal).context("building open grid")
        }
    }
}

// consecutive seeds from `base`, wrapping past u64::MAX
fn trial_seeds(base: u64, trials: usize) -> Vec<u64> {
    (0..trials as u64).map(|i| base.wrapping_add(i)).collect()
}

fn write_stats(path: &Path, stats: &[episode::EpisodeStats]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in stats {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qmaze=info,trainagent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(episodes) = cli.episodes {
        config.training.episodes = episodes;
    }
    if let Some(seed) = cli.seed {
        config.agent.seed = Some(seed);
    }
    config.validate().context("invalid configuration")?;

    let maze = build_maze(&cli)?;
    let start = maze
        .state_at(cli.start_x, cli.start_y)
        .ok_or_else(|| anyhow!("start ({}, {}) is not an open cell", cli.start_x, cli.start_y))?;
    let (width, height) = maze.dimensions();
    info!(width, height, start = %start, goal = ?maze.goal_position(), "maze ready");

    if cli.trials > 0 {
        let base = config.agent.seed.unwrap_or(0);
        let seeds = trial_seeds(base, cli.trials);
        let training = config.training.clone();
        let rollouts = run_trials(&config.agent, &maze, &start, &seeds, |agent| {
            episode::train(agent, &maze, &start, &training);
        })?;
        let rate = success_rate(&rollouts, None);
        let shortest = rollouts.iter().filter(|r| r.reached_goal).map(|r| r.steps()).min();
        println!(
            "{} of {} agents reached the goal ({:.0}%), shortest greedy path: {}",
            rollouts.iter().filter(|r| r.reached_goal).count(),
            rollouts.len(),
            rate * 100.0,
            shortest.map_or_else(|| "none".to_string(), |s| format!("{s} steps")),
        );
        return Ok(());
    }

    let mut agent = Agent::new(&config.agent, &maze, start.clone())?;
    let stats = episode::train(&mut agent, &maze, &start, &config.training);
    let goals = stats.iter().filter(|s| s.reached_goal).count();
    info!(episodes = stats.len(), goals, epsilon = agent.epsilon(), "training finished");

    if let Some(path) = &cli.stats {
        write_stats(path, &stats)?;
        info!(path = %path.display(), "wrote episode statistics");
    }

    let rollout = episode::greedy_rollout(&agent, &maze, &start, width * height);
    let path: Vec<String> = rollout.path.iter().map(|(x, y)| format!("({x}, {y})")).collect();
    if rollout.reached_goal {
        println!("greedy path reaches the goal in {} steps: {}", rollout.steps(), path.join(" -> "));
    } else {
        println!("greedy path does not reach the goal: {}", path.join(" -> "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_seeds_wrap_at_max() {
        assert_eq!(trial_seeds(u64::MAX - 1, 3), vec![u64::MAX - 1, u64::MAX, 0]);
        assert_eq!(trial_seeds(7, 2), vec![7, 8]);
        assert!(trial_seeds(0, 0).is_empty());
    }

    #[test]
    fn test_open_grid_too_wide_for_positions() {
        let cli = Cli::parse_from(["trainagent", "--width", "3000000000", "--height", "2"]);
        let err = build_maze(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("width does not fit"), "{err:#}");
    }

    #[test]
    fn test_default_goal_is_far_corner() {
        let cli = Cli::parse_from(["trainagent", "--width", "5", "--height", "3"]);
        let maze = build_maze(&cli).unwrap();
        assert_eq!(maze.goal_position(), (4, 2));
    }
}
