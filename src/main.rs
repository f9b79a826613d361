#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::time::Instant;

use anyhow::{Context, bail};
use stream_life::logging::{self, LogConfig, LogFormat};
use stream_life::seed::{DEFAULT_DENSITY, DEFAULT_SEED};
use stream_life::{FeedbackLoop, Grid, Lexicon, Rule, SeedSpec, StreamLifeConfig};

const USAGE: &str = "usage: stream-life [--width N] [--height N] [--tile N|WxH] [--frames N | --forever] \
[--seed N] [--density F] [--pattern NAME] [--rule B3/S23] [--banks N] [--stream-capacity N] \
[--stable] [--show] [--pretty-log] [--quiet]
  --forever runs until the process is killed; no summary is printed";

/// Population line cadence when not `--quiet`.
const REPORT_INTERVAL: u64 = 100;

struct MainArgs {
    config: StreamLifeConfig,
    seed: SeedSpec,
    show: bool,
    quiet: bool,
    log_format: LogFormat,
}

fn parse_tile(value: &str) -> anyhow::Result<(usize, usize)> {
    let (w, h) = match value.split_once(['x', 'X']) {
        Some((w, h)) => (w, h),
        None => (value, value),
    };
    let w = w.parse().with_context(|| format!("bad tile width in `{value}`"))?;
    let h = h.parse().with_context(|| format!("bad tile height in `{value}`"))?;
    Ok((w, h))
}

fn parse_args() -> anyhow::Result<MainArgs> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = StreamLifeConfig::default();
    let mut density = DEFAULT_DENSITY;
    let mut seed = DEFAULT_SEED;
    let mut pattern = None;
    let mut show = false;
    let mut quiet = false;
    let mut log_format = LogFormat::Compact;
    let next_arg = |i: usize, flag: &str| -> anyhow::Result<&str> {
        args.get(i)
            .map(String::as_str)
            .with_context(|| format!("{flag} requires a value\n{USAGE}"))
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--width" => {
                i += 1;
                let w = next_arg(i, "--width")?
                    .parse()
                    .context("--width requires a positive integer")?;
                let h = config.grid.height;
                config = config.grid(w, h);
            }
            "--height" => {
                i += 1;
                let h = next_arg(i, "--height")?
                    .parse()
                    .context("--height requires a positive integer")?;
                let w = config.grid.width;
                config = config.grid(w, h);
            }
            "--tile" => {
                i += 1;
                let (w, h) = parse_tile(next_arg(i, "--tile")?)?;
                config = config.tile(w, h);
            }
            "--frames" => {
                i += 1;
                let n = next_arg(i, "--frames")?
                    .parse()
                    .context("--frames requires a non-negative integer")?;
                config = config.num_frames(n);
            }
            "--forever" => {
                // Nothing in the binary raises the stop signal.
                config = config.unbounded();
            }
            "--seed" => {
                i += 1;
                seed = next_arg(i, "--seed")?
                    .parse()
                    .context("--seed requires an unsigned integer")?;
            }
            "--density" => {
                i += 1;
                density = next_arg(i, "--density")?
                    .parse()
                    .context("--density requires a number in [0, 1]")?;
                if !(0.0..=1.0).contains(&density) {
                    bail!("--density must be within [0, 1], got {density}");
                }
            }
            "--pattern" => {
                i += 1;
                pattern = Some(next_arg(i, "--pattern")?.to_owned());
            }
            "--rule" => {
                i += 1;
                let rule: Rule = next_arg(i, "--rule")?.parse()?;
                config = config.rule(rule);
            }
            "--banks" => {
                i += 1;
                let n = next_arg(i, "--banks")?
                    .parse()
                    .context("--banks requires a positive integer")?;
                config = config.bank_count(n);
            }
            "--stream-capacity" => {
                i += 1;
                let n = next_arg(i, "--stream-capacity")?
                    .parse()
                    .context("--stream-capacity requires a positive integer")?;
                config = config.stream_capacity(n);
            }
            "--stable" => {
                config = config.stop_when_stable(true);
            }
            "--show" => {
                show = true;
            }
            "--pretty-log" => {
                log_format = LogFormat::Pretty;
            }
            "--quiet" => {
                quiet = true;
            }
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
        i += 1;
    }
    let seed = match pattern {
        Some(name) => SeedSpec::Pattern(name),
        None => SeedSpec::Random { density, seed },
    };
    Ok(MainArgs {
        config,
        seed,
        show,
        quiet,
        log_format,
    })
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    logging::init_tracing(&LogConfig::default().format(args.log_format))
        .context("failed to initialise logging")?;

    let config = args.config;
    let mut grid = Grid::with_shape(config.grid);
    let lexicon = Lexicon::standard();
    if !args.seed.apply(&mut grid, &lexicon) {
        let known: Vec<&str> = lexicon.names().collect();
        eprintln!(
            "unknown pattern, starting from an empty grid (known: {})",
            known.join(", ")
        );
    }

    let mut life = FeedbackLoop::life(&config).context("failed to build pipeline")?;
    life.seed(&grid).context("failed to seed pipeline")?;
    let state = *life.state();
    if !args.quiet {
        println!(
            "Grid {}x{} (padded {}x{}), {} tiles of {}x{}, rule {}",
            config.grid.width,
            config.grid.height,
            state.padded_width,
            state.padded_height,
            state.num_tiles,
            state.tile.width,
            state.tile.height,
            config.rule
        );
        println!("Frame 0: population = {}", grid.population());
    }

    let start = Instant::now();
    while let Some(frame) = life.advance().context("generation failed")? {
        if args.show {
            println!("{frame}");
        }
        let population = frame.population();
        let generation = life.generation();
        if !args.quiet && generation % REPORT_INTERVAL == 0 {
            let changed = life.last_stats().map_or(0, |s| s.changed_cells);
            println!("Frame {generation}: population = {population}, changed = {changed}");
        }
    }
    let elapsed = start.elapsed();

    let generations = life.generation();
    let total_ms = elapsed.as_secs_f64() * 1000.0;
    let avg_ms = if generations > 0 {
        total_ms / generations as f64
    } else {
        0.0
    };
    println!("\n--- Summary ({generations} generations) ---");
    println!("Final population: {}", life.frame().population());
    if let Some(reason) = life.stop_reason() {
        println!("Stopped: {reason:?}");
    }
    println!("Pipeline: {total_ms:.3} ms total, {avg_ms:.6} ms/generation");
    Ok(())
}
