use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use multiworld::json_world::JsonWorld;
use multiworld::settings::{parse_generation_settings, GenerationSettings};
use multiworld::{generate, World};
use multiworld_game::GenerationError;

#[derive(Parser)]
struct Args {
    /// World definition files, one per player.
    #[arg(long, required = true, num_args = 1..)]
    worlds: Vec<PathBuf>,

    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long, default_value_t = 100 as usize)]
    test_cycles: usize,

    #[arg(long, default_value_t = 0)]
    first_seed: u64,

    /// Where to write the output and spoiler log of each successful seed.
    #[arg(long)]
    output_seeds: Option<PathBuf>,
}

fn load_worlds(args: &Args) -> Result<Vec<Box<dyn World>>> {
    let mut worlds: Vec<Box<dyn World>> = vec![];
    for path in &args.worlds {
        worlds.push(Box::new(JsonWorld::load(path)?));
    }
    Ok(worlds)
}

fn perform_test_cycle(args: &Args, settings: &GenerationSettings, seed: u64) -> Result<()> {
    let mut worlds = load_worlds(args)?;
    let generated = generate(&mut worlds, settings, seed)?;
    let seed_name = &generated.randomization.seed_name;
    info!("Seed {seed}: generated {seed_name}");
    if let Some(dir) = &args.output_seeds {
        std::fs::create_dir_all(dir)?;
        let output_path = dir.join(format!("{seed_name}.json"));
        std::fs::write(&output_path, generated.randomization.to_json()?)
            .with_context(|| format!("Unable to write {}", output_path.display()))?;
        if let Some(spoiler_log) = &generated.spoiler_log {
            let spoiler_path = dir.join(format!("{seed_name}-spoiler.json"));
            std::fs::write(&spoiler_path, serde_json::to_string_pretty(spoiler_log)?)
                .with_context(|| format!("Unable to write {}", spoiler_path.display()))?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => parse_generation_settings(
            &std::fs::read_to_string(path)
                .with_context(|| format!("Unable to read {}", path.display()))?,
        )?,
        None => GenerationSettings::default(),
    };

    let mut failures = 0;
    for test_cycle in 0..args.test_cycles {
        let seed = args.first_seed + test_cycle as u64;
        if let Err(e) = perform_test_cycle(&args, &settings, seed) {
            // Configuration errors fail the same way for every seed.
            let is_configuration = e
                .downcast_ref::<GenerationError>()
                .is_some_and(|err| err.is_configuration());
            if is_configuration {
                return Err(e.context(format!("Seed {seed}")));
            }
            info!("Seed {seed}: generation failed: {e:#}");
            failures += 1;
        }
    }
    info!(
        "{} of {} seeds generated",
        args.test_cycles - failures,
        args.test_cycles
    );
    if failures > 0 {
        bail!("{failures} seeds failed");
    }
    Ok(())
}
