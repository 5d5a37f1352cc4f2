//! LENSOPT CLI
//!
//! Command-line driver for the lens simulation: trace ray fans, dump spot
//! diagrams and surface profiles, run spot-size optimization. Reads an
//! optional JSON prescription (an array of surfaces); defaults to the
//! built-in demo stack.
//!
//! Author: Moroya Sakamoto

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use lensopt::prelude::*;

#[derive(Parser)]
#[command(name = "lensopt")]
#[command(author = "Moroya Sakamoto")]
#[command(version = lensopt::VERSION)]
#[command(about = "Differentiable aspheric lens simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run gradient-descent spot-size optimization
    Optimize {
        /// JSON prescription file (defaults to the demo stack)
        #[arg(short, long)]
        stack: Option<PathBuf>,
        /// Iterations to run (1-100)
        #[arg(short, long, default_value = "100")]
        iters: u32,
        /// Learning-rate scale (1-100)
        #[arg(short, long, default_value = "25.0")]
        lr: f32,
        /// Maximum field-of-view angle in degrees (0-50)
        #[arg(short, long, default_value = "1.0")]
        fov: f32,
        /// RNG seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Trace a uniform ray fan and print image-plane endpoints
    Trace {
        /// JSON prescription file (defaults to the demo stack)
        #[arg(short, long)]
        stack: Option<PathBuf>,
        /// Maximum field-of-view angle in degrees (0-50)
        #[arg(short, long, default_value = "1.0")]
        fov: f32,
    },

    /// Print an image-plane spot diagram
    Spot {
        /// JSON prescription file (defaults to the demo stack)
        #[arg(short, long)]
        stack: Option<PathBuf>,
        /// Maximum field-of-view angle in degrees (0-50)
        #[arg(short, long, default_value = "1.0")]
        fov: f32,
        /// RNG seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print a surface cross-section profile
    Profile {
        /// JSON prescription file (defaults to the demo stack)
        #[arg(short, long)]
        stack: Option<PathBuf>,
        /// Surface index
        #[arg(short = 'n', long, default_value = "0")]
        index: usize,
        /// Half-width of the sampled aperture
        #[arg(short, long, default_value = "10.0")]
        width: f32,
        /// Number of samples
        #[arg(short, long, default_value = "200")]
        count: usize,
    },
}

fn load_stack(path: Option<&PathBuf>) -> Result<Vec<AsphericSurface>, LensError> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(LensSim::demo_stack()),
    }
}

fn build_sim(
    stack: Option<&PathBuf>,
    fov: f32,
    seed: Option<u64>,
    lr: f32,
    iters: u32,
) -> Result<LensSim, LensError> {
    let config = SimConfig {
        fov_deg: fov,
        lr_scale: lr,
        max_iters: iters,
        seed,
        ..SimConfig::default()
    };
    LensSim::new(load_stack(stack)?, config)
}

fn print_stack(sim: &LensSim) {
    println!("surface  height      curvature   a4           n_in/n_out");
    for (i, surf) in sim.surfaces().iter().enumerate() {
        println!(
            "{:>7}  {:>10.5}  {:>10.6}  {:>11.4e}  {}/{}",
            i,
            surf.height(),
            surf.curvature(),
            surf.params()[1],
            surf.n_in,
            surf.n_out
        );
    }
}

fn cmd_optimize(
    stack: Option<&PathBuf>,
    iters: u32,
    lr: f32,
    fov: f32,
    seed: Option<u64>,
) -> Result<(), LensError> {
    let mut sim = build_sim(stack, fov, seed, lr, iters)?;
    println!("initial stack:");
    print_stack(&sim);

    sim.start_optimization();
    loop {
        match sim.step() {
            StepOutcome::Iterated { iter, loss } => {
                println!("iteration {:>3}: loss {:.6}", iter, loss);
            }
            StepOutcome::Finished { min_loss } => {
                println!("done, min loss {:.6}", min_loss);
                break;
            }
            StepOutcome::Idle => break,
        }
    }

    println!("optimized stack:");
    print_stack(&sim);
    Ok(())
}

fn cmd_trace(stack: Option<&PathBuf>, fov: f32) -> Result<(), LensError> {
    let mut sim = build_sim(stack, fov, None, 25.0, 100)?;
    let stages = sim.display_fan();
    let image = stages.last().expect("fan always has an image-plane stage");
    for (slot, segments) in image.iter().enumerate() {
        println!("field-of-view slot {}:", slot);
        for (origin, endpoint) in segments {
            println!(
                "  ({:>9.4}, {:>9.4}, {:>9.4}) -> ({:>9.4}, {:>9.4}, {:>9.4})",
                origin.x, origin.y, origin.z, endpoint.x, endpoint.y, endpoint.z
            );
        }
    }
    Ok(())
}

fn cmd_spot(stack: Option<&PathBuf>, fov: f32, seed: Option<u64>) -> Result<(), LensError> {
    let mut sim = build_sim(stack, fov, seed, 25.0, 100)?;
    for (slot, points) in sim.spot_diagram().iter().enumerate() {
        println!("field-of-view slot {}:", slot);
        for p in points {
            println!("  {:>9.5} {:>9.5}", p.x, p.y);
        }
    }
    Ok(())
}

fn cmd_profile(
    stack: Option<&PathBuf>,
    index: usize,
    width: f32,
    count: usize,
) -> Result<(), LensError> {
    let sim = build_sim(stack, 1.0, None, 25.0, 100)?;
    for p in sim.surface(index)?.sample_profile(width, count) {
        println!("{:>9.4} {:>9.5}", p.x, p.y);
    }
    Ok(())
}

fn main() -> Result<(), LensError> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Optimize {
            stack,
            iters,
            lr,
            fov,
            seed,
        } => cmd_optimize(stack.as_ref(), *iters, *lr, *fov, *seed),
        Commands::Trace { stack, fov } => cmd_trace(stack.as_ref(), *fov),
        Commands::Spot { stack, fov, seed } => cmd_spot(stack.as_ref(), *fov, *seed),
        Commands::Profile {
            stack,
            index,
            width,
            count,
        } => cmd_profile(stack.as_ref(), *index, *width, *count),
    }
}
