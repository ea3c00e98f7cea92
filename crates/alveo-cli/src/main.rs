//! `alveoflow` — command-line interface for the dataflow inference driver.
//!
//! ```text
//! USAGE:
//!   alveoflow validate <config>            Parse and validate a configuration
//!   alveoflow info <config>                Show the driver topology
//!   alveoflow selftest <config> [options]  Raw loopback inference with random data
//! ```

use alveo_driver::prelude::*;
use alveo_quant::QuantType;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alveoflow", about = "Dataflow accelerator driver CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Parse and validate a configuration file.
    Validate {
        /// Path to the JSON configuration.
        config: PathBuf,
    },
    /// Show the devices and kernel buffers a configuration describes.
    Info {
        /// Path to the JSON configuration.
        config: PathBuf,
    },
    /// Run a raw loopback inference with random data.
    Selftest {
        /// Path to the JSON configuration.
        config: PathBuf,
        /// Samples to harvest from the output kernel.
        #[arg(long, default_value_t = 1)]
        samples: u32,
        /// Ring length in parts for every buffer.
        #[arg(long, default_value_t = 16)]
        ring_parts: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Validate { config } => cmd_validate(&config)?,
        Cmd::Info { config } => cmd_info(&config)?,
        Cmd::Selftest {
            config,
            samples,
            ring_parts,
        } => cmd_selftest(&config, samples, ring_parts)?,
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_path(path).with_context(|| format!("loading {}", path.display()))
}

fn cmd_validate(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    println!(
        "OK: {} device(s), {} input kernel(s), {} output kernel(s)",
        config.devices.len(),
        config.devices.iter().map(|d| d.idmas.len()).sum::<usize>(),
        config.devices.iter().map(|d| d.odmas.len()).sum::<usize>(),
    );
    Ok(())
}

fn cmd_info(path: &Path) -> Result<()> {
    let config = load_config(path)?;

    for device in &config.devices {
        println!("Device {}", device.xrt_device_index);
        println!("  Bitstream {}", device.xclbin.display());
        for descriptor in &device.idmas {
            print_descriptor("in ", descriptor);
        }
        for descriptor in &device.odmas {
            print_descriptor("out", descriptor);
        }
        println!();
    }

    Ok(())
}

fn print_descriptor(direction: &str, descriptor: &BufferDescriptor) {
    println!(
        "  [{direction}] {}  packed {:?}  ({} bytes/sample)",
        descriptor.kernel_name,
        descriptor.packed_shape,
        descriptor.part_bytes()
    );
    if let Some(folded) = &descriptor.folded_shape {
        println!("        folded {folded:?}");
    }
}

fn cmd_selftest(path: &Path, samples: u32, ring_parts: usize) -> Result<()> {
    let config = load_config(path)?;

    let Some(device) = config.devices.first() else {
        bail!("configuration has no devices");
    };
    let device_index = device.xrt_device_index;
    let input_kernel = device.idmas[0].kernel_name.clone();
    let output_kernel = device.odmas[0].kernel_name.clone();

    // raw loopback, so the datatypes only matter for sizing
    let driver = Driver::new(
        config,
        QuantType::UnsignedInt { bits: 8 },
        QuantType::UnsignedInt { bits: 8 },
        ring_parts,
        RingMode::SingleThreaded,
    )?;

    let part_bytes = driver.size(SizeSpecifier::ElementsPerPart, device_index, &input_kernel)?;
    let mut data = vec![0u8; part_bytes];
    rand::rng().fill(&mut data[..]);

    println!(
        "Selftest: {part_bytes}-byte sample through {input_kernel} -> {output_kernel} \
         on device {device_index} ({samples} sample(s))"
    );

    let start = Instant::now();
    let result = driver.infer_raw(
        &data,
        device_index,
        &input_kernel,
        device_index,
        &output_kernel,
        samples,
        true,
    )?;
    let elapsed = start.elapsed();

    println!("Received {} result byte(s) in {elapsed:?}", result.len());
    if result.as_ref() == data.as_slice() {
        println!("Loopback payload matches the input");
    }
    Ok(())
}
