//! Host-side smoke harness for the extension core.
//!
//! # Responsibility
//! - Drive the full registration, parse, prepare, fetch/release and destroy
//!   sequence the way a host would, without loading the shared library.
//! - Print a JSON report whose resource ledger must come back balanced.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use shadex_core::abi::HOST_NAME_CAPACITY;
use shadex_core::{
    register, unregister, verify_handshake, ArgValue, ExtensionModule, FrameRequest,
    ModuleConfig, ObjectKind, PrepareHints,
};
use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// shadex - drive the example extension like a host would
#[derive(Parser)]
#[command(name = "shadex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the initializers the extension registers
    List,

    /// Run create/prepare/fetch/release/destroy cycles and report the ledger
    Run {
        /// Initializer keyword
        #[arg(short, long, default_value = "example")]
        initializer: String,

        /// Object kind to create
        #[arg(short, long, value_enum, default_value_t = KindArg::Image)]
        kind: KindArg,

        /// Integer arguments passed to the initializer, in order
        #[arg(short, long = "arg", num_args = 1.., allow_negative_numbers = true)]
        args: Vec<i32>,

        /// Number of object lifecycles to run
        #[arg(long, default_value_t = 1)]
        cycles: u32,

        /// Frames fetched and released per lifecycle
        #[arg(long, default_value_t = 1)]
        frames: u32,

        /// Seconds between consecutive frames
        #[arg(long, default_value_t = 0.25)]
        time_step: f32,

        /// Write the first fetched frame as PNG
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Image,
    Animation,
}

impl From<KindArg> for ObjectKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Image => ObjectKind::Image,
            KindArg::Animation => ObjectKind::Animation,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List => list(),
        Commands::Run {
            initializer,
            kind,
            args,
            cycles,
            frames,
            time_step,
            output,
        } => run(RunOptions {
            initializer,
            kind: kind.into(),
            args,
            cycles,
            frames,
            time_step,
            output,
        }),
    };

    match result {
        Ok(report) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).unwrap_or_else(|_| report.to_string())
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

struct RunOptions {
    initializer: String,
    kind: ObjectKind,
    args: Vec<i32>,
    cycles: u32,
    frames: u32,
    time_step: f32,
    output: Option<PathBuf>,
}

fn open_module() -> Result<(String, ExtensionModule), Box<dyn Error>> {
    let mut name = vec![0u8; HOST_NAME_CAPACITY];
    let (registration, module) = register(ModuleConfig::global().clone(), &mut name)?;
    verify_handshake(registration.magic)?;
    let name = String::from_utf8_lossy(&name[..registration.name_len]).into_owned();
    Ok((name, module))
}

fn list() -> Result<serde_json::Value, Box<dyn Error>> {
    let (name, module) = open_module()?;
    let mut initializers = Vec::new();
    let mut buf = vec![0u8; HOST_NAME_CAPACITY];
    for index in 0.. {
        let Some(info) = module.enumerate_initializer(index, &mut buf)? else {
            break;
        };
        let mut kinds = Vec::new();
        for kind in [ObjectKind::Image, ObjectKind::Animation] {
            if info.kinds.contains(kind.as_set()) {
                kinds.push(kind.as_str());
            }
        }
        initializers.push(json!({
            "index": index,
            "keyword": String::from_utf8_lossy(&buf[..info.name_len]),
            "kinds": kinds,
        }));
    }
    let stats = unregister(module);
    Ok(json!({
        "extension": name,
        "initializers": initializers,
        "balanced": stats.is_balanced(),
    }))
}

fn run(options: RunOptions) -> Result<serde_json::Value, Box<dyn Error>> {
    let (name, mut module) = open_module()?;
    let index = find_initializer(&module, &options.initializer)?;
    let mut frame_bytes = 0usize;
    let mut working_set = None;

    for cycle in 0..options.cycles {
        let (token, _) = module.begin_parse(options.kind, index, options.initializer.as_bytes())?;
        for (position, value) in options.args.iter().enumerate() {
            if let Err(err) = module.apply_argument(token, position as i32, ArgValue::Int(*value)) {
                module.finish_parse(token, false, options.kind, "")?;
                return Err(err.into());
            }
        }
        let object = module
            .finish_parse(token, true, options.kind, &format!("cycle{cycle}"))?
            .ok_or("initializer produced no object")?;

        let prepared = module.prepare(object, PrepareHints::FULL_RANGE)?;
        working_set = Some(prepared.working_set);
        for frame in 0..options.frames {
            let request = FrameRequest::for_working_set(
                prepared.working_set,
                frame as f32 * options.time_step,
            );
            let buffer = module.fetch(object, &request)?;
            let pixels = module.pixels(object, buffer)?;
            frame_bytes = pixels.len();
            if cycle == 0 && frame == 0 {
                if let Some(path) = &options.output {
                    write_png(path, request.width, request.height, pixels)?;
                }
            }
            module.release(object, buffer)?;
        }
        module.destroy(object)?;
    }

    let stats = unregister(module);
    Ok(json!({
        "extension": name,
        "initializer": options.initializer,
        "kind": options.kind,
        "working_set": working_set,
        "frame_bytes": frame_bytes,
        "stats": stats,
        "balanced": stats.is_balanced(),
    }))
}

fn find_initializer(module: &ExtensionModule, keyword: &str) -> Result<i32, Box<dyn Error>> {
    let mut buf = vec![0u8; HOST_NAME_CAPACITY];
    for index in 0.. {
        match module.enumerate_initializer(index, &mut buf)? {
            Some(info) if &buf[..info.name_len] == keyword.as_bytes() => return Ok(index),
            Some(_) => {}
            None => break,
        }
    }
    Err(format!("unknown initializer `{keyword}`").into())
}

fn write_png(path: &Path, width: u32, height: u32, pixels: &[u8]) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(pixels)?;
    Ok(())
}
