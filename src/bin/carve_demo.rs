//! Scripted carving session.
//!
//! Carves a row of spheres and a flat chisel cut into a fresh stone, undoes
//! the last cut, and writes the result.
//!
//! Usage: cargo run --release --bin carve_demo -- [-o stone] [-c config.json] [-n cuts]

use std::path::PathBuf;
use std::time::Instant;

use chisel::core::config::SessionConfig;
use chisel::core::types::{Affine3A, Quat, Vec3};
use chisel::session::{SculptSession, SessionEvent};
use chisel::voxel::brush::ToolShape;

const DEFAULT_OUTPUT: &str = "stone";
const DEFAULT_CUTS: usize = 8;

#[derive(Debug)]
struct Args {
    output: PathBuf,
    config: Option<PathBuf>,
    cuts: usize,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);

    let mut output = PathBuf::from(DEFAULT_OUTPUT);
    let mut config = None;
    let mut cuts = DEFAULT_CUTS;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                if let Some(v) = args.next() {
                    output = PathBuf::from(v);
                }
            }
            "-c" | "--config" => {
                if let Some(v) = args.next() {
                    config = Some(PathBuf::from(v));
                }
            }
            "-n" | "--cuts" => {
                if let Some(v) = args.next() {
                    cuts = v.parse().unwrap_or(DEFAULT_CUTS);
                }
            }
            "-h" | "--help" | "help" => {
                return Err("show_help".to_string());
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(Args { output, config, cuts })
}

fn print_help() {
    println!("carve_demo - scripted stone carving");
    println!();
    println!("  -o, --output <path>   where to save the stone (default {DEFAULT_OUTPUT}, extension from the save format)");
    println!("  -c, --config <path>   session config JSON");
    println!("  -n, --cuts <n>        number of sphere cuts (default {DEFAULT_CUTS})");
}

fn main() {
    chisel::core::logging::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            if e != "show_help" {
                eprintln!("{e}");
            }
            print_help();
            std::process::exit(if e == "show_help" { 0 } else { 2 });
        }
    };

    let config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path).expect("Failed to load config"),
        None => SessionConfig::default(),
    };
    let mut output = args.output.clone();
    if output.extension().is_none() {
        output.set_extension(config.save_format.extension());
    }
    let [dx, dy, dz] = config.dims;
    let mut session = SculptSession::initialize(config).expect("Failed to start session");
    let start = Instant::now();

    // Spheres walking across the top of the stone
    let top = dy as f32 * 0.8;
    for i in 0..args.cuts {
        let t = (i as f32 + 0.5) / args.cuts.max(1) as f32;
        let center = Vec3::new(t * dx as f32, top, dz as f32 * 0.5);
        session.carve(ToolShape::sphere(Vec3::ZERO, dx as f32 * 0.08), Affine3A::from_translation(center));
    }

    // A tilted flat chisel across the front face
    let pose = Affine3A::from_rotation_translation(
        Quat::from_rotation_z(0.3),
        Vec3::new(dx as f32 * 0.5, dy as f32 * 0.5, 1.0),
    );
    session.carve(ToolShape::flat_chisel(Vec3::ZERO, Vec3::Z, dx as f32 * 0.1), pose);
    session.undo();
    session.save(&output);

    let events = session.flush().expect("Session step failed");
    let mut carved = 0;
    for event in &events {
        match event {
            SessionEvent::Carved(outcome) => carved += outcome.cells_changed,
            SessionEvent::Saved { path, bytes } => println!("Saved {} ({} bytes)", path.display(), bytes),
            SessionEvent::SaveFailed { path, message } => eprintln!("Save to {} failed: {message}", path.display()),
            _ => {}
        }
    }

    let remaining = session.chunk().count(chisel::voxel::CellFlags::FILLED);
    println!(
        "Carved {} cells in {:.1}ms, {} filled cells remain, {} undo steps",
        carved,
        start.elapsed().as_secs_f64() * 1000.0,
        remaining,
        session.history().undo_len()
    );
    if let Some(mesh) = session.greedy_mesh() {
        println!("Greedy mesh: {} triangles over {} layers", mesh.triangle_count(), mesh.layer_count());
    }
    if let Some(report) = session.isosurface_report() {
        println!(
            "Isosurface: {} of {} triangles{}",
            report.triangles_written,
            report.triangles_requested,
            if report.is_truncated() { " (truncated)" } else { "" }
        );
    }

    session.teardown().expect("Teardown failed");
}
