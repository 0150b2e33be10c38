//! lapmesh CLI - Laplacian mesh compression command-line tool.
//!
//! Usage: lapmesh <COMMAND> [OPTIONS] <INPUT> [OUTPUT]
//!
//! Run `lapmesh --help` for available commands.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use lapmesh::algo::metrics::MetricsOptions;
use lapmesh::algo::pipeline::{compress, AnchorStrategy, CompressionOptions, SolveMode};
use lapmesh::algo::reconstruct::{ReconstructOptions, SolverKind};
use lapmesh::algo::segment::{greedy_packet, segment_mesh, SegmentOptions};
use lapmesh::algo::{curvature, Progress};
use lapmesh::error::Result;
use lapmesh::io;
use lapmesh::mesh::{to_data, Mesh, PositionSource};

#[derive(Parser)]
#[command(name = "lapmesh")]
#[command(author, version, about = "Laplacian mesh compression CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh information
    Info {
        /// Input mesh file
        input: PathBuf,

        /// Show curvature statistics
        #[arg(long)]
        curvature: bool,
    },

    /// Compress a mesh and write its reconstruction
    Compress {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file for the reconstructed positions
        output: Option<PathBuf>,

        /// Quantization bits per axis
        #[arg(short, long, default_value = "12")]
        bits: u32,

        /// Anchor selection strategy
        #[arg(short, long, value_enum, default_value = "greedy")]
        strategy: StrategyArg,

        /// Anchors added after the seed (greedy)
        #[arg(short = 'n', long, default_value = "10")]
        anchors: usize,

        /// Largest hop distance to an anchor (bfs)
        #[arg(short, long, default_value = "4")]
        depth: usize,

        /// Solve the whole mesh at once or block by block
        #[arg(short, long, value_enum, default_value = "global")]
        mode: ModeArg,

        /// Number of segments (blockwise)
        #[arg(long, default_value = "8")]
        segments: usize,

        /// Packet size within a segment (blockwise)
        #[arg(long, default_value = "120")]
        packet_size: usize,

        /// Linear solver
        #[arg(long, value_enum, default_value = "auto")]
        solver: SolverArg,

        /// Weight of the anchor rows
        #[arg(long, default_value = "1.0")]
        anchor_weight: f64,

        /// Weight of Mq in the visual error
        #[arg(long, default_value = "0.5")]
        alpha: f64,

        /// Merge vertices with identical positions before compressing
        #[arg(long)]
        weld: bool,

        /// Keep the input coordinates instead of centering and scaling into the unit sphere
        #[arg(long)]
        no_normalize: bool,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },

    /// Segment a mesh and write it with per-vertex colors
    Segment {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Number of segments
        #[arg(short, long, default_value = "8")]
        segments: usize,

        /// Packet size within a segment
        #[arg(short, long, default_value = "120")]
        packet_size: usize,

        /// Color vertices by segment or by packet
        #[arg(short, long, value_enum, default_value = "segment")]
        color_by: ColorBy,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// Add maximum-error vertices one at a time
    Greedy,
    /// Add farthest vertices until all are within the depth
    Bfs,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// One system for the whole mesh
    Global,
    /// One system per segment
    Blockwise,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SolverArg {
    /// Dense QR for small systems, sparse Cholesky otherwise
    Auto,
    /// Sparse Cholesky on the normal equations
    Cholesky,
    /// Dense QR
    Qr,
    /// Conjugate gradient on the normal equations
    Cg,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ColorBy {
    /// One color per segment
    Segment,
    /// One color per packet
    Packet,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Info { input, curvature: show_curvature } => {
            cmd_info(&input, show_curvature)?;
        }

        Commands::Compress {
            input,
            output,
            bits,
            strategy,
            anchors,
            depth,
            mode,
            segments,
            packet_size,
            solver,
            anchor_weight,
            alpha,
            weld,
            no_normalize,
            sequential,
        } => {
            let strategy = match strategy {
                StrategyArg::Greedy => AnchorStrategy::Greedy { count: anchors },
                StrategyArg::Bfs => AnchorStrategy::Bfs { depth_threshold: depth },
            };
            let mode = match mode {
                ModeArg::Global => SolveMode::Global,
                ModeArg::Blockwise => SolveMode::Blockwise,
            };
            let solver = match solver {
                SolverArg::Auto => SolverKind::Auto,
                SolverArg::Cholesky => SolverKind::SparseCholesky,
                SolverArg::Qr => SolverKind::DenseQr,
                SolverArg::Cg => SolverKind::ConjugateGradient,
            };
            let options = CompressionOptions::default()
                .with_bits(bits)
                .with_strategy(strategy)
                .with_mode(mode)
                .with_reconstruct(
                    ReconstructOptions::default()
                        .with_solver(solver)
                        .with_anchor_weight(anchor_weight),
                )
                .with_segment(
                    SegmentOptions::default()
                        .with_segments(segments)
                        .with_packet_size(packet_size),
                )
                .with_metrics(
                    MetricsOptions::default()
                        .with_alpha(alpha)
                        .with_parallel(!sequential),
                );
            cmd_compress(&input, output.as_ref(), &options, weld, !no_normalize)?;
        }

        Commands::Segment {
            input,
            output,
            segments,
            packet_size,
            color_by,
        } => {
            cmd_segment(&input, &output, segments, packet_size, color_by)?;
        }
    }

    Ok(())
}

/// Create a progress reporter that displays a progress bar on the terminal.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        // Greedy selection reports its own steps inside a pipeline stage, so
        // only ever move the bar forward.
        let (percent, increased) = loop {
            let old_max = max_percent.load(Ordering::Relaxed);
            let new_max = old_max.max(raw_percent);
            if new_max == old_max {
                break (old_max, false);
            }
            match max_percent.compare_exchange_weak(
                old_max,
                new_max,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break (new_max, true),
                Err(_) => continue,
            }
        };

        if !increased && percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);

        eprint!("\r[{}{}] {:3}% {:<40}", bar, space, percent, message);
        let _ = std::io::stderr().flush();

        if current >= total && message == "Done" {
            eprintln!();
        }
    })
}

/// Load a mesh and build its edges and adjacency lists.
fn load_connected(input: &PathBuf, weld: bool) -> Result<Mesh> {
    let mut mesh: Mesh = io::load(input)?;
    if weld {
        let merged = mesh.weld_duplicate_vertices()?;
        if merged > 0 {
            println!("Welded {} duplicate vertices", merged);
        }
    }
    mesh.create_edges_from_triangles()?;
    mesh.compute_all_neighbors();
    Ok(mesh)
}

fn cmd_info(input: &PathBuf, show_curvature: bool) -> Result<()> {
    let mut mesh = load_connected(input, false)?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.num_vertices());
    println!("Edges: {}", mesh.num_edges());
    println!("Triangles: {}", mesh.num_triangles());
    println!("Shapes: {}", mesh.num_shapes());

    let mut min_area = f64::MAX;
    let mut max_area = 0.0_f64;
    for (_, triangle) in mesh.triangles() {
        min_area = min_area.min(triangle.area());
        max_area = max_area.max(triangle.area());
    }
    println!("Surface area: {:.6}", mesh.surface_area());
    if mesh.num_triangles() > 0 {
        println!("Triangle area range: [{:.6}, {:.6}]", min_area, max_area);
        println!("Average triangle perimeter: {:.6}", mesh.average_triangle_perimeter());
    }

    if let Some((min, max)) = mesh.bounding_box() {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
        let diag = max - min;
        println!("Dimensions: {:.3} x {:.3} x {:.3}", diag.x, diag.y, diag.z);
    }

    let boundary = mesh.edges().filter(|(_, e)| e.triangles().len() == 1).count();
    let non_manifold = mesh.edges().filter(|(_, e)| e.triangles().len() > 2).count();
    if boundary == 0 {
        println!("Topology: Closed (no boundary)");
    } else {
        println!("Topology: Open ({} boundary edges)", boundary);
    }
    if non_manifold > 0 {
        println!("Non-manifold edges: {}", non_manifold);
    }

    if show_curvature && mesh.num_vertices() > 0 {
        println!("\nCurvature:");
        curvature::compute_curvature(&mut mesh);

        let gaussian: Vec<f64> = mesh.vertices().map(|(_, v)| v.curvature).collect();
        let deviation: Vec<f64> = mesh.vertices().map(|(_, v)| v.angle_deviation).collect();

        let g_min = gaussian.iter().cloned().fold(f64::INFINITY, f64::min);
        let g_max = gaussian.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let g_avg = gaussian.iter().sum::<f64>() / gaussian.len() as f64;
        let d_max = deviation.iter().cloned().fold(0.0, f64::max);
        let d_avg = deviation.iter().sum::<f64>() / deviation.len() as f64;

        println!("  Gaussian: min={:.4}, max={:.4}, avg={:.4}", g_min, g_max, g_avg);
        println!("  Angle deviation: max={:.4}, avg={:.4}", d_max, d_avg);

        // Gauss-Bonnet check
        let total_gaussian: f64 = gaussian.iter().sum();
        let euler_from_curv = total_gaussian / (2.0 * std::f64::consts::PI);
        println!("  Gauss-Bonnet Euler characteristic: {:.2}", euler_from_curv);
    }

    Ok(())
}

fn cmd_compress(
    input: &PathBuf,
    output: Option<&PathBuf>,
    options: &CompressionOptions,
    weld: bool,
    normalize: bool,
) -> Result<()> {
    let mut mesh = load_connected(input, weld)?;
    println!(
        "Loaded: {} vertices, {} triangles",
        mesh.num_vertices(),
        mesh.num_triangles()
    );

    if normalize {
        mesh.move_to_centroid();
        mesh.scale_into_unit_sphere();
        info!(
            "normalized: centroid {:?}, scale {}",
            mesh.model_centroid().as_slice(),
            mesh.model_scale()
        );
    }

    let progress = create_progress();
    let start = Instant::now();
    let report = compress(&mut mesh, options, &progress)?;
    let elapsed = start.elapsed();

    let step = report.quantizer.step();
    println!("Quantization: {} bits, step ({:.3e}, {:.3e}, {:.3e})", options.bits, step.x, step.y, step.z);
    println!("Anchors: {}", report.anchors.len());
    if let Some(seg) = &report.segmentation {
        println!("Segments: {}", seg.num_segments());
        if !report.pinned.is_empty() {
            println!(
                "Blocks anchored at their seed: {} ({} exact positions in total)",
                report.pinned.len(),
                report.exact_positions()
            );
        }
    }
    let q = &report.quality;
    println!("Mq: {:.6e}", q.mq);
    println!("Sq: {:.6e}", q.sq);
    println!("Evis (alpha={}): {:.6e}", q.alpha, q.evis);
    println!(
        "Hausdorff: {:.6e} (forward {:.6e}, backward {:.6e})",
        q.hausdorff, q.hausdorff_forward, q.hausdorff_backward
    );
    println!("Time: {:.2?}", elapsed);

    if let Some(output) = output {
        io::save(&mesh, output, PositionSource::ReconstructedOriginalFrame)?;
        println!("Saved: {}", output.display());
    }

    Ok(())
}

fn cmd_segment(
    input: &PathBuf,
    output: &PathBuf,
    segments: usize,
    packet_size: usize,
    color_by: ColorBy,
) -> Result<()> {
    let mesh = load_connected(input, false)?;
    println!(
        "Loaded: {} vertices, {} triangles",
        mesh.num_vertices(),
        mesh.num_triangles()
    );

    let options = SegmentOptions::default()
        .with_segments(segments)
        .with_packet_size(packet_size);
    let start = Instant::now();
    let seg = segment_mesh(&mesh, &options)?;
    let packets = greedy_packet(&mesh, &seg, options.packet_size)?;
    let elapsed = start.elapsed();

    for (s, members) in seg.segments().iter().enumerate() {
        println!(
            "  segment {:3}: {:6} vertices, {:4} packets",
            s,
            members.len(),
            packets.num_packets(s)
        );
    }
    if !seg.is_complete() {
        println!("Unreached vertices: {}", seg.unreached().len());
    }

    let colors: Vec<[u8; 4]> = mesh
        .vertex_ids()
        .map(|v| {
            let label = match color_by {
                ColorBy::Segment => seg.segment_of(v),
                ColorBy::Packet => packets.packet_of(v),
            };
            label.map(palette).unwrap_or([0, 0, 0, 255])
        })
        .collect();

    let data = to_data(&mesh, PositionSource::Position).with_colors(colors);
    io::save_data(&data, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);

    Ok(())
}

/// A distinct opaque color for label `i`.
fn palette(i: usize) -> [u8; 4] {
    // Golden-angle hue steps keep neighbouring labels apart.
    let hue = (i as f64 * 137.507_764) % 360.0;
    let (r, g, b) = hsv_to_rgb(hue, 0.75, 0.95);
    [r, g, b, 255]
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let to_byte = |f: f64| ((f + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r), to_byte(g), to_byte(b))
}
