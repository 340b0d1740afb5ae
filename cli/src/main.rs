//! ---------------------------------------------------------------------------------------
//! cliobulk batch front-end
//! ---------------------------------------------------------------------------------------
//! A high-performance, multi-threaded batch renderer built on top of the `cliobulk-core`
//! pipeline engine. Turns a JSON render request plus a list of source files into a set of
//! rendered 8-bit images, in parallel, reporting progress over stdout as JSON lines for a
//! parent process to consume.
//!
//! FEATURES:
//! - Parallelized RAW decoding (via `rawloader`) feeding the pipeline's lazy mosaic unpack.
//! - A JSON-module-list render request: enable/disable pieces and set their parameters by
//!   name, instead of a fixed filter set.
//! - One pipeline render per input path, parallelized across the batch with Rayon.
//! - Real-time IPC progress reporting via JSON-formatted stdout, matching the host contract
//!   the original single-filter CLI used.
//!
//! @version 3.0.0
//! @license MIT
//! ---------------------------------------------------------------------------------------

use clap::Parser;
use cliobulk_core::{Filters, Image, Orientation, Pipeline, PipelineError, SourceData};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Command-line argument schema for the batch renderer.
///
/// Provides a structured interface for a parent process to pass a render request and a
/// target file list, the same IPC shape the original single-filter CLI exposed.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serialized JSON string of a `RenderRequest`, or a path to a JSON file containing one.
    #[arg(short, long)]
    request: String,

    /// Comma-separated list of absolute paths OR path to a JSON manifest file.
    #[arg(short, long)]
    inputs: String,

    /// Target destination directory for rendered outputs.
    #[arg(short, long)]
    output: String,

    /// Worker-pool size for the pipeline's data-parallel pixel kernels (spec.md §5).
    /// Defaults to the number of logical CPUs.
    #[arg(short, long)]
    threads: Option<usize>,
}

/// A render request: the scale/region to render at, plus a list of per-module
/// enable/disable and parameter overrides (spec.md §A.3: the host-facing JSON
/// options layered on top of the per-module parameter registry).
#[derive(Debug, Deserialize, Clone)]
struct RenderRequest {
    #[serde(default = "default_scale")]
    scale: f32,
    #[serde(default)]
    region: Option<RegionSpec>,
    #[serde(default)]
    modules: Vec<ModuleConfig>,
}

fn default_scale() -> f32 {
    1.0
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct RegionSpec {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize, Clone)]
struct ModuleConfig {
    op: String,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    params: HashMap<String, serde_json::Value>,
}

/// Structured progress update for IPC.
///
/// Emitted to stdout as a JSON object, allowing the parent process to update UI progress
/// bars and status labels in real time.
#[derive(Serialize)]
struct Progress {
    pub progress: f32,
    pub current_file: String,
    pub status: String,
}

/// Decodes a RAW file via `rawloader` into the core's borrowed `Image` shape (spec.md §3).
/// Demosaicing, white balance and colour-matrix application are the pipeline's job
/// (`demosaic`, `temperature`, `colorin`); this function only exposes the sensor's own data
/// unmodified, alongside the black level the caller installs into `rawprepare` once the
/// pipeline exists.
fn decode_raw(path: &Path) -> anyhow::Result<(Image, f32)> {
    let raw = rawloader::decode_file(path).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let width = raw.width as u32;
    let height = raw.height as u32;
    let filters = build_filters(&raw.cfa);
    let white_point = (raw.whitelevels[0] as f32).max(1.0);
    let black_fraction = (raw.blacklevels[0] as f32 / white_point).clamp(0.0, 0.9);
    let camera_matrix = invert3x3([
        [raw.xyz_to_cam[0][0], raw.xyz_to_cam[0][1], raw.xyz_to_cam[0][2]],
        [raw.xyz_to_cam[1][0], raw.xyz_to_cam[1][1], raw.xyz_to_cam[1][2]],
        [raw.xyz_to_cam[2][0], raw.xyz_to_cam[2][1], raw.xyz_to_cam[2][2]],
    ]);

    let data = match raw.data {
        rawloader::RawImageData::Integer(samples) => SourceData::Mosaic16(samples),
        rawloader::RawImageData::Float(samples) => SourceData::MosaicF32(samples),
    };

    let image = Image {
        width,
        height,
        data,
        filters,
        raw_white_point: white_point,
        as_shot_wb: raw.wb_coeffs,
        camera_matrix,
        // EXIF/camera orientation is not modelled by this decoder; like ICC profiles
        // and detailed demosaic quality, it sits outside the core's scope (spec.md §1).
        orientation: Orientation::Normal,
        monochrome: false,
    };
    image.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok((image, black_fraction))
}

/// Decodes any non-RAW image the `image` crate understands into the core's `Image` shape,
/// as plain non-mosaic RGB (spec.md §3 "Image", "non-mosaic RGB" case of the lazy unpack).
fn decode_standard(path: &Path) -> anyhow::Result<Image> {
    let dynamic = image::open(path)?;
    let rgb = dynamic.to_rgb32f();
    let (width, height) = rgb.dimensions();
    let samples = rgb.into_raw();

    let image = Image {
        width,
        height,
        data: SourceData::Rgb(samples),
        filters: Filters::None,
        raw_white_point: 1.0,
        as_shot_wb: [1.0; 4],
        camera_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        orientation: Orientation::Normal,
        monochrome: false,
    };
    image.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(image)
}

/// Builds a `Filters` mosaic pattern from `rawloader`'s `CFA` by probing `color_at` over the
/// repeating cell, rather than depending on `rawloader`'s own internal pattern encoding.
fn build_filters(cfa: &rawloader::CFA) -> Filters {
    if cfa.width == 6 && cfa.height == 6 {
        let mut pattern = [[0u8; 6]; 6];
        for (row, cells) in pattern.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                *cell = match cfa.color_at(row, col) {
                    0 => 0,
                    2 => 2,
                    _ => 1,
                };
            }
        }
        Filters::XTrans(pattern)
    } else {
        let mut mask: u32 = 0;
        for py in 0..2u32 {
            for px in 0..2u32 {
                let code: u32 = match cfa.color_at(py as usize, px as usize) {
                    0 => 0,
                    2 => 2,
                    _ => 1,
                };
                // Matches `Filters::color_at`'s Bayer decode exactly (spec.md §6).
                let shift = (((py << 1) & 14) + (px & 1)) << 1;
                mask |= code << shift;
            }
        }
        Filters::Bayer(mask)
    }
}

/// 3x3 matrix inverse, used to turn `rawloader`'s XYZ-to-camera matrix into the
/// camera-to-XYZ matrix `Image::camera_matrix` expects (spec.md §3 "camera colour matrix").
/// Falls back to identity on a singular input rather than panicking.
fn invert3x3(m: [[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
    if det.abs() < 1e-12 {
        return [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    }
    let inv_det = 1.0 / det;
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ]
}

const RAW_EXTENSIONS: &[&str] = &["arw", "cr2", "cr3", "nef", "dng", "raf", "rw2", "orf"];

fn is_raw_path(name_lower: &str) -> bool {
    RAW_EXTENSIONS.iter().any(|ext| name_lower.ends_with(ext))
}

/// Applies one `ModuleConfig` against a live pipeline: enable/disable, then every
/// parameter override, dispatched to `set_param_bool`/`set_param_float`/`set_param_int`
/// by the JSON value's own shape. A float write against an integer field (or vice versa)
/// is retried against the other numeric setter before giving up, since the request doesn't
/// carry the module's scalar-type tag (spec.md §3 `ScalarType`) and the pipeline already
/// knows it.
fn apply_module_config(pipeline: &Pipeline, cfg: &ModuleConfig) -> anyhow::Result<()> {
    if let Some(enabled) = cfg.enabled {
        pipeline.set_enabled(&cfg.op, enabled)?;
    }
    for (field, value) in &cfg.params {
        match value {
            serde_json::Value::Bool(b) => {
                pipeline.set_param_bool(&cfg.op, field, *b)?;
            }
            serde_json::Value::Number(n) => {
                let as_f64 = n
                    .as_f64()
                    .ok_or_else(|| anyhow::anyhow!("{}.{field}: not a finite number", cfg.op))?;
                match pipeline.set_param_float(&cfg.op, field, as_f64 as f32) {
                    Ok(_) => {}
                    Err(PipelineError::TypeError { .. }) => {
                        pipeline.set_param_int(&cfg.op, field, as_f64 as i32)?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            other => {
                anyhow::bail!("{}.{field}: unsupported parameter value {other}", cfg.op);
            }
        }
    }
    Ok(())
}

fn load_render_request(raw: &str) -> anyhow::Result<RenderRequest> {
    if raw.ends_with(".json") && Path::new(raw).exists() {
        let file = File::open(raw)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    } else {
        Ok(serde_json::from_str(raw)?)
    }
}

fn render_one(path_str: &str, request: &RenderRequest, output_dir: &Path) -> anyhow::Result<()> {
    let path = Path::new(path_str);
    let name = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let name_lower = path_str.to_lowercase();

    let (image, black_fraction) = if is_raw_path(&name_lower) {
        decode_raw(path)?
    } else {
        (decode_standard(path)?, 0.0)
    };

    let pipeline = Pipeline::create(&image)?;
    if black_fraction > 0.0 {
        pipeline.set_param_float("rawprepare", "black", black_fraction)?;
    }
    for module in &request.modules {
        apply_module_config(&pipeline, module)?;
    }

    let rendered = match request.region {
        Some(r) => pipeline.render_region(r.x, r.y, r.width, r.height, request.scale)?,
        None => pipeline.render(request.scale)?,
    };
    if rendered.pixels.is_empty() {
        log::warn!("{path_str}: requested region rendered to an empty buffer, skipping write");
        return Ok(());
    }

    let buffer = image::RgbaImage::from_raw(rendered.width, rendered.height, rendered.pixels)
        .ok_or_else(|| anyhow::anyhow!("failed to assemble output buffer for {path_str}"))?;
    let out_path = output_dir.join(format!("{name}.png"));
    buffer.save(&out_path)?;
    log::debug!("wrote {}", out_path.display());
    Ok(())
}

/// Batch orchestrator.
///
/// 1. Parses CLI args and the render request.
/// 2. Resolves the input file list (string list or JSON manifest).
/// 3. Sizes a Rayon worker pool (spec.md §5) and renders every input in parallel, one
///    pipeline per file.
/// 4. Reports JSON progress lines to stdout throughout, continuing past per-file errors.
fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let request = load_render_request(&args.request)?;

    let input_paths: Vec<String> = if args.inputs.ends_with(".json") && Path::new(&args.inputs).exists() {
        let file = File::open(&args.inputs)?;
        serde_json::from_reader(BufReader::new(file))?
    } else {
        args.inputs.split(',').map(|s| s.to_string()).collect()
    };

    let threads = args.threads.unwrap_or_else(num_cpus::get);
    // Best-effort: a global pool can only be installed once per process, so a second
    // invocation in the same process (e.g. under test) silently keeps the first one.
    let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    log::info!("rendering {} file(s) with {threads} worker thread(s)", input_paths.len());

    let total = input_paths.len();
    let counter = Arc::new(AtomicUsize::new(0));
    let output_dir = PathBuf::from(&args.output);
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir)?;
    }

    input_paths.into_par_iter().for_each(|path_str| {
        let c = counter.fetch_add(1, Ordering::SeqCst);
        println!(
            "{}",
            serde_json::to_string(&Progress {
                progress: (c as f32 / total as f32) * 100.0,
                current_file: path_str.clone(),
                status: "processing".to_string(),
            })
            .unwrap()
        );

        if let Err(e) = render_one(&path_str, &request, &output_dir) {
            log::warn!("{path_str}: {e}");
            println!(
                "{}",
                serde_json::to_string(&Progress {
                    progress: (c as f32 / total as f32) * 100.0,
                    current_file: path_str,
                    status: format!("error: {e}"),
                })
                .unwrap()
            );
        }
    });

    println!(
        "{}",
        serde_json::to_string(&Progress {
            progress: 100.0,
            current_file: "done".to_string(),
            status: "complete".to_string(),
        })
        .unwrap()
    );
    Ok(())
}
