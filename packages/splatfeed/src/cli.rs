use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::camera::CameraRig;
use crate::catalog::Catalog;
use crate::config::ViewerConfig;
use crate::formats;
use crate::gpu::PointRenderer;
use crate::navigator::NavDirection;
use crate::render_job::{RenderError, RenderMetadata, RenderPhase, RenderProgress, SessionJobSpec, TransitionRecord};
use crate::ticker::ManualClock;
use crate::viewer::ViewerSession;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scripted navigation session to frames on disk
    Render {
        /// Catalog manifest (JSON); scene files resolve relative to it
        #[arg(long)]
        manifest: PathBuf,

        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Viewer config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Comma-separated gestures, e.g. next,next,prev
        #[arg(long, value_delimiter = ',')]
        gestures: Vec<NavDirection>,

        /// Seconds between gestures
        #[arg(long, default_value_t = 1.5)]
        gesture_interval: f32,

        /// Seconds rendered after the last gesture
        #[arg(long, default_value_t = 1.5)]
        tail: f32,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Output width
        #[arg(long, default_value_t = 1280)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 720)]
        height: u32,
    },
    /// List catalog entries and their splat counts
    Catalog {
        #[arg(long)]
        manifest: PathBuf,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            manifest,
            out,
            config,
            gestures,
            gesture_interval,
            tail,
            fps,
            width,
            height,
        } => {
            let mut job = SessionJobSpec::new(manifest, out);
            job.config_path = config;
            job.gestures = gestures;
            job.gesture_interval_secs = gesture_interval;
            job.tail_secs = tail;
            job.fps = fps;
            job.width = width;
            job.height = height;
            pollster::block_on(render_session(job))?;
        }
        Commands::Catalog { manifest } => {
            list_catalog(&manifest)?;
        }
    }
    Ok(())
}

fn list_catalog(manifest: &Path) -> Result<()> {
    let catalog = Catalog::from_file(manifest)?;
    let root = manifest.parent().unwrap_or_else(|| Path::new(""));

    println!("{} entries in {:?}", catalog.len(), manifest);
    for (index, entry) in catalog.entries().iter().enumerate() {
        let splats = std::fs::read(root.join(&entry.file))
            .map_err(anyhow::Error::from)
            .and_then(|bytes| formats::decode(&entry.file, &bytes));
        match splats {
            Ok(cloud) => println!("{:>3}  {:<20} {:<32} {} splats", index, entry.id, entry.name, cloud.centers.len()),
            Err(err) => println!("{:>3}  {:<20} {:<32} unreadable: {:#}", index, entry.id, entry.name, err),
        }
    }
    Ok(())
}

async fn render_session(job: SessionJobSpec) -> Result<(), RenderError> {
    let started_at = chrono::Utc::now();
    let wall = Instant::now();

    job.validate()
        .map_err(|e| RenderError::new(RenderPhase::Initialization, e))?;

    let config = match &job.config_path {
        Some(path) => ViewerConfig::from_file(path)
            .map_err(|e| RenderError::from_anyhow(RenderPhase::Initialization, e))?,
        None => ViewerConfig::default(),
    };

    let catalog = Catalog::from_file(&job.manifest_path)
        .map_err(|e| RenderError::from_anyhow(RenderPhase::CatalogLoading, e))?;
    catalog
        .validate()
        .map_err(|e| RenderError::new(RenderPhase::CatalogLoading, e))?;

    let clock = Rc::new(ManualClock::new(0.0));
    let mut session = ViewerSession::new(catalog, job.asset_root(), &config, clock.clone());
    session
        .start()
        .await
        .map_err(|e| RenderError::from_anyhow(RenderPhase::CatalogLoading, e))?;

    std::fs::create_dir_all(&job.output_dir)
        .map_err(|e| RenderError::with_source(RenderPhase::Initialization, "Failed to create output directory", e))?;

    // WGPU Init
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None, // Headless
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| RenderError::new(RenderPhase::GpuSetup, "No adapter found"))?;
    let adapter_info = adapter.get_info();
    let gpu_adapter = format!("{} ({:?})", adapter_info.name, adapter_info.backend);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await
        .map_err(|e| RenderError::with_source(RenderPhase::GpuSetup, "Failed to create device", e))?;

    let (width, height) = (job.width, job.height);
    let texture_desc = wgpu::TextureDescriptor {
        label: Some("Target Texture"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    };
    let texture = device.create_texture(&texture_desc);
    let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let padded_bytes_per_row = padded_bytes_per_row(width);
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Output Buffer"),
        size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut renderer = PointRenderer::new(device, queue, texture_desc.format, width, height);

    let total_frames = job.total_frames();
    let frame_ms = job.frame_duration_ms();
    let mut next_gesture = 0;
    let mut transitions = Vec::new();
    let mut warnings = Vec::new();

    println!("Rendering {} frames to {:?}...", total_frames, job.output_dir);

    for frame in 0..total_frames {
        clock.set(frame as f64 * frame_ms);

        while next_gesture < job.gestures.len() && job.gesture_frame(next_gesture) <= frame {
            let direction = job.gestures[next_gesture];
            next_gesture += 1;
            let outcome = match session.navigate(direction).await {
                Ok(outcome) => format!("{:?}", outcome),
                Err(err) => {
                    log::error!("Transition {:?} at frame {} failed: {:#}", direction, frame, err);
                    warnings.push(format!("frame {}: {:#}", frame, err));
                    format!("Failed: {:#}", err)
                }
            };
            transitions.push(TransitionRecord {
                frame,
                direction,
                outcome,
                entry_id: session.current_entry().map(|e| e.id.clone()),
            });
        }

        session.frame();

        let camera = session
            .current_entry()
            .map(|entry| CameraRig::from_pose(&entry.primary_pose()))
            .unwrap_or_default();
        renderer.render(&texture_view, &session.scene().borrow(), &camera);

        let pixels = read_frame(&renderer, &texture, &output_buffer, texture_desc.size, padded_bytes_per_row)?;
        let frame_path = job.output_dir.join(format!("frame_{:05}.png", frame));
        image::save_buffer(&frame_path, &pixels, width, height, image::ColorType::Rgba8)
            .map_err(|e| RenderError::with_source(RenderPhase::FrameSave, format!("Failed to save {:?}", frame_path), e))?;

        let frames_done = frame + 1;
        if frames_done % 60 == 0 || frames_done == total_frames {
            report_progress(&RenderProgress::measure(frames_done, total_frames, wall.elapsed().as_secs_f64()));
        }
    }
    println!("Done.");

    let render_duration_secs = wall.elapsed().as_secs_f64();
    let manifest_hash = RenderMetadata::hash_file(&job.manifest_path)
        .map_err(|e| RenderError::with_source(RenderPhase::MetadataSave, "Failed to hash manifest", e))?;
    let config_hash = match &job.config_path {
        Some(path) => Some(
            RenderMetadata::hash_file(path)
                .map_err(|e| RenderError::with_source(RenderPhase::MetadataSave, "Failed to hash config", e))?,
        ),
        None => None,
    };

    let metadata = RenderMetadata {
        job: job.clone(),
        started_at,
        completed_at: chrono::Utc::now(),
        render_duration_secs,
        frame_count: total_frames,
        average_render_fps: if render_duration_secs > 0.0 {
            total_frames as f64 / render_duration_secs
        } else {
            0.0
        },
        manifest_hash,
        config_hash,
        splatfeed_version: env!("CARGO_PKG_VERSION").to_string(),
        gpu_adapter,
        transitions,
        warnings,
    };
    metadata
        .save(&job.output_dir.join("metadata.json"))
        .map_err(|e| RenderError::new(RenderPhase::MetadataSave, e))?;

    log::info!("Rendered {} frames in {:.2}s", total_frames, render_duration_secs);
    Ok(())
}

/// Row pitch rounded up to wgpu's copy alignment.
fn report_progress(progress: &RenderProgress) {
    match progress.eta_secs {
        Some(eta) if progress.current_frame < progress.total_frames => println!(
            "  frame {}/{} ({:.0}%), {:.1}s elapsed, ~{:.1}s left",
            progress.current_frame,
            progress.total_frames,
            progress.percentage(),
            progress.elapsed_secs,
            eta
        ),
        _ => println!(
            "  frame {}/{} ({:.0}%), {:.1}s elapsed",
            progress.current_frame,
            progress.total_frames,
            progress.percentage(),
            progress.elapsed_secs
        ),
    }
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = std::mem::size_of::<u32>() as u32 * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded + (align - unpadded % align) % align
}

fn read_frame(
    renderer: &PointRenderer,
    texture: &wgpu::Texture,
    output_buffer: &wgpu::Buffer,
    size: wgpu::Extent3d,
    padded_bytes_per_row: u32,
) -> Result<Vec<u8>, RenderError> {
    let mut encoder = renderer
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: output_buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(size.height),
            },
        },
        size,
    );
    renderer.queue().submit(Some(encoder.finish()));

    let buffer_slice = output_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
        let _ = tx.send(v);
    });
    renderer.device().poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| RenderError::with_source(RenderPhase::FrameRender, "Readback channel closed", e))?
        .map_err(|e| RenderError::with_source(RenderPhase::FrameRender, "Failed to map output buffer", e))?;

    let row_bytes = (size.width * 4) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * size.height as usize);
    {
        let data = buffer_slice.get_mapped_range();
        for row in 0..size.height {
            let start = (row * padded_bytes_per_row) as usize;
            pixels.extend_from_slice(&data[start..start + row_bytes]);
        }
    }
    output_buffer.unmap();
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(1280), 5120);
    }

    #[test]
    fn test_parse_render_args() {
        let cli = Cli::try_parse_from([
            "splatfeed", "render", "--manifest", "m.json", "--out", "out", "--gestures", "next,prev,next",
        ])
        .unwrap();
        match cli.command {
            Commands::Render { gestures, fps, .. } => {
                assert_eq!(gestures, vec![NavDirection::Next, NavDirection::Prev, NavDirection::Next]);
                assert_eq!(fps, 60.0);
            }
            Commands::Catalog { .. } => panic!("expected render"),
        }
    }

    #[test]
    fn test_list_catalog_reports_entries() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        std::fs::write(&manifest, r#"[{"id": "a", "name": "A", "file": "missing.splat"}]"#).unwrap();
        assert!(list_catalog(&manifest).is_ok());
    }
}
