mod analyzer;
mod audio;
mod catalog;
mod cli;
mod config;
mod encode;
mod fetch;
mod player;
mod render;
mod waveform;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use analyzer::element::PlaybackElement;
use analyzer::{average_level, RealtimeAnalyzer};
use audio::convert::{to_canonical_wav, with_wav_extension};
use audio::decode::{decode_bytes, decode_file};
use catalog::bulk::{bulk_assign_split, bulk_delete, download_zip};
use catalog::export::{dataset_file_name, import_csv, write_csv, write_json, zip_file_name, ZipSelection};
use catalog::records::{FileRecord, VersionRecord};
use catalog::store::{LocalStore, Store};
use catalog::upload::{restore_version, upload_new, upload_version, NewUpload};
use catalog::{ChannelLayout, FileEdit, FileFilter};
use cli::{Channels, Cli, Command, ExportFormat, FilterArgs, Mode};
use config::{Config, DEFAULT_STORE_ROOT};
use fetch::fetch_bytes;
use player::{format_time, WaveformPlayer};
use render::surface::{Color, Surface};
use render::waveform::{draw, ProgressStyle as WaveStyle, RenderMode};
use waveform::{envelope_from_buffer, WaveformError, PLAYER_SAMPLES};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let cfg = match config::find_config(cli.config.clone()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };
    // Merge: config values apply only when CLI is at its default
    if cli.store == Path::new(DEFAULT_STORE_ROOT) {
        cli.store = cfg.store.root.clone();
    }

    let open = || open_store(&cli.store, cli.email.as_deref(), cli.password.as_deref(), &cfg);

    match cli.command {
        Command::Convert { input, output } => cmd_convert(&input, output),
        Command::Info { input, json } => cmd_info(&input, json),
        Command::Waveform {
            source,
            output,
            samples,
            width,
            height,
            dpr,
            mode,
            progress,
            seek_x,
            played,
            unplayed,
        } => {
            let w = &cfg.waveform;
            let samples = if samples == PLAYER_SAMPLES { w.samples } else { samples };
            let width = if width == 800 { w.width } else { width };
            let height = if height == 80 { w.height } else { height };
            let dpr = if dpr == 1.0 { w.dpr } else { dpr };
            let style = WaveStyle {
                played: parse_color(played.as_deref().unwrap_or(&w.played))?,
                unplayed: parse_color(unplayed.as_deref().unwrap_or(&w.unplayed))?,
            };
            cmd_waveform(&source, &output, samples, (width, height, dpr), mode, progress, seek_x, style)
        }
        Command::Meter { input, seconds } => cmd_meter(&input, seconds),
        Command::Upload {
            input,
            uploaded_by,
            emotion,
            description,
            split,
        } => {
            let mut store = open()?;
            let file_name = file_name_of(&input)?;
            let bytes = std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let record = upload_new(
                &mut store,
                NewUpload {
                    file_name,
                    bytes,
                    uploaded_by,
                    emotion,
                    description,
                    dataset_type: split,
                },
            )
            .context("Upload failed")?;
            print_file(&record);
            Ok(())
        }
        Command::NewVersion { id, input, notes } => {
            let mut store = open()?;
            let file_name = file_name_of(&input)?;
            let bytes = std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let version = upload_version(&mut store, id, &file_name, bytes, notes.as_deref())
                .with_context(|| format!("Failed to add a version to file {}", id))?;
            print_version(&version);
            Ok(())
        }
        Command::Versions { id } => {
            let store = open()?;
            let file = store.get_file(id)?;
            println!("{} (current: v{})", file.original_filename, file.current_version);
            for version in store.list_versions(id)? {
                print_version(&version);
            }
            Ok(())
        }
        Command::Restore { id, version } => {
            let mut store = open()?;
            let restored = restore_version(&mut store, id, version)
                .with_context(|| format!("Failed to restore version {} of file {}", version, id))?;
            print_version(&restored);
            Ok(())
        }
        Command::List { filter, json } => {
            let store = open()?;
            let filter = to_filter(&filter);
            let files = filter.apply(&store.list_files()?);
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                for file in &files {
                    print_file(file);
                }
                log::info!("{} file(s), {} filter(s) active", files.len(), filter.active_count());
            }
            Ok(())
        }
        Command::Edit {
            id,
            emotion,
            description,
            split,
        } => {
            let mut store = open()?;
            let record = catalog::edit_file(
                &mut store,
                id,
                FileEdit {
                    emotion,
                    description,
                    dataset_type: split,
                },
            )
            .with_context(|| format!("Failed to update file {}", id))?;
            print_file(&record);
            Ok(())
        }
        Command::Delete { id } => {
            let mut store = open()?;
            let file = store.get_file(id)?;
            catalog::delete_file(&mut store, &file).with_context(|| format!("Failed to delete file {}", id))?;
            Ok(())
        }
        Command::BulkDelete { ids } => {
            let mut store = open()?;
            let files = store.list_files()?;
            let selected: Vec<FileRecord> = files.into_iter().filter(|f| ids.contains(&f.id)).collect();
            let pb = progress_bar(selected.len(), "deleted")?;
            let report = bulk_delete(&mut store, &selected, |done, _| pb.set_position(done as u64));
            pb.finish_and_clear();
            let missing = ids.len() - selected.len();
            println!("{} ({} id(s) not found)", report, missing);
            Ok(())
        }
        Command::Assign { split, ids } => {
            let mut store = open()?;
            let report = bulk_assign_split(&mut store, &ids, split, |_, _| {});
            println!("{}", report);
            Ok(())
        }
        Command::Export { format, filter, output } => {
            let store = open()?;
            let files = to_filter(&filter).apply(&store.list_files()?);
            if files.is_empty() {
                anyhow::bail!("No files to export");
            }
            let path = output.unwrap_or_else(|| {
                PathBuf::from(dataset_file_name(filter.split, format.extension(), Utc::now().date_naive()))
            });
            let out = BufWriter::new(File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?);
            match format {
                ExportFormat::Csv => write_csv(&files, out)?,
                ExportFormat::Json => write_json(&files, out, Utc::now())?,
            }
            log::info!("Done! Output: {}", path.display());
            Ok(())
        }
        Command::Import { input } => {
            let mut store = open()?;
            let file = File::open(&input).with_context(|| format!("Failed to open {}", input.display()))?;
            let pb = progress_bar(0, "rows")?;
            let report = import_csv(&mut store, BufReader::new(file), |done, total| {
                pb.set_length(total as u64);
                pb.set_position(done as u64);
            })
            .context("CSV import failed")?;
            pb.finish_and_clear();
            println!("{}", report);
            Ok(())
        }
        Command::Download { ids, split, output } => {
            let store = open()?;
            let (files, selection) = if !ids.is_empty() {
                let files: Vec<FileRecord> = store
                    .list_files()?
                    .into_iter()
                    .filter(|f| ids.contains(&f.id))
                    .collect();
                (files, ZipSelection::Selected)
            } else {
                let files = catalog::filter_by_split(&store.list_files()?, split);
                (files, split.map_or(ZipSelection::All, ZipSelection::Split))
            };
            if files.is_empty() {
                anyhow::bail!("No files to download");
            }

            let path = output.unwrap_or_else(|| PathBuf::from(zip_file_name(selection, Utc::now().date_naive())));
            let out = BufWriter::new(File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?);
            let pb = progress_bar(files.len(), "files")?;
            let report = download_zip(&store, &files, out, |done, _| pb.set_position(done as u64))
                .context("Failed to write ZIP archive")?;
            pb.finish_and_clear();
            println!("{} -> {}", report, path.display());
            Ok(())
        }
        Command::Stats { json } => {
            let store = open()?;
            let stats = catalog::stats::compute(&store.list_files()?, &cfg.catalog.team, cfg.catalog.target_clips);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }
            println!(
                "Total: {} / {} clips ({:.1}%, {} to go)",
                stats.total_files,
                stats.target_clips,
                stats.progress_percent(),
                stats.remaining()
            );
            for member in &stats.members {
                let breakdown: Vec<String> = member
                    .emotions
                    .iter()
                    .filter(|(_, n)| **n > 0)
                    .map(|(e, n)| format!("{}={}", e, n))
                    .collect();
                println!("  {:<12} {:>4}  {}", member.name, member.total, breakdown.join(" "));
            }
            for (emotion, count) in &stats.emotions {
                println!("  {:<12} {:>4}", emotion, count);
            }
            Ok(())
        }
        Command::Url { id, ttl } => {
            let store = open()?;
            let file = store.get_file(id)?;
            let ttl = Duration::from_secs(ttl.unwrap_or(cfg.store.signed_url_ttl_secs));
            println!("{}", store.create_signed_url(&file.file_path, ttl)?);
            Ok(())
        }
    }
}

fn open_store(root: &Path, email: Option<&str>, password: Option<&str>, cfg: &Config) -> Result<LocalStore> {
    let mut store = LocalStore::open(root, cfg.store.users.clone())
        .with_context(|| format!("Failed to open store at {}", root.display()))?;
    let email = email.context("Email is required: pass --email or set EMOCLIP_EMAIL")?;
    let password = password.context("Password is required: pass --password or set EMOCLIP_PASSWORD")?;
    store.sign_in(email, password)?;
    Ok(store)
}

fn progress_bar(len: usize, unit: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!("[{{elapsed_precise}}] {{bar:40.cyan/blue}} {{pos}}/{{len}} {}", unit))?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Invalid file name: {}", path.display()))
}

fn parse_color(text: &str) -> Result<Color> {
    text.parse::<Color>()
        .map_err(|e| anyhow::anyhow!("Invalid color '{}': {}", text, e))
}

fn to_filter(args: &FilterArgs) -> FileFilter {
    FileFilter {
        emotion: args.emotion,
        duration_min: args.min_duration,
        duration_max: args.max_duration,
        sample_rate: args.sample_rate,
        channels: args.channels.map(|c| match c {
            Channels::Mono => ChannelLayout::Mono,
            Channels::Stereo => ChannelLayout::Stereo,
        }),
        size_min_mb: args.min_size,
        size_max_mb: args.max_size,
        split: args.split,
    }
}

fn print_file(file: &FileRecord) {
    let meta = file
        .metadata
        .map(|m| {
            format!(
                "{}  {} Hz  {}ch  {:.1} dB",
                format_time(m.duration_seconds),
                m.sample_rate_hz,
                m.channel_count,
                m.average_level_db
            )
        })
        .unwrap_or_else(|| "no metadata".to_string());
    println!(
        "{:>5}  {:<32} {:<10} {:<10} {:<10} v{}  {:.2} MB  {}",
        file.id,
        file.original_filename,
        file.uploaded_by,
        file.emotion.map_or("-", |e| e.as_str()),
        file.dataset_type.map_or("-", |d| d.as_str()),
        file.current_version,
        file.size_mb(),
        meta
    );
}

fn print_version(version: &VersionRecord) {
    println!(
        "  v{:<3} {}  {} bytes  {}  {}",
        version.version_number,
        version.created_at.format("%Y-%m-%d %H:%M"),
        version.file_size,
        version.file_path,
        version.notes.as_deref().unwrap_or("")
    );
}

fn cmd_convert(input: &Path, output: Option<PathBuf>) -> Result<()> {
    let file_name = file_name_of(input)?;
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let converted = to_canonical_wav(&file_name, bytes).context("Conversion failed")?;

    let output = output.unwrap_or_else(|| input.with_file_name(with_wav_extension(&file_name)));
    if output == input && !converted.is_converted {
        log::info!("{} is already WAV, nothing to do", input.display());
        return Ok(());
    }
    std::fs::write(&output, &converted.bytes).with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!(
        "Done! Output: {} ({} -> {} bytes)",
        output.display(),
        converted.original_size,
        converted.bytes.len()
    );
    Ok(())
}

fn cmd_info(input: &Path, json: bool) -> Result<()> {
    let buffer = decode_file(input).with_context(|| format!("Failed to decode {}", input.display()))?;
    let meta = audio::metadata::extract(&buffer);
    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
    } else {
        println!("Duration:    {:.3} s ({})", meta.duration_seconds, format_time(meta.duration_seconds));
        println!("Sample rate: {} Hz", meta.sample_rate_hz);
        println!("Channels:    {}", meta.channel_count);
        println!("Level:       {:.1} dB (approx.)", meta.average_level_db);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_waveform(
    source: &str,
    output: &Path,
    samples: usize,
    (width, height, dpr): (u32, u32, f32),
    mode: Mode,
    progress: f64,
    seek_x: Option<f64>,
    style: WaveStyle,
) -> Result<()> {
    let decoded = fetch_bytes(source)
        .map_err(WaveformError::from)
        .and_then(|bytes| decode_bytes(bytes, None).map_err(WaveformError::from));
    let duration = decoded.as_ref().map_or(0.0, |b| b.duration_seconds());
    let envelope = decoded.and_then(|buffer| envelope_from_buffer(&buffer, samples));

    let mut surface = Surface::new(width as f32, height as f32, dpr).context("Failed to allocate waveform surface")?;
    match mode {
        Mode::Overlay => {
            let envelope = envelope.with_context(|| format!("Failed to build waveform for {}", source))?;
            draw(&mut surface, &envelope, RenderMode::Overlay, 0.0, &style);
        }
        Mode::Progress => {
            let mut player = WaveformPlayer::from_result(envelope, duration, style);
            match seek_x {
                Some(x) => {
                    player.seek_to_pointer(x, width as f64);
                }
                None => player.tick(progress.clamp(0.0, 1.0) * duration),
            }
            player.render(&mut surface);
            println!("{} / {}", format_time(player.current_time()), format_time(player.duration()));
        }
    }

    surface
        .save_png(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    let (pw, ph) = surface.physical_size();
    log::info!(
        "Done! Output: {} ({}x{} @{}x)",
        output.display(),
        pw,
        ph,
        surface.device_pixel_ratio()
    );
    Ok(())
}

fn cmd_meter(input: &Path, seconds: f64) -> Result<()> {
    let buffer = decode_file(input).with_context(|| format!("Failed to decode {}", input.display()))?;
    let element = Arc::new(PlaybackElement::new(buffer));
    let analyzer = RealtimeAnalyzer::default();

    let level = Arc::new(AtomicU32::new(0));
    let sink = Arc::clone(&level);

    element.play();
    let mut handle = analyzer.start(&element, move |bins| {
        sink.store(average_level(bins).to_bits(), Ordering::Relaxed);
    });

    let pb = ProgressBar::new(255);
    pb.set_style(ProgressStyle::default_bar().template("{msg} [{bar:40.green/black}] {pos:>3}")?);

    let limit = seconds.min(element.duration()).max(0.0);
    let started = Instant::now();
    while started.elapsed().as_secs_f64() < limit {
        let value = f32::from_bits(level.load(Ordering::Relaxed));
        pb.set_position(value.round() as u64);
        pb.set_message(format_time(element.current_time()));
        std::thread::sleep(Duration::from_millis(50));
    }

    handle.stop();
    element.pause();
    analyzer.registry().release(element.id());
    pb.finish_and_clear();
    log::info!("Metered {} of {}", format_time(element.current_time()), input.display());
    Ok(())
}
