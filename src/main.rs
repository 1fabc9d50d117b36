//! Main application for the queued YouTube downloader GUI

// Download job: preflight, stream selection, merge
mod downloader;
// Errors raised inside a job
mod error;
// Worker-to-GUI messages
mod events;
// yt-dlp metadata and stream downloads
mod extractor;
// Data models for requests and streams
mod model;
// ffmpeg presence check and installer hand-off
mod preflight;
// Progress parsing utilities
mod progress;
// Resolution list for a URL
mod quality;
// Sequential download queue
mod queue;
// Persisted settings
mod settings;
// ffmpeg merge and installer commands
mod transcoder;

use downloader::Downloader;
use events::{LogSink, WorkerEvent};
use extractor::YtDlp;
use model::DownloadRequest;
use queue::QueueOrchestrator;
use settings::Settings;
use transcoder::{Ffmpeg, ShellInstaller};

// eframe/egui for GUI application framework
use eframe::{egui, App, Frame};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::{runtime::Runtime, sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tracing_subscriber::EnvFilter;
use egui::Visuals;

// Pause after the last keystroke before looking up qualities
const QUALITY_LOOKUP_DELAY: Duration = Duration::from_millis(400);

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Program entry point: initializes logging and runtime, then launches GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let rt = Arc::new(Runtime::new()?);
    RUNTIME
        .set(Arc::clone(&rt))
        .map_err(|_| "runtime initialised twice")?;

    let settings = Settings::load();
    tracing::info!(save_path = %settings.last_save_path, "starting");

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "YouTube Downloader",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(MyApp::new(settings, &rt))
        }),
    )?;
    Ok(())
}

/// Compact stdout logging, `RUST_LOG` overrides the default `info` level.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .compact()
        .try_init()
        .ok();
}

/// Application state for the GUI
struct MyApp {
    /// Loaded at startup, written back on enqueue and on exit
    settings: Settings,
    /// Input field for the video URL
    url_input: String,
    /// Destination folder for downloads
    download_folder: String,
    /// Selected quality option
    selected_quality: String,
    /// Qualities known for the current URL
    quality_options: Vec<String>,
    /// Incoming quality lookups (url, qualities)
    quality_results: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    /// Lookup still running for an earlier edit of the URL
    quality_lookup: Option<JoinHandle<()>>,
    extractor: Arc<YtDlp>,
    runtime: Arc<Runtime>,
    queue: QueueOrchestrator,
    /// Worker log lines and progress
    events: UnboundedReceiver<WorkerEvent>,
    log_lines: Vec<String>,
    progress: f32,
}

impl MyApp {
    fn new(settings: Settings, runtime: &Arc<Runtime>) -> Self {
        let extractor = Arc::new(YtDlp::new(settings.ytdlp_path.clone()));
        let downloader = Downloader::new(
            extractor.clone(),
            Arc::new(Ffmpeg::new(settings.ffmpeg_path.clone())),
            Arc::new(ShellInstaller),
        );
        let (log, events) = LogSink::channel();
        let queue = QueueOrchestrator::new(Arc::new(downloader), log, runtime.handle().clone());

        Self {
            download_folder: settings.last_save_path.clone(),
            settings,
            url_input: String::new(),
            selected_quality: String::new(),
            quality_options: Vec::new(),
            quality_results: Arc::new(Mutex::new(Vec::new())),
            quality_lookup: None,
            extractor,
            runtime: Arc::clone(runtime),
            queue,
            events,
            log_lines: Vec::new(),
            progress: 0.0,
        }
    }

    /// Starts a background quality lookup for the current URL, cancelling the
    /// one started for the previous edit. Dropping the aborted future kills its
    /// yt-dlp process.
    fn request_qualities(&mut self, ctx: &egui::Context) {
        self.quality_options.clear();
        self.selected_quality.clear();
        if let Some(previous) = self.quality_lookup.take() {
            previous.abort();
        }

        let url = self.url_input.trim().to_string();
        if url.is_empty() {
            return;
        }
        let extractor = Arc::clone(&self.extractor);
        let results = Arc::clone(&self.quality_results);
        let ctx_c = ctx.clone();
        self.quality_lookup = Some(self.runtime.spawn(async move {
            // Give the user a moment to finish typing before running yt-dlp.
            tokio::time::sleep(QUALITY_LOOKUP_DELAY).await;
            let qualities = quality::resolve_qualities(extractor.as_ref(), &url).await;
            if let Ok(mut pending) = results.lock() {
                pending.push((url, qualities));
            }
            ctx_c.request_repaint();
        }));
    }

    /// Queues the form contents and kicks the worker if it is idle.
    fn enqueue_current(&mut self) {
        let request = DownloadRequest::new(
            self.url_input.trim(),
            self.download_folder.trim(),
            self.selected_quality.clone(),
        );
        if !self.queue.enqueue(request) {
            return;
        }

        self.settings.last_save_path = self.download_folder.trim().to_string();
        if let Err(e) = self.settings.save() {
            tracing::warn!("could not save settings: {:#}", e);
        }
        self.queue.start_or_advance();
    }

    fn poll_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                WorkerEvent::Log(line) => self.log_lines.push(line),
                WorkerEvent::Progress(p) => self.progress = p,
                WorkerEvent::Finished => self.progress = 0.0,
                WorkerEvent::Idle => tracing::debug!("queue idle"),
            }
        }
    }

    fn apply_quality_results(&mut self) {
        let Ok(mut pending) = self.quality_results.lock() else {
            return;
        };
        let current = self.url_input.trim();
        // Results for a URL the user has since edited away are stale.
        for (url, qualities) in pending.drain(..) {
            if url == current {
                self.quality_options = qualities;
            }
        }
        if !self.quality_options.contains(&self.selected_quality) {
            self.selected_quality = self.quality_options.first().cloned().unwrap_or_default();
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // 1️⃣ Drain worker messages and finished quality lookups
        self.poll_events();
        self.apply_quality_results();

        // 2️⃣ Right-side panel: running and queued downloads
        egui::SidePanel::right("queue_panel").show(ctx, |ui| {
            ui.heading(format!("Queue ({} waiting)", self.queue.len()));
            ui.separator();

            match self.queue.current() {
                Some(active) => {
                    ui.label(format!("⬇️ {} ({})", active.source_identifier, active.requested_quality));
                    ui.add(egui::ProgressBar::new(self.progress).show_percentage());
                }
                None => {
                    ui.label("Idle");
                }
            }
            ui.separator();

            egui::ScrollArea::vertical()
                .id_source("pending")
                .auto_shrink([false; 2])
                .show(ui, |ui| {
                    if self.queue.is_empty() {
                        ui.label("Nothing queued");
                    }
                    for (i, request) in self.queue.pending().iter().enumerate() {
                        ui.label(format!(
                            "{}. {} ({})",
                            i + 1,
                            request.source_identifier,
                            request.requested_quality
                        ));
                    }
                });
        });

        // 3️⃣ Main panel: inputs for URL, quality, folder, the Download button and the log
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("YouTube Downloader");

            // URL input field; every edit refreshes the quality list
            ui.label("Paste YouTube video URL:");
            if ui.text_edit_singleline(&mut self.url_input).changed() {
                self.request_qualities(ctx);
            }

            // Quality dropdown, disabled until qualities are known
            ui.label("Select Video Quality:");
            ui.add_enabled_ui(!self.quality_options.is_empty(), |ui| {
                egui::ComboBox::from_label("")
                    .selected_text(&self.selected_quality)
                    .show_ui(ui, |ui| {
                        for q in &self.quality_options {
                            ui.selectable_value(&mut self.selected_quality, q.clone(), q);
                        }
                    });
            });

            // Folder selection
            ui.horizontal(|ui| {
                ui.label("Download folder:");
                ui.text_edit_singleline(&mut self.download_folder);
                if ui.button("Browse…").clicked() {
                    if let Some(folder) = FileDialog::new().set_directory(&self.download_folder).pick_folder() {
                        self.download_folder = folder.display().to_string();
                    }
                }
            });

            // Jobs added while one runs wait their turn
            let label = if self.queue.is_running() { "Add to queue" } else { "Download" };
            if ui.button(label).clicked() {
                self.enqueue_current();
            }

            ui.separator();
            ui.label("Log");
            egui::ScrollArea::vertical()
                .id_source("log")
                .stick_to_bottom(true)
                .auto_shrink([false; 2])
                .show(ui, |ui| {
                    for line in &self.log_lines {
                        ui.label(line);
                    }
                });
        });

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

/// Persists the last used folder when the window closes
impl Drop for MyApp {
    fn drop(&mut self) {
        self.settings.last_save_path = self.download_folder.trim().to_string();
        if let Err(e) = self.settings.save() {
            tracing::warn!("could not save settings on exit: {:#}", e);
        }
    }
}
