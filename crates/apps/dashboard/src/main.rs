use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use client::BackendClient;
use formats::UploadedFile;
use session::{Notification, RenderPlan, Severity};

mod config;
mod coordinator;

use config::DashboardConfig;
use coordinator::Coordinator;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = DashboardConfig::from_env();
    if config.api_key.is_empty() {
        warn!("DASHBOARD_API_KEY is empty; authenticated endpoints will be rejected");
    }

    let session_id = Uuid::new_v4();
    info!(
        "dashboard session {session_id} using backend {}",
        config.backend_url
    );

    let client = Arc::new(BackendClient::new(&config.backend_url, &config.api_key));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut coordinator = Coordinator::new(client, tx, config.merge_folder.clone());

    // Context data loads on startup, independent of any user action.
    for (name, path) in &config.background_layers {
        coordinator.load_background_layer(name, path);
    }
    coordinator.load_risk_scores();

    print_help();

    // Commands arrive over a channel so the select below stays cancel-safe.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("stdin error: {err}");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            completion = rx.recv() => {
                let Some(completion) = completion else { break };
                coordinator.apply(completion);
                flush_ui(&mut coordinator);
            }
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                if !handle_command(&mut coordinator, &config, line.trim()).await {
                    break;
                }
                flush_ui(&mut coordinator);
            }
        }
    }

    info!("dashboard session {session_id} closed");
}

/// Returns false when the loop should exit.
async fn handle_command(
    coordinator: &mut Coordinator,
    config: &DashboardConfig,
    line: &str,
) -> bool {
    let (command, arg) = match line.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "upload" => submit_file(coordinator, arg, false).await,
        "preview" => submit_file(coordinator, arg, true).await,
        "generate" => coordinator.generate_products(),
        "export" => coordinator.start_export(),
        "scores" => coordinator.load_risk_scores(),
        "layers" => {
            for (name, path) in &config.background_layers {
                coordinator.load_background_layer(name, path);
            }
        }
        "plan" => print_plan(&coordinator.compose()),
        "quit" | "exit" => return false,
        "help" => print_help(),
        other => println!("unknown command: {other} (try `help`)"),
    }
    true
}

async fn submit_file(coordinator: &mut Coordinator, path: &str, preview: bool) {
    if path.is_empty() {
        println!("usage: {} <path>", if preview { "preview" } else { "upload" });
        return;
    }

    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());

    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let file = UploadedFile::new(name, bytes);
            if preview {
                coordinator.submit_preview(file);
            } else {
                coordinator.submit_upload(file);
            }
        }
        Err(err) => coordinator.reject_unreadable(path, &err),
    }
}

fn flush_ui(coordinator: &mut Coordinator) {
    for note in coordinator.drain_notifications() {
        match note {
            Notification::Toast { severity, message } => {
                let tag = match severity {
                    Severity::Info => "info",
                    Severity::Error => "error",
                };
                println!("[{tag}] {message}");
            }
            Notification::OpenExternal { url } => println!("[open] {url}"),
        }
    }

    let plan = coordinator.compose();
    for slot in &plan.loading {
        println!("[loading] {slot}");
    }
}

fn print_plan(plan: &RenderPlan) {
    if plan.awaiting_upload {
        println!("map: upload a KML, GeoJSON, or TIFF file to visualize data");
    }
    for layer in &plan.map_layers {
        println!(
            "layer: {} ({} features, {:?})",
            layer.name, layer.feature_count, layer.source
        );
    }
    if !plan.metadata_rows.is_empty() {
        println!("metadata:");
        for row in &plan.metadata_rows {
            println!(
                "  {} | {} | {} vertices",
                row.name, row.geometry_type, row.vertex_count
            );
        }
    }
    if let Some(chart) = &plan.chart {
        println!("risk chart:");
        for (label, score) in chart.labels.iter().zip(&chart.scores) {
            println!("  {label}: {score:.2}");
        }
    }
    for image in &plan.images {
        println!("image: {} -> {}", image.title, image.url);
    }
    for link in &plan.links {
        println!("link: {} -> {}", link.label, link.url);
    }
    for slot in &plan.loading {
        println!("loading: {slot}");
    }
}

fn print_help() {
    println!("commands:");
    println!("  upload <path>   classify and ingest a KML/GeoJSON/TIFF file");
    println!("  preview <path>  server-side parse preview");
    println!("  generate        merge uploaded rasters into terrain products");
    println!("  export          start the metadata CSV export");
    println!("  scores          reload risk scores");
    println!("  layers          reload background layers");
    println!("  plan            print the current render plan");
    println!("  quit            exit");
}
