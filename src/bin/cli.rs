use anyhow::{anyhow, Context};
use snapstream::{FrameSource, StreamConfig, StreamController};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const USAGE: &str =
    "Usage: snapstream-cli <server_url> [--config <path>] [--seconds <n>] [--camera <index>] [--json]";

struct Options {
    server_url: String,
    config: Option<PathBuf>,
    seconds: Option<u64>,
    camera: Option<u32>,
    json: bool,
}

fn main() -> anyhow::Result<()> {
    snapstream::init_logging();

    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };

    let mut config = match &options.config {
        Some(path) => StreamConfig::load_from_file(path)?,
        None => StreamConfig::load_or_default(),
    };
    if let Some(index) = options.camera {
        let [primary, _] = config.capture.camera_indices;
        if index != primary {
            config.capture.camera_indices = [index, primary];
        }
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(run(options, config))
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut server_url = None;
    let mut config = None;
    let mut seconds = None;
    let mut camera = None;
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config = Some(PathBuf::from(value(args, i, "--config")?));
            }
            "--seconds" => {
                i += 1;
                seconds = Some(value(args, i, "--seconds")?.parse()?);
            }
            "--camera" => {
                i += 1;
                camera = Some(value(args, i, "--camera")?.parse()?);
            }
            "--json" => json = true,
            other if server_url.is_none() => server_url = Some(other.to_string()),
            other => return Err(anyhow!("Unexpected argument: {}", other)),
        }
        i += 1;
    }

    Ok(Options {
        server_url: server_url.ok_or_else(|| anyhow!("server_url required"))?,
        config,
        seconds,
        camera,
        json,
    })
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> anyhow::Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

#[cfg(feature = "camera")]
fn frame_source(config: &StreamConfig) -> anyhow::Result<Arc<dyn FrameSource>> {
    let index = config.capture.camera_indices[0];
    Ok(Arc::new(snapstream::CameraFrameSource::open(index)?))
}

#[cfg(not(feature = "camera"))]
fn frame_source(config: &StreamConfig) -> anyhow::Result<Arc<dyn FrameSource>> {
    let source = snapstream::testing::SyntheticFrameSource::new(640, 480);
    source.set_camera_index(config.capture.camera_indices[0]);
    Ok(Arc::new(source))
}

async fn run(options: Options, config: StreamConfig) -> anyhow::Result<()> {
    let source = frame_source(&config)?;
    let controller = StreamController::with_http(config, source)?;

    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;

    let mut updates = controller.subscribe();
    let json = options.json;
    let printer = tokio::spawn(async move {
        let mut last_message = String::new();
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().clone();
            if !json && status.last_message != last_message {
                println!("[{}] {}", status.state, status.last_message);
                last_message = status.last_message;
            }
        }
    });

    if let Err(e) = controller.start(&options.server_url).await {
        printer.abort();
        return Err(anyhow!(e.status_message()));
    }

    match options.seconds {
        Some(seconds) => {
            tokio::select! {
                _ = stop_rx.recv() => {}
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
            }
        }
        None => {
            stop_rx.recv().await;
        }
    }

    let frames_sent = controller.stop()?;
    // Let the printer show the STOPPED line
    tokio::task::yield_now().await;
    printer.abort();

    let stats = controller.stats();
    if json {
        let summary = serde_json::json!({
            "frames_sent": frames_sent,
            "status": controller.status(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Sent {} frames in {:.1}s ({:.1} fps, {} dropped, {} rejected)",
            frames_sent, stats.elapsed_secs, stats.average_fps, stats.dropped, stats.rejected
        );
    }
    Ok(())
}
