use basie::{EncodeConfig, FfmpegEncoder, PipelineService, RunFlags};
use dotenv::dotenv;
use std::env;
use std::time::Instant;
use tracing::Level;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let flags = RunFlags::from_args(&args);
    let silent = args.iter().any(|arg| arg == "--silent");

    let level = if silent {
        Level::ERROR
    } else if flags.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config_path = args
        .iter()
        .skip(1)
        .find(|arg| !arg.starts_with("--"))
        .cloned()
        .or_else(|| env::var("BASIE_CONFIG").ok());
    let Some(config_path) = config_path else {
        eprintln!("usage: basie <config.json> [--force] [--clean] [--build] [--clean-cache] [--verbose] [--silent]");
        std::process::exit(2);
    };

    let config = match EncodeConfig::from_file(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    let service = match PipelineService::new(config, flags, FfmpegEncoder::new()) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let started = Instant::now();
    match service.run().await {
        Ok(()) => tracing::info!("finished in {}", human_duration(started.elapsed().as_secs_f64())),
        Err(e) => {
            eprintln!("build failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn human_duration(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else {
        format!("{:.1}m", seconds / 60.0)
    }
}
