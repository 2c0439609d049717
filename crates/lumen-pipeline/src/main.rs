//! One-shot generation binary.
//!
//! Usage: `lumen-pipeline <persona> <prompt...>`
//! Prints the generation response (or the error body) as JSON.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lumen_models::{GenerationOptions, GenerationRequest, Persona};
use lumen_pipeline::{Pipeline, PipelineConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("lumen=info".parse().expect("static directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: lumen-pipeline <persona> <prompt...>");
        std::process::exit(2);
    }

    let persona: Persona = match args[0].parse() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    let prompt = args[1..].join(" ");

    let config = PipelineConfig::from_env();
    info!(persona = %persona, "Starting generation");

    let pipeline = Pipeline::new(config);
    let request = GenerationRequest::new(prompt, persona);

    match pipeline.generate(request, GenerationOptions::default()).await {
        Ok(response) => {
            let json = serde_json::to_string_pretty(&response)
                .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e));
            println!("{}", json);
        }
        Err(e) => {
            error!(error = %e, "Generation failed");
            let body = e.to_body(None);
            let json = serde_json::to_string_pretty(&body)
                .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e));
            eprintln!("{}", json);
            std::process::exit(1);
        }
    }

    pipeline.shutdown().await;
}
