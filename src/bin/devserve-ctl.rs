use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "devserve-ctl")]
#[command(about = "Control a running devserve instance", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8088")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server state and the active project
    Status,
    /// List registered projects
    Projects,
    /// Serve a project (registering it when new)
    Activate {
        path: PathBuf,
        /// Proxy to this dev server instead of serving files
        #[arg(long)]
        proxy: Option<String>,
        /// Mute pattern (repeatable)
        #[arg(long = "mute")]
        mute: Vec<String>,
    },
    /// Forget a project
    Remove { path: PathBuf },
    /// Replace a project's mute list
    Mute {
        path: PathBuf,
        patterns: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let api = format!("{}/_/api", cli.url.trim_end_matches('/'));

    let res = match cli.command {
        Commands::Status => client.get(format!("{api}/status")).send().await?,
        Commands::Projects => client.get(format!("{api}/projects")).send().await?,
        Commands::Activate { path, proxy, mute } => {
            let mut body = json!({ "path": absolute(path)? });
            if let Some(proxy) = proxy {
                body["targetHost"] = json!(proxy);
            }
            if !mute.is_empty() {
                body["muteList"] = json!(mute);
            }
            client
                .post(format!("{api}/projects/activate"))
                .json(&body)
                .send()
                .await?
        }
        Commands::Remove { path } => {
            client
                .post(format!("{api}/projects/remove"))
                .json(&json!({ "path": absolute(path)? }))
                .send()
                .await?
        }
        Commands::Mute { path, patterns } => {
            client
                .post(format!("{api}/projects/mute"))
                .json(&json!({ "path": absolute(path)?, "muteList": patterns }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

/// Relative paths mean something only to this process, not to the server.
fn absolute(path: PathBuf) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or(text);

    if !status.is_success() {
        eprintln!("Error: server returned status {status}");
        eprintln!("{pretty}");
        std::process::exit(1);
    }

    println!("{pretty}");
    Ok(())
}
