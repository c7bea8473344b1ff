use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "integrityx-cli")]
#[command(about = "Command line client for the IntegrityX API", long_about = None)]
struct Cli {
    #[arg(short, long, env = "INTEGRITYX_URL", default_value = "http://localhost:8000")]
    url: String,

    /// Bearer token, when the server has authentication enabled.
    #[arg(short, long, env = "INTEGRITYX_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server, database and sealing status
    Health,
    /// Verify a sealed document by ETID
    Verify {
        etid: String,
        /// SHA-256 of a local copy to compare against the seal
        #[arg(long)]
        hash: Option<String>,
    },
    /// Upload and seal a file
    Ingest {
        file: PathBuf,
        #[arg(long)]
        loan_id: String,
    },
    /// List stored artifacts
    Artifacts {
        #[arg(long)]
        loan_id: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Show aggregate counters
    Analytics,
    /// Run forensic pattern detection
    Patterns,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    }
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Health => client.get(format!("{base}/health")),
        Commands::Verify { etid, hash } => client
            .post(format!("{base}/verify"))
            .json(&json!({ "etid": etid, "hash": hash })),
        Commands::Ingest { file, loan_id } => {
            let bytes = tokio::fs::read(&file).await?;
            let mut request = client
                .post(format!("{base}/ingest-file"))
                .query(&[("loan_id", loan_id.as_str())])
                .body(bytes);
            if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
                request = request.header("x-filename", name);
            }
            request
        }
        Commands::Artifacts { loan_id, limit } => {
            let mut query = vec![("limit", limit.to_string())];
            if let Some(loan_id) = loan_id {
                query.push(("loan_id", loan_id));
            }
            client.get(format!("{base}/artifacts")).query(&query)
        }
        Commands::Analytics => client.get(format!("{base}/analytics/summary")),
        Commands::Patterns => client.get(format!("{base}/forensics/patterns")),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{rendered}");
        Ok(true)
    } else {
        eprintln!("Error: server returned status {status}");
        eprintln!("{rendered}");
        Ok(false)
    }
}
