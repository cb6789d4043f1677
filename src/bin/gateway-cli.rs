use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

use llm_gateway::vault::MasterKey;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the LLM provider gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh base64 master key for the credential vault
    Keygen,
    /// Check gateway system status
    Status,
    /// Inspect the response cache
    Cache,
    /// Store (or replace) a provider API key for an owner
    PutCredential {
        owner: String,
        provider: String,
        api_key: String,
    },
    /// Delete a stored provider API key
    DeleteCredential { owner: String, provider: String },
    /// Send a generation request through the gateway
    Generate {
        provider: String,
        prompt: String,
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "text")]
        format: String,
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    match cli.command {
        Commands::Keygen => {
            println!("{}", MasterKey::generate().to_base64());
        }
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Cache => {
            let res = client
                .get(format!("{}/admin/cache", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::PutCredential {
            owner,
            provider,
            api_key,
        } => {
            let res = client
                .put(format!("{}/admin/credentials/{}/{}", cli.url, owner, provider))
                .headers(headers)
                .json(&json!({ "apiKey": api_key }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::DeleteCredential { owner, provider } => {
            let res = client
                .delete(format!("{}/admin/credentials/{}/{}", cli.url, owner, provider))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Generate {
            provider,
            prompt,
            owner,
            format,
            system,
            model,
        } => {
            let mut payload = json!({ "prompt": prompt });
            if let Some(system) = system {
                payload["system"] = Value::String(system);
            }
            if let Some(model) = model {
                payload["model"] = Value::String(model);
            }
            let body = json!({
                "provider": provider,
                "payload": payload,
                "expectedFormat": format,
                "credentialOwnerId": owner,
            });
            let res = client
                .post(format!("{}/v1/generate", cli.url))
                .json(&body)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
    }
    if text.is_empty() {
        if status.is_success() {
            println!("OK ({})", status);
        }
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
