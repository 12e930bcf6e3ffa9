use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "logs-cli")]
#[command(about = "Query the traces-and-logs log viewer", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(long, default_value = "log-ui")]
    prefix: String,

    #[arg(long, default_value = "admin")]
    user: String,

    #[arg(long, env = "LOG_UI_PASSWORD")]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List log rows, newest first
    Logs {
        /// Minimum level (verbose, debug, information, warning, error, fatal)
        #[arg(long)]
        level: Option<String>,
        /// Substring of the message
        #[arg(long)]
        search: Option<String>,
        /// Exact correlation id
        #[arg(long)]
        correlation_id: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// List the stored column names
    Keys,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = format!("{}/{}/api", cli.url.trim_end_matches('/'), cli.prefix.trim_matches('/'));

    let request = match cli.command {
        Commands::Logs {
            level,
            search,
            correlation_id,
            page,
            count,
        } => {
            let mut query: Vec<(&str, String)> = vec![("page", page.to_string()), ("count", count.to_string())];
            if let Some(level) = level {
                query.push(("level", level));
            }
            if let Some(search) = search {
                query.push(("search", search));
            }
            if let Some(id) = correlation_id {
                query.push(("correlation_id", id));
            }
            client.get(format!("{}/logs", base)).query(&query)
        }
        Commands::Keys => client.get(format!("{}/keys", base)),
    };

    let res = request
        .basic_auth(&cli.user, Some(&cli.password))
        .send()
        .await?;
    print_response(res).await?;

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: log viewer returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
