use anyhow::Context;
use clap::{Parser, Subcommand};
use parcel_store::Value;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, env = "PARCEL_DATA_DIR", default_value = "data")]
    data_dir: String,

    /// Hex-encoded 32-byte key; entries are stored unencrypted without it.
    #[arg(short, long, env = "PARCEL_MASTER_KEY", hide_env_values = true)]
    master_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Stores a JSON value; anything that does not parse is stored as a string.
    /// Arrays and objects must hold values of a single type.
    Put { key: String, value: String },
    Get { key: String },
    Del { key: String },
    Has { key: String },
    Count,
    /// Deletes every entry.
    Wipe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let master_key = cli
        .master_key
        .as_deref()
        .map(hex::decode)
        .transpose()
        .context("master key must be hex")?;
    let store = parcel_store::open(&cli.data_dir, master_key.as_deref())?;

    match cli.command {
        Commands::Put { key, value } => {
            let json = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            store.try_put(&key, &Value::infer(json)?).await?;
            println!("OK");
        }
        Commands::Get { key } => match store.try_get::<Value>(&key).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value.to_json()?)?),
            None => anyhow::bail!("key '{}' not found", key),
        },
        Commands::Del { key } => {
            if !store.delete(&key).await {
                anyhow::bail!("key '{}' not found", key);
            }
            println!("OK");
        }
        Commands::Has { key } => println!("{}", store.contains(&key).await),
        Commands::Count => println!("{}", store.count().await),
        Commands::Wipe => {
            if !store.delete_all().await {
                anyhow::bail!("wipe failed");
            }
            println!("OK");
        }
    }

    Ok(())
}
