// スナップショットからセンサーを作って表示してみる。
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use myenergi_sensor::{
    Coordinator, EntitySnapshot, IntegrationSettings, SnapshotClient, async_setup_entry,
};
use std::fs;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// myenergi機器の状態をセンサーとして見る。
#[derive(Parser, Debug)]
#[command(name = "dryrun")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 設定ファイル名
    #[arg(short = 'S', long, default_value = "myenergi.toml")]
    config_file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// センサーの一覧と現在値を表示する
    Catalog(CatalogArgs),
}

#[derive(Debug, Args)]
struct CatalogArgs {
    /// JSONで出力する
    #[arg(long)]
    json: bool,
    /// 表示前にスナップショットファイルを読み直す
    #[arg(long)]
    refresh: bool,
}

async fn exec_catalog(cli: &Cli, args: &CatalogArgs) -> anyhow::Result<()> {
    // 設定ファイルからスナップショットの場所を得る
    let file = fs::read_to_string(&cli.config_file).context("setting file read error.")?;
    let settings = IntegrationSettings::from_str(&file)?;
    let entry = settings.config_entry();

    let client = SnapshotClient::open(&settings.Snapshot)
        .await
        .with_context(|| format!("{} open error.", settings.Snapshot.display()))?;
    let coordinator = Coordinator::new(client);

    let mut sensors = Vec::new();
    async_setup_entry(&coordinator, &entry, |added| sensors = added).await?;

    if args.refresh {
        coordinator.refresh().await?;
    }

    let snapshots = sensors
        .iter()
        .map(EntitySnapshot::capture)
        .collect::<Vec<EntitySnapshot>>();
    if args.json {
        let json = serde_json::to_string_pretty(&snapshots).map_err(|e| anyhow!(e))?;
        println!("{json}");
    } else {
        for snapshot in snapshots.iter() {
            println!("{snapshot}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();

    match &cli.command {
        Commands::Catalog(args) => exec_catalog(&cli, args).await,
    }
}
