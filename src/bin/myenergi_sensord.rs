// 定期的に機器の状態を取り込んでセンサーの変化を記録する。
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use chrono::Utc;
use clap::Parser;
use myenergi_sensor::sensor::{CatalogError, ProjectionSensor};
use myenergi_sensor::{
    ClientError, Coordinator, IntegrationSettings, SensorEntity, SensorState, SnapshotClient,
    async_setup_entry,
};
use std::collections::BTreeMap;
use std::io;
use std::process::ExitCode;
use std::result;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Debug, Error)]
pub enum SensorDaemonError {
    #[error(r#"i/o "{0}""#)]
    Io(#[from] io::Error),

    #[error(r#"settings "{0}""#)]
    Settings(#[from] toml::de::Error),

    #[error(r#"cron "{0}""#)]
    Cron(#[from] cron::error::Error),

    #[error(r#"invalid time zone "{0}""#)]
    InvalidTimeZone(String),

    #[error(r#"client "{0}""#)]
    Client(#[from] ClientError),

    #[error(r#"catalog "{0}""#)]
    Catalog(CatalogError),
}

impl From<CatalogError> for SensorDaemonError {
    fn from(err: CatalogError) -> SensorDaemonError {
        match err {
            CatalogError::Client(e) => SensorDaemonError::Client(e),
            e => SensorDaemonError::Catalog(e),
        }
    }
}

/// myenergi機器の状態を定期的に取り込む。
#[derive(Parser, Debug)]
#[command(name = "myenergi_sensord")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 設定ファイル名
    #[arg(short = 'S', long, env = "MYENERGI_SETTINGS", default_value = "myenergi.toml")]
    config_file: String,
}

/// 前回から値が変わったセンサーを記録する
fn log_state_changes(sensors: &[ProjectionSensor], last_states: &mut BTreeMap<String, SensorState>) {
    for sensor in sensors {
        let state = sensor.state();
        let unique_id = sensor.unique_id();
        let last = last_states.insert(unique_id.clone(), state.clone());
        if last.as_ref() != Some(&state) {
            tracing::info!(
                r#"{} "{}" {} -> {}"#,
                unique_id,
                sensor.name(),
                last.map(|s| s.to_string()).unwrap_or_default(),
                state
            );
        }
    }
}

/// スケジュールに従って状態を取り込む
///
/// Ctrl-Cで止まったときだけ Ok を返す。
#[tracing::instrument(skip_all)]
async fn exec_sensor_service(config_file: &str) -> result::Result<(), SensorDaemonError> {
    let file = tokio::fs::read_to_string(config_file).await?;
    let settings = IntegrationSettings::from_str(&file)?;
    let schedule = settings.schedule()?;
    let tz = settings
        .time_zone()
        .map_err(SensorDaemonError::InvalidTimeZone)?;
    let entry = settings.config_entry();

    let coordinator = Coordinator::new(SnapshotClient::open(&settings.Snapshot).await?);
    let mut sensors = Vec::new();
    async_setup_entry(&coordinator, &entry, |added| sensors = added).await?;

    let mut last_states = BTreeMap::new();
    log_state_changes(&sensors, &mut last_states);

    for next in schedule.upcoming(tz) {
        // 次回実行予定時刻まで待つ
        let duration = (next.to_utc() - Utc::now()).to_std().unwrap_or_default();
        tracing::trace!("Next scheduled time. ({}), sleep ({:?})", next, duration);
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
        }
        coordinator.refresh().await?;
        log_state_changes(&sensors, &mut last_states);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // プログラムの情報
    let git_head_ref = built_info::GIT_HEAD_REF.unwrap_or_default();
    let app_info = format!(
        "{} / {}{}",
        built_info::PKG_NAME,
        built_info::PKG_VERSION,
        built_info::GIT_COMMIT_HASH_SHORT
            .map(|s| format!(" ({s} - {git_head_ref})"))
            .unwrap_or_default()
    );

    let cli = Cli::parse();

    // tracingの設定
    let registry = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    // systemd-journaldに接続
    match tracing_journald::layer() {
        // journaldにログ出力する
        Ok(journald_layer) => registry.with(journald_layer).init(),
        // journaldが使えないので、標準出力にログ出力する
        Err(e) => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339())
                        .with_file(false)
                        .with_line_number(false)
                        .with_thread_names(false)
                        .with_thread_ids(false)
                        .with_ansi(false),
                )
                .init();
            tracing::error!("couldn't connect to journald: {}", e)
        }
    }

    // サービスを開始する
    tracing::info!("{app_info} started.");
    let reason = loop {
        break match exec_sensor_service(&cli.config_file).await {
            Ok(()) => {
                tracing::info!("{app_info} stopped.");
                return ExitCode::SUCCESS;
            }
            Err(e @ SensorDaemonError::Client(_)) => {
                tracing::warn!("{e}");
                tokio::time::sleep(Duration::from_secs(5)).await; // 再始動まで少々クールダウン時間をもつ
                continue; // 再始動
            }
            Err(e @ SensorDaemonError::Io(_)) => e.to_string(),
            Err(e @ SensorDaemonError::Settings(_)) => e.to_string(),
            Err(e @ SensorDaemonError::Cron(_)) => e.to_string(),
            Err(e @ SensorDaemonError::InvalidTimeZone(_)) => e.to_string(),
            Err(e @ SensorDaemonError::Catalog(_)) => e.to_string(),
        };
    };

    // ここに到達するのは異常終了しかありえない
    tracing::error!("{app_info} aborted, reason: {reason}");
    ExitCode::FAILURE
}

#[cfg(test)]
use myenergi_sensor::myenergi::Hub;
#[cfg(test)]
use myenergi_sensor::{ConfigEntry, Snapshot};
#[cfg(test)]
use rust_decimal::dec;

#[tokio::test]
async fn test_log_state_changes_records_latest() {
    let client = SnapshotClient::from_snapshot(Snapshot {
        hub: Hub {
            serial_number: "21509692".to_string(),
            site_name: "Home".to_string(),
            power_grid: Some(dec!(100)),
            ..Default::default()
        },
        devices: vec![],
    });
    let coordinator = Coordinator::new(client);
    let entry = ConfigEntry {
        entry_id: "e1".to_string(),
        title: "myenergi".to_string(),
    };
    let mut sensors = Vec::new();
    async_setup_entry(&coordinator, &entry, |added| sensors = added)
        .await
        .unwrap();

    let mut last_states = BTreeMap::new();
    log_state_changes(&sensors, &mut last_states);
    assert_eq!(
        last_states.get("e1-21509692-power_grid"),
        Some(&SensorState::Number(dec!(100)))
    );
    assert_eq!(
        last_states.get("e1-21509692-energy_green"),
        Some(&SensorState::Unknown)
    );

    coordinator.client.publish(Snapshot {
        hub: Hub {
            serial_number: "21509692".to_string(),
            site_name: "Home".to_string(),
            power_grid: Some(dec!(-40)),
            ..Default::default()
        },
        devices: vec![],
    });
    log_state_changes(&sensors, &mut last_states);
    assert_eq!(
        last_states.get("e1-21509692-power_grid"),
        Some(&SensorState::Number(dec!(-40)))
    );
    assert_eq!(last_states.len(), 9);
}
