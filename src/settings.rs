// インテグレーション設定
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::setup::ConfigEntry;
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

fn default_schedule() -> String {
    "0 */1 * * * *".to_string()
}

fn default_time_zone() -> String {
    "Europe/London".to_string()
}

/// インテグレーション設定
#[derive(Serialize, Deserialize, Clone, Debug)]
#[allow(non_snake_case)]
pub struct IntegrationSettings {
    pub EntryId: String,
    pub Title: String,
    /// 機器の状態を書いたスナップショットファイル
    pub Snapshot: PathBuf,
    /// 更新間隔(秒 分 時 日 月 曜日)
    #[serde(default = "default_schedule")]
    pub Schedule: String,
    #[serde(default = "default_time_zone")]
    pub TimeZone: String,
}

impl IntegrationSettings {
    pub fn config_entry(&self) -> ConfigEntry {
        ConfigEntry {
            entry_id: self.EntryId.clone(),
            title: self.Title.clone(),
        }
    }

    pub fn schedule(&self) -> Result<Schedule, cron::error::Error> {
        Schedule::from_str(&self.Schedule)
    }

    pub fn time_zone(&self) -> Result<Tz, String> {
        Tz::from_str(&self.TimeZone).map_err(|e| e.to_string())
    }
}

impl FromStr for IntegrationSettings {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

#[test]
fn test_settings_defaults() {
    let settings = IntegrationSettings::from_str(
        r#"
        EntryId = "01J9MYENERGI"
        Title = "Home"
        Snapshot = "/var/lib/myenergi/snapshot.toml"
        "#,
    )
    .unwrap();

    assert_eq!(
        settings.config_entry(),
        ConfigEntry {
            entry_id: "01J9MYENERGI".to_string(),
            title: "Home".to_string(),
        }
    );
    assert!(settings.schedule().is_ok());
    assert_eq!(settings.time_zone(), Ok(chrono_tz::Europe::London));
}

#[test]
fn test_settings_invalid_values() {
    let settings = IntegrationSettings::from_str(
        r#"
        EntryId = "e1"
        Title = "Home"
        Snapshot = "snapshot.toml"
        Schedule = "every minute"
        TimeZone = "Mars/Olympus"
        "#,
    )
    .unwrap();

    assert!(settings.schedule().is_err());
    assert!(settings.time_zone().is_err());
}
