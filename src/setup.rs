// インテグレーションの登録
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::client::{Client, ClientError};
use crate::sensor::{CatalogError, ProjectionSensor, build_catalog};
use serde::{Deserialize, Serialize};

/// ホーム側の構成エントリー
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct ConfigEntry {
    /// 識別子の接頭辞
    pub entry_id: String,
    pub title: String,
}

/// クライアントを抱えて更新を取りまとめる
#[derive(Debug)]
pub struct Coordinator<C> {
    pub client: C,
}

impl<C: Client> Coordinator<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// 最新の状態を取り込む
    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.client.refresh().await
    }
}

/// センサーを並べてホーム側に登録する
pub async fn async_setup_entry<C, F>(
    coordinator: &Coordinator<C>,
    entry: &ConfigEntry,
    add_entities: F,
) -> Result<(), CatalogError>
where
    C: Client,
    F: FnOnce(Vec<ProjectionSensor>),
{
    let sensors = build_catalog(&coordinator.client, entry).await?;
    tracing::info!(
        r#"entry "{}" ({}): {} sensors"#,
        entry.title,
        entry.entry_id,
        sensors.len()
    );
    add_entities(sensors);
    Ok(())
}

#[cfg(test)]
use crate::entity::SensorEntity;
#[cfg(test)]
use crate::myenergi::Hub;
#[cfg(test)]
use crate::snapshot::{Snapshot, SnapshotClient};

#[tokio::test]
async fn test_async_setup_entry() {
    let coordinator = Coordinator::new(SnapshotClient::from_snapshot(Snapshot {
        hub: Hub {
            serial_number: "21509692".to_string(),
            site_name: "Home".to_string(),
            ..Default::default()
        },
        devices: vec![],
    }));
    let entry = ConfigEntry {
        entry_id: "e1".to_string(),
        title: "myenergi".to_string(),
    };

    let mut added = Vec::new();
    async_setup_entry(&coordinator, &entry, |sensors| added = sensors)
        .await
        .unwrap();
    coordinator.refresh().await.unwrap();

    assert_eq!(added.len(), 9);
    assert_eq!(added[0].unique_id(), "e1-21509692-power_grid");
}
