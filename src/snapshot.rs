// スナップショットファイルから機器の状態を読むクライアント
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::client::{Client, ClientError, DeviceScope};
use crate::myenergi::{Device, DeviceView, Hub, HubView, PowerTotals};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

/// ハブと機器の状態
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct Snapshot {
    pub hub: Hub,
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl FromStr for Snapshot {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

/// スナップショットファイルを情報源とするクライアント
///
/// 読み込んだ状態は watch チャンネルで各ハンドルへ配る。
#[derive(Debug)]
pub struct SnapshotClient {
    path: Option<PathBuf>,
    hub: watch::Sender<Hub>,
    devices: Mutex<Vec<watch::Sender<Device>>>,
}

impl SnapshotClient {
    /// ファイルを持たない(refreshしても変わらない)クライアント
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let (hub, _rx) = watch::channel(snapshot.hub);
        let devices = snapshot
            .devices
            .into_iter()
            .map(|device| watch::channel(device).0)
            .collect();
        Self {
            path: None,
            hub,
            devices: Mutex::new(devices),
        }
    }

    /// スナップショットファイルを開く
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = read_snapshot(&path).await?;
        let mut client = Self::from_snapshot(snapshot);
        client.path = Some(path);
        Ok(client)
    }

    /// 新しい状態を配る
    ///
    /// シリアル番号が同じ機器は既存のハンドルへ、新顔は新しいチャンネルへ流す。
    pub fn publish(&self, snapshot: Snapshot) {
        self.hub.send_replace(snapshot.hub);

        let mut senders = self.lock_devices();
        for device in snapshot.devices {
            match senders
                .iter()
                .position(|tx| tx.borrow().serial_number == device.serial_number)
            {
                Some(index) => {
                    senders[index].send_replace(device);
                }
                None => {
                    tracing::info!(
                        r#"new device "{}" ({}) found"#,
                        device.serial_number,
                        device.kind
                    );
                    senders.push(watch::channel(device).0);
                }
            }
        }
    }

    fn lock_devices(&self) -> MutexGuard<'_, Vec<watch::Sender<Device>>> {
        // 中身は常に整合しているので poison は無視する
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn read_snapshot(path: &Path) -> Result<Snapshot, ClientError> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(Snapshot::from_str(&text)?)
}

impl Client for SnapshotClient {
    fn hub(&self) -> HubView {
        HubView::new(self.hub.subscribe())
    }

    async fn get_devices(
        &self,
        scope: DeviceScope,
        trigger_refresh: bool,
    ) -> Result<Vec<DeviceView>, ClientError> {
        if trigger_refresh {
            self.refresh().await?;
        }
        let devices = self
            .lock_devices()
            .iter()
            .filter(|tx| scope.matches(tx.borrow().kind))
            .map(|tx| DeviceView::new(tx.subscribe()))
            .collect();
        Ok(devices)
    }

    fn get_power_totals(&self) -> PowerTotals {
        let senders = self.lock_devices();
        let devices = senders
            .iter()
            .map(|tx| tx.borrow().clone())
            .collect::<Vec<Device>>();
        PowerTotals::from_devices(devices.iter())
    }

    async fn refresh(&self) -> Result<(), ClientError> {
        match &self.path {
            Some(path) => {
                let snapshot = read_snapshot(path).await?;
                tracing::debug!(
                    "{} reloaded, {} devices",
                    path.display(),
                    snapshot.devices.len()
                );
                self.publish(snapshot);
            }
            None => tracing::trace!("no snapshot file, nothing to refresh"),
        }
        Ok(())
    }
}

#[cfg(test)]
const TEST_SNAPSHOT: &str = r#"
[hub]
serial_number = "21509692"
site_name = "Home"
power_grid = 250
energy_imported = 4200

[[devices]]
serial_number = "16000001"
name = "Zappi"
kind = "zappi"
status = "Charging"

[[devices.ct]]
name = "Internal Load"
power = 7200

[[devices.ct]]
name = "Grid"
power = 250

[[devices]]
serial_number = "20000002"
name = "Eddi"
kind = "eddi"

[[devices.ct]]
name = "Generation"
power = 1800
"#;

#[cfg(test)]
use crate::myenergi::{CtGroup, DeviceKind};
#[cfg(test)]
use rust_decimal::dec;

#[tokio::test]
async fn test_get_devices_by_scope() {
    let client = SnapshotClient::from_snapshot(TEST_SNAPSHOT.parse().unwrap());

    let all = client.get_devices(DeviceScope::All, false).await.unwrap();
    assert_eq!(all.len(), 2);

    let eddis = client
        .get_devices(DeviceScope::Kind(DeviceKind::Eddi), false)
        .await
        .unwrap();
    assert_eq!(eddis.len(), 1);
    assert_eq!(eddis[0].borrow().serial_number, "20000002");
}

#[tokio::test]
async fn test_power_totals() {
    let client = SnapshotClient::from_snapshot(TEST_SNAPSHOT.parse().unwrap());
    let totals = client.get_power_totals();

    assert_eq!(totals.get(CtGroup::Load), Some(dec!(7200)));
    assert_eq!(totals.get(CtGroup::Grid), Some(dec!(250)));
    assert_eq!(totals.get(CtGroup::Generation), Some(dec!(1800)));
    assert_eq!(totals.get(CtGroup::Battery), None);
}

#[tokio::test]
async fn test_publish_reaches_existing_views() {
    let client = SnapshotClient::from_snapshot(TEST_SNAPSHOT.parse().unwrap());
    let hub = client.hub();
    let devices = client.get_devices(DeviceScope::All, false).await.unwrap();

    let mut next: Snapshot = TEST_SNAPSHOT.parse().unwrap();
    next.hub.power_grid = Some(dec!(-900));
    next.devices[0].status = Some("Paused".to_string());
    next.devices.push(Device {
        serial_number: "10088888".to_string(),
        name: "Harvi".to_string(),
        kind: DeviceKind::Harvi,
        ct: vec![],
        status: None,
        plug_status: None,
        energy_total: None,
        energy_diverted: None,
        charge_added: None,
        diverted_session: None,
        history_data: Default::default(),
    });
    client.publish(next);

    assert_eq!(hub.borrow().power_grid, Some(dec!(-900)));
    assert_eq!(devices[0].borrow().status.as_deref(), Some("Paused"));
    // 既存のハンドルは増えないが、改めて取得すれば新しい機器も見える
    assert_eq!(devices.len(), 2);
    let again = client.get_devices(DeviceScope::All, false).await.unwrap();
    assert_eq!(again.len(), 3);
}

#[tokio::test]
async fn test_refresh_rereads_file() {
    let path = std::env::temp_dir().join(format!(
        "myenergi-snapshot-{}.toml",
        std::process::id()
    ));
    tokio::fs::write(&path, TEST_SNAPSHOT).await.unwrap();

    let client = SnapshotClient::open(&path).await.unwrap();
    let hub = client.hub();
    assert_eq!(hub.borrow().power_grid, Some(dec!(250)));

    let changed = TEST_SNAPSHOT.replace("power_grid = 250", "power_grid = 75");
    tokio::fs::write(&path, changed).await.unwrap();

    // リフレッシュしなければ変わらない
    let _ = client.get_devices(DeviceScope::All, false).await.unwrap();
    assert_eq!(hub.borrow().power_grid, Some(dec!(250)));

    let _ = client.get_devices(DeviceScope::All, true).await.unwrap();
    assert_eq!(hub.borrow().power_grid, Some(dec!(75)));

    tokio::fs::remove_file(&path).await.unwrap();
}

#[tokio::test]
async fn test_open_missing_file() {
    let result = SnapshotClient::open("/nonexistent/myenergi-snapshot.toml").await;
    assert!(matches!(result, Err(ClientError::Io(_))));
}
