// myenergi クライアント(機器の状態を提供する外部コンポーネント)との境界
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::myenergi::{DeviceKind, DeviceView, HubView, PowerTotals};
use std::future::Future;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(r#"i/o "{0}""#)]
    Io(#[from] io::Error),

    #[error(r#"snapshot "{0}""#)]
    Snapshot(#[from] toml::de::Error),
}

/// 取得する機器の範囲
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub enum DeviceScope {
    #[default]
    All,
    Kind(DeviceKind),
}

impl DeviceScope {
    pub fn matches(&self, kind: DeviceKind) -> bool {
        match self {
            Self::All => true,
            Self::Kind(k) => *k == kind,
        }
    }
}

/// 機器の状態を提供するクライアント
///
/// 通信や再試行はクライアントの責務で、こちらは読むだけ。
pub trait Client: Send + Sync {
    /// ハブの集計値
    fn hub(&self) -> HubView;

    /// 機器一覧を得る
    ///
    /// `trigger_refresh` が偽なら手元の状態をそのまま返す。
    fn get_devices(
        &self,
        scope: DeviceScope,
        trigger_refresh: bool,
    ) -> impl Future<Output = Result<Vec<DeviceView>, ClientError>> + Send;

    /// 計測対象ごとの電力合計
    fn get_power_totals(&self) -> PowerTotals;

    /// 最新の状態を取り込む
    fn refresh(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

#[test]
fn test_device_scope() {
    assert!(DeviceScope::All.matches(DeviceKind::Harvi));
    assert!(DeviceScope::Kind(DeviceKind::Zappi).matches(DeviceKind::Zappi));
    assert!(!DeviceScope::Kind(DeviceKind::Zappi).matches(DeviceKind::Eddi));
}
