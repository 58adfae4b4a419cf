// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runtime permission service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Runtime permissions a scan may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    AccessFineLocation,
    BluetoothScan,
    BluetoothConnect,
}

/// Answer to a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    NeverAskAgain,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Platform the screen runs on, as far as permissions are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuntimePlatform {
    Android { api_level: u32 },
    Ios,
    Desktop,
}

impl RuntimePlatform {
    /// Location permission is needed for BLE scans from Android 6 on.
    pub fn needs_location_permission(&self) -> bool {
        matches!(self, Self::Android { api_level } if *api_level >= 23)
    }

    /// Separate scan/connect permissions exist from Android 12 on.
    pub fn needs_bluetooth_permissions(&self) -> bool {
        matches!(self, Self::Android { api_level } if *api_level >= 31)
    }
}

/// Platform permission service.
#[async_trait]
pub trait PermissionService: Send + Sync {
    fn platform(&self) -> RuntimePlatform;

    async fn request(&self, permission: Permission) -> PermissionStatus;

    async fn request_multiple(
        &self,
        permissions: &[Permission],
    ) -> HashMap<Permission, PermissionStatus>;
}

/// Permission service answering from a fixed deny list.
#[derive(Debug, Clone)]
pub struct StaticPermissions {
    platform: RuntimePlatform,
    denied: HashSet<Permission>,
}

impl StaticPermissions {
    pub fn new(platform: RuntimePlatform, denied: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            platform,
            denied: denied.into_iter().collect(),
        }
    }

    /// Everything granted.
    pub fn granting(platform: RuntimePlatform) -> Self {
        Self::new(platform, [])
    }

    fn status(&self, permission: Permission) -> PermissionStatus {
        if self.denied.contains(&permission) {
            PermissionStatus::Denied
        } else {
            PermissionStatus::Granted
        }
    }
}

#[async_trait]
impl PermissionService for StaticPermissions {
    fn platform(&self) -> RuntimePlatform {
        self.platform
    }

    async fn request(&self, permission: Permission) -> PermissionStatus {
        let status = self.status(permission);
        debug!("Permission {:?}: {:?}", permission, status);
        status
    }

    async fn request_multiple(
        &self,
        permissions: &[Permission],
    ) -> HashMap<Permission, PermissionStatus> {
        permissions.iter().map(|&p| (p, self.status(p))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_android_thresholds() {
        let old = RuntimePlatform::Android { api_level: 22 };
        let marshmallow = RuntimePlatform::Android { api_level: 23 };
        let s = RuntimePlatform::Android { api_level: 31 };

        assert!(!old.needs_location_permission());
        assert!(marshmallow.needs_location_permission());
        assert!(!marshmallow.needs_bluetooth_permissions());
        assert!(s.needs_bluetooth_permissions());
        assert!(!RuntimePlatform::Desktop.needs_location_permission());
    }

    #[tokio::test]
    async fn test_static_permissions() {
        let service = StaticPermissions::new(
            RuntimePlatform::Android { api_level: 33 },
            [Permission::BluetoothScan],
        );

        assert!(service.request(Permission::AccessFineLocation).await.is_granted());
        let results = service
            .request_multiple(&[Permission::BluetoothScan, Permission::BluetoothConnect])
            .await;
        assert_eq!(results[&Permission::BluetoothScan], PermissionStatus::Denied);
        assert_eq!(results[&Permission::BluetoothConnect], PermissionStatus::Granted);
    }

    #[test]
    fn test_platform_config_shape() {
        let platform: RuntimePlatform =
            toml::from_str("kind = \"android\"\napi_level = 31").unwrap();
        assert_eq!(platform, RuntimePlatform::Android { api_level: 31 });
    }
}
