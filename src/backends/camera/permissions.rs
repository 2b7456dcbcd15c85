// SPDX-License-Identifier: GPL-3.0-only

//! Capture permissions
//!
//! Sandboxed (Flatpak) builds must ask the XDG camera portal before opening
//! a camera. Native builds and microphone access are mediated by PipeWire
//! itself, so they are always reported as authorized.

use super::types::{MediaType, PermissionStatus};
use crate::constants::app_info;
use futures::StreamExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

const PORTAL_SERVICE: &str = "org.freedesktop.portal.Desktop";
const PORTAL_PATH: &str = "/org/freedesktop/portal/desktop";
const CAMERA_INTERFACE: &str = "org.freedesktop.portal.Camera";
const REQUEST_INTERFACE: &str = "org.freedesktop.portal.Request";

/// Source of per-medium capture authorization
pub trait PermissionProvider: Send + Sync {
    fn status(&self, media: MediaType) -> PermissionStatus;

    /// Prompt for access; resolves to whether access was granted
    fn request_access(&self, media: MediaType) -> BoxFuture<'_, bool>;
}

/// Turn a status into a yes/no, prompting when it is undetermined
pub async fn resolve_permission(provider: &dyn PermissionProvider, media: MediaType) -> bool {
    let status = provider.status(media);
    debug!(media = %media, status = %status, "Capture permission status");
    match status {
        PermissionStatus::Authorized => true,
        PermissionStatus::NotDetermined => {
            let granted = provider.request_access(media).await;
            info!(media = %media, granted, "Capture permission requested");
            granted
        }
        PermissionStatus::Denied | PermissionStatus::Restricted => false,
    }
}

/// Fixed answers, no prompting
#[derive(Debug, Clone, Copy)]
pub struct StaticPermissions {
    video: PermissionStatus,
    audio: PermissionStatus,
    /// What a prompt for an undetermined medium answers
    grant_on_request: bool,
}

impl StaticPermissions {
    pub fn new(video: PermissionStatus, audio: PermissionStatus) -> Self {
        Self {
            video,
            audio,
            grant_on_request: false,
        }
    }

    pub fn allow_all() -> Self {
        Self::new(PermissionStatus::Authorized, PermissionStatus::Authorized)
    }

    pub fn granting_requests(mut self, grant: bool) -> Self {
        self.grant_on_request = grant;
        self
    }
}

impl PermissionProvider for StaticPermissions {
    fn status(&self, media: MediaType) -> PermissionStatus {
        match media {
            MediaType::Video => self.video,
            MediaType::Audio => self.audio,
        }
    }

    fn request_access(&self, _media: MediaType) -> BoxFuture<'_, bool> {
        let grant = self.grant_on_request;
        Box::pin(async move { grant })
    }
}

/// Permissions backed by the desktop portal
pub struct PortalPermissions {
    sandboxed: bool,
    /// Outcome of the last camera portal request
    camera_decision: Mutex<Option<bool>>,
}

impl PortalPermissions {
    pub fn new() -> Self {
        Self {
            sandboxed: app_info::is_flatpak(),
            camera_decision: Mutex::new(None),
        }
    }
}

impl Default for PortalPermissions {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionProvider for PortalPermissions {
    fn status(&self, media: MediaType) -> PermissionStatus {
        if media == MediaType::Audio || !self.sandboxed {
            return PermissionStatus::Authorized;
        }
        match *self
            .camera_decision
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(true) => PermissionStatus::Authorized,
            Some(false) => PermissionStatus::Denied,
            None => PermissionStatus::NotDetermined,
        }
    }

    fn request_access(&self, media: MediaType) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if media == MediaType::Audio || !self.sandboxed {
                return true;
            }
            let granted = match access_camera().await {
                Ok(granted) => granted,
                Err(e) => {
                    warn!(error = %e, "Camera portal request failed");
                    false
                }
            };
            *self
                .camera_decision
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(granted);
            granted
        })
    }
}

/// Ask the camera portal for access and wait for the user's answer
async fn access_camera() -> Result<bool, String> {
    let connection = zbus::Connection::session()
        .await
        .map_err(|e| format!("Failed to connect to session D-Bus: {}", e))?;

    let camera = zbus::Proxy::new(&connection, PORTAL_SERVICE, PORTAL_PATH, CAMERA_INTERFACE)
        .await
        .map_err(|e| format!("Failed to create camera portal proxy: {}", e))?;

    let present: bool = camera
        .get_property("IsCameraPresent")
        .await
        .map_err(|e| format!("Failed to query camera presence: {}", e))?;
    if !present {
        info!("Camera portal reports no camera");
        return Ok(false);
    }

    // Subscribe to the request object before calling, so the response
    // cannot arrive unobserved
    let token = format!("overlay_recorder_{}", uuid::Uuid::new_v4().simple());
    let sender = connection
        .unique_name()
        .ok_or("D-Bus connection has no unique name")?
        .as_str()
        .trim_start_matches(':')
        .replace('.', "_");
    let request_path = format!("{}/request/{}/{}", PORTAL_PATH, sender, token);

    let request = zbus::Proxy::new(
        &connection,
        PORTAL_SERVICE,
        request_path.as_str(),
        REQUEST_INTERFACE,
    )
    .await
    .map_err(|e| format!("Failed to create portal request proxy: {}", e))?;
    let mut responses = request
        .receive_signal("Response")
        .await
        .map_err(|e| format!("Failed to subscribe to portal response: {}", e))?;

    let mut options: HashMap<&str, Value> = HashMap::new();
    options.insert("handle_token", Value::new(token.as_str()));
    let handle: OwnedObjectPath = camera
        .call("AccessCamera", &(options,))
        .await
        .map_err(|e| format!("AccessCamera failed: {}", e))?;
    debug!(handle = %handle, "Camera access requested");

    let message = responses
        .next()
        .await
        .ok_or("Portal closed the request without answering")?;
    let (response, _results): (u32, HashMap<String, OwnedValue>) = message
        .body()
        .deserialize()
        .map_err(|e| format!("Malformed portal response: {}", e))?;

    // 0 = granted, 1 = cancelled by user, 2 = other
    Ok(response == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn authorized_needs_no_prompt() {
        let provider = StaticPermissions::allow_all();
        assert!(resolve_permission(&provider, MediaType::Video).await);
        assert!(resolve_permission(&provider, MediaType::Audio).await);
    }

    #[tokio::test]
    async fn denied_and_restricted_resolve_false() {
        let provider =
            StaticPermissions::new(PermissionStatus::Denied, PermissionStatus::Restricted)
                .granting_requests(true);
        assert!(!resolve_permission(&provider, MediaType::Video).await);
        assert!(!resolve_permission(&provider, MediaType::Audio).await);
    }

    #[tokio::test]
    async fn undetermined_prompts() {
        let provider = StaticPermissions::new(
            PermissionStatus::NotDetermined,
            PermissionStatus::NotDetermined,
        );
        assert!(!resolve_permission(&provider, MediaType::Video).await);
        let provider = provider.granting_requests(true);
        assert!(resolve_permission(&provider, MediaType::Audio).await);
    }

    #[test]
    fn microphone_is_always_authorized_by_portal() {
        let provider = PortalPermissions::new();
        assert_eq!(
            provider.status(MediaType::Audio),
            PermissionStatus::Authorized
        );
    }
}
