use async_trait::async_trait;

use crate::error::AppError;
use crate::location::PermissionStatus;

/// Platform photo library used for delivery proof.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn request_media_permission(&self) -> PermissionStatus;

    /// `None` when the driver backs out of the picker.
    async fn pick_photo(&self) -> Result<Option<String>, AppError>;
}

/// Photo source for headless runs: always offers the configured reference,
/// or withholds gallery access when none was configured.
pub struct FixedPhoto {
    reference: Option<String>,
}

impl FixedPhoto {
    pub fn new(reference: Option<String>) -> Self {
        Self { reference }
    }
}

#[async_trait]
impl PhotoSource for FixedPhoto {
    async fn request_media_permission(&self) -> PermissionStatus {
        if self.reference.is_some() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    async fn pick_photo(&self) -> Result<Option<String>, AppError> {
        Ok(self.reference.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_photo_withholds_access() {
        let source = FixedPhoto::new(None);
        assert_eq!(source.request_media_permission().await, PermissionStatus::Denied);

        let source = FixedPhoto::new(Some("file:///bukti.jpg".into()));
        assert_eq!(source.request_media_permission().await, PermissionStatus::Granted);
        assert_eq!(
            source.pick_photo().await.unwrap().as_deref(),
            Some("file:///bukti.jpg")
        );
    }
}
