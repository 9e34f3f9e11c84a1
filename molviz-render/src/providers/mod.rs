//! Render backend implementations

pub mod remote;

pub use remote::RemoteRenderer;

use molviz_core::{MolvizError, RenderError};

pub(crate) fn request_failed(backend: &str, status: u16, message: impl Into<String>) -> MolvizError {
    MolvizError::Render(RenderError::RequestFailed {
        backend: backend.to_string(),
        status,
        message: message.into(),
    })
}

pub(crate) fn backend_failed(backend: &str, message: impl Into<String>) -> MolvizError {
    MolvizError::Render(RenderError::BackendFailed {
        backend: backend.to_string(),
        message: message.into(),
    })
}
