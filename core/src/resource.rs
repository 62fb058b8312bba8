//! The four-state result carried from an operation to its observers.
//!
//! A screen renders exactly one of idle, loading, content or error by matching
//! on the current `Resource`; there are no side flags to keep in sync.

use crate::error::ApiError;

/// Outcome of an asynchronous operation at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource<T> {
    /// Nothing has been started yet.
    Idle,
    /// A request is in flight; may hold the previous payload while refreshing.
    Loading(Option<T>),
    /// The operation completed with a payload.
    Success(T),
    /// The operation failed; may keep the payload that was shown before.
    Error { message: String, data: Option<T> },
}

impl<T> Resource<T> {
    pub fn idle() -> Self {
        Resource::Idle
    }

    pub fn loading() -> Self {
        Resource::Loading(None)
    }

    /// Loading that keeps `previous` visible, for pull-to-refresh screens.
    pub fn refreshing(previous: Option<T>) -> Self {
        Resource::Loading(previous)
    }

    pub fn success(data: T) -> Self {
        Resource::Success(data)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Resource::Error {
            message: message.into(),
            data: None,
        }
    }

    pub fn error_with(message: impl Into<String>, data: Option<T>) -> Self {
        Resource::Error {
            message: message.into(),
            data,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Resource::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Resource::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Resource::Error { .. })
    }

    /// `Success` and `Error` end an invocation.
    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.is_error()
    }

    /// The payload, fresh or stale.
    pub fn data(&self) -> Option<&T> {
        match self {
            Resource::Idle => None,
            Resource::Loading(data) | Resource::Error { data, .. } => data.as_ref(),
            Resource::Success(data) => Some(data),
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Resource::Idle => None,
            Resource::Loading(data) | Resource::Error { data, .. } => data,
            Resource::Success(data) => Some(data),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Resource::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> Resource<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Resource::Idle => Resource::Idle,
            Resource::Loading(data) => Resource::Loading(data.map(f)),
            Resource::Success(data) => Resource::Success(f(data)),
            Resource::Error { message, data } => Resource::Error {
                message,
                data: data.map(f),
            },
        }
    }
}

impl<T> Default for Resource<T> {
    fn default() -> Self {
        Resource::Idle
    }
}

impl<T> From<Result<T, ApiError>> for Resource<T> {
    fn from(outcome: Result<T, ApiError>) -> Self {
        match outcome {
            Ok(data) => Resource::Success(data),
            Err(err) => Resource::error(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        let resource: Resource<u8> = Resource::default();
        assert!(resource.is_idle());
        assert!(!resource.is_terminal());
        assert!(resource.data().is_none());
    }

    #[test]
    fn refreshing_keeps_stale_payload() {
        let resource = Resource::refreshing(Some(vec![1, 2]));
        assert!(resource.is_loading());
        assert_eq!(resource.data(), Some(&vec![1, 2]));
    }

    #[test]
    fn error_exposes_message_and_stale_data() {
        let resource = Resource::error_with("offline", Some(3));
        assert!(resource.is_terminal());
        assert_eq!(resource.message(), Some("offline"));
        assert_eq!(resource.into_data(), Some(3));
    }

    #[test]
    fn map_preserves_variant() {
        let loading: Resource<u32> = Resource::refreshing(Some(2));
        assert_eq!(loading.map(|n| n * 10), Resource::Loading(Some(20)));

        let failed: Resource<u32> = Resource::error("boom");
        assert_eq!(failed.map(|n| n.to_string()), Resource::error("boom"));
    }

    #[test]
    fn from_result_uses_error_display() {
        let ok: Resource<&str> = Ok::<_, ApiError>("done").into();
        assert_eq!(ok, Resource::Success("done"));

        let err: Resource<&str> = Err(ApiError::Rejected("X".to_string())).into();
        assert_eq!(err, Resource::error("X"));
    }
}
