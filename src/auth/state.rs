//! Authentication state trait and macro.

use super::Authenticator;

/// Trait for state types that can authenticate requests.
pub trait HasAuthBackend {
    fn authenticator(&self) -> &Authenticator;
}

/// Macro to implement `HasAuthBackend` for state structs holding the
/// auth service.
///
/// The struct must have a `service: Arc<AuthService>` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub service: Arc<AuthService>,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn authenticator(&self) -> &$crate::auth::Authenticator {
                self.service.authenticator()
            }
        }
    };
}
