//! Shared application state injected into every handler.

use std::sync::Arc;

use qzwhatnext_foundation::calendar::GoogleOAuth;
use qzwhatnext_foundation::inference::SharedClassifier;
use qzwhatnext_foundation::persistence::SharedStore;
use qzwhatnext_foundation::security::{JwtConfig, TokenCipher};
use qzwhatnext_kernel::clock::SharedClock;
use qzwhatnext_runtime::UserLocks;

use crate::config::AppConfig;

pub struct AppState {
    pub config: AppConfig,
    pub store: SharedStore,
    pub clock: SharedClock,
    pub jwt: JwtConfig,
    pub cipher: TokenCipher,
    pub oauth: GoogleOAuth,
    pub locks: UserLocks,
    pub classifier: SharedClassifier,
}

pub type SharedState = Arc<AppState>;
