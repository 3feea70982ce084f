use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Install the process-wide rustls crypto provider once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Client builder shared by every platform request.
///
/// A zero `request_timeout` leaves requests without a deadline.
pub fn create_client_builder(request_timeout: Duration) -> reqwest::ClientBuilder {
    install_rustls_provider();

    let mut builder = Client::builder()
        .user_agent(DEFAULT_UA)
        .pool_max_idle_per_host(8)
        .connect_timeout(Duration::from_secs(10));

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }
    builder
}

/// Build the default client, falling back to reqwest defaults if the
/// configured builder cannot be constructed.
pub fn default_client(request_timeout: Duration) -> Client {
    create_client_builder(request_timeout)
        .build()
        .unwrap_or_else(|error| {
            warn!(error = %error, "Failed to create HTTP client; falling back to reqwest defaults");
            Client::new()
        })
}
