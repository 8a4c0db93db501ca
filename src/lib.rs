//! # smsgate
//!
//! Sends SMS through the REST API of Teltonika routers (TRB245 and
//! relatives), either from the command line or through a small HTTP
//! gateway that monitoring systems such as PRTG can call.
//!
//! ## Features
//!
//! - **Message splitting**: long texts become numbered `i/N: ` parts that
//!   each fit one SMS, cut at whitespace or punctuation where possible
//! - **Token cache**: the router login is reused between runs
//! - **Modem discovery**: the primary modem is picked automatically
//! - **HTTP gateway**: `GET /?username&password&number&text` on axum
//! - **Layered configuration**: defaults, `config.yaml`, environment, CLI
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use smsgate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(&Overrides::default())?;
//!     let mut client = RouterClient::new(&config.router.settings()?)?;
//!
//!     let report = client
//!         .send_sms(SendRequest::new("+491701234567", "Disk almost full"))
//!         .await?;
//!     println!("{} SMS used", report.sms_used);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;

pub use config::*;

/// Common imports for smsgate usage
pub mod prelude {
    pub use crate::config::{
        AppConfig, LoggingConfig, MessageConfig, Overrides, RouterConfig, ServerConfig,
    };
    pub use crate::logging::init_logging;
    pub use sms_core::*;
    pub use sms_teltonika::{RouterClient, RouterSettings, TeltonikaConnector};
    pub use sms_web_axum::{router, AppState};
    pub use sms_web_generic::GatewayProcessor;
}
