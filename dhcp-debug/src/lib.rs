//! Diagnostic client for a single DHCP lease exchange.
//!
//! One session binds a UDP endpoint to an interface, runs the DHCPv4
//! (DISCOVER/OFFER, REQUEST/ACK) or DHCPv6 (SOLICIT/ADVERTISE, REQUEST/REPLY
//! or rapid commit) exchange under a session deadline, closes the endpoint and
//! reports its outcome exactly once.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use dhcp_debug::{SessionConfig, cancel, session};
//!
//! let config = SessionConfig::v4("eth0", "", 0, "", 67, 30_000, false, false)?;
//! let orchestrator = session::construct(&config)?;
//! let (_handle, token) = cancel::token();
//! let report = orchestrator.start(token, config.release).wait().await;
//! println!("success: {}", report.outcome.is_success());
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod completion;
pub mod config;
pub mod deadline;
pub mod error;
pub mod net;
pub mod outcome;
pub mod session;

pub use config::{ProtocolConfig, SessionConfig};
pub use deadline::Deadline;
pub use error::{ConstructionError, NetworkError, SessionError};
pub use outcome::{ExchangeResult, SessionOutcome, SessionReport};
pub use session::{Orchestrator, Phase, Session};
