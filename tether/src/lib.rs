//! Controller and agent endpoints for the tether profiler protocol.
//!
//! [`Client`] drives a profiling session from the controller side;
//! [`serve`] runs the request loop inside the profiled process.
//!
//! ```no_run
//! use tether::{Client, WireConfig};
//!
//! let mut client = Client::connect("127.0.0.1:5140", WireConfig::default())?;
//! client.check_connection()?;
//! let vm = client.vm_properties()?;
//! println!("target runs JDK {}", vm.jdk_version);
//! # Ok::<(), tether::Error>(())
//! ```

mod agent;
mod client;
mod error;

use std::path::Path;

pub use agent::{Responder, serve};
pub use client::Client;
pub use error::{Error, Result};
pub use tether_proto::{self as proto, IntegrityPolicy, WireConfig};

/// Loads a [`WireConfig`] from a JSON file.
pub fn load_config(path: &Path) -> Result<WireConfig> {
    WireConfig::load(path).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}
