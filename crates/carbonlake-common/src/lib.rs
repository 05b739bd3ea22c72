//! CarbonLake Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared domain types, error handling and logging for the CarbonLake
//! emissions calculator.
//!
//! # Overview
//!
//! - **Types**: activity events, emission factor coefficients, the enriched
//!   `emissions_output` attachment and global warming potential tables
//! - **Error Handling**: `CommonError` and the `Result` alias
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//!
//! # Example
//!
//! ```no_run
//! use carbonlake_common::types::{ActivityEvent, GwpStandard, Gas};
//!
//! let line = r#"{"activity_event_id": "evt-1", "scope": 1, "category": "mobile-combustion",
//!     "activity": "Diesel Fuel - Diesel Passenger Cars", "raw_data": 103.45, "units": "gal"}"#;
//! let event: ActivityEvent = serde_json::from_str(line)?;
//! assert_eq!(GwpStandard::Ar5.potentials().get(Gas::Ch4), 28.0);
//! # Ok::<(), serde_json::Error>(())
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
