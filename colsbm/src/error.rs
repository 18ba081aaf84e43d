//! Error types for colsbm

use thiserror::Error;

/// colsbm error type
#[derive(Error, Debug)]
pub enum Error {
    /// Model variant string not recognized
    #[error("unknown model variant `{0}`: expected one of iid, pi, delta, deltapi, rho, pirho")]
    UnknownVariant(String),

    /// Network failed validation at the boundary
    #[error("network `{net_id}`: {msg}")]
    InvalidNetwork {
        /// Identifier of the offending network
        net_id: String,
        /// What is wrong with it
        msg: String,
    },

    /// Option or argument out of its domain
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Operation not available on this kind of object
    #[error("cannot {operation} from {found}: expected {expected}")]
    Unsupported {
        /// Requested operation
        operation: &'static str,
        /// What was passed
        found: String,
        /// What the operation accepts
        expected: &'static str,
    },

    /// Parallel backend could not be set up
    #[error("parallel backend: {0}")]
    Backend(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
