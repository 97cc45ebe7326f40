//! Error types for the lease synchronization system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for leasesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the lease synchronization system
#[derive(Error, Debug)]
pub enum Error {
    /// A lease store could not be read or no lease store was available
    #[error("Lease read error ({path}): {message}")]
    LeaseRead {
        /// Path of the lease store (or a description of the source set)
        path: String,
        /// Underlying cause
        message: String,
    },

    /// Listing the remote registry failed
    #[error("Registry fetch error: {0}")]
    RegistryFetch(String),

    /// A single create/update/delete call failed
    #[error("Registry {operation} failed for '{name}': {message}")]
    RegistryMutation {
        /// Operation that failed (create, update, delete)
        operation: &'static str,
        /// Client name the call was addressed to
        name: String,
        /// Underlying cause
        message: String,
    },

    /// The target name collides with an existing registry entry
    #[error("Client name '{name}' is already in use")]
    NameConflict {
        /// The conflicting name
        name: String,
    },

    /// A new device has no hostname to register it under
    #[error("No hostname available for {mac}")]
    NoHostname {
        /// Canonical MAC of the device
        mac: String,
    },

    /// Neighbor table probe errors
    #[error("Neighbor probe error: {0}")]
    NeighborProbe(String),

    /// Filesystem watcher errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a lease read error
    pub fn lease_read(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LeaseRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a registry fetch error
    pub fn registry_fetch(msg: impl Into<String>) -> Self {
        Self::RegistryFetch(msg.into())
    }

    /// Create a registry mutation error
    pub fn mutation(
        operation: &'static str,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RegistryMutation {
            operation,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a name conflict error
    pub fn name_conflict(name: impl Into<String>) -> Self {
        Self::NameConflict { name: name.into() }
    }

    /// Create a neighbor probe error
    pub fn neighbor_probe(msg: impl Into<String>) -> Self {
        Self::NeighborProbe(msg.into())
    }

    /// Create a watch error
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error is a name collision the engine may retry
    pub fn is_name_conflict(&self) -> bool {
        matches!(self, Self::NameConflict { .. })
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}
