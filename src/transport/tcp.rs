//! TCP socket setup.
//!
//! # Example
//!
//! ```
//! use tcpeventstore::transport::Endpoint;
//!
//! let endpoint = Endpoint::new("localhost", 1113);
//! assert_eq!(endpoint.to_string(), "localhost:1113");
//! ```

use std::fmt;

use tokio::net::TcpStream;

use crate::error::{EventStoreError, Result};

/// Address of the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Open a socket to `endpoint`.
///
/// Frames are small and latency sensitive, so `TCP_NODELAY` is set.
pub async fn connect(endpoint: &Endpoint) -> Result<TcpStream> {
    let connect_error = |source| EventStoreError::Connect {
        endpoint: endpoint.clone(),
        source,
    };

    let stream = TcpStream::connect((endpoint.host(), endpoint.port()))
        .await
        .map_err(connect_error)?;
    stream.set_nodelay(true).map_err(connect_error)?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_sets_nodelay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect(&Endpoint::new("127.0.0.1", port)).await.unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_connect_failure_names_endpoint() {
        // bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect(&Endpoint::new("127.0.0.1", port)).await.unwrap_err();
        assert!(matches!(err, EventStoreError::Connect { .. }));
        assert!(err.to_string().contains(&format!("127.0.0.1:{}", port)));
    }
}
