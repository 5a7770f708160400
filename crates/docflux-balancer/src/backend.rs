use docflux_common::protocol::{ConvertError, Result};
use tracing::warn;

/// One conversion backend. Immutable; identified by its index in the
/// pool for the balancer's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub host: String,
    pub port: u16,
}

impl Backend {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn is_valid(&self) -> bool {
        !self.host.is_empty() && self.port != 0
    }
}

/// The fixed, ordered backend set.
///
/// Validated once at construction: malformed entries (empty host or port
/// zero) are dropped with a warning, and a pool with nothing valid left
/// is an [`ConvertError::InvalidConfig`]. The set can be queried but not
/// mutated afterwards, so indices stay stable.
#[derive(Debug, Clone)]
pub struct Pool {
    backends: Vec<Backend>,
}

impl Pool {
    pub fn new(entries: Vec<Backend>) -> Result<Self> {
        let mut backends = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.is_valid() {
                backends.push(entry);
            } else {
                warn!(host = %entry.host, port = entry.port, "dropping malformed backend entry");
            }
        }

        if backends.is_empty() {
            return Err(ConvertError::InvalidConfig(
                "pool contains no valid backend".to_string(),
            ));
        }

        Ok(Self { backends })
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Backend> {
        self.backends.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }
}
