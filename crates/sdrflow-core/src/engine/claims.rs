//! Exclusive ownership of source devices within one context

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

/// Set of device ids currently attached to an engine
///
/// Cloning yields another handle to the same set.
#[derive(Debug, Clone, Default)]
pub struct SourceClaims {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl SourceClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `device`, failing with `ResourceBusy` if someone else holds it
    pub fn claim(&self, device: &str) -> Result<()> {
        if !self.lock().insert(device.to_string()) {
            return Err(Error::ResourceBusy {
                device: device.to_string(),
            });
        }
        Ok(())
    }

    pub fn release(&self, device: &str) {
        self.lock().remove(device);
    }

    pub fn is_claimed(&self, device: &str) -> bool {
        self.lock().contains(device)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_claim_is_exclusive_until_released() {
        let claims = SourceClaims::new();
        let other = claims.clone();
        claims.claim("hackrf:0").unwrap();
        let err = other.claim("hackrf:0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceBusy);

        claims.release("hackrf:0");
        assert!(!other.is_claimed("hackrf:0"));
        other.claim("hackrf:0").unwrap();
        assert_eq!(claims.len(), 1);
    }
}
