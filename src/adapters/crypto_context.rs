//! Scoped crypto library handle.
//!
//! One context is acquired per run. It owns the trust store and shuts it
//! down exactly once, either through [`CryptoContext::shutdown`] or when the
//! context is dropped on an early-return path.

use std::path::Path;

use crate::adapters::trust::{OpenSslTrustStore, TrustStore};
use crate::infra::error::P7vResult;

pub struct CryptoContext<S: TrustStore> {
    store: S,
    shut_down: bool,
}

impl CryptoContext<OpenSslTrustStore> {
    /// Initialize OpenSSL and open the trust store.
    pub fn init(trust_store_dir: Option<&Path>) -> P7vResult<Self> {
        openssl::init();
        log::trace!("openssl {} initialized", openssl::version::version());
        let store = OpenSslTrustStore::open(trust_store_dir)?;
        Ok(Self::with_store(store))
    }
}

impl<S: TrustStore> CryptoContext<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            shut_down: false,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Shut the crypto layer down. Consuming `self` rules out a second call.
    pub fn shutdown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.shut_down {
            self.shut_down = true;
            self.store.shutdown();
            log::trace!("crypto context shut down");
        }
    }
}

impl<S: TrustStore> Drop for CryptoContext<S> {
    fn drop(&mut self) {
        self.release();
    }
}
