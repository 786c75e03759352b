use crate::error::LineError;
use crate::line::{Acceptor, Line, LineFactory};

/// Ordered registry of transport backends.
///
/// Dispatch is first-match in registration order, so a factory registered
/// earlier shadows later ones claiming the same scheme. Registration must
/// complete before the manager is shared between threads; dispatch itself
/// only reads.
#[derive(Default)]
pub struct LineManager {
    factories: Vec<Box<dyn LineFactory>>,
}

impl LineManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_factory(&mut self, factory: Box<dyn LineFactory>) {
        self.factories.push(factory);
    }

    /// Connects to `uri` and returns the client side of the line.
    pub fn create_client(&self, uri: &str) -> Result<Box<dyn Line>, LineError> {
        let (factory, address) = self.resolve(uri)?;
        factory.create_client(address)
    }

    /// Binds an acceptor for `uri`.
    pub fn create_server(&self, uri: &str) -> Result<Box<dyn Acceptor>, LineError> {
        let (factory, address) = self.resolve(uri)?;
        factory.create_server(address)
    }

    fn resolve<'a, 'u>(&'a self, uri: &'u str) -> Result<(&'a dyn LineFactory, &'u str), LineError> {
        let (scheme, address) = split_uri(uri)?;
        self.factories
            .iter()
            .find(|factory| factory.supports_scheme(scheme))
            .map(|factory| (factory.as_ref(), address))
            .ok_or_else(|| LineError::NoFactory(scheme.to_string()))
    }
}

/// Splits at the first `"://"`; the prefix is the scheme, the remainder is
/// the backend-specific address.
fn split_uri(uri: &str) -> Result<(&str, &str), LineError> {
    let delimiter = uri.find("://").ok_or_else(|| LineError::InvalidUri(uri.to_string()))?;
    Ok((&uri[..delimiter], &uri[delimiter + 3..]))
}
