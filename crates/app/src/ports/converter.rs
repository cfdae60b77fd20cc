//! Converter port and the registry converters are resolved from.
//!
//! Decoding raw bytes into typed points is the converter's job; the engine
//! only resolves one converter per source when a device is set up and
//! carries it inside every envelope it dispatches.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use blegate_domain::converted::ConvertedData;

use crate::envelope::AcquisitionEnvelope;

/// Turns an envelope into structured telemetry and attributes.
pub trait Converter: Send + Sync {
    fn convert(&self, envelope: &AcquisitionEnvelope) -> ConvertedData;
}

/// Converters by name.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl ConverterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `converter` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, converter: Arc<dyn Converter>) {
        self.converters.insert(name.into(), converter);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, converter: Arc<dyn Converter>) -> Self {
        self.register(name, converter);
        self
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Converter>> {
        self.converters.get(name).cloned()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.converters.keys().collect();
        names.sort();
        f.debug_struct("ConverterRegistry")
            .field("converters", &names)
            .finish()
    }
}
