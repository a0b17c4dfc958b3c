use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// String-keyed attributes attached to a single request.
///
/// The metrics layer inserts one into the request extensions; handlers take it
/// with `Extension<RequestAttributes>` and set values such as the error
/// message that ends up in the `errorMessage` label. Clones share the same bag.
#[derive(Clone, Debug, Default)]
pub struct RequestAttributes {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl RequestAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}
