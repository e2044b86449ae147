//! Dispatch sugar - `page.navigate(..)` style calls
//!
//! Pure name translation, no state. `("page", "capture_screenshot")` goes
//! out as `Page.captureScreenshot`. An action ending in `_nowait` is sent
//! fire-and-forget.

use serde_json::Value;

use super::client::{Correlator, Reply};
use crate::error::{Result, UsageError};

pub const NO_REPLY_SUFFIX: &str = "_nowait";

/// A translated call, ready for `Correlator::send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub wire: String,
    pub wants_response: bool,
}

/// Map `(namespace, action)` to the wire method name.
pub fn translate(namespace: &str, action: &str) -> std::result::Result<MethodCall, UsageError> {
    let (action, wants_response) = match action.strip_suffix(NO_REPLY_SUFFIX) {
        Some(stripped) => (stripped, false),
        None => (action, true),
    };

    let namespace_wire = pascal_case(namespace);
    let action_wire = camel_case(action);
    if namespace_wire.is_empty()
        || action_wire.is_empty()
        || namespace.contains('.')
        || action.contains('.')
    {
        return Err(UsageError::InvalidMethod(format!("{namespace}.{action}")));
    }

    Ok(MethodCall {
        wire: format!("{namespace_wire}.{action_wire}"),
        wants_response,
    })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn pascal_case(name: &str) -> String {
    name.split('_').filter(|w| !w.is_empty()).map(capitalize).collect()
}

/// `capture_screenshot` -> `captureScreenshot`; camelCase input is kept.
fn camel_case(name: &str) -> String {
    let mut words = name.split('_').filter(|w| !w.is_empty());
    let Some(first) = words.next() else {
        return String::new();
    };
    let mut out = first.to_string();
    out.extend(words.map(capitalize));
    out
}

/// A namespace bound to a correlator
pub struct Domain<'a> {
    client: &'a Correlator,
    namespace: String,
}

impl Domain<'_> {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn call(&self, action: &str, params: Option<Value>) -> Result<Reply> {
        let method = translate(&self.namespace, action)?;
        self.client
            .send(method.wire, params, method.wants_response)
            .await
    }
}

impl Correlator {
    /// `client.domain("page").call("navigate", params)`
    pub fn domain(&self, namespace: impl Into<String>) -> Domain<'_> {
        Domain {
            client: self,
            namespace: namespace.into(),
        }
    }
}
