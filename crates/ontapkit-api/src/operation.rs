// REST operation value object.
//
// Constructed per call and handed to `RestClient::execute`. Paths are
// relative to the client's `/api/` base (e.g. `"storage/volumes"`).

use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// HTTP method subset used by the management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// A single REST call: method, relative path, query parameters, JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Operation {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Append one query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append several query parameters, preserving order.
    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attach an already-built JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` and attach it.
    pub fn with_json(self, body: &impl Serialize) -> Result<Self, Error> {
        let value = serde_json::to_value(body).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(self.with_body(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builder_preserves_query_order() {
        let op = Operation::get("storage/volumes")
            .with_query("name", "vol1")
            .with_params([("svm.name", "svm1"), ("fields", "*")]);

        assert_eq!(op.method, Method::Get);
        assert_eq!(
            op.query,
            vec![
                ("name".to_owned(), "vol1".to_owned()),
                ("svm.name".to_owned(), "svm1".to_owned()),
                ("fields".to_owned(), "*".to_owned()),
            ]
        );
        assert!(op.body.is_none());
    }

    #[test]
    fn with_json_encodes_body() {
        #[derive(Serialize)]
        struct Body {
            name: &'static str,
        }

        let op = Operation::post("svm/svms").with_json(&Body { name: "x" }).unwrap();
        assert_eq!(op.body, Some(json!({"name": "x"})));
    }

    #[test]
    fn method_display_is_uppercase() {
        assert_eq!(Method::Patch.to_string(), "PATCH");
        assert_eq!(reqwest::Method::from(Method::Delete), reqwest::Method::DELETE);
    }
}
