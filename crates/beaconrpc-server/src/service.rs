//! Service and method descriptors.
//!
//! A [`Service`] is an immutable name → method table built once, at
//! registration time, by an explicit [`ServiceBuilder`] call per method.
//! Each [`Method`] wraps the handler as a uniform async callable taking the
//! decoded body value and producing a reply value or a failure message;
//! fresh typed argument and reply holders are constructed inside it per
//! call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use beaconrpc_common::Body;

type BoxedInvoke =
    Arc<dyn Fn(Body) -> BoxFuture<'static, std::result::Result<Body, String>> + Send + Sync>;

/// One exposed method: its name and the uniform invocation entry point.
pub struct Method {
    name: String,
    invoke: BoxedInvoke,
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method").field("name", &self.name).finish()
    }
}

impl Method {
    /// Method name within its service.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the underlying handler with the decoded argument body.
    ///
    /// A decode failure of the argument, a handler failure, or a reply
    /// encode failure all surface as the error message that ends up in the
    /// response header.
    pub fn invoke(&self, args: Body) -> BoxFuture<'static, std::result::Result<Body, String>> {
        (self.invoke)(args)
    }
}

/// An immutable, registered service: a name and its method table.
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<Method>>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Service {
    /// Starts building a service with the given name.
    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks a method up by name.
    pub fn method(&self, name: &str) -> Option<Arc<Method>> {
        self.methods.get(name).cloned()
    }

    /// Sorted method names, for introspection.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Builds a [`Service`] one explicit method registration at a time.
pub struct ServiceBuilder {
    name: String,
    methods: HashMap<String, Arc<Method>>,
}

impl ServiceBuilder {
    /// Registers one method.
    ///
    /// The handler takes a deserializable argument type and returns a
    /// serializable reply or a failure message. Argument decoding, the
    /// invocation, and reply encoding are captured here into the uniform
    /// callable stored in the descriptor table.
    pub fn method<Args, Reply, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        Args: DeserializeOwned + Send + 'static,
        Reply: Serialize + Send + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Reply, String>> + Send + 'static,
    {
        let name = name.into();
        let invoke: BoxedInvoke = Arc::new(move |raw: Body| {
            // fresh argument holder per call
            match serde_json::from_value::<Args>(raw) {
                Ok(args) => {
                    let fut = handler(args);
                    Box::pin(async move {
                        let reply = fut.await?;
                        serde_json::to_value(reply).map_err(|e| format!("encode reply: {}", e))
                    }) as BoxFuture<'static, _>
                }
                Err(e) => {
                    let message = format!("decode arguments: {}", e);
                    Box::pin(async move { Err(message) }) as BoxFuture<'static, _>
                }
            }
        });
        self.methods.insert(
            name.clone(),
            Arc::new(Method { name, invoke }),
        );
        self
    }

    /// Finalizes the descriptor table.
    pub fn build(self) -> Service {
        Service {
            name: self.name,
            methods: self.methods,
        }
    }
}

/// Splits a "Service.Method" target on its last separator.
pub(crate) fn split_service_method(service_method: &str) -> Option<(&str, &str)> {
    service_method.rsplit_once('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    fn arith() -> Service {
        Service::builder("Arith")
            .method("Add", |args: AddArgs| async move { Ok(args.a + args.b) })
            .method("Fail", |_args: AddArgs| async move {
                Err::<i64, _>("arithmetic failure".to_string())
            })
            .build()
    }

    #[tokio::test]
    async fn test_invoke_decodes_and_encodes() {
        let service = arith();
        let method = service.method("Add").unwrap();
        let reply = method.invoke(json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(reply, json!(5));
    }

    #[tokio::test]
    async fn test_invoke_surfaces_handler_failure() {
        let service = arith();
        let method = service.method("Fail").unwrap();
        let err = method.invoke(json!({"a": 0, "b": 0})).await.unwrap_err();
        assert_eq!(err, "arithmetic failure");
    }

    #[tokio::test]
    async fn test_invoke_rejects_malformed_arguments() {
        let service = arith();
        let method = service.method("Add").unwrap();
        let err = method.invoke(json!("not an object")).await.unwrap_err();
        assert!(err.contains("decode arguments"));
    }

    #[test]
    fn test_method_lookup() {
        let service = arith();
        assert!(service.method("Add").is_some());
        assert!(service.method("Sub").is_none());
        assert_eq!(service.method_names(), vec!["Add", "Fail"]);
    }

    #[test]
    fn test_split_service_method() {
        assert_eq!(split_service_method("Arith.Add"), Some(("Arith", "Add")));
        assert_eq!(
            split_service_method("a.b.Method"),
            Some(("a.b", "Method"))
        );
        assert_eq!(split_service_method("no-separator"), None);
    }
}
