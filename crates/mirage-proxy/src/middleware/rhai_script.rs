use super::{Middleware, RequestResponsePair};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rhai::{Dynamic, Engine, Scope, AST};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Middleware backed by a Rhai script.
///
/// The script sees the pair as the map variable `pair`
/// (`#{request: #{...}, response: #{...}}`). It either returns the new pair
/// or mutates `pair` in place and returns nothing.
///
/// ```rhai
/// pair.response.headers["X-Mirage"] = ["rewritten"];
/// pair.response.body = pair.request.path;
/// ```
#[derive(Clone)]
pub struct RhaiMiddleware {
    ast: Arc<AST>,
    label: String,
}

impl RhaiMiddleware {
    pub fn new(script: &str, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let ast = Engine::new()
            .compile(script)
            .map_err(|e| EngineError::MiddlewareExecutionFailed {
                command: label.clone(),
                stdout: String::new(),
                stderr: e.to_string(),
                message: "failed to compile script".to_string(),
            })?;

        Ok(Self {
            ast: Arc::new(ast),
            label,
        })
    }

    fn failure(&self, stdout: &Mutex<Vec<String>>, stderr: String, message: &str) -> EngineError {
        EngineError::MiddlewareExecutionFailed {
            command: self.label.clone(),
            stdout: stdout.lock().join("\n"),
            stderr,
            message: message.to_string(),
        }
    }

    fn run(&self, pair: &RequestResponsePair) -> Result<RequestResponsePair> {
        let output = Arc::new(Mutex::new(Vec::new()));
        let mut engine = Engine::new();
        let sink = Arc::clone(&output);
        engine.on_print(move |line| sink.lock().push(line.to_string()));

        let input = rhai::serde::to_dynamic(pair)
            .map_err(|e| self.failure(&output, e.to_string(), "failed to convert pair"))?;
        let mut scope = Scope::new();
        scope.push_dynamic("pair", input);

        let result: Dynamic = engine
            .eval_ast_with_scope(&mut scope, self.ast.as_ref())
            .map_err(|e| self.failure(&output, e.to_string(), "script execution error"))?;

        let result = if result.is_unit() {
            scope.get_value::<Dynamic>("pair").unwrap_or_default()
        } else {
            result
        };

        rhai::serde::from_dynamic(&result).map_err(|e| {
            self.failure(
                &output,
                e.to_string(),
                "script must return a request/response pair",
            )
        })
    }
}

#[async_trait]
impl Middleware for RhaiMiddleware {
    fn name(&self) -> &str {
        &self.label
    }

    async fn execute(&self, pair: RequestResponsePair) -> Result<RequestResponsePair> {
        let start = Instant::now();
        let result = self.run(&pair);
        debug!(
            middleware = %self.label,
            ok = result.is_ok(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "middleware executed"
        );
        result
    }
}
