// Scenario request handlers
//
// Maps JSON-RPC methods onto the breakpoint dispatcher and in-memory targets

use crate::protocol::*;
use crate::session::SessionManager;
use jdwp_breakpoints::types::{BreakpointId, TargetId, ThreadId};
use jdwp_breakpoints::{
    Breakpoint, BreakpointError, BreakpointSpec, CoreConfig, MemoryAttributeStore, MemorySession,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const METHODS: &[&str] = &[
    "initialize",
    "target/attach",
    "target/detach",
    "target/define_class",
    "breakpoint/create",
    "breakpoint/get",
    "breakpoint/list",
    "breakpoint/enable",
    "breakpoint/disable",
    "breakpoint/set_entry",
    "breakpoint/set_exit",
    "breakpoint/set_hit_count",
    "breakpoint/remove",
    "breakpoint/add_to_target",
    "breakpoint/remove_from_target",
    "vm/method_entry",
    "vm/method_exit",
    "thread/resume",
];

type HandlerResult = Result<Value, JsonRpcError>;

#[derive(Debug, Deserialize)]
struct TargetParams {
    target: TargetId,
}

#[derive(Debug, Deserialize)]
struct BreakpointParams {
    id: BreakpointId,
}

#[derive(Debug, Deserialize)]
struct FlagParams {
    id: BreakpointId,
    value: bool,
}

#[derive(Debug, Deserialize)]
struct HitCountParams {
    id: BreakpointId,
    hit_count: u32,
}

#[derive(Debug, Deserialize)]
struct BindParams {
    id: BreakpointId,
    target: TargetId,
}

#[derive(Debug, Deserialize)]
struct MethodDef {
    name: String,
    signature: String,
    #[serde(default)]
    native: bool,
}

#[derive(Debug, Deserialize)]
struct LineDef {
    method: String,
    line: u32,
    index: u64,
}

#[derive(Debug, Deserialize)]
struct DefineClassParams {
    target: TargetId,
    name: String,
    #[serde(default)]
    methods: Vec<MethodDef>,
    #[serde(default)]
    lines: Vec<LineDef>,
}

#[derive(Debug, Deserialize)]
struct InvokeParams {
    target: TargetId,
    thread: ThreadId,
    class: String,
    method: String,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct ThreadParams {
    target: TargetId,
    thread: ThreadId,
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(json!({})))
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))
}

fn to_value<T: Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}

fn breakpoint_error(e: BreakpointError) -> JsonRpcError {
    let code = match e {
        BreakpointError::InvalidSpec(_) | BreakpointError::InvalidPattern(_) => INVALID_PARAMS,
        _ => BREAKPOINT_ERROR,
    };
    JsonRpcError::new(code, e.to_string())
}

pub struct RequestHandler {
    sessions: SessionManager,
}

impl RequestHandler {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            sessions: SessionManager::new(config),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Handling {} id={}", request.method, request.id);
        let params = request.params;
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "target/attach" => self.handle_attach(params).await,
            "target/detach" => self.handle_detach(params).await,
            "target/define_class" => self.handle_define_class(params).await,
            "breakpoint/create" => self.handle_create(params).await,
            "breakpoint/get" => self.handle_get(params).await,
            "breakpoint/list" => self.handle_list(),
            "breakpoint/enable" => self.handle_set_enabled(params, true).await,
            "breakpoint/disable" => self.handle_set_enabled(params, false).await,
            "breakpoint/set_entry" => self.handle_set_flag(params, true).await,
            "breakpoint/set_exit" => self.handle_set_flag(params, false).await,
            "breakpoint/set_hit_count" => self.handle_set_hit_count(params).await,
            "breakpoint/remove" => self.handle_remove(params).await,
            "breakpoint/add_to_target" => self.handle_add_to_target(params).await,
            "breakpoint/remove_from_target" => self.handle_remove_from_target(params),
            "vm/method_entry" => self.handle_invoke(params, true).await,
            "vm/method_exit" => self.handle_invoke(params, false).await,
            "thread/resume" => self.handle_resume(params).await,
            _ => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => {
                debug!("Request failed: {}", error.message);
                JsonRpcResponse::failure(request.id, error)
            }
        }
    }

    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" => info!("Client initialized"),
            "exit" => debug!("Client requested exit"),
            _ => warn!("Unknown notification: {}", notification.method),
        }
    }

    fn handle_initialize(&self) -> HandlerResult {
        to_value(InitializeResult {
            server_info: ServerInfo {
                name: "jdwp-scenario".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            config: self.sessions.dispatcher().config().clone(),
            methods: METHODS.to_vec(),
        })
    }

    async fn require_target(&self, target: TargetId) -> Result<Arc<MemorySession>, JsonRpcError> {
        self.sessions
            .target(target)
            .await
            .ok_or_else(|| JsonRpcError::new(TARGET_ERROR, format!("Unknown target {}", target)))
    }

    fn require_breakpoint(&self, id: BreakpointId) -> Result<Arc<Breakpoint>, JsonRpcError> {
        self.sessions
            .dispatcher()
            .breakpoint(id)
            .ok_or_else(|| breakpoint_error(BreakpointError::UnknownBreakpoint(id)))
    }

    async fn describe(&self, breakpoint: &Breakpoint) -> HandlerResult {
        let mut value = to_value(breakpoint.snapshot())?;
        if let Some(store) = self.sessions.store(breakpoint.id()).await {
            value["attributes"] = to_value(store.snapshot())?;
        }
        Ok(value)
    }

    async fn handle_attach(&self, params: Option<Value>) -> HandlerResult {
        let p: TargetParams = parse(params)?;
        self.sessions.attach(p.target).await.ok_or_else(|| {
            JsonRpcError::new(TARGET_ERROR, format!("Target {} already attached", p.target))
        })?;
        info!("Attached target {}", p.target);
        Ok(json!({ "target": p.target }))
    }

    async fn handle_detach(&self, params: Option<Value>) -> HandlerResult {
        let p: TargetParams = parse(params)?;
        self.sessions
            .detach(p.target)
            .await
            .ok_or_else(|| JsonRpcError::new(TARGET_ERROR, format!("Unknown target {}", p.target)))?;
        info!("Detached target {}", p.target);
        Ok(json!({ "target": p.target }))
    }

    async fn handle_define_class(&self, params: Option<Value>) -> HandlerResult {
        let p: DefineClassParams = parse(params)?;
        let session = self.require_target(p.target).await?;

        let methods: Vec<(&str, &str, bool)> = p
            .methods
            .iter()
            .map(|m| (m.name.as_str(), m.signature.as_str(), m.native))
            .collect();
        let class = session.define_class(&p.name, &methods);
        for line in &p.lines {
            session
                .add_line(&p.name, &line.method, line.line, line.index)
                .ok_or_else(|| {
                    JsonRpcError::new(INVALID_PARAMS, format!("Unknown method {}", line.method))
                })?;
        }

        let installed = self.sessions.dispatcher().class_prepared(p.target, &class);
        Ok(json!({ "class_id": class.id, "installed": installed }))
    }

    async fn handle_create(&self, params: Option<Value>) -> HandlerResult {
        let spec: BreakpointSpec = parse(params)?;
        let store = Arc::new(MemoryAttributeStore::new());
        let breakpoint = self
            .sessions
            .dispatcher()
            .create_breakpoint(spec, store.clone())
            .map_err(breakpoint_error)?;
        self.sessions.keep_store(breakpoint.id(), store).await;
        self.describe(&breakpoint).await
    }

    async fn handle_get(&self, params: Option<Value>) -> HandlerResult {
        let p: BreakpointParams = parse(params)?;
        let breakpoint = self.require_breakpoint(p.id)?;
        self.describe(&breakpoint).await
    }

    fn handle_list(&self) -> HandlerResult {
        let snapshots: Vec<_> = self
            .sessions
            .dispatcher()
            .breakpoints()
            .iter()
            .map(|b| b.snapshot())
            .collect();
        to_value(snapshots)
    }

    async fn handle_set_enabled(&self, params: Option<Value>, enabled: bool) -> HandlerResult {
        let p: BreakpointParams = parse(params)?;
        let breakpoint = self.require_breakpoint(p.id)?;
        breakpoint.set_enabled(enabled).map_err(breakpoint_error)?;
        self.describe(&breakpoint).await
    }

    async fn handle_set_flag(&self, params: Option<Value>, entry: bool) -> HandlerResult {
        let p: FlagParams = parse(params)?;
        let breakpoint = self.require_breakpoint(p.id)?;
        let result = if entry {
            breakpoint.set_entry(p.value)
        } else {
            breakpoint.set_exit(p.value)
        };
        result.map_err(breakpoint_error)?;
        self.describe(&breakpoint).await
    }

    async fn handle_set_hit_count(&self, params: Option<Value>) -> HandlerResult {
        let p: HitCountParams = parse(params)?;
        let breakpoint = self.require_breakpoint(p.id)?;
        breakpoint.set_hit_count(p.hit_count).map_err(breakpoint_error)?;
        self.describe(&breakpoint).await
    }

    async fn handle_remove(&self, params: Option<Value>) -> HandlerResult {
        let p: BreakpointParams = parse(params)?;
        self.sessions
            .dispatcher()
            .remove_breakpoint(p.id)
            .map_err(breakpoint_error)?;
        self.sessions.drop_store(p.id).await;
        Ok(json!({ "removed": p.id }))
    }

    async fn handle_add_to_target(&self, params: Option<Value>) -> HandlerResult {
        let p: BindParams = parse(params)?;
        let session = self.require_target(p.target).await?;
        let binding = self
            .sessions
            .dispatcher()
            .add_to_target(p.id, session)
            .map_err(breakpoint_error)?;
        to_value(binding.snapshot())
    }

    fn handle_remove_from_target(&self, params: Option<Value>) -> HandlerResult {
        let p: BindParams = parse(params)?;
        let removed = self
            .sessions
            .dispatcher()
            .remove_from_target(p.id, p.target)
            .map_err(breakpoint_error)?;
        Ok(json!({ "removed": removed }))
    }

    /// Run a thread into (or out of) a method and dispatch whatever the
    /// target reports
    async fn handle_invoke(&self, params: Option<Value>, entry: bool) -> HandlerResult {
        let p: InvokeParams = parse(params)?;
        let session = self.require_target(p.target).await?;
        let method = session
            .method(&p.class, &p.method, &p.signature)
            .ok_or_else(|| {
                JsonRpcError::new(
                    INVALID_PARAMS,
                    format!("Unknown method {}.{}{}", p.class, p.method, p.signature),
                )
            })?;

        let thread = self.sessions.thread(p.target, p.thread).await;
        if thread.is_suspended() {
            return Err(JsonRpcError::new(
                TARGET_ERROR,
                format!("Thread {:#x} is suspended", p.thread),
            ));
        }

        let events = if entry {
            session.invoke(p.thread, &method)
        } else {
            session.return_from(p.thread, &method)
        };
        let disposition = self
            .sessions
            .dispatcher()
            .handle_event_set(&events, p.target, thread.as_ref());

        Ok(json!({
            "events": events.len(),
            "disposition": disposition,
            "suspended": thread.is_suspended(),
        }))
    }

    async fn handle_resume(&self, params: Option<Value>) -> HandlerResult {
        let p: ThreadParams = parse(params)?;
        self.require_target(p.target).await?;
        let thread = self.sessions.thread(p.target, p.thread).await;
        thread.resume();
        Ok(json!({ "thread": p.thread, "suspended": false }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call(handler: &RequestHandler, method: &str, params: Value) -> JsonRpcResponse {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: method.to_string(),
            params: Some(params),
        };
        handler.handle_request(request).await
    }

    async fn ok(handler: &RequestHandler, method: &str, params: Value) -> Value {
        let response = call(handler, method, params).await;
        assert!(response.error.is_none(), "{} failed: {:?}", method, response.error);
        response.result.unwrap()
    }

    async fn setup(handler: &RequestHandler, spec: Value) -> u64 {
        ok(handler, "target/attach", json!({"target": 1})).await;
        ok(
            handler,
            "target/define_class",
            json!({
                "target": 1,
                "name": "com.foo.Bar",
                "methods": [{"name": "run", "signature": "()V"}]
            }),
        )
        .await;
        let created = ok(handler, "breakpoint/create", spec).await;
        let id = created["id"].as_u64().unwrap();
        ok(handler, "breakpoint/add_to_target", json!({"id": id, "target": 1})).await;
        id
    }

    fn run(thread: u64) -> Value {
        json!({"target": 1, "thread": thread, "class": "com.foo.Bar", "method": "run", "signature": "()V"})
    }

    #[tokio::test]
    async fn test_initialize_lists_methods() {
        let handler = RequestHandler::new(CoreConfig::default());
        let result = ok(&handler, "initialize", json!({})).await;
        assert_eq!(result["server_info"]["name"], "jdwp-scenario");
        assert_eq!(result["config"]["suspend_policy"], "event_thread");
        assert_eq!(result["methods"].as_array().unwrap().len(), METHODS.len());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let handler = RequestHandler::new(CoreConfig::default());
        let response = call(&handler, "debug.attach", json!({})).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_breakpoint_spec() {
        let handler = RequestHandler::new(CoreConfig::default());
        let response = call(&handler, "breakpoint/create", json!({"kind": "line", "type_name": "A"})).await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_hit_count_scenario() {
        let handler = RequestHandler::new(CoreConfig::default());
        let id = setup(
            &handler,
            json!({"kind": "method", "type_name": "com.foo.*", "method_name": "run", "hit_count": 2}),
        )
        .await;

        let first = ok(&handler, "vm/method_entry", run(7)).await;
        assert_eq!(first["events"], 1);
        assert_eq!(first["disposition"], "resume");

        let second = ok(&handler, "vm/method_entry", run(7)).await;
        assert_eq!(second["disposition"], "suspend");
        assert_eq!(second["suspended"], true);

        let bp = ok(&handler, "breakpoint/get", json!({"id": id})).await;
        assert_eq!(bp["expired"], true);
        assert_eq!(bp["enabled"], false);
        assert_eq!(bp["attributes"]["expired"], true);
        assert_eq!(bp["bindings"][0]["last_event"], "entry");

        let blocked = call(&handler, "vm/method_entry", run(7)).await;
        assert_eq!(blocked.error.unwrap().code, TARGET_ERROR);

        ok(&handler, "thread/resume", json!({"target": 1, "thread": 7})).await;
        let after = ok(&handler, "vm/method_entry", run(7)).await;
        assert_eq!(after["events"], 0);
    }

    #[tokio::test]
    async fn test_exit_gated_by_flag() {
        let handler = RequestHandler::new(CoreConfig::default());
        let id = setup(&handler, json!({"kind": "method", "type_name": "com.foo.*"})).await;

        let exit = ok(&handler, "vm/method_exit", run(3)).await;
        assert_eq!(exit["events"], 0);
        assert_eq!(exit["disposition"], "resume");

        ok(&handler, "breakpoint/set_exit", json!({"id": id, "value": true})).await;
        let exit = ok(&handler, "vm/method_exit", run(3)).await;
        assert_eq!(exit["disposition"], "suspend");
    }

    #[tokio::test]
    async fn test_deferred_install_on_class_load() {
        let handler = RequestHandler::new(CoreConfig::default());
        ok(&handler, "target/attach", json!({"target": 1})).await;
        let created = ok(
            &handler,
            "breakpoint/create",
            json!({"kind": "method", "type_name": "com.foo.Late", "method_name": "go", "method_signature": "()V"}),
        )
        .await;
        let id = created["id"].as_u64().unwrap();
        let binding = ok(&handler, "breakpoint/add_to_target", json!({"id": id, "target": 1})).await;
        assert_eq!(binding["requests"].as_array().unwrap().len(), 0);

        let loaded = ok(
            &handler,
            "target/define_class",
            json!({"target": 1, "name": "com.foo.Late", "methods": [{"name": "go", "signature": "()V"}]}),
        )
        .await;
        assert_eq!(loaded["installed"], 2);
    }

    #[tokio::test]
    async fn test_detach_uninstalls() {
        let handler = RequestHandler::new(CoreConfig::default());
        let id = setup(&handler, json!({"kind": "method", "type_name": "com.foo.*"})).await;
        let bp = ok(&handler, "breakpoint/get", json!({"id": id})).await;
        assert_eq!(bp["install_count"], 2);

        ok(&handler, "target/detach", json!({"target": 1})).await;

        let bp = ok(&handler, "breakpoint/get", json!({"id": id})).await;
        assert_eq!(bp["install_count"], 0);
        assert!(bp["bindings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_breakpoint() {
        let handler = RequestHandler::new(CoreConfig::default());
        let id = setup(&handler, json!({"kind": "method", "type_name": "com.foo.*"})).await;

        ok(&handler, "breakpoint/remove", json!({"id": id})).await;

        let list = ok(&handler, "breakpoint/list", json!({})).await;
        assert!(list.as_array().unwrap().is_empty());
        let missing = call(&handler, "breakpoint/get", json!({"id": id})).await;
        assert_eq!(missing.error.unwrap().code, BREAKPOINT_ERROR);
    }
}
