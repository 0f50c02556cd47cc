//! [`RouterService`]: the IPC-facing wrapper around a running
//! [`garlicrouter_router::Router`], exposing its admin API and
//! observability counters to JSON-RPC callers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use garlicrouter_core::types::BandwidthClass;
use garlicrouter_router::Router;
use serde_json::{json, Value};

use crate::ipc::IpcHandler;

pub struct RouterService {
    router: Arc<Router>,
}

impl RouterService {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    fn status(&self) -> Value {
        json!({
            "reachable": self.router.is_reachable(),
            "floodfill": self.router.is_floodfill(),
            "bandwidth": self.router.bandwidth().to_char().to_string(),
            "num_peers": self.router.num_peers(),
            "num_transit_tunnels": self.router.num_transit_tunnels(),
            "total_sent_bytes": self.router.total_sent_bytes(),
            "total_received_bytes": self.router.total_received_bytes(),
            "tunnel_build_success_rate": self.router.tunnel_build_success_rate(),
        })
    }

    fn set_reachable(&self, params: Option<Value>) -> Result<Value, String> {
        let reachable = bool_param(&params, "reachable")?;
        self.router.set_reachable(reachable);
        Ok(json!({ "reachable": reachable }))
    }

    fn set_floodfill(&self, params: Option<Value>) -> Result<Value, String> {
        let floodfill = bool_param(&params, "floodfill")?;
        self.router.set_floodfill(floodfill);
        Ok(json!({ "floodfill": floodfill }))
    }

    fn set_bandwidth(&self, params: Option<Value>) -> Result<Value, String> {
        let class = bandwidth_param(&params)?;
        self.router.set_bandwidth(class);
        Ok(json!({ "bandwidth": class.to_char().to_string() }))
    }
}

fn bool_param(params: &Option<Value>, field: &str) -> Result<bool, String> {
    params
        .as_ref()
        .and_then(|p| p.get(field))
        .and_then(Value::as_bool)
        .ok_or_else(|| format!("missing or non-boolean '{field}' parameter"))
}

fn bandwidth_param(params: &Option<Value>) -> Result<BandwidthClass, String> {
    let raw = params
        .as_ref()
        .and_then(|p| p.get("class"))
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'class' parameter".to_string())?;
    let first_char = raw.chars().next().ok_or_else(|| "empty 'class' parameter".to_string())?;
    BandwidthClass::from_char(first_char.to_ascii_uppercase()).ok_or_else(|| format!("unrecognised bandwidth class: {raw}"))
}

impl IpcHandler for RouterService {
    fn handle(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, String>> + Send + '_>> {
        let result = match method {
            "status" => Ok(self.status()),
            "set_reachable" => self.set_reachable(params),
            "set_floodfill" => self.set_floodfill(params),
            "set_bandwidth" => self.set_bandwidth(params),
            other => Err(format!("unknown method: {other}")),
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlicrouter_core::config::RouterConfig;

    fn service() -> RouterService {
        RouterService::new(Arc::new(Router::new(RouterConfig::default())))
    }

    #[tokio::test]
    async fn status_reports_defaults() {
        let svc = service();
        let result = svc.handle("status", None).await.unwrap();
        assert_eq!(result["reachable"], true);
        assert_eq!(result["floodfill"], false);
        assert_eq!(result["num_peers"], 0);
    }

    #[tokio::test]
    async fn set_reachable_updates_router_state() {
        let svc = service();
        let result = svc.handle("set_reachable", Some(json!({ "reachable": false }))).await.unwrap();
        assert_eq!(result["reachable"], false);
        assert!(!svc.router.is_reachable());
    }

    #[tokio::test]
    async fn set_bandwidth_accepts_a_class_letter() {
        let svc = service();
        let result = svc.handle("set_bandwidth", Some(json!({ "class": "P" }))).await.unwrap();
        assert_eq!(result["bandwidth"], "P");
        assert_eq!(svc.router.bandwidth(), BandwidthClass::P);
    }

    #[tokio::test]
    async fn set_bandwidth_rejects_unknown_class() {
        let svc = service();
        let err = svc.handle("set_bandwidth", Some(json!({ "class": "Z" }))).await.unwrap_err();
        assert!(err.contains("unrecognised"));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let svc = service();
        let err = svc.handle("purchase_credits", None).await.unwrap_err();
        assert!(err.contains("unknown method"));
    }

    #[tokio::test]
    async fn missing_params_is_rejected() {
        let svc = service();
        let err = svc.handle("set_reachable", None).await.unwrap_err();
        assert!(err.contains("missing"));
    }
}
