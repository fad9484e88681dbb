//! Minimal Nacos-compatible HTTP server backed by the in-process registry and store

use crate::model::{InstanceList, WireInstance};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use mesh_core::{
    ConfigKey, ConfigStore, InMemoryConfigStore, InMemoryRegistry, NamingService, ServiceInstance,
};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct State {
    registry: Arc<InMemoryRegistry>,
    configs: InMemoryConfigStore,
}

pub struct FakeNacos {
    addr: SocketAddr,
    state: State,
}

impl FakeNacos {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let state = State::default();

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = server_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(req, state.clone()));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Direct access to the backing store, standing in for another client
    pub fn config_store(&self) -> &InMemoryConfigStore {
        &self.state.configs
    }
}

fn params(raw: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw).into_owned().collect()
}

fn reply(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn instance_from(p: &HashMap<String, String>) -> Option<ServiceInstance> {
    let mut instance = ServiceInstance::new(
        p.get("serviceName")?.clone(),
        p.get("ip")?.clone(),
        p.get("port")?.parse().ok()?,
    )
    .with_group(p.get("groupName")?.clone());

    if let Some(weight) = p.get("weight") {
        instance.weight = weight.parse().ok()?;
    }
    if let Some(healthy) = p.get("healthy") {
        instance.healthy = healthy.parse().ok()?;
    }
    if let Some(ephemeral) = p.get("ephemeral") {
        instance.ephemeral = ephemeral.parse().ok()?;
    }
    if let Some(metadata) = p.get("metadata") {
        instance.metadata = serde_json::from_str(metadata).ok()?;
    }
    Some(instance)
}

fn config_key_from(p: &HashMap<String, String>) -> Option<ConfigKey> {
    Some(
        ConfigKey::new(p.get("dataId")?.clone(), p.get("group")?.clone())
            .with_namespace(p.get("tenant").cloned().unwrap_or_default()),
    )
}

async fn handle(
    req: Request<hyper::body::Incoming>,
    state: State,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = params(req.uri().query().unwrap_or("").as_bytes());
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Ok(reply(StatusCode::BAD_REQUEST, "bad body")),
    };
    let form = params(&body);

    let response = match (method, path.as_str()) {
        (Method::POST, "/nacos/v1/ns/instance") => match instance_from(&form) {
            Some(instance) => match state.registry.register(&instance).await {
                Ok(()) => reply(StatusCode::OK, "ok"),
                Err(e) => reply(StatusCode::BAD_REQUEST, e.to_string()),
            },
            None => reply(StatusCode::BAD_REQUEST, "missing instance fields"),
        },
        (Method::DELETE, "/nacos/v1/ns/instance") => match instance_from(&query) {
            Some(instance) => {
                state.registry.deregister(&instance).await;
                reply(StatusCode::OK, "ok")
            }
            None => reply(StatusCode::BAD_REQUEST, "missing instance fields"),
        },
        (Method::GET, "/nacos/v1/ns/instance/list") => {
            let service = query.get("serviceName").cloned().unwrap_or_default();
            let group = query.get("groupName").cloned().unwrap_or_default();
            match state.registry.select_healthy(&service, &group).await {
                Ok(instances) => {
                    let list = InstanceList {
                        name: Some(format!("{}@@{}", group, service)),
                        group_name: Some(group),
                        hosts: instances.iter().map(WireInstance::from_instance).collect(),
                    };
                    reply(
                        StatusCode::OK,
                        serde_json::to_string(&list).unwrap_or_default(),
                    )
                }
                Err(e) => reply(StatusCode::NOT_FOUND, e.to_string()),
            }
        }
        (Method::POST, "/nacos/v1/cs/configs") => {
            match (config_key_from(&form), form.get("content")) {
                (Some(key), Some(content)) => match state.configs.publish(&key, content).await {
                    Ok(()) => reply(StatusCode::OK, "true"),
                    Err(_) => reply(StatusCode::OK, "false"),
                },
                _ => reply(StatusCode::BAD_REQUEST, "missing config fields"),
            }
        }
        (Method::GET, "/nacos/v1/cs/configs") => match config_key_from(&query) {
            Some(key) => match state.configs.fetch(&key).await {
                Ok(content) => reply(StatusCode::OK, content),
                Err(_) => reply(StatusCode::NOT_FOUND, "config data not exist"),
            },
            None => reply(StatusCode::BAD_REQUEST, "missing config fields"),
        },
        _ => reply(StatusCode::NOT_FOUND, "no such endpoint"),
    };

    Ok(response)
}
