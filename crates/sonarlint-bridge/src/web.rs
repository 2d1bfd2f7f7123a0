//! HTTP routing, CORS and endpoints.

use std::io::Cursor;

use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{debug, warn};

use crate::model::ShowFindingRequest;
use crate::server::BridgeState;
use crate::trust::is_trusted_origin;

/// Identity and trust probe.
pub const STATUS_PATH: &str = "/sonarlint/api/status";
/// "Open this hotspot in the IDE".
pub const SHOW_HOTSPOT_PATH: &str = "/sonarlint/api/hotspots/show";

const STATUS_UNAVAILABLE: &str = "Unable to compute IDE status";

type HttpResponse = Response<Cursor<Vec<u8>>>;

/// Body of the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    /// Static product identifier.
    pub ide_name: String,
    /// Workspace token for trusted origins, empty otherwise.
    pub description: String,
}

enum Routed {
    Reply(HttpResponse),
    Accept(ShowFindingRequest),
}

/// Answer one request: route it, add CORS, respond, then hand accepted
/// show-finding requests to a background task.
pub(crate) fn handle_request(request: Request, state: &BridgeState) {
    let origin = header_value(&request, "Origin").filter(|origin| !origin.is_empty());
    debug!(
        method = %request.method(),
        url = request.url(),
        origin = origin.as_deref().unwrap_or("-"),
        "bridge request"
    );
    let (response, accepted) = match route(&request, state, origin.as_deref()) {
        Routed::Reply(response) => (response, None),
        Routed::Accept(show) => (Response::from_data(Vec::new()), Some(show)),
    };
    let response = with_cors(response, origin.as_deref());
    if let Err(err) = request.respond(response) {
        debug!("failed to send bridge response: {err}");
    }
    if let Some(show) = accepted {
        state.schedule(show);
    }
}

fn route(request: &Request, state: &BridgeState, origin: Option<&str>) -> Routed {
    if *request.method() != Method::Get {
        let mut response = text_response(405, "Method not allowed");
        if let Some(allow) = header("Allow", "GET") {
            response.add_header(allow);
        }
        return Routed::Reply(response);
    }
    let (path, query) = split_url(request.url());
    match path {
        STATUS_PATH => Routed::Reply(status(state, origin)),
        SHOW_HOTSPOT_PATH => match ShowFindingRequest::from_query(query) {
            Ok(show) => Routed::Accept(show),
            Err(missing) => Routed::Reply(text_response(400, &missing.to_string())),
        },
        _ => Routed::Reply(text_response(404, "Not found")),
    }
}

fn status(state: &BridgeState, origin: Option<&str>) -> HttpResponse {
    let services = state.services.clone();
    let ide_name = state.config.ide_name.to_string();
    let origin = origin.map(str::to_owned);
    let computed = state.ui.run_blocking_timeout(
        move || {
            let trusted = origin
                .as_deref()
                .is_some_and(|origin| is_trusted_origin(origin, &services.connections.all()));
            StatusBody {
                ide_name,
                description: if trusted {
                    services.workspace.workspace_token()
                } else {
                    String::new()
                },
            }
        },
        state.config.status_timeout,
    );
    match computed {
        Ok(body) => json_response(&body),
        Err(err) => {
            warn!("status probe failed: {err}");
            text_response(500, STATUS_UNAVAILABLE)
        }
    }
}

/// Mirror the request origin so the browser lets the web UI read the response.
fn with_cors(mut response: HttpResponse, origin: Option<&str>) -> HttpResponse {
    if let Some(origin) = origin {
        match header("Access-Control-Allow-Origin", origin) {
            Some(allow) => response.add_header(allow),
            None => debug!("origin is not a valid header value, CORS header skipped"),
        }
    }
    response
}

fn json_response(body: &StatusBody) -> HttpResponse {
    let text = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::from_string(text);
    if let Some(content_type) = header("Content-Type", "application/json") {
        response.add_header(content_type);
    }
    response
}

fn text_response(code: u16, text: &str) -> HttpResponse {
    let mut response = Response::from_string(text).with_status_code(StatusCode(code));
    if let Some(content_type) = header("Content-Type", "text/plain; charset=utf-8") {
        response.add_header(content_type);
    }
    response
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn header_value(request: &Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(name))
        .map(|header| header.value.as_str().to_string())
}

fn split_url(url: &str) -> (&str, &str) {
    url.split_once('?').unwrap_or((url, ""))
}

/// First value of `name` in a URL query string, percent-decoded.
pub(crate) fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (decode_component(key) == name).then(|| decode_component(value))
    })
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.replace('+', " "),
    }
}
