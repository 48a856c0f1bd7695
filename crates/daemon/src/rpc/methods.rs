use std::path::Path;
use std::sync::Arc;

use kzrnote_common::note::uri;
use kzrnote_common::protocol::jsonrpc::{
    is_supported_protocol_version, Request, RequestId, Response, RpcError, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, RESOURCE_EXHAUSTED,
};
use kzrnote_common::protocol::rpc_methods::{self as methods, IMPLEMENTED_METHODS};
use kzrnote_common::version_string;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::debug;

use crate::app::{App, AppError, LoopEvent, LoopSender};
use crate::search::NoteSearch;

/// Connection-side RPC state: a way into the event loop, plus note search,
/// which runs outside the loop so a slow `grep` never stalls it.
#[derive(Clone)]
pub struct RpcServerState {
    loop_tx: LoopSender,
    search: Arc<NoteSearch>,
}

impl RpcServerState {
    pub fn new(loop_tx: LoopSender, search: NoteSearch) -> Self {
        Self { loop_tx, search: Arc::new(search) }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct UriParams {
    uri: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateNamedParams {
    title: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SetContentsParams {
    uri: String,
    contents: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    case_sensitive: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct FindParams {
    title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CommandlineParams {
    #[serde(default)]
    argv: Vec<String>,
    #[serde(default)]
    display: String,
    #[serde(default)]
    startup_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CommandParams {
    command: String,
    #[serde(default)]
    argument: String,
    sender: String,
}

pub async fn handle_raw_request(raw: &[u8], state: &RpcServerState) -> Response {
    let request = match serde_json::from_slice::<Request>(raw) {
        Ok(request) => request,
        Err(error) => {
            return Response::error(
                RequestId::Null,
                RpcError {
                    code: PARSE_ERROR,
                    message: "Parse error".to_string(),
                    data: Some(json!({ "reason": error.to_string() })),
                },
            );
        }
    };

    if request.jsonrpc != "2.0" {
        return Response::error(
            request.id,
            RpcError { code: INVALID_REQUEST, message: "Invalid Request".to_string(), data: None },
        );
    }

    if let Some(version) = request.protocol_version.as_deref() {
        if !is_supported_protocol_version(version) {
            return Response::error(
                request.id,
                RpcError {
                    code: INVALID_REQUEST,
                    message: "Invalid Request".to_string(),
                    data: Some(json!({ "reason": format!("unsupported protocol version `{version}`") })),
                },
            );
        }
    }

    route_request(request, state).await
}

/// Answer what the connection can answer itself; hand the rest to the loop.
pub async fn route_request(request: Request, state: &RpcServerState) -> Response {
    match request.method.as_str() {
        methods::RPC_PING => Response::success(request.id, json!({ "ok": true })),
        methods::NOTE_SEARCH => handle_note_search(request, state).await,
        method if !IMPLEMENTED_METHODS.contains(&method) => method_not_found(request),
        _ => forward_to_loop(request, state).await,
    }
}

async fn handle_note_search(request: Request, state: &RpcServerState) -> Response {
    let params: SearchParams = match parse_params(methods::NOTE_SEARCH, request.params, &request.id)
    {
        Ok(params) => params,
        Err(response) => return response,
    };

    let search = Arc::clone(&state.search);
    let result = tokio::task::spawn_blocking(move || {
        search.search(&params.query, params.case_sensitive)
    })
    .await;

    match result {
        Ok(uris) => Response::success(request.id, json!(uris)),
        Err(error) => internal_error(request.id, format!("search task failed: {error}")),
    }
}

async fn forward_to_loop(request: Request, state: &RpcServerState) -> Response {
    let id = request.id.clone();
    let (reply, response) = oneshot::channel();
    if state.loop_tx.send(LoopEvent::Rpc { request, reply }).is_err() {
        return internal_error(id, "coordinator is shutting down".to_string());
    }
    match response.await {
        Ok(response) => response,
        Err(_) => internal_error(id, "coordinator dropped the request".to_string()),
    }
}

/// Run one request against the application state. Called on the loop.
pub fn dispatch(app: &mut App, request: Request) -> Response {
    debug!(method = %request.method, "rpc request");
    let id = request.id;
    let params = request.params;
    match request.method.as_str() {
        methods::RPC_PING => Response::success(id, json!({ "ok": true })),
        methods::NOTE_CREATE => match app.create_note("") {
            Ok(path) => uri_response(id, &path),
            Err(error) => app_error_response(id, error),
        },
        methods::NOTE_CREATE_NAMED => {
            let params: CreateNamedParams =
                match parse_params(methods::NOTE_CREATE_NAMED, params, &id) {
                    Ok(params) => params,
                    Err(response) => return response,
                };
            match app.create_note(&params.title) {
                Ok(path) => uri_response(id, &path),
                Err(error) => app_error_response(id, error),
            }
        }
        methods::NOTE_DELETE => with_note_path(app, methods::NOTE_DELETE, params, id, |app, path| {
            json!(app.delete_note(path))
        }),
        methods::NOTE_DISPLAY => {
            with_note_path(app, methods::NOTE_DISPLAY, params, id, |app, path| {
                json!(app.display_note(path, 0))
            })
        }
        methods::NOTE_EXISTS => with_note_path(app, methods::NOTE_EXISTS, params, id, |app, path| {
            json!(app.store().is_note(path))
        }),
        methods::NOTE_LIST => Response::success(id, json!(app.list_uris())),
        methods::NOTE_TITLE => with_note_path(app, methods::NOTE_TITLE, params, id, |app, path| {
            json!(app.title(path).unwrap_or_default())
        }),
        methods::NOTE_CHANGE_DATE => {
            with_note_path(app, methods::NOTE_CHANGE_DATE, params, id, |app, path| {
                json!(app.store().change_date(path).unwrap_or(0))
            })
        }
        methods::NOTE_CONTENTS => {
            with_note_path(app, methods::NOTE_CONTENTS, params, id, |app, path| {
                json!(app.contents(path))
            })
        }
        methods::NOTE_SET_CONTENTS => {
            let params: SetContentsParams =
                match parse_params(methods::NOTE_SET_CONTENTS, params, &id) {
                    Ok(params) => params,
                    Err(response) => return response,
                };
            match app.note_path(&params.uri) {
                Ok(path) => Response::success(id, json!(app.set_contents(&path, &params.contents))),
                Err(error) => app_error_response(id, error),
            }
        }
        methods::NOTE_FIND => {
            let params: FindParams = match parse_params(methods::NOTE_FIND, params, &id) {
                Ok(params) => params,
                Err(response) => return response,
            };
            let found = app
                .find_by_title(&params.title, true)
                .and_then(|path| uri::encode(&path).ok())
                .unwrap_or_default();
            Response::success(id, json!(found))
        }
        methods::APP_VERSION => Response::success(id, json!(version_string())),
        methods::APP_COMMANDLINE => {
            let params: CommandlineParams =
                match parse_params(methods::APP_COMMANDLINE, params, &id) {
                    Ok(params) => params,
                    Err(response) => return response,
                };
            match app.handle_commandline(&params.argv, &params.display, &params.startup_id) {
                Ok(output) => Response::success(id, json!(output)),
                Err(error) => app_error_response(id, error),
            }
        }
        methods::APP_COMMAND => {
            let params: CommandParams = match parse_params(methods::APP_COMMAND, params, &id) {
                Ok(params) => params,
                Err(response) => return response,
            };
            match app.run_command(&params.command, &params.argument, &params.sender) {
                Ok(done) => Response::success(id, json!(done)),
                Err(error) => app_error_response(id, error),
            }
        }
        methods::APP_DISPLAY_SEARCH => {
            let params: CommandlineParams = match params {
                Some(params) => match parse_params(methods::APP_DISPLAY_SEARCH, Some(params), &id) {
                    Ok(params) => params,
                    Err(response) => return response,
                },
                None => CommandlineParams::default(),
            };
            Response::success(id, json!(app.display_search(&params.startup_id)))
        }
        methods::APP_QUIT => {
            app.request_shutdown();
            Response::success(id, json!({ "ok": true }))
        }
        _ => Response::error(
            id,
            RpcError {
                code: METHOD_NOT_FOUND,
                message: "Method not found".to_string(),
                data: Some(json!({ "method": request.method })),
            },
        ),
    }
}

/// Decode `{uri}` and run `f` on the note path. A URI that does not decode
/// is an error; a note that does not exist is up to `f`.
fn with_note_path(
    app: &mut App,
    method: &str,
    params: Option<serde_json::Value>,
    id: RequestId,
    f: impl FnOnce(&mut App, &Path) -> serde_json::Value,
) -> Response {
    let params: UriParams = match parse_params(method, params, &id) {
        Ok(params) => params,
        Err(response) => return response,
    };
    match app.note_path(&params.uri) {
        Ok(path) => Response::success(id, f(app, &path)),
        Err(error) => app_error_response(id, error),
    }
}

fn parse_params<T: DeserializeOwned>(
    method: &str,
    params: Option<serde_json::Value>,
    request_id: &RequestId,
) -> Result<T, Response> {
    let Some(params) = params else {
        return Err(invalid_params_response(request_id.clone(), format!("{method} requires params")));
    };

    serde_json::from_value::<T>(params).map_err(|error| {
        invalid_params_response(
            request_id.clone(),
            format!("failed to decode {method} params: {error}"),
        )
    })
}

fn uri_response(id: RequestId, path: &Path) -> Response {
    match uri::encode(path) {
        Ok(uri) => Response::success(id, json!(uri)),
        Err(error) => internal_error(id, error.to_string()),
    }
}

fn app_error_response(id: RequestId, error: AppError) -> Response {
    match error {
        AppError::InvalidArgument(reason) => Response::error(id, RpcError::invalid_argument(reason)),
        AppError::ResourceExhausted(error) => Response::error(
            id,
            RpcError {
                code: RESOURCE_EXHAUSTED,
                message: "Resource exhausted".to_string(),
                data: Some(json!({ "reason": error.to_string() })),
            },
        ),
    }
}

fn method_not_found(request: Request) -> Response {
    Response::error(
        request.id,
        RpcError {
            code: METHOD_NOT_FOUND,
            message: "Method not found".to_string(),
            data: Some(json!({ "method": request.method })),
        },
    )
}

fn invalid_params_response(request_id: RequestId, reason: String) -> Response {
    Response::error(
        request_id,
        RpcError {
            code: INVALID_PARAMS,
            message: "Invalid params".to_string(),
            data: Some(json!({ "reason": reason })),
        },
    )
}

fn internal_error(request_id: RequestId, reason: String) -> Response {
    Response::error(
        request_id,
        RpcError {
            code: INTERNAL_ERROR,
            message: "Internal error".to_string(),
            data: Some(json!({ "reason": reason })),
        },
    )
}
