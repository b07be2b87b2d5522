//! Host command interface and its JSON wire shapes.
//!
//! A request names a method and carries an argument object; [`Command::parse`]
//! turns that into a typed [`Command`] and [`ArSession::execute`] runs it.
//! `snapshot` is the one command that cannot finish synchronously and is left
//! to the caller, which owns the waiting.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::codec::encode;
use crate::config::SessionConfig;
use crate::error::{ArError, Result};
use crate::provider::ArProvider;
use crate::session::ArSession;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Init(SessionConfig),
    InitCloudAnchorMode,
    LoadMesh {
        texture: Vec<u8>,
        model: Option<String>,
    },
    CreateAnchor {
        transformation: Vec<f64>,
        name: String,
    },
    RemoveAnchor {
        name: String,
    },
    HostAnchor {
        name: String,
        ttl_seconds: Option<i64>,
    },
    ResolveAnchor {
        cloud_anchor_id: String,
    },
    RegisterDownloadedAnchor {
        temp_name: String,
        reply: std::result::Result<String, String>,
    },
    GetAnchorPose {
        name: String,
    },
    GetCameraPose,
    AttachNode {
        name: String,
        anchor_name: String,
    },
    RemoveNode {
        name: String,
    },
    Tap {
        x: f64,
        y: f64,
    },
    Snapshot,
    AdvanceFrames {
        count: u32,
    },
    Dispose,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadMeshArgs {
    texture_bytes: String,
    #[serde(rename = "skin3DModelFilename")]
    model: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAnchorArgs {
    transformation: Vec<f64>,
    name: String,
}

#[derive(Deserialize)]
struct NameArgs {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostAnchorArgs {
    name: String,
    #[serde(alias = "ttl")]
    ttl_seconds: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveAnchorArgs {
    #[serde(alias = "cloudanchorid")]
    cloud_anchor_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterDownloadedArgs {
    temp_name: String,
    name: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachNodeArgs {
    name: String,
    anchor_name: String,
}

#[derive(Deserialize)]
struct TapArgs {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct AdvanceFramesArgs {
    #[serde(default = "one")]
    count: u32,
}

fn one() -> u32 {
    1
}

fn args_of<T: DeserializeOwned>(method: &str, args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| ArError::InvalidCommand(format!("{method}: {e}")))
}

impl Command {
    /// Build a command from a method name and its (possibly null) arguments.
    pub fn parse(method: &str, args: Value) -> Result<Self> {
        let args = if args.is_null() { json!({}) } else { args };
        let command = match method {
            "init" => Command::Init(args_of(method, args)?),
            "initCloudAnchorMode" => Command::InitCloudAnchorMode,
            "loadMesh" => {
                let a: LoadMeshArgs = args_of(method, args)?;
                let texture = BASE64.decode(a.texture_bytes.as_bytes()).map_err(|e| {
                    ArError::InvalidCommand(format!("loadMesh: textureBytes is not base64: {e}"))
                })?;
                Command::LoadMesh {
                    texture,
                    model: a.model,
                }
            }
            "createAnchor" | "addAnchor" => {
                let a: CreateAnchorArgs = args_of(method, args)?;
                Command::CreateAnchor {
                    transformation: a.transformation,
                    name: a.name,
                }
            }
            "removeAnchor" => Command::RemoveAnchor {
                name: args_of::<NameArgs>(method, args)?.name,
            },
            "hostAnchor" | "uploadAnchor" => {
                let a: HostAnchorArgs = args_of(method, args)?;
                Command::HostAnchor {
                    name: a.name,
                    ttl_seconds: a.ttl_seconds,
                }
            }
            "resolveAnchor" | "downloadAnchor" => Command::ResolveAnchor {
                cloud_anchor_id: args_of::<ResolveAnchorArgs>(method, args)?.cloud_anchor_id,
            },
            "registerDownloadedAnchor" => {
                let a: RegisterDownloadedArgs = args_of(method, args)?;
                let reply = match (a.name, a.error) {
                    (_, Some(error)) => Err(error),
                    (Some(name), None) => Ok(name),
                    (None, None) => {
                        return Err(ArError::InvalidCommand(
                            "registerDownloadedAnchor: needs either name or error".to_string(),
                        ));
                    }
                };
                Command::RegisterDownloadedAnchor {
                    temp_name: a.temp_name,
                    reply,
                }
            }
            "getAnchorPose" => Command::GetAnchorPose {
                name: args_of::<NameArgs>(method, args)?.name,
            },
            "getCameraPose" => Command::GetCameraPose,
            "attachNode" => {
                let a: AttachNodeArgs = args_of(method, args)?;
                Command::AttachNode {
                    name: a.name,
                    anchor_name: a.anchor_name,
                }
            }
            "removeNode" => Command::RemoveNode {
                name: args_of::<NameArgs>(method, args)?.name,
            },
            "tap" => {
                let a: TapArgs = args_of(method, args)?;
                Command::Tap { x: a.x, y: a.y }
            }
            "snapshot" => Command::Snapshot,
            "advanceFrames" => Command::AdvanceFrames {
                count: args_of::<AdvanceFramesArgs>(method, args)?.count,
            },
            "dispose" => Command::Dispose,
            other => {
                return Err(ArError::InvalidCommand(format!("unknown method '{other}'")));
            }
        };
        Ok(command)
    }

    pub fn method(&self) -> &'static str {
        match self {
            Command::Init(_) => "init",
            Command::InitCloudAnchorMode => "initCloudAnchorMode",
            Command::LoadMesh { .. } => "loadMesh",
            Command::CreateAnchor { .. } => "createAnchor",
            Command::RemoveAnchor { .. } => "removeAnchor",
            Command::HostAnchor { .. } => "hostAnchor",
            Command::ResolveAnchor { .. } => "resolveAnchor",
            Command::RegisterDownloadedAnchor { .. } => "registerDownloadedAnchor",
            Command::GetAnchorPose { .. } => "getAnchorPose",
            Command::GetCameraPose => "getCameraPose",
            Command::AttachNode { .. } => "attachNode",
            Command::RemoveNode { .. } => "removeNode",
            Command::Tap { .. } => "tap",
            Command::Snapshot => "snapshot",
            Command::AdvanceFrames { .. } => "advanceFrames",
            Command::Dispose => "dispose",
        }
    }
}

impl<P: ArProvider> ArSession<P> {
    /// Run one host command and produce its JSON result.
    ///
    /// `Snapshot` is rejected here; use [`ArSession::request_snapshot`].
    pub fn execute(&mut self, command: Command) -> Result<Value> {
        tracing::debug!(method = command.method(), "executing command");
        match command {
            Command::Init(config) => self.init(config).map(|_| Value::Null),
            Command::InitCloudAnchorMode => self.enable_cloud_mode().map(|_| Value::Null),
            Command::LoadMesh { texture, model } => {
                self.load_mesh(&texture, model).map(|_| Value::Null)
            }
            Command::CreateAnchor {
                transformation,
                name,
            } => self
                .create_anchor(&transformation, &name)
                .map(|_| Value::Bool(true)),
            Command::RemoveAnchor { name } => self.remove_anchor(&name).map(|_| Value::Null),
            Command::HostAnchor { name, ttl_seconds } => self
                .host_anchor(&name, ttl_seconds)
                .map(|_| Value::Bool(true)),
            Command::ResolveAnchor { cloud_anchor_id } => {
                self.resolve_anchor(&cloud_anchor_id).map(|_| Value::Null)
            }
            Command::RegisterDownloadedAnchor { temp_name, reply } => self
                .register_downloaded_anchor(&temp_name, reply)
                .map(|_| Value::Null),
            Command::GetAnchorPose { name } => self
                .anchor_pose(&name)
                .map(|pose| json!(encode(&pose).to_vec())),
            Command::GetCameraPose => self
                .camera_pose()
                .map(|pose| json!(encode(&pose).to_vec())),
            Command::AttachNode { name, anchor_name } => self
                .attach_node(&name, &anchor_name)
                .map(|_| Value::Bool(true)),
            Command::RemoveNode { name } => self.remove_node(&name).map(|removed| json!(removed)),
            Command::Tap { x, y } => self.tap(x, y).map(|_| Value::Null),
            Command::Snapshot => Err(ArError::InvalidCommand(
                "snapshot completes asynchronously".to_string(),
            )),
            Command::AdvanceFrames { count } => {
                let mut processed = 0u32;
                for _ in 0..count {
                    if self.advance()?.is_none() {
                        break;
                    }
                    processed += 1;
                }
                Ok(json!(processed))
            }
            Command::Dispose => {
                self.dispose();
                Ok(Value::Null)
            }
        }
    }
}

/// One line from the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
}

impl From<&ArError> for WireError {
    fn from(e: &ArError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// Reply to one [`Request`]; exactly one of `result` and `error` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: &ArError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn from_result(id: u64, result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::ok(id, value),
            Err(e) => Self::err(id, &e),
        }
    }
}

/// Snapshot bytes as they travel in a response.
pub fn encode_image(bytes: &[u8]) -> Value {
    Value::String(BASE64.encode(bytes))
}
