use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ToolError;
use crate::gateway::{GatewayCall, GatewayClient, SuccessBody};
use crate::session::SessionStore;

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn no_arguments() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

fn api_id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "api_id": { "type": "string", "description": description }
        },
        "required": ["api_id"],
        "additionalProperties": false
    })
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "set_credentials",
            description: "Set the base URL (e.g. https://example.com/rest/apigateway) and Basic Auth credentials for the webMethods API Gateway. Must be called before any other tool.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "base_url": { "type": "string", "description": "Gateway REST base URL" },
                    "username": { "type": "string" },
                    "password": { "type": "string" }
                },
                "required": ["base_url", "username", "password"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_all_apis",
            description: "Retrieve all APIs from the API Gateway.",
            input_schema: no_arguments(),
        },
        ToolDefinition {
            name: "get_all_users",
            description: "Retrieve all users from the API Gateway.",
            input_schema: no_arguments(),
        },
        ToolDefinition {
            name: "create_user",
            description: "Create a new user in the API Gateway.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "first_name": { "type": "string" },
                    "last_name": { "type": "string" },
                    "login_id": { "type": "string", "description": "Login ID / username of the new user" },
                    "email": { "type": "string" },
                    "password": { "type": "string" },
                    "allow_digest_auth": { "type": "boolean", "default": false }
                },
                "required": ["first_name", "last_name", "login_id", "email", "password"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_all_applications",
            description: "Retrieve all applications from the API Gateway.",
            input_schema: no_arguments(),
        },
        ToolDefinition {
            name: "get_api_transactions",
            description: "Retrieve API transactions (runtime events) from the API Gateway.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "duration": { "type": "string", "description": "Duration filter, e.g. '3d'" },
                    "start_date": { "type": "string", "description": "'YYYY-MM-DD HH:MM:SS'" },
                    "end_date": { "type": "string", "description": "'YYYY-MM-DD HH:MM:SS'" },
                    "event_type": { "type": "string", "default": "ALL", "description": "e.g. 'ALL', 'ERROR'" }
                },
                "required": ["duration", "start_date", "end_date"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create_application",
            description: "Create a new application in the API Gateway. Omitted list fields are sent as empty lists.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "version": { "type": "string" },
                    "identifiers": {
                        "type": "array",
                        "description": "Identifier objects (name, key, value[])",
                        "items": { "type": "object" }
                    },
                    "consuming_apis": { "type": "array", "items": {} },
                    "is_suspended": { "type": "boolean", "default": false },
                    "new_apis_for_association": { "type": "array", "items": { "type": "string" } },
                    "auth_strategy_ids": { "type": "array", "items": { "type": "string" } },
                    "teams": { "type": "array", "items": { "type": "object" } },
                    "contact_emails": { "type": "array", "items": { "type": "string" } },
                    "site_urls": { "type": "array", "items": { "type": "string" } },
                    "js_origins": { "type": "array", "items": { "type": "string" } },
                    "restrict_view_asset": { "type": "boolean", "default": false }
                },
                "required": ["name", "description", "version", "identifiers"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "associate_apis_with_application",
            description: "Associate one or more APIs with an existing application.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "application_id": { "type": "string" },
                    "api_ids": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["application_id", "api_ids"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "delete_application",
            description: "Delete an application from the API Gateway.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "application_id": { "type": "string" }
                },
                "required": ["application_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_api_details",
            description: "Retrieve details of a specific API by its ID.",
            input_schema: api_id_schema("Unique ID of the API"),
        },
        ToolDefinition {
            name: "delete_api",
            description: "Delete a specific API from the API Gateway.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "api_id": { "type": "string" },
                    "force_delete": { "type": "boolean", "default": true }
                },
                "required": ["api_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "activate_api",
            description: "Activate a specific API.",
            input_schema: api_id_schema("Unique ID of the API to activate"),
        },
        ToolDefinition {
            name: "deactivate_api",
            description: "Deactivate a specific API.",
            input_schema: api_id_schema("Unique ID of the API to deactivate"),
        },
        ToolDefinition {
            name: "create_api_from_swagger",
            description: "Create a new API by uploading a local Swagger/OpenAPI file.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Absolute path to the Swagger/OpenAPI file" },
                    "api_name": { "type": "string" },
                    "api_description": { "type": "string" },
                    "api_version": { "type": "string", "default": "1.0" },
                    "api_type": { "type": "string", "default": "swagger" }
                },
                "required": ["file_path", "api_name", "api_description"],
                "additionalProperties": false
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct SetCredentialsArgs {
    base_url: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct CreateUserArgs {
    first_name: String,
    last_name: String,
    login_id: String,
    email: String,
    password: String,
    #[serde(default)]
    allow_digest_auth: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserPayload {
    first_name: String,
    last_name: String,
    login_id: String,
    email_addresses: Vec<String>,
    password: String,
    allow_digest_auth: bool,
}

impl From<CreateUserArgs> for CreateUserPayload {
    fn from(args: CreateUserArgs) -> Self {
        Self {
            first_name: args.first_name,
            last_name: args.last_name,
            login_id: args.login_id,
            email_addresses: vec![args.email],
            password: args.password,
            allow_digest_auth: args.allow_digest_auth,
        }
    }
}

fn default_event_type() -> String {
    "ALL".to_string()
}

#[derive(Debug, Deserialize)]
struct ApiTransactionsArgs {
    duration: String,
    start_date: String,
    end_date: String,
    #[serde(default = "default_event_type")]
    event_type: String,
}

#[derive(Debug, Deserialize)]
struct CreateApplicationArgs {
    name: String,
    description: String,
    version: String,
    identifiers: Vec<Value>,
    consuming_apis: Option<Vec<Value>>,
    #[serde(default)]
    is_suspended: bool,
    new_apis_for_association: Option<Vec<String>>,
    auth_strategy_ids: Option<Vec<String>>,
    teams: Option<Vec<Value>>,
    contact_emails: Option<Vec<String>>,
    site_urls: Option<Vec<String>>,
    js_origins: Option<Vec<String>>,
    #[serde(default)]
    restrict_view_asset: bool,
}

/// Application as the gateway expects it; every list is always present.
#[derive(Debug, Serialize)]
struct ApplicationPayload {
    name: String,
    description: String,
    version: String,
    #[serde(rename = "contactEmails")]
    contact_emails: Vec<String>,
    #[serde(rename = "siteURLs")]
    site_urls: Vec<String>,
    identifiers: Vec<Value>,
    #[serde(rename = "consumingAPIs")]
    consuming_apis: Vec<Value>,
    #[serde(rename = "isSuspended")]
    is_suspended: bool,
    #[serde(rename = "newApisForAssociation")]
    new_apis_for_association: Vec<String>,
    #[serde(rename = "jsOrigins")]
    js_origins: Vec<String>,
    #[serde(rename = "authStrategyIds")]
    auth_strategy_ids: Vec<String>,
    #[serde(rename = "restrictViewAsset")]
    restrict_view_asset: bool,
    teams: Vec<Value>,
}

impl From<CreateApplicationArgs> for ApplicationPayload {
    fn from(args: CreateApplicationArgs) -> Self {
        Self {
            name: args.name,
            description: args.description,
            version: args.version,
            contact_emails: args.contact_emails.unwrap_or_default(),
            site_urls: args.site_urls.unwrap_or_default(),
            identifiers: args.identifiers,
            consuming_apis: args.consuming_apis.unwrap_or_default(),
            is_suspended: args.is_suspended,
            new_apis_for_association: args.new_apis_for_association.unwrap_or_default(),
            js_origins: args.js_origins.unwrap_or_default(),
            auth_strategy_ids: args.auth_strategy_ids.unwrap_or_default(),
            restrict_view_asset: args.restrict_view_asset,
            teams: args.teams.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssociateApisArgs {
    application_id: String,
    api_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AssociateApisPayload {
    #[serde(rename = "apiIDs")]
    api_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApplicationIdArgs {
    application_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiIdArgs {
    api_id: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct DeleteApiArgs {
    api_id: String,
    #[serde(default = "default_true")]
    force_delete: bool,
}

fn default_api_version() -> String {
    "1.0".to_string()
}

fn default_api_type() -> String {
    "swagger".to_string()
}

#[derive(Debug, Deserialize)]
struct CreateApiFromFileArgs {
    file_path: String,
    api_name: String,
    api_description: String,
    #[serde(default = "default_api_version")]
    api_version: String,
    #[serde(default = "default_api_type")]
    api_type: String,
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args)).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Tool registry bound to one session store.
#[derive(Debug, Clone)]
pub struct GatewayTools {
    sessions: SessionStore,
    gateway: GatewayClient,
}

impl GatewayTools {
    pub fn new(sessions: SessionStore, gateway: GatewayClient) -> Self {
        Self { sessions, gateway }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        args: Map<String, Value>,
    ) -> Result<Value, ToolError> {
        match tool_name {
            "set_credentials" => self.set_credentials(parse_args(tool_name, args)?),
            "get_all_apis" => self.call(GatewayCall::get("/apis")).await,
            "get_all_users" => self.call(GatewayCall::get("/users")).await,
            "create_user" => self.create_user(parse_args(tool_name, args)?).await,
            "get_all_applications" => self.call(GatewayCall::get("/applications")).await,
            "get_api_transactions" => {
                self.get_api_transactions(parse_args(tool_name, args)?)
                    .await
            }
            "create_application" => {
                self.create_application(parse_args(tool_name, args)?)
                    .await
            }
            "associate_apis_with_application" => {
                self.associate_apis(parse_args(tool_name, args)?).await
            }
            "delete_application" => {
                self.delete_application(parse_args(tool_name, args)?)
                    .await
            }
            "get_api_details" => {
                let args: ApiIdArgs = parse_args(tool_name, args)?;
                self.call(GatewayCall::get(format!("/apis/{}", args.api_id)))
                    .await
            }
            "delete_api" => self.delete_api(parse_args(tool_name, args)?).await,
            "activate_api" => {
                self.toggle_api(parse_args(tool_name, args)?, "activate", "activated")
                    .await
            }
            "deactivate_api" => {
                self.toggle_api(parse_args(tool_name, args)?, "deactivate", "deactivated")
                    .await
            }
            "create_api_from_swagger" => {
                self.create_api_from_file(parse_args(tool_name, args)?)
                    .await
            }
            _ => Err(ToolError::UnknownTool(tool_name.to_string())),
        }
    }

    async fn call(&self, call: GatewayCall) -> Result<Value, ToolError> {
        let session = self.sessions.current()?;
        self.gateway.send(&session, call).await
    }

    fn set_credentials(&self, args: SetCredentialsArgs) -> Result<Value, ToolError> {
        Ok(self
            .sessions
            .configure(&args.base_url, &args.username, &args.password))
    }

    async fn create_user(&self, args: CreateUserArgs) -> Result<Value, ToolError> {
        let payload = CreateUserPayload::from(args);
        let call = GatewayCall::post("/users")
            .json(&payload)?
            .success_codes(&[200, 201])
            .on_success(SuccessBody::Decode {
                note: "User created successfully but response is not JSON.".to_string(),
            });
        self.call(call).await
    }

    async fn get_api_transactions(&self, args: ApiTransactionsArgs) -> Result<Value, ToolError> {
        let call = GatewayCall::get("/apitransactions")
            .query("duration", args.duration)
            .query("startDate", args.start_date)
            .query("endDate", args.end_date)
            .query("eventType", args.event_type);
        self.call(call).await
    }

    async fn create_application(&self, args: CreateApplicationArgs) -> Result<Value, ToolError> {
        let payload = ApplicationPayload::from(args);
        let call = GatewayCall::post("/applications")
            .json(&payload)?
            .success_codes(&[200, 201])
            .on_success(SuccessBody::Decode {
                note: "Application created successfully, but response is not JSON.".to_string(),
            });
        self.call(call).await
    }

    async fn associate_apis(&self, args: AssociateApisArgs) -> Result<Value, ToolError> {
        let payload = AssociateApisPayload {
            api_ids: args.api_ids,
        };
        let call = GatewayCall::post(format!("/applications/{}/apis", args.application_id))
            .json(&payload)?
            .success_codes(&[200, 201])
            .on_success(SuccessBody::Decode {
                note: "APIs successfully associated with the application, but response is not JSON."
                    .to_string(),
            });
        self.call(call).await
    }

    async fn delete_application(&self, args: ApplicationIdArgs) -> Result<Value, ToolError> {
        let call = GatewayCall::delete(format!("/applications/{}", args.application_id))
            .success_codes(&[200, 204])
            .on_success(SuccessBody::Acknowledge {
                message: format!("Application {} deleted successfully.", args.application_id),
            });
        self.call(call).await
    }

    async fn delete_api(&self, args: DeleteApiArgs) -> Result<Value, ToolError> {
        let mut call = GatewayCall::delete(format!("/apis/{}", args.api_id))
            .success_codes(&[200, 204])
            .on_success(SuccessBody::Acknowledge {
                message: format!("API {} deleted successfully.", args.api_id),
            });
        if args.force_delete {
            call = call.query("forceDelete", "true");
        }
        self.call(call).await
    }

    async fn toggle_api(
        &self,
        args: ApiIdArgs,
        action: &str,
        past_tense: &str,
    ) -> Result<Value, ToolError> {
        let call = GatewayCall::put(format!("/apis/{}/{action}", args.api_id))
            .success_codes(&[200, 204])
            .on_success(SuccessBody::DecodeOrAcknowledge {
                message: format!("API {} {past_tense} successfully.", args.api_id),
                non_json_message: format!(
                    "API {} {past_tense} successfully (non-JSON response).",
                    args.api_id
                ),
            });
        self.call(call).await
    }

    async fn create_api_from_file(&self, args: CreateApiFromFileArgs) -> Result<Value, ToolError> {
        let session = self.sessions.current()?;

        let contents = match tokio::fs::read(&args.file_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::FileNotFound {
                    path: args.file_path,
                });
            }
            Err(source) => {
                return Err(ToolError::FileRead {
                    path: args.file_path,
                    source,
                });
            }
        };
        let file_name = Path::new(&args.file_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.file_path.clone());

        let form = Form::new()
            .part("file", Part::bytes(contents).file_name(file_name))
            .text("apiName", args.api_name)
            .text("type", args.api_type)
            .text("apiDescription", args.api_description)
            .text("apiVersion", args.api_version);
        let call = GatewayCall::post("/apis")
            .multipart(form)
            .success_codes(&[200, 201]);
        self.gateway.send(&session, call).await
    }
}
