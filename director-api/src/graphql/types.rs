use async_graphql::{Enum, InputObject, SimpleObject};
use chrono::{DateTime, Utc};
use director_core::{Application, ApplicationInput, Webhook, WebhookInput};

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[graphql(name = "OperationMode", remote = "director_core::OperationMode")]
pub enum GqlOperationMode {
    #[default]
    Sync,
    Async,
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
#[graphql(name = "StatusCondition", remote = "director_core::StatusCondition")]
pub enum GqlStatusCondition {
    Initial,
    CreateSucceeded,
    CreateFailed,
    UpdateSucceeded,
    UpdateFailed,
    DeleteFailed,
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
#[graphql(name = "WebhookType", remote = "director_core::WebhookType")]
pub enum GqlWebhookType {
    RegisterApplication,
    UnregisterApplication,
    ConfigurationChanged,
}

#[derive(SimpleObject, Debug, Clone)]
#[graphql(name = "Application")]
pub struct ApplicationObject {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub ready: bool,
    pub error: Option<String>,
    pub status_condition: GqlStatusCondition,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<Application> for ApplicationObject {
    fn from(app: Application) -> Self {
        Self {
            id: app.id,
            name: app.name,
            description: app.description,
            ready: app.lifecycle.ready,
            error: app.lifecycle.error,
            status_condition: app.status_condition.into(),
            created_at: app.lifecycle.created_at,
            updated_at: app.lifecycle.updated_at,
            deleted_at: app.lifecycle.deleted_at,
        }
    }
}

#[derive(SimpleObject, Debug, Clone)]
#[graphql(name = "Webhook")]
pub struct WebhookObject {
    pub id: String,
    #[graphql(name = "applicationID")]
    pub application_id: String,
    pub webhook_type: GqlWebhookType,
    pub url: String,
}

impl From<Webhook> for WebhookObject {
    fn from(webhook: Webhook) -> Self {
        Self {
            id: webhook.id,
            application_id: webhook.application_id,
            webhook_type: webhook.webhook_type.into(),
            url: webhook.url,
        }
    }
}

#[derive(InputObject, Debug, Clone)]
#[graphql(name = "WebhookInput")]
pub struct WebhookInputObject {
    pub webhook_type: GqlWebhookType,
    pub url: String,
}

impl From<WebhookInputObject> for WebhookInput {
    fn from(input: WebhookInputObject) -> Self {
        Self {
            webhook_type: input.webhook_type.into(),
            url: input.url,
        }
    }
}

#[derive(InputObject, Debug, Clone)]
pub struct ApplicationRegisterInput {
    pub name: String,
    pub description: Option<String>,
    #[graphql(default)]
    pub webhooks: Vec<WebhookInputObject>,
}

impl From<ApplicationRegisterInput> for ApplicationInput {
    fn from(input: ApplicationRegisterInput) -> Self {
        Self {
            name: input.name,
            description: input.description,
            webhooks: input.webhooks.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(InputObject, Debug, Clone)]
pub struct ApplicationUpdateInput {
    pub name: String,
    pub description: Option<String>,
}

impl From<ApplicationUpdateInput> for ApplicationInput {
    fn from(input: ApplicationUpdateInput) -> Self {
        Self {
            name: input.name,
            description: input.description,
            webhooks: Vec::new(),
        }
    }
}
