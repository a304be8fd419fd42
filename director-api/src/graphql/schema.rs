use super::into_graphql_error;
use super::types::{
    ApplicationObject, ApplicationRegisterInput, ApplicationUpdateInput, GqlOperationMode,
    WebhookInputObject, WebhookObject,
};
use async_graphql::{Context, Object, Result};
use director_core::context::default_tenant_loader;
use director_core::operation::{
    ConcurrencyArgs, ConcurrencyDirective, Directive, OperationArgs, ResolverContext, Scheduler,
    MODE_PARAM,
};
use director_core::persistence::rollback_unless_committed;
use director_core::{
    ApplicationInput, ApplicationRepository, OperationMode, OperationType,
    RequestContext, TenantLoaderFn, Transactioner, WebhookInput, WebhookRepository, WebhookType,
};
use std::future::Future;
use std::sync::Arc;

const APPLICATION_ID_PARAM: &str = "applicationID";
const ID_PARAM: &str = "id";

/// Collaborators the resolvers run against. Stored as schema data.
#[derive(Clone)]
pub struct Services {
    transact: Arc<dyn Transactioner>,
    applications: ApplicationRepository,
    webhooks: WebhookRepository,
    tenant_loader: TenantLoaderFn,
    directive: Directive,
    concurrency: ConcurrencyDirective,
}

impl Services {
    pub fn new(transact: Arc<dyn Transactioner>, scheduler: Arc<dyn Scheduler>) -> Self {
        let applications = ApplicationRepository::new();
        let webhooks = WebhookRepository::new();
        let tenant_loader = default_tenant_loader();

        let directive = Directive::new(
            transact.clone(),
            Arc::new(webhooks.clone()),
            Arc::new(applications.clone()),
            tenant_loader.clone(),
            scheduler,
        );
        let concurrency = ConcurrencyDirective::new(
            transact.clone(),
            Arc::new(applications.clone()),
            tenant_loader.clone(),
        );

        Self {
            transact,
            applications,
            webhooks,
            tenant_loader,
            directive,
            concurrency,
        }
    }

    fn tenant(&self, ctx: &RequestContext) -> Result<String> {
        (self.tenant_loader)(ctx).map_err(into_graphql_error)
    }

    /// Runs a read in its own transaction.
    async fn read<T, F, Fut>(&self, ctx: &RequestContext, f: F) -> director_core::Result<T>
    where
        F: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = director_core::Result<T>>,
    {
        let tx = self.transact.begin().await?;
        let result = f(ctx.clone().with_transaction(tx.clone())).await;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                rollback_unless_committed(&tx).await;
                Err(e)
            }
        }
    }
}

fn mutation_context(field: &str, mode: GqlOperationMode) -> Result<ResolverContext> {
    ResolverContext::new("Mutation", field)
        .with_arg(MODE_PARAM, OperationMode::from(mode))
        .map_err(into_graphql_error)
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn application(&self, ctx: &Context<'_>, id: String) -> Result<Option<ApplicationObject>> {
        let services = ctx.data::<Services>()?;
        let req = ctx.data::<RequestContext>()?;
        let tenant = services.tenant(req)?;
        let repo = services.applications.clone();

        let result = services
            .read(req, |ctx| async move { repo.get_by_id(&ctx, &tenant, &id).await })
            .await;

        match result {
            Ok(app) => Ok(Some(app.into())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(into_graphql_error(e)),
        }
    }

    async fn applications(&self, ctx: &Context<'_>) -> Result<Vec<ApplicationObject>> {
        let services = ctx.data::<Services>()?;
        let req = ctx.data::<RequestContext>()?;
        let tenant = services.tenant(req)?;
        let repo = services.applications.clone();

        let apps = services
            .read(req, |ctx| async move { repo.list(&ctx, &tenant).await })
            .await
            .map_err(into_graphql_error)?;

        Ok(apps.into_iter().map(Into::into).collect())
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn register_application(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "in")] input: ApplicationRegisterInput,
        #[graphql(default)] mode: GqlOperationMode,
    ) -> Result<ApplicationObject> {
        let services = ctx.data::<Services>()?;
        let req = ctx.data::<RequestContext>()?;
        let tenant = services.tenant(req)?;
        let rctx = mutation_context("registerApplication", mode)?;
        let args = OperationArgs::new(OperationType::Create)
            .webhook_type(WebhookType::RegisterApplication);

        let repo = services.applications.clone();
        let input = ApplicationInput::from(input);
        let app = services
            .directive
            .handle_operation(req, &rctx, &args, move |ctx| async move {
                repo.create(&ctx, &tenant, &input).await
            })
            .await
            .map_err(into_graphql_error)?;

        Ok(app.into())
    }

    async fn update_application(
        &self,
        ctx: &Context<'_>,
        id: String,
        #[graphql(name = "in")] input: ApplicationUpdateInput,
        #[graphql(default)] mode: GqlOperationMode,
    ) -> Result<ApplicationObject> {
        let services = ctx.data::<Services>()?;
        let req = ctx.data::<RequestContext>()?;
        let tenant = services.tenant(req)?;
        let rctx = mutation_context("updateApplication", mode)?
            .with_arg(ID_PARAM, &id)
            .map_err(into_graphql_error)?;
        let args = OperationArgs::new(OperationType::Update)
            .webhook_type(WebhookType::ConfigurationChanged)
            .id_field(ID_PARAM);

        let repo = services.applications.clone();
        let input = ApplicationInput::from(input);
        let app = services
            .directive
            .handle_operation(req, &rctx, &args, move |ctx| async move {
                repo.update(&ctx, &tenant, &id, &input).await
            })
            .await
            .map_err(into_graphql_error)?;

        Ok(app.into())
    }

    async fn unregister_application(
        &self,
        ctx: &Context<'_>,
        id: String,
        #[graphql(default)] mode: GqlOperationMode,
    ) -> Result<ApplicationObject> {
        let services = ctx.data::<Services>()?;
        let req = ctx.data::<RequestContext>()?;
        let tenant = services.tenant(req)?;
        let rctx = mutation_context("unregisterApplication", mode)?
            .with_arg(ID_PARAM, &id)
            .map_err(into_graphql_error)?;
        let args = OperationArgs::new(OperationType::Delete)
            .webhook_type(WebhookType::UnregisterApplication)
            .id_field(ID_PARAM);

        let repo = services.applications.clone();
        let app = services
            .directive
            .handle_operation(req, &rctx, &args, move |ctx| async move {
                repo.delete(&ctx, &tenant, &id).await
            })
            .await
            .map_err(into_graphql_error)?;

        Ok(app.into())
    }

    /// Refused while the parent application is missing or has a create or
    /// delete in flight.
    async fn add_webhook(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "applicationID")] application_id: String,
        #[graphql(name = "in")] input: WebhookInputObject,
    ) -> Result<WebhookObject> {
        let services = ctx.data::<Services>()?;
        let req = ctx.data::<RequestContext>()?;
        let rctx = ResolverContext::new("Mutation", "addWebhook")
            .with_arg(APPLICATION_ID_PARAM, &application_id)
            .map_err(into_graphql_error)?;
        let args = ConcurrencyArgs::new(OperationType::Create).parent_id_field(APPLICATION_ID_PARAM);

        let webhooks = services.webhooks.clone();
        let input = WebhookInput::from(input);
        let webhook = services
            .concurrency
            .handle(req, &rctx, &args, move |ctx| async move {
                webhooks.create(&ctx, &application_id, &input).await
            })
            .await
            .map_err(into_graphql_error)?;

        Ok(webhook.into())
    }
}
