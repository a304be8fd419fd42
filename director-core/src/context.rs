//! Per-request state threaded through resolvers, directives and repositories.

use crate::error::{OperationError, Result};
use crate::operation::{Operation, OperationMode};
use crate::persistence::PersistenceTx;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

pub type Headers = BTreeMap<String, Vec<String>>;

/// Resolves the tenant a request acts on behalf of.
pub type TenantLoaderFn = Arc<dyn Fn(&RequestContext) -> Result<String> + Send + Sync>;

/// Default tenant loader: reads the tenant stored in the context.
pub fn load_tenant(ctx: &RequestContext) -> Result<String> {
    ctx.tenant().map(str::to_string)
}

pub fn default_tenant_loader() -> TenantLoaderFn {
    Arc::new(load_tenant)
}

/// Immutable bag of request-scoped values. Every `with_*` returns a derived copy.
#[derive(Clone, Default)]
pub struct RequestContext {
    tenant: Option<String>,
    correlation_id: Option<String>,
    headers: Option<Arc<Headers>>,
    mode: Option<OperationMode>,
    tx: Option<Arc<dyn PersistenceTx>>,
    operations: Option<OperationsCollector>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(Arc::new(headers));
        self
    }

    pub fn with_mode(mut self, mode: OperationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_transaction(mut self, tx: Arc<dyn PersistenceTx>) -> Self {
        self.tx = Some(tx);
        self
    }

    pub fn with_operations(mut self, operations: OperationsCollector) -> Self {
        self.operations = Some(operations);
        self
    }

    pub fn tenant(&self) -> Result<&str> {
        self.tenant.as_deref().ok_or(OperationError::TenantRequired)
    }

    /// Mode of the current mutation. Absent means SYNC.
    pub fn mode(&self) -> OperationMode {
        self.mode.unwrap_or_default()
    }

    pub fn transaction(&self) -> Result<&Arc<dyn PersistenceTx>> {
        self.tx
            .as_ref()
            .ok_or_else(|| OperationError::internal("no transaction in request context"))
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn headers(&self) -> Option<&Headers> {
        self.headers.as_deref()
    }

    pub fn operations(&self) -> Option<&OperationsCollector> {
        self.operations.as_ref()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("tenant", &self.tenant)
            .field("correlation_id", &self.correlation_id)
            .field("mode", &self.mode)
            .field("has_transaction", &self.tx.is_some())
            .field("operations", &self.operations.as_ref().map(|o| o.len()))
            .finish()
    }
}

/// Opaque reference to an operation registered in an [`OperationsCollector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationHandle(u64);

#[derive(Default)]
struct CollectorInner {
    next: u64,
    entries: Vec<(u64, Operation)>,
}

/// Request-scoped, ordered list of the asynchronous operations scheduled by a
/// single request. Clones share the same list.
#[derive(Clone, Default)]
pub struct OperationsCollector {
    inner: Arc<Mutex<CollectorInner>>,
}

impl OperationsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, operation: Operation) -> OperationHandle {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next;
        inner.next += 1;
        inner.entries.push((id, operation));
        OperationHandle(id)
    }

    /// Replaces a registered operation. Unknown handles are ignored.
    pub fn update(&self, handle: OperationHandle, operation: Operation) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = inner.entries.iter_mut().find(|(id, _)| *id == handle.0) {
            entry.1 = operation;
        }
    }

    pub fn discard(&self, handle: OperationHandle) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.retain(|(id, _)| *id != handle.0);
    }

    /// Operations in registration order.
    pub fn snapshot(&self) -> Vec<Operation> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.iter().map(|(_, op)| op.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for OperationsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationsCollector")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationType;

    #[test]
    fn test_tenant_is_required() {
        let ctx = RequestContext::new();
        assert!(ctx.tenant().unwrap_err().is_tenant_required());

        let ctx = ctx.with_tenant("t1");
        assert_eq!(ctx.tenant().unwrap(), "t1");
        assert_eq!(load_tenant(&ctx).unwrap(), "t1");
    }

    #[test]
    fn test_mode_defaults_to_sync() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.mode(), OperationMode::Sync);
        assert_eq!(ctx.with_mode(OperationMode::Async).mode(), OperationMode::Async);
    }

    #[test]
    fn test_missing_transaction_is_internal_error() {
        let err = RequestContext::new().transaction().err().expect("expected an error");
        assert!(matches!(err, OperationError::Internal(_)));
    }

    #[test]
    fn test_derived_context_leaves_parent_untouched() {
        let parent = RequestContext::new().with_tenant("t1");
        let child = parent.clone().with_correlation_id("corr");

        assert_eq!(child.correlation_id(), Some("corr"));
        assert_eq!(parent.correlation_id(), None);
    }

    #[test]
    fn test_collector_keeps_registration_order() {
        let collector = OperationsCollector::new();
        let first = collector.register(Operation::new(OperationType::Create, "registerApplication"));
        let second = collector.register(Operation::new(OperationType::Delete, "unregisterApplication"));
        assert_ne!(first, second);

        let ops = collector.snapshot();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].operation_category, "registerApplication");
        assert_eq!(ops[1].operation_category, "unregisterApplication");
    }

    #[test]
    fn test_collector_update_and_discard() {
        let collector = OperationsCollector::new();
        let handle = collector.register(Operation::new(OperationType::Create, "registerApplication"));
        let kept = collector.register(Operation::new(OperationType::Update, "updateApplication"));

        let mut op = Operation::new(OperationType::Create, "registerApplication");
        op.resource_id = "app-1".to_string();
        collector.update(handle, op);
        assert_eq!(collector.snapshot()[0].resource_id, "app-1");

        collector.discard(handle);
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.snapshot()[0].operation_category, "updateApplication");

        collector.discard(kept);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_collector_clones_share_state() {
        let collector = OperationsCollector::new();
        let shared = collector.clone();
        shared.register(Operation::new(OperationType::Create, "registerApplication"));
        assert_eq!(collector.len(), 1);
    }
}
