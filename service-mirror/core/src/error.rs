use thiserror::Error;

/// Errors surfaced while parsing a `Link` or its credential Secret.
///
/// These are never retried: the Config Watcher logs them at `error` and
/// leaves the Link un-watched until its spec changes.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link {0} is missing required field `{1}`")]
    MissingField(String, &'static str),

    #[error("link {0} has an invalid label selector: {1}")]
    InvalidSelector(String, String),

    #[error("link {0} has an invalid probe spec: {1}")]
    InvalidProbeSpec(String, String),

    #[error("secret {0} for link {1} is missing key `kubeconfig`")]
    MissingKubeconfig(String, String),

    #[error("secret {0} for link {1} carries a kubeconfig that could not be parsed: {2}")]
    InvalidKubeconfig(String, String, String),

    #[error("a cluster watcher named {0} is already registered")]
    AlreadyRegistered(String),
}

/// Errors surfaced by a single reconciliation attempt.
///
/// Each variant is either absorbed as an idempotent no-op or retried up to
/// the configured requeue limit; nothing here aborts the reconciler task.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("local API error: {0}")]
    Api(#[from] ApiError),

    #[error("remote API error: {0}")]
    Remote(ApiError),

    #[error("gateway could not be resolved: {0}")]
    GatewayUnresolved(String),
}

/// A normalized view over `kube::Error` that distinguishes the
/// idempotence-relevant cases (not-found on delete, already-exists on
/// create) from genuinely transient failures.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("transient API error: {0}")]
    Transient(String),
}

impl ApiError {
    pub fn is_absorbable_on_delete(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }

    pub fn is_absorbable_on_create(&self) -> bool {
        matches!(self, ApiError::AlreadyExists)
    }
}
