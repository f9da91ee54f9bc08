//! Request interceptor.
//!
//! Every dispatched call passes through [`ErrorInterceptor::intercept`], which
//! logs failing methods by their fully-qualified name and applies the
//! configured [`HandlerErrorPolicy`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::CsiError;
use crate::message::CsiMessage;

/// What to do when a handler returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HandlerErrorPolicy {
    /// Log the failure and return it to the caller.
    #[default]
    Forward,
    /// Log the failure and terminate the process.
    Terminate,
}

/// Action run for a failing call under [`HandlerErrorPolicy::Terminate`].
pub type FatalHook = Arc<dyn Fn(&str, &CsiError) + Send + Sync>;

/// Observes the outcome of every call.
#[derive(Clone)]
pub struct ErrorInterceptor {
    policy: HandlerErrorPolicy,
    on_fatal: FatalHook,
}

impl ErrorInterceptor {
    /// Create an interceptor.  Under [`HandlerErrorPolicy::Terminate`] a
    /// failing call exits the process with status 1.
    pub fn new(policy: HandlerErrorPolicy) -> Self {
        Self {
            policy,
            on_fatal: Arc::new(|_, _| std::process::exit(1)),
        }
    }

    /// Replace the action taken under [`HandlerErrorPolicy::Terminate`].
    /// If the hook returns, the error is forwarded to the caller.
    pub fn with_fatal_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &CsiError) + Send + Sync + 'static,
    {
        self.on_fatal = Arc::new(hook);
        self
    }

    pub(crate) fn with_shared_fatal_hook(mut self, hook: FatalHook) -> Self {
        self.on_fatal = hook;
        self
    }

    pub fn policy(&self) -> HandlerErrorPolicy {
        self.policy
    }

    /// Run `handler` for `method` and observe its result.  Successful
    /// responses are returned unchanged.
    pub async fn intercept<F>(&self, method: &str, handler: F) -> Result<CsiMessage, CsiError>
    where
        F: Future<Output = Result<CsiMessage, CsiError>>,
    {
        match handler.await {
            Ok(resp) => {
                debug!(%method, %resp, "method succeeded");
                Ok(resp)
            }
            Err(e) => {
                error!(%method, error = %e, "method failed");
                if self.policy == HandlerErrorPolicy::Terminate {
                    (self.on_fatal)(method, &e);
                }
                Err(e)
            }
        }
    }
}

impl fmt::Debug for ErrorInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorInterceptor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn success_passes_through() {
        let i = ErrorInterceptor::new(HandlerErrorPolicy::Terminate)
            .with_fatal_hook(|m, _| panic!("fatal hook called for {m}"));
        let resp = i
            .intercept("/csi.v1.Identity/Probe", async {
                Ok(CsiMessage::ProbeResult(true))
            })
            .await
            .unwrap();
        assert!(matches!(resp, CsiMessage::ProbeResult(true)));
    }

    #[tokio::test]
    async fn forward_returns_the_original_error() {
        let i = ErrorInterceptor::new(HandlerErrorPolicy::Forward);
        let err = i
            .intercept("/csi.v1.Controller/DeleteVolume", async {
                Err(CsiError::VolumeNotFound("v1".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, CsiError::VolumeNotFound("v1".into()));
    }

    #[tokio::test]
    async fn terminate_runs_the_fatal_hook_with_the_method() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = Arc::clone(&seen);
        let i = ErrorInterceptor::new(HandlerErrorPolicy::Terminate).with_fatal_hook(
            move |method, err| {
                hook_seen
                    .lock()
                    .unwrap()
                    .push(format!("{method}: {err}"));
            },
        );

        let _ = i
            .intercept("/csi.v1.Controller/CreateVolume", async {
                Err(CsiError::InvalidArgument("name is required".into()))
            })
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["/csi.v1.Controller/CreateVolume: invalid argument: name is required".to_owned()]
        );
    }

    #[test]
    fn policy_parses_from_lowercase() {
        let p: HandlerErrorPolicy = serde_json::from_str(r#""terminate""#).unwrap();
        assert_eq!(p, HandlerErrorPolicy::Terminate);
        assert_eq!(HandlerErrorPolicy::default(), HandlerErrorPolicy::Forward);
    }
}
