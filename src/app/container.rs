//! Named services, loaded lazily and cached for the life of the container.

use crate::domain::error::{HttpError, ProtocolError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::OnceCell;

pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

type LoadFuture = BoxFuture<'static, anyhow::Result<ServiceHandle>>;
type LoadFn = Arc<dyn Fn(Container) -> LoadFuture + Send + Sync>;
type UnloadFn = Arc<dyn Fn(ServiceHandle) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("The service \"{0}\" is not defined")]
    Undefined(String),

    #[error("The service \"{name}\" failed to load")]
    Load {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("The service \"{name}\" is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("The container has been shut down")]
    ShutDown,

    #[error("Unable to unload: {}", .0.join(", "))]
    Unload(Vec<String>),
}

impl From<ServiceError> for HttpError {
    fn from(err: ServiceError) -> Self {
        HttpError::Internal(anyhow::Error::new(err))
    }
}

impl From<ServiceError> for ProtocolError {
    fn from(err: ServiceError) -> Self {
        ProtocolError::Collaborator(anyhow::Error::new(err))
    }
}

/// How a service comes to life.
#[derive(Clone)]
pub enum ServiceDef {
    /// Built on first use; nothing to release.
    Factory(LoadFn),
    /// Built on first use and released by `unload` at shutdown.
    Managed { load: LoadFn, unload: UnloadFn },
}

impl ServiceDef {
    pub fn factory<T, F, Fut>(build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        ServiceDef::Factory(erase_load(build))
    }

    pub fn managed<T, L, LFut, U, UFut>(load: L, unload: U) -> Self
    where
        T: Send + Sync + 'static,
        L: Fn(Container) -> LFut + Send + Sync + 'static,
        LFut: Future<Output = anyhow::Result<T>> + Send + 'static,
        U: Fn(Arc<T>) -> UFut + Send + Sync + 'static,
        UFut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let unload = Arc::new(move |handle: ServiceHandle| match handle.downcast::<T>() {
            Ok(service) => unload(service).boxed(),
            Err(_) => {
                async { Err(anyhow::anyhow!("service handle has an unexpected type")) }.boxed()
            }
        });
        ServiceDef::Managed {
            load: erase_load(load),
            unload,
        }
    }

    /// A ready-made instance shared by every caller.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::shared(Arc::new(value))
    }

    /// Like [`ServiceDef::value`] for an instance that is already shared elsewhere.
    pub fn shared<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        ServiceDef::Factory(Arc::new(move |_: Container| {
            let handle: ServiceHandle = value.clone();
            async move { Ok(handle) }.boxed()
        }))
    }
}

fn erase_load<T, F, Fut>(build: F) -> LoadFn
where
    T: Send + Sync + 'static,
    F: Fn(Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move |container: Container| {
        let pending = build(container);
        async move {
            let service: ServiceHandle = Arc::new(pending.await?);
            Ok(service)
        }
        .boxed()
    })
}

struct Entry {
    name: String,
    def: ServiceDef,
    instance: OnceCell<ServiceHandle>,
    unloaded: AtomicBool,
}

impl Entry {
    /// Runs the managed unload for a loaded instance, at most once.
    async fn unload(&self) -> Option<anyhow::Result<()>> {
        let ServiceDef::Managed { unload, .. } = &self.def else {
            return None;
        };
        let handle = self.instance.get()?;
        if self.unloaded.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(unload(handle.clone()).await)
    }
}

#[derive(Default)]
struct Inner {
    entries: RwLock<Vec<Arc<Entry>>>,
    shut_down: AtomicBool,
}

/// Cheap to clone; every clone sees the same services.
#[derive(Clone, Default)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines (or redefines) a service. A redefinition drops any cached instance.
    pub fn define(&self, name: impl Into<String>, def: ServiceDef) -> &Self {
        let entry = Arc::new(Entry {
            name: name.into(),
            def,
            instance: OnceCell::new(),
            unloaded: AtomicBool::new(false),
        });
        let mut entries = self.inner.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|e| e.name == entry.name) {
            Some(slot) => *slot = entry,
            None => entries.push(entry),
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Loads `name` on first use (one load in flight at a time) and returns the cached instance.
    pub async fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ServiceError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(ServiceError::ShutDown);
        }
        let entry = self
            .entry(name)
            .ok_or_else(|| ServiceError::Undefined(name.to_string()))?;

        let handle = entry
            .instance
            .get_or_try_init(|| {
                tracing::debug!(service = name, "loading service");
                let load = match &entry.def {
                    ServiceDef::Factory(load) => load,
                    ServiceDef::Managed { load, .. } => load,
                };
                load(self.clone())
            })
            .await
            .map_err(|source| ServiceError::Load {
                name: name.to_string(),
                source: source.into(),
            })?;

        // Shutdown began while this load was running.
        if self.inner.shut_down.load(Ordering::SeqCst) {
            if let Some(Err(e)) = entry.unload().await {
                tracing::error!(service = name, error = %e, "service failed to unload");
            }
            return Err(ServiceError::ShutDown);
        }

        handle
            .clone()
            .downcast::<T>()
            .map_err(|_| ServiceError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Unloads every loaded managed service. Runs once; later calls are no-ops.
    ///
    /// Loads still in flight are awaited and then unloaded. A failing unload does
    /// not stop the others; all failures are reported together.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let entries = self.inner.entries.read().unwrap_or_else(|e| e.into_inner()).clone();
        let mut failures = Vec::new();
        for entry in entries {
            if !matches!(entry.def, ServiceDef::Managed { .. }) {
                continue;
            }
            // Waits out a load in flight; an idle cell stays empty.
            let _ = entry
                .instance
                .get_or_try_init(|| async { Err::<ServiceHandle, ()>(()) })
                .await;
            match entry.unload().await {
                None => {}
                Some(Ok(())) => tracing::info!(service = %entry.name, "service unloaded"),
                Some(Err(e)) => {
                    tracing::error!(service = %entry.name, error = %e, "service failed to unload");
                    failures.push(entry.name.clone());
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Unload(failures))
        }
    }

    fn entry(&self, name: &str) -> Option<Arc<Entry>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|e| e.name == name)
            .cloned()
    }
}
