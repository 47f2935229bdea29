use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use onvif_client_core::OnvifCoreError;
use onvif_client_core::endpoint::Directory;
use tracing::debug;

pub(crate) type DirectoryResult = Result<Arc<Directory>, OnvifCoreError>;
pub(crate) type Bootstrap = Shared<BoxFuture<'static, DirectoryResult>>;

enum Slot {
    Empty,
    Pending {
        bootstrap: Bootstrap,
        /// Services invalidated while the bootstrap was in flight.
        dropped: HashSet<String>,
    },
    Ready {
        directory: Arc<Directory>,
        /// Services invalidated since the directory was fetched.
        dropped: HashSet<String>,
    },
}

struct CacheState {
    generation: u64,
    slot: Slot,
}

pub(crate) enum Lookup {
    Ready(Arc<Directory>),
    /// Await the bootstrap, then hand the result to [`EndpointCache::complete`].
    Pending { generation: u64, bootstrap: Bootstrap },
}

/// The device's service directory, fetched at most once at a time.
///
/// Every caller that finds no usable directory joins the same in-flight bootstrap.
/// Invalidation bumps the generation, so a bootstrap started before it cannot
/// overwrite what comes after.
pub(crate) struct EndpointCache {
    state: Mutex<CacheState>,
}

impl EndpointCache {
    pub(crate) fn new() -> Self {
        EndpointCache {
            state: Mutex::new(CacheState {
                generation: 0,
                slot: Slot::Empty,
            }),
        }
    }

    /// Returns the cached directory, or joins or starts a bootstrap. `start` is only
    /// called when nothing is cached or in flight, or when `service` was invalidated.
    pub(crate) fn lookup(
        &self,
        service: &str,
        start: impl FnOnce() -> BoxFuture<'static, DirectoryResult>,
    ) -> Lookup {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        match &state.slot {
            Slot::Ready { directory, dropped } if !dropped.contains(service) => {
                return Lookup::Ready(Arc::clone(directory));
            }
            Slot::Pending { bootstrap, .. } => {
                return Lookup::Pending {
                    generation: state.generation,
                    bootstrap: bootstrap.clone(),
                };
            }
            Slot::Ready { .. } | Slot::Empty => {}
        }

        state.generation += 1;
        debug!(generation = state.generation, %service, "starting service directory bootstrap");
        let bootstrap = start().shared();
        state.slot = Slot::Pending {
            bootstrap: bootstrap.clone(),
            dropped: HashSet::new(),
        };

        Lookup::Pending {
            generation: state.generation,
            bootstrap,
        }
    }

    /// Stores a finished bootstrap. Failures are not cached, so the next lookup tries again.
    /// Services invalidated while it was in flight stay dropped.
    pub(crate) fn complete(&self, generation: u64, result: &DirectoryResult) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation != generation {
            return;
        }
        let Slot::Pending { dropped, .. } = &mut state.slot else {
            return;
        };
        let dropped = std::mem::take(dropped);

        state.slot = match result {
            Ok(directory) => {
                let mut directory = Arc::clone(directory);
                for service in &dropped {
                    debug!(%service, "dropping service invalidated during bootstrap");
                    Arc::make_mut(&mut directory).remove(service);
                }
                Slot::Ready { directory, dropped }
            }
            Err(_) => Slot::Empty,
        };
    }

    /// Drops one service, or everything.
    pub(crate) fn invalidate(&self, service: Option<&str>) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        match service {
            None => {
                state.generation += 1;
                state.slot = Slot::Empty;
            }
            Some(service) => {
                let service = service.to_lowercase();
                match &mut state.slot {
                    Slot::Ready { directory, dropped } => {
                        Arc::make_mut(directory).remove(&service);
                        dropped.insert(service);
                    }
                    Slot::Pending { dropped, .. } => {
                        dropped.insert(service);
                    }
                    Slot::Empty => {}
                }
            }
        }
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).generation
    }
}
