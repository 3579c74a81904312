//! Session registry keyed by physical device path
//!
//! The first path to attach creates the session; it is dropped from the
//! registry once both paths have been released. Player ids are handed out
//! lowest-free to sessions with a bound data path.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::session::ControllerSession;
use crate::{CommandPath, DataPath};

/// Number of player ids available at once
pub const MAX_PLAYERS: u32 = 16;

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<String, Arc<ControllerSession>>,
    players: BTreeSet<u32>,
}

impl RegistryInner {
    fn session(&mut self, physical_path: &str) -> Arc<ControllerSession> {
        if let Some(session) = self.sessions.get(physical_path) {
            return Arc::clone(session);
        }
        debug!(path = physical_path, "Creating controller session");
        let session = Arc::new(ControllerSession::new(physical_path));
        self.sessions
            .insert(physical_path.to_string(), Arc::clone(&session));
        session
    }

    fn allocate_player(&mut self) -> Option<u32> {
        let id = (0..MAX_PLAYERS).find(|id| !self.players.contains(id))?;
        self.players.insert(id);
        Some(id)
    }
}

/// All live controller sessions
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session for a physical path, created if absent
    pub fn acquire(&self, physical_path: &str) -> Arc<ControllerSession> {
        self.inner.lock().session(physical_path)
    }

    pub fn get(&self, physical_path: &str) -> Option<Arc<ControllerSession>> {
        self.inner.lock().sessions.get(physical_path).cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<ControllerSession>> {
        self.inner.lock().sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().sessions.is_empty()
    }

    /// Bind the command path of the controller at `physical_path`
    pub fn attach_command_path(
        &self,
        physical_path: &str,
        path: Arc<dyn CommandPath>,
    ) -> Arc<ControllerSession> {
        let session = self.acquire(physical_path);
        session.bind_command_path(path);
        session
    }

    /// Bind the data path of the controller at `physical_path` and assign it a player id
    pub fn attach_data_path(
        &self,
        physical_path: &str,
        path: Arc<dyn DataPath>,
    ) -> Arc<ControllerSession> {
        let (session, player_id) = {
            let mut inner = self.inner.lock();
            let session = inner.session(physical_path);
            let player_id = match session.player_id() {
                Some(id) => Some(id),
                None => {
                    let id = inner.allocate_player();
                    if id.is_none() {
                        warn!(path = physical_path, "No free player id");
                    }
                    id
                }
            };
            (session, player_id)
        };
        session.bind_data_path(path, player_id);
        session
    }

    pub async fn release_command_path(&self, session: &Arc<ControllerSession>) {
        session.unbind_command_path();
        session.cancel_rumble().await;
        self.remove_if_detached(session);
    }

    pub async fn release_data_path(&self, session: &Arc<ControllerSession>) {
        let player_id = session.unbind_data_path();
        session.cancel_rumble().await;
        if let Some(id) = player_id {
            self.inner.lock().players.remove(&id);
        }
        self.remove_if_detached(session);
    }

    fn remove_if_detached(&self, session: &Arc<ControllerSession>) {
        let mut inner = self.inner.lock();
        if !session.is_detached() {
            return;
        }
        let path = session.physical_path();
        if inner
            .sessions
            .get(path)
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            inner.sessions.remove(path);
            debug!(path, "Controller session freed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SinkError, TransportError};
    use crate::types::{InitStep, InputEvent, SinkDescriptor};
    use crate::InputSink;

    struct Discard;

    impl CommandPath for Discard {
        fn send_command(&self, _: u8, _: u8, _: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    impl InputSink for Discard {
        fn emit(&self, _: &[InputEvent]) -> Result<(), SinkError> {
            Ok(())
        }
    }

    impl DataPath for Discard {
        fn open_sink(&self, _: &SinkDescriptor) -> Result<Arc<dyn InputSink>, SinkError> {
            Ok(Arc::new(Discard))
        }

        fn write_output_report(&self, _: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn test_same_path_same_session() {
        let registry = SessionRegistry::new();
        let a = registry.acquire("1-2");
        let b = registry.acquire("1-2");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(!Arc::ptr_eq(&a, &registry.acquire("1-3")));
    }

    #[test]
    fn test_player_ids_lowest_free() {
        let registry = SessionRegistry::new();
        let a = registry.attach_data_path("a", Arc::new(Discard));
        let b = registry.attach_data_path("b", Arc::new(Discard));
        assert_eq!(a.player_id(), Some(0));
        assert_eq!(b.player_id(), Some(1));

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(registry.release_data_path(&a));

        let c = registry.attach_data_path("c", Arc::new(Discard));
        assert_eq!(c.player_id(), Some(0));
    }

    #[test]
    fn test_player_ids_exhausted() {
        let registry = SessionRegistry::new();
        for i in 0..MAX_PLAYERS {
            registry.attach_data_path(&format!("p{i}"), Arc::new(Discard));
        }
        let extra = registry.attach_data_path("extra", Arc::new(Discard));
        assert_eq!(extra.player_id(), None);
    }

    #[tokio::test]
    async fn test_release_both_frees_session() {
        let registry = SessionRegistry::new();
        let session = registry.attach_command_path("1-4", Arc::new(Discard));
        registry.attach_data_path("1-4", Arc::new(Discard));
        assert_ne!(session.init_step(), InitStep::Starting);

        registry.release_command_path(&session).await;
        assert!(registry.get("1-4").is_some());

        registry.release_data_path(&session).await;
        assert!(registry.get("1-4").is_none());

        let fresh = registry.acquire("1-4");
        assert!(!Arc::ptr_eq(&fresh, &session));
        assert_eq!(fresh.init_step(), InitStep::Starting);
    }
}
