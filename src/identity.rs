//! Process-wide ephemeral identity presented to session-bootstrap upstreams.

use std::sync::{Mutex, MutexGuard};

use crate::constants::{DEFAULT_MAX_SESSION_USES, DEVICE_SUFFIX_LENGTH, USER_AGENTS};
use crate::sign::nanoid;
use crate::types::{ConversationId, DeviceId, SessionMeta};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub device_id: DeviceId,
    pub conversation_id: Option<ConversationId>,
    pub usage_count: u32,
    pub user_agent: String,
}

impl Session {
    fn fresh() -> Self {
        Self {
            device_id: generate_device_id(),
            conversation_id: None,
            usage_count: 0,
            user_agent: pick_user_agent(),
        }
    }

    pub fn meta(&self) -> SessionMeta {
        SessionMeta {
            device_id: self.device_id.to_string(),
            conversation_id: self.conversation_id.as_ref().map(|c| c.to_string()),
        }
    }
}

/// `<uuid hex>_<nanoid>`: two independent random sources
pub fn generate_device_id() -> DeviceId {
    DeviceId(format!(
        "{}_{}",
        uuid::Uuid::new_v4().simple(),
        nanoid(DEVICE_SUFFIX_LENGTH)
    ))
}

fn pick_user_agent() -> String {
    let idx = fastrand::usize(..USER_AGENTS.len());
    USER_AGENTS[idx].to_string()
}

/// Serialized owner of the single shared [`Session`].
#[derive(Debug)]
pub struct IdentityRotator {
    max_uses: u32,
    current: Mutex<Option<Session>>,
}

impl Default for IdentityRotator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSION_USES)
    }
}

impl IdentityRotator {
    pub fn new(max_uses: u32) -> Self {
        Self {
            max_uses: max_uses.max(1),
            current: Mutex::new(None),
        }
    }

    pub fn max_uses(&self) -> u32 {
        self.max_uses
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        // Session data stays valid even if a holder panicked
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Reuse the current session, or rotate to a fresh one when forced,
    /// absent, or worn out. Returns a snapshot.
    pub fn acquire(&self, force_new: bool) -> Session {
        let mut guard = self.lock();
        if let Some(session) = guard.as_mut() {
            if !force_new && session.usage_count < self.max_uses {
                session.usage_count += 1;
                tracing::debug!(
                    "[🪪 ] Reusing device {} (use {}/{})",
                    session.device_id.short(),
                    session.usage_count,
                    self.max_uses
                );
                return session.clone();
            }
        }

        let session = Session::fresh();
        match guard.as_ref() {
            Some(old) => tracing::info!(
                "[🪪 ] Rotating device {} -> {} (forced: {}, uses: {})",
                old.device_id.short(),
                session.device_id.short(),
                force_new,
                old.usage_count
            ),
            None => tracing::info!("[🪪 ] New device {}", session.device_id.short()),
        }
        *guard = Some(session.clone());
        session
    }

    /// Record a conversation id, unless the device has rotated in the meantime.
    pub fn attach_conversation(&self, device_id: &DeviceId, conversation_id: ConversationId) -> bool {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(session) if &session.device_id == device_id => {
                session.conversation_id = Some(conversation_id);
                true
            }
            _ => {
                tracing::debug!(
                    "[🪪 ] Device {} rotated before conversation was attached",
                    device_id.short()
                );
                false
            }
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.lock().clone()
    }
}
