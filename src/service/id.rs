use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Identity of one micro-service instance.
///
/// Two services created with the same name are still distinct: each
/// `ServiceId::new` call takes a fresh, process-wide instance number. The id
/// is the key for mailbox and subscription membership on the bus.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    name: Arc<str>,
    instance: u64,
}

impl ServiceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.instance)
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceId({})", self)
    }
}
