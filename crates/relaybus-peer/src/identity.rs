use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

/// Capability that mints relay instance identifiers.
///
/// Two live instances in one messaging graph must never share an identifier;
/// everything the relay knows about loop prevention hangs on that. Injected
/// so tests can pin identifiers deterministically.
pub trait InstanceIdSource: Send + Sync {
    fn generate(&self) -> String;
}

/// UUID v4 identifiers from OS randomness. The default source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureIdSource;

impl InstanceIdSource for SecureIdSource {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Pseudo-random alphanumeric identifiers.
///
/// Fallback for targets where OS randomness is unavailable; collision
/// resistance rests on length alone, so lengths below
/// [`AlphanumericIdSource::MIN_LENGTH`] are clamped up.
#[derive(Debug, Clone, Copy)]
pub struct AlphanumericIdSource {
    length: usize,
}

impl AlphanumericIdSource {
    /// Shortest identifier this source will produce.
    pub const MIN_LENGTH: usize = 16;

    pub fn new() -> Self {
        Self {
            length: Self::MIN_LENGTH,
        }
    }

    /// Use a longer identifier. Lengths below the minimum are clamped.
    pub fn with_length(length: usize) -> Self {
        Self {
            length: length.max(Self::MIN_LENGTH),
        }
    }
}

impl Default for AlphanumericIdSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceIdSource for AlphanumericIdSource {
    fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }
}

/// Always generates the same identifier. For tests and replay tooling.
#[derive(Debug, Clone)]
pub struct FixedIdSource {
    id: String,
}

impl FixedIdSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl InstanceIdSource for FixedIdSource {
    fn generate(&self) -> String {
        self.id.clone()
    }
}
