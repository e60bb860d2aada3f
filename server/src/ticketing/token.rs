use uuid::Uuid;

/// Issues opaque ticket tokens.
///
/// Tokens are UUIDv4 values (122 random bits from the OS source), so
/// collisions are not a practical concern; the store still rejects one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenIssuer;

impl TokenIssuer {
    pub fn new() -> Self {
        Self
    }

    pub fn issue(&self) -> String {
        Uuid::new_v4().hyphenated().to_string()
    }
}
