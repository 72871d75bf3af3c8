pub type StdResult<T, E> = std::result::Result<T, E>;

/// Identifies a connection for its whole lifetime; drawn from a v4 UUID.
pub type ConnectionId = u128;
