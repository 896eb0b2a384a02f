use thiserror::Error;

/// Result alias for grid construction and configuration.
pub type GridResult<T> = Result<T, GridError>;

/// Errors raised while building a grid. All of them are fatal for the battle
/// that asked for the grid; nothing here is retryable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("grid dimension must be positive, got {0}")]
    InvalidDimension(u32),

    #[error("bounds have zero area: x [{min_x}, {max_x}], y [{min_y}, {max_y}]")]
    DegenerateBounds {
        min_x: f32,
        min_y: f32,
        max_x: f32,
        max_y: f32,
    },

    #[error("bounds must be finite")]
    NonFiniteBounds,

    #[error("unit capacity must be positive")]
    ZeroCapacity,

    #[error("invalid grid config: {0}")]
    InvalidConfig(String),
}

/// Queries refused up front instead of panicking inside the index
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    #[error("query issued before commit")]
    NotCommitted,

    #[error("no units outside army {0}")]
    NoEnemy(u32),
}

impl GridError {
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig(details.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GridError::InvalidDimension(0);
        assert!(err.to_string().contains("positive"));

        let err = GridError::invalid_config("missing field `dimension`");
        assert!(err.to_string().contains("dimension"));

        let err = QueryError::NoEnemy(3);
        assert_eq!(err.to_string(), "no units outside army 3");
    }
}
