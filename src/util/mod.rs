//! Utility modules

pub mod time;

/// Host name of this machine, or `"unknown"` when it cannot be read.
pub fn node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_not_empty() {
        assert!(!node_id().is_empty());
    }
}
