//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse UUID from string
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}

/// Short form of an anchor id for log lines (first 8 hex digits)
pub fn short(id: &Uuid) -> String {
    let mut text = id.simple().to_string();
    text.truncate(8);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_generated() {
        let id = generate();
        assert_eq!(parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_labels() {
        assert!(parse("anchor-1").is_err());
    }

    #[test]
    fn test_short_is_prefix() {
        let id = parse("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(short(&id), "67e55044");
    }
}
