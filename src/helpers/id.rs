use uuid::Uuid;

/// Short random identifier (8 lowercase hex characters).
pub fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_are_hex_and_distinct() {
        let a = short_id();
        let b = short_id();

        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
