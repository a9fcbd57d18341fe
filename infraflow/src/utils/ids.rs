//! Identifier generation.

use uuid::Uuid;

/// Generates a time-ordered id for a provisioning run.
///
/// UUID v7 sorts by creation time, so run ids listed from a state
/// directory come out in the order the runs started.
#[must_use]
pub fn generate_run_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique_and_v7() {
        let a = generate_run_id();
        let b = generate_run_id();
        assert_ne!(a, b);

        let parsed = Uuid::parse_str(&a).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }
}
