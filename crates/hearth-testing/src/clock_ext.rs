//! Small helpers that don't fit cleanly under `builders`.

/// A short random suffix for test data that needs to avoid colliding
/// across parallel test runs (e.g. queue names).
pub fn random_suffix() -> String {
    (0..8).map(|_| fastrand::alphanumeric()).collect()
}
