use crate::models::{Role, Settings};

/// Compares `secret` with the configured secret for `role`.
pub fn check_credential(settings: &Settings, role: Role, secret: &str) -> bool {
    let expected = match role {
        Role::Admin => &settings.admin_secret,
        Role::Client => &settings.client_secret,
    };
    constant_time_compare(secret, expected)
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
