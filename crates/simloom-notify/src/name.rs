//! Validation for notification and tag names (spec grammar in §6).

use simloom_core::{Error, Result};

/// Words a notification name may not collide with, since the trigger
/// expression grammar (§4.5) uses them as leaf-kind prefixes.
const RESERVED: &[&str] = &["name", "type", "notif", "stat_def"];

/// `[A-Za-z][A-Za-z0-9_]*`, no adjacent underscores, no reserved-word
/// collision.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(Error::Configuration("notification name is empty".into()));
    };

    if !first.is_ascii_alphabetic() {
        return Err(Error::Configuration(format!(
            "notification name '{name}' must start with a letter"
        )));
    }

    let mut prev_underscore = false;
    for c in chars {
        if c == '_' {
            if prev_underscore {
                return Err(Error::Configuration(format!(
                    "notification name '{name}' has adjacent underscores"
                )));
            }
            prev_underscore = true;
        } else if c.is_ascii_alphanumeric() {
            prev_underscore = false;
        } else {
            return Err(Error::Configuration(format!(
                "notification name '{name}' contains illegal character '{c}'"
            )));
        }
    }

    if RESERVED.contains(&name) {
        return Err(Error::Configuration(format!(
            "notification name '{name}' collides with a reserved word"
        )));
    }

    Ok(())
}
