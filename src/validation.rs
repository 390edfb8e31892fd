// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticator label validation.
//!
//! Labels name a passkey on the custody side. They must be non-empty,
//! shorter than 256 characters and made of letters, digits, whitespace and
//! `_ + @ . -`.

pub const MAX_AUTHENTICATOR_LABEL_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("Authenticator label cannot be empty")]
    Empty,

    #[error("Authenticator label must be less than 256 characters long")]
    TooLong,

    #[error(
        "Authenticator label must be composed of letters, numbers, or the following symbols: spaces, _, ., -, +, @"
    )]
    InvalidCharacter(char),
}

pub fn validate_authenticator_label(label: &str) -> Result<(), LabelError> {
    if label.is_empty() {
        return Err(LabelError::Empty);
    }
    if label.chars().count() >= MAX_AUTHENTICATOR_LABEL_LEN {
        return Err(LabelError::TooLong);
    }
    if let Some(c) = label.chars().find(|c| !is_label_char(*c)) {
        return Err(LabelError::InvalidCharacter(c));
    }
    Ok(())
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '+' | '@' | '.' | '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_labels() {
        assert!(validate_authenticator_label("My Laptop").is_ok());
        assert!(validate_authenticator_label("yubikey-5c_nfc+backup@home.v2").is_ok());
        assert!(validate_authenticator_label(&"a".repeat(255)).is_ok());
    }

    #[test]
    fn rejects_bad_labels() {
        assert_eq!(validate_authenticator_label(""), Err(LabelError::Empty));
        assert_eq!(
            validate_authenticator_label(&"a".repeat(256)),
            Err(LabelError::TooLong)
        );
        assert_eq!(
            validate_authenticator_label("laptop!"),
            Err(LabelError::InvalidCharacter('!'))
        );
        assert_eq!(
            validate_authenticator_label("clé"),
            Err(LabelError::InvalidCharacter('é'))
        );
    }
}
