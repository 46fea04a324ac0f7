//! Request validation
//!
//! Errors are keyed by field path. Nested structures are validated with a
//! prefix so a failure deep in a request reads as `outer.inner.field`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_EMAIL_LENGTH: usize = 320; // RFC 5321

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

/// Failures keyed by field path, in path order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(|v| v.as_slice())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn push(&mut self, field: String, message: String) {
        self.fields.entry(field).or_default().push(message);
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed: ")?;
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Implemented by request types checked before any work is done
pub trait Validate {
    fn validate_into(&self, v: &mut Validator);

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        self.validate_into(&mut v);
        v.finish()
    }
}

/// Field validator collecting every failure
#[derive(Debug, Default)]
pub struct Validator {
    prefix: Vec<String>,
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    fn path(&self, field: &str) -> String {
        if self.prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", self.prefix.join("."), field)
        }
    }

    /// Record a failure against a field
    pub fn error(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        let path = self.path(field);
        self.errors.push(path, message.into());
        self
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.error(field, "a value is required");
        }
        self
    }

    /// Like `required`, but whitespace counts as a value. Used for secrets,
    /// where every character is significant.
    pub fn present(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.error(field, "a value is required");
        }
        self
    }

    /// Length bounds in characters; a zero bound is not checked
    pub fn string_length(&mut self, field: &str, value: &str, min: usize, max: usize) -> &mut Self {
        let len = value.chars().count();
        if min > 0 && len < min {
            self.error(field, format!("length ({}) must be at least {}", len, min));
        }
        if max > 0 && len > max {
            self.error(field, format!("length ({}) must be no more than {}", len, max));
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.error(field, "a value is required");
        } else if value.len() > MAX_EMAIL_LENGTH {
            self.error(field, format!("length ({}) must be no more than {}", value.len(), MAX_EMAIL_LENGTH));
        } else if !EMAIL_REGEX.is_match(value) {
            self.error(field, "invalid email address");
        }
        self
    }

    /// At least one of the named fields must be non-empty
    pub fn one_of_required(&mut self, fields: &[(&str, &str)]) -> &mut Self {
        if fields.iter().all(|(_, value)| value.trim().is_empty()) {
            let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
            for (name, _) in fields {
                self.error(name, format!("one of ({}) is required", names.join(", ")));
            }
        }
        self
    }

    /// Validate a nested structure under `prefix`
    pub fn nested(&mut self, prefix: &str, f: impl FnOnce(&mut Self)) -> &mut Self {
        self.prefix.push(prefix.to_string());
        f(self);
        self.prefix.pop();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        let mut v = Validator::new();
        v.required("name", "  ");
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.get("name").unwrap(), ["a value is required"]);
    }

    #[test]
    fn test_present_keeps_whitespace() {
        let mut v = Validator::new();
        v.present("password", "   ");
        assert!(v.finish().is_ok());

        let mut v = Validator::new();
        v.present("password", "");
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.get("password").unwrap(), ["a value is required"]);
    }

    #[test]
    fn test_string_length_bounds() {
        let mut v = Validator::new();
        v.string_length("code", "abc", 5, 0);
        v.string_length("name", "x".repeat(20).as_str(), 0, 10);
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.get("code").unwrap(), ["length (3) must be at least 5"]);
        assert_eq!(errors.get("name").unwrap(), ["length (20) must be no more than 10"]);
    }

    #[test]
    fn test_nested_field_paths() {
        let mut v = Validator::new();
        v.required("top", "ok").nested("nested", |v| {
            v.nested("subNested", |v| {
                v.string_length("fieldOne", &"a".repeat(20), 0, 10);
            });
            v.required("fieldTwo", "");
        });

        let errors = v.finish().unwrap_err();
        assert_eq!(
            errors.get("nested.subNested.fieldOne").unwrap(),
            ["length (20) must be no more than 10"]
        );
        assert_eq!(errors.get("nested.fieldTwo").unwrap(), ["a value is required"]);
        assert!(errors.get("top").is_none());
    }

    #[test]
    fn test_one_of_required() {
        let mut v = Validator::new();
        v.one_of_required(&[("email", ""), ("name", "")]);
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.get("email").unwrap(), ["one of (email, name) is required"]);

        let mut v = Validator::new();
        v.one_of_required(&[("email", ""), ("name", "alice")]);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_email_validation() {
        let mut v = Validator::new();
        v.email("email", "test@example.com");
        assert!(v.finish().is_ok());

        let mut v = Validator::new();
        v.email("email", "invalid-email");
        assert!(v.finish().is_err());
    }

    #[test]
    fn test_display_lists_every_failure() {
        let mut v = Validator::new();
        v.required("a", "").required("b", "");
        let errors = v.finish().unwrap_err();
        assert_eq!(
            errors.to_string(),
            "validation failed: a: a value is required, b: a value is required"
        );
    }
}
