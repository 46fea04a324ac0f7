//! Password policy evaluation
//!
//! A candidate password is scanned once and every configured requirement is
//! checked, so a rejection reports all unmet requirements together.

use trellis_core::{Settings, TrellisError};

/// Character class test
pub type Classifier = fn(char) -> bool;

pub fn is_lowercase(c: char) -> bool {
    c.is_lowercase()
}

pub fn is_uppercase(c: char) -> bool {
    c.is_uppercase()
}

pub fn is_number(c: char) -> bool {
    c.is_numeric()
}

/// Printable ASCII that is neither a letter nor a digit. Space counts.
pub fn is_symbol(c: char) -> bool {
    matches!(c, ' '..='~') && !c.is_ascii_alphanumeric()
}

/// True when `password` holds at least `min` characters of the class
pub fn has_minimum_count(min: u32, password: &str, classifier: Classifier) -> bool {
    password.chars().filter(|c| classifier(*c)).count() >= min as usize
}

/// One character-class requirement
#[derive(Debug, Clone, Copy)]
pub struct Requirement {
    pub min: u32,
    /// Plural noun used in the failure message
    pub label: &'static str,
    pub classifier: Classifier,
}

/// Requirements derived from the stored settings, in reporting order
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    length_min: u32,
    requirements: Vec<Requirement>,
}

impl PasswordPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            length_min: settings.length_min,
            requirements: vec![
                Requirement {
                    min: settings.lowercase_min,
                    label: "lowercase letters",
                    classifier: is_lowercase,
                },
                Requirement {
                    min: settings.uppercase_min,
                    label: "uppercase letters",
                    classifier: is_uppercase,
                },
                Requirement {
                    min: settings.number_min,
                    label: "numbers",
                    classifier: is_number,
                },
                Requirement {
                    min: settings.symbol_min,
                    label: "symbols",
                    classifier: is_symbol,
                },
            ],
        }
    }

    /// Add a requirement checked after the built-in ones
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn length_min(&self) -> u32 {
        self.length_min
    }

    /// Every unmet requirement; empty when the password passes
    pub fn violations(&self, password: &str) -> Vec<String> {
        let mut length = 0usize;
        let mut counts = vec![0usize; self.requirements.len()];
        for c in password.chars() {
            length += 1;
            for (count, req) in counts.iter_mut().zip(&self.requirements) {
                if (req.classifier)(c) {
                    *count += 1;
                }
            }
        }

        let mut violations = Vec::new();
        if self.length_min > 0 && length < self.length_min as usize {
            violations.push(format!("needs minimum length of {}", self.length_min));
        }
        for (count, req) in counts.into_iter().zip(&self.requirements) {
            if req.min > 0 && count < req.min as usize {
                violations.push(format!("needs minimum {} {}", req.min, req.label));
            }
        }
        violations
    }

    pub fn check(&self, password: &str) -> Result<(), TrellisError> {
        let violations = self.violations(password);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(TrellisError::policy_violation(violations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(settings: Settings) -> PasswordPolicy {
        PasswordPolicy::from_settings(&settings)
    }

    #[test]
    fn test_lowercase_requirements() {
        let cases = [
            ("a", false),
            ("A", false),
            ("ab", true),
            ("AB", false),
            ("Ab", false),
            ("abc", true),
            ("abC", true),
            ("AbC", false),
            ("aBc", true),
            ("", false),
            ("!$!@#23", false),
        ];
        for (input, expected) in cases {
            assert_eq!(has_minimum_count(2, input, is_lowercase), expected, "{input:?}");
        }
    }

    #[test]
    fn test_uppercase_requirements() {
        let cases = [
            ("a", false),
            ("A", false),
            ("ab", false),
            ("AB", true),
            ("Ab", false),
            ("abc", false),
            ("abC", false),
            ("AbC", true),
            ("aBc", false),
            ("", false),
            ("!$!@#23", false),
        ];
        for (input, expected) in cases {
            assert_eq!(has_minimum_count(2, input, is_uppercase), expected, "{input:?}");
        }
    }

    #[test]
    fn test_number_requirements() {
        let cases = [
            ("abc", false),
            ("aBc", false),
            ("", false),
            ("!$!@#", false),
            ("!$!@#23", true),
            ("!$!@#23123", true),
        ];
        for (input, expected) in cases {
            assert_eq!(has_minimum_count(2, input, is_number), expected, "{input:?}");
        }
    }

    #[test]
    fn test_symbol_requirements() {
        for input in ["", "abAB", "abc!"] {
            assert!(!has_minimum_count(2, input, is_symbol), "{input:?}");
        }
        for c in " !\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~".chars() {
            let doubled: String = [c, c].iter().collect();
            assert!(has_minimum_count(2, &doubled, is_symbol), "{doubled:?}");
        }
    }

    #[test]
    fn test_non_ascii_is_not_a_symbol() {
        assert!(!is_symbol('é'));
        assert!(!is_symbol('€'));
        assert!(!is_symbol('\t'));
    }

    #[test]
    fn test_zero_minimums_accept_anything() {
        assert!(policy(Settings::default()).check("").is_ok());
    }

    #[test]
    fn test_length_only() {
        let p = policy(Settings {
            length_min: 8,
            ..Default::default()
        });
        assert_eq!(p.violations("short"), vec!["needs minimum length of 8"]);

        let p = policy(Settings {
            length_min: 5,
            ..Default::default()
        });
        assert!(p.check("short").is_ok());
        assert!(p.check("longer").is_ok());
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let p = policy(Settings {
            length_min: 4,
            ..Default::default()
        });
        assert!(p.check("ééé").is_err());
        assert!(p.check("éééé").is_ok());
    }

    #[test]
    fn test_all_failures_reported_in_order() {
        let p = policy(Settings {
            length_min: 10,
            lowercase_min: 1,
            uppercase_min: 1,
            number_min: 1,
            symbol_min: 1,
            updated_at: None,
        });
        assert_eq!(
            p.violations("badpw"),
            vec![
                "needs minimum length of 10",
                "needs minimum 1 uppercase letters",
                "needs minimum 1 numbers",
                "needs minimum 1 symbols",
            ]
        );

        let err = p.check("badpw").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("password does not pass requirements: "));
        assert!(message.contains("needs minimum 1 symbols"));
        assert!(message.contains("needs minimum length of 10"));
    }

    #[test]
    fn test_custom_requirement() {
        let p = policy(Settings::default()).with_requirement(Requirement {
            min: 1,
            label: "spaces",
            classifier: |c| c == ' ',
        });
        assert_eq!(p.violations("nospace"), vec!["needs minimum 1 spaces"]);
        assert!(p.check("has space").is_ok());
    }
}
