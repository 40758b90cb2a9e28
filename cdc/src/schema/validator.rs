use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};

/// A name that had to be changed to become a valid schema or field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameConflict {
    pub original: String,
    pub proposed: String,
    pub description: String,
}

/// Callback deciding the final name for a [`NameConflict`].
pub type ConflictHandler = Arc<dyn Fn(&NameConflict) -> CdcResult<String> + Send + Sync>;

/// What to do when a name must be changed.
#[derive(Clone, Default)]
pub enum NameConflictPolicy {
    /// Fail with [`ErrorKind::SchemaNameConflict`].
    #[default]
    Strict,
    /// Use the proposed replacement and log a warning.
    Permissive,
    /// Let the callback pick the name. The returned name must itself be valid.
    Custom(ConflictHandler),
}

impl fmt::Debug for NameConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameConflictPolicy::Strict => f.write_str("Strict"),
            NameConflictPolicy::Permissive => f.write_str("Permissive"),
            NameConflictPolicy::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Makes record and field names safe for schema registries.
///
/// A name segment must start with an ASCII letter or `_` and continue with ASCII letters, digits
/// or `_`. Full names are dot separated segments. Invalid characters are replaced by `_`, and a
/// segment starting with a digit is prefixed with `_`.
#[derive(Debug, Clone, Default)]
pub struct SchemaNameValidator {
    policy: NameConflictPolicy,
}

impl SchemaNameValidator {
    pub fn new(policy: NameConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn strict() -> Self {
        Self::new(NameConflictPolicy::Strict)
    }

    pub fn permissive() -> Self {
        Self::new(NameConflictPolicy::Permissive)
    }

    pub fn policy(&self) -> &NameConflictPolicy {
        &self.policy
    }

    /// Validates a dotted record name such as `server.public.orders.Value`.
    pub fn validate_full_name(&self, name: &str) -> CdcResult<String> {
        let mut problems = Vec::new();
        let proposed = name
            .split('.')
            .map(|segment| sanitize_segment(segment, &mut problems))
            .collect::<Vec<_>>()
            .join(".");

        self.resolve(name, proposed, problems, is_valid_full_name)
    }

    /// Validates a single field name, which may not contain dots.
    pub fn validate_field_name(&self, name: &str) -> CdcResult<String> {
        let mut problems = Vec::new();
        let proposed = sanitize_segment(name, &mut problems);

        self.resolve(name, proposed, problems, is_valid_segment)
    }

    fn resolve(
        &self,
        original: &str,
        proposed: String,
        problems: Vec<String>,
        is_valid: fn(&str) -> bool,
    ) -> CdcResult<String> {
        if problems.is_empty() {
            return Ok(proposed);
        }

        let conflict = NameConflict {
            original: original.to_owned(),
            proposed,
            description: problems.join("; "),
        };

        match &self.policy {
            NameConflictPolicy::Strict => bail!(
                ErrorKind::SchemaNameConflict,
                "Name is not a valid schema name",
                format!(
                    "'{}' ({}), a valid replacement would be '{}'",
                    conflict.original, conflict.description, conflict.proposed
                )
            ),
            NameConflictPolicy::Permissive => {
                warn!(
                    original = %conflict.original,
                    replacement = %conflict.proposed,
                    reason = %conflict.description,
                    "replacing invalid schema name"
                );
                Ok(conflict.proposed)
            }
            NameConflictPolicy::Custom(handler) => {
                let name = handler(&conflict)?;
                if !is_valid(&name) {
                    bail!(
                        ErrorKind::SchemaNameConflict,
                        "Conflict handler returned an invalid name",
                        format!("'{name}' returned for '{}'", conflict.original)
                    );
                }
                Ok(name)
            }
        }
    }
}

fn is_valid_first_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next().is_some_and(is_valid_first_char) && chars.all(is_valid_char)
}

fn is_valid_full_name(name: &str) -> bool {
    name.split('.').all(is_valid_segment)
}

fn sanitize_segment(segment: &str, problems: &mut Vec<String>) -> String {
    let mut sanitized = String::with_capacity(segment.len() + 1);

    let Some(first) = segment.chars().next() else {
        problems.push("empty name segment".to_owned());
        sanitized.push('_');
        return sanitized;
    };

    if first.is_ascii_digit() {
        problems.push(format!("'{segment}' starts with a digit"));
        sanitized.push('_');
    }

    for (i, c) in segment.chars().enumerate() {
        let valid = if i == 0 && !first.is_ascii_digit() {
            is_valid_first_char(c)
        } else {
            is_valid_char(c)
        };

        if valid {
            sanitized.push(c);
        } else {
            problems.push(format!("'{c}' is not allowed in '{segment}'"));
            sanitized.push('_');
        }
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn valid_names_pass_unchanged() {
        let validator = SchemaNameValidator::strict();
        assert_eq!(
            validator
                .validate_full_name("server1.inventory.public.orders.Value")
                .unwrap(),
            "server1.inventory.public.orders.Value"
        );
        assert_eq!(validator.validate_field_name("_id2").unwrap(), "_id2");
    }

    #[test]
    fn strict_policy_rejects_invalid_names() {
        let err = SchemaNameValidator::strict()
            .validate_field_name("order-id")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNameConflict);
        assert!(err.detail().unwrap().contains("order_id"));
    }

    #[test]
    fn permissive_policy_uses_replacement() {
        let validator = SchemaNameValidator::permissive();
        assert_eq!(validator.validate_field_name("order-id").unwrap(), "order_id");
        assert_eq!(validator.validate_field_name("1st").unwrap(), "_1st");
        assert_eq!(validator.validate_field_name("").unwrap(), "_");
        assert_eq!(
            validator.validate_full_name("my-db.public.2020").unwrap(),
            "my_db.public._2020"
        );
    }

    #[test]
    fn custom_policy_receives_conflict() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let validator = SchemaNameValidator::new(NameConflictPolicy::Custom(Arc::new(
            move |conflict: &NameConflict| {
                recorded.lock().unwrap().push(conflict.clone());
                Ok(format!("x_{}", conflict.proposed))
            },
        )));

        assert_eq!(validator.validate_field_name("a b").unwrap(), "x_a_b");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].original, "a b");
        assert_eq!(seen[0].proposed, "a_b");
        assert!(seen[0].description.contains("' '"));
    }

    #[test]
    fn custom_policy_result_must_be_valid() {
        let validator = SchemaNameValidator::new(NameConflictPolicy::Custom(Arc::new(
            |conflict: &NameConflict| Ok(conflict.original.clone()),
        )));

        let err = validator.validate_field_name("a b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNameConflict);
    }
}
