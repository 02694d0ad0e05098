//! Record schemas and validation.
//!
//! Every entity kind has a static [`Schema`] listing its fields and nested
//! child collections. Properties are checked against the schema at the store
//! boundary: unknown fields, missing required fields and mistyped values are
//! rejected before anything touches disk.

use corral_core::{names, secret};
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Loosely typed record properties as exchanged over the wire.
pub type Props = serde_json::Map<String, Value>;

/// Directory names of the top-level collections.
pub mod dirs {
    /// Registered hosts, each owning a `containers` collection.
    pub const HOSTS: &str = "hosts";

    /// Unassigned container requests.
    pub const CONTAINER_REQUESTS: &str = "container_requests";

    /// Users, each owning an `initscripts` collection.
    pub const USERS: &str = "users";

    /// Shared storage definitions.
    pub const SHARED_STORAGE: &str = "shared_storage";
}

/// Returns all top-level collection directories for store initialization.
#[must_use]
pub fn top_level_dirs() -> [&'static str; 4] {
    [
        dirs::HOSTS,
        dirs::CONTAINER_REQUESTS,
        dirs::USERS,
        dirs::SHARED_STORAGE,
    ]
}

/// The JSON type a field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// A string.
    Str,
    /// A signed integer.
    Int,
    /// A non-negative integer.
    Count,
    /// A boolean.
    Bool,
    /// An array of strings.
    StrList,
    /// A string that is hashed before it is stored.
    Secret,
}

impl FieldType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Str | Self::Secret => value.is_string(),
            Self::Int => value.is_i64(),
            Self::Count => value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::StrList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::Str | Self::Secret => "string",
            Self::Int => "integer",
            Self::Count => "non-negative integer",
            Self::Bool => "boolean",
            Self::StrList => "list of strings",
        }
    }
}

/// A default applied when a field is absent on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    /// Default string.
    Str(&'static str),
    /// Default integer.
    Int(i64),
    /// Default boolean.
    Bool(bool),
}

impl FieldDefault {
    fn to_value(self) -> Value {
        match self {
            Self::Str(s) => Value::from(s),
            Self::Int(i) => Value::from(i),
            Self::Bool(b) => Value::from(b),
        }
    }
}

/// A single field in a schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name.
    pub name: &'static str,
    /// Expected type.
    pub ty: FieldType,
    /// Whether the field must be present on create.
    pub required: bool,
    /// Value used when the field is absent on create.
    pub default: Option<FieldDefault>,
}

impl FieldSpec {
    /// A field that must be supplied on create.
    #[must_use]
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: true,
            default: None,
        }
    }

    /// A field that may be omitted.
    #[must_use]
    pub const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
            default: None,
        }
    }

    /// An optional field with a default value.
    #[must_use]
    pub const fn with_default(name: &'static str, ty: FieldType, default: FieldDefault) -> Self {
        Self {
            name,
            ty,
            required: false,
            default: Some(default),
        }
    }
}

/// A nested collection owned by each record of a kind.
#[derive(Debug)]
pub struct ChildSpec {
    /// Property key used for inline children, also the directory name.
    pub key: &'static str,
    /// Schema of the child records.
    pub schema: &'static Schema,
}

/// Schema for one entity kind.
#[derive(Debug)]
pub struct Schema {
    /// Human-readable kind name used in errors.
    pub kind: &'static str,
    /// Fields stored in the record.
    pub fields: &'static [FieldSpec],
    /// Nested collections.
    pub children: &'static [ChildSpec],
}

/// Properties that passed full validation, ready to be written.
#[derive(Debug, Clone)]
pub struct Validated {
    /// Record fields after defaults and transforms.
    pub fields: Props,
    /// Inline children, per child collection.
    pub children: Vec<ValidatedChildren>,
}

/// Validated inline records for one child collection.
#[derive(Debug, Clone)]
pub struct ValidatedChildren {
    /// The child collection.
    pub spec: &'static ChildSpec,
    /// Child records by name.
    pub records: Vec<(names::Name, Validated)>,
}

impl Schema {
    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a child collection by key.
    #[must_use]
    pub fn child(&self, key: &str) -> Option<&'static ChildSpec> {
        self.children.iter().find(|c| c.key == key)
    }

    /// Validate the full property set of a new record.
    ///
    /// Applies defaults for absent optional fields and hashes secret fields.
    /// Inline children are validated recursively.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` on an unknown field, a missing
    /// required field, a value of the wrong type or a malformed child.
    pub fn validate_new(&self, props: Props) -> Result<Validated> {
        let mut fields = Props::new();
        let mut children = Vec::new();

        for (key, value) in props {
            if let Some(spec) = self.field(&key) {
                if value.is_null() && !spec.required {
                    continue;
                }
                fields.insert(key, self.check_field(spec, value)?);
            } else if let Some(child) = self.child(&key) {
                children.push(self.validate_children(child, value)?);
            } else {
                return Err(self.unknown_field(&key));
            }
        }

        for spec in self.fields {
            if fields.contains_key(spec.name) {
                continue;
            }
            if spec.required {
                return Err(StoreError::Validation(format!(
                    "{}: missing required field '{}'",
                    self.kind, spec.name
                )));
            }
            if let Some(default) = spec.default {
                fields.insert(spec.name.to_string(), default.to_value());
            }
        }

        Ok(Validated { fields, children })
    }

    /// Validate a partial update.
    ///
    /// Only the supplied fields are checked; required-ness is not enforced
    /// and children cannot be replaced through an update.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` on an unknown field or a value of the
    /// wrong type.
    pub fn validate_partial(&self, props: Props) -> Result<Props> {
        let mut fields = Props::new();
        for (key, value) in props {
            let spec = self.field(&key).ok_or_else(|| self.unknown_field(&key))?;
            if value.is_null() && !spec.required {
                fields.insert(key, Value::Null);
                continue;
            }
            fields.insert(key, self.check_field(spec, value)?);
        }
        Ok(fields)
    }

    fn check_field(&self, spec: &FieldSpec, value: Value) -> Result<Value> {
        if !spec.ty.accepts(&value) {
            return Err(StoreError::Validation(format!(
                "{}: field '{}' must be a {}",
                self.kind,
                spec.name,
                spec.ty.describe()
            )));
        }
        if spec.ty == FieldType::Secret {
            if let Value::String(plain) = &value {
                if plain.is_empty() {
                    return Ok(value);
                }
                return Ok(Value::String(secret::hash_secret(plain)));
            }
        }
        Ok(value)
    }

    fn validate_children(&self, child: &'static ChildSpec, value: Value) -> Result<ValidatedChildren> {
        let Value::Array(items) = value else {
            return Err(StoreError::Validation(format!(
                "{}: '{}' must be a list",
                self.kind, child.key
            )));
        };

        let mut records: Vec<(names::Name, Validated)> = Vec::with_capacity(items.len());
        for item in items {
            let Value::Object(mut props) = item else {
                return Err(StoreError::Validation(format!(
                    "{}: entries of '{}' must be objects",
                    self.kind, child.key
                )));
            };
            let name = take_name(&mut props, child.schema.kind)?;
            if records.iter().any(|(existing, _)| *existing == name) {
                return Err(StoreError::Validation(format!(
                    "{}: duplicate name '{name}' in '{}'",
                    self.kind, child.key
                )));
            }
            records.push((name, child.schema.validate_new(props)?));
        }

        Ok(ValidatedChildren {
            spec: child,
            records,
        })
    }

    fn unknown_field(&self, key: &str) -> StoreError {
        StoreError::Validation(format!("{}: unknown field '{key}'", self.kind))
    }
}

/// Remove and validate the `name` property of an inline record.
///
/// # Errors
///
/// Returns `StoreError::Validation` if the name is absent or invalid.
pub fn take_name(props: &mut Props, kind: &str) -> Result<names::Name> {
    match props.remove("name") {
        Some(Value::String(s)) => names::Name::parse(&s)
            .map_err(|e| StoreError::Validation(format!("{kind}: {e}"))),
        Some(_) => Err(StoreError::Validation(format!(
            "{kind}: field 'name' must be a string"
        ))),
        None => Err(StoreError::Validation(format!(
            "{kind}: missing required field 'name'"
        ))),
    }
}
